//! Transport Boundary
//!
//! The engine hands a transport encoded frame bytes plus routing metadata
//! and receives the same shape on delivery. Sockets, TLS and reconnection
//! live behind the [`Transport`] trait and are not part of the engine.
//!
//! ```text
//!  façade / relay ──TransportEnvelope──► Transport::send ──► neighbour
//!        ▲                                                      │
//!        └──────────────── inbound TransportEnvelope ◄──────────┘
//! ```

use crate::{Result, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use ocpp_codec::{
    RequestContext, RequestEnvelope, ResponseContext, ResponseEnvelope, DEFAULT_REQUEST_TIMEOUT,
};
use ocpp_types::{
    EventTrackingId, NetworkPath, NetworkingNodeId, RequestId, SerializationFormat, SourceRouting,
};
use std::time::Duration;

pub mod memory;

pub use memory::{MemoryNetwork, MemoryTransport};

/// What crosses the transport boundary
///
/// Carries the metadata that lives outside the payload: routing, the path
/// traversed so far, the originator and per-request timing.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportEnvelope {
    /// Encoded OCPP-J frame
    pub frame: Bytes,
    pub format: SerializationFormat,
    /// Routing hint; `None` for responses sent back over the arrival link
    pub destination: Option<SourceRouting>,
    /// Node that created the message
    pub origin: Option<NetworkingNodeId>,
    pub network_path: NetworkPath,
    pub request_timeout: Option<Duration>,
    pub event_tracking_id: Option<EventTrackingId>,
    /// Neighbour the bytes travel over: next hop outbound, previous hop inbound
    pub link: Option<NetworkingNodeId>,
}

impl TransportEnvelope {
    /// Envelope carrying a CALL for `request`
    pub fn for_request(request: &RequestEnvelope, frame: Bytes) -> Self {
        Self {
            frame,
            format: request.serialization_format(),
            destination: Some(request.destination().clone()),
            origin: request.origin().cloned(),
            network_path: request.network_path().clone(),
            request_timeout: Some(request.request_timeout()),
            event_tracking_id: Some(request.event_tracking_id().clone()),
            link: None,
        }
    }

    /// Envelope carrying a CALLRESULT or CALLERROR for `response`
    pub fn for_response(response: &ResponseEnvelope, frame: Bytes) -> Self {
        Self {
            frame,
            format: response.serialization_format(),
            destination: response.destination().cloned(),
            origin: None,
            network_path: response.network_path().clone(),
            request_timeout: None,
            event_tracking_id: None,
            link: None,
        }
    }

    /// Bare reply envelope, used where no typed response exists
    pub fn reply(frame: Bytes, format: SerializationFormat, destination: Option<SourceRouting>) -> Self {
        Self {
            frame,
            format,
            destination,
            origin: None,
            network_path: NetworkPath::empty(),
            request_timeout: None,
            event_tracking_id: None,
            link: None,
        }
    }

    #[must_use]
    pub fn via(mut self, link: NetworkingNodeId) -> Self {
        self.link = Some(link);
        self
    }

    #[must_use]
    pub fn with_origin(mut self, origin: NetworkingNodeId) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Node that created the message; falls back to the arrival link
    pub fn originator(&self) -> Option<&NetworkingNodeId> {
        self.origin.as_ref().or(self.link.as_ref())
    }

    /// Decoding context for the request this envelope carries
    pub fn request_context(
        &self,
        request_id: &RequestId,
        received_at: DateTime<Utc>,
    ) -> Result<RequestContext> {
        let destination = self.destination.clone().ok_or_else(|| {
            TransportError::MissingMetadata {
                field: "destination",
                request_id: request_id.clone(),
            }
        })?;
        let origin = self
            .originator()
            .cloned()
            .ok_or_else(|| TransportError::MissingMetadata {
                field: "origin",
                request_id: request_id.clone(),
            })?;
        Ok(RequestContext {
            request_id: request_id.clone(),
            received_at,
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            event_tracking_id: self
                .event_tracking_id
                .clone()
                .unwrap_or_else(EventTrackingId::random),
            destination,
            origin,
            network_path: self.network_path.clone(),
            format: self.format,
        })
    }

    /// Decoding context for the response this envelope carries
    pub fn response_context(&self, request_id: &RequestId, received_at: DateTime<Utc>) -> ResponseContext {
        ResponseContext {
            request_id: request_id.clone(),
            received_at,
            destination: self.destination.clone(),
            network_path: self.network_path.clone(),
            format: self.format,
        }
    }
}

/// Transport collaborator
#[async_trait]
pub trait Transport: Send + Sync {
    /// Hand an envelope to the neighbour named by `envelope.link`
    async fn send(&self, envelope: TransportEnvelope) -> Result<()>;

    /// No further work should be done for `request_id`
    async fn abandon(&self, _request_id: &RequestId) {}

    /// Identity of the local node this transport belongs to
    fn local_id(&self) -> &NetworkingNodeId;
}
