//! Inbound CALL as seen by a relay: the decoded frame header plus the
//! transport metadata it arrived with. The payload stays encoded.

use crate::error::{RelayError, RelayResult};
use chrono::{DateTime, Utc};
use ocpp_codec::{Frame, Payload, RequestContext};
use ocpp_network::TransportEnvelope;
use ocpp_types::{NetworkPath, NetworkingNodeId, RequestId, SerializationFormat, SourceRouting};

#[derive(Debug, Clone)]
pub struct InboundCall {
    request_id: RequestId,
    action: String,
    payload: Payload,
    destination: SourceRouting,
    originator: NetworkingNodeId,
    transport: TransportEnvelope,
}

impl InboundCall {
    /// Decode the frame header of `envelope`
    pub fn from_transport(envelope: TransportEnvelope) -> RelayResult<Self> {
        let frame = Frame::decode(&envelope.frame, envelope.format)?;
        Self::from_frame(frame, envelope)
    }

    /// Pair an already decoded frame with the envelope it came in
    pub fn from_frame(frame: Frame, envelope: TransportEnvelope) -> RelayResult<Self> {
        let (request_id, action, payload) = match frame {
            Frame::Call {
                request_id,
                action,
                payload,
            } => (request_id, action, payload),
            other => {
                return Err(RelayError::NotACall {
                    request_id: other.request_id().clone(),
                })
            }
        };
        let destination = envelope
            .destination
            .clone()
            .ok_or_else(|| RelayError::MissingDestination {
                request_id: request_id.clone(),
            })?;
        let originator = envelope
            .originator()
            .cloned()
            .ok_or_else(|| RelayError::MissingOriginator {
                request_id: request_id.clone(),
            })?;
        Ok(Self {
            request_id,
            action,
            payload,
            destination,
            originator,
            transport: envelope,
        })
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn destination(&self) -> &SourceRouting {
        &self.destination
    }

    /// Node that created the CALL
    pub fn originator(&self) -> &NetworkingNodeId {
        &self.originator
    }

    pub fn network_path(&self) -> &NetworkPath {
        &self.transport.network_path
    }

    pub fn format(&self) -> SerializationFormat {
        self.transport.format
    }

    /// Neighbour the CALL arrived from
    pub fn previous_hop(&self) -> &NetworkingNodeId {
        self.transport.link.as_ref().unwrap_or(&self.originator)
    }

    pub fn transport(&self) -> &TransportEnvelope {
        &self.transport
    }

    /// Decoding context for typed access to the payload
    pub fn request_context(&self, received_at: DateTime<Utc>) -> RequestContext {
        RequestContext {
            request_id: self.request_id.clone(),
            received_at,
            request_timeout: self
                .transport
                .request_timeout
                .unwrap_or(ocpp_codec::DEFAULT_REQUEST_TIMEOUT),
            event_tracking_id: self
                .transport
                .event_tracking_id
                .clone()
                .unwrap_or_else(ocpp_types::EventTrackingId::random),
            destination: self.destination.clone(),
            origin: self.originator.clone(),
            network_path: self.transport.network_path.clone(),
            format: self.transport.format,
        }
    }

    pub fn into_transport(self) -> TransportEnvelope {
        self.transport
    }
}
