//! Transport and exchange error types
//!
//! `TransportError` covers handing bytes to a neighbour; `ExchangeError` is
//! the correlator's non-response outcome for an outbound call. Neither is a
//! protocol-level failure: no peer produced a response.

use ocpp_codec::ProtocolError;
use ocpp_types::{NetworkingNodeId, RequestId};
use std::time::Duration;
use thiserror::Error;

/// Failure to move a frame across the transport boundary
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// No link between the two nodes
    #[error("No link from {from} to {to}")]
    NoLink {
        from: NetworkingNodeId,
        to: NetworkingNodeId,
    },

    /// Peer's receiving side has gone away
    #[error("Link to {peer} is closed")]
    Closed { peer: NetworkingNodeId },

    /// Outbound envelope does not name the neighbour to send over
    #[error("Envelope for {request_id} has no next hop")]
    MissingLink { request_id: RequestId },

    /// Transport metadata needed to rebuild a message is absent
    #[error("Transport metadata '{field}' missing for {request_id}")]
    MissingMetadata {
        field: &'static str,
        request_id: RequestId,
    },

    /// Frame could not be encoded or decoded
    #[error("Frame error: {0}")]
    Frame(#[from] ProtocolError),
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Non-response outcome of an outbound call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("Request {request_id} timed out after {timeout:?}")]
    Timeout {
        request_id: RequestId,
        timeout: Duration,
    },

    #[error("Request {request_id} was cancelled")]
    Cancelled { request_id: RequestId },

    /// Id already registered for an in-flight call; nothing was sent
    #[error("Request id {request_id} is already in flight")]
    DuplicateRequestId { request_id: RequestId },

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),
}

impl ExchangeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
