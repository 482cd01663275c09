//! # Relay Error Types
//!
//! Failures of the relay machinery itself. A message that is merely
//! refused is not an error: it yields a REJECT or DROP decision.

use ocpp_codec::ProtocolError;
use ocpp_network::TransportError;
use ocpp_types::{NetworkingNodeId, RequestId};
use thiserror::Error;

/// Relay operation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelayError {
    /// Frame handed to the forwarding engine is not a CALL
    #[error("Frame {request_id} is not a CALL")]
    NotACall { request_id: RequestId },

    /// Inbound envelope lacks routing metadata
    #[error("Inbound {request_id} carries no destination")]
    MissingDestination { request_id: RequestId },

    /// Neither origin nor arrival link is known
    #[error("Inbound {request_id} has no originator")]
    MissingOriginator { request_id: RequestId },

    /// Static route would send traffic back to the relay itself
    #[error("Route to {destination} points at the local node")]
    SelfRoute { destination: NetworkingNodeId },

    #[error("Frame error: {0}")]
    Frame(#[from] ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result type for relay operations
pub type RelayResult<T> = std::result::Result<T, RelayError>;
