//! Façade error types
//!
//! A [`NodeError`] means no typed response could be produced. Protocol
//! failures reported by a peer are not errors here: they arrive as a
//! response whose `result()` carries the failure.

use ocpp_codec::ProtocolError;
use ocpp_network::{ExchangeError, TransportError};
use ocpp_types::{NetworkingNodeId, RequestId};
use relay_core::RelayError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    /// Timeout, cancellation, duplicate id or transport failure
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    /// No neighbour leads to the destination
    #[error("No route from {local} to {destination}")]
    NoRoute {
        local: NetworkingNodeId,
        destination: NetworkingNodeId,
    },

    /// Two message types derived the same action name
    #[error("Action {action} is already registered with a different message type")]
    ActionConflict { action: &'static str },

    /// Outbound queue dispatcher has stopped
    #[error("Outbound queue closed; {request_id} was not dispatched")]
    QueueClosed { request_id: RequestId },
}

impl From<TransportError> for NodeError {
    fn from(err: TransportError) -> Self {
        NodeError::Exchange(ExchangeError::Transport(err))
    }
}

impl NodeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, NodeError::Exchange(e) if e.is_timeout())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, NodeError::Exchange(e) if e.is_cancelled())
    }
}

/// Result type for façade operations
pub type NodeResult<T> = std::result::Result<T, NodeError>;
