//! Protocol-level errors for OCPP payload and frame processing
//!
//! Every variant carries enough context (action, field, byte counts) to be
//! turned into a `FormationViolation` description that makes sense to the
//! peer that sent the malformed message.

use ocpp_types::ValidationError;
use thiserror::Error;

/// Payload and frame codec errors with diagnostic context
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// Mandatory field absent from a JSON payload
    #[error("{action}: mandatory field '{field}' is missing")]
    MissingField { action: String, field: String },

    /// Field present but of the wrong type or failing its constraints
    #[error("{action}: field '{field}' is invalid: {reason}")]
    InvalidField {
        action: String,
        field: String,
        reason: String,
    },

    /// Binary data ended before a field could be read
    #[error("Truncated binary payload: need {need} bytes for '{field}', {remaining} remaining")]
    Truncated {
        field: String,
        need: usize,
        remaining: usize,
    },

    /// Value too long for its length prefix or declared maximum
    #[error("Field '{field}' is {len} long, limit is {max}")]
    FieldTooLong { field: String, len: usize, max: usize },

    /// Bytes left over after a complete binary payload
    #[error("{remaining} unexpected trailing bytes after binary payload")]
    TrailingBytes { remaining: usize },

    /// Input is not well-formed JSON
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    /// Frame does not follow the OCPP-J framing rules
    #[error("Invalid frame: {reason}")]
    InvalidFrame { reason: String },

    /// Unknown OCPP-J message type number
    #[error("Unknown message type {kind}: expected 2 (CALL), 3 (CALLRESULT) or 4 (CALLERROR)")]
    UnknownMessageType { kind: u64 },

    /// Frame action does not match the type being decoded
    #[error("Action mismatch: expected {expected}, got {got}")]
    ActionMismatch { expected: String, got: String },

    /// Custom post-parse hook produced an object that no longer validates
    #[error("{action}: custom parser hook violated payload invariants: {reason}")]
    HookViolation { action: String, reason: String },

    /// Signing or verification could not be performed
    #[error("Signature processing failed: {0}")]
    Signing(String),

    /// Value object refused its input
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Result type for codec operations
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

impl ProtocolError {
    pub fn missing_field(action: &str, field: impl Into<String>) -> Self {
        Self::MissingField {
            action: action.to_string(),
            field: field.into(),
        }
    }

    pub fn invalid_field(action: &str, field: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidField {
            action: action.to_string(),
            field: field.into(),
            reason: reason.to_string(),
        }
    }

    pub fn truncated(field: impl Into<String>, need: usize, remaining: usize) -> Self {
        Self::Truncated {
            field: field.into(),
            need,
            remaining,
        }
    }

    pub fn invalid_frame(reason: impl Into<String>) -> Self {
        Self::InvalidFrame {
            reason: reason.into(),
        }
    }

    /// True for errors caused by the peer's payload rather than local state
    pub fn is_formation_error(&self) -> bool {
        !matches!(self, Self::Signing(_))
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidJson(err.to_string())
    }
}
