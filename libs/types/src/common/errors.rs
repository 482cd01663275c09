//! Validation errors for identifiers and protocol value objects
//!
//! Every constructor in this crate that can refuse its input reports one of
//! these variants, so callers can build descriptive codec errors from them.

use thiserror::Error;

/// Errors that can occur while constructing a validated value object
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Identifier or mandatory string was empty
    #[error("{kind} cannot be empty")]
    Empty { kind: &'static str },

    /// Value exceeds the maximum length allowed on the wire
    #[error("{kind} is {len} characters long, maximum is {max}")]
    TooLong {
        kind: &'static str,
        len: usize,
        max: usize,
    },

    /// Value contains a character that is not allowed for its kind
    #[error("{kind} contains invalid character {ch:?} at position {position}")]
    InvalidCharacter {
        kind: &'static str,
        ch: char,
        position: usize,
    },

    /// Numeric value is not within the allowed range
    #[error("{kind} value {value} is not in allowed range [{min}, {max}]")]
    OutOfRange {
        kind: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// Unknown enumeration literal
    #[error("unknown {kind} '{value}'")]
    UnknownVariant { kind: &'static str, value: String },

    /// Custom validation failure with message
    #[error("Validation failed: {message}")]
    Custom { message: String },
}

impl ValidationError {
    /// Check a string against a maximum length
    pub fn check_len(kind: &'static str, value: &str, max: usize) -> Result<(), Self> {
        let len = value.chars().count();
        if len > max {
            return Err(Self::TooLong { kind, len, max });
        }
        Ok(())
    }

    /// Check a mandatory string is non-empty and within a maximum length
    pub fn check_required(kind: &'static str, value: &str, max: usize) -> Result<(), Self> {
        if value.is_empty() {
            return Err(Self::Empty { kind });
        }
        Self::check_len(kind, value, max)
    }

    /// Create a custom validation error
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
        }
    }
}
