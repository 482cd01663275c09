//! # Response Result Taxonomy
//!
//! Every response carries exactly one `ResponseResult`. The failure kinds
//! can all be produced without a decodable payload, which is what lets a
//! codec, correlator or relay report a problem on behalf of a request it
//! could not process.
//!
//! ## CALLERROR Mapping
//! ```text
//! RequestError{code}     <->  code (any ErrorCode)
//! FormationViolation     <->  FormationViolation / FormatViolation
//! SignatureError         <->  SecurityError
//! Failed                 <->  GenericError
//! ExceptionOccurred      <->  InternalError
//! ```

use crate::common::errors::ValidationError;
use serde_json::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// OCPP-J RPC framework error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    FormatViolation,
    FormationViolation,
    GenericError,
    InternalError,
    MessageTypeNotSupported,
    NotImplemented,
    NotSupported,
    OccurrenceConstraintViolation,
    PropertyConstraintViolation,
    ProtocolError,
    RpcFrameworkError,
    SecurityError,
    TypeConstraintViolation,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 13] = [
        ErrorCode::FormatViolation,
        ErrorCode::FormationViolation,
        ErrorCode::GenericError,
        ErrorCode::InternalError,
        ErrorCode::MessageTypeNotSupported,
        ErrorCode::NotImplemented,
        ErrorCode::NotSupported,
        ErrorCode::OccurrenceConstraintViolation,
        ErrorCode::PropertyConstraintViolation,
        ErrorCode::ProtocolError,
        ErrorCode::RpcFrameworkError,
        ErrorCode::SecurityError,
        ErrorCode::TypeConstraintViolation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::FormatViolation => "FormatViolation",
            ErrorCode::FormationViolation => "FormationViolation",
            ErrorCode::GenericError => "GenericError",
            ErrorCode::InternalError => "InternalError",
            ErrorCode::MessageTypeNotSupported => "MessageTypeNotSupported",
            ErrorCode::NotImplemented => "NotImplemented",
            ErrorCode::NotSupported => "NotSupported",
            ErrorCode::OccurrenceConstraintViolation => "OccurrenceConstraintViolation",
            ErrorCode::PropertyConstraintViolation => "PropertyConstraintViolation",
            ErrorCode::ProtocolError => "ProtocolError",
            ErrorCode::RpcFrameworkError => "RpcFrameworkError",
            ErrorCode::SecurityError => "SecurityError",
            ErrorCode::TypeConstraintViolation => "TypeConstraintViolation",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCode::ALL
            .iter()
            .copied()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownVariant {
                kind: "error code",
                value: s.to_string(),
            })
    }
}

/// Outcome carried by every response
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResponseResult {
    #[default]
    Ok,
    /// Structured error raised before or during processing
    RequestError {
        error_code: ErrorCode,
        description: String,
        details: Option<Value>,
    },
    /// Payload failed structural validation
    FormationViolation { description: String },
    /// Required signature missing or invalid
    SignatureError { description: String },
    /// Generic processing failure
    Failed { description: Option<String> },
    /// Unexpected fault caught while processing
    ExceptionOccurred { description: String },
}

impl ResponseResult {
    pub fn request_error(error_code: ErrorCode, description: impl Into<String>) -> Self {
        ResponseResult::RequestError {
            error_code,
            description: description.into(),
            details: None,
        }
    }

    pub fn formation_violation(description: impl Into<String>) -> Self {
        ResponseResult::FormationViolation {
            description: description.into(),
        }
    }

    pub fn signature_error(description: impl Into<String>) -> Self {
        ResponseResult::SignatureError {
            description: description.into(),
        }
    }

    pub fn failed(description: Option<String>) -> Self {
        ResponseResult::Failed { description }
    }

    pub fn exception_occurred(description: impl Into<String>) -> Self {
        ResponseResult::ExceptionOccurred {
            description: description.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ResponseResult::Ok)
    }

    /// Short kind name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ResponseResult::Ok => "Ok",
            ResponseResult::RequestError { .. } => "RequestError",
            ResponseResult::FormationViolation { .. } => "FormationViolation",
            ResponseResult::SignatureError { .. } => "SignatureError",
            ResponseResult::Failed { .. } => "Failed",
            ResponseResult::ExceptionOccurred { .. } => "ExceptionOccurred",
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            ResponseResult::Ok => None,
            ResponseResult::RequestError { description, .. }
            | ResponseResult::FormationViolation { description }
            | ResponseResult::SignatureError { description }
            | ResponseResult::ExceptionOccurred { description } => Some(description),
            ResponseResult::Failed { description } => description.as_deref(),
        }
    }

    /// CALLERROR code used to transmit this failure; `None` for `Ok`
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            ResponseResult::Ok => None,
            ResponseResult::RequestError { error_code, .. } => Some(*error_code),
            ResponseResult::FormationViolation { .. } => Some(ErrorCode::FormationViolation),
            ResponseResult::SignatureError { .. } => Some(ErrorCode::SecurityError),
            ResponseResult::Failed { .. } => Some(ErrorCode::GenericError),
            ResponseResult::ExceptionOccurred { .. } => Some(ErrorCode::InternalError),
        }
    }

    pub fn details(&self) -> Option<&Value> {
        match self {
            ResponseResult::RequestError { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    /// Rebuild a failure from a received CALLERROR
    pub fn from_call_error(
        error_code: ErrorCode,
        description: String,
        details: Option<Value>,
    ) -> Self {
        let details = details.filter(|d| !is_empty_details(d));
        match error_code {
            ErrorCode::FormationViolation | ErrorCode::FormatViolation if details.is_none() => {
                ResponseResult::FormationViolation { description }
            }
            ErrorCode::SecurityError if details.is_none() => {
                ResponseResult::SignatureError { description }
            }
            ErrorCode::GenericError if details.is_none() => ResponseResult::Failed {
                description: Some(description).filter(|d| !d.is_empty()),
            },
            ErrorCode::InternalError if details.is_none() => {
                ResponseResult::ExceptionOccurred { description }
            }
            _ => ResponseResult::RequestError {
                error_code,
                description,
                details,
            },
        }
    }
}

fn is_empty_details(details: &Value) -> bool {
    match details {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

impl Hash for ResponseResult {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        self.error_code().hash(state);
        self.description().hash(state);
        self.details().map(|d| d.to_string()).hash(state);
    }
}

impl fmt::Display for ResponseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(description) => write!(f, "{}: {}", self.kind(), description),
            None => f.write_str(self.kind()),
        }
    }
}
