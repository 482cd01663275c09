//! # OCPP-J Frames
//!
//! ## Wire Format
//! ```text
//! JSON
//!   CALL        [2, "<id>", "<action>", {payload}]
//!   CALLRESULT  [3, "<id>", {payload}]
//!   CALLERROR   [4, "<id>", "<errorCode>", "<description>", {details}]
//!
//! Binary (little-endian)
//!   [kind:u8][id:len8]
//!     CALL        [action:len8][payload:len64]
//!     CALLRESULT  [payload:len64]
//!     CALLERROR   [errorCode:len8][description:len16][details json:len16]
//! ```
//!
//! A failure-shaped response is always transmitted as a CALLERROR; the
//! mapping between failure kinds and error codes lives on
//! `ResponseResult::error_code` / `ResponseResult::from_call_error`.

use crate::binary::{BinaryReader, BinaryWriter};
use crate::error::{ProtocolError, ProtocolResult};
use crate::hooks::CodecHooks;
use crate::message::{OcppRequest, OcppResponse};
use crate::payload::{encode_request, encode_response, Payload};
use ocpp_types::{ErrorCode, RequestId, ResponseResult, SerializationFormat};
use serde_json::{json, Value};

pub const CALL: u8 = 2;
pub const CALL_RESULT: u8 = 3;
pub const CALL_ERROR: u8 = 4;

/// One OCPP-J message frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Call {
        request_id: RequestId,
        action: String,
        payload: Payload,
    },
    CallResult {
        request_id: RequestId,
        payload: Payload,
    },
    CallError {
        request_id: RequestId,
        error_code: ErrorCode,
        description: String,
        details: Option<Value>,
    },
}

impl Frame {
    /// CALL frame for a typed request
    pub fn call<R: OcppRequest>(request: &R, hooks: &CodecHooks<R>) -> ProtocolResult<Self> {
        Ok(Frame::Call {
            request_id: request.request_id().clone(),
            action: R::action().to_string(),
            payload: encode_request(request, hooks)?,
        })
    }

    /// CALLRESULT, or CALLERROR when the response carries a failure
    pub fn reply<P: OcppResponse>(response: &P, hooks: &CodecHooks<P>) -> ProtocolResult<Self> {
        if response.result().is_ok() {
            Ok(Frame::CallResult {
                request_id: response.request_id().clone(),
                payload: encode_response(response, hooks)?,
            })
        } else {
            Ok(Self::error_for(response.request_id().clone(), response.result()))
        }
    }

    /// CALLERROR describing a failure result
    pub fn error_for(request_id: RequestId, result: &ResponseResult) -> Self {
        Frame::CallError {
            request_id,
            error_code: result.error_code().unwrap_or(ErrorCode::GenericError),
            description: result.description().unwrap_or_default().to_string(),
            details: result.details().cloned(),
        }
    }

    pub fn request_id(&self) -> &RequestId {
        match self {
            Frame::Call { request_id, .. }
            | Frame::CallResult { request_id, .. }
            | Frame::CallError { request_id, .. } => request_id,
        }
    }

    pub fn kind(&self) -> u8 {
        match self {
            Frame::Call { .. } => CALL,
            Frame::CallResult { .. } => CALL_RESULT,
            Frame::CallError { .. } => CALL_ERROR,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Frame::Call { .. })
    }

    pub fn action(&self) -> Option<&str> {
        match self {
            Frame::Call { action, .. } => Some(action),
            _ => None,
        }
    }

    /// Failure result carried by a CALLERROR
    pub fn error_result(&self) -> Option<ResponseResult> {
        match self {
            Frame::CallError {
                error_code,
                description,
                details,
                ..
            } => Some(ResponseResult::from_call_error(
                *error_code,
                description.clone(),
                details.clone(),
            )),
            _ => None,
        }
    }

    pub fn encode(&self, format: SerializationFormat) -> ProtocolResult<Vec<u8>> {
        match format {
            SerializationFormat::Json => self.encode_json(),
            SerializationFormat::Binary => self.encode_binary(),
        }
    }

    pub fn decode(bytes: &[u8], format: SerializationFormat) -> ProtocolResult<Self> {
        match format {
            SerializationFormat::Json => Self::decode_json(bytes),
            SerializationFormat::Binary => Self::decode_binary(bytes),
        }
    }

    fn encode_json(&self) -> ProtocolResult<Vec<u8>> {
        let value = match self {
            Frame::Call {
                request_id,
                action,
                payload,
            } => json!([CALL, request_id.as_str(), action, json_payload(payload)?]),
            Frame::CallResult {
                request_id,
                payload,
            } => json!([CALL_RESULT, request_id.as_str(), json_payload(payload)?]),
            Frame::CallError {
                request_id,
                error_code,
                description,
                details,
            } => json!([
                CALL_ERROR,
                request_id.as_str(),
                error_code.as_str(),
                description,
                details.clone().unwrap_or_else(|| json!({}))
            ]),
        };
        Ok(serde_json::to_vec(&value)?)
    }

    fn decode_json(bytes: &[u8]) -> ProtocolResult<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        let items = value
            .as_array()
            .ok_or_else(|| ProtocolError::invalid_frame("frame must be a JSON array"))?;
        let kind = items
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| ProtocolError::invalid_frame("missing message type number"))?;
        let request_id = items
            .get(1)
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::invalid_frame("missing message id"))
            .and_then(|raw| RequestId::new(raw).map_err(ProtocolError::from))?;

        match (kind, items.len()) {
            (2, 4) => {
                let action = items[2]
                    .as_str()
                    .ok_or_else(|| ProtocolError::invalid_frame("action must be a string"))?;
                Ok(Frame::Call {
                    request_id,
                    action: action.to_string(),
                    payload: Payload::Json(items[3].clone()),
                })
            }
            (3, 3) => Ok(Frame::CallResult {
                request_id,
                payload: Payload::Json(items[2].clone()),
            }),
            (4, 4) | (4, 5) => {
                let raw_code = items[2]
                    .as_str()
                    .ok_or_else(|| ProtocolError::invalid_frame("error code must be a string"))?;
                let description = items[3].as_str().unwrap_or_default().to_string();
                let details = items.get(4).cloned().filter(|d| !d.is_null());
                Ok(call_error(request_id, raw_code, description, details))
            }
            (2..=4, len) => Err(ProtocolError::invalid_frame(format!(
                "message type {} cannot have {} elements",
                kind, len
            ))),
            (kind, _) => Err(ProtocolError::UnknownMessageType { kind }),
        }
    }

    fn encode_binary(&self) -> ProtocolResult<Vec<u8>> {
        let mut w = BinaryWriter::new();
        w.write_u8(self.kind())?;
        w.write_str8("messageId", self.request_id().as_str())?;
        match self {
            Frame::Call {
                action, payload, ..
            } => {
                w.write_str8("action", action)?;
                w.write_bytes64(binary_payload(payload)?)?;
            }
            Frame::CallResult { payload, .. } => {
                w.write_bytes64(binary_payload(payload)?)?;
            }
            Frame::CallError {
                error_code,
                description,
                details,
                ..
            } => {
                w.write_str8("errorCode", error_code.as_str())?;
                w.write_str16("errorDescription", description)?;
                w.write_json16("errorDetails", details.as_ref())?;
            }
        }
        Ok(w.into_bytes())
    }

    fn decode_binary(bytes: &[u8]) -> ProtocolResult<Self> {
        let mut r = BinaryReader::new(bytes);
        let kind = r.read_u8("messageType")?;
        if !(CALL..=CALL_ERROR).contains(&kind) {
            return Err(ProtocolError::UnknownMessageType {
                kind: u64::from(kind),
            });
        }
        let request_id = RequestId::new(r.read_str8("messageId")?)?;
        let frame = match kind {
            CALL => {
                let action = r.read_str8("action")?;
                let payload = Payload::Binary(r.read_bytes64("payload")?);
                Frame::Call {
                    request_id,
                    action,
                    payload,
                }
            }
            CALL_RESULT => Frame::CallResult {
                request_id,
                payload: Payload::Binary(r.read_bytes64("payload")?),
            },
            _ => {
                let raw_code = r.read_str8("errorCode")?;
                let description = r.read_str16("errorDescription")?;
                let details = r.read_json16::<Value>("errorDetails")?;
                call_error(request_id, &raw_code, description, details)
            }
        };
        r.finish()?;
        Ok(frame)
    }
}

fn call_error(
    request_id: RequestId,
    raw_code: &str,
    description: String,
    details: Option<Value>,
) -> Frame {
    match raw_code.parse::<ErrorCode>() {
        Ok(error_code) => Frame::CallError {
            request_id,
            error_code,
            description,
            details,
        },
        Err(_) => Frame::CallError {
            request_id,
            error_code: ErrorCode::GenericError,
            description,
            details: Some(json!({ "originalErrorCode": raw_code, "details": details })),
        },
    }
}

fn json_payload(payload: &Payload) -> ProtocolResult<&Value> {
    payload
        .as_json()
        .ok_or_else(|| ProtocolError::invalid_frame("binary payload cannot be sent in a JSON frame"))
}

fn binary_payload(payload: &Payload) -> ProtocolResult<&[u8]> {
    match payload {
        Payload::Binary(bytes) => Ok(bytes),
        Payload::Json(_) => Err(ProtocolError::invalid_frame(
            "JSON payload cannot be sent in a binary frame",
        )),
    }
}
