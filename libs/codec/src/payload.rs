//! # Payload Codec
//!
//! ## Purpose
//! Converts typed requests/responses to and from their payload in the
//! format named by the envelope.
//!
//! ## Decoding Rules
//! 1. a mandatory field that is absent or mistyped fails with a descriptive error
//! 2. absent optional fields default
//! 3. unknown members are ignored
//! 4. a custom parser hook may rewrite the result, which is then validated again
//!
//! ```text
//! JSON:   { payload fields..., "signatures": [...]?, "customData": {...}? }
//! Binary: [payload fields in fixed order][signatures][customData]
//! ```

use crate::binary::{read_envelope_trailer, write_envelope_trailer, BinaryReader, BinaryWriter};
use crate::envelope::{RequestContext, RequestEnvelope, ResponseContext, ResponseEnvelope};
use crate::error::{ProtocolError, ProtocolResult};
use crate::hooks::CodecHooks;
use crate::json::{JsonReader, JsonWriter};
use crate::message::{OcppRequest, OcppResponse};
use ocpp_types::{ResponseResult, SerializationFormat, Signature};
use serde_json::Value;
use tracing::{debug, warn};

/// Encoded payload as embedded in a frame
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Binary(Vec<u8>),
}

impl Payload {
    pub fn format(&self) -> SerializationFormat {
        match self {
            Payload::Json(_) => SerializationFormat::Json,
            Payload::Binary(_) => SerializationFormat::Binary,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Binary(_) => None,
        }
    }

    /// Signatures of a JSON payload, read without typed decoding
    pub fn json_signatures(&self) -> ProtocolResult<Vec<Signature>> {
        match self.as_json() {
            Some(value) => JsonReader::from_value("payload", value)?.optional_array("signatures"),
            None => Ok(Vec::new()),
        }
    }
}

/// JSON object for a request, hooks applied
pub fn request_to_json<R: OcppRequest>(request: &R, hooks: &CodecHooks<R>) -> Value {
    let mut w = JsonWriter::new();
    request.write_json(&mut w);
    let envelope = request.envelope();
    w.put_array("signatures", envelope.signatures())
        .put_object("customData", envelope.custom_data());
    hooks.serialize(request, w.into_value())
}

/// Encode a request in its envelope's serialization format
pub fn encode_request<R: OcppRequest>(request: &R, hooks: &CodecHooks<R>) -> ProtocolResult<Payload> {
    request.validate()?;
    match request.envelope().serialization_format() {
        SerializationFormat::Json => Ok(Payload::Json(request_to_json(request, hooks))),
        SerializationFormat::Binary => {
            let mut w = BinaryWriter::with_capacity(256);
            request.write_binary(&mut w)?;
            let envelope = request.envelope();
            write_envelope_trailer(&mut w, envelope.signatures(), envelope.custom_data())?;
            Ok(Payload::Binary(w.into_bytes()))
        }
    }
}

/// Decode a request payload using transport metadata from `context`
pub fn decode_request<R: OcppRequest>(
    payload: &Payload,
    context: &RequestContext,
    hooks: &CodecHooks<R>,
) -> ProtocolResult<R> {
    let request = match payload {
        Payload::Json(value) => {
            let reader = JsonReader::from_value(R::action(), value)?;
            let signatures = reader.optional_array("signatures")?;
            let custom_data = reader.optional_object("customData")?;
            let envelope = RequestEnvelope::from_context(context, signatures, custom_data);
            let parsed = R::read_json(&reader, envelope)?;
            parsed.validate()?;
            if !hooks.has_parser() {
                return Ok(parsed);
            }
            debug!(action = R::action(), "Applying custom parser hook");
            let request_id = parsed.request_id().clone();
            let rewritten = hooks.parse(value, parsed);
            if rewritten.request_id() != &request_id {
                return Err(hook_violation(R::action(), "request id was changed"));
            }
            rewritten
                .validate()
                .map_err(|e| hook_violation(R::action(), e.to_string()))?;
            rewritten
        }
        Payload::Binary(bytes) => {
            let mut r = BinaryReader::new(bytes);
            let bare = RequestEnvelope::from_context(context, Vec::new(), None);
            let parsed = R::read_binary(&mut r, bare)?;
            let (signatures, custom_data) = read_envelope_trailer(&mut r)?;
            r.finish()?;
            let request =
                parsed.with_envelope(RequestEnvelope::from_context(context, signatures, custom_data));
            request.validate()?;
            request
        }
    };
    Ok(request)
}

/// JSON object for a successful response, hooks applied
pub fn response_to_json<P: OcppResponse>(response: &P, hooks: &CodecHooks<P>) -> Value {
    let mut w = JsonWriter::new();
    response.write_json(&mut w);
    let envelope = response.envelope();
    w.put_array("signatures", envelope.signatures())
        .put_object("customData", envelope.custom_data());
    hooks.serialize(response, w.into_value())
}

/// Encode a successful response payload
///
/// Failure results are not payloads; they travel as CALLERROR frames.
pub fn encode_response<P: OcppResponse>(response: &P, hooks: &CodecHooks<P>) -> ProtocolResult<Payload> {
    if !response.result().is_ok() {
        return Err(ProtocolError::invalid_frame(format!(
            "{} response carries {} and must be sent as a CALLERROR",
            P::action(),
            response.result().kind()
        )));
    }
    response.validate()?;
    match response.envelope().serialization_format() {
        SerializationFormat::Json => Ok(Payload::Json(response_to_json(response, hooks))),
        SerializationFormat::Binary => {
            let mut w = BinaryWriter::with_capacity(256);
            response.write_binary(&mut w)?;
            let envelope = response.envelope();
            write_envelope_trailer(&mut w, envelope.signatures(), envelope.custom_data())?;
            Ok(Payload::Binary(w.into_bytes()))
        }
    }
}

/// Decode a CALLRESULT payload
pub fn decode_response<P: OcppResponse>(
    payload: &Payload,
    context: &ResponseContext,
    hooks: &CodecHooks<P>,
) -> ProtocolResult<P> {
    let response = match payload {
        Payload::Json(value) => {
            let reader = JsonReader::from_value(P::action(), value)?;
            let signatures = reader.optional_array("signatures")?;
            let custom_data = reader.optional_object("customData")?;
            let envelope =
                ResponseEnvelope::from_context(context, ResponseResult::Ok, signatures, custom_data);
            let parsed = P::read_json(&reader, envelope)?;
            parsed.validate()?;
            if !hooks.has_parser() {
                return Ok(parsed);
            }
            debug!(action = P::action(), "Applying custom parser hook");
            let request_id = parsed.request_id().clone();
            let rewritten = hooks.parse(value, parsed);
            if rewritten.request_id() != &request_id {
                return Err(hook_violation(P::action(), "request id was changed"));
            }
            rewritten
                .validate()
                .map_err(|e| hook_violation(P::action(), e.to_string()))?;
            rewritten
        }
        Payload::Binary(bytes) => {
            let mut r = BinaryReader::new(bytes);
            let bare = ResponseEnvelope::from_context(context, ResponseResult::Ok, Vec::new(), None);
            let parsed = P::read_binary(&mut r, bare)?;
            let (signatures, custom_data) = read_envelope_trailer(&mut r)?;
            r.finish()?;
            let response = parsed.with_envelope(ResponseEnvelope::from_context(
                context,
                ResponseResult::Ok,
                signatures,
                custom_data,
            ));
            response.validate()?;
            response
        }
    };
    Ok(response)
}

/// Failure-shaped response for a received CALLERROR
pub fn response_from_failure<P: OcppResponse>(
    request: &P::Request,
    context: &ResponseContext,
    result: ResponseResult,
) -> P {
    let envelope = ResponseEnvelope::from_context(context, result.clone(), Vec::new(), None);
    P::from_failure(request, result).with_envelope(envelope)
}

fn hook_violation(action: &str, reason: impl Into<String>) -> ProtocolError {
    let reason = reason.into();
    warn!(action, %reason, "Custom parser hook rejected");
    ProtocolError::HookViolation {
        action: action.to_string(),
        reason,
    }
}
