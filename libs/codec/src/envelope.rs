//! # Message Envelopes
//!
//! ## Purpose
//! Common fields shared by every request and every response, composed into
//! each concrete message type rather than inherited.
//!
//! ## Payload vs Context
//! ```text
//! RequestEnvelope
//! ├── carried in the payload:   signatures, customData
//! └── carried by the transport: requestId, timestamp, timeout, eventTrackingId,
//!                               destination, networkPath, origin, format
//! ```
//! Decoding therefore always needs a [`RequestContext`] / [`ResponseContext`]
//! describing the transport metadata the payload does not contain.
//!
//! ## Equality
//! Envelope equality and hashing cover every field except the volatile
//! request/response timestamps.

use chrono::{DateTime, Utc};
use ocpp_types::{
    CustomData, EventTrackingId, NetworkPath, NetworkingNodeId, RequestId, ResponseResult,
    SerializationFormat, Signature, SourceRouting,
};
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Timeout applied when a request does not specify one
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Optional construction parameters, defaulted once by [`RequestEnvelope::new`]
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub request_id: Option<RequestId>,
    pub request_timestamp: Option<DateTime<Utc>>,
    pub request_timeout: Option<Duration>,
    pub event_tracking_id: Option<EventTrackingId>,
    pub origin: Option<NetworkingNodeId>,
    pub network_path: Option<NetworkPath>,
    pub signatures: Option<Vec<Signature>>,
    pub custom_data: Option<CustomData>,
    pub serialization_format: Option<SerializationFormat>,
}

impl RequestOptions {
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_format(mut self, format: SerializationFormat) -> Self {
        self.serialization_format = Some(format);
        self
    }

    pub fn with_custom_data(mut self, custom_data: CustomData) -> Self {
        self.custom_data = Some(custom_data);
        self
    }

    pub fn with_event_tracking_id(mut self, id: EventTrackingId) -> Self {
        self.event_tracking_id = Some(id);
        self
    }

    pub fn with_origin(mut self, origin: NetworkingNodeId) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// Fields shared by every request
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    request_id: RequestId,
    request_timestamp: DateTime<Utc>,
    request_timeout: Duration,
    event_tracking_id: EventTrackingId,
    destination: SourceRouting,
    origin: Option<NetworkingNodeId>,
    network_path: NetworkPath,
    signatures: Vec<Signature>,
    custom_data: Option<CustomData>,
    serialization_format: SerializationFormat,
}

impl RequestEnvelope {
    pub fn new(destination: SourceRouting, options: RequestOptions) -> Self {
        Self {
            request_id: options.request_id.unwrap_or_else(RequestId::random),
            request_timestamp: options.request_timestamp.unwrap_or_else(Utc::now),
            request_timeout: options.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            event_tracking_id: options
                .event_tracking_id
                .unwrap_or_else(EventTrackingId::random),
            destination,
            origin: options.origin,
            network_path: options.network_path.unwrap_or_default(),
            signatures: dedup_signatures(options.signatures.unwrap_or_default()),
            custom_data: options.custom_data,
            serialization_format: options.serialization_format.unwrap_or_default(),
        }
    }

    /// Envelope with every option defaulted
    pub fn to(destination: SourceRouting) -> Self {
        Self::new(destination, RequestOptions::default())
    }

    /// Rebuild an envelope from decoded transport metadata plus payload trailer
    pub fn from_context(
        context: &RequestContext,
        signatures: Vec<Signature>,
        custom_data: Option<CustomData>,
    ) -> Self {
        Self {
            request_id: context.request_id.clone(),
            request_timestamp: context.received_at,
            request_timeout: context.request_timeout,
            event_tracking_id: context.event_tracking_id.clone(),
            destination: context.destination.clone(),
            origin: Some(context.origin.clone()),
            network_path: context.network_path.clone(),
            signatures: dedup_signatures(signatures),
            custom_data,
            serialization_format: context.format,
        }
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn request_timestamp(&self) -> DateTime<Utc> {
        self.request_timestamp
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn event_tracking_id(&self) -> &EventTrackingId {
        &self.event_tracking_id
    }

    pub fn destination(&self) -> &SourceRouting {
        &self.destination
    }

    /// Node that created the request, once known
    pub fn origin(&self) -> Option<&NetworkingNodeId> {
        self.origin.as_ref()
    }

    pub fn network_path(&self) -> &NetworkPath {
        &self.network_path
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    pub fn custom_data(&self) -> Option<&CustomData> {
        self.custom_data.as_ref()
    }

    pub fn serialization_format(&self) -> SerializationFormat {
        self.serialization_format
    }

    /// Copy with `hop` appended to the network path
    #[must_use]
    pub fn with_appended_hop(&self, hop: NetworkingNodeId) -> Self {
        Self {
            network_path: self.network_path.appended(hop),
            ..self.clone()
        }
    }

    /// Copy with the origin stamped; an existing origin is kept
    #[must_use]
    pub fn with_origin(&self, origin: NetworkingNodeId) -> Self {
        Self {
            origin: Some(self.origin.clone().unwrap_or(origin)),
            ..self.clone()
        }
    }

    /// Copy with `signature` added unless already present
    #[must_use]
    pub fn with_signature(&self, signature: Signature) -> Self {
        let mut signatures = self.signatures.clone();
        if !signatures.contains(&signature) {
            signatures.push(signature);
        }
        Self {
            signatures,
            ..self.clone()
        }
    }

    /// Copy without any signatures
    #[must_use]
    pub fn without_signatures(&self) -> Self {
        Self {
            signatures: Vec::new(),
            ..self.clone()
        }
    }

    /// Transport metadata describing this envelope, as a receiver would see it
    pub fn context(&self, origin: NetworkingNodeId) -> RequestContext {
        RequestContext {
            request_id: self.request_id.clone(),
            received_at: self.request_timestamp,
            request_timeout: self.request_timeout,
            event_tracking_id: self.event_tracking_id.clone(),
            destination: self.destination.clone(),
            origin: self.origin.clone().unwrap_or(origin),
            network_path: self.network_path.clone(),
            format: self.serialization_format,
        }
    }

    /// Instant after which no response will be accepted
    pub fn deadline(&self) -> DateTime<Utc> {
        let timeout = chrono::Duration::from_std(self.request_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(i64::from(u32::MAX)));
        self.request_timestamp + timeout
    }
}

impl PartialEq for RequestEnvelope {
    fn eq(&self, other: &Self) -> bool {
        self.request_id == other.request_id
            && self.request_timeout == other.request_timeout
            && self.event_tracking_id == other.event_tracking_id
            && self.destination == other.destination
            && self.origin == other.origin
            && self.network_path == other.network_path
            && self.signatures == other.signatures
            && self.custom_data == other.custom_data
            && self.serialization_format == other.serialization_format
    }
}

impl Eq for RequestEnvelope {}

impl Hash for RequestEnvelope {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.request_id.hash(state);
        self.request_timeout.hash(state);
        self.event_tracking_id.hash(state);
        self.destination.hash(state);
        self.origin.hash(state);
        self.network_path.hash(state);
        self.signatures.hash(state);
        self.custom_data.hash(state);
        self.serialization_format.hash(state);
    }
}

/// Fields shared by every response
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    request_id: RequestId,
    result: ResponseResult,
    response_timestamp: DateTime<Utc>,
    destination: Option<SourceRouting>,
    network_path: NetworkPath,
    signatures: Vec<Signature>,
    custom_data: Option<CustomData>,
    serialization_format: SerializationFormat,
}

impl ResponseEnvelope {
    /// Envelope answering `request` along its reversed network path
    pub fn answering(request: &RequestEnvelope, result: ResponseResult) -> Self {
        Self {
            request_id: request.request_id.clone(),
            result,
            response_timestamp: Utc::now(),
            destination: request
                .origin
                .clone()
                .map(|origin| SourceRouting::reverse_of(&request.network_path, origin)),
            network_path: NetworkPath::empty(),
            signatures: Vec::new(),
            custom_data: None,
            serialization_format: request.serialization_format,
        }
    }

    pub fn from_context(
        context: &ResponseContext,
        result: ResponseResult,
        signatures: Vec<Signature>,
        custom_data: Option<CustomData>,
    ) -> Self {
        Self {
            request_id: context.request_id.clone(),
            result,
            response_timestamp: context.received_at,
            destination: context.destination.clone(),
            network_path: context.network_path.clone(),
            signatures: dedup_signatures(signatures),
            custom_data,
            serialization_format: context.format,
        }
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn result(&self) -> &ResponseResult {
        &self.result
    }

    pub fn response_timestamp(&self) -> DateTime<Utc> {
        self.response_timestamp
    }

    /// Reverse route to the requester; `None` replies over the arrival link
    pub fn destination(&self) -> Option<&SourceRouting> {
        self.destination.as_ref()
    }

    pub fn network_path(&self) -> &NetworkPath {
        &self.network_path
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    pub fn custom_data(&self) -> Option<&CustomData> {
        self.custom_data.as_ref()
    }

    pub fn serialization_format(&self) -> SerializationFormat {
        self.serialization_format
    }

    #[must_use]
    pub fn with_custom_data(&self, custom_data: CustomData) -> Self {
        Self {
            custom_data: Some(custom_data),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_appended_hop(&self, hop: NetworkingNodeId) -> Self {
        Self {
            network_path: self.network_path.appended(hop),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_signature(&self, signature: Signature) -> Self {
        let mut signatures = self.signatures.clone();
        if !signatures.contains(&signature) {
            signatures.push(signature);
        }
        Self {
            signatures,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn without_signatures(&self) -> Self {
        Self {
            signatures: Vec::new(),
            ..self.clone()
        }
    }

    pub fn context(&self) -> ResponseContext {
        ResponseContext {
            request_id: self.request_id.clone(),
            received_at: self.response_timestamp,
            destination: self.destination.clone(),
            network_path: self.network_path.clone(),
            format: self.serialization_format,
        }
    }
}

impl PartialEq for ResponseEnvelope {
    fn eq(&self, other: &Self) -> bool {
        self.request_id == other.request_id
            && self.result == other.result
            && self.destination == other.destination
            && self.network_path == other.network_path
            && self.signatures == other.signatures
            && self.custom_data == other.custom_data
            && self.serialization_format == other.serialization_format
    }
}

impl Eq for ResponseEnvelope {}

impl Hash for ResponseEnvelope {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.request_id.hash(state);
        self.result.hash(state);
        self.destination.hash(state);
        self.network_path.hash(state);
        self.signatures.hash(state);
        self.custom_data.hash(state);
        self.serialization_format.hash(state);
    }
}

/// Transport metadata needed to decode a request payload
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub received_at: DateTime<Utc>,
    pub request_timeout: Duration,
    pub event_tracking_id: EventTrackingId,
    pub destination: SourceRouting,
    /// Node that created the request
    pub origin: NetworkingNodeId,
    pub network_path: NetworkPath,
    pub format: SerializationFormat,
}

/// Transport metadata needed to decode a response payload
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseContext {
    pub request_id: RequestId,
    pub received_at: DateTime<Utc>,
    pub destination: Option<SourceRouting>,
    pub network_path: NetworkPath,
    pub format: SerializationFormat,
}

impl ResponseContext {
    /// Context for a response to `request` received over the transport
    pub fn for_request(request: &RequestEnvelope, network_path: NetworkPath) -> Self {
        Self {
            request_id: request.request_id.clone(),
            received_at: Utc::now(),
            destination: request.origin.clone().map(SourceRouting::To),
            network_path,
            format: request.serialization_format,
        }
    }
}

fn dedup_signatures(signatures: Vec<Signature>) -> Vec<Signature> {
    let mut unique: Vec<Signature> = Vec::with_capacity(signatures.len());
    for signature in signatures {
        if !unique.contains(&signature) {
            unique.push(signature);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(s: &str) -> NetworkingNodeId {
        NetworkingNodeId::new(s).unwrap()
    }

    #[test]
    fn defaults_are_applied_once_at_construction() {
        let envelope = RequestEnvelope::to(SourceRouting::to(node("csms")));
        assert_eq!(envelope.request_timeout(), DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(envelope.serialization_format(), SerializationFormat::Json);
        assert!(envelope.network_path().is_empty());
        assert!(envelope.signatures().is_empty());
        assert!(envelope.origin().is_none());
    }

    #[test]
    fn equality_ignores_timestamps() {
        let mut options = RequestOptions::default().with_request_id(RequestId::new("1").unwrap());
        options.event_tracking_id = Some(EventTrackingId::new("t").unwrap());
        options.request_timestamp = Some(Utc::now());
        let a = RequestEnvelope::new(SourceRouting::to(node("csms")), options.clone());
        options.request_timestamp = Some(Utc::now() + chrono::Duration::seconds(5));
        let b = RequestEnvelope::new(SourceRouting::to(node("csms")), options);
        assert_eq!(a, b);
    }

    #[test]
    fn appending_a_hop_leaves_the_original_untouched() {
        let original = RequestEnvelope::to(SourceRouting::to(node("csms")));
        let forwarded = original.with_appended_hop(node("nn1"));
        assert!(original.network_path().is_empty());
        assert_eq!(forwarded.network_path().hops(), &[node("nn1")]);
        assert_eq!(forwarded.request_id(), original.request_id());
    }

    #[test]
    fn signatures_form_an_ordered_set() {
        let s1 = Signature::new("k1", "a", vec![1]).unwrap();
        let s2 = Signature::new("k2", "a", vec![2]).unwrap();
        let envelope = RequestEnvelope::to(SourceRouting::to(node("csms")))
            .with_signature(s2.clone())
            .with_signature(s1.clone())
            .with_signature(s2.clone());
        assert_eq!(envelope.signatures(), &[s2, s1]);
    }

    #[test]
    fn response_retraces_the_request_path() {
        let request = RequestEnvelope::to(SourceRouting::to(node("csms")))
            .with_origin(node("cs1"))
            .with_appended_hop(node("nn1"))
            .with_appended_hop(node("nn2"));
        let response = ResponseEnvelope::answering(&request, ResponseResult::Ok);
        let destination = response.destination().unwrap();
        assert_eq!(destination.relays(), &[node("nn2"), node("nn1")]);
        assert!(destination.is_for(&node("cs1")));
        assert_eq!(response.request_id(), request.request_id());
    }
}
