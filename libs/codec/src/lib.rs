//! # OCPP Codec
//!
//! ## Purpose
//!
//! The "rules" layer of the exchange engine: how typed OCPP messages map to
//! payloads and frames in either serialization format.
//! - Request/response envelopes and the transport contexts they are rebuilt from
//! - `OcppRequest` / `OcppResponse` traits and the `define_message!` generator
//! - JSON and compact binary payload codecs with custom hooks
//! - OCPP-J frame codec (CALL / CALLRESULT / CALLERROR)
//! - Signing and verification seams
//! - A representative message set (`messages`)
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → libs/network → relay-core / networking node
//!     ↑           ↓
//! Identifiers  Envelopes, payloads,
//! Routing      frames, signatures
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Correlation of requests with responses (belongs in network/)
//! - Routing decisions (belongs in relay-core)
//! - Transports or sockets

pub mod action;
pub mod binary;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod hooks;
pub mod json;
pub mod message;
pub mod messages;
pub mod payload;
pub mod signing;

pub use action::derive_action;
pub use binary::{BinaryReader, BinaryWriter};
pub use envelope::{
    RequestContext, RequestEnvelope, RequestOptions, ResponseContext, ResponseEnvelope,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use error::{ProtocolError, ProtocolResult};
pub use frame::Frame;
pub use hooks::CodecHooks;
pub use json::{JsonReader, JsonWriter};
pub use message::{JsonData, OcppRequest, OcppResponse, StructuralHash};
pub use payload::{
    decode_request, decode_response, encode_request, encode_response, request_to_json,
    response_from_failure, response_to_json, Payload,
};
pub use signing::{
    canonical_bytes, sign_request, sign_response, verify_request, verify_response, KeyedDigestSigner,
    KeyedDigestVerifier, MessageSigner, SignatureVerifier, VerificationOutcome,
};

// Value types every user of the codec needs
pub use ocpp_types::{
    ErrorCode, NetworkPath, NetworkingNodeId, RequestId, ResponseResult, SerializationFormat,
    Signature, SourceRouting,
};
