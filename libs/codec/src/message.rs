//! # Message Traits
//!
//! ## Purpose
//! The small closed set of traits every concrete message type implements:
//! identify its action, expose its envelope, read and write its payload in
//! both formats, and (for responses) build failure-shaped answers from a
//! request that could not be processed.
//!
//! ## Architecture Role
//! ```text
//!                ┌──────────────┐   type Response   ┌───────────────┐
//!                │ OcppRequest  │──────────────────►│ OcppResponse  │
//!                │  envelope()  │◄──────────────────│  envelope()   │
//!                └──────┬───────┘   type Request    └───────┬───────┘
//!                       │ StructuralHash                    │
//!                       ▼                                   ▼
//!          payload codec (crate::payload)      frame codec (crate::frame)
//! ```
//!
//! ## Equality
//! Messages are immutable once constructed; `define_message!` caches a
//! structural hash over the action, the envelope and every payload field.
//! Equality first compares cached hashes, so unequal messages are usually
//! told apart in O(1) after the first computation.

use crate::binary::{BinaryReader, BinaryWriter};
use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::error::ProtocolResult;
use crate::json::{JsonReader, JsonWriter};
use ocpp_types::{ErrorCode, RequestId, ResponseResult};
use serde_json::Value;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

/// Lazily computed, then immutable, structural hash
#[derive(Debug, Clone, Default)]
pub struct HashCache(OnceLock<u64>);

impl HashCache {
    pub fn get_or_compute(&self, compute: impl FnOnce() -> u64) -> u64 {
        *self.0.get_or_init(compute)
    }
}

/// Stable content hash of an immutable message
pub trait StructuralHash {
    fn structural_hash(&self) -> u64;
}

/// JSON value usable as a hashed payload field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonData(pub Value);

impl JsonData {
    /// Optional JSON field; `null` counts as absent
    pub fn present(value: Option<Value>) -> Option<Self> {
        value.filter(|value| !value.is_null()).map(JsonData)
    }
}

impl Hash for JsonData {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_string().hash(state);
    }
}

/// A request message
pub trait OcppRequest: StructuralHash + Clone + Debug + Eq + Send + Sync + 'static {
    type Response: OcppResponse<Request = Self>;

    /// Canonical action name, derived from the type name
    fn action() -> &'static str;

    fn envelope(&self) -> &RequestEnvelope;

    /// Same payload under a new envelope
    fn with_envelope(self, envelope: RequestEnvelope) -> Self;

    /// Check mandatory-field invariants beyond what decoding enforces
    fn validate(&self) -> ProtocolResult<()> {
        Ok(())
    }

    fn write_json(&self, w: &mut JsonWriter);

    fn read_json(r: &JsonReader<'_>, envelope: RequestEnvelope) -> ProtocolResult<Self>;

    fn write_binary(&self, w: &mut BinaryWriter) -> ProtocolResult<()>;

    fn read_binary(r: &mut BinaryReader<'_>, envelope: RequestEnvelope) -> ProtocolResult<Self>;

    fn request_id(&self) -> &RequestId {
        self.envelope().request_id()
    }
}

/// A response message
pub trait OcppResponse: StructuralHash + Clone + Debug + Eq + Send + Sync + 'static {
    type Request: OcppRequest<Response = Self>;

    fn action() -> &'static str;

    fn envelope(&self) -> &ResponseEnvelope;

    fn with_envelope(self, envelope: ResponseEnvelope) -> Self;

    fn validate(&self) -> ProtocolResult<()> {
        Ok(())
    }

    fn write_json(&self, w: &mut JsonWriter);

    fn read_json(r: &JsonReader<'_>, envelope: ResponseEnvelope) -> ProtocolResult<Self>;

    fn write_binary(&self, w: &mut BinaryWriter) -> ProtocolResult<()>;

    fn read_binary(r: &mut BinaryReader<'_>, envelope: ResponseEnvelope) -> ProtocolResult<Self>;

    /// Response carrying `result`, payload set to the action's failure shape
    fn from_failure(request: &Self::Request, result: ResponseResult) -> Self;

    /// Successful response with the action's standard "rejected" status
    fn rejected(request: &Self::Request) -> Self;

    fn result(&self) -> &ResponseResult {
        self.envelope().result()
    }

    fn request_id(&self) -> &RequestId {
        self.envelope().request_id()
    }

    fn request_error(request: &Self::Request, error_code: ErrorCode, description: &str) -> Self {
        Self::from_failure(request, ResponseResult::request_error(error_code, description))
    }

    fn formation_violation(request: &Self::Request, description: &str) -> Self {
        Self::from_failure(request, ResponseResult::formation_violation(description))
    }

    fn signature_error(request: &Self::Request, description: &str) -> Self {
        Self::from_failure(request, ResponseResult::signature_error(description))
    }

    fn failed(request: &Self::Request, description: Option<String>) -> Self {
        Self::from_failure(request, ResponseResult::failed(description))
    }

    fn exception_occurred(request: &Self::Request, description: &str) -> Self {
        Self::from_failure(request, ResponseResult::exception_occurred(description))
    }
}

/// Generate an immutable message struct with cached structural hash
///
/// Produces the struct (envelope + payload fields + hash cache), a raw
/// constructor, borrowing getters, `StructuralHash`, `PartialEq`/`Eq`/`Hash`
/// and an envelope replacement helper.
///
/// ```rust,ignore
/// define_message! {
///     /// Request a file from the peer
///     GetFileRequest: RequestEnvelope {
///         file_name: String,
///         priority: Option<u8>,
///     }
/// }
/// ```
#[macro_export]
macro_rules! define_message {
    (
        $(#[$meta:meta])*
        $name:ident: $envelope:ty {
            $($(#[$field_meta:meta])* $field:ident: $field_ty:ty),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            envelope: $envelope,
            $($field: $field_ty,)*
            hash: $crate::message::HashCache,
        }

        impl $name {
            /// Assemble from an envelope and already-validated fields
            #[allow(clippy::too_many_arguments)]
            pub fn from_parts(envelope: $envelope, $($field: $field_ty),*) -> Self {
                Self {
                    envelope,
                    $($field,)*
                    hash: $crate::message::HashCache::default(),
                }
            }

            $(
                $(#[$field_meta])*
                pub fn $field(&self) -> &$field_ty {
                    &self.$field
                }
            )*

            fn replace_envelope(self, envelope: $envelope) -> Self {
                Self {
                    envelope,
                    hash: $crate::message::HashCache::default(),
                    ..self
                }
            }
        }

        impl $crate::message::StructuralHash for $name {
            fn structural_hash(&self) -> u64 {
                self.hash.get_or_compute(|| {
                    use std::hash::{Hash, Hasher};
                    let mut hasher = std::collections::hash_map::DefaultHasher::new();
                    stringify!($name).hash(&mut hasher);
                    self.envelope.hash(&mut hasher);
                    $(self.$field.hash(&mut hasher);)*
                    hasher.finish()
                })
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                use $crate::message::StructuralHash;
                self.structural_hash() == other.structural_hash()
                    && self.envelope == other.envelope
                    $(&& self.$field == other.$field)*
            }
        }

        impl Eq for $name {}

        impl std::hash::Hash for $name {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                use $crate::message::StructuralHash;
                state.write_u64(self.structural_hash());
            }
        }
    };
}

/// Generate a closed status enumeration with string and byte encodings
///
/// The first listed variant is the enum's `Default`.
#[macro_export]
macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $first:ident = $first_code:literal $(, $variant:ident = $code:literal)* $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub enum $name {
            #[default]
            $first,
            $($variant,)*
        }

        impl $name {
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $name::$first => stringify!($first),
                    $($name::$variant => stringify!($variant),)*
                }
            }

            pub const fn as_u8(&self) -> u8 {
                match self {
                    $name::$first => $first_code,
                    $($name::$variant => $code,)*
                }
            }

            pub fn from_u8(value: u8) -> Result<Self, ocpp_types::ValidationError> {
                match value {
                    $first_code => Ok($name::$first),
                    $($code => Ok($name::$variant),)*
                    other => Err(ocpp_types::ValidationError::UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ocpp_types::ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    stringify!($first) => Ok($name::$first),
                    $(stringify!($variant) => Ok($name::$variant),)*
                    other => Err(ocpp_types::ValidationError::UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}
