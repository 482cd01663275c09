//! # Typed Identifiers
//!
//! Validated newtypes for every identifier that crosses the wire. Two macro
//! families generate them:
//!
//! ### 1. String identifiers (`define_string_id!`)
//! - `RequestId`: OCPP-J message id, unique per logical connection, ≤36 chars
//! - `EventTrackingId`: groups a causal chain of requests for tracing, ≤36 chars
//! - `NetworkingNodeId`: overlay identity of a station, relay or CSMS, ≤48 chars
//!
//! ### 2. Numeric identifiers (`define_numeric_id!`)
//! - `ConnectorId`, `TransactionId`: plain integers with compile-time type safety
//!
//! ## Usage Examples
//!
//! ```rust
//! use ocpp_types::{NetworkingNodeId, RequestId};
//!
//! let id = RequestId::random();
//! let supplied = RequestId::new("42").unwrap();
//! assert_ne!(id, supplied);
//!
//! assert!(NetworkingNodeId::new("cs 001").is_err()); // whitespace
//! ```
//!
//! String identifiers serialize as bare JSON strings and are validated again
//! on deserialization, so a decoded value always satisfies the constructor's
//! invariants.

use crate::common::errors::ValidationError;
use uuid::Uuid;

/// Maximum length of a `RequestId` / `EventTrackingId` on the wire
pub const MAX_REQUEST_ID_LEN: usize = 36;

/// Maximum length of a `NetworkingNodeId`
pub const MAX_NODE_ID_LEN: usize = 48;

/// Generate a validated, immutable string identifier
///
/// The generated type is `Clone + Eq + Hash + Ord`, implements `Display`,
/// `AsRef<str>`, `TryFrom<String>`/`TryFrom<&str>` and serde (validated).
#[macro_export]
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, kind = $kind:literal, max = $max:expr, check = $check:expr
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Create a validated identifier
            pub fn new(value: impl Into<String>) -> Result<Self, $crate::common::errors::ValidationError> {
                let value = value.into();
                $crate::common::errors::ValidationError::check_required($kind, &value, $max)?;
                let check: fn(&str) -> Result<(), $crate::common::errors::ValidationError> = $check;
                check(&value)?;
                Ok(Self(value))
            }

            /// Borrow the identifier as a string slice
            #[inline(always)]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the identifier, returning the inner string
            #[inline(always)]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            #[inline(always)]
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::common::errors::ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::common::errors::ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = $crate::common::errors::ValidationError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::new(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Generate a zero-cost numeric identifier
#[macro_export]
macro_rules! define_numeric_id {
    (
        $(#[$meta:meta])*
        $name:ident, $inner:ty
    ) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Default,
            serde::Serialize,
            serde::Deserialize
        )]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            /// Create a new typed ID
            #[inline(always)]
            pub const fn new(id: $inner) -> Self {
                Self(id)
            }

            /// Extract the inner value
            #[inline(always)]
            pub const fn inner(&self) -> $inner {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            #[inline(always)]
            fn from(inner: $inner) -> Self {
                Self(inner)
            }
        }
    };
}

fn no_extra_rules(_: &str) -> Result<(), ValidationError> {
    Ok(())
}

fn printable_without_whitespace(value: &str) -> Result<(), ValidationError> {
    match value
        .chars()
        .enumerate()
        .find(|(_, c)| !c.is_ascii_graphic())
    {
        Some((position, ch)) => Err(ValidationError::InvalidCharacter {
            kind: "networking node id",
            ch,
            position,
        }),
        None => Ok(()),
    }
}

define_string_id!(
    /// OCPP-J message id correlating a CALL with its CALLRESULT / CALLERROR
    RequestId, kind = "request id", max = MAX_REQUEST_ID_LEN, check = no_extra_rules
);

define_string_id!(
    /// Groups a causal chain of requests and responses for tracing
    EventTrackingId, kind = "event tracking id", max = MAX_REQUEST_ID_LEN, check = no_extra_rules
);

define_string_id!(
    /// Overlay identity of a charging station, networking node or CSMS
    NetworkingNodeId, kind = "networking node id", max = MAX_NODE_ID_LEN, check = printable_without_whitespace
);

impl RequestId {
    /// Generate a random (UUID v4) request id
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl EventTrackingId {
    /// Generate a random (UUID v4) tracking id
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

define_numeric_id!(
    /// EVSE connector number; 0 addresses the whole station
    ConnectorId, u32
);

define_numeric_id!(
    /// Transaction id assigned by the CSMS in a StartTransaction response
    TransactionId, i32
);
