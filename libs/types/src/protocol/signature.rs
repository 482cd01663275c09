//! Cryptographic signature value object
//!
//! Produced by an external signer and attached to a message; the engine only
//! carries, compares and strips signatures. Raw bytes are base64 in JSON.

use crate::common::errors::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a signing key id
pub const MAX_KEY_ID_LEN: usize = 255;

/// Maximum length of an algorithm name
pub const MAX_ALGORITHM_LEN: usize = 50;

/// Signature over selected fields of a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    key_id: String,
    algorithm: String,
    #[serde(with = "base64_bytes")]
    value: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    signed_fields: Vec<String>,
}

impl Signature {
    pub fn new(
        key_id: impl Into<String>,
        algorithm: impl Into<String>,
        value: Vec<u8>,
    ) -> Result<Self, ValidationError> {
        let key_id = key_id.into();
        let algorithm = algorithm.into();
        ValidationError::check_required("signature key id", &key_id, MAX_KEY_ID_LEN)?;
        ValidationError::check_required("signature algorithm", &algorithm, MAX_ALGORITHM_LEN)?;
        if value.is_empty() {
            return Err(ValidationError::Empty {
                kind: "signature value",
            });
        }
        Ok(Self {
            key_id,
            algorithm,
            value,
            signed_fields: Vec::new(),
        })
    }

    /// Restrict the signature to the named payload fields
    #[must_use]
    pub fn with_signed_fields(mut self, fields: Vec<String>) -> Self {
        self.signed_fields = fields;
        self
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Field names covered; empty means the whole payload
    pub fn signed_fields(&self) -> &[String] {
        &self.signed_fields
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = &self.value[..self.value.len().min(8)];
        write!(
            f,
            "{}/{} 0x{}..",
            self.key_id,
            self.algorithm,
            hex::encode(prefix)
        )
    }
}

/// serde adapter encoding `Vec<u8>` as a standard base64 string
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
