//! Serialization format selector

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire format of a message payload
///
/// Binary is used where a payload embeds raw bytes (file transfer) and
/// base64 inside JSON would be wasteful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    #[default]
    Json,
    Binary,
}

impl SerializationFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SerializationFormat::Json => "json",
            SerializationFormat::Binary => "binary",
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, SerializationFormat::Binary)
    }
}

impl fmt::Display for SerializationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
