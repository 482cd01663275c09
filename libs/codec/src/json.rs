//! JSON payload access helpers
//!
//! `JsonReader` is strict about mandatory fields and types and silent about
//! everything else: absent optional fields default, unknown members are
//! never looked at. `JsonWriter` omits absent optional fields instead of
//! emitting `null`.

use crate::error::{ProtocolError, ProtocolResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::str::FromStr;

/// Read-only view over a JSON payload object
#[derive(Debug, Clone, Copy)]
pub struct JsonReader<'a> {
    action: &'a str,
    object: &'a Map<String, Value>,
}

impl<'a> JsonReader<'a> {
    pub fn new(action: &'a str, object: &'a Map<String, Value>) -> Self {
        Self { action, object }
    }

    /// Parse a payload value, which must be a JSON object
    pub fn from_value(action: &'a str, value: &'a Value) -> ProtocolResult<Self> {
        match value {
            Value::Object(object) => Ok(Self::new(action, object)),
            other => Err(ProtocolError::invalid_field(
                action,
                "payload",
                format!("expected a JSON object, got {}", json_type(other)),
            )),
        }
    }

    pub fn action(&self) -> &'a str {
        self.action
    }

    /// Present and not null
    fn lookup(&self, field: &str) -> Option<&'a Value> {
        self.object.get(field).filter(|v| !v.is_null())
    }

    fn required(&self, field: &str) -> ProtocolResult<&'a Value> {
        self.lookup(field)
            .ok_or_else(|| ProtocolError::missing_field(self.action, field))
    }

    fn invalid(&self, field: &str, reason: impl ToString) -> ProtocolError {
        ProtocolError::invalid_field(self.action, field, reason)
    }

    fn as_str(&self, field: &str, value: &'a Value) -> ProtocolResult<&'a str> {
        value
            .as_str()
            .ok_or_else(|| self.invalid(field, format!("expected string, got {}", json_type(value))))
    }

    pub fn required_str(&self, field: &str, max_len: usize) -> ProtocolResult<String> {
        let value = self.as_str(field, self.required(field)?)?;
        self.check_len(field, value, max_len)?;
        Ok(value.to_string())
    }

    pub fn optional_str(&self, field: &str, max_len: usize) -> ProtocolResult<Option<String>> {
        match self.lookup(field) {
            Some(value) => {
                let value = self.as_str(field, value)?;
                self.check_len(field, value, max_len)?;
                Ok(Some(value.to_string()))
            }
            None => Ok(None),
        }
    }

    fn check_len(&self, field: &str, value: &str, max_len: usize) -> ProtocolResult<()> {
        let len = value.chars().count();
        if len > max_len {
            return Err(self.invalid(field, format!("length {} exceeds {}", len, max_len)));
        }
        Ok(())
    }

    fn as_i64(&self, field: &str, value: &Value) -> ProtocolResult<i64> {
        value
            .as_i64()
            .ok_or_else(|| self.invalid(field, format!("expected integer, got {}", json_type(value))))
    }

    pub fn required_i64(&self, field: &str) -> ProtocolResult<i64> {
        let value = self.required(field)?;
        self.as_i64(field, value)
    }

    pub fn optional_i64(&self, field: &str) -> ProtocolResult<Option<i64>> {
        self.lookup(field)
            .map(|value| self.as_i64(field, value))
            .transpose()
    }

    /// Integer field checked against the target integer type's range
    pub fn required_int<T: TryFrom<i64>>(&self, field: &str) -> ProtocolResult<T> {
        let raw = self.required_i64(field)?;
        T::try_from(raw).map_err(|_| self.invalid(field, format!("{} is out of range", raw)))
    }

    pub fn optional_int<T: TryFrom<i64>>(&self, field: &str) -> ProtocolResult<Option<T>> {
        match self.optional_i64(field)? {
            Some(raw) => T::try_from(raw)
                .map(Some)
                .map_err(|_| self.invalid(field, format!("{} is out of range", raw))),
            None => Ok(None),
        }
    }

    pub fn optional_bool(&self, field: &str) -> ProtocolResult<Option<bool>> {
        self.lookup(field)
            .map(|value| {
                value.as_bool().ok_or_else(|| {
                    self.invalid(field, format!("expected boolean, got {}", json_type(value)))
                })
            })
            .transpose()
    }

    /// Enumeration literal parsed with `FromStr`
    pub fn required_enum<T: FromStr>(&self, field: &str) -> ProtocolResult<T>
    where
        T::Err: std::fmt::Display,
    {
        let raw = self.as_str(field, self.required(field)?)?;
        raw.parse().map_err(|e: T::Err| self.invalid(field, e))
    }

    pub fn optional_enum<T: FromStr>(&self, field: &str) -> ProtocolResult<Option<T>>
    where
        T::Err: std::fmt::Display,
    {
        match self.lookup(field) {
            Some(value) => {
                let raw = self.as_str(field, value)?;
                raw.parse().map(Some).map_err(|e: T::Err| self.invalid(field, e))
            }
            None => Ok(None),
        }
    }

    pub fn required_bytes(&self, field: &str) -> ProtocolResult<Vec<u8>> {
        let raw = self.as_str(field, self.required(field)?)?;
        STANDARD
            .decode(raw.as_bytes())
            .map_err(|e| self.invalid(field, e))
    }

    pub fn optional_bytes(&self, field: &str) -> ProtocolResult<Option<Vec<u8>>> {
        match self.lookup(field) {
            Some(value) => {
                let raw = self.as_str(field, value)?;
                STANDARD
                    .decode(raw.as_bytes())
                    .map(Some)
                    .map_err(|e| self.invalid(field, e))
            }
            None => Ok(None),
        }
    }

    pub fn required_timestamp(&self, field: &str) -> ProtocolResult<DateTime<Utc>> {
        let raw = self.as_str(field, self.required(field)?)?;
        DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| self.invalid(field, e))
    }

    /// Nested object decoded through serde
    pub fn required_object<T: DeserializeOwned>(&self, field: &str) -> ProtocolResult<T> {
        let value = self.required(field)?;
        serde_json::from_value(value.clone()).map_err(|e| self.invalid(field, e))
    }

    pub fn optional_object<T: DeserializeOwned>(&self, field: &str) -> ProtocolResult<Option<T>> {
        self.lookup(field)
            .map(|value| serde_json::from_value(value.clone()).map_err(|e| self.invalid(field, e)))
            .transpose()
    }

    /// Raw JSON value, any type
    pub fn optional_value(&self, field: &str) -> Option<Value> {
        self.lookup(field).cloned()
    }

    /// Array of nested objects; absent means empty
    pub fn optional_array<T: DeserializeOwned>(&self, field: &str) -> ProtocolResult<Vec<T>> {
        match self.lookup(field) {
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(idx, item)| {
                    serde_json::from_value(item.clone())
                        .map_err(|e| self.invalid(&format!("{}[{}]", field, idx), e))
                })
                .collect(),
            Some(other) => Err(self.invalid(field, format!("expected array, got {}", json_type(other)))),
            None => Ok(Vec::new()),
        }
    }
}

/// Builder for a JSON payload object
#[derive(Debug, Default)]
pub struct JsonWriter {
    object: Map<String, Value>,
}

impl JsonWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.object.insert(field.to_string(), value.into());
        self
    }

    /// Omitted when absent or `null`
    pub fn put_opt<T: Into<Value>>(&mut self, field: &str, value: Option<T>) -> &mut Self {
        match value.map(Into::into) {
            Some(Value::Null) | None => {}
            Some(value) => {
                self.object.insert(field.to_string(), value);
            }
        }
        self
    }

    pub fn put_bytes(&mut self, field: &str, bytes: &[u8]) -> &mut Self {
        self.put(field, STANDARD.encode(bytes))
    }

    pub fn put_opt_bytes(&mut self, field: &str, bytes: Option<&[u8]>) -> &mut Self {
        if let Some(bytes) = bytes {
            self.put_bytes(field, bytes);
        }
        self
    }

    pub fn put_timestamp(&mut self, field: &str, ts: &DateTime<Utc>) -> &mut Self {
        self.put(field, ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
    }

    /// Serde-serialisable nested value; `None` is omitted
    pub fn put_object<T: Serialize>(&mut self, field: &str, value: Option<&T>) -> &mut Self {
        if let Some(value) = value {
            if let Ok(encoded) = serde_json::to_value(value) {
                self.object.insert(field.to_string(), encoded);
            }
        }
        self
    }

    /// Array of nested values; an empty slice is omitted
    pub fn put_array<T: Serialize>(&mut self, field: &str, items: &[T]) -> &mut Self {
        if !items.is_empty() {
            if let Ok(encoded) = serde_json::to_value(items) {
                self.object.insert(field.to_string(), encoded);
            }
        }
        self
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.object)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_and_mistyped_fields_are_descriptive() {
        let payload = json!({"fileName": 7});
        let reader = JsonReader::from_value("GetFile", &payload).unwrap();
        assert_eq!(
            reader.required_str("fileName", 255).unwrap_err().to_string(),
            "GetFile: field 'fileName' is invalid: expected string, got number"
        );
        assert_eq!(
            reader.required_i64("priority").unwrap_err(),
            ProtocolError::missing_field("GetFile", "priority")
        );
    }

    #[test]
    fn null_counts_as_absent_for_optional_fields() {
        let payload = json!({"priority": null});
        let reader = JsonReader::from_value("GetFile", &payload).unwrap();
        assert_eq!(reader.optional_i64("priority").unwrap(), None);
    }

    #[test]
    fn integer_range_is_checked() {
        let payload = json!({"priority": 300});
        let reader = JsonReader::from_value("GetFile", &payload).unwrap();
        assert!(reader.optional_int::<u8>("priority").is_err());
    }

    #[test]
    fn writer_omits_absent_values() {
        let mut w = JsonWriter::new();
        w.put("fileName", "/a")
            .put_opt::<i64>("priority", None)
            .put_opt_bytes("fileSHA256", None)
            .put_array::<String>("signatures", &[])
            .put_opt("data", Some(Value::Null));
        assert_eq!(w.into_value(), json!({"fileName": "/a"}));
    }
}
