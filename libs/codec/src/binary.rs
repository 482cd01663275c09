//! # Compact Binary Payload Codec
//!
//! ## Purpose
//! Fixed-order, length-prefixed field encoding for payloads that embed raw
//! bytes (file transfer), where base64 inside JSON would be wasteful.
//!
//! ## Field Width Rules
//! ```text
//! status / enum / integer      fixed size, no prefix, little-endian
//! identifiers, short names     u8  length prefix   (≤ 255)
//! paths, descriptions, JSON    u16 length prefix   (≤ 65535)
//! file content                 u64 length prefix
//! optional digest              u8  length prefix, 0 = absent
//! optional other               u8  presence flag, then the field
//! ```
//!
//! The envelope trailer (signatures, customData) always follows the payload
//! fields, see [`write_envelope_trailer`] / [`read_envelope_trailer`].

use crate::error::{ProtocolError, ProtocolResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ocpp_types::{CustomData, Signature, StatusInfo};
use std::io::Cursor;

/// Growable little-endian writer
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buf: Vec<u8>,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, value: u8) -> ProtocolResult<()> {
        self.buf.push(value);
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> ProtocolResult<()> {
        self.write_u8(u8::from(value))
    }

    pub fn write_u16(&mut self, value: u16) -> ProtocolResult<()> {
        self.buf
            .write_u16::<LittleEndian>(value)
            .map_err(|e| ProtocolError::invalid_frame(e.to_string()))
    }

    pub fn write_u32(&mut self, value: u32) -> ProtocolResult<()> {
        self.buf
            .write_u32::<LittleEndian>(value)
            .map_err(|e| ProtocolError::invalid_frame(e.to_string()))
    }

    pub fn write_i32(&mut self, value: i32) -> ProtocolResult<()> {
        self.buf
            .write_i32::<LittleEndian>(value)
            .map_err(|e| ProtocolError::invalid_frame(e.to_string()))
    }

    pub fn write_i64(&mut self, value: i64) -> ProtocolResult<()> {
        self.buf
            .write_i64::<LittleEndian>(value)
            .map_err(|e| ProtocolError::invalid_frame(e.to_string()))
    }

    pub fn write_u64(&mut self, value: u64) -> ProtocolResult<()> {
        self.buf
            .write_u64::<LittleEndian>(value)
            .map_err(|e| ProtocolError::invalid_frame(e.to_string()))
    }

    /// Bytes with a one-byte length prefix
    pub fn write_bytes8(&mut self, field: &str, bytes: &[u8]) -> ProtocolResult<()> {
        let len = u8::try_from(bytes.len()).map_err(|_| too_long(field, bytes.len(), u8::MAX as usize))?;
        self.write_u8(len)?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Bytes with a two-byte length prefix
    pub fn write_bytes16(&mut self, field: &str, bytes: &[u8]) -> ProtocolResult<()> {
        let len =
            u16::try_from(bytes.len()).map_err(|_| too_long(field, bytes.len(), u16::MAX as usize))?;
        self.write_u16(len)?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Bytes with an eight-byte length prefix
    pub fn write_bytes64(&mut self, bytes: &[u8]) -> ProtocolResult<()> {
        self.write_u64(bytes.len() as u64)?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub fn write_str8(&mut self, field: &str, value: &str) -> ProtocolResult<()> {
        self.write_bytes8(field, value.as_bytes())
    }

    pub fn write_str16(&mut self, field: &str, value: &str) -> ProtocolResult<()> {
        self.write_bytes16(field, value.as_bytes())
    }

    /// Optional digest: length 0 marks absence
    pub fn write_opt_bytes8(&mut self, field: &str, bytes: Option<&[u8]>) -> ProtocolResult<()> {
        self.write_bytes8(field, bytes.unwrap_or_default())
    }

    /// Presence flag followed by the value when present
    pub fn write_opt<T>(
        &mut self,
        value: Option<T>,
        write: impl FnOnce(&mut Self, T) -> ProtocolResult<()>,
    ) -> ProtocolResult<()> {
        match value {
            Some(value) => {
                self.write_u8(1)?;
                write(self, value)
            }
            None => self.write_u8(0),
        }
    }

    /// JSON-serialisable value behind a two-byte prefix; length 0 marks absence
    pub fn write_json16<T: serde::Serialize>(
        &mut self,
        field: &str,
        value: Option<&T>,
    ) -> ProtocolResult<()> {
        match value {
            Some(value) => {
                let encoded = serde_json::to_vec(value)?;
                self.write_bytes16(field, &encoded)
            }
            None => self.write_u16(0),
        }
    }

    pub fn write_status_info(&mut self, status_info: Option<&StatusInfo>) -> ProtocolResult<()> {
        self.write_json16("statusInfo", status_info)
    }
}

fn too_long(field: &str, len: usize, max: usize) -> ProtocolError {
    ProtocolError::FieldTooLong {
        field: field.to_string(),
        len,
        max,
    }
}

/// Bounds-checked little-endian reader
#[derive(Debug)]
pub struct BinaryReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    pub fn remaining(&self) -> usize {
        let total = self.cursor.get_ref().len();
        total.saturating_sub(self.cursor.position() as usize)
    }

    fn ensure(&self, field: &str, need: usize) -> ProtocolResult<()> {
        let remaining = self.remaining();
        if remaining < need {
            return Err(ProtocolError::truncated(field, need, remaining));
        }
        Ok(())
    }

    pub fn read_u8(&mut self, field: &str) -> ProtocolResult<u8> {
        self.ensure(field, 1)?;
        self.cursor
            .read_u8()
            .map_err(|_| ProtocolError::truncated(field, 1, 0))
    }

    pub fn read_bool(&mut self, field: &str) -> ProtocolResult<bool> {
        match self.read_u8(field)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::invalid_frame(format!(
                "'{}' flag must be 0 or 1, got {}",
                field, other
            ))),
        }
    }

    pub fn read_u16(&mut self, field: &str) -> ProtocolResult<u16> {
        self.ensure(field, 2)?;
        self.cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| ProtocolError::truncated(field, 2, 0))
    }

    pub fn read_u32(&mut self, field: &str) -> ProtocolResult<u32> {
        self.ensure(field, 4)?;
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| ProtocolError::truncated(field, 4, 0))
    }

    pub fn read_i32(&mut self, field: &str) -> ProtocolResult<i32> {
        self.ensure(field, 4)?;
        self.cursor
            .read_i32::<LittleEndian>()
            .map_err(|_| ProtocolError::truncated(field, 4, 0))
    }

    pub fn read_i64(&mut self, field: &str) -> ProtocolResult<i64> {
        self.ensure(field, 8)?;
        self.cursor
            .read_i64::<LittleEndian>()
            .map_err(|_| ProtocolError::truncated(field, 8, 0))
    }

    pub fn read_u64(&mut self, field: &str) -> ProtocolResult<u64> {
        self.ensure(field, 8)?;
        self.cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| ProtocolError::truncated(field, 8, 0))
    }

    fn take(&mut self, field: &str, len: usize) -> ProtocolResult<&'a [u8]> {
        self.ensure(field, len)?;
        let start = self.cursor.position() as usize;
        let data: &'a [u8] = *self.cursor.get_ref();
        self.cursor.set_position((start + len) as u64);
        Ok(&data[start..start + len])
    }

    pub fn read_bytes8(&mut self, field: &str) -> ProtocolResult<Vec<u8>> {
        let len = self.read_u8(field)? as usize;
        Ok(self.take(field, len)?.to_vec())
    }

    pub fn read_bytes16(&mut self, field: &str) -> ProtocolResult<Vec<u8>> {
        let len = self.read_u16(field)? as usize;
        Ok(self.take(field, len)?.to_vec())
    }

    pub fn read_bytes64(&mut self, field: &str) -> ProtocolResult<Vec<u8>> {
        let declared = self.read_u64(field)?;
        let len = usize::try_from(declared)
            .map_err(|_| ProtocolError::truncated(field, usize::MAX, self.remaining()))?;
        Ok(self.take(field, len)?.to_vec())
    }

    pub fn read_str8(&mut self, field: &str) -> ProtocolResult<String> {
        let bytes = self.read_bytes8(field)?;
        utf8(field, bytes)
    }

    pub fn read_str16(&mut self, field: &str) -> ProtocolResult<String> {
        let bytes = self.read_bytes16(field)?;
        utf8(field, bytes)
    }

    pub fn read_opt_bytes8(&mut self, field: &str) -> ProtocolResult<Option<Vec<u8>>> {
        let bytes = self.read_bytes8(field)?;
        Ok(if bytes.is_empty() { None } else { Some(bytes) })
    }

    pub fn read_opt<T>(
        &mut self,
        field: &str,
        read: impl FnOnce(&mut Self) -> ProtocolResult<T>,
    ) -> ProtocolResult<Option<T>> {
        if self.read_bool(field)? {
            read(self).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn read_json16<T: serde::de::DeserializeOwned>(
        &mut self,
        field: &str,
    ) -> ProtocolResult<Option<T>> {
        let bytes = self.read_bytes16(field)?;
        if bytes.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ProtocolError::invalid_field("binary", field, e))
    }

    pub fn read_status_info(&mut self) -> ProtocolResult<Option<StatusInfo>> {
        self.read_json16("statusInfo")
    }

    /// Fail unless every byte has been consumed
    pub fn finish(self) -> ProtocolResult<()> {
        match self.remaining() {
            0 => Ok(()),
            remaining => Err(ProtocolError::TrailingBytes { remaining }),
        }
    }
}

fn utf8(field: &str, bytes: Vec<u8>) -> ProtocolResult<String> {
    String::from_utf8(bytes).map_err(|e| ProtocolError::invalid_field("binary", field, e))
}

/// Signatures and customData appended after every binary payload
pub fn write_envelope_trailer(
    w: &mut BinaryWriter,
    signatures: &[Signature],
    custom_data: Option<&CustomData>,
) -> ProtocolResult<()> {
    let count = u8::try_from(signatures.len())
        .map_err(|_| too_long("signatures", signatures.len(), u8::MAX as usize))?;
    w.write_u8(count)?;
    for signature in signatures {
        w.write_str8("keyId", signature.key_id())?;
        w.write_str8("algorithm", signature.algorithm())?;
        w.write_bytes16("signature", signature.value())?;
        let fields = signature.signed_fields();
        let field_count = u8::try_from(fields.len())
            .map_err(|_| too_long("signedFields", fields.len(), u8::MAX as usize))?;
        w.write_u8(field_count)?;
        for name in fields {
            w.write_str8("signedField", name)?;
        }
    }
    w.write_json16("customData", custom_data)
}

pub fn read_envelope_trailer(
    r: &mut BinaryReader<'_>,
) -> ProtocolResult<(Vec<Signature>, Option<CustomData>)> {
    let count = r.read_u8("signatures")? as usize;
    let mut signatures = Vec::with_capacity(count);
    for _ in 0..count {
        let key_id = r.read_str8("keyId")?;
        let algorithm = r.read_str8("algorithm")?;
        let value = r.read_bytes16("signature")?;
        let field_count = r.read_u8("signedFields")? as usize;
        let mut fields = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            fields.push(r.read_str8("signedField")?);
        }
        signatures.push(Signature::new(key_id, algorithm, value)?.with_signed_fields(fields));
    }
    let custom_data = r.read_json16("customData")?;
    Ok((signatures, custom_data))
}
