//! Representative OCPP message set
//!
//! Every pair follows the same pattern: `define_message!` for the struct,
//! a validating constructor, and `OcppRequest` / `OcppResponse` impls with
//! JSON and binary payload layouts documented on the type.

pub mod data_transfer;
pub mod file_transfer;
pub mod reset;
pub mod transaction;

pub use data_transfer::{DataTransferRequest, DataTransferResponse, DataTransferStatus};
pub use file_transfer::{
    DeleteFileRequest, DeleteFileResponse, DeleteFileStatus, DirectoryEntry, GetFileRequest,
    GetFileResponse, GetFileStatus, ListDirectoryRequest, ListDirectoryResponse,
    ListDirectoryStatus, SendFileRequest, SendFileResponse, SendFileStatus,
};
pub use reset::{ResetRequest, ResetResponse, ResetStatus, ResetType};
pub use transaction::{
    AuthorizationStatus, IdTagInfo, RemoteStartStatus, RemoteStartTransactionRequest,
    RemoteStartTransactionResponse, StartTransactionRequest, StartTransactionResponse,
};

use crate::error::{ProtocolError, ProtocolResult};

/// Maximum length of file and directory paths
pub const MAX_PATH_LEN: usize = 1024;

/// Maximum length of an idTag
pub const MAX_ID_TAG_LEN: usize = 20;

pub const SHA256_LEN: usize = 32;
pub const SHA512_LEN: usize = 64;

pub(crate) fn check_required(
    action: &str,
    field: &str,
    value: &str,
    max_len: usize,
) -> ProtocolResult<()> {
    if value.is_empty() {
        return Err(ProtocolError::missing_field(action, field));
    }
    let len = value.chars().count();
    if len > max_len {
        return Err(ProtocolError::invalid_field(
            action,
            field,
            format!("length {} exceeds {}", len, max_len),
        ));
    }
    Ok(())
}

pub(crate) fn check_digest(
    action: &str,
    field: &str,
    digest: Option<&Vec<u8>>,
    expected_len: usize,
) -> ProtocolResult<()> {
    match digest {
        Some(bytes) if bytes.len() != expected_len => Err(ProtocolError::invalid_field(
            action,
            field,
            format!("digest must be {} bytes, got {}", expected_len, bytes.len()),
        )),
        _ => Ok(()),
    }
}
