//! # File Transfer Messages
//!
//! `GetFile`, `SendFile`, `DeleteFile` and `ListDirectory`. The two
//! messages that embed file content (`GetFileResponse`, `SendFileRequest`)
//! are the main reason the binary format exists.
//!
//! ## Binary Layouts
//! ```text
//! GetFileRequest        fileName:len16  priority:opt(u8)
//! GetFileResponse       fileName:len16  status:u8  fileContentType:opt(len8)
//!                       fileContent:len64  fileSHA256:len8  fileSHA512:len8
//!                       statusInfo:json16
//! SendFileRequest       fileName:len16  fileContentType:opt(len8)  fileContent:len64
//!                       fileSHA256:len8  fileSHA512:len8  priority:opt(u8)
//! SendFileResponse      fileName:len16  status:u8  statusInfo:json16
//! DeleteFileRequest     fileName:len16  fileSHA256:len8  fileSHA512:len8  priority:opt(u8)
//! DeleteFileResponse    fileName:len16  status:u8  statusInfo:json16
//! ListDirectoryRequest  directoryPath:len16  withFileSizes:u8  priority:opt(u8)
//! ListDirectoryResponse directoryPath:len16  status:u8  entries:u16 × entry
//!                       statusInfo:json16
//!   entry               name:len16  isDirectory:u8  size:opt(u64)
//! ```
//! `len8` digests use length 0 for "absent".

use super::{check_digest, check_required, MAX_PATH_LEN, SHA256_LEN, SHA512_LEN};
use crate::binary::{BinaryReader, BinaryWriter};
use crate::envelope::{RequestEnvelope, RequestOptions, ResponseEnvelope};
use crate::error::{ProtocolError, ProtocolResult};
use crate::json::{JsonReader, JsonWriter};
use crate::message::{OcppRequest, OcppResponse};
use crate::{define_message, define_status_enum, ocpp_action};
use ocpp_types::{ResponseResult, SourceRouting, StatusInfo};
use serde::{Deserialize, Serialize};

/// Maximum length of a MIME content type
pub const MAX_CONTENT_TYPE_LEN: usize = 100;

define_status_enum! {
    /// Outcome of a GetFile request
    GetFileStatus { Success = 0, NotFound = 1, Rejected = 2, Failed = 3 }
}

define_status_enum! {
    /// Outcome of a SendFile request
    SendFileStatus { Success = 0, Rejected = 1, InvalidFileName = 2, InvalidChecksum = 3, Failed = 4 }
}

define_status_enum! {
    /// Outcome of a DeleteFile request
    DeleteFileStatus { Success = 0, NotFound = 1, Rejected = 2, Failed = 3 }
}

define_status_enum! {
    /// Outcome of a ListDirectory request
    ListDirectoryStatus { Success = 0, NotFound = 1, Rejected = 2, Failed = 3 }
}

fn read_status<T>(r: &mut BinaryReader<'_>, action: &str, from_u8: fn(u8) -> Result<T, ocpp_types::ValidationError>) -> ProtocolResult<T> {
    let raw = r.read_u8("status")?;
    from_u8(raw).map_err(|e| ProtocolError::invalid_field(action, "status", e))
}

// ---------------------------------------------------------------------------
// GetFile
// ---------------------------------------------------------------------------

define_message! {
    /// Ask the peer for the content of a file
    GetFileRequest: RequestEnvelope {
        file_name: String,
        /// Transfer priority, lower is more urgent
        priority: Option<u8>,
    }
}

impl GetFileRequest {
    pub fn new(
        destination: SourceRouting,
        file_name: impl Into<String>,
        priority: Option<u8>,
        options: RequestOptions,
    ) -> ProtocolResult<Self> {
        let request = Self::from_parts(
            RequestEnvelope::new(destination, options),
            file_name.into(),
            priority,
        );
        request.validate()?;
        Ok(request)
    }
}

impl OcppRequest for GetFileRequest {
    type Response = GetFileResponse;

    ocpp_action!(GetFileRequest);

    fn envelope(&self) -> &RequestEnvelope {
        &self.envelope
    }

    fn with_envelope(self, envelope: RequestEnvelope) -> Self {
        self.replace_envelope(envelope)
    }

    fn validate(&self) -> ProtocolResult<()> {
        check_required(Self::action(), "fileName", &self.file_name, MAX_PATH_LEN)
    }

    fn write_json(&self, w: &mut JsonWriter) {
        w.put("fileName", self.file_name.as_str())
            .put_opt("priority", self.priority);
    }

    fn read_json(r: &JsonReader<'_>, envelope: RequestEnvelope) -> ProtocolResult<Self> {
        Ok(Self::from_parts(
            envelope,
            r.required_str("fileName", MAX_PATH_LEN)?,
            r.optional_int("priority")?,
        ))
    }

    fn write_binary(&self, w: &mut BinaryWriter) -> ProtocolResult<()> {
        w.write_str16("fileName", &self.file_name)?;
        w.write_opt(self.priority, |w, p| w.write_u8(p))
    }

    fn read_binary(r: &mut BinaryReader<'_>, envelope: RequestEnvelope) -> ProtocolResult<Self> {
        let file_name = r.read_str16("fileName")?;
        let priority = r.read_opt("priority", |r| r.read_u8("priority"))?;
        Ok(Self::from_parts(envelope, file_name, priority))
    }
}

define_message! {
    /// File content returned for a GetFile request
    GetFileResponse: ResponseEnvelope {
        file_name: String,
        status: GetFileStatus,
        file_content: Vec<u8>,
        file_content_type: Option<String>,
        file_sha256: Option<Vec<u8>>,
        file_sha512: Option<Vec<u8>>,
        status_info: Option<StatusInfo>,
    }
}

impl GetFileResponse {
    /// Successful response carrying `content`
    pub fn success(
        request: &GetFileRequest,
        content: Vec<u8>,
        content_type: Option<String>,
    ) -> ProtocolResult<Self> {
        let response = Self::from_parts(
            ResponseEnvelope::answering(request.envelope(), ResponseResult::Ok),
            request.file_name.clone(),
            GetFileStatus::Success,
            content,
            content_type,
            None,
            None,
            None,
        );
        response.validate()?;
        Ok(response)
    }

    /// Response with an explicit status and no content
    pub fn with_status(
        request: &GetFileRequest,
        status: GetFileStatus,
        status_info: Option<StatusInfo>,
    ) -> Self {
        Self::from_parts(
            ResponseEnvelope::answering(request.envelope(), ResponseResult::Ok),
            request.file_name.clone(),
            status,
            Vec::new(),
            None,
            None,
            None,
            status_info,
        )
    }

    /// Copy with content digests attached
    pub fn with_digests(self, sha256: Option<Vec<u8>>, sha512: Option<Vec<u8>>) -> ProtocolResult<Self> {
        let response = Self {
            file_sha256: sha256,
            file_sha512: sha512,
            hash: Default::default(),
            ..self
        };
        response.validate()?;
        Ok(response)
    }
}

impl OcppResponse for GetFileResponse {
    type Request = GetFileRequest;

    ocpp_action!(GetFileResponse);

    fn envelope(&self) -> &ResponseEnvelope {
        &self.envelope
    }

    fn with_envelope(self, envelope: ResponseEnvelope) -> Self {
        self.replace_envelope(envelope)
    }

    fn validate(&self) -> ProtocolResult<()> {
        check_required(Self::action(), "fileName", &self.file_name, MAX_PATH_LEN)?;
        check_digest(Self::action(), "fileSHA256", self.file_sha256.as_ref(), SHA256_LEN)?;
        check_digest(Self::action(), "fileSHA512", self.file_sha512.as_ref(), SHA512_LEN)
    }

    fn write_json(&self, w: &mut JsonWriter) {
        w.put("fileName", self.file_name.as_str())
            .put("status", self.status.as_str());
        if !self.file_content.is_empty() {
            w.put_bytes("fileContent", &self.file_content);
        }
        w.put_opt("fileContentType", self.file_content_type.clone())
            .put_opt_bytes("fileSHA256", self.file_sha256.as_deref())
            .put_opt_bytes("fileSHA512", self.file_sha512.as_deref())
            .put_object("statusInfo", self.status_info.as_ref());
    }

    fn read_json(r: &JsonReader<'_>, envelope: ResponseEnvelope) -> ProtocolResult<Self> {
        Ok(Self::from_parts(
            envelope,
            r.required_str("fileName", MAX_PATH_LEN)?,
            r.required_enum("status")?,
            r.optional_bytes("fileContent")?.unwrap_or_default(),
            r.optional_str("fileContentType", MAX_CONTENT_TYPE_LEN)?,
            r.optional_bytes("fileSHA256")?,
            r.optional_bytes("fileSHA512")?,
            r.optional_object("statusInfo")?,
        ))
    }

    fn write_binary(&self, w: &mut BinaryWriter) -> ProtocolResult<()> {
        w.write_str16("fileName", &self.file_name)?;
        w.write_u8(self.status.as_u8())?;
        w.write_opt(self.file_content_type.as_deref(), |w, t| {
            w.write_str8("fileContentType", t)
        })?;
        w.write_bytes64(&self.file_content)?;
        w.write_opt_bytes8("fileSHA256", self.file_sha256.as_deref())?;
        w.write_opt_bytes8("fileSHA512", self.file_sha512.as_deref())?;
        w.write_status_info(self.status_info.as_ref())
    }

    fn read_binary(r: &mut BinaryReader<'_>, envelope: ResponseEnvelope) -> ProtocolResult<Self> {
        let file_name = r.read_str16("fileName")?;
        let status = read_status(r, Self::action(), GetFileStatus::from_u8)?;
        let file_content_type = r.read_opt("fileContentType", |r| r.read_str8("fileContentType"))?;
        let file_content = r.read_bytes64("fileContent")?;
        let file_sha256 = r.read_opt_bytes8("fileSHA256")?;
        let file_sha512 = r.read_opt_bytes8("fileSHA512")?;
        let status_info = r.read_status_info()?;
        Ok(Self::from_parts(
            envelope,
            file_name,
            status,
            file_content,
            file_content_type,
            file_sha256,
            file_sha512,
            status_info,
        ))
    }

    fn from_failure(request: &GetFileRequest, result: ResponseResult) -> Self {
        Self::from_parts(
            ResponseEnvelope::answering(request.envelope(), result),
            request.file_name.clone(),
            GetFileStatus::Failed,
            Vec::new(),
            None,
            None,
            None,
            None,
        )
    }

    fn rejected(request: &GetFileRequest) -> Self {
        Self::with_status(request, GetFileStatus::Rejected, None)
    }
}

// ---------------------------------------------------------------------------
// SendFile
// ---------------------------------------------------------------------------

define_message! {
    /// Push a file to the peer
    SendFileRequest: RequestEnvelope {
        file_name: String,
        file_content: Vec<u8>,
        file_content_type: Option<String>,
        file_sha256: Option<Vec<u8>>,
        file_sha512: Option<Vec<u8>>,
        priority: Option<u8>,
    }
}

impl SendFileRequest {
    pub fn new(
        destination: SourceRouting,
        file_name: impl Into<String>,
        file_content: Vec<u8>,
        file_content_type: Option<String>,
        options: RequestOptions,
    ) -> ProtocolResult<Self> {
        let request = Self::from_parts(
            RequestEnvelope::new(destination, options),
            file_name.into(),
            file_content,
            file_content_type,
            None,
            None,
            None,
        );
        request.validate()?;
        Ok(request)
    }

    /// Copy with content digests and priority set
    pub fn with_integrity(
        self,
        sha256: Option<Vec<u8>>,
        sha512: Option<Vec<u8>>,
        priority: Option<u8>,
    ) -> ProtocolResult<Self> {
        let request = Self {
            file_sha256: sha256,
            file_sha512: sha512,
            priority,
            hash: Default::default(),
            ..self
        };
        request.validate()?;
        Ok(request)
    }
}

impl OcppRequest for SendFileRequest {
    type Response = SendFileResponse;

    ocpp_action!(SendFileRequest);

    fn envelope(&self) -> &RequestEnvelope {
        &self.envelope
    }

    fn with_envelope(self, envelope: RequestEnvelope) -> Self {
        self.replace_envelope(envelope)
    }

    fn validate(&self) -> ProtocolResult<()> {
        check_required(Self::action(), "fileName", &self.file_name, MAX_PATH_LEN)?;
        check_digest(Self::action(), "fileSHA256", self.file_sha256.as_ref(), SHA256_LEN)?;
        check_digest(Self::action(), "fileSHA512", self.file_sha512.as_ref(), SHA512_LEN)
    }

    fn write_json(&self, w: &mut JsonWriter) {
        w.put("fileName", self.file_name.as_str())
            .put_bytes("fileContent", &self.file_content)
            .put_opt("fileContentType", self.file_content_type.clone())
            .put_opt_bytes("fileSHA256", self.file_sha256.as_deref())
            .put_opt_bytes("fileSHA512", self.file_sha512.as_deref())
            .put_opt("priority", self.priority);
    }

    fn read_json(r: &JsonReader<'_>, envelope: RequestEnvelope) -> ProtocolResult<Self> {
        Ok(Self::from_parts(
            envelope,
            r.required_str("fileName", MAX_PATH_LEN)?,
            r.required_bytes("fileContent")?,
            r.optional_str("fileContentType", MAX_CONTENT_TYPE_LEN)?,
            r.optional_bytes("fileSHA256")?,
            r.optional_bytes("fileSHA512")?,
            r.optional_int("priority")?,
        ))
    }

    fn write_binary(&self, w: &mut BinaryWriter) -> ProtocolResult<()> {
        w.write_str16("fileName", &self.file_name)?;
        w.write_opt(self.file_content_type.as_deref(), |w, t| {
            w.write_str8("fileContentType", t)
        })?;
        w.write_bytes64(&self.file_content)?;
        w.write_opt_bytes8("fileSHA256", self.file_sha256.as_deref())?;
        w.write_opt_bytes8("fileSHA512", self.file_sha512.as_deref())?;
        w.write_opt(self.priority, |w, p| w.write_u8(p))
    }

    fn read_binary(r: &mut BinaryReader<'_>, envelope: RequestEnvelope) -> ProtocolResult<Self> {
        let file_name = r.read_str16("fileName")?;
        let file_content_type = r.read_opt("fileContentType", |r| r.read_str8("fileContentType"))?;
        let file_content = r.read_bytes64("fileContent")?;
        let file_sha256 = r.read_opt_bytes8("fileSHA256")?;
        let file_sha512 = r.read_opt_bytes8("fileSHA512")?;
        let priority = r.read_opt("priority", |r| r.read_u8("priority"))?;
        Ok(Self::from_parts(
            envelope,
            file_name,
            file_content,
            file_content_type,
            file_sha256,
            file_sha512,
            priority,
        ))
    }
}

define_message! {
    /// Acknowledges a SendFile request
    SendFileResponse: ResponseEnvelope {
        file_name: String,
        status: SendFileStatus,
        status_info: Option<StatusInfo>,
    }
}

impl SendFileResponse {
    pub fn new(request: &SendFileRequest, status: SendFileStatus, status_info: Option<StatusInfo>) -> Self {
        Self::from_parts(
            ResponseEnvelope::answering(request.envelope(), ResponseResult::Ok),
            request.file_name.clone(),
            status,
            status_info,
        )
    }
}

impl OcppResponse for SendFileResponse {
    type Request = SendFileRequest;

    ocpp_action!(SendFileResponse);

    fn envelope(&self) -> &ResponseEnvelope {
        &self.envelope
    }

    fn with_envelope(self, envelope: ResponseEnvelope) -> Self {
        self.replace_envelope(envelope)
    }

    fn validate(&self) -> ProtocolResult<()> {
        check_required(Self::action(), "fileName", &self.file_name, MAX_PATH_LEN)
    }

    fn write_json(&self, w: &mut JsonWriter) {
        w.put("fileName", self.file_name.as_str())
            .put("status", self.status.as_str())
            .put_object("statusInfo", self.status_info.as_ref());
    }

    fn read_json(r: &JsonReader<'_>, envelope: ResponseEnvelope) -> ProtocolResult<Self> {
        Ok(Self::from_parts(
            envelope,
            r.required_str("fileName", MAX_PATH_LEN)?,
            r.required_enum("status")?,
            r.optional_object("statusInfo")?,
        ))
    }

    fn write_binary(&self, w: &mut BinaryWriter) -> ProtocolResult<()> {
        w.write_str16("fileName", &self.file_name)?;
        w.write_u8(self.status.as_u8())?;
        w.write_status_info(self.status_info.as_ref())
    }

    fn read_binary(r: &mut BinaryReader<'_>, envelope: ResponseEnvelope) -> ProtocolResult<Self> {
        let file_name = r.read_str16("fileName")?;
        let status = read_status(r, Self::action(), SendFileStatus::from_u8)?;
        let status_info = r.read_status_info()?;
        Ok(Self::from_parts(envelope, file_name, status, status_info))
    }

    fn from_failure(request: &SendFileRequest, result: ResponseResult) -> Self {
        Self::from_parts(
            ResponseEnvelope::answering(request.envelope(), result),
            request.file_name.clone(),
            SendFileStatus::Failed,
            None,
        )
    }

    fn rejected(request: &SendFileRequest) -> Self {
        Self::new(request, SendFileStatus::Rejected, None)
    }
}

// ---------------------------------------------------------------------------
// DeleteFile
// ---------------------------------------------------------------------------

define_message! {
    /// Delete a file on the peer, optionally only if its digest matches
    DeleteFileRequest: RequestEnvelope {
        file_name: String,
        file_sha256: Option<Vec<u8>>,
        file_sha512: Option<Vec<u8>>,
        priority: Option<u8>,
    }
}

impl DeleteFileRequest {
    pub fn new(
        destination: SourceRouting,
        file_name: impl Into<String>,
        file_sha256: Option<Vec<u8>>,
        file_sha512: Option<Vec<u8>>,
        options: RequestOptions,
    ) -> ProtocolResult<Self> {
        let request = Self::from_parts(
            RequestEnvelope::new(destination, options),
            file_name.into(),
            file_sha256,
            file_sha512,
            None,
        );
        request.validate()?;
        Ok(request)
    }
}

impl OcppRequest for DeleteFileRequest {
    type Response = DeleteFileResponse;

    ocpp_action!(DeleteFileRequest);

    fn envelope(&self) -> &RequestEnvelope {
        &self.envelope
    }

    fn with_envelope(self, envelope: RequestEnvelope) -> Self {
        self.replace_envelope(envelope)
    }

    fn validate(&self) -> ProtocolResult<()> {
        check_required(Self::action(), "fileName", &self.file_name, MAX_PATH_LEN)?;
        check_digest(Self::action(), "fileSHA256", self.file_sha256.as_ref(), SHA256_LEN)?;
        check_digest(Self::action(), "fileSHA512", self.file_sha512.as_ref(), SHA512_LEN)
    }

    fn write_json(&self, w: &mut JsonWriter) {
        w.put("fileName", self.file_name.as_str())
            .put_opt_bytes("fileSHA256", self.file_sha256.as_deref())
            .put_opt_bytes("fileSHA512", self.file_sha512.as_deref())
            .put_opt("priority", self.priority);
    }

    fn read_json(r: &JsonReader<'_>, envelope: RequestEnvelope) -> ProtocolResult<Self> {
        Ok(Self::from_parts(
            envelope,
            r.required_str("fileName", MAX_PATH_LEN)?,
            r.optional_bytes("fileSHA256")?,
            r.optional_bytes("fileSHA512")?,
            r.optional_int("priority")?,
        ))
    }

    fn write_binary(&self, w: &mut BinaryWriter) -> ProtocolResult<()> {
        w.write_str16("fileName", &self.file_name)?;
        w.write_opt_bytes8("fileSHA256", self.file_sha256.as_deref())?;
        w.write_opt_bytes8("fileSHA512", self.file_sha512.as_deref())?;
        w.write_opt(self.priority, |w, p| w.write_u8(p))
    }

    fn read_binary(r: &mut BinaryReader<'_>, envelope: RequestEnvelope) -> ProtocolResult<Self> {
        let file_name = r.read_str16("fileName")?;
        let file_sha256 = r.read_opt_bytes8("fileSHA256")?;
        let file_sha512 = r.read_opt_bytes8("fileSHA512")?;
        let priority = r.read_opt("priority", |r| r.read_u8("priority"))?;
        Ok(Self::from_parts(envelope, file_name, file_sha256, file_sha512, priority))
    }
}

define_message! {
    /// Outcome of a DeleteFile request
    DeleteFileResponse: ResponseEnvelope {
        file_name: String,
        status: DeleteFileStatus,
        status_info: Option<StatusInfo>,
    }
}

impl DeleteFileResponse {
    pub fn new(request: &DeleteFileRequest, status: DeleteFileStatus, status_info: Option<StatusInfo>) -> Self {
        Self::from_parts(
            ResponseEnvelope::answering(request.envelope(), ResponseResult::Ok),
            request.file_name.clone(),
            status,
            status_info,
        )
    }
}

impl OcppResponse for DeleteFileResponse {
    type Request = DeleteFileRequest;

    ocpp_action!(DeleteFileResponse);

    fn envelope(&self) -> &ResponseEnvelope {
        &self.envelope
    }

    fn with_envelope(self, envelope: ResponseEnvelope) -> Self {
        self.replace_envelope(envelope)
    }

    fn validate(&self) -> ProtocolResult<()> {
        check_required(Self::action(), "fileName", &self.file_name, MAX_PATH_LEN)
    }

    fn write_json(&self, w: &mut JsonWriter) {
        w.put("fileName", self.file_name.as_str())
            .put("status", self.status.as_str())
            .put_object("statusInfo", self.status_info.as_ref());
    }

    fn read_json(r: &JsonReader<'_>, envelope: ResponseEnvelope) -> ProtocolResult<Self> {
        Ok(Self::from_parts(
            envelope,
            r.required_str("fileName", MAX_PATH_LEN)?,
            r.required_enum("status")?,
            r.optional_object("statusInfo")?,
        ))
    }

    fn write_binary(&self, w: &mut BinaryWriter) -> ProtocolResult<()> {
        w.write_str16("fileName", &self.file_name)?;
        w.write_u8(self.status.as_u8())?;
        w.write_status_info(self.status_info.as_ref())
    }

    fn read_binary(r: &mut BinaryReader<'_>, envelope: ResponseEnvelope) -> ProtocolResult<Self> {
        let file_name = r.read_str16("fileName")?;
        let status = read_status(r, Self::action(), DeleteFileStatus::from_u8)?;
        let status_info = r.read_status_info()?;
        Ok(Self::from_parts(envelope, file_name, status, status_info))
    }

    fn from_failure(request: &DeleteFileRequest, result: ResponseResult) -> Self {
        Self::from_parts(
            ResponseEnvelope::answering(request.envelope(), result),
            request.file_name.clone(),
            DeleteFileStatus::Failed,
            None,
        )
    }

    fn rejected(request: &DeleteFileRequest) -> Self {
        Self::new(request, DeleteFileStatus::Rejected, None)
    }
}

// ---------------------------------------------------------------------------
// ListDirectory
// ---------------------------------------------------------------------------

define_message! {
    /// List the entries of a directory on the peer
    ListDirectoryRequest: RequestEnvelope {
        directory_path: String,
        with_file_sizes: bool,
        priority: Option<u8>,
    }
}

impl ListDirectoryRequest {
    pub fn new(
        destination: SourceRouting,
        directory_path: impl Into<String>,
        with_file_sizes: bool,
        options: RequestOptions,
    ) -> ProtocolResult<Self> {
        let request = Self::from_parts(
            RequestEnvelope::new(destination, options),
            directory_path.into(),
            with_file_sizes,
            None,
        );
        request.validate()?;
        Ok(request)
    }
}

impl OcppRequest for ListDirectoryRequest {
    type Response = ListDirectoryResponse;

    ocpp_action!(ListDirectoryRequest);

    fn envelope(&self) -> &RequestEnvelope {
        &self.envelope
    }

    fn with_envelope(self, envelope: RequestEnvelope) -> Self {
        self.replace_envelope(envelope)
    }

    fn validate(&self) -> ProtocolResult<()> {
        check_required(Self::action(), "directoryPath", &self.directory_path, MAX_PATH_LEN)
    }

    fn write_json(&self, w: &mut JsonWriter) {
        w.put("directoryPath", self.directory_path.as_str())
            .put_opt("withFileSizes", self.with_file_sizes.then_some(true))
            .put_opt("priority", self.priority);
    }

    fn read_json(r: &JsonReader<'_>, envelope: RequestEnvelope) -> ProtocolResult<Self> {
        Ok(Self::from_parts(
            envelope,
            r.required_str("directoryPath", MAX_PATH_LEN)?,
            r.optional_bool("withFileSizes")?.unwrap_or(false),
            r.optional_int("priority")?,
        ))
    }

    fn write_binary(&self, w: &mut BinaryWriter) -> ProtocolResult<()> {
        w.write_str16("directoryPath", &self.directory_path)?;
        w.write_bool(self.with_file_sizes)?;
        w.write_opt(self.priority, |w, p| w.write_u8(p))
    }

    fn read_binary(r: &mut BinaryReader<'_>, envelope: RequestEnvelope) -> ProtocolResult<Self> {
        let directory_path = r.read_str16("directoryPath")?;
        let with_file_sizes = r.read_bool("withFileSizes")?;
        let priority = r.read_opt("priority", |r| r.read_u8("priority"))?;
        Ok(Self::from_parts(envelope, directory_path, with_file_sizes, priority))
    }
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub name: String,
    #[serde(default)]
    pub is_directory: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

define_message! {
    /// Directory listing returned for a ListDirectory request
    ListDirectoryResponse: ResponseEnvelope {
        directory_path: String,
        status: ListDirectoryStatus,
        entries: Vec<DirectoryEntry>,
        status_info: Option<StatusInfo>,
    }
}

impl ListDirectoryResponse {
    pub fn success(request: &ListDirectoryRequest, entries: Vec<DirectoryEntry>) -> Self {
        Self::from_parts(
            ResponseEnvelope::answering(request.envelope(), ResponseResult::Ok),
            request.directory_path.clone(),
            ListDirectoryStatus::Success,
            entries,
            None,
        )
    }

    pub fn with_status(
        request: &ListDirectoryRequest,
        status: ListDirectoryStatus,
        status_info: Option<StatusInfo>,
    ) -> Self {
        Self::from_parts(
            ResponseEnvelope::answering(request.envelope(), ResponseResult::Ok),
            request.directory_path.clone(),
            status,
            Vec::new(),
            status_info,
        )
    }
}

impl OcppResponse for ListDirectoryResponse {
    type Request = ListDirectoryRequest;

    ocpp_action!(ListDirectoryResponse);

    fn envelope(&self) -> &ResponseEnvelope {
        &self.envelope
    }

    fn with_envelope(self, envelope: ResponseEnvelope) -> Self {
        self.replace_envelope(envelope)
    }

    fn validate(&self) -> ProtocolResult<()> {
        check_required(Self::action(), "directoryPath", &self.directory_path, MAX_PATH_LEN)?;
        for (idx, entry) in self.entries.iter().enumerate() {
            check_required(Self::action(), &format!("entries[{}].name", idx), &entry.name, MAX_PATH_LEN)?;
        }
        Ok(())
    }

    fn write_json(&self, w: &mut JsonWriter) {
        w.put("directoryPath", self.directory_path.as_str())
            .put("status", self.status.as_str())
            .put_array("entries", &self.entries)
            .put_object("statusInfo", self.status_info.as_ref());
    }

    fn read_json(r: &JsonReader<'_>, envelope: ResponseEnvelope) -> ProtocolResult<Self> {
        Ok(Self::from_parts(
            envelope,
            r.required_str("directoryPath", MAX_PATH_LEN)?,
            r.required_enum("status")?,
            r.optional_array("entries")?,
            r.optional_object("statusInfo")?,
        ))
    }

    fn write_binary(&self, w: &mut BinaryWriter) -> ProtocolResult<()> {
        w.write_str16("directoryPath", &self.directory_path)?;
        w.write_u8(self.status.as_u8())?;
        let count = u16::try_from(self.entries.len()).map_err(|_| ProtocolError::FieldTooLong {
            field: "entries".to_string(),
            len: self.entries.len(),
            max: u16::MAX as usize,
        })?;
        w.write_u16(count)?;
        for entry in &self.entries {
            w.write_str16("name", &entry.name)?;
            w.write_bool(entry.is_directory)?;
            w.write_opt(entry.size, |w, size| w.write_u64(size))?;
        }
        w.write_status_info(self.status_info.as_ref())
    }

    fn read_binary(r: &mut BinaryReader<'_>, envelope: ResponseEnvelope) -> ProtocolResult<Self> {
        let directory_path = r.read_str16("directoryPath")?;
        let status = read_status(r, Self::action(), ListDirectoryStatus::from_u8)?;
        let count = r.read_u16("entries")? as usize;
        let mut entries = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let name = r.read_str16("name")?;
            let is_directory = r.read_bool("isDirectory")?;
            let size = r.read_opt("size", |r| r.read_u64("size"))?;
            entries.push(DirectoryEntry {
                name,
                is_directory,
                size,
            });
        }
        let status_info = r.read_status_info()?;
        Ok(Self::from_parts(envelope, directory_path, status, entries, status_info))
    }

    fn from_failure(request: &ListDirectoryRequest, result: ResponseResult) -> Self {
        Self::from_parts(
            ResponseEnvelope::answering(request.envelope(), result),
            request.directory_path.clone(),
            ListDirectoryStatus::Failed,
            Vec::new(),
            None,
        )
    }

    fn rejected(request: &ListDirectoryRequest) -> Self {
        Self::with_status(request, ListDirectoryStatus::Rejected, None)
    }
}
