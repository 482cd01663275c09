//! Reset
//!
//! ```text
//! ResetRequest   type:u8  evseId:opt(u32)
//! ResetResponse  status:u8  statusInfo:json16
//! ```

use crate::binary::{BinaryReader, BinaryWriter};
use crate::envelope::{RequestEnvelope, RequestOptions, ResponseEnvelope};
use crate::error::{ProtocolError, ProtocolResult};
use crate::json::{JsonReader, JsonWriter};
use crate::message::{OcppRequest, OcppResponse};
use crate::{define_message, define_status_enum, ocpp_action};
use ocpp_types::{ResponseResult, SourceRouting, StatusInfo};

define_status_enum! {
    /// When the reset should happen
    ResetType { Immediate = 0, OnIdle = 1 }
}

define_status_enum! {
    ResetStatus { Accepted = 0, Rejected = 1, Scheduled = 2 }
}

define_message! {
    /// Reset the station, or a single EVSE when `evse_id` is set
    ResetRequest: RequestEnvelope {
        reset_type: ResetType,
        evse_id: Option<u32>,
    }
}

impl ResetRequest {
    pub fn new(
        destination: SourceRouting,
        reset_type: ResetType,
        evse_id: Option<u32>,
        options: RequestOptions,
    ) -> Self {
        Self::from_parts(RequestEnvelope::new(destination, options), reset_type, evse_id)
    }
}

impl OcppRequest for ResetRequest {
    type Response = ResetResponse;

    ocpp_action!(ResetRequest);

    fn envelope(&self) -> &RequestEnvelope {
        &self.envelope
    }

    fn with_envelope(self, envelope: RequestEnvelope) -> Self {
        self.replace_envelope(envelope)
    }

    fn write_json(&self, w: &mut JsonWriter) {
        w.put("type", self.reset_type.as_str())
            .put_opt("evseId", self.evse_id);
    }

    fn read_json(r: &JsonReader<'_>, envelope: RequestEnvelope) -> ProtocolResult<Self> {
        Ok(Self::from_parts(
            envelope,
            r.required_enum("type")?,
            r.optional_int("evseId")?,
        ))
    }

    fn write_binary(&self, w: &mut BinaryWriter) -> ProtocolResult<()> {
        w.write_u8(self.reset_type.as_u8())?;
        w.write_opt(self.evse_id, |w, id| w.write_u32(id))
    }

    fn read_binary(r: &mut BinaryReader<'_>, envelope: RequestEnvelope) -> ProtocolResult<Self> {
        let raw = r.read_u8("type")?;
        let reset_type =
            ResetType::from_u8(raw).map_err(|e| ProtocolError::invalid_field(Self::action(), "type", e))?;
        let evse_id = r.read_opt("evseId", |r| r.read_u32("evseId"))?;
        Ok(Self::from_parts(envelope, reset_type, evse_id))
    }
}

define_message! {
    ResetResponse: ResponseEnvelope {
        status: ResetStatus,
        status_info: Option<StatusInfo>,
    }
}

impl ResetResponse {
    pub fn new(request: &ResetRequest, status: ResetStatus, status_info: Option<StatusInfo>) -> Self {
        Self::from_parts(
            ResponseEnvelope::answering(request.envelope(), ResponseResult::Ok),
            status,
            status_info,
        )
    }
}

impl OcppResponse for ResetResponse {
    type Request = ResetRequest;

    ocpp_action!(ResetResponse);

    fn envelope(&self) -> &ResponseEnvelope {
        &self.envelope
    }

    fn with_envelope(self, envelope: ResponseEnvelope) -> Self {
        self.replace_envelope(envelope)
    }

    fn write_json(&self, w: &mut JsonWriter) {
        w.put("status", self.status.as_str())
            .put_object("statusInfo", self.status_info.as_ref());
    }

    fn read_json(r: &JsonReader<'_>, envelope: ResponseEnvelope) -> ProtocolResult<Self> {
        Ok(Self::from_parts(
            envelope,
            r.required_enum("status")?,
            r.optional_object("statusInfo")?,
        ))
    }

    fn write_binary(&self, w: &mut BinaryWriter) -> ProtocolResult<()> {
        w.write_u8(self.status.as_u8())?;
        w.write_status_info(self.status_info.as_ref())
    }

    fn read_binary(r: &mut BinaryReader<'_>, envelope: ResponseEnvelope) -> ProtocolResult<Self> {
        let raw = r.read_u8("status")?;
        let status =
            ResetStatus::from_u8(raw).map_err(|e| ProtocolError::invalid_field(Self::action(), "status", e))?;
        let status_info = r.read_status_info()?;
        Ok(Self::from_parts(envelope, status, status_info))
    }

    fn from_failure(request: &ResetRequest, result: ResponseResult) -> Self {
        Self::from_parts(
            ResponseEnvelope::answering(request.envelope(), result),
            ResetStatus::Rejected,
            None,
        )
    }

    fn rejected(request: &ResetRequest) -> Self {
        Self::new(request, ResetStatus::Rejected, None)
    }
}
