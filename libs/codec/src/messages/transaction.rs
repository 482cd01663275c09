//! # Transaction Messages
//!
//! `RemoteStartTransaction` (CSMS → station) and `StartTransaction`
//! (station → CSMS). A station that accepts a remote start answers first
//! and then, as a follow-up, sends a `StartTransaction` of its own.
//!
//! ```text
//! RemoteStartTransactionRequest   idTag:len8  connectorId:opt(u32)
//! RemoteStartTransactionResponse  status:u8
//! StartTransactionRequest         connectorId:u32  idTag:len8  meterStart:i32
//!                                 timestamp:i64 (ms since epoch)  reservationId:opt(i32)
//! StartTransactionResponse        transactionId:i32  idTagInfo:json16
//! ```

use super::{check_required, MAX_ID_TAG_LEN};
use crate::binary::{BinaryReader, BinaryWriter};
use crate::envelope::{RequestEnvelope, RequestOptions, ResponseEnvelope};
use crate::error::{ProtocolError, ProtocolResult};
use crate::json::{JsonReader, JsonWriter};
use crate::message::{OcppRequest, OcppResponse};
use crate::{define_message, define_status_enum, ocpp_action};
use chrono::{DateTime, TimeZone, Utc};
use ocpp_types::{ConnectorId, ResponseResult, SourceRouting, TransactionId};
use serde::{Deserialize, Serialize};

define_status_enum! {
    RemoteStartStatus { Accepted = 0, Rejected = 1 }
}

define_status_enum! {
    /// Authorization verdict for an idTag
    AuthorizationStatus { Accepted = 0, Blocked = 1, Expired = 2, Invalid = 3, ConcurrentTx = 4 }
}

/// Authorization details returned with a transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdTagInfo {
    pub status: AuthorizationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id_tag: Option<String>,
}

impl IdTagInfo {
    pub fn new(status: AuthorizationStatus) -> Self {
        Self {
            status,
            expiry_date: None,
            parent_id_tag: None,
        }
    }
}

define_message! {
    /// Ask a station to start a transaction for `id_tag`
    RemoteStartTransactionRequest: RequestEnvelope {
        id_tag: String,
        connector_id: Option<ConnectorId>,
    }
}

impl RemoteStartTransactionRequest {
    pub fn new(
        destination: SourceRouting,
        id_tag: impl Into<String>,
        connector_id: Option<ConnectorId>,
        options: RequestOptions,
    ) -> ProtocolResult<Self> {
        let request = Self::from_parts(
            RequestEnvelope::new(destination, options),
            id_tag.into(),
            connector_id,
        );
        request.validate()?;
        Ok(request)
    }
}

impl OcppRequest for RemoteStartTransactionRequest {
    type Response = RemoteStartTransactionResponse;

    ocpp_action!(RemoteStartTransactionRequest);

    fn envelope(&self) -> &RequestEnvelope {
        &self.envelope
    }

    fn with_envelope(self, envelope: RequestEnvelope) -> Self {
        self.replace_envelope(envelope)
    }

    fn validate(&self) -> ProtocolResult<()> {
        check_required(Self::action(), "idTag", &self.id_tag, MAX_ID_TAG_LEN)
    }

    fn write_json(&self, w: &mut JsonWriter) {
        w.put("idTag", self.id_tag.as_str())
            .put_opt("connectorId", self.connector_id.map(|c| c.inner()));
    }

    fn read_json(r: &JsonReader<'_>, envelope: RequestEnvelope) -> ProtocolResult<Self> {
        Ok(Self::from_parts(
            envelope,
            r.required_str("idTag", MAX_ID_TAG_LEN)?,
            r.optional_int::<u32>("connectorId")?.map(ConnectorId::new),
        ))
    }

    fn write_binary(&self, w: &mut BinaryWriter) -> ProtocolResult<()> {
        w.write_str8("idTag", &self.id_tag)?;
        w.write_opt(self.connector_id, |w, c| w.write_u32(c.inner()))
    }

    fn read_binary(r: &mut BinaryReader<'_>, envelope: RequestEnvelope) -> ProtocolResult<Self> {
        let id_tag = r.read_str8("idTag")?;
        let connector_id = r
            .read_opt("connectorId", |r| r.read_u32("connectorId"))?
            .map(ConnectorId::new);
        Ok(Self::from_parts(envelope, id_tag, connector_id))
    }
}

define_message! {
    RemoteStartTransactionResponse: ResponseEnvelope {
        status: RemoteStartStatus,
    }
}

impl RemoteStartTransactionResponse {
    pub fn new(request: &RemoteStartTransactionRequest, status: RemoteStartStatus) -> Self {
        Self::from_parts(
            ResponseEnvelope::answering(request.envelope(), ResponseResult::Ok),
            status,
        )
    }

    pub fn accepted(request: &RemoteStartTransactionRequest) -> Self {
        Self::new(request, RemoteStartStatus::Accepted)
    }
}

impl OcppResponse for RemoteStartTransactionResponse {
    type Request = RemoteStartTransactionRequest;

    ocpp_action!(RemoteStartTransactionResponse);

    fn envelope(&self) -> &ResponseEnvelope {
        &self.envelope
    }

    fn with_envelope(self, envelope: ResponseEnvelope) -> Self {
        self.replace_envelope(envelope)
    }

    fn write_json(&self, w: &mut JsonWriter) {
        w.put("status", self.status.as_str());
    }

    fn read_json(r: &JsonReader<'_>, envelope: ResponseEnvelope) -> ProtocolResult<Self> {
        Ok(Self::from_parts(envelope, r.required_enum("status")?))
    }

    fn write_binary(&self, w: &mut BinaryWriter) -> ProtocolResult<()> {
        w.write_u8(self.status.as_u8())
    }

    fn read_binary(r: &mut BinaryReader<'_>, envelope: ResponseEnvelope) -> ProtocolResult<Self> {
        let raw = r.read_u8("status")?;
        let status = RemoteStartStatus::from_u8(raw)
            .map_err(|e| ProtocolError::invalid_field(Self::action(), "status", e))?;
        Ok(Self::from_parts(envelope, status))
    }

    fn from_failure(request: &RemoteStartTransactionRequest, result: ResponseResult) -> Self {
        Self::from_parts(
            ResponseEnvelope::answering(request.envelope(), result),
            RemoteStartStatus::Rejected,
        )
    }

    fn rejected(request: &RemoteStartTransactionRequest) -> Self {
        Self::new(request, RemoteStartStatus::Rejected)
    }
}

define_message! {
    /// Station reports that a transaction has started
    StartTransactionRequest: RequestEnvelope {
        connector_id: ConnectorId,
        id_tag: String,
        /// Meter value in Wh at start
        meter_start: i32,
        timestamp: DateTime<Utc>,
        reservation_id: Option<i32>,
    }
}

impl StartTransactionRequest {
    pub fn new(
        destination: SourceRouting,
        connector_id: ConnectorId,
        id_tag: impl Into<String>,
        meter_start: i32,
        timestamp: DateTime<Utc>,
        options: RequestOptions,
    ) -> ProtocolResult<Self> {
        let request = Self::from_parts(
            RequestEnvelope::new(destination, options),
            connector_id,
            id_tag.into(),
            meter_start,
            timestamp,
            None,
        );
        request.validate()?;
        Ok(request)
    }
}

impl OcppRequest for StartTransactionRequest {
    type Response = StartTransactionResponse;

    ocpp_action!(StartTransactionRequest);

    fn envelope(&self) -> &RequestEnvelope {
        &self.envelope
    }

    fn with_envelope(self, envelope: RequestEnvelope) -> Self {
        self.replace_envelope(envelope)
    }

    fn validate(&self) -> ProtocolResult<()> {
        check_required(Self::action(), "idTag", &self.id_tag, MAX_ID_TAG_LEN)?;
        if self.meter_start < 0 {
            return Err(ProtocolError::invalid_field(
                Self::action(),
                "meterStart",
                "must not be negative",
            ));
        }
        Ok(())
    }

    fn write_json(&self, w: &mut JsonWriter) {
        w.put("connectorId", self.connector_id.inner())
            .put("idTag", self.id_tag.as_str())
            .put("meterStart", self.meter_start)
            .put_timestamp("timestamp", &self.timestamp)
            .put_opt("reservationId", self.reservation_id);
    }

    fn read_json(r: &JsonReader<'_>, envelope: RequestEnvelope) -> ProtocolResult<Self> {
        Ok(Self::from_parts(
            envelope,
            ConnectorId::new(r.required_int("connectorId")?),
            r.required_str("idTag", MAX_ID_TAG_LEN)?,
            r.required_int("meterStart")?,
            r.required_timestamp("timestamp")?,
            r.optional_int("reservationId")?,
        ))
    }

    fn write_binary(&self, w: &mut BinaryWriter) -> ProtocolResult<()> {
        w.write_u32(self.connector_id.inner())?;
        w.write_str8("idTag", &self.id_tag)?;
        w.write_i32(self.meter_start)?;
        w.write_i64(self.timestamp.timestamp_millis())?;
        w.write_opt(self.reservation_id, |w, id| w.write_i32(id))
    }

    fn read_binary(r: &mut BinaryReader<'_>, envelope: RequestEnvelope) -> ProtocolResult<Self> {
        let connector_id = ConnectorId::new(r.read_u32("connectorId")?);
        let id_tag = r.read_str8("idTag")?;
        let meter_start = r.read_i32("meterStart")?;
        let millis = r.read_i64("timestamp")?;
        let timestamp = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| ProtocolError::invalid_field(Self::action(), "timestamp", "out of range"))?;
        let reservation_id = r.read_opt("reservationId", |r| r.read_i32("reservationId"))?;
        Ok(Self::from_parts(
            envelope,
            connector_id,
            id_tag,
            meter_start,
            timestamp,
            reservation_id,
        ))
    }
}

define_message! {
    StartTransactionResponse: ResponseEnvelope {
        transaction_id: TransactionId,
        id_tag_info: IdTagInfo,
    }
}

impl StartTransactionResponse {
    pub fn new(request: &StartTransactionRequest, transaction_id: TransactionId, id_tag_info: IdTagInfo) -> Self {
        Self::from_parts(
            ResponseEnvelope::answering(request.envelope(), ResponseResult::Ok),
            transaction_id,
            id_tag_info,
        )
    }
}

impl OcppResponse for StartTransactionResponse {
    type Request = StartTransactionRequest;

    ocpp_action!(StartTransactionResponse);

    fn envelope(&self) -> &ResponseEnvelope {
        &self.envelope
    }

    fn with_envelope(self, envelope: ResponseEnvelope) -> Self {
        self.replace_envelope(envelope)
    }

    fn write_json(&self, w: &mut JsonWriter) {
        w.put("transactionId", self.transaction_id.inner())
            .put_object("idTagInfo", Some(&self.id_tag_info));
    }

    fn read_json(r: &JsonReader<'_>, envelope: ResponseEnvelope) -> ProtocolResult<Self> {
        Ok(Self::from_parts(
            envelope,
            TransactionId::new(r.required_int("transactionId")?),
            r.required_object("idTagInfo")?,
        ))
    }

    fn write_binary(&self, w: &mut BinaryWriter) -> ProtocolResult<()> {
        w.write_i32(self.transaction_id.inner())?;
        w.write_json16("idTagInfo", Some(&self.id_tag_info))
    }

    fn read_binary(r: &mut BinaryReader<'_>, envelope: ResponseEnvelope) -> ProtocolResult<Self> {
        let transaction_id = TransactionId::new(r.read_i32("transactionId")?);
        let id_tag_info = r
            .read_json16("idTagInfo")?
            .ok_or_else(|| ProtocolError::missing_field(Self::action(), "idTagInfo"))?;
        Ok(Self::from_parts(envelope, transaction_id, id_tag_info))
    }

    fn from_failure(request: &StartTransactionRequest, result: ResponseResult) -> Self {
        Self::from_parts(
            ResponseEnvelope::answering(request.envelope(), result),
            TransactionId::new(0),
            IdTagInfo::new(AuthorizationStatus::Invalid),
        )
    }

    fn rejected(request: &StartTransactionRequest) -> Self {
        Self::new(request, TransactionId::new(0), IdTagInfo::new(AuthorizationStatus::Invalid))
    }
}
