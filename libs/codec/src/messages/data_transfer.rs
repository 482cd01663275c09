//! DataTransfer: vendor-specific exchange with an opaque JSON body
//!
//! ```text
//! DataTransferRequest   vendorId:len8  messageId:opt(len8)  data:json16
//! DataTransferResponse  status:u8  data:json16  statusInfo:json16
//! ```

use super::check_required;
use crate::binary::{BinaryReader, BinaryWriter};
use crate::envelope::{RequestEnvelope, RequestOptions, ResponseEnvelope};
use crate::error::{ProtocolError, ProtocolResult};
use crate::json::{JsonReader, JsonWriter};
use crate::message::{JsonData, OcppRequest, OcppResponse};
use crate::{define_message, define_status_enum, ocpp_action};
use ocpp_types::{ResponseResult, SourceRouting, StatusInfo};
use serde_json::Value;

pub const MAX_VENDOR_ID_LEN: usize = 255;
pub const MAX_MESSAGE_ID_LEN: usize = 50;

define_status_enum! {
    DataTransferStatus { Accepted = 0, Rejected = 1, UnknownMessageId = 2, UnknownVendorId = 3 }
}

define_message! {
    DataTransferRequest: RequestEnvelope {
        vendor_id: String,
        message_id: Option<String>,
        data: Option<JsonData>,
    }
}

impl DataTransferRequest {
    pub fn new(
        destination: SourceRouting,
        vendor_id: impl Into<String>,
        message_id: Option<String>,
        data: Option<Value>,
        options: RequestOptions,
    ) -> ProtocolResult<Self> {
        let request = Self::from_parts(
            RequestEnvelope::new(destination, options),
            vendor_id.into(),
            message_id,
            JsonData::present(data),
        );
        request.validate()?;
        Ok(request)
    }
}

impl OcppRequest for DataTransferRequest {
    type Response = DataTransferResponse;

    ocpp_action!(DataTransferRequest);

    fn envelope(&self) -> &RequestEnvelope {
        &self.envelope
    }

    fn with_envelope(self, envelope: RequestEnvelope) -> Self {
        self.replace_envelope(envelope)
    }

    fn validate(&self) -> ProtocolResult<()> {
        check_required(Self::action(), "vendorId", &self.vendor_id, MAX_VENDOR_ID_LEN)?;
        match &self.message_id {
            Some(id) => check_required(Self::action(), "messageId", id, MAX_MESSAGE_ID_LEN),
            None => Ok(()),
        }
    }

    fn write_json(&self, w: &mut JsonWriter) {
        w.put("vendorId", self.vendor_id.as_str())
            .put_opt("messageId", self.message_id.clone())
            .put_opt("data", self.data.as_ref().map(|d| d.0.clone()));
    }

    fn read_json(r: &JsonReader<'_>, envelope: RequestEnvelope) -> ProtocolResult<Self> {
        Ok(Self::from_parts(
            envelope,
            r.required_str("vendorId", MAX_VENDOR_ID_LEN)?,
            r.optional_str("messageId", MAX_MESSAGE_ID_LEN)?,
            JsonData::present(r.optional_value("data")),
        ))
    }

    fn write_binary(&self, w: &mut BinaryWriter) -> ProtocolResult<()> {
        w.write_str8("vendorId", &self.vendor_id)?;
        w.write_opt(self.message_id.as_deref(), |w, id| w.write_str8("messageId", id))?;
        w.write_json16("data", self.data.as_ref().map(|d| &d.0))
    }

    fn read_binary(r: &mut BinaryReader<'_>, envelope: RequestEnvelope) -> ProtocolResult<Self> {
        let vendor_id = r.read_str8("vendorId")?;
        let message_id = r.read_opt("messageId", |r| r.read_str8("messageId"))?;
        let data = JsonData::present(r.read_json16::<Value>("data")?);
        Ok(Self::from_parts(envelope, vendor_id, message_id, data))
    }
}

define_message! {
    DataTransferResponse: ResponseEnvelope {
        status: DataTransferStatus,
        data: Option<JsonData>,
        status_info: Option<StatusInfo>,
    }
}

impl DataTransferResponse {
    pub fn new(request: &DataTransferRequest, status: DataTransferStatus, data: Option<Value>) -> Self {
        Self::from_parts(
            ResponseEnvelope::answering(request.envelope(), ResponseResult::Ok),
            status,
            JsonData::present(data),
            None,
        )
    }
}

impl OcppResponse for DataTransferResponse {
    type Request = DataTransferRequest;

    ocpp_action!(DataTransferResponse);

    fn envelope(&self) -> &ResponseEnvelope {
        &self.envelope
    }

    fn with_envelope(self, envelope: ResponseEnvelope) -> Self {
        self.replace_envelope(envelope)
    }

    fn write_json(&self, w: &mut JsonWriter) {
        w.put("status", self.status.as_str())
            .put_opt("data", self.data.as_ref().map(|d| d.0.clone()))
            .put_object("statusInfo", self.status_info.as_ref());
    }

    fn read_json(r: &JsonReader<'_>, envelope: ResponseEnvelope) -> ProtocolResult<Self> {
        Ok(Self::from_parts(
            envelope,
            r.required_enum("status")?,
            JsonData::present(r.optional_value("data")),
            r.optional_object("statusInfo")?,
        ))
    }

    fn write_binary(&self, w: &mut BinaryWriter) -> ProtocolResult<()> {
        w.write_u8(self.status.as_u8())?;
        w.write_json16("data", self.data.as_ref().map(|d| &d.0))?;
        w.write_status_info(self.status_info.as_ref())
    }

    fn read_binary(r: &mut BinaryReader<'_>, envelope: ResponseEnvelope) -> ProtocolResult<Self> {
        let raw = r.read_u8("status")?;
        let status = DataTransferStatus::from_u8(raw)
            .map_err(|e| ProtocolError::invalid_field(Self::action(), "status", e))?;
        let data = JsonData::present(r.read_json16::<Value>("data")?);
        let status_info = r.read_status_info()?;
        Ok(Self::from_parts(envelope, status, data, status_info))
    }

    fn from_failure(request: &DataTransferRequest, result: ResponseResult) -> Self {
        Self::from_parts(
            ResponseEnvelope::answering(request.envelope(), result),
            DataTransferStatus::Rejected,
            None,
            None,
        )
    }

    fn rejected(request: &DataTransferRequest) -> Self {
        Self::new(request, DataTransferStatus::Rejected, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::CodecHooks;
    use crate::payload::{decode_request, decode_response, encode_request, encode_response};
    use ocpp_types::{NetworkingNodeId, SerializationFormat};
    use serde_json::json;

    fn node(s: &str) -> NetworkingNodeId {
        NetworkingNodeId::new(s).unwrap()
    }

    fn transfer(data: Option<Value>, format: SerializationFormat) -> DataTransferRequest {
        DataTransferRequest::new(
            SourceRouting::to(node("cs1")),
            "org.example",
            None,
            data,
            RequestOptions::default()
                .with_format(format)
                .with_origin(node("csms")),
        )
        .unwrap()
    }

    #[test]
    fn null_data_is_treated_as_absent() {
        for format in [SerializationFormat::Json, SerializationFormat::Binary] {
            let request = transfer(Some(Value::Null), format);
            assert_eq!(request.data(), &None);
            assert_eq!(request, transfer(None, format));

            let payload = encode_request(&request, &CodecHooks::none()).unwrap();
            if let Some(object) = payload.as_json() {
                assert_eq!(object, &json!({"vendorId": "org.example"}));
            }
            let decoded: DataTransferRequest =
                decode_request(&payload, &request.envelope().context(node("csms")), &CodecHooks::none())
                    .unwrap();
            assert_eq!(decoded, request);

            let response = DataTransferResponse::new(&request, DataTransferStatus::Accepted, Some(Value::Null));
            assert_eq!(response.data(), &None);
            let payload = encode_response(&response, &CodecHooks::none()).unwrap();
            let decoded: DataTransferResponse =
                decode_response(&payload, &response.envelope().context(), &CodecHooks::none()).unwrap();
            assert_eq!(decoded, response);
        }
    }

    #[test]
    fn explicit_null_on_the_wire_decodes_as_absent() {
        let request = transfer(None, SerializationFormat::Json);
        let payload = crate::payload::Payload::Json(json!({"vendorId": "org.example", "data": null}));
        let decoded: DataTransferRequest =
            decode_request(&payload, &request.envelope().context(node("csms")), &CodecHooks::none())
                .unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn vendor_id_is_required() {
        let err = DataTransferRequest::new(
            SourceRouting::to(node("cs1")),
            "",
            None,
            None,
            RequestOptions::default(),
        )
        .unwrap_err();
        assert!(err.is_formation_error());
    }
}
