//! Open extension slots: `customData` and `statusInfo`
//!
//! Both are optional trailing members of every payload. `CustomData` keeps
//! any vendor members verbatim so a relay can forward them untouched.

use crate::common::errors::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::hash::{Hash, Hasher};

pub const MAX_VENDOR_ID_LEN: usize = 255;
pub const MAX_REASON_CODE_LEN: usize = 20;
pub const MAX_ADDITIONAL_INFO_LEN: usize = 1024;

/// Vendor extension object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomData {
    vendor_id: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl CustomData {
    pub fn new(vendor_id: impl Into<String>) -> Result<Self, ValidationError> {
        let vendor_id = vendor_id.into();
        ValidationError::check_required("vendor id", &vendor_id, MAX_VENDOR_ID_LEN)?;
        Ok(Self {
            vendor_id,
            extra: Map::new(),
        })
    }

    /// Add a vendor member; `vendorId` itself cannot be overwritten
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if key != "vendorId" {
            self.extra.insert(key, value);
        }
        self
    }

    pub fn vendor_id(&self) -> &str {
        &self.vendor_id
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

impl Hash for CustomData {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.vendor_id.hash(state);
        for (key, value) in &self.extra {
            key.hash(state);
            value.to_string().hash(state);
        }
    }
}

/// Machine-readable reason attached to a response status
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusInfo {
    reason_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    additional_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom_data: Option<CustomData>,
}

impl StatusInfo {
    pub fn new(reason_code: impl Into<String>) -> Result<Self, ValidationError> {
        let reason_code = reason_code.into();
        ValidationError::check_required("reason code", &reason_code, MAX_REASON_CODE_LEN)?;
        Ok(Self {
            reason_code,
            additional_info: None,
            custom_data: None,
        })
    }

    pub fn with_additional_info(
        mut self,
        info: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let info = info.into();
        ValidationError::check_len("additional info", &info, MAX_ADDITIONAL_INFO_LEN)?;
        self.additional_info = Some(info);
        Ok(self)
    }

    #[must_use]
    pub fn with_custom_data(mut self, custom_data: CustomData) -> Self {
        self.custom_data = Some(custom_data);
        self
    }

    pub fn reason_code(&self) -> &str {
        &self.reason_code
    }

    pub fn additional_info(&self) -> Option<&str> {
        self.additional_info.as_deref()
    }

    pub fn custom_data(&self) -> Option<&CustomData> {
        self.custom_data.as_ref()
    }
}
