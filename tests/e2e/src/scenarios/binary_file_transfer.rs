//! GetFile over the binary encoding, relayed

use crate::framework::{id, Check, Overlay, TestScenario, CSMS, STATION};
use anyhow::Result;
use async_trait::async_trait;
use ocpp_codec::messages::{GetFileRequest, GetFileStatus};
use ocpp_codec::{OcppResponse, SerializationFormat, SourceRouting};
use ocpp_node::station::{self, FileStore};
use tokio_util::sync::CancellationToken;

pub struct BinaryFileTransferTest {
    pub file_name: String,
    pub content: Vec<u8>,
}

impl Default for BinaryFileTransferTest {
    fn default() -> Self {
        Self {
            file_name: "diagnostics.log".to_string(),
            // Non-UTF-8 bytes survive the binary path untouched
            content: vec![0x00, 0xff, 0x10, 0x80, b'o', b'k'],
        }
    }
}

#[async_trait]
impl TestScenario for BinaryFileTransferTest {
    fn name(&self) -> &str {
        "binary_file_transfer"
    }

    fn description(&self) -> &str {
        "GetFile in binary format crosses the relay and returns the raw bytes"
    }

    async fn execute(&self, overlay: &Overlay) -> Result<Vec<Check>> {
        let csms = overlay.node(CSMS)?;
        station::install(
            &*overlay.node(STATION)?,
            FileStore::default().with_file(self.file_name.clone(), self.content.clone()),
        )?;

        let options = csms.request_options().with_format(SerializationFormat::Binary);
        let found = csms
            .send(
                GetFileRequest::new(SourceRouting::to(id(STATION)?), self.file_name.clone(), Some(1), options.clone())?,
                &CancellationToken::new(),
            )
            .await?;
        let missing = csms
            .send(
                GetFileRequest::new(SourceRouting::to(id(STATION)?), "absent.bin", None, options)?,
                &CancellationToken::new(),
            )
            .await?;

        Ok(vec![
            Check::equal("status", *found.status(), GetFileStatus::Success),
            Check::equal("content", found.file_content().clone(), self.content.clone()),
            Check::equal(
                "response format",
                found.envelope().serialization_format(),
                SerializationFormat::Binary,
            ),
            Check::equal("missing file", *missing.status(), GetFileStatus::NotFound),
        ])
    }
}
