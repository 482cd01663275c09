//! RemoteStartTransaction through a networking node
//!
//! The CSMS asks the station to start charging. The station answers at
//! once and reports the transaction with a staged StartTransaction, which
//! travels back through the same relay.

use crate::framework::{id, Check, Overlay, TestScenario, CSMS, RELAY, STATION};
use anyhow::{Context, Result};
use async_trait::async_trait;
use ocpp_codec::messages::{RemoteStartStatus, RemoteStartTransactionRequest};
use ocpp_codec::{NetworkPath, OcppResponse, SourceRouting};
use ocpp_node::csms::{self, TransactionBook};
use ocpp_node::station::{self, Connectors, FileStore};
use ocpp_types::{ConnectorId, TransactionId};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct RemoteStartThroughRelayTest {
    pub id_tag: String,
    pub connector: ConnectorId,
    /// How long the staged StartTransaction may take
    pub confirmation_window: Duration,
}

impl Default for RemoteStartThroughRelayTest {
    fn default() -> Self {
        Self {
            id_tag: "TAG-0001".to_string(),
            connector: ConnectorId::new(1),
            confirmation_window: Duration::from_secs(2),
        }
    }
}

/// Poll until the connector reports a transaction
pub async fn wait_for_transaction(
    connectors: &Connectors,
    connector: ConnectorId,
    window: Duration,
) -> Option<TransactionId> {
    tokio::time::timeout(window, async {
        loop {
            if let Some(transaction) = connectors.transaction(connector) {
                break transaction;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .ok()
}

#[async_trait]
impl TestScenario for RemoteStartThroughRelayTest {
    fn name(&self) -> &str {
        "remote_start"
    }

    fn description(&self) -> &str {
        "CSMS → NN → CS RemoteStart answered Accepted, staged StartTransaction assigns a transaction"
    }

    async fn execute(&self, overlay: &Overlay) -> Result<Vec<Check>> {
        let csms_node = overlay.node(CSMS)?;
        let station_node = overlay.node(STATION)?;
        csms::install(&csms_node, TransactionBook::default())?;
        let connectors = station::install(&station_node, FileStore::default())?;

        let request = RemoteStartTransactionRequest::new(
            SourceRouting::to(id(STATION)?),
            self.id_tag.clone(),
            Some(self.connector),
            csms_node.request_options(),
        )?;
        let response = csms_node
            .send(request, &CancellationToken::new())
            .await
            .context("RemoteStartTransaction did not complete")?;
        info!(status = %response.status(), "RemoteStartTransaction answered");

        let transaction = wait_for_transaction(&connectors, self.connector, self.confirmation_window).await;
        let relay_stats = overlay
            .node(RELAY)?
            .forwarding()
            .map(|engine| engine.stats())
            .context("relay has no forwarding engine")?;

        Ok(vec![
            Check::that("response ok", response.result().is_ok(), response.result().to_string()),
            Check::equal("remote start status", *response.status(), RemoteStartStatus::Accepted),
            Check::equal(
                "response path",
                response.envelope().network_path().clone(),
                NetworkPath::from_hops(vec![id(RELAY)?]),
            ),
            Check::equal("transaction assigned", transaction, Some(TransactionId::new(1))),
            Check::equal("requests forwarded", relay_stats.forwarded, 2),
            Check::equal("responses relayed", relay_stats.responses_relayed, 2),
        ])
    }
}
