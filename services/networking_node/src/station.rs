//! Demo charging-station behaviour
//!
//! Shows the staging pattern: the RemoteStartTransaction handler answers
//! `Accepted` at once and enqueues the StartTransaction report, whose
//! completion callback is the only writer of connector state.

use crate::actions::RequestHandler;
use crate::error::NodeResult;
use crate::node::NetworkingNode;
use crate::outbox::Outbox;
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use ocpp_codec::messages::{
    AuthorizationStatus, GetFileRequest, GetFileResponse, GetFileStatus,
    RemoteStartTransactionRequest, RemoteStartTransactionResponse, StartTransactionRequest,
};
use ocpp_codec::{OcppRequest, OcppResponse, RequestOptions, SourceRouting};
use ocpp_types::{ConnectorId, TransactionId};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Meter reading reported when a demo transaction starts
const DEMO_METER_START: i32 = 0;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectorState {
    pub id_tag: Option<String>,
    pub transaction_id: Option<TransactionId>,
}

/// Connector table of one station
#[derive(Debug, Default)]
pub struct Connectors {
    state: RwLock<BTreeMap<ConnectorId, ConnectorState>>,
}

impl Connectors {
    pub fn get(&self, connector: ConnectorId) -> Option<ConnectorState> {
        self.state.read().get(&connector).cloned()
    }

    pub fn transaction(&self, connector: ConnectorId) -> Option<TransactionId> {
        self.get(connector).and_then(|state| state.transaction_id)
    }

    pub fn snapshot(&self) -> BTreeMap<ConnectorId, ConnectorState> {
        self.state.read().clone()
    }

    fn record(&self, connector: ConnectorId, id_tag: String, transaction_id: TransactionId) {
        self.state.write().insert(
            connector,
            ConnectorState {
                id_tag: Some(id_tag),
                transaction_id: Some(transaction_id),
            },
        );
    }
}

/// Accepts remote starts and reports them with a staged StartTransaction
pub struct RemoteStartHandler {
    outbox: Arc<Outbox>,
    connectors: Arc<Connectors>,
    options: RequestOptions,
}

impl RemoteStartHandler {
    pub fn new(outbox: Arc<Outbox>, connectors: Arc<Connectors>, options: RequestOptions) -> Self {
        Self {
            outbox,
            connectors,
            options,
        }
    }
}

#[async_trait]
impl RequestHandler<RemoteStartTransactionRequest> for RemoteStartHandler {
    async fn handle(&self, request: RemoteStartTransactionRequest) -> anyhow::Result<RemoteStartTransactionResponse> {
        let csms = request
            .envelope()
            .origin()
            .cloned()
            .context("remote start carries no originator")?;
        let connector = request.connector_id().unwrap_or(ConnectorId::new(1));
        let id_tag = request.id_tag().clone();

        let report = StartTransactionRequest::new(
            SourceRouting::to(csms),
            connector,
            id_tag.clone(),
            DEMO_METER_START,
            Utc::now(),
            self.options.clone(),
        )?;

        let connectors = Arc::clone(&self.connectors);
        self.outbox.enqueue(report, move |outcome| match outcome {
            Ok(response)
                if response.result().is_ok()
                    && response.id_tag_info().status == AuthorizationStatus::Accepted =>
            {
                info!(connector = %connector, transaction_id = %response.transaction_id(), "Transaction started");
                connectors.record(connector, id_tag, *response.transaction_id());
            }
            Ok(response) => warn!(
                connector = %connector,
                result = %response.result(),
                status = %response.id_tag_info().status,
                "StartTransaction was not accepted"
            ),
            Err(err) => warn!(connector = %connector, error = %err, "StartTransaction failed"),
        })?;

        Ok(RemoteStartTransactionResponse::accepted(&request))
    }
}

/// Serves GetFile from an in-memory file table
#[derive(Debug, Default)]
pub struct FileStore {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl FileStore {
    pub fn with_file(self, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.files.write().insert(name.into(), content.into());
        self
    }
}

#[async_trait]
impl RequestHandler<GetFileRequest> for FileStore {
    async fn handle(&self, request: GetFileRequest) -> anyhow::Result<GetFileResponse> {
        let content = self.files.read().get(request.file_name()).cloned();
        match content {
            Some(content) => Ok(GetFileResponse::success(&request, content, None)?),
            None => Ok(GetFileResponse::with_status(&request, GetFileStatus::NotFound, None)),
        }
    }
}

/// Install the demo station handlers on `node`
pub fn install(node: &NetworkingNode, files: FileStore) -> NodeResult<Arc<Connectors>> {
    let connectors = Arc::new(Connectors::default());
    node.register(RemoteStartHandler::new(
        Arc::clone(node.outbox()),
        Arc::clone(&connectors),
        node.request_options(),
    ))?;
    node.register(files)?;
    Ok(connectors)
}
