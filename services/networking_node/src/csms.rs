//! Demo CSMS behaviour

use crate::actions::RequestHandler;
use crate::error::NodeResult;
use crate::node::NetworkingNode;
use async_trait::async_trait;
use ocpp_codec::messages::{
    AuthorizationStatus, IdTagInfo, StartTransactionRequest, StartTransactionResponse,
};
use ocpp_types::TransactionId;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::info;

/// Assigns increasing transaction ids to accepted idTags
#[derive(Debug)]
pub struct TransactionBook {
    next_id: AtomicI32,
    blocked: RwLock<HashSet<String>>,
}

impl Default for TransactionBook {
    fn default() -> Self {
        Self {
            next_id: AtomicI32::new(1),
            blocked: RwLock::new(HashSet::new()),
        }
    }
}

impl TransactionBook {
    pub fn block(&self, id_tag: impl Into<String>) {
        self.blocked.write().insert(id_tag.into());
    }

    /// Transactions handed out so far
    pub fn issued(&self) -> i32 {
        self.next_id.load(Ordering::Relaxed) - 1
    }
}

#[async_trait]
impl RequestHandler<StartTransactionRequest> for TransactionBook {
    async fn handle(&self, request: StartTransactionRequest) -> anyhow::Result<StartTransactionResponse> {
        if self.blocked.read().contains(request.id_tag()) {
            info!(id_tag = %request.id_tag(), "Blocked idTag");
            return Ok(StartTransactionResponse::new(
                &request,
                TransactionId::new(0),
                IdTagInfo::new(AuthorizationStatus::Blocked),
            ));
        }
        let transaction_id = TransactionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        info!(
            connector = %request.connector_id(),
            id_tag = %request.id_tag(),
            %transaction_id,
            "Transaction opened"
        );
        Ok(StartTransactionResponse::new(
            &request,
            transaction_id,
            IdTagInfo::new(AuthorizationStatus::Accepted),
        ))
    }
}

/// Install the demo CSMS handlers on `node`
pub fn install(node: &NetworkingNode, book: TransactionBook) -> NodeResult<()> {
    node.register(book)
}
