//! Staged outbound requests
//!
//! A handler that must originate a request of its own (a station answering
//! RemoteStartTransaction, then reporting StartTransaction) cannot await
//! that exchange inside the handler: the reply to the first exchange would
//! wait on the second. It enqueues instead. The [`Outbox`] hands jobs to a
//! dispatcher task over an unbounded channel, so `enqueue` never blocks,
//! and tracks each job's [`EnqueuedStatus`].
//!
//! ```text
//! enqueue ─► New ─► dispatcher ─► Processing ─► send ─► on_complete ─► Finished
//! ```

use crate::error::{NodeError, NodeResult};
use crate::node::NetworkingNode;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use ocpp_codec::OcppRequest;
use ocpp_network::{panic_message, ExchangeError};
use ocpp_types::RequestId;
use parking_lot::Mutex;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EnqueuedStatus {
    New,
    Processing,
    Finished,
}

/// Bookkeeping for one staged request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnqueuedRequest {
    pub request_id: RequestId,
    pub action: &'static str,
    pub enqueued_at: DateTime<Utc>,
    pub status: EnqueuedStatus,
}

type Job = Box<dyn FnOnce(Arc<NetworkingNode>) -> BoxFuture<'static, ()> + Send>;

/// Queue of staged requests for one node
pub struct Outbox {
    entries: DashMap<RequestId, EnqueuedRequest>,
    tx: mpsc::UnboundedSender<(RequestId, Job)>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<(RequestId, Job)>>>,
}

impl Outbox {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            entries: DashMap::new(),
            tx,
            rx: Mutex::new(Some(rx)),
        })
    }

    /// Stage `request`; `on_complete` runs with the outcome once it resolves
    ///
    /// Returns immediately. The request is sent after the caller's current
    /// exchange has had a chance to answer.
    pub fn enqueue<R, F>(&self, request: R, on_complete: F) -> NodeResult<RequestId>
    where
        R: OcppRequest,
        F: FnOnce(NodeResult<R::Response>) + Send + 'static,
    {
        let request_id = request.request_id().clone();
        match self.entries.entry(request_id.clone()) {
            Entry::Occupied(_) => {
                return Err(ExchangeError::DuplicateRequestId { request_id }.into());
            }
            Entry::Vacant(slot) => {
                slot.insert(EnqueuedRequest {
                    request_id: request_id.clone(),
                    action: R::action(),
                    enqueued_at: Utc::now(),
                    status: EnqueuedStatus::New,
                });
            }
        }

        let job_id = request_id.clone();
        let job: Job = Box::new(move |node: Arc<NetworkingNode>| {
            async move {
                let cancel = node.shutdown_token().child_token();
                let outcome = node.send(request, &cancel).await;
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| on_complete(outcome))) {
                    error!(
                        request_id = %job_id,
                        message = %panic_message(panic.as_ref()),
                        "Completion callback panicked"
                    );
                }
            }
            .boxed()
        });

        if self.tx.send((request_id.clone(), job)).is_err() {
            self.entries.remove(&request_id);
            return Err(NodeError::QueueClosed { request_id });
        }
        info!(request_id = %request_id, action = R::action(), "Request enqueued");
        Ok(request_id)
    }

    pub fn status(&self, request_id: &RequestId) -> Option<EnqueuedStatus> {
        self.entries.get(request_id).map(|entry| entry.status)
    }

    pub fn get(&self, request_id: &RequestId) -> Option<EnqueuedRequest> {
        self.entries.get(request_id).map(|entry| entry.clone())
    }

    /// Staged requests, oldest first
    pub fn snapshot(&self) -> Vec<EnqueuedRequest> {
        let mut entries: Vec<_> = self.entries.iter().map(|entry| entry.clone()).collect();
        entries.sort_by_key(|entry| entry.enqueued_at);
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget finished entries
    pub fn sweep_finished(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.status != EnqueuedStatus::Finished);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "Swept finished enqueued requests");
        }
        removed
    }

    fn mark(&self, request_id: &RequestId, status: EnqueuedStatus) {
        if let Some(mut entry) = self.entries.get_mut(request_id) {
            entry.status = status;
        }
    }

    /// Start the dispatcher; `None` if it was already started
    pub(crate) fn spawn_dispatcher(
        self: &Arc<Self>,
        node: Arc<NetworkingNode>,
        shutdown: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        let mut rx = self.rx.lock().take()?;
        let outbox = Arc::clone(self);
        Some(tokio::spawn(async move {
            debug!(node = %node.id(), "Outbox dispatcher started");
            loop {
                let (request_id, job) = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(next) => next,
                        None => break,
                    },
                };
                outbox.mark(&request_id, EnqueuedStatus::Processing);
                let outbox = Arc::clone(&outbox);
                let node = Arc::clone(&node);
                tokio::spawn(async move {
                    job(node).await;
                    outbox.mark(&request_id, EnqueuedStatus::Finished);
                    debug!(request_id = %request_id, "Enqueued request finished");
                });
            }
            debug!(node = %node.id(), "Outbox dispatcher stopped");
        }))
    }
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox").field("entries", &self.entries.len()).finish()
    }
}
