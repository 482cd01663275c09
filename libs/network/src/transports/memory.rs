//! In-memory transport
//!
//! Links façades inside one process over bounded `tokio::sync::mpsc`
//! channels. Used by the demo binary and by every multi-node test.
//!
//! Nodes can only reach neighbours they were explicitly linked with, so a
//! CS ↔ NN ↔ CSMS topology really forces traffic through the relay.

use super::{Transport, TransportEnvelope};
use crate::{Result, TransportError};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use ocpp_types::{NetworkingNodeId, RequestId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Default per-node inbound queue depth
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Shared switchboard of attached nodes and their links
#[derive(Debug, Default)]
pub struct MemoryNetwork {
    inboxes: DashMap<NetworkingNodeId, mpsc::Sender<TransportEnvelope>>,
    links: DashSet<(NetworkingNodeId, NetworkingNodeId)>,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach `node`, returning its transport and inbound queue
    pub fn attach(
        self: &Arc<Self>,
        node: NetworkingNodeId,
    ) -> (Arc<MemoryTransport>, mpsc::Receiver<TransportEnvelope>) {
        let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        self.inboxes.insert(node.clone(), tx);
        debug!(node = %node, "Attached to in-memory network");
        let transport = Arc::new(MemoryTransport {
            local: node,
            network: Arc::clone(self),
            swallow: AtomicBool::new(false),
            sent: AtomicU64::new(0),
            swallowed: AtomicU64::new(0),
            abandoned: Mutex::new(Vec::new()),
        });
        (transport, rx)
    }

    /// Bidirectional link between two nodes
    pub fn link(&self, a: &NetworkingNodeId, b: &NetworkingNodeId) {
        self.links.insert((a.clone(), b.clone()));
        self.links.insert((b.clone(), a.clone()));
    }

    pub fn is_linked(&self, from: &NetworkingNodeId, to: &NetworkingNodeId) -> bool {
        self.links.contains(&(from.clone(), to.clone()))
    }
}

/// One node's handle onto a [`MemoryNetwork`]
#[derive(Debug)]
pub struct MemoryTransport {
    local: NetworkingNodeId,
    network: Arc<MemoryNetwork>,
    swallow: AtomicBool,
    sent: AtomicU64,
    swallowed: AtomicU64,
    abandoned: Mutex<Vec<RequestId>>,
}

impl MemoryTransport {
    /// Accept sends but never deliver them
    pub fn set_swallow(&self, swallow: bool) {
        self.swallow.store(swallow, Ordering::Relaxed);
    }

    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn swallowed_count(&self) -> u64 {
        self.swallowed.load(Ordering::Relaxed)
    }

    /// Ids the engine told this transport to abandon, oldest first
    pub fn abandoned(&self) -> Vec<RequestId> {
        self.abandoned.lock().clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, mut envelope: TransportEnvelope) -> Result<()> {
        let peer = match envelope.link.take() {
            Some(peer) => peer,
            None => {
                let frame = ocpp_codec::Frame::decode(&envelope.frame, envelope.format)?;
                return Err(TransportError::MissingLink {
                    request_id: frame.request_id().clone(),
                });
            }
        };
        if !self.network.is_linked(&self.local, &peer) {
            return Err(TransportError::NoLink {
                from: self.local.clone(),
                to: peer,
            });
        }
        if self.swallow.load(Ordering::Relaxed) {
            self.swallowed.fetch_add(1, Ordering::Relaxed);
            trace!(from = %self.local, to = %peer, "Swallowing frame");
            return Ok(());
        }
        let inbox = self
            .network
            .inboxes
            .get(&peer)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::Closed { peer: peer.clone() })?;

        envelope.link = Some(self.local.clone());
        inbox
            .send(envelope)
            .await
            .map_err(|_| TransportError::Closed { peer: peer.clone() })?;
        self.sent.fetch_add(1, Ordering::Relaxed);
        trace!(from = %self.local, to = %peer, "Delivered frame");
        Ok(())
    }

    async fn abandon(&self, request_id: &RequestId) {
        debug!(node = %self.local, request_id = %request_id, "Abandoning request");
        self.abandoned.lock().push(request_id.clone());
    }

    fn local_id(&self) -> &NetworkingNodeId {
        &self.local
    }
}
