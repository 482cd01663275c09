//! Inbound calls this node has handled
//!
//! A CALL reaches its handler at most once per `(originator, RequestId)`
//! within the window. A redelivery that arrives while the first delivery is
//! still being handled is ignored; one that arrives after the answer went
//! out gets the recorded reply again.
//!
//! ```text
//! admit ─► Handle ─► handler ─► record_reply
//!   │
//!   ├────► InProgress            (reply not yet recorded)
//!   └────► Replay(reply)         (answered inside the window)
//! ```

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ocpp_network::TransportEnvelope;
use ocpp_types::{NetworkingNodeId, RequestId};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

type CallKey = (NetworkingNodeId, RequestId);

#[derive(Debug)]
struct HandledCall {
    seen_at: Instant,
    reply: Option<TransportEnvelope>,
}

/// What to do with an inbound CALL
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// First delivery inside the window: run the handler
    Handle,
    /// The first delivery is still being handled
    InProgress,
    /// Already answered; send this reply again
    Replay(TransportEnvelope),
}

/// Windowed record of handled inbound calls
#[derive(Debug)]
pub struct HandledCalls {
    window: Duration,
    calls: DashMap<CallKey, HandledCall>,
}

impl HandledCalls {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            calls: DashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Decide whether a delivery of `request_id` from `originator` is handled
    pub fn admit(&self, originator: &NetworkingNodeId, request_id: &RequestId) -> Admission {
        let now = Instant::now();
        match self.calls.entry((originator.clone(), request_id.clone())) {
            Entry::Occupied(entry) if now.duration_since(entry.get().seen_at) < self.window => {
                match &entry.get().reply {
                    Some(reply) => Admission::Replay(reply.clone()),
                    None => Admission::InProgress,
                }
            }
            Entry::Occupied(mut entry) => {
                entry.insert(HandledCall {
                    seen_at: now,
                    reply: None,
                });
                Admission::Handle
            }
            Entry::Vacant(slot) => {
                slot.insert(HandledCall {
                    seen_at: now,
                    reply: None,
                });
                Admission::Handle
            }
        }
    }

    /// Keep the reply sent for an admitted call
    pub fn record_reply(&self, originator: &NetworkingNodeId, request_id: &RequestId, reply: TransportEnvelope) {
        if let Some(mut call) = self.calls.get_mut(&(originator.clone(), request_id.clone())) {
            call.reply = Some(reply);
        }
    }

    /// Drop answered calls older than the window
    ///
    /// Calls still being handled stay, so a slow handler is never entered twice.
    pub fn purge_expired(&self) -> usize {
        let before = self.calls.len();
        let window = self.window;
        self.calls
            .retain(|_, call| call.reply.is_none() || call.seen_at.elapsed() < window);
        let removed = before - self.calls.len();
        if removed > 0 {
            debug!(removed, "Purged handled inbound calls");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use ocpp_types::SerializationFormat;

    fn node(s: &str) -> NetworkingNodeId {
        NetworkingNodeId::new(s).unwrap()
    }

    fn id(s: &str) -> RequestId {
        RequestId::new(s).unwrap()
    }

    fn reply(body: &'static [u8]) -> TransportEnvelope {
        TransportEnvelope::reply(Bytes::from_static(body), SerializationFormat::Json, None)
    }

    #[tokio::test(start_paused = true)]
    async fn second_delivery_waits_then_replays_the_answer() {
        let calls = HandledCalls::new(Duration::from_secs(60));
        assert_eq!(calls.admit(&node("csms"), &id("1")), Admission::Handle);
        assert_eq!(calls.admit(&node("csms"), &id("1")), Admission::InProgress);

        calls.record_reply(&node("csms"), &id("1"), reply(b"[3,\"1\",{}]"));
        assert_eq!(
            calls.admit(&node("csms"), &id("1")),
            Admission::Replay(reply(b"[3,\"1\",{}]"))
        );
        // Same id from another originator is a different exchange
        assert_eq!(calls.admit(&node("nn-1"), &id("1")), Admission::Handle);
    }

    #[tokio::test(start_paused = true)]
    async fn answered_calls_expire_after_the_window() {
        let calls = HandledCalls::new(Duration::from_secs(60));
        calls.admit(&node("csms"), &id("1"));
        calls.record_reply(&node("csms"), &id("1"), reply(b"[3,\"1\",{}]"));
        calls.admit(&node("csms"), &id("2"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(calls.purge_expired(), 1);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls.admit(&node("csms"), &id("1")), Admission::Handle);
    }
}
