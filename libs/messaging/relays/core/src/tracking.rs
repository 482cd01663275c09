//! # Relay Bookkeeping
//!
//! Two expiring tables keyed by `(originator, RequestId)`, since request ids
//! are only unique per originating node:
//!
//! - [`DuplicateCache`]: pairs seen recently, so a redelivered CALL is
//!   dropped instead of forwarded twice.
//! - [`ForwardedRequests`]: reverse-path entries for every CALL this relay
//!   forwarded, so the downstream CALLRESULT / CALLERROR finds its way back
//!   to the previous hop. A reply names its originator as the final hop of
//!   its destination.
//!
//! Both are `DashMap`s; expired entries are ignored on lookup and removed
//! by `purge_expired`, which the owning node runs from its maintenance loop.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ocpp_types::{NetworkPath, NetworkingNodeId, RequestId, SerializationFormat, SourceRouting};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Recently seen inbound calls
#[derive(Debug)]
pub struct DuplicateCache {
    window: Duration,
    seen: DashMap<(NetworkingNodeId, RequestId), Instant>,
}

impl DuplicateCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: DashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record the pair; `true` when it was already seen within the window
    pub fn check_and_record(&self, originator: &NetworkingNodeId, request_id: &RequestId) -> bool {
        let now = Instant::now();
        match self.seen.entry((originator.clone(), request_id.clone())) {
            Entry::Occupied(mut seen) => {
                if now.duration_since(*seen.get()) < self.window {
                    return true;
                }
                seen.insert(now);
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                false
            }
        }
    }

    pub fn purge_expired(&self) -> usize {
        let before = self.seen.len();
        let window = self.window;
        self.seen.retain(|_, seen_at| seen_at.elapsed() < window);
        before - self.seen.len()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Reverse-path entry for one forwarded CALL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedRequest {
    pub request_id: RequestId,
    pub action: String,
    /// Neighbour the CALL arrived from; its reply goes back here
    pub previous_hop: NetworkingNodeId,
    pub originator: NetworkingNodeId,
    /// Path of the CALL as it left this relay
    pub network_path: NetworkPath,
    pub format: SerializationFormat,
    pub expires_at: Instant,
}

impl ForwardedRequest {
    /// Route the downstream reply must retrace
    pub fn reply_route(&self) -> SourceRouting {
        SourceRouting::reverse_of(&self.network_path, self.originator.clone())
    }
}

type ExchangeKey = (NetworkingNodeId, RequestId);

/// CALLs forwarded by this relay and awaiting their reply
#[derive(Debug, Default)]
pub struct ForwardedRequests {
    entries: DashMap<ExchangeKey, ForwardedRequest>,
}

impl ForwardedRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember(&self, entry: ForwardedRequest) {
        let key = (entry.originator.clone(), entry.request_id.clone());
        if let Some(replaced) = self.entries.insert(key, entry) {
            debug!(
                request_id = %replaced.request_id,
                originator = %replaced.originator,
                "Forwarded request replaced by a newer CALL with the same id"
            );
        }
    }

    /// Claim the entry for a reply; expired entries are treated as absent
    pub fn take(&self, originator: &NetworkingNodeId, request_id: &RequestId) -> Option<ForwardedRequest> {
        let (_, entry) = self
            .entries
            .remove(&(originator.clone(), request_id.clone()))?;
        if entry.expires_at <= Instant::now() {
            debug!(request_id = %request_id, originator = %originator, "Forwarded request expired before its reply");
            return None;
        }
        Some(entry)
    }

    pub fn contains(&self, originator: &NetworkingNodeId, request_id: &RequestId) -> bool {
        self.entries
            .contains_key(&(originator.clone(), request_id.clone()))
    }

    /// Originator of the only entry carrying `request_id`
    ///
    /// `None` when no entry or several entries share the id; a reply without
    /// a destination cannot be attributed then.
    pub fn sole_originator(&self, request_id: &RequestId) -> Option<NetworkingNodeId> {
        let mut matches = self
            .entries
            .iter()
            .filter(|entry| &entry.key().1 == request_id)
            .map(|entry| entry.key().0.clone());
        let originator = matches.next()?;
        matches.next().is_none().then_some(originator)
    }

    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(s: &str) -> NetworkingNodeId {
        NetworkingNodeId::new(s).unwrap()
    }

    fn id(s: &str) -> RequestId {
        RequestId::new(s).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn duplicates_are_detected_only_inside_the_window() {
        let cache = DuplicateCache::new(Duration::from_secs(60));
        assert!(!cache.check_and_record(&node("cs1"), &id("1")));
        assert!(cache.check_and_record(&node("cs1"), &id("1")));
        // Same id from another originator is a different exchange
        assert!(!cache.check_and_record(&node("cs2"), &id("1")));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.purge_expired(), 2);
        assert!(!cache.check_and_record(&node("cs1"), &id("1")));
    }

    #[tokio::test(start_paused = true)]
    async fn forwarded_entries_expire() {
        let table = ForwardedRequests::new();
        table.remember(ForwardedRequest {
            request_id: id("7"),
            action: "GetFile".into(),
            previous_hop: node("cs1"),
            originator: node("cs1"),
            network_path: NetworkPath::empty().appended(node("nn1")),
            format: SerializationFormat::Json,
            expires_at: Instant::now() + Duration::from_secs(5),
        });
        assert!(table.contains(&node("cs1"), &id("7")));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(table.take(&node("cs1"), &id("7")).is_none());
        assert!(table.is_empty());
    }

    fn forwarded(request_id: &str, originator: &str) -> ForwardedRequest {
        ForwardedRequest {
            request_id: id(request_id),
            action: "GetFile".into(),
            previous_hop: node(originator),
            originator: node(originator),
            network_path: NetworkPath::empty().appended(node("nn1")),
            format: SerializationFormat::Json,
            expires_at: Instant::now() + Duration::from_secs(30),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn same_id_from_two_originators_keeps_both_entries() {
        let table = ForwardedRequests::new();
        table.remember(forwarded("1", "cs1"));
        table.remember(forwarded("1", "cs2"));
        assert_eq!(table.len(), 2);
        assert_eq!(table.sole_originator(&id("1")), None);

        let first = table.take(&node("cs1"), &id("1")).unwrap();
        assert_eq!(first.previous_hop, node("cs1"));
        assert_eq!(table.sole_originator(&id("1")), Some(node("cs2")));
        assert_eq!(table.take(&node("cs2"), &id("1")).unwrap().previous_hop, node("cs2"));
        assert!(table.is_empty());
    }

    #[test]
    fn reply_route_retraces_the_path() {
        let entry = ForwardedRequest {
            request_id: id("9"),
            action: "Reset".into(),
            previous_hop: node("nn1"),
            originator: node("cs1"),
            network_path: NetworkPath::from_hops(vec![node("nn1"), node("nn2")]),
            format: SerializationFormat::Binary,
            expires_at: Instant::now(),
        };
        assert_eq!(
            entry.reply_route(),
            SourceRouting::via(vec![node("nn2"), node("nn1")], node("cs1"))
        );
    }
}
