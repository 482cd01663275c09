//! # Routing Table
//!
//! ## Purpose
//!
//! Maps a final destination to the neighbour that leads towards it. An
//! optional default route catches every destination without an explicit
//! entry.
//!
//! ```text
//!  SourceRouting::Via{relays, destination} ──► element after the local node
//!  SourceRouting::To(destination)          ──► routes[destination] or default
//! ```
//!
//! Lookups take a per-shard read lock only; routes can be changed while the
//! relay is running.

use crate::error::{RelayError, RelayResult};
use dashmap::DashMap;
use ocpp_types::{NetworkingNodeId, SourceRouting};
use parking_lot::RwLock;
use tracing::{debug, info};

/// Destination → next hop
#[derive(Debug)]
pub struct RoutingTable {
    local: NetworkingNodeId,
    routes: DashMap<NetworkingNodeId, NetworkingNodeId>,
    default_route: RwLock<Option<NetworkingNodeId>>,
}

impl RoutingTable {
    pub fn new(local: NetworkingNodeId) -> Self {
        Self {
            local,
            routes: DashMap::new(),
            default_route: RwLock::new(None),
        }
    }

    pub fn local(&self) -> &NetworkingNodeId {
        &self.local
    }

    /// Reach `destination` through `next_hop`
    pub fn add_route(&self, destination: NetworkingNodeId, next_hop: NetworkingNodeId) -> RelayResult<()> {
        if next_hop == self.local {
            return Err(RelayError::SelfRoute { destination });
        }
        info!(destination = %destination, next_hop = %next_hop, "Route added");
        self.routes.insert(destination, next_hop);
        Ok(())
    }

    /// Directly connected peer
    pub fn add_neighbour(&self, neighbour: NetworkingNodeId) -> RelayResult<()> {
        self.add_route(neighbour.clone(), neighbour)
    }

    pub fn remove_route(&self, destination: &NetworkingNodeId) -> Option<NetworkingNodeId> {
        self.routes.remove(destination).map(|(_, hop)| hop)
    }

    pub fn set_default_route(&self, next_hop: Option<NetworkingNodeId>) -> RelayResult<()> {
        if let Some(hop) = &next_hop {
            if *hop == self.local {
                return Err(RelayError::SelfRoute {
                    destination: hop.clone(),
                });
            }
        }
        *self.default_route.write() = next_hop;
        Ok(())
    }

    pub fn default_route(&self) -> Option<NetworkingNodeId> {
        self.default_route.read().clone()
    }

    /// Neighbour to hand a message for `routing` to, if any
    pub fn next_hop(&self, routing: &SourceRouting) -> Option<NetworkingNodeId> {
        if let Some(hop) = routing.explicit_next_hop(&self.local) {
            return Some(hop.clone());
        }
        let destination = routing.final_destination();
        if let Some(hop) = self.routes.get(destination) {
            return Some(hop.value().clone());
        }
        let fallback = self.default_route();
        if fallback.is_some() {
            debug!(destination = %destination, "Using default route");
        }
        fallback
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(s: &str) -> NetworkingNodeId {
        NetworkingNodeId::new(s).unwrap()
    }

    #[test]
    fn explicit_hop_list_wins_over_table() {
        let table = RoutingTable::new(node("nn1"));
        table.add_route(node("csms"), node("nn9")).unwrap();

        let routing = SourceRouting::via(vec![node("nn1"), node("nn2")], node("csms"));
        assert_eq!(table.next_hop(&routing), Some(node("nn2")));

        let last_relay = SourceRouting::via(vec![node("nn1")], node("csms"));
        assert_eq!(table.next_hop(&last_relay), Some(node("csms")));
    }

    #[test]
    fn unknown_destination_uses_default_route_when_set() {
        let table = RoutingTable::new(node("nn1"));
        table.add_neighbour(node("cs1")).unwrap();
        let unknown = SourceRouting::to(node("cs-unknown"));

        assert_eq!(table.next_hop(&SourceRouting::to(node("cs1"))), Some(node("cs1")));
        assert_eq!(table.next_hop(&unknown), None);

        table.set_default_route(Some(node("csms"))).unwrap();
        assert_eq!(table.next_hop(&unknown), Some(node("csms")));
    }

    #[test]
    fn routes_through_self_are_refused() {
        let table = RoutingTable::new(node("nn1"));
        assert_eq!(
            table.add_route(node("csms"), node("nn1")),
            Err(RelayError::SelfRoute {
                destination: node("csms")
            })
        );
        assert!(table.set_default_route(Some(node("nn1"))).is_err());
        assert!(table.is_empty());
    }
}
