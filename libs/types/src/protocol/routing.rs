//! # Overlay Routing Values
//!
//! ## Purpose
//! Describes where a message is going (`SourceRouting`) and where it has
//! already been (`NetworkPath`).
//!
//! ## Architecture Role
//! ```text
//! CS ──► NN-1 ──► NN-2 ──► CSMS
//!         │        │
//!   path: [NN-1] [NN-1, NN-2]         (each relay appends itself)
//!
//! Response: SourceRouting::reverse_of([NN-1, NN-2], CS)
//!         = via [NN-2, NN-1] to CS
//! ```
//!
//! The originator never appears in its own `NetworkPath`; it travels next to
//! the message as the transport-level source.

use crate::common::errors::ValidationError;
use crate::common::identifiers::NetworkingNodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared destination of a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceRouting {
    /// Single peer; intermediate hops come from the routing table
    To(NetworkingNodeId),
    /// Explicit hop list threaded through `relays` before reaching `destination`
    Via {
        relays: Vec<NetworkingNodeId>,
        destination: NetworkingNodeId,
    },
}

impl SourceRouting {
    pub fn to(destination: NetworkingNodeId) -> Self {
        SourceRouting::To(destination)
    }

    /// Build an explicit route; an empty relay list collapses to `To`
    pub fn via(relays: Vec<NetworkingNodeId>, destination: NetworkingNodeId) -> Self {
        if relays.is_empty() {
            SourceRouting::To(destination)
        } else {
            SourceRouting::Via {
                relays,
                destination,
            }
        }
    }

    /// Build from a full hop list whose last element is the destination
    pub fn from_hops(mut hops: Vec<NetworkingNodeId>) -> Result<Self, ValidationError> {
        let destination = hops.pop().ok_or(ValidationError::Empty {
            kind: "source routing hop list",
        })?;
        Ok(Self::via(hops, destination))
    }

    /// Route that retraces `path` backwards to `origin`
    pub fn reverse_of(path: &NetworkPath, origin: NetworkingNodeId) -> Self {
        Self::via(path.reversed_hops(), origin)
    }

    pub fn final_destination(&self) -> &NetworkingNodeId {
        match self {
            SourceRouting::To(destination) => destination,
            SourceRouting::Via { destination, .. } => destination,
        }
    }

    pub fn relays(&self) -> &[NetworkingNodeId] {
        match self {
            SourceRouting::To(_) => &[],
            SourceRouting::Via { relays, .. } => relays,
        }
    }

    pub fn is_for(&self, node: &NetworkingNodeId) -> bool {
        self.final_destination() == node
    }

    /// Next hop dictated by an explicit hop list, as seen from `current`
    ///
    /// Returns `None` for `To` routes (the routing table decides) and when
    /// `current` is already the destination.
    pub fn explicit_next_hop(&self, current: &NetworkingNodeId) -> Option<&NetworkingNodeId> {
        match self {
            SourceRouting::To(_) => None,
            SourceRouting::Via {
                relays,
                destination,
            } => {
                if destination == current {
                    return None;
                }
                match relays.iter().position(|hop| hop == current) {
                    Some(idx) => Some(relays.get(idx + 1).unwrap_or(destination)),
                    None => relays.first(),
                }
            }
        }
    }
}

impl fmt::Display for SourceRouting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for relay in self.relays() {
            write!(f, "{} -> ", relay)?;
        }
        write!(f, "{}", self.final_destination())
    }
}

/// Ordered hops a message has actually traversed
///
/// Grow-only: `appended` returns a new path, there is no way to remove a hop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkPath(Vec<NetworkingNodeId>);

impl NetworkPath {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn from_hops(hops: Vec<NetworkingNodeId>) -> Self {
        Self(hops)
    }

    /// New path with `hop` appended
    #[must_use]
    pub fn appended(&self, hop: NetworkingNodeId) -> Self {
        let mut hops = Vec::with_capacity(self.0.len() + 1);
        hops.extend(self.0.iter().cloned());
        hops.push(hop);
        Self(hops)
    }

    pub fn contains(&self, hop: &NetworkingNodeId) -> bool {
        self.0.contains(hop)
    }

    pub fn hops(&self) -> &[NetworkingNodeId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hop the message came through most recently
    pub fn last_hop(&self) -> Option<&NetworkingNodeId> {
        self.0.last()
    }

    pub fn reversed_hops(&self) -> Vec<NetworkingNodeId> {
        self.0.iter().rev().cloned().collect()
    }
}

impl fmt::Display for NetworkPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (idx, hop) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", hop)?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(s: &str) -> NetworkingNodeId {
        NetworkingNodeId::new(s).unwrap()
    }

    #[test]
    fn via_with_no_relays_is_direct() {
        assert_eq!(SourceRouting::via(vec![], id("csms")), SourceRouting::to(id("csms")));
    }

    #[test]
    fn explicit_next_hop_walks_the_list() {
        let route = SourceRouting::via(vec![id("nn1"), id("nn2")], id("csms"));
        assert_eq!(route.explicit_next_hop(&id("cs")), Some(&id("nn1")));
        assert_eq!(route.explicit_next_hop(&id("nn1")), Some(&id("nn2")));
        assert_eq!(route.explicit_next_hop(&id("nn2")), Some(&id("csms")));
        assert_eq!(route.explicit_next_hop(&id("csms")), None);
        assert_eq!(SourceRouting::to(id("csms")).explicit_next_hop(&id("nn1")), None);
    }

    #[test]
    fn reverse_route_retraces_relays() {
        let path = NetworkPath::empty().appended(id("nn1")).appended(id("nn2"));
        let back = SourceRouting::reverse_of(&path, id("cs"));
        assert_eq!(back.relays(), &[id("nn2"), id("nn1")]);
        assert!(back.is_for(&id("cs")));
        assert_eq!(back.to_string(), "nn2 -> nn1 -> cs");
    }

    #[test]
    fn from_hops_requires_a_destination() {
        assert!(SourceRouting::from_hops(vec![]).is_err());
        let route = SourceRouting::from_hops(vec![id("nn1"), id("csms")]).unwrap();
        assert_eq!(route.final_destination(), &id("csms"));
    }

    proptest! {
        #[test]
        fn appending_only_grows(names in proptest::collection::vec("[a-z]{1,8}", 0..10)) {
            let mut path = NetworkPath::empty();
            for name in &names {
                let before = path.clone();
                path = path.appended(id(name));
                prop_assert_eq!(path.len(), before.len() + 1);
                prop_assert_eq!(&path.hops()[..before.len()], before.hops());
                prop_assert!(path.contains(&id(name)));
            }
        }
    }
}
