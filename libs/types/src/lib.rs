//! # OCPP Shared Types
//!
//! Value objects shared by every layer of the OCPP exchange engine: the codec,
//! the correlator, the forwarding engine and the exchange façade.
//!
//! ## Design Philosophy
//!
//! - **Validated Identifiers**: `RequestId`, `EventTrackingId` and `NetworkingNodeId`
//!   are checked once at construction and are immutable afterwards
//! - **Grow-Only Paths**: `NetworkPath` can only be extended by producing a new value
//! - **Closed Failure Taxonomy**: `ResponseResult` enumerates every outcome a peer
//!   can report, independent of whether the payload was decodable
//! - **Wire-Neutral**: types know their JSON shape (serde) but nothing about frames
//!
//! ## Quick Start
//!
//! ```rust
//! use ocpp_types::{NetworkPath, NetworkingNodeId, RequestId, SourceRouting};
//!
//! let csms = NetworkingNodeId::new("csms-01").unwrap();
//! let relay = NetworkingNodeId::new("nn-07").unwrap();
//!
//! let routing = SourceRouting::to(csms.clone());
//! let path = NetworkPath::empty().appended(relay.clone());
//!
//! assert_eq!(routing.final_destination(), &csms);
//! assert!(path.contains(&relay));
//! assert_eq!(RequestId::random().as_str().len(), 36);
//! ```
//!
//! ## Integration Points
//!
//! - **codec**: embeds these types in request/response envelopes
//! - **network**: keys the correlator by `RequestId`
//! - **relay-core**: inspects `SourceRouting` and `NetworkPath` for every hop decision

pub mod common;
pub mod protocol;

pub use common::errors::ValidationError;
pub use common::identifiers::{
    ConnectorId, EventTrackingId, NetworkingNodeId, RequestId, TransactionId,
    MAX_NODE_ID_LEN, MAX_REQUEST_ID_LEN,
};

pub use protocol::extension::{CustomData, StatusInfo};
pub use protocol::format::SerializationFormat;
pub use protocol::result::{ErrorCode, ResponseResult};
pub use protocol::routing::{NetworkPath, SourceRouting};
pub use protocol::signature::Signature;

/// Result type for value-object construction
pub type Result<T> = std::result::Result<T, ValidationError>;
