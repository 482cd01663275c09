//! # Relay Core
//!
//! ## Purpose
//!
//! Overlay routing for OCPP networking nodes: the [`ForwardingEngine`]
//! that decides FORWARD / REJECT / DROP for every inbound CALL not
//! addressed to the local node, the [`RoutingTable`] it consults and the
//! reverse-path bookkeeping that carries replies back.
//!
//! ## Architecture Role
//!
//! ```text
//!  CS ──CALL──► [ NN: ForwardingEngine ] ──CALL + hop──► CSMS
//!   ▲                    │  REJECT                         │
//!   └──CALLERROR─────────┘                                 │
//!   ▲                                                      │
//!   └──────── CALLRESULT (path reversed) ◄─────────────────┘
//! ```
//!
//! The engine never decodes payloads itself. Typed reject responses are
//! produced by a [`TypedRejector`] supplied by the node, which owns the
//! typed codecs for the actions it supports.

pub mod engine;
pub mod error;
pub mod filter;
pub mod inbound;
pub mod routing;
pub mod tracking;

pub use engine::{
    Decided, ForwardingConfig, ForwardingDecision, ForwardingEngine, ForwardingResult,
    ForwardingStats, Received, RejectResponse, RelayAction, TypedRejector, DEFAULT_DUPLICATE_WINDOW,
    DEFAULT_MAX_HOPS,
};
pub use error::{RelayError, RelayResult};
pub use filter::{DenyActionFilter, FilterVerdict, ForwardingFilter, SignaturePolicy};
pub use inbound::InboundCall;
pub use routing::RoutingTable;
pub use tracking::{DuplicateCache, ForwardedRequest, ForwardedRequests};
