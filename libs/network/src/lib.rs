//! # OCPP Network Layer
//!
//! ## Purpose
//!
//! Everything between an encoded frame and a neighbour: the [`Transport`]
//! boundary, the request/response [`Correlator`], lifecycle [`EventHub`]s
//! and the [`MaintenanceLock`] for background housekeeping.
//!
//! ## Architecture Role
//!
//! ```text
//!  ocpp-node façade ──OutboundCall──► Correlator ──TransportEnvelope──► Transport
//!         ▲                               ▲                                 │
//!         │                          resolve(frame)                         ▼
//!         └──────────── inbound dispatch ◄───────────────────────── neighbour
//! ```
//!
//! The correlator works on raw reply [`ocpp_codec::Frame`]s; typed decoding
//! of the reply happens in the façade, which knows the expected response
//! type.
//!
//! ## Transports
//!
//! Only the in-memory transport ships here. Socket-backed bindings
//! implement [`Transport`] out of tree.

pub mod correlator;
pub mod error;
pub mod events;
pub mod maintenance;
pub mod transports;

pub use correlator::{
    CallCompleted, CallOutcome, CallStarted, Correlator, CorrelatorStats, OutboundCall, Reply,
};
pub use error::{ExchangeError, Result, TransportError};
pub use events::{panic_message, EventHub, ObserverFailure, ObserverFn};
pub use maintenance::{spawn_periodic, MaintenanceLock};
pub use transports::{MemoryNetwork, MemoryTransport, Transport, TransportEnvelope};
