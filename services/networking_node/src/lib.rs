//! # OCPP Node
//!
//! Exchange façade for one overlay participant. A charging station, a
//! networking node relaying for stations behind it, and a CSMS are all a
//! [`NetworkingNode`] with different handlers and routes.
//!
//! ## Outbound
//!
//! `send::<R>()` stamps the node as originator, encodes in the request's
//! format, picks the next hop from the routing table and waits on the
//! correlator for exactly one outcome. CALLERRORs come back as typed
//! responses with a failure `result()`.
//!
//! ## Inbound
//!
//! CALLs addressed here go to the [`ActionRegistry`]; CALLs for other
//! nodes go through the forwarding engine when forwarding is enabled, and
//! are answered with the action's rejected response otherwise. A CALL
//! redelivered inside the duplicate window gets the recorded reply instead
//! of a second handler run. Replies either resolve a pending call or
//! retrace a relayed request's path.
//!
//! ## Staging
//!
//! Handlers that originate follow-up requests enqueue them on the
//! [`Outbox`]; see [`station`] for the RemoteStart → StartTransaction flow.

pub mod actions;
pub mod csms;
pub mod error;
pub mod handled;
pub mod node;
pub mod outbox;
pub mod station;

pub use actions::{
    handler_fn, ActionEvents, ActionRegistry, ActionSlot, HandlerFn, InboundExchange,
    OutboundExchange, RequestHandler,
};
pub use error::{NodeError, NodeResult};
pub use handled::{Admission, HandledCalls};
pub use node::{NetworkingNode, NodeBuilder, NodeTasks, RequestDefaults, DEFAULT_SWEEP_INTERVAL};
pub use outbox::{EnqueuedRequest, EnqueuedStatus, Outbox};
