//! # Forwarding Engine
//!
//! ## Purpose
//!
//! Decides, exactly once per inbound CALL at a relaying node, whether the
//! message continues towards its destination, is answered locally with a
//! failure, or is discarded.
//!
//! ## Decision Pipeline
//!
//! ```text
//!  Received ──decide()──► Decided{FORWARD | REJECT | DROP} ──resolve()──► RelayAction
//!
//!  decide() checks, first match wins:
//!    duplicate (originator, id)     → DROP
//!    action not supported           → DROP
//!    local node already on path     → REJECT  RequestError(GenericError)
//!    hop limit reached              → REJECT  RequestError(GenericError)
//!    signature policy               → REJECT  SignatureError
//!    custom filters                 → REJECT | DROP
//!    no route for destination       → REJECT  RequestError(GenericError)
//!    otherwise                      → FORWARD to next hop
//! ```
//!
//! `decide` consumes the [`Received`] wrapper and `resolve` consumes the
//! [`Decided`] one, so a message cannot be evaluated twice.
//!
//! ## Reverse Path
//!
//! Forwarded CALLs are remembered until their timeout elapses; the
//! downstream CALLRESULT / CALLERROR is handed to [`ForwardingEngine::relay_response`],
//! which appends the local hop and sends it to the neighbour the CALL came
//! from.

use crate::error::{RelayError, RelayResult};
use crate::filter::{FilterVerdict, ForwardingFilter, SignaturePolicy};
use crate::inbound::InboundCall;
use crate::routing::RoutingTable;
use crate::tracking::{DuplicateCache, ForwardedRequest, ForwardedRequests};
use bytes::Bytes;
use ocpp_codec::{Frame, DEFAULT_REQUEST_TIMEOUT};
use ocpp_network::TransportEnvelope;
use ocpp_types::{ErrorCode, NetworkingNodeId, ResponseResult, SourceRouting};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default maximum number of relays a CALL may traverse
pub const DEFAULT_MAX_HOPS: usize = 8;

/// Default window in which a repeated `(originator, id)` is a duplicate
pub const DEFAULT_DUPLICATE_WINDOW: Duration = Duration::from_secs(300);

/// What happens to an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ForwardingResult {
    Forward,
    Reject,
    Drop,
}

impl fmt::Display for ForwardingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ForwardingResult::Forward => "FORWARD",
            ForwardingResult::Reject => "REJECT",
            ForwardingResult::Drop => "DROP",
        };
        f.write_str(name)
    }
}

/// Response synthesized for a REJECT
#[derive(Debug, Clone, PartialEq)]
pub enum RejectResponse {
    /// Reply frame produced by the action's typed response codec
    Typed(Frame),
    /// Pre-encoded CALLERROR for actions without a typed codec here
    Raw(Bytes),
}

/// Renders a failure through the action's typed response type
pub trait TypedRejector: Send + Sync {
    /// `None` when no typed codec is registered for the call's action
    fn render_reject(&self, call: &InboundCall, result: &ResponseResult) -> Option<Frame>;
}

/// Outcome of evaluating one inbound CALL
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardingDecision {
    pub result: ForwardingResult,
    pub reject_response: Option<RejectResponse>,
    /// Failure carried by the reject response
    pub failure: Option<ResponseResult>,
    pub next_hop: Option<NetworkingNodeId>,
    /// Observability only; never sent to peers
    pub log_message: Option<String>,
}

impl ForwardingDecision {
    fn forward(next_hop: NetworkingNodeId) -> Self {
        Self {
            result: ForwardingResult::Forward,
            reject_response: None,
            failure: None,
            next_hop: Some(next_hop),
            log_message: None,
        }
    }

    fn reject(response: RejectResponse, failure: ResponseResult, log: String) -> Self {
        Self {
            result: ForwardingResult::Reject,
            reject_response: Some(response),
            failure: Some(failure),
            next_hop: None,
            log_message: Some(log),
        }
    }

    fn drop(log: impl Into<String>) -> Self {
        Self {
            result: ForwardingResult::Drop,
            reject_response: None,
            failure: None,
            next_hop: None,
            log_message: Some(log.into()),
        }
    }
}

/// An inbound CALL awaiting its decision
#[derive(Debug)]
pub struct Received(InboundCall);

impl Received {
    pub fn new(call: InboundCall) -> Self {
        Self(call)
    }

    pub fn call(&self) -> &InboundCall {
        &self.0
    }
}

/// An inbound CALL with its decision, awaiting resolution
#[derive(Debug)]
pub struct Decided {
    call: InboundCall,
    decision: ForwardingDecision,
}

impl Decided {
    pub fn call(&self) -> &InboundCall {
        &self.call
    }

    pub fn decision(&self) -> &ForwardingDecision {
        &self.decision
    }
}

/// What the relay loop must do with a resolved message
#[derive(Debug, Clone, PartialEq)]
pub enum RelayAction {
    /// Send to `envelope.link`, the next hop
    Forward(TransportEnvelope),
    /// Send the synthesized reply back over the arrival link
    Reply(TransportEnvelope),
    Drop,
}

/// Engine tunables
#[derive(Debug, Clone)]
pub struct ForwardingConfig {
    /// Longest network path a forwarded CALL may carry
    pub max_hops: usize,
    pub duplicate_window: Duration,
    /// `None` relays every action
    pub supported_actions: Option<HashSet<String>>,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            max_hops: DEFAULT_MAX_HOPS,
            duplicate_window: DEFAULT_DUPLICATE_WINDOW,
            supported_actions: None,
        }
    }
}

/// Decision counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ForwardingStats {
    pub forwarded: u64,
    pub rejected: u64,
    pub dropped: u64,
    pub responses_relayed: u64,
    pub responses_unmatched: u64,
    pub awaiting_reply: usize,
}

#[derive(Debug, Default)]
struct Counters {
    forwarded: AtomicU64,
    rejected: AtomicU64,
    dropped: AtomicU64,
    responses_relayed: AtomicU64,
    responses_unmatched: AtomicU64,
}

/// Overlay routing decisions for one relaying node
pub struct ForwardingEngine {
    local: NetworkingNodeId,
    config: ForwardingConfig,
    routes: Arc<RoutingTable>,
    duplicates: DuplicateCache,
    forwarded: ForwardedRequests,
    filters: RwLock<Vec<Arc<dyn ForwardingFilter>>>,
    signatures: Option<SignaturePolicy>,
    rejector: Option<Arc<dyn TypedRejector>>,
    counters: Counters,
}

impl ForwardingEngine {
    pub fn new(local: NetworkingNodeId, config: ForwardingConfig) -> Self {
        Self::with_routing_table(config, Arc::new(RoutingTable::new(local)))
    }

    /// Engine sharing `routes` with the rest of the node
    pub fn with_routing_table(config: ForwardingConfig, routes: Arc<RoutingTable>) -> Self {
        Self {
            duplicates: DuplicateCache::new(config.duplicate_window),
            local: routes.local().clone(),
            config,
            routes,
            forwarded: ForwardedRequests::new(),
            filters: RwLock::new(Vec::new()),
            signatures: None,
            rejector: None,
            counters: Counters::default(),
        }
    }

    #[must_use]
    pub fn with_signature_policy(mut self, policy: SignaturePolicy) -> Self {
        self.signatures = Some(policy);
        self
    }

    #[must_use]
    pub fn with_rejector(mut self, rejector: Arc<dyn TypedRejector>) -> Self {
        self.rejector = Some(rejector);
        self
    }

    pub fn add_filter(&self, filter: Arc<dyn ForwardingFilter>) {
        info!(filter = filter.name(), "Forwarding filter installed");
        self.filters.write().push(filter);
    }

    pub fn local(&self) -> &NetworkingNodeId {
        &self.local
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn config(&self) -> &ForwardingConfig {
        &self.config
    }

    pub fn stats(&self) -> ForwardingStats {
        let c = &self.counters;
        ForwardingStats {
            forwarded: c.forwarded.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            responses_relayed: c.responses_relayed.load(Ordering::Relaxed),
            responses_unmatched: c.responses_unmatched.load(Ordering::Relaxed),
            awaiting_reply: self.forwarded.len(),
        }
    }

    /// Evaluate an inbound CALL
    pub fn decide(&self, received: Received) -> Decided {
        let call = received.0;
        let decision = self.evaluate(&call);
        debug!(
            request_id = %call.request_id(),
            action = call.action(),
            result = %decision.result,
            "Forwarding decision"
        );
        Decided { call, decision }
    }

    fn evaluate(&self, call: &InboundCall) -> ForwardingDecision {
        let request_id = call.request_id();

        if self.duplicates.check_and_record(call.originator(), request_id) {
            return ForwardingDecision::drop(format!(
                "Duplicate delivery of {} from {}",
                request_id,
                call.originator()
            ));
        }

        if let Some(supported) = &self.config.supported_actions {
            if !supported.contains(call.action()) {
                return ForwardingDecision::drop(format!(
                    "Action {} is not relayed by {}",
                    call.action(),
                    self.local
                ));
            }
        }

        if call.destination().is_for(&self.local) {
            return ForwardingDecision::drop(format!(
                "{} is addressed to {} itself",
                request_id, self.local
            ));
        }

        if call.network_path().contains(&self.local) || call.originator() == &self.local {
            return self.reject(
                call,
                ResponseResult::request_error(
                    ErrorCode::GenericError,
                    format!("Routing loop: {} already on the network path", self.local),
                ),
            );
        }

        if call.network_path().len() >= self.config.max_hops {
            return self.reject(
                call,
                ResponseResult::request_error(
                    ErrorCode::GenericError,
                    format!("Hop limit of {} exceeded", self.config.max_hops),
                ),
            );
        }

        if let Some(policy) = &self.signatures {
            if let Some(failure) = policy.check(call) {
                return self.reject(call, failure);
            }
        }

        let filters = self.filters.read().clone();
        for filter in filters {
            match filter.evaluate(call) {
                None => continue,
                Some(FilterVerdict::Reject(failure)) => return self.reject(call, failure),
                Some(FilterVerdict::Drop(reason)) => {
                    return ForwardingDecision::drop(format!("{}: {}", filter.name(), reason))
                }
            }
        }

        let Some(next_hop) = self.routes.next_hop(call.destination()) else {
            return self.reject(
                call,
                ResponseResult::request_error(
                    ErrorCode::GenericError,
                    format!("Unknown destination {}", call.destination().final_destination()),
                ),
            );
        };

        if call.network_path().contains(&next_hop) || &next_hop == call.originator() {
            return self.reject(
                call,
                ResponseResult::request_error(
                    ErrorCode::GenericError,
                    format!("Routing loop: next hop {} already traversed", next_hop),
                ),
            );
        }

        ForwardingDecision::forward(next_hop)
    }

    fn reject(&self, call: &InboundCall, failure: ResponseResult) -> ForwardingDecision {
        let log = format!(
            "Rejecting {} {}: {}",
            call.action(),
            call.request_id(),
            failure.description().unwrap_or(failure.kind())
        );
        let typed = self
            .rejector
            .as_ref()
            .and_then(|rejector| rejector.render_reject(call, &failure));
        if let Some(frame) = typed {
            return ForwardingDecision::reject(RejectResponse::Typed(frame), failure, log);
        }
        match Frame::error_for(call.request_id().clone(), &failure).encode(call.format()) {
            Ok(bytes) => ForwardingDecision::reject(RejectResponse::Raw(Bytes::from(bytes)), failure, log),
            Err(err) => ForwardingDecision::drop(format!("{}; CALLERROR encoding failed: {}", log, err)),
        }
    }

    /// Turn a decision into the transport work the relay loop performs
    pub fn resolve(&self, decided: Decided) -> RelayResult<RelayAction> {
        let Decided { call, decision } = decided;
        match decision.result {
            ForwardingResult::Forward => {
                let next_hop = decision.next_hop.ok_or_else(|| RelayError::MissingDestination {
                    request_id: call.request_id().clone(),
                })?;
                self.counters.forwarded.fetch_add(1, Ordering::Relaxed);
                Ok(RelayAction::Forward(self.forward_envelope(call, next_hop)))
            }
            ForwardingResult::Reject => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                if let Some(log) = &decision.log_message {
                    info!(request_id = %call.request_id(), "{}", log);
                }
                let bytes = match decision.reject_response {
                    Some(RejectResponse::Typed(frame)) => Bytes::from(frame.encode(call.format())?),
                    Some(RejectResponse::Raw(bytes)) => bytes,
                    None => {
                        let failure = decision.failure.unwrap_or_else(|| ResponseResult::failed(None));
                        Bytes::from(Frame::error_for(call.request_id().clone(), &failure).encode(call.format())?)
                    }
                };
                let route = SourceRouting::reverse_of(call.network_path(), call.originator().clone());
                let reply = TransportEnvelope::reply(bytes, call.format(), Some(route))
                    .via(call.previous_hop().clone());
                Ok(RelayAction::Reply(reply))
            }
            ForwardingResult::Drop => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                if let Some(log) = &decision.log_message {
                    warn!(request_id = %call.request_id(), "Dropping message: {}", log);
                }
                Ok(RelayAction::Drop)
            }
        }
    }

    /// `decide` then `resolve`
    pub fn process(&self, call: InboundCall) -> RelayResult<RelayAction> {
        self.resolve(self.decide(Received::new(call)))
    }

    fn forward_envelope(&self, call: InboundCall, next_hop: NetworkingNodeId) -> TransportEnvelope {
        let previous_hop = call.previous_hop().clone();
        let originator = call.originator().clone();
        let request_id = call.request_id().clone();
        let action = call.action().to_string();
        let timeout = call.transport().request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let mut envelope = call.into_transport();
        envelope.network_path = envelope.network_path.appended(self.local.clone());
        envelope.origin = Some(originator.clone());
        envelope.link = Some(next_hop.clone());

        self.forwarded.remember(ForwardedRequest {
            request_id: request_id.clone(),
            action: action.clone(),
            previous_hop,
            originator,
            network_path: envelope.network_path.clone(),
            format: envelope.format,
            expires_at: Instant::now() + timeout,
        });
        debug!(
            request_id = %request_id,
            action = %action,
            next_hop = %next_hop,
            hops = envelope.network_path.len(),
            "Forwarding request"
        );
        envelope
    }

    /// Originator a downstream reply is heading for
    ///
    /// The final hop of the reply's destination; `None` when the reply is
    /// addressed to this node. Replies without a destination are attributed
    /// only when a single forwarded entry carries their id.
    fn reply_originator(&self, frame: &Frame, envelope: &TransportEnvelope) -> Option<NetworkingNodeId> {
        match &envelope.destination {
            Some(destination) => {
                let target = destination.final_destination();
                (target != &self.local).then(|| target.clone())
            }
            None => self.forwarded.sole_originator(frame.request_id()),
        }
    }

    /// Whether `frame`, delivered in `envelope`, answers a CALL this relay forwarded
    pub fn is_forwarded(&self, frame: &Frame, envelope: &TransportEnvelope) -> bool {
        !frame.is_call()
            && self
                .reply_originator(frame, envelope)
                .is_some_and(|originator| self.forwarded.contains(&originator, frame.request_id()))
    }

    /// Route a downstream CALLRESULT / CALLERROR back towards its originator
    ///
    /// Returns `None` (and logs) when no live forwarded entry matches.
    pub fn relay_response(&self, frame: &Frame, mut envelope: TransportEnvelope) -> Option<TransportEnvelope> {
        let entry = self
            .reply_originator(frame, &envelope)
            .and_then(|originator| self.forwarded.take(&originator, frame.request_id()));
        let Some(entry) = entry else {
            self.counters.responses_unmatched.fetch_add(1, Ordering::Relaxed);
            debug!(request_id = %frame.request_id(), destination = ?envelope.destination, "No forwarded request for response, dropping");
            return None;
        };
        if envelope.destination.is_none() {
            envelope.destination = Some(entry.reply_route());
        }
        envelope.network_path = envelope.network_path.appended(self.local.clone());
        envelope.origin = None;
        envelope.link = Some(entry.previous_hop.clone());
        self.counters.responses_relayed.fetch_add(1, Ordering::Relaxed);
        debug!(
            request_id = %entry.request_id,
            action = %entry.action,
            previous_hop = %entry.previous_hop,
            "Relaying response"
        );
        Some(envelope)
    }

    /// Drop expired duplicate and reverse-path entries
    pub fn purge_expired(&self) -> (usize, usize) {
        let duplicates = self.duplicates.purge_expired();
        let forwarded = self.forwarded.purge_expired();
        if duplicates + forwarded > 0 {
            debug!(duplicates, forwarded, "Purged expired relay entries");
        }
        (duplicates, forwarded)
    }
}

impl fmt::Debug for ForwardingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardingEngine")
            .field("local", &self.local)
            .field("config", &self.config)
            .field("routes", &self.routes.len())
            .field("filters", &self.filters.read().len())
            .field("stats", &self.stats())
            .finish()
    }
}
