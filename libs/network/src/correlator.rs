//! # Correlator
//!
//! ## Purpose
//!
//! Owns the mapping from an in-flight `RequestId` to its completion slot
//! and guarantees at most one outcome per request.
//!
//! ## Lifecycle
//!
//! ```text
//!  call() ──register──► [pending: DashMap<RequestId, PendingCall>]
//!    │                          │
//!    ├─ CallStarted             ├─ resolve(frame)  ──► Ok(frame)
//!    ├─ Transport::send         ├─ timeout elapses ──► Err(Timeout)    + abandon
//!    │                          ├─ token cancelled ──► Err(Cancelled)  + abandon
//!    └─ CallCompleted ◄─────────┴─ send fails      ──► Err(Transport)
//! ```
//!
//! Whoever removes the pending entry owns the outcome: a reply, the timer
//! and the cancellation token race for `DashMap::remove`, and the losers
//! back off. A reply for an id that is no longer pending is discarded and
//! counted, never propagated.
//!
//! ## Concurrency
//!
//! The slot map is sharded (`DashMap`), so unrelated in-flight exchanges
//! never contend on a single lock.

use crate::events::EventHub;
use crate::transports::{Transport, TransportEnvelope};
use crate::ExchangeError;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ocpp_codec::Frame;
use ocpp_types::{ErrorCode, NetworkPath, RequestId};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// CALLRESULT or CALLERROR delivered to a waiting caller
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub frame: Frame,
    /// Hops the reply traversed on its way back
    pub network_path: NetworkPath,
}

impl From<Frame> for Reply {
    fn from(frame: Frame) -> Self {
        Self {
            frame,
            network_path: NetworkPath::empty(),
        }
    }
}

/// An outbound CALL ready to be handed to the transport
#[derive(Debug, Clone)]
pub struct OutboundCall {
    pub request_id: RequestId,
    pub action: String,
    pub timeout: Duration,
    pub envelope: TransportEnvelope,
}

/// Fired immediately before the request is handed to the transport
#[derive(Debug, Clone)]
pub struct CallStarted {
    pub request_id: RequestId,
    pub action: String,
    pub at: DateTime<Utc>,
}

/// How a call was resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Response,
    CallError(ErrorCode),
    Timeout,
    Cancelled,
    DuplicateRequestId,
    TransportFailure,
}

impl CallOutcome {
    fn of(result: &Result<Reply, ExchangeError>) -> Self {
        match result {
            Ok(Reply {
                frame: Frame::CallError { error_code, .. },
                ..
            }) => CallOutcome::CallError(*error_code),
            Ok(_) => CallOutcome::Response,
            Err(ExchangeError::Timeout { .. }) => CallOutcome::Timeout,
            Err(ExchangeError::Cancelled { .. }) => CallOutcome::Cancelled,
            Err(ExchangeError::DuplicateRequestId { .. }) => CallOutcome::DuplicateRequestId,
            Err(ExchangeError::Transport(_)) => CallOutcome::TransportFailure,
        }
    }
}

/// Fired immediately after resolution, whatever the outcome
#[derive(Debug, Clone)]
pub struct CallCompleted {
    pub request_id: RequestId,
    pub action: String,
    pub outcome: CallOutcome,
    pub elapsed: Duration,
}

/// Snapshot of correlator counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CorrelatorStats {
    pub in_flight: usize,
    pub registered: u64,
    pub resolved: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub transport_failures: u64,
    pub duplicates_refused: u64,
    /// Late or unknown replies that were dropped
    pub discarded: u64,
}

#[derive(Debug, Default)]
struct Counters {
    registered: AtomicU64,
    resolved: AtomicU64,
    timed_out: AtomicU64,
    cancelled: AtomicU64,
    transport_failures: AtomicU64,
    duplicates_refused: AtomicU64,
    discarded: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug)]
struct PendingCall {
    action: String,
    registered_at: Instant,
    reply: oneshot::Sender<Reply>,
}

/// Removes a still-pending slot when the awaiting future is dropped
struct SlotGuard<'a> {
    correlator: &'a Correlator,
    request_id: &'a RequestId,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if self.correlator.pending.remove(self.request_id).is_some() {
            debug!(request_id = %self.request_id, "Caller dropped before resolution");
            Counters::bump(&self.correlator.counters.cancelled);
        }
    }
}

enum Wake {
    Reply(Result<Reply, oneshot::error::RecvError>),
    Timeout,
    Cancelled,
}

/// Request/response correlation for one node
#[derive(Debug)]
pub struct Correlator {
    pending: DashMap<RequestId, PendingCall>,
    counters: Counters,
    started: EventHub<CallStarted>,
    completed: EventHub<CallCompleted>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            counters: Counters::default(),
            started: EventHub::new("call-started"),
            completed: EventHub::new("call-completed"),
        }
    }

    /// Observers fired before each request is handed to the transport
    pub fn on_started(&self) -> &EventHub<CallStarted> {
        &self.started
    }

    /// Observers fired after each call is resolved
    pub fn on_completed(&self) -> &EventHub<CallCompleted> {
        &self.completed
    }

    pub fn is_pending(&self, request_id: &RequestId) -> bool {
        self.pending.contains_key(request_id)
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> CorrelatorStats {
        let c = &self.counters;
        CorrelatorStats {
            in_flight: self.pending.len(),
            registered: c.registered.load(Ordering::Relaxed),
            resolved: c.resolved.load(Ordering::Relaxed),
            timed_out: c.timed_out.load(Ordering::Relaxed),
            cancelled: c.cancelled.load(Ordering::Relaxed),
            transport_failures: c.transport_failures.load(Ordering::Relaxed),
            duplicates_refused: c.duplicates_refused.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
        }
    }

    /// Send a CALL and wait for exactly one outcome
    ///
    /// Returns the reply (CALLRESULT or CALLERROR), or the non-response
    /// outcome.
    pub async fn call(
        &self,
        transport: &dyn Transport,
        call: OutboundCall,
        cancel: &CancellationToken,
    ) -> Result<Reply, ExchangeError> {
        let OutboundCall {
            request_id,
            action,
            timeout,
            envelope,
        } = call;

        let rx = match self.register(&request_id, &action) {
            Ok(rx) => rx,
            Err(err) => {
                self.completed.emit(&CallCompleted {
                    request_id,
                    action,
                    outcome: CallOutcome::DuplicateRequestId,
                    elapsed: Duration::ZERO,
                });
                return Err(err);
            }
        };
        let _guard = SlotGuard {
            correlator: self,
            request_id: &request_id,
        };
        let started_at = Instant::now();
        self.started.emit(&CallStarted {
            request_id: request_id.clone(),
            action: action.clone(),
            at: Utc::now(),
        });

        let result = self
            .await_outcome(transport, &request_id, envelope, timeout, cancel, rx)
            .await;

        let outcome = CallOutcome::of(&result);
        debug!(request_id = %request_id, action = %action, outcome = ?outcome, "Call resolved");
        self.completed.emit(&CallCompleted {
            request_id: request_id.clone(),
            action,
            outcome,
            elapsed: started_at.elapsed(),
        });
        result
    }

    fn register(
        &self,
        request_id: &RequestId,
        action: &str,
    ) -> Result<oneshot::Receiver<Reply>, ExchangeError> {
        match self.pending.entry(request_id.clone()) {
            Entry::Occupied(_) => {
                warn!(request_id = %request_id, action, "Refusing duplicate in-flight request id");
                Counters::bump(&self.counters.duplicates_refused);
                Err(ExchangeError::DuplicateRequestId {
                    request_id: request_id.clone(),
                })
            }
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(PendingCall {
                    action: action.to_string(),
                    registered_at: Instant::now(),
                    reply: tx,
                });
                Counters::bump(&self.counters.registered);
                trace!(request_id = %request_id, action, "Registered pending call");
                Ok(rx)
            }
        }
    }

    async fn await_outcome(
        &self,
        transport: &dyn Transport,
        request_id: &RequestId,
        envelope: TransportEnvelope,
        timeout: Duration,
        cancel: &CancellationToken,
        mut rx: oneshot::Receiver<Reply>,
    ) -> Result<Reply, ExchangeError> {
        if let Err(err) = transport.send(envelope).await {
            if self.pending.remove(request_id).is_some() {
                Counters::bump(&self.counters.transport_failures);
            }
            warn!(request_id = %request_id, error = %err, "Transport refused request");
            return Err(ExchangeError::Transport(err));
        }

        let wake = tokio::select! {
            reply = &mut rx => Wake::Reply(reply),
            _ = tokio::time::sleep(timeout) => Wake::Timeout,
            _ = cancel.cancelled() => Wake::Cancelled,
        };

        match wake {
            Wake::Reply(Ok(reply)) => Ok(reply),
            // Slot purged by `cancel_all`
            Wake::Reply(Err(_)) => Err(ExchangeError::Cancelled {
                request_id: request_id.clone(),
            }),
            Wake::Timeout => {
                if self.pending.remove(request_id).is_none() {
                    return self.reply_won(request_id, rx).await;
                }
                Counters::bump(&self.counters.timed_out);
                debug!(request_id = %request_id, ?timeout, "Request timed out");
                transport.abandon(request_id).await;
                Err(ExchangeError::Timeout {
                    request_id: request_id.clone(),
                    timeout,
                })
            }
            Wake::Cancelled => {
                if self.pending.remove(request_id).is_none() {
                    return self.reply_won(request_id, rx).await;
                }
                Counters::bump(&self.counters.cancelled);
                debug!(request_id = %request_id, "Request cancelled by caller");
                transport.abandon(request_id).await;
                Err(ExchangeError::Cancelled {
                    request_id: request_id.clone(),
                })
            }
        }
    }

    /// A reply removed the slot first; its frame is already on the way
    async fn reply_won(
        &self,
        request_id: &RequestId,
        rx: oneshot::Receiver<Reply>,
    ) -> Result<Reply, ExchangeError> {
        rx.await.map_err(|_| ExchangeError::Cancelled {
            request_id: request_id.clone(),
        })
    }

    /// Deliver a CALLRESULT / CALLERROR to its waiting caller
    ///
    /// Returns `false` when the id is not pending; the reply is discarded.
    pub fn resolve(&self, reply: impl Into<Reply>) -> bool {
        let reply = reply.into();
        let frame = &reply.frame;
        if frame.is_call() {
            warn!(request_id = %frame.request_id(), "CALL frame cannot resolve a pending call");
            return false;
        }
        let request_id = frame.request_id().clone();
        match self.pending.remove(&request_id) {
            Some((_, pending)) => {
                trace!(
                    request_id = %request_id,
                    action = %pending.action,
                    waited = ?pending.registered_at.elapsed(),
                    "Resolving pending call"
                );
                if pending.reply.send(reply).is_err() {
                    debug!(request_id = %request_id, "Caller went away before the reply");
                }
                Counters::bump(&self.counters.resolved);
                true
            }
            None => {
                Counters::bump(&self.counters.discarded);
                debug!(request_id = %request_id, "Discarding reply for retired or unknown request");
                false
            }
        }
    }

    /// Resolve every pending call as cancelled
    pub fn cancel_all(&self) {
        let count = self.pending.len();
        self.pending.clear();
        if count > 0 {
            self.counters.cancelled.fetch_add(count as u64, Ordering::Relaxed);
            debug!(count, "Cancelled all pending calls");
        }
    }
}
