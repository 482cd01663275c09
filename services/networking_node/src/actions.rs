//! Per-action handler registry
//!
//! ## Purpose
//!
//! Every OCPP action the node speaks owns one [`ActionSlot`]: its codec
//! hooks, the optional inbound [`RequestHandler`] and four lifecycle hubs.
//! The [`ActionRegistry`] keys slots by action name and hides the concrete
//! message type behind [`ErasedAction`], so the inbound pump can dispatch
//! a CALL knowing nothing but its action string.
//!
//! ## Inbound Flow
//!
//! ```text
//! CALL ─► decode ──fail──► CALLERROR FormationViolation
//!           │
//!           ▼
//!   destination local? ──no──► <Action>Response::rejected
//!           │
//!      on_incoming
//!           │
//!   handler? ──none──► RequestError NotImplemented
//!           │
//!   handle ──Err──► Failed(reason)
//!           └─panic─► ExceptionOccurred(message)
//!           │
//!      on_responded ─► CALLRESULT / CALLERROR back over the arrival link
//! ```

use crate::error::{NodeError, NodeResult};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use futures::FutureExt;
use ocpp_codec::{
    decode_request, CodecHooks, ErrorCode, Frame, OcppRequest, OcppResponse, ResponseResult,
    SourceRouting,
};
use ocpp_network::{panic_message, EventHub, TransportEnvelope};
use ocpp_types::NetworkingNodeId;
use parking_lot::RwLock;
use relay_core::{InboundCall, TypedRejector};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Application logic answering one inbound action
#[async_trait]
pub trait RequestHandler<R: OcppRequest>: Send + Sync + 'static {
    /// An `Err` is answered with a `Failed` response carrying its text
    async fn handle(&self, request: R) -> anyhow::Result<R::Response>;
}

/// Closure adapter for [`RequestHandler`]
pub struct HandlerFn<R, F> {
    f: F,
    _request: PhantomData<fn(R)>,
}

/// Wrap an async closure as a handler
pub fn handler_fn<R, F, Fut>(f: F) -> HandlerFn<R, F>
where
    R: OcppRequest,
    F: Fn(R) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R::Response>> + Send + 'static,
{
    HandlerFn {
        f,
        _request: PhantomData,
    }
}

#[async_trait]
impl<R, F, Fut> RequestHandler<R> for HandlerFn<R, F>
where
    R: OcppRequest,
    F: Fn(R) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R::Response>> + Send + 'static,
{
    async fn handle(&self, request: R) -> anyhow::Result<R::Response> {
        (self.f)(request).await
    }
}

/// Result of one outbound exchange, as seen by `on_response` observers
#[derive(Debug, Clone)]
pub struct OutboundExchange<R: OcppRequest> {
    pub request: R,
    pub outcome: NodeResult<R::Response>,
}

/// One answered inbound request, as seen by `on_responded` observers
#[derive(Debug, Clone)]
pub struct InboundExchange<R: OcppRequest> {
    pub request: R,
    pub response: R::Response,
}

/// Lifecycle hubs of one action
pub struct ActionEvents<R: OcppRequest> {
    request: EventHub<R>,
    response: EventHub<OutboundExchange<R>>,
    incoming: EventHub<R>,
    responded: EventHub<InboundExchange<R>>,
}

impl<R: OcppRequest> ActionEvents<R> {
    fn new() -> Self {
        Self {
            request: EventHub::new("on_request"),
            response: EventHub::new("on_response"),
            incoming: EventHub::new("on_incoming"),
            responded: EventHub::new("on_responded"),
        }
    }

    /// Before an outbound request is sent
    pub fn on_request(&self) -> &EventHub<R> {
        &self.request
    }

    /// After an outbound request resolved, failed or timed out
    pub fn on_response(&self) -> &EventHub<OutboundExchange<R>> {
        &self.response
    }

    /// Before an inbound request reaches its handler
    pub fn on_incoming(&self) -> &EventHub<R> {
        &self.incoming
    }

    /// After the response to an inbound request was produced
    pub fn on_responded(&self) -> &EventHub<InboundExchange<R>> {
        &self.responded
    }
}

/// Everything the node knows about one action
pub struct ActionSlot<R: OcppRequest> {
    events: ActionEvents<R>,
    handler: RwLock<Option<Arc<dyn RequestHandler<R>>>>,
    request_hooks: RwLock<CodecHooks<R>>,
    response_hooks: RwLock<CodecHooks<R::Response>>,
}

impl<R: OcppRequest> ActionSlot<R> {
    fn new() -> Self {
        Self {
            events: ActionEvents::new(),
            handler: RwLock::new(None),
            request_hooks: RwLock::new(CodecHooks::none()),
            response_hooks: RwLock::new(CodecHooks::none()),
        }
    }

    pub fn events(&self) -> &ActionEvents<R> {
        &self.events
    }

    /// Install or replace the inbound handler
    pub fn set_handler(&self, handler: Arc<dyn RequestHandler<R>>) {
        if self.handler.write().replace(handler).is_some() {
            info!(action = R::action(), "Replaced request handler");
        }
    }

    pub fn has_handler(&self) -> bool {
        self.handler.read().is_some()
    }

    pub fn set_request_hooks(&self, hooks: CodecHooks<R>) {
        *self.request_hooks.write() = hooks;
    }

    pub fn set_response_hooks(&self, hooks: CodecHooks<R::Response>) {
        *self.response_hooks.write() = hooks;
    }

    pub fn request_hooks(&self) -> CodecHooks<R> {
        self.request_hooks.read().clone()
    }

    pub fn response_hooks(&self) -> CodecHooks<R::Response> {
        self.response_hooks.read().clone()
    }

    /// Produce the typed response for a decoded inbound request
    async fn respond(&self, request: R, local: &NetworkingNodeId) -> R::Response {
        if !request.envelope().destination().is_for(local) {
            info!(
                action = R::action(),
                request_id = %request.request_id(),
                destination = %request.envelope().destination(),
                "Request is not addressed to this node, answering rejected"
            );
            return R::Response::rejected(&request);
        }

        self.events.on_incoming().emit(&request);

        let handler = self.handler.read().clone();
        let Some(handler) = handler else {
            debug!(action = R::action(), "No handler registered");
            return R::Response::request_error(
                &request,
                ErrorCode::NotImplemented,
                &format!("No handler for {} on {}", R::action(), local),
            );
        };

        match AssertUnwindSafe(handler.handle(request.clone()))
            .catch_unwind()
            .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                warn!(action = R::action(), request_id = %request.request_id(), error = %err, "Handler failed");
                R::Response::failed(&request, Some(format!("{:#}", err)))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(action = R::action(), request_id = %request.request_id(), %message, "Handler panicked");
                R::Response::exception_occurred(&request, &message)
            }
        }
    }
}

impl<R: OcppRequest> fmt::Debug for ActionSlot<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSlot")
            .field("action", &R::action())
            .field("has_handler", &self.has_handler())
            .finish()
    }
}

/// Type-erased view of an [`ActionSlot`]
#[async_trait]
pub(crate) trait ErasedAction: Send + Sync {
    /// Answer an inbound CALL; the returned envelope goes back over the arrival link
    async fn handle(&self, call: &InboundCall, local: &NetworkingNodeId) -> NodeResult<TransportEnvelope>;

    /// Typed CALLERROR/CALLRESULT for a relay rejection
    fn render_reject(&self, call: &InboundCall, result: &ResponseResult) -> Option<Frame>;
}

#[async_trait]
impl<R: OcppRequest> ErasedAction for ActionSlot<R> {
    async fn handle(&self, call: &InboundCall, local: &NetworkingNodeId) -> NodeResult<TransportEnvelope> {
        let context = call.request_context(Utc::now());
        let request: R = match decode_request(call.payload(), &context, &self.request_hooks()) {
            Ok(request) => request,
            Err(err) => {
                warn!(action = R::action(), request_id = %call.request_id(), error = %err, "Undecodable request");
                return error_reply(call, &ResponseResult::formation_violation(err.to_string()));
            }
        };

        let response = self.respond(request.clone(), local).await;
        let reply = match Frame::reply(&response, &self.response_hooks())
            .and_then(|frame| frame.encode(call.format()))
        {
            Ok(bytes) => TransportEnvelope::for_response(response.envelope(), Bytes::from(bytes))
                .via(call.previous_hop().clone()),
            Err(err) => {
                warn!(action = R::action(), request_id = %call.request_id(), error = %err, "Response could not be encoded");
                error_reply(call, &ResponseResult::exception_occurred(err.to_string()))?
            }
        };

        self.events.on_responded().emit(&InboundExchange { request, response });
        Ok(reply)
    }

    fn render_reject(&self, call: &InboundCall, result: &ResponseResult) -> Option<Frame> {
        let context = call.request_context(Utc::now());
        let request: R = decode_request(call.payload(), &context, &CodecHooks::none()).ok()?;
        let response = R::Response::from_failure(&request, result.clone());
        Frame::reply(&response, &self.response_hooks()).ok()
    }
}

/// CALLERROR for `call`, routed back to its originator
pub(crate) fn error_reply(call: &InboundCall, result: &ResponseResult) -> NodeResult<TransportEnvelope> {
    let bytes = Frame::error_for(call.request_id().clone(), result).encode(call.format())?;
    let route = SourceRouting::reverse_of(call.network_path(), call.originator().clone());
    Ok(
        TransportEnvelope::reply(Bytes::from(bytes), call.format(), Some(route))
            .via(call.previous_hop().clone()),
    )
}

struct RegisteredAction {
    typed: Arc<dyn Any + Send + Sync>,
    erased: Arc<dyn ErasedAction>,
}

/// Action name to slot lookup
#[derive(Default)]
pub struct ActionRegistry {
    slots: DashMap<&'static str, RegisteredAction>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for `R`, created on first use
    pub fn slot<R: OcppRequest>(&self) -> NodeResult<Arc<ActionSlot<R>>> {
        let typed = self
            .slots
            .entry(R::action())
            .or_insert_with(|| {
                debug!(action = R::action(), "Registering action");
                let slot = Arc::new(ActionSlot::<R>::new());
                RegisteredAction {
                    typed: slot.clone(),
                    erased: slot,
                }
            })
            .typed
            .clone();
        typed
            .downcast::<ActionSlot<R>>()
            .map_err(|_| NodeError::ActionConflict { action: R::action() })
    }

    pub(crate) fn get(&self, action: &str) -> Option<Arc<dyn ErasedAction>> {
        self.slots.get(action).map(|entry| Arc::clone(&entry.erased))
    }

    pub fn contains(&self, action: &str) -> bool {
        self.slots.contains_key(action)
    }

    /// Registered action names, sorted
    pub fn actions(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.slots.iter().map(|entry| *entry.key()).collect();
        names.sort_unstable();
        names
    }
}

impl TypedRejector for ActionRegistry {
    fn render_reject(&self, call: &InboundCall, result: &ResponseResult) -> Option<Frame> {
        self.get(call.action())?.render_reject(call, result)
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.actions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocpp_codec::messages::{ResetRequest, ResetResponse, ResetStatus, ResetType};
    use ocpp_codec::{RequestOptions, SerializationFormat};
    use ocpp_types::NetworkPath;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn node(s: &str) -> NetworkingNodeId {
        NetworkingNodeId::new(s).unwrap()
    }

    /// CALL from csms addressed to `to`, arriving directly from csms
    fn inbound_reset(to: &str, format: SerializationFormat) -> InboundCall {
        let request = ResetRequest::new(
            SourceRouting::to(node(to)),
            ResetType::Immediate,
            None,
            RequestOptions::default()
                .with_origin(node("csms"))
                .with_format(format),
        );
        let bytes = Frame::call(&request, &CodecHooks::none())
            .unwrap()
            .encode(format)
            .unwrap();
        let envelope = TransportEnvelope::for_request(request.envelope(), Bytes::from(bytes))
            .via(node("csms"));
        InboundCall::from_transport(envelope).unwrap()
    }

    fn reply_frame(reply: &TransportEnvelope) -> Frame {
        Frame::decode(&reply.frame, reply.format).unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn handler_answer_goes_back_over_the_arrival_link() {
        let registry = ActionRegistry::new();
        let slot = registry.slot::<ResetRequest>().unwrap();
        slot.set_handler(Arc::new(handler_fn(|req: ResetRequest| async move {
            Ok(ResetResponse::new(&req, ResetStatus::Accepted, None))
        })));

        let call = inbound_reset("cs1", SerializationFormat::Binary);
        let erased = registry.get("Reset").unwrap();
        let reply = erased.handle(&call, &node("cs1")).await.unwrap();

        assert_eq!(reply.link, Some(node("csms")));
        assert_eq!(reply.format, SerializationFormat::Binary);
        assert_eq!(reply.destination, Some(SourceRouting::to(node("csms"))));
        assert_eq!(reply.network_path, NetworkPath::empty());
        assert_eq!(reply_frame(&reply).kind(), 3);
    }

    #[test_log::test(tokio::test)]
    async fn missing_handler_is_not_implemented() {
        let registry = ActionRegistry::new();
        registry.slot::<ResetRequest>().unwrap();
        let call = inbound_reset("cs1", SerializationFormat::Json);

        let reply = registry.get("Reset").unwrap().handle(&call, &node("cs1")).await.unwrap();
        let result = reply_frame(&reply).error_result().unwrap();
        assert_eq!(result.error_code(), Some(ErrorCode::NotImplemented));
    }

    #[test_log::test(tokio::test)]
    async fn handler_error_and_panic_are_mapped() {
        let registry = ActionRegistry::new();
        let slot = registry.slot::<ResetRequest>().unwrap();
        let call = inbound_reset("cs1", SerializationFormat::Json);

        slot.set_handler(Arc::new(handler_fn(|_req: ResetRequest| async move {
            Err::<ResetResponse, _>(anyhow::anyhow!("relay stuck"))
        })));
        let reply = registry.get("Reset").unwrap().handle(&call, &node("cs1")).await.unwrap();
        let failed = reply_frame(&reply).error_result().unwrap();
        assert_eq!(failed, ResponseResult::failed(Some("relay stuck".into())));

        slot.set_handler(Arc::new(handler_fn(|_req: ResetRequest| async move {
            if true {
                panic!("firmware exploded");
            }
            Err::<ResetResponse, _>(anyhow::anyhow!("unreachable"))
        })));
        let reply = registry.get("Reset").unwrap().handle(&call, &node("cs1")).await.unwrap();
        let exception = reply_frame(&reply).error_result().unwrap();
        assert_eq!(exception.error_code(), Some(ErrorCode::InternalError));
        assert_eq!(exception.description(), Some("firmware exploded"));
    }

    #[test_log::test(tokio::test)]
    async fn destination_mismatch_answers_rejected_without_calling_handler() {
        let registry = ActionRegistry::new();
        let slot = registry.slot::<ResetRequest>().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        slot.set_handler(Arc::new(handler_fn(move |req: ResetRequest| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(ResetResponse::new(&req, ResetStatus::Accepted, None)) }
        })));
        let incoming = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&incoming);
        slot.events().on_incoming().subscribe("count", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let call = inbound_reset("cs2", SerializationFormat::Json);
        let reply = registry.get("Reset").unwrap().handle(&call, &node("cs1")).await.unwrap();

        let Frame::CallResult { payload, .. } = reply_frame(&reply) else {
            panic!("expected CALLRESULT");
        };
        assert_eq!(payload.as_json().unwrap()["status"], "Rejected");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(incoming.load(Ordering::SeqCst), 0);
    }

    #[test_log::test(tokio::test)]
    async fn responded_observer_sees_the_exchange() {
        let registry = ActionRegistry::new();
        let slot = registry.slot::<ResetRequest>().unwrap();
        slot.set_handler(Arc::new(handler_fn(|req: ResetRequest| async move {
            Ok(ResetResponse::new(&req, ResetStatus::Scheduled, None))
        })));
        let statuses = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&statuses);
        slot.events().on_responded().subscribe("collect", move |exchange| {
            sink.lock().push(*exchange.response.status());
            Ok(())
        });

        let call = inbound_reset("cs1", SerializationFormat::Json);
        registry.get("Reset").unwrap().handle(&call, &node("cs1")).await.unwrap();
        assert_eq!(*statuses.lock(), vec![ResetStatus::Scheduled]);
    }

    #[test]
    fn rejector_renders_typed_failure() {
        let registry = ActionRegistry::new();
        registry.slot::<ResetRequest>().unwrap();
        let call = inbound_reset("cs9", SerializationFormat::Json);

        let frame = registry
            .render_reject(&call, &ResponseResult::signature_error("bad signature"))
            .unwrap();
        assert_eq!(frame.request_id(), call.request_id());
        assert_eq!(
            frame.error_result().unwrap().error_code(),
            Some(ErrorCode::SecurityError)
        );
        assert!(registry.render_reject(&inbound_reset("cs9", SerializationFormat::Json), &ResponseResult::failed(None)).is_some());
    }

    #[test]
    fn slots_are_shared_per_action() {
        let registry = ActionRegistry::new();
        let a = registry.slot::<ResetRequest>().unwrap();
        let b = registry.slot::<ResetRequest>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.actions(), vec!["Reset"]);
        assert!(registry.contains("Reset"));
        assert!(!registry.contains("GetFile"));
    }
}
