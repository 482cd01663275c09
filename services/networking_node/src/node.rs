//! Exchange façade
//!
//! ## Purpose
//!
//! [`NetworkingNode`] is the single object an application talks to. It
//! sends typed requests and awaits typed responses, dispatches inbound
//! requests to registered handlers, relays traffic addressed to other
//! nodes, and stages requests that handlers originate.
//!
//! ## Architecture Role
//!
//! ```text
//!   application ── send::<R>() ──► NetworkingNode ──► Correlator ──► Transport
//!        ▲                            │    ▲                            │
//!        │ RequestHandler<R>          │    └──── receive() ◄── inbound pump
//!        └────── ActionRegistry ◄─────┤
//!                                     └──► ForwardingEngine (relay role)
//! ```
//!
//! Inbound deliveries are handled one task each, so a slow handler never
//! blocks replies to this node's own outstanding requests.

use crate::actions::{error_reply, ActionRegistry, ActionSlot, OutboundExchange, RequestHandler};
use crate::error::{NodeError, NodeResult};
use crate::handled::{Admission, HandledCalls};
use crate::outbox::Outbox;
use bytes::Bytes;
use ocpp_codec::{
    decode_response, response_from_failure, CodecHooks, ErrorCode, Frame, KeyedDigestVerifier,
    OcppRequest, OcppResponse, RequestOptions, ResponseContext, ResponseResult,
    SerializationFormat, DEFAULT_REQUEST_TIMEOUT,
};
use ocpp_config::NodeConfig;
use ocpp_network::{
    spawn_periodic, Correlator, MaintenanceLock, OutboundCall, Reply, Transport, TransportEnvelope,
};
use ocpp_types::NetworkingNodeId;
use relay_core::{
    ForwardingConfig, ForwardingEngine, InboundCall, RelayAction, RoutingTable, SignaturePolicy,
    DEFAULT_DUPLICATE_WINDOW,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default period of the housekeeping sweep
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Values applied to requests built through [`NetworkingNode::request_options`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestDefaults {
    pub timeout: Duration,
    pub format: SerializationFormat,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            format: SerializationFormat::Json,
        }
    }
}

/// Configures and builds a [`NetworkingNode`]
pub struct NodeBuilder {
    id: NetworkingNodeId,
    transport: Arc<dyn Transport>,
    defaults: RequestDefaults,
    forwarding: Option<ForwardingConfig>,
    signature_policy: Option<SignaturePolicy>,
    routes: Vec<(NetworkingNodeId, NetworkingNodeId)>,
    default_route: Option<NetworkingNodeId>,
    sweep_interval: Duration,
    duplicate_window: Duration,
}

impl NodeBuilder {
    pub fn new(id: NetworkingNodeId, transport: Arc<dyn Transport>) -> Self {
        Self {
            id,
            transport,
            defaults: RequestDefaults::default(),
            forwarding: None,
            signature_policy: None,
            routes: Vec::new(),
            default_route: None,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            duplicate_window: DEFAULT_DUPLICATE_WINDOW,
        }
    }

    /// Builder populated from a validated [`NodeConfig`]
    ///
    /// With `require_signatures` set, the relay rejects every JSON request
    /// until a keyed policy replaces the default via
    /// [`NodeBuilder::signature_policy`].
    pub fn from_config(config: &NodeConfig, transport: Arc<dyn Transport>) -> anyhow::Result<Self> {
        config.validate()?;
        let mut builder = Self::new(config.node_id()?, transport)
            .request_timeout(config.request_timeout())
            .format(config.exchange.format)
            .sweep_interval(config.sweep_interval())
            .duplicate_window(config.duplicate_window());

        for (destination, next_hop) in config.routes()? {
            builder = builder.route(destination, next_hop);
        }
        if let Some(hop) = config.default_route()? {
            builder = builder.default_route(hop);
        }

        if config.forwarding.enabled {
            let supported_actions = (!config.forwarding.supported_actions.is_empty()).then(|| {
                config
                    .forwarding
                    .supported_actions
                    .iter()
                    .cloned()
                    .collect::<HashSet<_>>()
            });
            builder = builder.forwarding(ForwardingConfig {
                max_hops: config.forwarding.max_hops,
                duplicate_window: config.duplicate_window(),
                supported_actions,
            });
            if config.forwarding.require_signatures {
                builder = builder.signature_policy(SignaturePolicy::new(Arc::new(
                    KeyedDigestVerifier::new().requiring_signature(),
                )));
            }
        }
        Ok(builder)
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.defaults.timeout = timeout;
        self
    }

    pub fn format(mut self, format: SerializationFormat) -> Self {
        self.defaults.format = format;
        self
    }

    /// Relay CALLs addressed to other nodes
    pub fn forwarding(mut self, config: ForwardingConfig) -> Self {
        self.forwarding = Some(config);
        self
    }

    /// Verify request signatures before relaying
    pub fn signature_policy(mut self, policy: SignaturePolicy) -> Self {
        self.signature_policy = Some(policy);
        self
    }

    pub fn route(mut self, destination: NetworkingNodeId, next_hop: NetworkingNodeId) -> Self {
        self.routes.push((destination, next_hop));
        self
    }

    pub fn default_route(mut self, next_hop: NetworkingNodeId) -> Self {
        self.default_route = Some(next_hop);
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// How long an answered inbound CALL is remembered for redeliveries
    pub fn duplicate_window(mut self, window: Duration) -> Self {
        self.duplicate_window = window;
        self
    }

    pub fn build(self) -> NodeResult<Arc<NetworkingNode>> {
        let routes = Arc::new(RoutingTable::new(self.id.clone()));
        for (destination, next_hop) in self.routes {
            routes.add_route(destination, next_hop)?;
        }
        routes.set_default_route(self.default_route)?;

        let actions = Arc::new(ActionRegistry::new());
        let forwarding = self.forwarding.map(|config| {
            let engine = ForwardingEngine::with_routing_table(config, Arc::clone(&routes))
                .with_rejector(actions.clone());
            match self.signature_policy {
                Some(policy) => engine.with_signature_policy(policy),
                None => engine,
            }
        });

        info!(
            node = %self.id,
            relay = forwarding.is_some(),
            routes = routes.len(),
            "Node built"
        );
        Ok(Arc::new(NetworkingNode {
            id: self.id,
            transport: self.transport,
            correlator: Correlator::new(),
            actions,
            routes,
            forwarding,
            outbox: Outbox::new(),
            handled: HandledCalls::new(self.duplicate_window),
            maintenance: Arc::new(MaintenanceLock::new("node-sweep")),
            defaults: self.defaults,
            sweep_interval: self.sweep_interval,
            shutdown: CancellationToken::new(),
        }))
    }
}

/// Background tasks of a started node
#[derive(Debug)]
pub struct NodeTasks {
    handles: Vec<JoinHandle<()>>,
}

impl NodeTasks {
    /// Wait for every task to stop
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "Node task ended abnormally");
            }
        }
    }
}

/// One OCPP participant: charging station, networking node or CSMS
pub struct NetworkingNode {
    id: NetworkingNodeId,
    transport: Arc<dyn Transport>,
    correlator: Correlator,
    actions: Arc<ActionRegistry>,
    routes: Arc<RoutingTable>,
    forwarding: Option<ForwardingEngine>,
    outbox: Arc<Outbox>,
    /// Inbound (originator, id) pairs handled within the duplicate window
    handled: HandledCalls,
    maintenance: Arc<MaintenanceLock>,
    defaults: RequestDefaults,
    sweep_interval: Duration,
    shutdown: CancellationToken,
}

impl NetworkingNode {
    pub fn id(&self) -> &NetworkingNodeId {
        &self.id
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    /// Relay engine, when this node forwards
    pub fn forwarding(&self) -> Option<&ForwardingEngine> {
        self.forwarding.as_ref()
    }

    pub fn outbox(&self) -> &Arc<Outbox> {
        &self.outbox
    }

    /// Inbound calls answered within the duplicate window
    pub fn handled(&self) -> &HandledCalls {
        &self.handled
    }

    pub fn maintenance(&self) -> &MaintenanceLock {
        &self.maintenance
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Options carrying this node's default timeout and format
    pub fn request_options(&self) -> RequestOptions {
        RequestOptions::default()
            .with_timeout(self.defaults.timeout)
            .with_format(self.defaults.format)
    }

    /// Slot for `R`, for lifecycle observers and codec hooks
    pub fn action<R: OcppRequest>(&self) -> NodeResult<Arc<ActionSlot<R>>> {
        self.actions.slot::<R>()
    }

    /// Answer inbound `R` requests with `handler`
    pub fn register<R, H>(&self, handler: H) -> NodeResult<()>
    where
        R: OcppRequest,
        H: RequestHandler<R>,
    {
        self.actions.slot::<R>()?.set_handler(Arc::new(handler));
        debug!(node = %self.id, action = R::action(), "Handler registered");
        Ok(())
    }

    /// Install custom parse/serialize hooks for `R` and its response
    pub fn set_hooks<R: OcppRequest>(
        &self,
        request_hooks: CodecHooks<R>,
        response_hooks: CodecHooks<R::Response>,
    ) -> NodeResult<()> {
        let slot = self.actions.slot::<R>()?;
        slot.set_request_hooks(request_hooks);
        slot.set_response_hooks(response_hooks);
        Ok(())
    }

    /// Send `request` and wait for its typed response
    ///
    /// Protocol failures reported by the peer come back as a response whose
    /// `result()` carries them. `Err` means no response exists: timeout,
    /// cancellation, duplicate id, no route or transport failure.
    pub async fn send<R: OcppRequest>(&self, request: R, cancel: &CancellationToken) -> NodeResult<R::Response> {
        let slot = self.actions.slot::<R>()?;
        let envelope = request.envelope().with_origin(self.id.clone());
        let request = request.with_envelope(envelope);

        slot.events().on_request().emit(&request);
        let outcome = self.exchange(&slot, &request, cancel).await;
        slot.events().on_response().emit(&OutboundExchange {
            request,
            outcome: outcome.clone(),
        });
        outcome
    }

    async fn exchange<R: OcppRequest>(
        &self,
        slot: &ActionSlot<R>,
        request: &R,
        cancel: &CancellationToken,
    ) -> NodeResult<R::Response> {
        let envelope = request.envelope();
        let destination = envelope.destination();
        let next_hop = self
            .routes
            .next_hop(destination)
            .ok_or_else(|| NodeError::NoRoute {
                local: self.id.clone(),
                destination: destination.final_destination().clone(),
            })?;

        let bytes = Frame::call(request, &slot.request_hooks())?.encode(envelope.serialization_format())?;
        let call = OutboundCall {
            request_id: request.request_id().clone(),
            action: R::action().to_string(),
            timeout: envelope.request_timeout(),
            envelope: TransportEnvelope::for_request(envelope, Bytes::from(bytes)).via(next_hop),
        };

        let reply = self.correlator.call(self.transport.as_ref(), call, cancel).await?;
        Ok(self.typed_reply(slot, request, reply))
    }

    fn typed_reply<R: OcppRequest>(&self, slot: &ActionSlot<R>, request: &R, reply: Reply) -> R::Response {
        let context = ResponseContext::for_request(request.envelope(), reply.network_path);
        match reply.frame {
            Frame::CallResult { payload, .. } => {
                match decode_response::<R::Response>(&payload, &context, &slot.response_hooks()) {
                    Ok(response) => response,
                    Err(err) => {
                        warn!(
                            action = R::action(),
                            request_id = %request.request_id(),
                            error = %err,
                            "Undecodable response"
                        );
                        response_from_failure(request, &context, ResponseResult::formation_violation(err.to_string()))
                    }
                }
            }
            ref frame @ Frame::CallError { .. } => {
                let result = frame
                    .error_result()
                    .unwrap_or_else(|| ResponseResult::failed(None));
                debug!(action = R::action(), request_id = %request.request_id(), %result, "Peer reported failure");
                response_from_failure(request, &context, result)
            }
            Frame::Call { .. } => response_from_failure(
                request,
                &context,
                ResponseResult::formation_violation("CALL frame received as a reply"),
            ),
        }
    }

    /// Handle one inbound delivery
    pub async fn receive(&self, envelope: TransportEnvelope) -> NodeResult<()> {
        let frame = match Frame::decode(&envelope.frame, envelope.format) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(node = %self.id, link = ?envelope.link, error = %err, "Dropping undecodable frame");
                return Ok(());
            }
        };

        if frame.is_call() {
            return self.receive_call(frame, envelope).await;
        }

        if let Some(engine) = &self.forwarding {
            let own_call = envelope.destination.is_none() && self.correlator.is_pending(frame.request_id());
            if !own_call && engine.is_forwarded(&frame, &envelope) {
                if let Some(relayed) = engine.relay_response(&frame, envelope) {
                    self.transport.send(relayed).await?;
                }
                return Ok(());
            }
        }
        self.correlator.resolve(Reply {
            frame,
            network_path: envelope.network_path,
        });
        Ok(())
    }

    async fn receive_call(&self, frame: Frame, envelope: TransportEnvelope) -> NodeResult<()> {
        let call = InboundCall::from_frame(frame, envelope)?;
        if !call.destination().is_for(&self.id) {
            if let Some(engine) = &self.forwarding {
                match engine.process(call)? {
                    RelayAction::Forward(envelope) | RelayAction::Reply(envelope) => {
                        self.transport.send(envelope).await?
                    }
                    RelayAction::Drop => {}
                }
                return Ok(());
            }
        }
        self.handle_local(call).await
    }

    async fn handle_local(&self, call: InboundCall) -> NodeResult<()> {
        match self.handled.admit(call.originator(), call.request_id()) {
            Admission::Handle => {}
            Admission::InProgress => {
                debug!(
                    node = %self.id,
                    originator = %call.originator(),
                    request_id = %call.request_id(),
                    "Request already being handled, ignoring redelivery"
                );
                return Ok(());
            }
            Admission::Replay(reply) => {
                debug!(
                    node = %self.id,
                    originator = %call.originator(),
                    request_id = %call.request_id(),
                    "Request already answered, replaying reply"
                );
                self.transport.send(reply.via(call.previous_hop().clone())).await?;
                return Ok(());
            }
        }

        let reply = match self.actions.get(call.action()) {
            Some(action) => action.handle(&call, &self.id).await?,
            None => {
                debug!(node = %self.id, action = call.action(), "Unknown action");
                error_reply(
                    &call,
                    &ResponseResult::request_error(
                        ErrorCode::NotImplemented,
                        format!("{} is not implemented by {}", call.action(), self.id),
                    ),
                )?
            }
        };
        self.handled
            .record_reply(call.originator(), call.request_id(), reply.clone());
        self.transport.send(reply).await?;
        Ok(())
    }

    /// Start the inbound pump, the outbox dispatcher and the sweep
    pub fn start(self: &Arc<Self>, mut inbox: mpsc::Receiver<TransportEnvelope>) -> NodeTasks {
        let mut handles = Vec::with_capacity(3);

        let node = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let envelope = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = inbox.recv() => match next {
                        Some(envelope) => envelope,
                        None => break,
                    },
                };
                let node = Arc::clone(&node);
                tokio::spawn(async move {
                    if let Err(err) = node.receive(envelope).await {
                        warn!(node = %node.id, error = %err, "Inbound delivery failed");
                    }
                });
            }
            debug!(node = %node.id, "Inbound pump stopped");
        }));

        if let Some(handle) = self
            .outbox
            .spawn_dispatcher(Arc::clone(self), self.shutdown.clone())
        {
            handles.push(handle);
        }

        let node = Arc::clone(self);
        handles.push(spawn_periodic(
            Arc::clone(&self.maintenance),
            self.sweep_interval,
            move || {
                let node = Arc::clone(&node);
                async move {
                    node.sweep();
                }
            },
            self.shutdown.clone(),
        ));

        info!(node = %self.id, "Node started");
        NodeTasks { handles }
    }

    /// Drop finished staged requests, answered inbound calls past the
    /// duplicate window and expired relay entries
    pub fn sweep(&self) {
        let finished = self.outbox.sweep_finished();
        let handled = self.handled.purge_expired();
        let (duplicates, forwarded) = self
            .forwarding
            .as_ref()
            .map(ForwardingEngine::purge_expired)
            .unwrap_or_default();
        debug!(node = %self.id, finished, handled, duplicates, forwarded, "Sweep complete");
    }

    /// Stop background tasks and cancel pending calls
    pub fn shutdown(&self) {
        info!(node = %self.id, in_flight = self.correlator.in_flight(), "Shutting down");
        self.shutdown.cancel();
        self.correlator.cancel_all();
    }
}

impl std::fmt::Debug for NetworkingNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkingNode")
            .field("id", &self.id)
            .field("relay", &self.forwarding.is_some())
            .field("actions", &self.actions.actions())
            .field("in_flight", &self.correlator.in_flight())
            .finish()
    }
}

