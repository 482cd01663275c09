//! Multi-relay forwarding scenarios driven through the public engine API

use bytes::Bytes;
use ocpp_codec::messages::{ResetRequest, ResetResponse, ResetType};
use ocpp_codec::{
    decode_request, CodecHooks, Frame, OcppRequest, OcppResponse, RequestOptions,
};
use ocpp_network::TransportEnvelope;
use ocpp_types::{
    NetworkPath, NetworkingNodeId, ResponseResult, SerializationFormat, SourceRouting,
};
use relay_core::{
    ForwardingConfig, ForwardingEngine, ForwardingResult, InboundCall, Received, RejectResponse,
    RelayAction, TypedRejector,
};
use std::sync::Arc;

fn node(s: &str) -> NetworkingNodeId {
    NetworkingNodeId::new(s).unwrap()
}

fn reset_envelope(routing: SourceRouting, format: SerializationFormat) -> TransportEnvelope {
    let request = ResetRequest::new(
        routing,
        ResetType::Immediate,
        Some(1),
        RequestOptions::default()
            .with_format(format)
            .with_origin(node("csms")),
    );
    let frame = Frame::call(&request, &CodecHooks::none())
        .unwrap()
        .encode(format)
        .unwrap();
    TransportEnvelope::for_request(request.envelope(), Bytes::from(frame))
}

/// Renders Reset rejections through the typed response codec
struct ResetRejector;

impl TypedRejector for ResetRejector {
    fn render_reject(&self, call: &InboundCall, result: &ResponseResult) -> Option<Frame> {
        if call.action() != ResetRequest::action() {
            return None;
        }
        let ctx = call.request_context(chrono::Utc::now());
        let request: ResetRequest = decode_request(call.payload(), &ctx, &CodecHooks::none()).ok()?;
        Frame::reply(&ResetResponse::from_failure(&request, result.clone()), &CodecHooks::none()).ok()
    }
}

#[test_log::test]
fn explicit_hop_list_threads_two_relays() {
    let nn1 = ForwardingEngine::new(node("nn1"), ForwardingConfig::default());
    let nn2 = ForwardingEngine::new(node("nn2"), ForwardingConfig::default());
    let routing = SourceRouting::via(vec![node("nn1"), node("nn2")], node("cs1"));

    // csms → nn1
    let at_nn1 = reset_envelope(routing, SerializationFormat::Binary).via(node("csms"));
    let RelayAction::Forward(to_nn2) = nn1.process(InboundCall::from_transport(at_nn1).unwrap()).unwrap() else {
        panic!("nn1 should forward");
    };
    assert_eq!(to_nn2.link, Some(node("nn2")));

    // nn1 → nn2, as delivered by the transport
    let at_nn2 = TransportEnvelope { link: Some(node("nn1")), ..to_nn2 };
    let RelayAction::Forward(to_cs) = nn2.process(InboundCall::from_transport(at_nn2).unwrap()).unwrap() else {
        panic!("nn2 should forward");
    };
    assert_eq!(to_cs.link, Some(node("cs1")));
    assert_eq!(
        to_cs.network_path,
        NetworkPath::from_hops(vec![node("nn1"), node("nn2")])
    );
    assert_eq!(to_cs.origin, Some(node("csms")));

    // Reply walks back: cs1 → nn2 → nn1 → csms
    let frame = Frame::decode(&to_cs.frame, to_cs.format).unwrap();
    let reply = Frame::CallResult {
        request_id: frame.request_id().clone(),
        payload: ocpp_codec::Payload::Json(serde_json::json!({"status": "Accepted"})),
    };
    let from_cs = TransportEnvelope::reply(Bytes::new(), SerializationFormat::Json, None).via(node("cs1"));
    let from_nn2 = nn2.relay_response(&reply, from_cs).unwrap();
    assert_eq!(from_nn2.link, Some(node("nn1")));
    let from_nn1 = nn1.relay_response(&reply, TransportEnvelope { link: Some(node("nn2")), ..from_nn2 }).unwrap();
    assert_eq!(from_nn1.link, Some(node("csms")));
    assert_eq!(from_nn1.network_path.len(), 2);
}

#[test_log::test]
fn typed_rejector_renders_known_actions() {
    let engine = ForwardingEngine::new(node("nn1"), ForwardingConfig::default())
        .with_rejector(Arc::new(ResetRejector));
    let inbound = reset_envelope(SourceRouting::to(node("cs-unknown")), SerializationFormat::Json)
        .via(node("csms"));
    let decided = engine.decide(Received::new(InboundCall::from_transport(inbound).unwrap()));
    assert_eq!(decided.decision().result, ForwardingResult::Reject);
    assert!(matches!(
        decided.decision().reject_response,
        Some(RejectResponse::Typed(Frame::CallError { .. }))
    ));

    let RelayAction::Reply(reply) = engine.resolve(decided).unwrap() else {
        panic!("expected a reply");
    };
    assert_eq!(reply.link, Some(node("csms")));
    assert_eq!(reply.destination, Some(SourceRouting::to(node("csms"))));
    let frame = Frame::decode(&reply.frame, reply.format).unwrap();
    assert_eq!(frame.kind(), 4);
}

#[test_log::test]
fn binary_payloads_pass_the_relay_signature_check() {
    let verifier = ocpp_codec::KeyedDigestVerifier::new()
        .with_key("k1", b"secret".to_vec())
        .requiring_signature();
    let engine = ForwardingEngine::new(node("nn1"), ForwardingConfig::default())
        .with_signature_policy(relay_core::SignaturePolicy::new(Arc::new(verifier)));
    engine.routes().add_neighbour(node("cs1")).unwrap();

    let binary = reset_envelope(SourceRouting::to(node("cs1")), SerializationFormat::Binary).via(node("csms"));
    let action = engine.process(InboundCall::from_transport(binary).unwrap()).unwrap();
    assert!(matches!(action, RelayAction::Forward(_)));

    let json = reset_envelope(SourceRouting::to(node("cs1")), SerializationFormat::Json).via(node("csms"));
    let action = engine.process(InboundCall::from_transport(json).unwrap()).unwrap();
    assert!(matches!(action, RelayAction::Reply(_)));
}
