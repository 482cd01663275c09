//! Full-stack exchanges across charging station, networking node and CSMS

use bytes::Bytes;
use futures::future::join_all;
use ocpp_codec::messages::{
    DataTransferRequest, DataTransferResponse, DataTransferStatus, ResetRequest, ResetResponse,
    ResetStatus, ResetType,
};
use ocpp_codec::{
    sign_request, CodecHooks, ErrorCode, Frame, KeyedDigestSigner, KeyedDigestVerifier,
    NetworkPath, OcppRequest, OcppResponse, RequestOptions, ResponseResult, SerializationFormat,
    SourceRouting,
};
use ocpp_e2e::framework::{id, Overlay, CSMS, RELAY, STATION};
use ocpp_e2e::scenarios::remote_start::wait_for_transaction;
use ocpp_e2e::{run_scenario, scenarios};
use ocpp_network::{Transport, TransportEnvelope};
use ocpp_node::csms::{self, TransactionBook};
use ocpp_node::station::{self, FileStore};
use ocpp_node::{handler_fn, EnqueuedStatus, NetworkingNode};
use ocpp_types::{ConnectorId, NetworkingNodeId, RequestId};
use relay_core::{ForwardingConfig, SignaturePolicy};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn node(name: &str) -> NetworkingNodeId {
    id(name).unwrap()
}

fn reset_to(to: &str, sender: &NetworkingNode) -> ResetRequest {
    ResetRequest::new(
        SourceRouting::to(node(to)),
        ResetType::Immediate,
        None,
        sender.request_options(),
    )
}

/// Reset handler answering `status`, counting invocations
fn answer_resets(target: &NetworkingNode, status: ResetStatus) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    target
        .register(handler_fn(move |req: ResetRequest| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(ResetResponse::new(&req, status, None)) }
        }))
        .unwrap();
    calls
}

/// Raw CALL envelope as a node without a façade would emit it
fn raw_reset(request_id: &str, from: &str, to: &str, link: &str) -> TransportEnvelope {
    let request = ResetRequest::new(
        SourceRouting::to(node(to)),
        ResetType::OnIdle,
        None,
        RequestOptions::default()
            .with_request_id(RequestId::new(request_id).unwrap())
            .with_origin(node(from)),
    );
    let bytes = Frame::call(&request, &CodecHooks::none())
        .unwrap()
        .encode(SerializationFormat::Json)
        .unwrap();
    TransportEnvelope::for_request(request.envelope(), Bytes::from(bytes)).via(node(link))
}

/// csms ↔ cs-1 with no relay between them
fn direct_pair(timeout: Duration) -> Overlay {
    let mut overlay = Overlay::new();
    overlay
        .add(CSMS, |b| Ok(b.route(id(STATION)?, id(STATION)?).request_timeout(timeout)))
        .unwrap();
    overlay.add(STATION, |b| Ok(b.default_route(id(CSMS)?))).unwrap();
    overlay.link(CSMS, STATION).unwrap();
    overlay
}

#[test_log::test(tokio::test)]
async fn every_runner_scenario_passes() {
    for scenario in scenarios::all() {
        let result = run_scenario(scenario.as_ref()).await;
        assert!(
            result.success,
            "{} failed: {:?} {:?}",
            result.scenario_name,
            result.error_message,
            result.checks.iter().filter(|c| !c.passed).collect::<Vec<_>>()
        );
    }
}

#[test_log::test(tokio::test)]
async fn relay_appends_itself_and_the_reply_retraces_the_path() {
    let overlay = Overlay::station_relay_csms().unwrap();
    let csms = overlay.node(CSMS).unwrap();
    let station = overlay.node(STATION).unwrap();
    answer_resets(&station, ResetStatus::Accepted);

    let seen = Arc::new(parking_lot::Mutex::new(None));
    let sink = Arc::clone(&seen);
    station
        .action::<ResetRequest>()
        .unwrap()
        .events()
        .on_incoming()
        .subscribe("capture", move |req| {
            let env = req.envelope();
            *sink.lock() = Some((env.network_path().clone(), env.origin().cloned()));
            Ok(())
        });

    let response = csms
        .send(reset_to(STATION, &csms), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(*response.status(), ResetStatus::Accepted);
    assert_eq!(
        response.envelope().network_path(),
        &NetworkPath::from_hops(vec![node(RELAY)])
    );
    let (path, origin) = seen.lock().clone().unwrap();
    assert_eq!(path, NetworkPath::from_hops(vec![node(RELAY)]));
    assert_eq!(origin, Some(node(CSMS)));
    overlay.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn routing_loop_is_rejected_back_to_the_originator() {
    let mut overlay = Overlay::new();
    overlay.add(CSMS, |b| Ok(b.default_route(id("nn-1")?))).unwrap();
    overlay
        .add("nn-1", |b| {
            Ok(b.forwarding(ForwardingConfig::default())
                .route(id("cs-x")?, id("nn-2")?)
                .default_route(id(CSMS)?))
        })
        .unwrap();
    overlay
        .add("nn-2", |b| {
            Ok(b.forwarding(ForwardingConfig::default())
                .route(id("cs-x")?, id("nn-1")?))
        })
        .unwrap();
    overlay.link(CSMS, "nn-1").unwrap();
    overlay.link("nn-1", "nn-2").unwrap();
    let csms = overlay.node(CSMS).unwrap();

    let response = csms
        .send(reset_to("cs-x", &csms), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.result().error_code(), Some(ErrorCode::GenericError));
    assert!(response
        .result()
        .description()
        .unwrap()
        .contains("Routing loop"));
    assert_eq!(*response.status(), ResetStatus::Rejected);
    let nn2 = overlay.node("nn-2").unwrap();
    assert_eq!(nn2.forwarding().unwrap().stats().rejected, 1);
    overlay.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn hop_limit_stops_long_paths() {
    let mut overlay = Overlay::new();
    overlay.add(CSMS, |b| Ok(b.default_route(id("nn-1")?))).unwrap();
    overlay
        .add("nn-1", |b| {
            Ok(b.forwarding(ForwardingConfig::default())
                .route(id(STATION)?, id("nn-2")?)
                .default_route(id(CSMS)?))
        })
        .unwrap();
    overlay
        .add("nn-2", |b| {
            Ok(b.forwarding(ForwardingConfig {
                max_hops: 1,
                ..ForwardingConfig::default()
            })
            .route(id(STATION)?, id(STATION)?)
            .default_route(id("nn-1")?))
        })
        .unwrap();
    overlay.add(STATION, |b| Ok(b.default_route(id("nn-2")?))).unwrap();
    overlay.link(CSMS, "nn-1").unwrap();
    overlay.link("nn-1", "nn-2").unwrap();
    overlay.link("nn-2", STATION).unwrap();
    let csms = overlay.node(CSMS).unwrap();
    let handled = answer_resets(&overlay.node(STATION).unwrap(), ResetStatus::Accepted);

    let response = csms
        .send(reset_to(STATION, &csms), &CancellationToken::new())
        .await
        .unwrap();

    assert!(response.result().description().unwrap().contains("Hop limit"));
    assert_eq!(handled.load(Ordering::SeqCst), 0);
    overlay.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn duplicate_delivery_is_dropped_by_the_relay() {
    let overlay = Overlay::station_relay_csms().unwrap();
    let handled = answer_resets(&overlay.node(STATION).unwrap(), ResetStatus::Accepted);
    let mut probe = overlay.probe("probe").unwrap();
    overlay.link("probe", RELAY).unwrap();

    let envelope = raw_reset("dup-1", "probe", STATION, RELAY);
    probe.transport.send(envelope.clone())
        .await
        .unwrap();
    probe.transport.send(envelope)
        .await
        .unwrap();

    let reply = probe.next(Duration::from_secs(2)).await.unwrap();
    let frame = Frame::decode(&reply.frame, reply.format).unwrap();
    assert_eq!(frame.kind(), 3);
    assert_eq!(frame.request_id(), &RequestId::new("dup-1").unwrap());
    assert!(probe.next(Duration::from_millis(200)).await.is_none());

    let stats = overlay.node(RELAY).unwrap().forwarding().unwrap().stats();
    assert_eq!(stats.forwarded, 1);
    assert_eq!(stats.dropped, 1);
    assert_eq!(handled.load(Ordering::SeqCst), 1);
    overlay.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn redelivered_call_gets_the_recorded_reply_without_a_second_handler_run() {
    let mut overlay = Overlay::new();
    let station = overlay.add(STATION, Ok).unwrap();
    let handled = answer_resets(&station, ResetStatus::Accepted);
    let mut peer = overlay.probe("raw-peer").unwrap();
    overlay.link("raw-peer", STATION).unwrap();

    let envelope = raw_reset("again-1", "raw-peer", STATION, STATION);
    peer.transport.send(envelope.clone()).await.unwrap();
    let first = peer.next(Duration::from_secs(2)).await.unwrap();
    peer.transport.send(envelope).await.unwrap();
    let second = peer.next(Duration::from_secs(2)).await.unwrap();

    assert_eq!(handled.load(Ordering::SeqCst), 1);
    assert_eq!(first.frame, second.frame);
    assert_eq!(second.link, Some(node(STATION)));
    let frame = Frame::decode(&second.frame, second.format).unwrap();
    assert_eq!(frame.kind(), 3);
    assert_eq!(frame.request_id(), &RequestId::new("again-1").unwrap());
    assert_eq!(station.handled().len(), 1);
    overlay.shutdown().await;
}

/// Reset to the CSMS carrying a fixed request id
fn shared_id_reset(sender: &NetworkingNode) -> ResetRequest {
    ResetRequest::new(
        SourceRouting::to(node(CSMS)),
        ResetType::Immediate,
        None,
        sender
            .request_options()
            .with_request_id(RequestId::new("shared-1").unwrap()),
    )
}

#[test_log::test(tokio::test)]
async fn stations_sharing_a_request_id_each_get_their_own_reply() {
    let mut overlay = Overlay::new();
    let csms = overlay.add(CSMS, |b| Ok(b.default_route(id(RELAY)?))).unwrap();
    overlay
        .add(RELAY, |b| {
            Ok(b.forwarding(ForwardingConfig::default())
                .route(id(STATION)?, id(STATION)?)
                .route(id("cs-2")?, id("cs-2")?)
                .default_route(id(CSMS)?))
        })
        .unwrap();
    let first = overlay.add(STATION, |b| Ok(b.default_route(id(RELAY)?))).unwrap();
    let second = overlay.add("cs-2", |b| Ok(b.default_route(id(RELAY)?))).unwrap();
    overlay.link(CSMS, RELAY).unwrap();
    overlay.link(RELAY, STATION).unwrap();
    overlay.link(RELAY, "cs-2").unwrap();

    csms.register(handler_fn(|req: ResetRequest| async move {
        let status = if req.envelope().origin() == Some(&node(STATION)) {
            ResetStatus::Accepted
        } else {
            ResetStatus::Scheduled
        };
        Ok(ResetResponse::new(&req, status, None))
    }))
    .unwrap();

    let cancel = CancellationToken::new();
    let (from_first, from_second) = tokio::join!(
        first.send(shared_id_reset(&first), &cancel),
        second.send(shared_id_reset(&second), &cancel)
    );
    assert_eq!(*from_first.unwrap().status(), ResetStatus::Accepted);
    assert_eq!(*from_second.unwrap().status(), ResetStatus::Scheduled);

    let stats = overlay.node(RELAY).unwrap().forwarding().unwrap().stats();
    assert_eq!(stats.forwarded, 2);
    assert_eq!(stats.responses_relayed, 2);
    assert_eq!(stats.responses_unmatched, 0);
    overlay.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn station_answers_misaddressed_request_with_rejected_status() {
    let mut overlay = Overlay::new();
    let station = overlay.add(STATION, Ok).unwrap();
    let handled = answer_resets(&station, ResetStatus::Accepted);
    let mut probe = overlay.probe("probe").unwrap();
    overlay.link("probe", STATION).unwrap();

    probe
        .transport
        .send(raw_reset("r-1", "probe", "cs-2", STATION))
        .await
        .unwrap();

    let reply = probe.next(Duration::from_secs(2)).await.unwrap();
    let Frame::CallResult { payload, .. } = Frame::decode(&reply.frame, reply.format).unwrap() else {
        panic!("expected CALLRESULT");
    };
    assert_eq!(payload.as_json().unwrap()["status"], "Rejected");
    assert_eq!(reply.destination, Some(SourceRouting::to(node("probe"))));
    assert_eq!(handled.load(Ordering::SeqCst), 0);
    overlay.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn unregistered_action_is_not_implemented() {
    let mut overlay = Overlay::new();
    overlay.add(STATION, Ok).unwrap();
    let mut probe = overlay.probe("probe").unwrap();
    overlay.link("probe", STATION).unwrap();

    probe
        .transport
        .send(raw_reset("r-2", "probe", STATION, STATION))
        .await
        .unwrap();

    let reply = probe.next(Duration::from_secs(2)).await.unwrap();
    let frame = Frame::decode(&reply.frame, reply.format).unwrap();
    assert_eq!(
        frame.error_result().unwrap().error_code(),
        Some(ErrorCode::NotImplemented)
    );
    overlay.shutdown().await;
}

#[test_log::test(tokio::test(start_paused = true))]
async fn late_reply_after_timeout_is_discarded() {
    let overlay = direct_pair(Duration::from_millis(100));
    let csms = overlay.node(CSMS).unwrap();
    overlay
        .node(STATION)
        .unwrap()
        .register(handler_fn(|req: ResetRequest| async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(ResetResponse::new(&req, ResetStatus::Accepted, None))
        }))
        .unwrap();

    let request = reset_to(STATION, &csms);
    let request_id = request.request_id().clone();
    let err = csms.send(request, &CancellationToken::new()).await.unwrap_err();
    assert!(err.is_timeout());

    tokio::time::sleep(Duration::from_secs(1)).await;
    let stats = csms.correlator().stats();
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.discarded, 1);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(overlay.transport(CSMS).unwrap().abandoned(), vec![request_id]);
    overlay.shutdown().await;
}

#[test_log::test(tokio::test(start_paused = true))]
async fn cancellation_resolves_the_call() {
    let overlay = direct_pair(Duration::from_secs(30));
    let csms = overlay.node(CSMS).unwrap();
    overlay
        .node(STATION)
        .unwrap()
        .register(handler_fn(|req: ResetRequest| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(ResetResponse::new(&req, ResetStatus::Accepted, None))
        }))
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = csms.send(reset_to(STATION, &csms), &cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(csms.correlator().stats().cancelled, 1);
    assert_eq!(csms.correlator().in_flight(), 0);
    overlay.shutdown().await;
}

#[test_log::test(tokio::test(start_paused = true))]
async fn concurrent_calls_resolve_out_of_order() {
    let overlay = direct_pair(Duration::from_secs(5));
    let csms = overlay.node(CSMS).unwrap();
    overlay
        .node(STATION)
        .unwrap()
        .register(handler_fn(|req: DataTransferRequest| async move {
            let delay: u64 = req.message_id().as_deref().unwrap_or("0").parse()?;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok::<_, anyhow::Error>(DataTransferResponse::new(
                &req,
                DataTransferStatus::Accepted,
                Some(serde_json::json!(delay)),
            ))
        }))
        .unwrap();

    let requests: Vec<_> = [300u64, 200, 100]
        .iter()
        .map(|delay| {
            DataTransferRequest::new(
                SourceRouting::to(node(STATION)),
                "acme",
                Some(delay.to_string()),
                None,
                csms.request_options(),
            )
            .unwrap()
        })
        .collect();
    let ids: Vec<_> = requests.iter().map(|r| r.request_id().clone()).collect();

    let cancel = CancellationToken::new();
    let responses = join_all(requests.into_iter().map(|r| csms.send(r, &cancel))).await;

    for ((response, id), delay) in responses.into_iter().zip(ids).zip([300u64, 200, 100]) {
        let response = response.unwrap();
        assert_eq!(response.request_id(), &id);
        assert_eq!(response.data().as_ref().map(|d| d.0.clone()), Some(serde_json::json!(delay)));
    }
    assert_eq!(csms.correlator().stats().resolved, 3);
    overlay.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn observer_failures_do_not_disturb_the_exchange() {
    let overlay = Overlay::station_relay_csms().unwrap();
    let csms = overlay.node(CSMS).unwrap();
    answer_resets(&overlay.node(STATION).unwrap(), ResetStatus::Scheduled);

    let slot = csms.action::<ResetRequest>().unwrap();
    let healthy = Arc::new(AtomicUsize::new(0));
    slot.events().on_request().subscribe("panics", |_| panic!("observer bug"));
    let counter = Arc::clone(&healthy);
    slot.events().on_request().subscribe("healthy", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    slot.events()
        .on_response()
        .subscribe("errors", |_| Err(anyhow::anyhow!("metrics sink offline")));
    let counter = Arc::clone(&healthy);
    slot.events().on_response().subscribe("healthy", move |exchange| {
        assert!(exchange.outcome.is_ok());
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let response = csms
        .send(reset_to(STATION, &csms), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(*response.status(), ResetStatus::Scheduled);
    assert_eq!(healthy.load(Ordering::SeqCst), 2);
    assert_eq!(slot.events().on_request().failure_count(), 1);
    assert_eq!(slot.events().on_response().failure_count(), 1);
    overlay.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn relay_requires_valid_signatures_on_json_requests() {
    let mut overlay = Overlay::new();
    overlay.add(CSMS, |b| Ok(b.default_route(id(RELAY)?))).unwrap();
    overlay
        .add(RELAY, |b| {
            let verifier = KeyedDigestVerifier::new()
                .with_key("csms-key", b"shared-secret".to_vec())
                .requiring_signature();
            Ok(b.forwarding(ForwardingConfig::default())
                .signature_policy(SignaturePolicy::new(Arc::new(verifier)))
                .route(id(STATION)?, id(STATION)?)
                .default_route(id(CSMS)?))
        })
        .unwrap();
    overlay.add(STATION, |b| Ok(b.default_route(id(RELAY)?))).unwrap();
    overlay.link(CSMS, RELAY).unwrap();
    overlay.link(RELAY, STATION).unwrap();
    let csms = overlay.node(CSMS).unwrap();
    answer_resets(&overlay.node(STATION).unwrap(), ResetStatus::Accepted);

    let unsigned = csms
        .send(reset_to(STATION, &csms), &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(unsigned.result(), ResponseResult::SignatureError { .. }));

    let signer = KeyedDigestSigner::new("csms-key", b"shared-secret".to_vec());
    let signed = sign_request(reset_to(STATION, &csms), &signer).unwrap();
    let accepted = csms.send(signed, &CancellationToken::new()).await.unwrap();
    assert!(accepted.result().is_ok());
    assert_eq!(*accepted.status(), ResetStatus::Accepted);
    overlay.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn staged_request_finishes_and_is_swept() {
    let overlay = Overlay::station_relay_csms().unwrap();
    let csms_node = overlay.node(CSMS).unwrap();
    let station_node = overlay.node(STATION).unwrap();
    let book = TransactionBook::default();
    book.block("TAG-BLOCKED");
    csms::install(&csms_node, book).unwrap();
    let connectors = station::install(&station_node, FileStore::default()).unwrap();

    let request = ocpp_codec::messages::RemoteStartTransactionRequest::new(
        SourceRouting::to(node(STATION)),
        "TAG-BLOCKED",
        Some(ConnectorId::new(2)),
        csms_node.request_options(),
    )
    .unwrap();
    let response = csms_node.send(request, &CancellationToken::new()).await.unwrap();
    assert!(response.result().is_ok());

    let outbox = Arc::clone(station_node.outbox());
    let finished = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let entries = outbox.snapshot();
            if entries.len() == 1 && entries[0].status == EnqueuedStatus::Finished {
                break entries[0].clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(finished.action, "StartTransaction");

    // Blocked idTag: the callback ran but recorded nothing
    assert_eq!(
        wait_for_transaction(&connectors, ConnectorId::new(2), Duration::from_millis(50)).await,
        None
    );
    station_node.sweep();
    assert!(station_node.outbox().is_empty());
    overlay.shutdown().await;
}
