//! Node construction from configuration

use ocpp_codec::messages::{ResetRequest, ResetType};
use ocpp_codec::{OcppRequest, SerializationFormat, SourceRouting};
use ocpp_config::NodeConfig;
use ocpp_network::{MemoryNetwork, Transport};
use ocpp_node::{NodeBuilder, NodeError};
use ocpp_types::NetworkingNodeId;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn node(s: &str) -> NetworkingNodeId {
    NetworkingNodeId::new(s).unwrap()
}

const RELAY_TOML: &str = r#"
[node]
id = "nn-7"
role = "networking_node"

[exchange]
request_timeout_ms = 2500
format = "binary"

[forwarding]
enabled = true
max_hops = 4
supported_actions = ["Reset", "GetFile"]
default_route = "csms"

[forwarding.routes]
cs-1 = "cs-1"
"#;

#[test]
fn relay_config_builds_a_forwarding_node() {
    let config = NodeConfig::from_toml_str(RELAY_TOML).unwrap();
    let network = MemoryNetwork::new();
    let (transport, _inbox) = network.attach(node("nn-7"));
    let transport: Arc<dyn Transport> = transport;

    let relay = NodeBuilder::from_config(&config, transport).unwrap().build().unwrap();

    assert_eq!(relay.id(), &node("nn-7"));
    let engine = relay.forwarding().unwrap();
    assert_eq!(engine.config().max_hops, 4);
    assert!(engine.config().supported_actions.as_ref().unwrap().contains("GetFile"));
    assert_eq!(relay.routes().next_hop(&SourceRouting::to(node("cs-1"))), Some(node("cs-1")));
    assert_eq!(relay.routes().default_route(), Some(node("csms")));

    let options = relay.request_options();
    assert_eq!(options.request_timeout, Some(Duration::from_millis(2500)));
    assert_eq!(options.serialization_format, Some(SerializationFormat::Binary));
}

#[test]
fn default_config_is_a_plain_station() {
    let network = MemoryNetwork::new();
    let (transport, _inbox) = network.attach(node("cs-001"));
    let station = NodeBuilder::from_config(&NodeConfig::default(), transport)
        .unwrap()
        .build()
        .unwrap();
    assert!(station.forwarding().is_none());
    assert!(station.routes().is_empty());
}

#[test_log::test(tokio::test)]
async fn send_without_route_fails_before_touching_the_transport() {
    let network = MemoryNetwork::new();
    let (transport, _inbox) = network.attach(node("cs-1"));
    let station = NodeBuilder::new(node("cs-1"), transport.clone()).build().unwrap();

    let request = ResetRequest::new(
        SourceRouting::to(node("cs-2")),
        ResetType::Immediate,
        None,
        station.request_options(),
    );
    let err = station.send(request, &CancellationToken::new()).await.unwrap_err();

    assert_eq!(
        err,
        NodeError::NoRoute {
            local: node("cs-1"),
            destination: node("cs-2")
        }
    );
    assert_eq!(transport.sent_count(), 0);
    assert_eq!(station.correlator().stats().registered, 0);
    assert!(station.action::<ResetRequest>().unwrap().events().on_request().is_empty());
    assert_eq!(ResetRequest::action(), "Reset");
}
