//! Demo overlay: CSMS ↔ networking node ↔ charging station
//!
//! Usage:
//!   ocpp-node
//!   ocpp-node --config config/node.toml --log-level debug
//!
//! The configured node id names the station; its exchange settings apply
//! to all three nodes and its forwarding settings to the relay.

use anyhow::{Context, Result};
use clap::Parser;
use ocpp_codec::messages::{GetFileRequest, RemoteStartTransactionRequest};
use ocpp_codec::{OcppResponse, SerializationFormat, SourceRouting};
use ocpp_config::{ForwardingSettings, NodeConfig, NodeRole};
use ocpp_network::{MemoryNetwork, Transport};
use ocpp_node::csms::TransactionBook;
use ocpp_node::station::FileStore;
use ocpp_node::{csms, station, NetworkingNode, NodeBuilder};
use ocpp_types::{ConnectorId, NetworkingNodeId};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ocpp-node")]
#[command(about = "OCPP overlay demo: remote start through a networking node")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = NodeConfig::load(args.config.as_deref())?;
    init_logging(&args, &config)?;

    info!(station = %config.node.id, "Starting OCPP overlay demo");
    run_demo(&config).await
}

fn init_logging(args: &Args, config: &NodeConfig) -> Result<()> {
    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log level")?;

    let registry = tracing_subscriber::registry().with(filter);
    if args.json_logs || config.logging.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
    Ok(())
}

struct Participant {
    node: Arc<NetworkingNode>,
    tasks: ocpp_node::NodeTasks,
}

fn node_config(base: &NodeConfig, id: &str, role: NodeRole, forwarding: ForwardingSettings) -> NodeConfig {
    let mut config = base.clone();
    config.node.id = id.to_string();
    config.node.role = role;
    config.forwarding = forwarding;
    config
}

async fn run_demo(base: &NodeConfig) -> Result<()> {
    let station_id = base.node_id()?;
    let relay_id = NetworkingNodeId::new("nn-1")?;
    let csms_id = NetworkingNodeId::new("csms")?;

    let network = MemoryNetwork::new();
    network.link(&csms_id, &relay_id);
    network.link(&relay_id, &station_id);

    let mut relay_forwarding = base.forwarding.clone();
    relay_forwarding.enabled = true;
    relay_forwarding
        .routes
        .insert(station_id.to_string(), station_id.to_string());
    relay_forwarding.default_route = Some(csms_id.to_string());

    let upstream = ForwardingSettings {
        default_route: Some(relay_id.to_string()),
        ..ForwardingSettings::default()
    };

    let csms = attach(
        &network,
        &node_config(base, csms_id.as_str(), NodeRole::Csms, upstream.clone()),
    )?;
    let relay = attach(
        &network,
        &node_config(base, relay_id.as_str(), NodeRole::NetworkingNode, relay_forwarding),
    )?;
    let station = attach(
        &network,
        &node_config(base, station_id.as_str(), NodeRole::ChargingStation, upstream),
    )?;

    csms::install(&csms.node, TransactionBook::default())?;
    let connectors = station::install(
        &station.node,
        FileStore::default().with_file("diagnostics.log", b"connector 1 ok\n".to_vec()),
    )?;

    let cancel = CancellationToken::new();
    let remote_start = RemoteStartTransactionRequest::new(
        SourceRouting::to(station_id.clone()),
        "TAG-0001",
        Some(ConnectorId::new(1)),
        csms.node.request_options(),
    )?;
    let response = csms.node.send(remote_start, &cancel).await?;
    info!(status = %response.status(), path = ?response.envelope().network_path(), "RemoteStartTransaction answered");

    let transaction = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(id) = connectors.transaction(ConnectorId::new(1)) {
                break id;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .context("StartTransaction was not confirmed in time")?;
    info!(%transaction, "Connector 1 is charging");

    let get_file = GetFileRequest::new(
        SourceRouting::to(station_id.clone()),
        "diagnostics.log",
        None,
        csms.node
            .request_options()
            .with_format(SerializationFormat::Binary),
    )?;
    let file = csms.node.send(get_file, &cancel).await?;
    info!(
        status = %file.status(),
        bytes = file.file_content().len(),
        "GetFile answered over the binary encoding"
    );

    if let Some(engine) = relay.node.forwarding() {
        info!(stats = ?engine.stats(), "Relay statistics");
    }
    info!(stats = ?csms.node.correlator().stats(), "CSMS correlator statistics");

    for participant in [csms, relay, station] {
        participant.node.shutdown();
        if tokio::time::timeout(Duration::from_secs(1), participant.tasks.join())
            .await
            .is_err()
        {
            warn!(node = %participant.node.id(), "Background tasks did not stop in time");
        }
    }
    Ok(())
}

fn attach(network: &Arc<MemoryNetwork>, config: &NodeConfig) -> Result<Participant> {
    let id = config.node_id()?;
    let (transport, inbox) = network.attach(id);
    let transport: Arc<dyn Transport> = transport;
    let node = NodeBuilder::from_config(config, transport)?.build()?;
    let tasks = node.start(inbox);
    Ok(Participant { node, tasks })
}
