//! Core E2E testing framework
//!
//! An [`Overlay`] is a set of started nodes on one in-memory network.
//! Scenarios receive a fresh overlay, drive traffic through it and return
//! the checks they made.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ocpp_network::{MemoryNetwork, MemoryTransport, Transport, TransportEnvelope};
use ocpp_node::{NetworkingNode, NodeBuilder, NodeTasks};
use ocpp_types::NetworkingNodeId;
use relay_core::ForwardingConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub const CSMS: &str = "csms";
pub const RELAY: &str = "nn-1";
pub const STATION: &str = "cs-1";

/// Validated node id for a literal name
pub fn id(name: &str) -> Result<NetworkingNodeId> {
    NetworkingNodeId::new(name).with_context(|| format!("invalid node id '{}'", name))
}

struct Member {
    node: Arc<NetworkingNode>,
    transport: Arc<MemoryTransport>,
    tasks: NodeTasks,
}

/// Bare endpoint that sends and receives raw envelopes
pub struct Probe {
    pub transport: Arc<MemoryTransport>,
    pub inbox: mpsc::Receiver<TransportEnvelope>,
}

impl Probe {
    /// Next delivery, or `None` when nothing arrives within `wait`
    pub async fn next(&mut self, wait: Duration) -> Option<TransportEnvelope> {
        tokio::time::timeout(wait, self.inbox.recv()).await.ok().flatten()
    }
}

/// Started nodes on one in-memory network
pub struct Overlay {
    network: Arc<MemoryNetwork>,
    members: HashMap<NetworkingNodeId, Member>,
}

impl Overlay {
    pub fn new() -> Self {
        Self {
            network: MemoryNetwork::new(),
            members: HashMap::new(),
        }
    }

    /// CS ↔ NN ↔ CSMS, with the relay forwarding in both directions
    pub fn station_relay_csms() -> Result<Self> {
        let mut overlay = Self::new();
        overlay.add(CSMS, |b| Ok(b.default_route(id(RELAY)?)))?;
        overlay.add(RELAY, |b| {
            Ok(b.forwarding(ForwardingConfig::default())
                .route(id(STATION)?, id(STATION)?)
                .default_route(id(CSMS)?))
        })?;
        overlay.add(STATION, |b| Ok(b.default_route(id(RELAY)?)))?;
        overlay.link(CSMS, RELAY)?;
        overlay.link(RELAY, STATION)?;
        Ok(overlay)
    }

    /// Build, attach and start a node
    pub fn add(
        &mut self,
        name: &str,
        configure: impl FnOnce(NodeBuilder) -> Result<NodeBuilder>,
    ) -> Result<Arc<NetworkingNode>> {
        let node_id = id(name)?;
        let (transport, inbox) = self.network.attach(node_id.clone());
        let shared: Arc<dyn Transport> = transport.clone();
        let node = configure(NodeBuilder::new(node_id.clone(), shared))?.build()?;
        let tasks = node.start(inbox);
        self.members.insert(
            node_id,
            Member {
                node: Arc::clone(&node),
                transport,
                tasks,
            },
        );
        Ok(node)
    }

    /// Attach a raw endpoint with no façade behind it
    pub fn probe(&self, name: &str) -> Result<Probe> {
        let (transport, inbox) = self.network.attach(id(name)?);
        Ok(Probe { transport, inbox })
    }

    pub fn link(&self, a: &str, b: &str) -> Result<()> {
        self.network.link(&id(a)?, &id(b)?);
        Ok(())
    }

    pub fn node(&self, name: &str) -> Result<Arc<NetworkingNode>> {
        self.member(name).map(|m| Arc::clone(&m.node))
    }

    pub fn transport(&self, name: &str) -> Result<Arc<MemoryTransport>> {
        self.member(name).map(|m| Arc::clone(&m.transport))
    }

    fn member(&self, name: &str) -> Result<&Member> {
        self.members
            .get(&id(name)?)
            .ok_or_else(|| anyhow!("node {} is not part of the overlay", name))
    }

    /// Stop every node and wait for its tasks
    pub async fn shutdown(self) {
        for (node_id, member) in self.members {
            member.node.shutdown();
            if tokio::time::timeout(Duration::from_secs(1), member.tasks.join())
                .await
                .is_err()
            {
                warn!(node = %node_id, "Node tasks did not stop in time");
            }
        }
    }
}

impl Default for Overlay {
    fn default() -> Self {
        Self::new()
    }
}

/// One named assertion made by a scenario
#[derive(Debug, Clone, Serialize)]
pub struct Check {
    pub name: String,
    pub passed: bool,
    pub message: String,
}

impl Check {
    pub fn that(name: impl Into<String>, passed: bool, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed,
            message: message.into(),
        }
    }

    pub fn equal<T: PartialEq + std::fmt::Debug>(name: impl Into<String>, actual: T, expected: T) -> Self {
        let passed = actual == expected;
        Self::that(name, passed, format!("expected {:?}, got {:?}", expected, actual))
    }
}

/// Test scenario trait
#[async_trait]
pub trait TestScenario: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    /// Overlay the scenario runs against
    fn topology(&self) -> Result<Overlay> {
        Overlay::station_relay_csms()
    }

    async fn execute(&self, overlay: &Overlay) -> Result<Vec<Check>>;
}

#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub scenario_name: String,
    pub success: bool,
    pub duration: Duration,
    pub error_message: Option<String>,
    pub checks: Vec<Check>,
}

/// Run a complete test scenario on a fresh overlay
pub async fn run_scenario(scenario: &dyn TestScenario) -> TestResult {
    info!("Starting test scenario: {}", scenario.name());
    info!("Description: {}", scenario.description());
    let start_time = Instant::now();

    let overlay = match scenario.topology() {
        Ok(overlay) => overlay,
        Err(e) => {
            error!("Setup failed: {:#}", e);
            return TestResult {
                scenario_name: scenario.name().to_string(),
                success: false,
                duration: start_time.elapsed(),
                error_message: Some(format!("Setup failed: {:#}", e)),
                checks: Vec::new(),
            };
        }
    };

    let outcome = tokio::time::timeout(scenario.timeout(), scenario.execute(&overlay)).await;
    overlay.shutdown().await;

    let (checks, error_message) = match outcome {
        Ok(Ok(checks)) => (checks, None),
        Ok(Err(e)) => {
            error!("Test execution failed: {:#}", e);
            (Vec::new(), Some(format!("Execution failed: {:#}", e)))
        }
        Err(_) => {
            error!("Test execution timed out");
            (Vec::new(), Some("Execution timed out".to_string()))
        }
    };

    let success = error_message.is_none() && checks.iter().all(|c| c.passed);
    for check in checks.iter().filter(|c| !c.passed) {
        warn!(scenario = scenario.name(), check = %check.name, message = %check.message, "Check failed");
    }
    TestResult {
        scenario_name: scenario.name().to_string(),
        success,
        duration: start_time.elapsed(),
        error_message,
        checks,
    }
}
