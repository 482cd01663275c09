//! Node Configuration
//!
//! Loads a [`NodeConfig`] from an optional TOML file with `OCPP_`-prefixed
//! environment overrides, using `__` between nested keys:
//!
//! ```text
//! OCPP_NODE__ID=nn-07
//! OCPP_FORWARDING__ENABLED=true
//! OCPP_EXCHANGE__REQUEST_TIMEOUT_MS=5000
//! ```
//!
//! Every field has a default, so an empty file (or no file) is valid.

use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File, FileFormat};
use ocpp_types::{NetworkingNodeId, SerializationFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "OCPP";

/// Upper bound accepted for `forwarding.max_hops`
pub const MAX_HOPS_LIMIT: usize = 64;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Complete configuration of one node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node: NodeSettings,
    pub exchange: ExchangeSettings,
    pub forwarding: ForwardingSettings,
    pub logging: LoggingSettings,
}

/// Role a node plays in the topology
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    #[default]
    ChargingStation,
    NetworkingNode,
    Csms,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    pub id: String,
    pub role: NodeRole,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            id: "cs-001".to_string(),
            role: NodeRole::ChargingStation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    /// Timeout applied to requests that do not set one
    pub request_timeout_ms: u64,
    pub format: SerializationFormat,
    /// Period of the finished-request sweep
    pub sweep_interval_secs: u64,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            format: SerializationFormat::Json,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardingSettings {
    pub enabled: bool,
    pub max_hops: usize,
    pub duplicate_window_secs: u64,
    /// Actions this node relays; empty relays everything
    pub supported_actions: Vec<String>,
    pub require_signatures: bool,
    pub default_route: Option<String>,
    /// Destination → next hop
    pub routes: BTreeMap<String, String>,
}

impl Default for ForwardingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_hops: 8,
            duplicate_window_secs: 300,
            supported_actions: Vec::new(),
            require_signatures: false,
            default_route: None,
            routes: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl NodeConfig {
    /// Load from `path` (if any) plus environment overrides, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            info!("Loading node config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        Self::from_builder(builder)
    }

    /// Parse TOML text; environment overrides are not applied
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Self::from_builder(Config::builder().add_source(File::from_str(text, FileFormat::Toml)))
    }

    fn from_builder(builder: config_crate::ConfigBuilder<config_crate::builder::DefaultState>) -> Result<Self> {
        let config: NodeConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        debug!(node = %config.node.id, role = ?config.node.role, "Node config loaded");
        Ok(config)
    }

    /// Check identifiers and ranges
    pub fn validate(&self) -> Result<()> {
        let local = self.node_id()?;
        if self.exchange.request_timeout_ms == 0 {
            bail!("exchange.request_timeout_ms must be greater than zero");
        }
        if self.exchange.sweep_interval_secs == 0 {
            bail!("exchange.sweep_interval_secs must be greater than zero");
        }
        if self.forwarding.max_hops == 0 || self.forwarding.max_hops > MAX_HOPS_LIMIT {
            bail!(
                "forwarding.max_hops must be within 1..={}, got {}",
                MAX_HOPS_LIMIT,
                self.forwarding.max_hops
            );
        }
        for (destination, next_hop) in self.routes()? {
            if next_hop == local {
                bail!("forwarding route to {} points at the local node", destination);
            }
        }
        if let Some(default) = self.default_route()? {
            if default == local {
                bail!("forwarding.default_route points at the local node");
            }
        }
        let base_level = self.logging.level.split(',').next().unwrap_or_default();
        if !base_level.contains('=') && !LOG_LEVELS.contains(&base_level.to_ascii_lowercase().as_str()) {
            bail!("logging.level '{}' is not a log level", self.logging.level);
        }
        Ok(())
    }

    pub fn node_id(&self) -> Result<NetworkingNodeId> {
        NetworkingNodeId::new(&self.node.id).with_context(|| format!("node.id '{}' is invalid", self.node.id))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.exchange.request_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.exchange.sweep_interval_secs)
    }

    pub fn duplicate_window(&self) -> Duration {
        Duration::from_secs(self.forwarding.duplicate_window_secs)
    }

    /// Static routes as validated identifiers
    pub fn routes(&self) -> Result<Vec<(NetworkingNodeId, NetworkingNodeId)>> {
        self.forwarding
            .routes
            .iter()
            .map(|(destination, next_hop)| {
                let destination = NetworkingNodeId::new(destination)
                    .with_context(|| format!("route destination '{}' is invalid", destination))?;
                let next_hop = NetworkingNodeId::new(next_hop)
                    .with_context(|| format!("route next hop '{}' is invalid", next_hop))?;
                Ok((destination, next_hop))
            })
            .collect()
    }

    pub fn default_route(&self) -> Result<Option<NetworkingNodeId>> {
        self.forwarding
            .default_route
            .as_deref()
            .map(|hop| {
                NetworkingNodeId::new(hop).with_context(|| format!("default route '{}' is invalid", hop))
            })
            .transpose()
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}
