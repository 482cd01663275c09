//! # OCPP Node Configuration
//!
//! Configuration for one OCPP node (charging station, networking node or
//! CSMS): identity, exchange defaults, relay settings and logging.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ocpp_config::NodeConfig;
//! use std::path::Path;
//!
//! let config = NodeConfig::load(Some(Path::new("config/node.toml"))).unwrap();
//! let local = config.node_id().unwrap();
//! println!("{} times out after {:?}", local, config.request_timeout());
//! ```

pub mod node_config;

pub use node_config::{
    ExchangeSettings, ForwardingSettings, LoggingSettings, NodeConfig, NodeRole, NodeSettings,
    ENV_PREFIX, MAX_HOPS_LIMIT,
};
