//! End-to-End Test Framework for the OCPP overlay
//!
//! Runs charging station, networking node and CSMS façades on one
//! in-memory network and validates complete exchanges through the relay.

pub mod framework;
pub mod scenarios;

pub use framework::{run_scenario, Check, Overlay, Probe, TestResult, TestScenario};
