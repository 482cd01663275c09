//! # Forwarding Policies
//!
//! Pluggable checks that run after the built-in loop, hop-limit and
//! signature checks and before route lookup. The first filter returning a
//! verdict decides the message.

use crate::inbound::InboundCall;
use ocpp_codec::{canonical_bytes, SignatureVerifier, VerificationOutcome};
use ocpp_types::{ErrorCode, NetworkingNodeId, ResponseResult};
use std::sync::Arc;
use tracing::trace;

/// Outcome a filter imposes on a message
#[derive(Debug, Clone, PartialEq)]
pub enum FilterVerdict {
    /// Answer the sender with this failure
    Reject(ResponseResult),
    /// Discard silently; the text is only logged
    Drop(String),
}

/// Relay policy hook
pub trait ForwardingFilter: Send + Sync {
    /// `None` lets the message continue to the next check
    fn evaluate(&self, call: &InboundCall) -> Option<FilterVerdict>;

    /// Name used in decision log lines
    fn name(&self) -> &str;
}

/// Refuses one action, optionally only towards one destination
#[derive(Debug, Clone)]
pub struct DenyActionFilter {
    name: String,
    action: String,
    destination: Option<NetworkingNodeId>,
}

impl DenyActionFilter {
    pub fn new(action: impl Into<String>) -> Self {
        let action = action.into();
        Self {
            name: format!("deny-{}", action),
            action,
            destination: None,
        }
    }

    #[must_use]
    pub fn towards(mut self, destination: NetworkingNodeId) -> Self {
        self.name = format!("deny-{}-to-{}", self.action, destination);
        self.destination = Some(destination);
        self
    }
}

impl ForwardingFilter for DenyActionFilter {
    fn evaluate(&self, call: &InboundCall) -> Option<FilterVerdict> {
        if call.action() != self.action {
            return None;
        }
        if let Some(destination) = &self.destination {
            if !call.destination().is_for(destination) {
                return None;
            }
        }
        Some(FilterVerdict::Reject(ResponseResult::request_error(
            ErrorCode::SecurityError,
            format!("{} is not relayed to {}", call.action(), call.destination().final_destination()),
        )))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Signature check for relayed CALLs
///
/// JSON payloads are verified over their canonical bytes. Binary payloads
/// carry signatures in a trailer the relay does not parse and pass through
/// unchecked.
#[derive(Clone)]
pub struct SignaturePolicy {
    verifier: Arc<dyn SignatureVerifier>,
}

impl SignaturePolicy {
    pub fn new(verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self { verifier }
    }

    /// Failure to answer with, or `None` when the CALL may proceed
    pub fn check(&self, call: &InboundCall) -> Option<ResponseResult> {
        let Some(json) = call.payload().as_json() else {
            trace!(request_id = %call.request_id(), "Binary payload, relay signature check skipped");
            return None;
        };
        let signatures = match call.payload().json_signatures() {
            Ok(signatures) => signatures,
            Err(err) => return Some(ResponseResult::signature_error(err.to_string())),
        };
        let canonical = match canonical_bytes(json) {
            Ok(bytes) => bytes,
            Err(err) => return Some(ResponseResult::signature_error(err.to_string())),
        };
        match self.verifier.verify(call.action(), &canonical, &signatures) {
            VerificationOutcome::Valid => None,
            VerificationOutcome::Invalid { description } => {
                Some(ResponseResult::signature_error(description))
            }
        }
    }
}

impl std::fmt::Debug for SignaturePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignaturePolicy").finish_non_exhaustive()
    }
}
