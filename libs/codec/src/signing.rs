//! # Signing Seams
//!
//! The engine does not implement a signature scheme of its own; it defines
//! where one plugs in. A [`MessageSigner`] produces a [`Signature`] over the
//! canonical bytes of a message, a [`SignatureVerifier`] checks them.
//!
//! Canonical bytes are the message's JSON payload with the `signatures`
//! member removed and keys in sorted order, so they are identical whether
//! computed by the sender, a relay holding only the raw JSON, or the
//! receiver after typed decoding.
//!
//! [`KeyedDigestSigner`] / [`KeyedDigestVerifier`] provide a shared-secret
//! SHA3-256 scheme used by the demo node and tests.

use crate::error::{ProtocolError, ProtocolResult};
use crate::hooks::CodecHooks;
use crate::message::{OcppRequest, OcppResponse};
use crate::payload::{request_to_json, response_to_json};
use ocpp_types::Signature;
use serde_json::Value;
use sha3::{Digest, Sha3_256};
use std::collections::HashMap;

/// Algorithm name emitted by [`KeyedDigestSigner`]
pub const KEYED_SHA3_256: &str = "SHA3-256-KEYED";

/// Result of checking a message's signatures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Valid,
    Invalid { description: String },
}

impl VerificationOutcome {
    pub fn invalid(description: impl Into<String>) -> Self {
        Self::Invalid {
            description: description.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Produces signatures over canonical message bytes
pub trait MessageSigner: Send + Sync {
    fn sign(&self, action: &str, canonical: &[u8]) -> ProtocolResult<Signature>;
}

/// Checks signatures over canonical message bytes
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, action: &str, canonical: &[u8], signatures: &[Signature]) -> VerificationOutcome;
}

/// Canonical bytes of a JSON payload
pub fn canonical_bytes(payload: &Value) -> ProtocolResult<Vec<u8>> {
    let mut stripped = payload.clone();
    if let Value::Object(map) = &mut stripped {
        map.remove("signatures");
    }
    Ok(serde_json::to_vec(&stripped)?)
}

pub fn canonical_request_bytes<R: OcppRequest>(request: &R) -> ProtocolResult<Vec<u8>> {
    canonical_bytes(&request_to_json(request, &CodecHooks::none()))
}

pub fn canonical_response_bytes<P: OcppResponse>(response: &P) -> ProtocolResult<Vec<u8>> {
    canonical_bytes(&response_to_json(response, &CodecHooks::none()))
}

/// Attach a signature, returning the new immutable request
pub fn sign_request<R: OcppRequest>(request: R, signer: &dyn MessageSigner) -> ProtocolResult<R> {
    let canonical = canonical_request_bytes(&request)?;
    let signature = signer.sign(R::action(), &canonical)?;
    let envelope = request.envelope().with_signature(signature);
    Ok(request.with_envelope(envelope))
}

pub fn sign_response<P: OcppResponse>(response: P, signer: &dyn MessageSigner) -> ProtocolResult<P> {
    let canonical = canonical_response_bytes(&response)?;
    let signature = signer.sign(P::action(), &canonical)?;
    let envelope = response.envelope().with_signature(signature);
    Ok(response.with_envelope(envelope))
}

pub fn verify_request<R: OcppRequest>(request: &R, verifier: &dyn SignatureVerifier) -> VerificationOutcome {
    match canonical_request_bytes(request) {
        Ok(canonical) => verifier.verify(R::action(), &canonical, request.envelope().signatures()),
        Err(e) => VerificationOutcome::invalid(e.to_string()),
    }
}

pub fn verify_response<P: OcppResponse>(response: &P, verifier: &dyn SignatureVerifier) -> VerificationOutcome {
    match canonical_response_bytes(response) {
        Ok(canonical) => verifier.verify(P::action(), &canonical, response.envelope().signatures()),
        Err(e) => VerificationOutcome::invalid(e.to_string()),
    }
}

/// Remove all signatures from a request
pub fn strip_request_signatures<R: OcppRequest>(request: R) -> R {
    let envelope = request.envelope().without_signatures();
    request.with_envelope(envelope)
}

pub fn strip_response_signatures<P: OcppResponse>(response: P) -> P {
    let envelope = response.envelope().without_signatures();
    response.with_envelope(envelope)
}

fn keyed_digest(secret: &[u8], action: &str, canonical: &[u8]) -> Vec<u8> {
    let mut hasher = Sha3_256::new();
    hasher.update(secret);
    hasher.update(action.as_bytes());
    hasher.update(canonical);
    hasher.finalize().to_vec()
}

/// Shared-secret SHA3-256 signer
pub struct KeyedDigestSigner {
    key_id: String,
    secret: Vec<u8>,
}

impl KeyedDigestSigner {
    pub fn new(key_id: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            key_id: key_id.into(),
            secret: secret.into(),
        }
    }
}

impl MessageSigner for KeyedDigestSigner {
    fn sign(&self, action: &str, canonical: &[u8]) -> ProtocolResult<Signature> {
        Signature::new(
            self.key_id.clone(),
            KEYED_SHA3_256,
            keyed_digest(&self.secret, action, canonical),
        )
        .map_err(|e| ProtocolError::Signing(e.to_string()))
    }
}

/// Verifier for [`KeyedDigestSigner`] signatures
#[derive(Default)]
pub struct KeyedDigestVerifier {
    keys: HashMap<String, Vec<u8>>,
    require_signature: bool,
}

impl KeyedDigestVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key_id: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        self.keys.insert(key_id.into(), secret.into());
        self
    }

    /// Treat unsigned messages as invalid
    pub fn requiring_signature(mut self) -> Self {
        self.require_signature = true;
        self
    }
}

impl SignatureVerifier for KeyedDigestVerifier {
    fn verify(&self, action: &str, canonical: &[u8], signatures: &[Signature]) -> VerificationOutcome {
        if signatures.is_empty() {
            return if self.require_signature {
                VerificationOutcome::invalid(format!("{} requires a signature", action))
            } else {
                VerificationOutcome::Valid
            };
        }
        for signature in signatures {
            if signature.algorithm() != KEYED_SHA3_256 {
                return VerificationOutcome::invalid(format!(
                    "unsupported signature algorithm '{}'",
                    signature.algorithm()
                ));
            }
            let Some(secret) = self.keys.get(signature.key_id()) else {
                return VerificationOutcome::invalid(format!(
                    "unknown signing key '{}'",
                    signature.key_id()
                ));
            };
            if keyed_digest(secret, action, canonical) != signature.value() {
                return VerificationOutcome::invalid(format!(
                    "signature by '{}' does not match the message",
                    signature.key_id()
                ));
            }
        }
        VerificationOutcome::Valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_bytes_ignore_signatures_and_key_order() {
        let a = json!({"b": 1, "a": 2, "signatures": [{"keyId": "k"}]});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonical_bytes(&a).unwrap(), canonical_bytes(&b).unwrap());
    }

    #[test]
    fn keyed_digest_round_trip() {
        let signer = KeyedDigestSigner::new("cs-key", b"secret".to_vec());
        let verifier = KeyedDigestVerifier::new().with_key("cs-key", b"secret".to_vec());
        let canonical = canonical_bytes(&json!({"fileName": "/a"})).unwrap();

        let signature = signer.sign("GetFile", &canonical).unwrap();
        assert!(verifier.verify("GetFile", &canonical, &[signature.clone()]).is_valid());

        let tampered = canonical_bytes(&json!({"fileName": "/b"})).unwrap();
        assert!(!verifier.verify("GetFile", &tampered, &[signature]).is_valid());
    }

    #[test]
    fn missing_signature_only_fails_when_required() {
        let lenient = KeyedDigestVerifier::new();
        assert!(lenient.verify("Reset", b"{}", &[]).is_valid());
        let strict = KeyedDigestVerifier::new().requiring_signature();
        assert_eq!(
            strict.verify("Reset", b"{}", &[]),
            VerificationOutcome::invalid("Reset requires a signature")
        );
    }
}
