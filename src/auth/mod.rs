//! Authentication module
//!
//! The token-verification pipeline: key discovery and caching (`keys`),
//! token validation (`validator`), and the request-facing gate (`gate`).
//!
//! Data flows one direction: raw bearer token -> [`AuthGate`] ->
//! [`TokenValidator`] -> [`keys::KeyProvider`] on demand -> verified claims
//! or a typed failure, returned up the chain.

use jsonwebtoken::Algorithm;
use thiserror::Error;

pub mod gate;
pub mod keys;
pub mod validator;

pub use gate::AuthGate;
pub use keys::{HttpKeyFetcher, KeyFetcher, KeyProvider};
pub use validator::TokenValidator;

/// Authentication errors
///
/// Every failure in the pipeline maps to exactly one of these kinds. All are
/// terminal for the current request; nothing here is retried automatically.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing credential")]
    MissingCredential,

    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Disallowed algorithm: {0}")]
    DisallowedAlgorithm(String),

    #[error("Key fetch failed: {0}")]
    KeyFetchFailed(String),

    #[error("Unknown signing key: {0}")]
    UnknownSigningKey(String),

    #[error("Invalid signature")]
    BadSignature,

    #[error("Claim rejected: {0}")]
    ClaimRejected(String),
}

impl AuthError {
    /// Stable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing_credential",
            AuthError::Malformed(_) => "malformed",
            AuthError::DisallowedAlgorithm(_) => "disallowed_algorithm",
            AuthError::KeyFetchFailed(_) => "key_fetch_failed",
            AuthError::UnknownSigningKey(_) => "unknown_signing_key",
            AuthError::BadSignature => "bad_signature",
            AuthError::ClaimRejected(_) => "claim_rejected",
        }
    }
}

/// Claims of a successfully validated token.
///
/// Produced only by [`TokenValidator::validate`] after signature verification
/// succeeds. Request-scoped; never cached or persisted.
#[derive(Debug, Clone)]
pub struct VerifiedClaims {
    subject: String,
    claims: serde_json::Map<String, serde_json::Value>,
}

impl VerifiedClaims {
    pub(crate) fn new(
        subject: String,
        claims: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self { subject, claims }
    }

    /// The authenticated subject (`sub` claim).
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Look up an arbitrary claim by name.
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.claims.get(name)
    }
}

/// Outcome of authenticating one request. Terminal; never retried.
#[derive(Debug)]
pub enum AuthDecision {
    Authenticated(VerifiedClaims),
    Rejected(AuthError),
}

/// Parse an algorithm name from configuration or a JWK.
///
/// Only asymmetric algorithms are recognized; symmetric (HS*) names return
/// `None` so a shared-secret token can never pass the allow-list.
pub fn parse_algorithm(name: &str) -> Option<Algorithm> {
    match name {
        "RS256" => Some(Algorithm::RS256),
        "RS384" => Some(Algorithm::RS384),
        "RS512" => Some(Algorithm::RS512),
        "ES256" => Some(Algorithm::ES256),
        "ES384" => Some(Algorithm::ES384),
        _ => None,
    }
}
