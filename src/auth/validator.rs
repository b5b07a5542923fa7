//! Token validation
//!
//! Decides whether a raw bearer token is a currently valid, correctly signed
//! assertion from the trusted issuer for this audience.
//!
//! Checks run in a strict order: structural parse and algorithm allow-list
//! use only the unverified header, the signing key is resolved by the header's
//! kid hint, and no claim is inspected until the signature has verified.

use super::keys::KeyProvider;
use super::{AuthError, VerifiedClaims};
use crate::config::{AuthConfig, ConfigError};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use std::sync::Arc;
use tracing::debug;

/// Validates bearer tokens against the configured issuer and audience.
pub struct TokenValidator {
    keys: Arc<KeyProvider>,
    issuer: String,
    audience: String,
    allowed: Vec<Algorithm>,
    leeway_secs: u64,
}

impl TokenValidator {
    /// Build a validator from the auth configuration.
    pub fn new(config: &AuthConfig, keys: Arc<KeyProvider>) -> Result<Self, ConfigError> {
        let allowed = config
            .algorithms
            .iter()
            .map(|name| {
                super::parse_algorithm(name).ok_or_else(|| {
                    ConfigError::ValidationError(format!(
                        "Unsupported signature algorithm '{}'",
                        name
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            keys,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            allowed,
            leeway_secs: config.clock_skew_secs,
        })
    }

    /// Validate a raw token and return its claims.
    ///
    /// The unverified header is trusted for nothing beyond the algorithm and
    /// key-ID hints.
    pub async fn validate(&self, raw_token: &str) -> Result<VerifiedClaims, AuthError> {
        // Structural parse of the header only.
        let header =
            decode_header(raw_token).map_err(|e| AuthError::Malformed(e.to_string()))?;

        // Allow-list check before any key fetch or signature work. Blocks
        // algorithm-substitution downgrades.
        if !self.allowed.contains(&header.alg) {
            return Err(AuthError::DisallowedAlgorithm(format!("{:?}", header.alg)));
        }

        let kid = header
            .kid
            .as_deref()
            .ok_or_else(|| AuthError::Malformed("Missing key id".into()))?;
        let key = self.keys.resolve(kid).await?;

        // The key's declared algorithm wins over the header's; a mismatch
        // fails the decode below.
        let algorithm = key.algorithm().unwrap_or(header.alg);

        let mut validation = Validation::new(algorithm);
        validation.leeway = self.leeway_secs;
        validation.validate_nbf = true;
        // set_required_spec_claims replaces the set, so it goes first;
        // set_issuer/set_audience add iss/aud to it.
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        // Signature first, claims after. decode verifies the signature before
        // it evaluates any claim, so claim values are never acted on unverified.
        let data = decode::<serde_json::Map<String, serde_json::Value>>(
            raw_token,
            key.decoding_key(),
            &validation,
        )
        .map_err(|e| map_decode_error(e.kind()))?;

        let subject = data
            .claims
            .get("sub")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AuthError::ClaimRejected("sub".into()))?
            .to_string();

        debug!(key_id = %kid, "token validated");

        Ok(VerifiedClaims::new(subject, data.claims))
    }
}

/// Map jsonwebtoken decode failures onto the error taxonomy.
///
/// The rejected claim name is retained for diagnostics only; it is never
/// echoed to untrusted callers.
fn map_decode_error(kind: &ErrorKind) -> AuthError {
    match kind {
        ErrorKind::InvalidSignature => AuthError::BadSignature,
        ErrorKind::ExpiredSignature => AuthError::ClaimRejected("exp".into()),
        ErrorKind::ImmatureSignature => AuthError::ClaimRejected("nbf".into()),
        ErrorKind::InvalidIssuer => AuthError::ClaimRejected("iss".into()),
        ErrorKind::InvalidAudience => AuthError::ClaimRejected("aud".into()),
        ErrorKind::MissingRequiredClaim(claim) => AuthError::ClaimRejected(claim.clone()),
        ErrorKind::InvalidAlgorithm => {
            AuthError::DisallowedAlgorithm("key/header algorithm mismatch".into())
        }
        other => AuthError::Malformed(format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_mapping() {
        assert!(matches!(
            map_decode_error(&ErrorKind::InvalidSignature),
            AuthError::BadSignature
        ));
        assert!(matches!(
            map_decode_error(&ErrorKind::ExpiredSignature),
            AuthError::ClaimRejected(ref c) if c == "exp"
        ));
        assert!(matches!(
            map_decode_error(&ErrorKind::InvalidIssuer),
            AuthError::ClaimRejected(ref c) if c == "iss"
        ));
        assert!(matches!(
            map_decode_error(&ErrorKind::InvalidAudience),
            AuthError::ClaimRejected(ref c) if c == "aud"
        ));
        assert!(matches!(
            map_decode_error(&ErrorKind::MissingRequiredClaim("sub".into())),
            AuthError::ClaimRejected(ref c) if c == "sub"
        ));
        assert!(matches!(
            map_decode_error(&ErrorKind::InvalidToken),
            AuthError::Malformed(_)
        ));
    }
}
