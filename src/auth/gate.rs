//! Request-facing authentication gate
//!
//! Bridges an inbound request to an [`AuthDecision`]: extracts the bearer
//! token from the Authorization header, runs it through the validator, and
//! yields either an authenticated principal or a typed rejection.

use super::validator::TokenValidator;
use super::{AuthDecision, AuthError};
use std::time::Instant;
use tracing::{debug, warn};

/// Scheme prefix expected on the Authorization header.
const BEARER_PREFIX: &str = "Bearer ";

/// Authenticates requests by validating their bearer token.
pub struct AuthGate {
    validator: TokenValidator,
}

impl AuthGate {
    pub fn new(validator: TokenValidator) -> Self {
        Self { validator }
    }

    /// Authenticate one request given its Authorization header, if any.
    ///
    /// An absent or malformed carrier is rejected without ever invoking the
    /// validator. The decision is terminal for this request.
    pub async fn authenticate(&self, authorization: Option<&str>) -> AuthDecision {
        let token = match extract_bearer(authorization) {
            Ok(token) => token,
            Err(err) => {
                debug!(kind = err.kind(), "no usable credential on request");
                crate::metrics::record_auth_rejection(err.kind());
                return AuthDecision::Rejected(err);
            }
        };

        let started = Instant::now();
        match self.validator.validate(token).await {
            Ok(claims) => {
                crate::metrics::record_auth_success(started.elapsed().as_secs_f64());
                debug!(subject = %claims.subject(), "request authenticated");
                AuthDecision::Authenticated(claims)
            }
            Err(err) => {
                crate::metrics::record_auth_rejection(err.kind());
                // Full detail stays in the logs; callers get a generic body.
                warn!(kind = err.kind(), error = %err, "token rejected");
                AuthDecision::Rejected(err)
            }
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
fn extract_bearer(authorization: Option<&str>) -> Result<&str, AuthError> {
    let value = authorization.ok_or(AuthError::MissingCredential)?;
    let token = value
        .strip_prefix(BEARER_PREFIX)
        .ok_or(AuthError::MissingCredential)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::MissingCredential);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(
            extract_bearer(Some("Bearer abc.def.ghi")).unwrap(),
            "abc.def.ghi"
        );
    }

    #[test]
    fn test_missing_header_rejected() {
        assert!(matches!(
            extract_bearer(None),
            Err(AuthError::MissingCredential)
        ));
    }

    #[test]
    fn test_wrong_scheme_rejected() {
        assert!(matches!(
            extract_bearer(Some("Basic dXNlcjpwYXNz")),
            Err(AuthError::MissingCredential)
        ));
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(matches!(
            extract_bearer(Some("Bearer ")),
            Err(AuthError::MissingCredential)
        ));
    }

    #[test]
    fn test_lowercase_scheme_rejected() {
        assert!(matches!(
            extract_bearer(Some("bearer abc")),
            Err(AuthError::MissingCredential)
        ));
    }
}
