//! JWKS key discovery and caching
//!
//! Fetches the identity provider's published key set and serves signing keys
//! by key ID. Keys rotate infrequently, so lookups hit an in-memory cache and
//! a miss triggers exactly one authoritative refresh before the key is
//! declared unknown.

use super::AuthError;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// A single JSON Web Key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (e.g., "RSA", "EC")
    pub kty: String,

    /// Key ID
    #[serde(default)]
    pub kid: Option<String>,

    /// Intended use ("sig" for signature)
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// Algorithm (e.g., "RS256", "ES256")
    #[serde(default)]
    pub alg: Option<String>,

    // RSA parameters
    /// RSA modulus (base64url encoded)
    #[serde(default)]
    pub n: Option<String>,

    /// RSA exponent (base64url encoded)
    #[serde(default)]
    pub e: Option<String>,

    // EC parameters
    /// EC curve (e.g., "P-256")
    #[serde(default)]
    pub crv: Option<String>,

    /// EC x coordinate (base64url encoded)
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url encoded)
    #[serde(default)]
    pub y: Option<String>,
}

impl Jwk {
    /// Convert JWK to DecodingKey
    pub fn to_decoding_key(&self) -> Result<DecodingKey, AuthError> {
        match self.kty.as_str() {
            "RSA" => {
                let n = self
                    .n
                    .as_ref()
                    .ok_or_else(|| AuthError::KeyFetchFailed("Missing RSA modulus (n)".into()))?;
                let e = self
                    .e
                    .as_ref()
                    .ok_or_else(|| AuthError::KeyFetchFailed("Missing RSA exponent (e)".into()))?;

                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| AuthError::KeyFetchFailed(format!("Invalid RSA key: {}", e)))
            }
            "EC" => {
                let x = self
                    .x
                    .as_ref()
                    .ok_or_else(|| AuthError::KeyFetchFailed("Missing EC x coordinate".into()))?;
                let y = self
                    .y
                    .as_ref()
                    .ok_or_else(|| AuthError::KeyFetchFailed("Missing EC y coordinate".into()))?;

                // from_ec_components expects base64url-encoded strings directly
                DecodingKey::from_ec_components(x, y)
                    .map_err(|e| AuthError::KeyFetchFailed(format!("Invalid EC key: {}", e)))
            }
            other => Err(AuthError::KeyFetchFailed(format!(
                "Unsupported key type: {}",
                other
            ))),
        }
    }

    /// Get the algorithm declared for this key
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.alg.as_deref().and_then(super::parse_algorithm)
    }
}

/// JSON Web Key Set as published by the identity provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// A signing key ready for signature verification.
///
/// Immutable once built from a fetched JWK; owned by the provider's cache
/// and handed out by shared reference.
pub struct SigningKey {
    kid: String,
    algorithm: Option<Algorithm>,
    decoding_key: DecodingKey,
}

impl SigningKey {
    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

/// The current set of signing keys, keyed by key ID.
///
/// Replaced wholesale on refresh; readers always observe either the old or
/// the new complete set.
struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,
    fetched_at: Instant,
}

impl KeySet {
    fn empty() -> Self {
        Self {
            keys: HashMap::new(),
            fetched_at: Instant::now(),
        }
    }

    fn from_jwks(jwks: Jwks) -> Result<Self, AuthError> {
        let mut keys = HashMap::with_capacity(jwks.keys.len());
        for jwk in &jwks.keys {
            let kid = jwk
                .kid
                .clone()
                .ok_or_else(|| AuthError::KeyFetchFailed("Key missing kid".into()))?;
            let decoding_key = jwk.to_decoding_key()?;
            keys.insert(
                kid.clone(),
                Arc::new(SigningKey {
                    kid,
                    algorithm: jwk.algorithm(),
                    decoding_key,
                }),
            );
        }
        Ok(Self {
            keys,
            fetched_at: Instant::now(),
        })
    }

    fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// Capability to fetch the provider's published key set.
///
/// Abstracted so tests can substitute a fixed key set without a live
/// network call.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    async fn fetch(&self) -> Result<Jwks, AuthError>;
}

/// Fetches the JWKS document over HTTPS with a bounded timeout.
pub struct HttpKeyFetcher {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpKeyFetcher {
    /// Create a fetcher for the given key-discovery endpoint.
    ///
    /// Every fetch is bounded by `timeout`; exceeding it is a fetch failure,
    /// not an indefinite hang.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::KeyFetchFailed(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
        })
    }
}

#[async_trait]
impl KeyFetcher for HttpKeyFetcher {
    async fn fetch(&self) -> Result<Jwks, AuthError> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| AuthError::KeyFetchFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::KeyFetchFailed(format!(
                "HTTP {}: {}",
                response.status(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| AuthError::KeyFetchFailed(e.to_string()))?;

        Ok(jwks)
    }
}

/// Supplies signing keys by key ID, caching the provider's key set.
///
/// The cache starts empty and is replaced wholesale on every refresh.
/// Concurrent misses collapse into one in-flight fetch.
pub struct KeyProvider {
    fetcher: Arc<dyn KeyFetcher>,
    current: Arc<RwLock<Arc<KeySet>>>,
    refresh_lock: Mutex<()>,
}

impl KeyProvider {
    /// Create a provider with an empty cache.
    pub fn new(fetcher: Arc<dyn KeyFetcher>) -> Self {
        Self {
            fetcher,
            current: Arc::new(RwLock::new(Arc::new(KeySet::empty()))),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Resolve the signing key for `kid`.
    ///
    /// Cache hit returns immediately. A miss triggers exactly one refresh of
    /// the key set and one retry of the lookup; a key still absent after that
    /// is a genuine absence, not retried further within this call.
    pub async fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, AuthError> {
        let snapshot = self.current.read().await.clone();
        if let Some(key) = snapshot.keys.get(kid) {
            crate::metrics::record_key_cache_hit();
            debug!(key_id = %kid, age_secs = snapshot.age().as_secs(), "key cache hit");
            return Ok(key.clone());
        }

        crate::metrics::record_key_cache_miss();
        debug!(key_id = %kid, "key cache miss, refreshing key set");
        self.refresh(snapshot).await?;

        self.lookup(kid)
            .await
            .ok_or_else(|| AuthError::UnknownSigningKey(kid.to_string()))
    }

    /// True if the cache currently holds at least one key.
    pub async fn has_keys(&self) -> bool {
        !self.current.read().await.keys.is_empty()
    }

    async fn lookup(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.current.read().await.keys.get(kid).cloned()
    }

    /// Fetch the key set and publish it atomically.
    ///
    /// `seen` is the set the caller's lookup missed in. The lock collapses
    /// concurrent misses into one fetch: waiters whose miss predates the
    /// newly published set return without fetching. The fetch itself runs on
    /// a detached task so a cancelled caller still populates the cache for
    /// later requests.
    async fn refresh(&self, seen: Arc<KeySet>) -> Result<(), AuthError> {
        let _guard = self.refresh_lock.lock().await;
        {
            let current = self.current.read().await;
            if !Arc::ptr_eq(&*current, &seen) {
                return Ok(());
            }
        }

        let fetcher = self.fetcher.clone();
        let slot = self.current.clone();
        let task = tokio::spawn(async move {
            let jwks = fetcher.fetch().await?;
            let set = Arc::new(KeySet::from_jwks(jwks)?);
            debug!(keys = set.keys.len(), "published new key set");
            *slot.write().await = set;
            Ok::<(), AuthError>(())
        });

        let result = task
            .await
            .map_err(|e| AuthError::KeyFetchFailed(e.to_string()))
            .and_then(|r| r);

        crate::metrics::record_key_fetch(result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MODULUS: &str = "octcYVqeBhLSCJgcZgt0fPr7weHjvTBZapJWhqNgs6iD8wQHWE6pMJc1mtx7brZAzQetDouGYZki3FC0k3TNY74-yvWvTMqEaC2qEpg_oF9KZnFuec_yT3X_3npQQL4dD6fFoqfcRbmm1vma1oBjw0I6X5VwWe_KRb5Ct0EAbN-uIqV_egYKNY2wYgackQWq8-jxI4f8ZX-ThJynbSk2_OUzyfkHkzyWt6Cb5K0jKGq7VH_Enop136_S8vnM8Cl9xi6jwxcbBJG18xqNq6W6avrD1whemKDb5w5Z6QjSDfXq1nZVSdqVzsRaKPzlkPgO3SPCVRjVriZ4fjKV2QOwqw";

    fn test_jwk(kid: &str) -> Jwk {
        Jwk {
            kty: "RSA".to_string(),
            kid: Some(kid.to_string()),
            key_use: Some("sig".to_string()),
            alg: Some("RS256".to_string()),
            n: Some(TEST_MODULUS.to_string()),
            e: Some("AQAB".to_string()),
            crv: None,
            x: None,
            y: None,
        }
    }

    #[test]
    fn test_parse_jwks() {
        let json = format!(
            r#"{{"keys": [{{"kty": "RSA", "kid": "key-1", "use": "sig",
                "alg": "RS256", "n": "{}", "e": "AQAB"}}]}}"#,
            TEST_MODULUS
        );

        let jwks: Jwks = serde_json::from_str(&json).unwrap();
        assert_eq!(jwks.keys.len(), 1);
        assert_eq!(jwks.keys[0].kid, Some("key-1".to_string()));
    }

    #[test]
    fn test_jwk_to_decoding_key() {
        assert!(test_jwk("key-1").to_decoding_key().is_ok());
    }

    #[test]
    fn test_jwk_missing_modulus_rejected() {
        let mut jwk = test_jwk("key-1");
        jwk.n = None;
        let result = jwk.to_decoding_key();
        assert!(matches!(result, Err(AuthError::KeyFetchFailed(_))));
    }

    #[test]
    fn test_jwk_unsupported_key_type_rejected() {
        let mut jwk = test_jwk("key-1");
        jwk.kty = "OKP".into();
        let result = jwk.to_decoding_key();
        assert!(matches!(result, Err(AuthError::KeyFetchFailed(_))));
    }

    #[test]
    fn test_key_set_requires_kid() {
        let mut jwk = test_jwk("key-1");
        jwk.kid = None;
        let result = KeySet::from_jwks(Jwks { keys: vec![jwk] });
        assert!(matches!(result, Err(AuthError::KeyFetchFailed(_))));
    }

    #[test]
    fn test_key_set_lookup_by_kid() {
        let set = KeySet::from_jwks(Jwks {
            keys: vec![test_jwk("key-1"), test_jwk("key-2")],
        })
        .unwrap();

        assert!(set.keys.contains_key("key-1"));
        assert!(set.keys.contains_key("key-2"));
        assert!(!set.keys.contains_key("key-3"));
        assert!(set.age() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_provider_starts_empty() {
        struct NeverFetcher;

        #[async_trait]
        impl KeyFetcher for NeverFetcher {
            async fn fetch(&self) -> Result<Jwks, AuthError> {
                Err(AuthError::KeyFetchFailed("unreachable".into()))
            }
        }

        let provider = KeyProvider::new(Arc::new(NeverFetcher));
        assert!(!provider.has_keys().await);

        let result = provider.resolve("key-1").await;
        assert!(matches!(result, Err(AuthError::KeyFetchFailed(_))));
    }
}
