//! Configuration module for Tokengate
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and comprehensive validation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
fn expand_env_vars(s: &str) -> String {
    // Regex to capture ${VAR} or ${VAR:-default}
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]+))?\}").unwrap();
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let full_match = cap.get(0).unwrap();
        let var_name = cap.get(1).unwrap().as_str();

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name) {
            Ok(val) => val,
            Err(_) => {
                if let Some(default) = cap.get(2) {
                    default.as_str().to_string()
                } else {
                    // No env var and no default. Keep the original placeholder.
                    full_match.as_str().to_string()
                }
            }
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);

    result
}

/// Custom deserializer for strings with environment variable expansion.
fn deserialize_with_env<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(expand_env_vars(&s))
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.address.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Server address cannot be empty".into(),
            ));
        }

        if self.auth.issuer.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Trusted issuer cannot be empty".into(),
            ));
        }

        if self.auth.audience.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Expected audience cannot be empty".into(),
            ));
        }

        if !is_valid_http_url(&self.auth.jwks_url) {
            return Err(ConfigError::ValidationError(
                "Invalid JWKS URL: must start with http:// or https://".into(),
            ));
        }

        if self.auth.algorithms.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one signature algorithm must be allowed".into(),
            ));
        }

        for alg in &self.auth.algorithms {
            if crate::auth::parse_algorithm(alg).is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "Unsupported signature algorithm '{}': only asymmetric \
                     algorithms (RS256, RS384, RS512, ES256, ES384) are allowed",
                    alg
                )));
            }
        }

        if self.auth.clock_skew_secs > MAX_CLOCK_SKEW_SECS {
            return Err(ConfigError::ValidationError(format!(
                "Clock skew {}s exceeds maximum of {}s",
                self.auth.clock_skew_secs, MAX_CLOCK_SKEW_SECS
            )));
        }

        if self.auth.fetch_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "Key fetch timeout must be at least 1 second".into(),
            ));
        }

        for origin in &self.cors.allowed_origins {
            if !is_valid_http_url(origin) {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid CORS origin '{}': must start with http:// or https://",
                    origin
                )));
            }
        }

        Ok(())
    }
}

/// Upper bound on configurable clock skew (5 minutes)
const MAX_CLOCK_SKEW_SECS: u64 = 300;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Trusted issuer URL. Tokens must carry exactly this `iss` value.
    #[serde(deserialize_with = "deserialize_with_env")]
    pub issuer: String,

    /// Expected audience. Tokens must include this `aud` value.
    #[serde(deserialize_with = "deserialize_with_env")]
    pub audience: String,

    /// Allowed signature algorithms. Asymmetric only.
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<String>,

    /// Key-discovery (JWKS) endpoint URL.
    #[serde(deserialize_with = "deserialize_with_env")]
    pub jwks_url: String,

    /// Tolerated clock skew for exp/nbf checks, in seconds.
    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: u64,

    /// Timeout for the JWKS network fetch, in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

fn default_algorithms() -> Vec<String> {
    vec!["RS256".to_string()]
}

fn default_clock_skew() -> u64 {
    30
}

fn default_fetch_timeout() -> u64 {
    10
}

/// Cross-origin resource sharing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed to call this service from a browser. Empty = CORS off.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            server: ServerConfig {
                address: "127.0.0.1:8000".into(),
            },
            auth: AuthConfig {
                issuer: "https://idp.example.com/".into(),
                audience: "my-api".into(),
                algorithms: default_algorithms(),
                jwks_url: "https://idp.example.com/.well-known/jwks.json".into(),
                clock_skew_secs: default_clock_skew(),
                fetch_timeout_secs: default_fetch_timeout(),
            },
            cors: CorsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_accepted() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_empty_issuer_rejected() {
        let mut config = test_config();
        config.auth.issuer = "".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_symmetric_algorithm_rejected() {
        let mut config = test_config();
        config.auth.algorithms = vec!["HS256".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let mut config = test_config();
        config.auth.algorithms = vec!["none".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_http_jwks_url_rejected() {
        let mut config = test_config();
        config.auth.jwks_url = "ftp://idp.example.com/jwks".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_excessive_clock_skew_rejected() {
        let mut config = test_config();
        config.auth.clock_skew_secs = 3600;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_cors_origin_rejected() {
        let mut config = test_config();
        config.cors.allowed_origins = vec!["localhost:5500".into()];
        assert!(config.validate().is_err());
    }
}
