//! Tokengate Library
//!
//! Bearer-token authentication gateway. Validates JWTs issued by an external
//! identity provider against its published JWKS and gates access to protected
//! HTTP endpoints.
//!
//! # Features
//!
//! - **Asymmetric Only**: RS256/RS384/RS512/ES256/ES384, no shared secrets
//! - **Key Rotation Aware**: cached JWKS with a single refresh on cache miss
//! - **Typed Failures**: every rejection carries a machine-readable kind
//! - **Uniform Rejections**: callers only ever see a generic 401 body
//!
//! # Example
//!
//! ```no_run
//! use tokengate::{config::Config, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let server = Server::new(config)?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod metrics;
pub mod router;
pub mod server;

// Re-export commonly used types
pub use auth::{AuthDecision, AuthError, VerifiedClaims};
pub use config::Config;
pub use server::Server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
