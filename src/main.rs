//! Tokengate - Bearer-token authentication gateway
//!
//! Validates JWTs against an identity provider's published JWKS and serves
//! public and protected HTTP endpoints.

use clap::Parser;
use std::path::PathBuf;
use tokengate::{config::Config, server::Server};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Tokengate - JWT authentication gateway
#[derive(Parser, Debug)]
#[command(name = "tokengate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Tokengate v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load(&args.config)?;
    info!("Loaded configuration from {:?}", args.config);
    info!("Trusted issuer: {}", config.auth.issuer);

    // Start server
    let server = Server::new(config)?;
    server.run().await?;

    Ok(())
}
