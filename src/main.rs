//! hello-host: a greeting service with pluggable message inspection
//!
//! Exposes a single `Hello` operation over a line-based TCP protocol.
//!
//! Features:
//! - One dispatcher per listen address, each serving the HelloWorld contract
//! - Behavior extensions enabled by name at startup
//! - `message-logger` behavior that dumps every request and reply
//! - Configuration via CLI arguments or TOML file

mod behavior;
mod config;
mod host;
mod inspector;
mod message;
mod protocol;
mod service;

use std::sync::Arc;

use behavior::{BehaviorContext, BehaviorRegistry};
use config::Config;
use host::ServiceHost;
use service::Greeter;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = ?config.listen,
        max_connections = config.max_connections,
        behaviors = ?config.behaviors,
        message_sink = ?config.message_sink,
        "Starting hello-host"
    );

    let mut host = ServiceHost::new(Arc::new(Greeter), &config);
    let context = BehaviorContext {
        message_sink: config.message_sink,
    };
    host.configure(&BehaviorRegistry::with_builtins(), &config.behaviors, &context)?;

    host.bind()?.serve(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
