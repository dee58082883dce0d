//! Panda server - gallery manager message server.
//!
//! Reads configuration from the environment, binds the listener and serves
//! clients until Ctrl-C.

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use panda_core::config::ServerConfig;
use panda_core::db::MemoryGalleries;
use panda_core::interface::Interface;
use panda_core::ipc::Server;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "panda_core=info,panda_server=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    tracing::info!("Starting panda server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_env().context("Invalid server configuration")?;
    match config.client_limit {
        Some(limit) => tracing::info!("Accepting at most {} concurrent clients", limit),
        None => tracing::info!("Accepting an unlimited number of clients"),
    }

    // The gallery store is provided by the data layer; start with an empty one.
    let server = Server::new(config, Interface::new(MemoryGalleries::new()))
        .context("Invalid server configuration")?;
    let listener = server
        .bind()
        .await
        .with_context(|| format!("Failed to bind {}", server.config().address()))?;

    server
        .run_until(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    tracing::info!("Panda server exited cleanly");
    Ok(())
}
