//! craftwire debug server
//!
//! Accepts protocol connections, logs every packet, answers status pings and
//! lets clients log in without authentication.

mod listeners;

use craftwire_server::{Config, Dispatcher, Server, ServerConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if CRAFTWIRE_CONFIG is set, then env overrides)
    let config_path = std::env::var("CRAFTWIRE_CONFIG").ok();
    let config = match Config::load() {
        Ok(c) => {
            if let Some(path) = &config_path {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // An explicitly named config file must load
            if config_path.is_some() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::warn!("Ignoring invalid environment configuration: {}", e);
            Config::default()
        }
    };

    let server_config = ServerConfig::from_config(&config)?;

    tracing::info!("Starting craftwire debug server");
    tracing::info!("  Bind address: {}", server_config.bind_addr);
    tracing::info!(
        "  Protocol version: {} ({})",
        server_config.version,
        server_config.version.protocol()
    );
    match server_config.compression_threshold {
        Some(threshold) => tracing::info!("  Compression: {} bytes", threshold),
        None => tracing::info!("  Compression: disabled"),
    }
    tracing::info!("  Max connections: {}", server_config.max_connections);

    let dispatcher = Arc::new(Dispatcher::new());
    listeners::install(&dispatcher, &config, &server_config)?;
    tracing::info!("  Listeners: {}", dispatcher.len());

    let server = Arc::new(Server::new(server_config, dispatcher));

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    let stats = server.dispatch_stats();
    tracing::info!(
        "Server stopped ({} packets dispatched, {} listener errors)",
        stats
            .packets_dispatched
            .load(std::sync::atomic::Ordering::Relaxed),
        stats.listener_errors.load(std::sync::atomic::Ordering::Relaxed)
    );
    Ok(())
}
