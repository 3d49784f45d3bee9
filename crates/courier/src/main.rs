//! # courier
//!
//! Courier relay binary: loads settings, wires the credential authority and
//! delivery store into the server and runs until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use courier_auth::JwtAuthenticator;
use courier_server::{CourierServer, InMemoryDeliveryStore, ServerConfig};
use courier_settings::CourierSettings;

/// Courier live location relay.
#[derive(Parser, Debug)]
#[command(name = "courier", about = "Live delivery location relay")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.courier/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `courier_server=trace` (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn load_settings(&self) -> Result<CourierSettings> {
        let mut settings = match &self.config {
            Some(path) => courier_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => courier_settings::load_settings().context("Failed to load settings")?,
        };
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.load_settings()?;

    courier_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);
    if settings.auth.uses_dev_secret() {
        tracing::warn!("using the built-in development JWT secret; set COURIER_JWT_SECRET in production");
    }

    let metrics = match courier_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder unavailable, /metrics disabled");
            None
        }
    };

    let auth = Arc::new(JwtAuthenticator::new(settings.auth.jwt_secret.as_bytes()));
    let store = Arc::new(InMemoryDeliveryStore::new());
    let config = ServerConfig::from_settings(&settings);

    let mut server = CourierServer::new(config, store, auth);
    if let Some(handle) = metrics {
        server = server.with_metrics(handle);
    }

    let handle = server.listen().await.context("Failed to bind server")?;
    tracing::info!("Courier relay listening on http://{}", handle.addr);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if !server.shutdown().drain(handle.into_tasks(), None).await {
        tracing::warn!("shutdown drain timed out");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
