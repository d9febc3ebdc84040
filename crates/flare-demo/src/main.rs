//! # flare-demo
//!
//! Demo server: loads settings, registers the counter, chat and form views,
//! and serves them over WebSocket until ctrl-c.

#![deny(unsafe_code)]

mod views;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use flare_core::logging::{LogFormat, init_subscriber};
use flare_live::{SessionConfig, SessionManager, ViewRegistry};
use flare_pubsub::{Broadcaster, LocalPubSub};
use flare_server::{FlareServer, ServerConfig};
use flare_settings::FlareSettings;

/// Flare demo server.
#[derive(Parser, Debug)]
#[command(name = "flare-demo", about = "Flare live-view demo server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.flare/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter directive (overrides settings; `RUST_LOG` still wins).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// Load settings and fold the command-line overrides into them.
    fn settings(&self) -> Result<FlareSettings> {
        let path = self.config.clone().unwrap_or_else(flare_settings::settings_path);
        let mut settings = flare_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;

        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
        Ok(settings)
    }
}

fn session_config(settings: &FlareSettings) -> SessionConfig {
    SessionConfig {
        full_render_every: settings.session.full_render_every,
        inbox_capacity: settings.session.inbox_capacity,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.settings()?;

    let format = if settings.logging.json { LogFormat::Json } else { LogFormat::Compact };
    init_subscriber(&settings.logging.level, format);

    let metrics = flare_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let views = ViewRegistry::new();
    views::register_all(&views);
    let topics = views.topics();

    let bus = LocalPubSub::new(settings.pubsub.workers, settings.pubsub.queue_capacity);
    let broadcaster = Broadcaster::new(Arc::new(bus));
    let manager = Arc::new(SessionManager::new(
        Arc::new(views),
        broadcaster,
        session_config(&settings),
    ));

    let config = ServerConfig::from(&settings);
    let live_path = config.live_path.clone();
    let server = FlareServer::new(config, manager).with_metrics(metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;

    tracing::info!(?topics, "Flare demo listening on ws://{addr}{live_path}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if !server.shutdown_gracefully().await {
        tracing::warn!("connections did not drain before the shutdown timeout");
    }
    let _ = handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
