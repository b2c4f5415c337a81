//! Screenstream Daemon - MJPEG over HTTP
//!
//! Loads a directory of JPEG frames and serves them in a loop to every client
//! that opens the stream URL (browser, VLC, OBS browser source, ...).
//! Ctrl-C stops the server and closes every client connection.

use anyhow::{Context, Result};
use clap::Parser;
use screenstream_server::StreamingServer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use screenstream_daemon::cli::Args;
use screenstream_daemon::config::DaemonConfig;
use screenstream_daemon::images::image_dir_source;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    info!("Starting screenstream daemon v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match &args.config {
        Some(path) => DaemonConfig::load_from(path),
        None => DaemonConfig::load(),
    }
    .context("Failed to load configuration")?;

    info!("Configuration loaded from {}", config.config_path.display());
    args.apply(&mut config);

    let image_dir = config
        .image_dir
        .clone()
        .context("No image directory configured (use --image-dir or set image_dir in the config file)")?;
    let source = image_dir_source(&image_dir)
        .with_context(|| format!("Failed to load frames from {}", image_dir.display()))?;
    info!("Loaded {} frames from {}", source.len(), image_dir.display());

    let server_config = config.server_config()?;
    let server = StreamingServer::new(source);
    let addr = server
        .start(server_config)
        .await
        .context("Failed to start streaming server")?;

    info!("Stream available at http://{}/", addr);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut status = tokio::time::interval(config.status_interval());
    let mut last_count = None;
    let mut failed = false;

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Received shutdown signal");
                break;
            }
            _ = status.tick() => {
                if !server.is_running() {
                    failed = true;
                    break;
                }
                let count = server.client_count();
                if last_count != Some(count) {
                    info!("Connected clients: {}", count);
                    last_count = Some(count);
                }
            }
        }
    }

    info!("Shutting down...");
    server.stop().await;

    if failed {
        anyhow::bail!("Streaming server stopped accepting clients unexpectedly");
    }

    info!("Screenstream daemon stopped");
    Ok(())
}
