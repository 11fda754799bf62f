use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

use turnstile::config::{BackendKind, TurnstileConfig};
use turnstile::http::{router, HttpServer, IdentityResolver};
use turnstile::ratelimit::RateLimiter;
use turnstile::{storage, telemetry};

/// Fixed-window admission control for HTTP services.
#[derive(Parser, Debug)]
#[command(name = "turnstile", version)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Override the counter store backend
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Validate once, after CLI overrides; an invalid policy must never reach the listener
    let mut config =
        TurnstileConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    if let Some(backend) = args.backend {
        config.storage.backend = backend;
    }
    config.validate().context("invalid configuration")?;

    telemetry::init(&config.logging)?;

    info!("Starting Turnstile Admission Control");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        info!(path = %path.display(), "Loaded configuration file");
    }
    info!(
        ip_limit = config.limits.ip.limit_per_window,
        ip_block = ?config.limits.ip.block_duration,
        token_limit = config.limits.token.limit_per_window,
        token_block = ?config.limits.token.block_duration,
        window = ?config.limits.window,
        "Limit policies loaded"
    );

    let store = storage::connect(&config.storage)
        .await
        .context("failed to initialize counter store")?;

    let limiter = Arc::new(RateLimiter::new(store.clone(), config.limits.clone()));
    let resolver = IdentityResolver::from_config(&config.identity)?;
    let app = router(limiter, resolver);

    // Run the server with graceful shutdown on Ctrl+C
    let served = HttpServer::new(config.server.listen_addr, app)
        .serve_with_shutdown(shutdown_signal())
        .await;

    if let Err(e) = store.close().await {
        warn!(error = %e, "Failed to close counter store");
    }
    served?;

    info!("Turnstile stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
