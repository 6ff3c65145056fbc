//! Lashir server - Main entry point
//!
//! Sound-to-solfa microservice: streams solfa syllables for live audio over a
//! WebSocket and renders uploaded recordings as solfa-annotated scores.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lashir_server::config::{self, Overrides};
use lashir_server::services::{build_detector, build_renderer};
use lashir_server::{build_router, AppState};

/// Command-line arguments for lashir-server
#[derive(Parser, Debug)]
#[command(name = "lashir-server")]
#[command(about = "Sound-to-solfa service")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "LASHIR_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "LASHIR_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "LASHIR_PORT")]
    port: Option<u16>,

    /// Log filter (trace, debug, info, warn, error, or a full directive)
    #[arg(long, env = "LASHIR_LOG")]
    log_level: Option<String>,

    /// Use the HTTP pitch detector at this URL
    #[arg(long, env = "LASHIR_DETECTOR_URL")]
    detector_url: Option<String>,

    /// Directory rendered scores are written to and served from
    #[arg(long, env = "LASHIR_ARTIFACT_DIR")]
    artifact_dir: Option<PathBuf>,

    /// Write the resolved configuration to this path and exit
    #[arg(long)]
    write_config: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            host: self.host.clone(),
            port: self.port,
            log_level: self.log_level.clone(),
            detector_url: self.detector_url.clone(),
            artifact_dir: self.artifact_dir.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logging is configured from the resolved settings, so resolve first
    let config = config::resolve(args.config.as_deref(), &args.overrides())
        .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                let level = &config.logging.level;
                if level.contains('=') {
                    level.as_str().into()
                } else {
                    format!(
                        "lashir_server={level},lashir_common={level},tower_http={level}"
                    )
                    .into()
                }
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Lashir server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    if let Some(path) = &args.write_config {
        lashir_common::config::write_toml_config(&config, path)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        info!("Wrote configuration to {}", path.display());
        return Ok(());
    }

    let detector = build_detector(&config.detector).context("Failed to build pitch detector")?;
    let renderer = build_renderer(&config.renderer);
    info!(
        "Detector: {}, renderer: {}, artifacts in {}",
        detector.name(),
        renderer.name(),
        config.renderer.output_dir.display()
    );

    tokio::fs::create_dir_all(&config.renderer.output_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create artifact directory {}",
                config.renderer.output_dir.display()
            )
        })?;

    let state = AppState::new(&config, detector, renderer);
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid listen address")?;

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
