//! Tabletcast - tableting line inference service
//!
//! Polls the line's sensor API, keeps rolling raw and processed buffers and
//! serves forecasts, defect/quality classifications and control-policy
//! actions over HTTP.
//!
//! # Usage
//!
//! ```bash
//! # Defaults, or ./line_config.toml when present
//! tabletcast
//!
//! # Explicit config, sensor API and bind address
//! tabletcast --config /etc/tabletcast/line_config.toml \
//!     --source-url http://sensors:5000 --addr 0.0.0.0:8000
//!
//! # Print the effective configuration and exit
//! tabletcast --print-config
//! ```
//!
//! # Environment Variables
//!
//! - `TABLETCAST_CONFIG`: Path to the line config file
//! - `TABLETCAST_SOURCE_URL`: Sensor API base URL
//! - `TABLETCAST_SERVER_ADDR`: HTTP bind address
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use tabletcast::acquisition::{HttpTelemetrySource, TelemetrySource};
use tabletcast::api::{create_app, AppState};
use tabletcast::buffer::TelemetryStore;
use tabletcast::config::{self, LineConfig};
use tabletcast::inference::{PredictionService, ServiceSettings};
use tabletcast::models::load_registry;
use tabletcast::pipeline::Poller;
use tabletcast::preprocessing::Preprocessor;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "tabletcast")]
#[command(about = "Tableting line telemetry inference service")]
#[command(version)]
struct CliArgs {
    /// Line config file (default: search $TABLETCAST_CONFIG, then ./line_config.toml)
    #[arg(short, long, env = "TABLETCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Override the sensor API base URL
    #[arg(long, env = "TABLETCAST_SOURCE_URL")]
    source_url: Option<String>,

    /// Override the server address
    #[arg(short, long, env = "TABLETCAST_SERVER_ADDR")]
    addr: Option<String>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

// ============================================================================
// Task Supervision
// ============================================================================

#[derive(Debug)]
enum TaskName {
    HttpServer,
    Poller,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HttpServer => write!(f, "HttpServer"),
            Self::Poller => write!(f, "Poller"),
        }
    }
}

fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

fn spawn_poller(task_set: &mut JoinSet<Result<TaskName>>, poller: Poller) {
    task_set.spawn(async move {
        poller.run().await;
        Ok(TaskName::Poller)
    });
}

/// Monitor tasks; the first failure cancels the rest.
async fn run_supervisor(task_set: &mut JoinSet<Result<TaskName>>, cancel_token: CancellationToken) -> Result<()> {
    info!("Supervisor: all tasks spawned, monitoring...");

    while let Some(result) = task_set.join_next().await {
        match result {
            Ok(Ok(task_name)) => {
                info!("Supervisor: task {} completed", task_name);
            }
            Ok(Err(e)) => {
                error!("Supervisor: task failed with error: {}", e);
                cancel_token.cancel();
                return Err(e);
            }
            Err(e) => {
                error!("Supervisor: task panicked: {}", e);
                cancel_token.cancel();
                return Err(anyhow::anyhow!("Task panicked: {}", e));
            }
        }
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let mut line_config = match &args.config {
        Some(path) => LineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => LineConfig::load(),
    };
    if let Some(url) = args.source_url {
        line_config.source.base_url = url;
    }
    if let Some(addr) = args.addr {
        line_config.server.addr = addr;
    }

    if args.print_config {
        println!("{}", line_config.to_toml()?);
        return Ok(());
    }

    config::init(line_config);
    let cfg = config::get();

    info!("Tabletcast {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Sensor API: {} | poll every {}s | buffer capacity {}",
        cfg.source.base_url, cfg.source.poll_interval_secs, cfg.buffer.capacity
    );

    let registry = Arc::new(load_registry(&cfg.models));

    let source: Arc<dyn TelemetrySource> = Arc::new(
        HttpTelemetrySource::from_config(&cfg.source).context("Failed to build sensor API client")?,
    );
    let store = Arc::new(TelemetryStore::new(cfg.buffer.capacity));
    let preprocessor = Preprocessor::new(cfg.downtime);

    let service = PredictionService::new(
        Arc::clone(&store),
        registry,
        Arc::clone(&source),
        preprocessor.clone(),
        ServiceSettings::from_config(cfg),
    );
    let app = create_app(
        AppState {
            service: Arc::new(service),
            source: Arc::clone(&source),
        },
        &cfg.server.cors_origins,
    );

    let listener = tokio::net::TcpListener::bind(&cfg.server.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", cfg.server.addr))?;
    info!("HTTP server listening on {}", cfg.server.addr);

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let poller = Poller::new(
        source,
        store,
        preprocessor,
        cfg.buffer.incremental_window,
        Duration::from_secs(cfg.source.poll_interval_secs),
        cancel_token.clone(),
    )
    .with_timeout(Duration::from_secs(cfg.source.timeout_secs));

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    spawn_http_server(&mut task_set, listener, app, cancel_token.clone());
    spawn_poller(&mut task_set, poller);

    run_supervisor(&mut task_set, cancel_token).await?;

    info!("Tabletcast shutdown complete");
    Ok(())
}
