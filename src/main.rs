//! Game Day Dashboard Engine Binary

use clap::{Parser, Subcommand};
use gameday_dashboard::{
    ChaosDispatcher, ChaosKind, Config, DashboardState, Result, StreamManager, WsTransport,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gameday_dashboard", version, about = "Streaming state engine for the game day dashboard")]
struct Cli {
    /// Base URL of the observed backend
    #[arg(long, env = "BACKEND_URL")]
    backend_url: Option<String>,

    /// Delay between reconnect attempts, in milliseconds
    #[arg(long)]
    reconnect_delay_ms: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the streaming engine until interrupted
    Run,
    /// Fire a single chaos trigger and exit
    Chaos {
        /// Fault scenario slug, e.g. success, latency, db-failure, spike-memory
        kind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    initialize_tracing();

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_env();
    if let Some(backend_url) = cli.backend_url {
        config.backend_url = backend_url;
    }
    if let Some(ms) = cli.reconnect_delay_ms {
        config.reconnect_delay = Duration::from_millis(ms);
    }

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Chaos { kind } => {
            let dispatcher = ChaosDispatcher::new(config.backend_url.clone(), config.http_timeout)?;
            dispatcher.trigger(&ChaosKind::from(kind.as_str())).await;
            Ok(())
        }
    }
}

async fn run(config: Config) -> Result<()> {
    info!(
        "Starting game day dashboard engine v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!(
        "Backend: {}, stream endpoint: {}",
        config.backend_url,
        config.websocket_url()
    );

    let store = DashboardState::shared();
    let transport = Arc::new(WsTransport::new(
        config.websocket_url(),
        config.host(),
        config.handshake_timeout,
    ));
    let manager = Arc::new(StreamManager::new(
        transport,
        Arc::clone(&store),
        config.reconnect_delay,
    ));

    let stream_task = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.run().await }
    });

    // Stand-in for the external render sink: periodically report the
    // aggregate view on the operator channel.
    let mut summary_interval = tokio::time::interval(config.summary_interval);
    loop {
        tokio::select! {
            _ = summary_interval.tick() => {
                let summary = store.read().await.summary();
                info!(
                    "Dashboard - {} | logs today: {}, memory: {}, services with errors: {}, buffered events: {}, chart points: {}",
                    summary.connection.label(),
                    summary.total_logs_today,
                    summary.used_memory_display,
                    summary.services_with_errors,
                    summary.buffered_events,
                    summary.chart_points
                );
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to wait for shutdown signal: {}", e);
                }
                break;
            }
        }
    }

    info!("Shutting down dashboard engine");
    manager.shutdown();
    let _ = stream_task.await;
    info!("Dashboard engine shutdown complete");

    Ok(())
}

/// Initialize structured logging
fn initialize_tracing() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .json();

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))
        .unwrap();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
