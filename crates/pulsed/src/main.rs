//! pulsed — the PulseGrid daemon.
//!
//! One binary, two roles:
//!
//! ```text
//! pulsed server --address 127.0.0.1:8080 --snapshot-path /var/lib/pulsegrid/metrics.json
//! pulsed agent  --address 127.0.0.1:8080 --report-interval 10 --poll-interval 2
//! ```
//!
//! The server persists metrics either in memory (with snapshot
//! save/restore) or in PostgreSQL when a DSN is supplied. The agent
//! samples host telemetry and ships batches to the server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use pulsegrid_agent::{Agent, AgentConfig};
use pulsegrid_api::{AppState, build_router};
use pulsegrid_repository::PgMetricStorage;
use pulsegrid_storage::{MemoryStorage, MetricStorage};

#[derive(Parser)]
#[command(name = "pulsed", about = "PulseGrid metrics daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the collector server.
    Server {
        /// Address to listen on.
        #[arg(short = 'a', long, env = "ADDRESS", default_value = "127.0.0.1:8080")]
        address: String,

        /// Snapshot interval in seconds; zero saves once at startup.
        #[arg(short = 'i', long, env = "STORE_INTERVAL", default_value = "30")]
        store_interval: u64,

        /// Where the memory backend snapshots its state.
        #[arg(
            short = 'f',
            long,
            env = "FILE_STORAGE_PATH",
            default_value = "/tmp/pulsegrid-metrics.json"
        )]
        snapshot_path: PathBuf,

        /// Restore the snapshot before serving traffic (true/false).
        #[arg(
            short = 'r',
            long,
            env = "RESTORE",
            action = clap::ArgAction::Set,
            default_value_t = true
        )]
        restore: bool,

        /// PostgreSQL DSN; empty selects the in-memory backend.
        #[arg(short = 'd', long, env = "DATABASE_DSN", default_value = "")]
        database_dsn: String,

        /// Pre-shared HMAC signing key; empty disables signing.
        #[arg(short = 'k', long, env = "KEY", default_value = "")]
        key: String,
    },

    /// Run the reporting agent.
    Agent {
        /// Collector address (scheme optional).
        #[arg(short = 'a', long, env = "ADDRESS", default_value = "127.0.0.1:8080")]
        address: String,

        /// Report interval in seconds.
        #[arg(short = 'r', long, env = "REPORT_INTERVAL", default_value = "10")]
        report_interval: u64,

        /// Poll interval in seconds.
        #[arg(short = 'p', long, env = "POLL_INTERVAL", default_value = "2")]
        poll_interval: u64,

        /// Pre-shared HMAC signing key; empty disables signing.
        #[arg(short = 'k', long, env = "KEY", default_value = "")]
        key: String,

        /// Max number of parallel outgoing requests.
        #[arg(short = 'l', long, env = "RATE_LIMIT", default_value = "5")]
        rate_limit: usize,
    },
}

fn optional(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pulsed=debug,pulsegrid=debug".parse().unwrap()),
        )
        .init();

    match Cli::parse().command {
        Command::Server {
            address,
            store_interval,
            snapshot_path,
            restore,
            database_dsn,
            key,
        } => {
            run_server(
                address,
                Duration::from_secs(store_interval),
                snapshot_path,
                restore,
                optional(database_dsn),
                optional(key),
            )
            .await
        }
        Command::Agent {
            address,
            report_interval,
            poll_interval,
            key,
            rate_limit,
        } => {
            run_agent(
                address,
                Duration::from_secs(report_interval),
                Duration::from_secs(poll_interval),
                optional(key),
                rate_limit,
            )
            .await
        }
    }
}

async fn run_server(
    address: String,
    store_interval: Duration,
    snapshot_path: PathBuf,
    restore: bool,
    database_dsn: Option<String>,
    key: Option<String>,
) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut snapshot_task = None;

    let storage: Arc<dyn MetricStorage> = match database_dsn {
        Some(dsn) => {
            let storage = PgMetricStorage::connect(&dsn).await?;
            info!("postgres backend ready");
            Arc::new(storage)
        }
        None => {
            let storage = MemoryStorage::new();
            if restore {
                match storage.load_snapshot(&snapshot_path) {
                    Ok(()) => info!(path = %snapshot_path.display(), "snapshot restored"),
                    Err(e) => warn!(error = %e, "starting with an empty store"),
                }
            }
            if let Some(parent) = snapshot_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let saver = storage.clone();
            let path = snapshot_path.clone();
            let shutdown = shutdown_rx.clone();
            snapshot_task = Some(tokio::spawn(async move {
                saver.run_periodic_save(path, store_interval, shutdown).await;
            }));
            info!("memory backend ready");
            Arc::new(storage)
        }
    };

    let router = build_router(AppState {
        storage,
        signing_key: key,
    });

    info!(%address, "collector starting");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Some(task) = snapshot_task {
        let _ = task.await;
    }
    info!("collector stopped");
    Ok(())
}

async fn run_agent(
    address: String,
    report_interval: Duration,
    poll_interval: Duration,
    key: Option<String>,
    rate_limit: usize,
) -> anyhow::Result<()> {
    let server_address = if address.starts_with("http://") || address.starts_with("https://") {
        address
    } else {
        format!("http://{address}")
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let agent = Agent::new(AgentConfig {
        server_address,
        poll_interval,
        report_interval,
        signing_key: key,
        rate_limit,
    });
    let runner = tokio::spawn(agent.run(shutdown_rx));

    shutdown_signal().await;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = runner.await;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("failed to install CTRL+C handler, running until killed");
        std::future::pending::<()>().await;
    }
}
