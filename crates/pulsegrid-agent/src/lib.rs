//! pulsegrid-agent — samples host telemetry and ships it to the
//! collector over HTTP.
//!
//! # Architecture
//!
//! ```text
//! Sampler
//!   ├── poll loop    → increments the observation counter
//!   └── report loop  → snapshots host gauges + counter into a batch
//!                        │
//!                 bounded queue (capacity 2·N, blocks when full)
//!                        │
//! Dispatcher: N workers  → encode → sign → POST /updates/ with backoff
//! ```
//!
//! Send failures are logged and never crash a worker; the next report
//! cycle gets a fresh chance.

pub mod dispatcher;
pub mod sampler;
pub mod sender;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::info;

pub use sampler::Sampler;
pub use sender::{MetricSender, SendError};

/// Runtime settings for the agent, supplied by the binary.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Collector base URL (`http://host:port`).
    pub server_address: String,
    /// How often the observation counter ticks.
    pub poll_interval: Duration,
    /// How often a batch is assembled and queued.
    pub report_interval: Duration,
    /// Pre-shared signing key; empty means unsigned.
    pub signing_key: Option<String>,
    /// Number of parallel dispatch workers (and half the queue bound).
    pub rate_limit: usize,
}

/// The assembled agent pipeline.
pub struct Agent {
    config: AgentConfig,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// Run the sampler and dispatch workers until shutdown fires.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let workers = self.config.rate_limit.max(1);
        let (tx, rx) = mpsc::channel(workers * 2);

        let sender = Arc::new(MetricSender::new(
            &self.config.server_address,
            self.config.signing_key.clone(),
        ));
        let handles = dispatcher::spawn_workers(workers, rx, sender, shutdown.clone());

        info!(
            server = %self.config.server_address,
            workers,
            poll_secs = self.config.poll_interval.as_secs(),
            report_secs = self.config.report_interval.as_secs(),
            "agent started"
        );

        Sampler::new(self.config.poll_interval, self.config.report_interval)
            .run(tx, shutdown)
            .await;

        // The sampler returned and dropped the queue sender; workers
        // drain what is left and exit.
        for handle in handles {
            let _ = handle.await;
        }
        info!("agent stopped");
    }
}
