//! Fixed-size dispatch worker pool.
//!
//! Workers share one bounded queue receiver; each drained batch goes
//! through the sender (codec, signing, backoff) independently, so a
//! slow or failing delivery never blocks the other workers.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use pulsegrid_core::Metric;

use crate::sender::MetricSender;

/// Spawn `workers` dispatch tasks draining the batch queue.
///
/// A worker that fails to deliver logs the error and returns to the
/// queue for the next batch. Workers exit when the queue closes or the
/// shutdown signal fires.
pub fn spawn_workers(
    workers: usize,
    rx: mpsc::Receiver<Vec<Metric>>,
    sender: Arc<MetricSender>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let rx = Arc::new(Mutex::new(rx));

    (0..workers)
        .map(|worker| {
            let rx = Arc::clone(&rx);
            let sender = Arc::clone(&sender);
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let batch = {
                        let mut queue = rx.lock().await;
                        tokio::select! {
                            batch = queue.recv() => batch,
                            _ = shutdown.changed() => None,
                        }
                    };
                    let Some(batch) = batch else { break };

                    if let Err(e) = sender.ship(&batch).await {
                        warn!(worker, error = %e, "batch delivery failed");
                    } else {
                        debug!(worker, metrics = batch.len(), "batch delivered");
                    }
                }
                debug!(worker, "dispatch worker stopped");
            })
        })
        .collect()
}
