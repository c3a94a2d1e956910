//! Periodic host-telemetry sampling.
//!
//! Two independent loops share nothing but the observation counter: the
//! poll loop bumps it, and the report loop snapshots the host gauges
//! plus the current count into one batch per report interval.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use sysinfo::System;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use pulsegrid_core::Metric;

/// Counter metric carrying the number of observations taken.
pub const POLL_COUNT: &str = "PollCount";

/// Capture the current host gauges.
///
/// Memory and swap figures come from the system, process figures from
/// our own PID; a random jitter gauge distinguishes report cycles.
pub fn collect_host_gauges(sys: &mut System) -> Vec<Metric> {
    sys.refresh_all();

    let mut readings = vec![
        ("TotalMemory", sys.total_memory() as f64),
        ("UsedMemory", sys.used_memory() as f64),
        ("AvailableMemory", sys.available_memory() as f64),
        ("FreeMemory", sys.free_memory() as f64),
        ("TotalSwap", sys.total_swap() as f64),
        ("UsedSwap", sys.used_swap() as f64),
        ("CpuUtilization", sys.global_cpu_info().cpu_usage() as f64),
    ];

    if let Ok(pid) = sysinfo::get_current_pid() {
        if let Some(process) = sys.process(pid) {
            readings.push(("ProcessMemory", process.memory() as f64));
            readings.push(("ProcessVirtualMemory", process.virtual_memory() as f64));
        }
    }

    let mut gauges: Vec<Metric> = readings
        .into_iter()
        .filter_map(|(name, value)| Metric::gauge(name, value).ok())
        .collect();
    if let Ok(jitter) = Metric::gauge("RandomValue", rand::random::<f64>()) {
        gauges.push(jitter);
    }
    gauges
}

/// Drives the poll and report loops.
pub struct Sampler {
    poll_interval: Duration,
    report_interval: Duration,
    poll_count: Arc<AtomicI64>,
}

impl Sampler {
    pub fn new(poll_interval: Duration, report_interval: Duration) -> Self {
        Self {
            poll_interval,
            report_interval,
            poll_count: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Current observation count (for the report loop and tests).
    pub fn poll_count(&self) -> i64 {
        self.poll_count.load(Ordering::Relaxed)
    }

    /// Assemble one report batch from fresh gauges and the counter.
    ///
    /// Returns `None` when no gauges were captured — such a batch is
    /// discarded instead of shipped.
    pub fn assemble_batch(&self, sys: &mut System) -> Option<Vec<Metric>> {
        let mut batch = collect_host_gauges(sys);
        if batch.is_empty() {
            return None;
        }
        if let Ok(count) = Metric::counter(POLL_COUNT, self.poll_count()) {
            batch.push(count);
        }
        Some(batch)
    }

    /// Run both loops until shutdown. Enqueueing blocks while the queue
    /// is full, trading report punctuality for bounded memory.
    pub async fn run(self, tx: mpsc::Sender<Vec<Metric>>, mut shutdown: watch::Receiver<bool>) {
        let poll_count = Arc::clone(&self.poll_count);
        let poll_interval = self.poll_interval;
        let mut poll_shutdown = shutdown.clone();
        let poller = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {
                        poll_count.fetch_add(1, Ordering::Relaxed);
                    }
                    _ = poll_shutdown.changed() => break,
                }
            }
        });

        let mut sys = System::new_all();
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.report_interval) => {
                    let Some(batch) = self.assemble_batch(&mut sys) else {
                        warn!("no gauges captured, skipping report cycle");
                        continue;
                    };
                    debug!(metrics = batch.len(), "batch queued");
                    if tx.send(batch).await.is_err() {
                        // All workers are gone; nothing left to feed.
                        break;
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        let _ = poller.await;
    }
}
