//! pulsegrid-storage — the storage contract for collected metrics.
//!
//! Two interchangeable backends implement the same accumulation
//! semantics behind [`MetricStorage`]: the in-process [`MemoryStorage`]
//! here (which also owns snapshot save/restore), and the PostgreSQL
//! repository in `pulsegrid-repository`. Handlers receive the backend
//! as an `Arc<dyn MetricStorage>` — constructed once at boot, passed
//! explicitly, never ambient.

pub mod error;
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;

use pulsegrid_core::{Metric, MetricEnvelope, MetricKind, MetricValue, format_gauge};

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStorage;

/// Capability set shared by every metric backend.
///
/// Gauges overwrite, counters accumulate (`new_total = existing +
/// delta`), and a batch applies as one atomic unit: either every
/// element lands or none does.
#[async_trait]
pub trait MetricStorage: Send + Sync {
    /// Apply a single metric update.
    async fn update(&self, metric: &Metric) -> StorageResult<()>;

    /// Apply a batch atomically, returning the post-update envelope per
    /// metric id (counters echo their new total).
    async fn update_batch(
        &self,
        metrics: &[Metric],
    ) -> StorageResult<HashMap<String, MetricEnvelope>>;

    /// Fetch the current stored metric.
    async fn get(&self, kind: MetricKind, name: &str) -> StorageResult<Metric>;

    /// Fetch the current value rendered as plain text.
    async fn get_value(&self, kind: MetricKind, name: &str) -> StorageResult<String> {
        let metric = self.get(kind, name).await?;
        Ok(match metric.value() {
            MetricValue::Gauge(v) => format_gauge(v),
            MetricValue::Counter(c) => c.to_string(),
        })
    }

    /// Fetch a coherent snapshot of every gauge and counter.
    async fn get_all(&self) -> StorageResult<(HashMap<String, f64>, HashMap<String, i64>)>;

    /// Backend liveness probe.
    async fn ping(&self) -> StorageResult<()>;
}
