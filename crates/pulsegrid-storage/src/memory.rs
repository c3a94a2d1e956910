//! In-process metric storage with snapshot persistence.
//!
//! Both maps sit behind one mutex; every read and write takes it, and a
//! batch holds it for its full duration, so concurrent batches for the
//! same counter never interleave their read-modify-write cycle.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info};

use pulsegrid_core::{Metric, MetricEnvelope, MetricError, MetricKind, MetricValue};

use crate::MetricStorage;
use crate::error::{StorageError, StorageResult};

#[derive(Default)]
struct Maps {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
}

impl Maps {
    /// Apply one metric and return its post-update envelope.
    fn apply(&mut self, metric: &Metric) -> MetricEnvelope {
        match metric.value() {
            MetricValue::Gauge(value) => {
                self.gauges.insert(metric.name().to_string(), value);
                MetricEnvelope::gauge(metric.name(), value)
            }
            MetricValue::Counter(delta) => {
                let total = self
                    .counters
                    .entry(metric.name().to_string())
                    .and_modify(|existing| *existing += delta)
                    .or_insert(delta);
                MetricEnvelope::counter(metric.name(), *total)
            }
        }
    }
}

/// Thread-safe in-memory metric store.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Maps>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> MutexGuard<'_, Maps> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write the full store as newline-delimited JSON envelopes,
    /// replacing the target file atomically via a sibling temp file.
    pub fn save_snapshot(&self, path: &Path) -> StorageResult<()> {
        let tmp_path = snapshot_tmp_path(path);
        let maps = self.locked();

        let write = |path: &Path| -> std::io::Result<()> {
            let mut writer = BufWriter::new(File::create(path)?);
            for (name, value) in &maps.gauges {
                let line = serde_json::to_string(&MetricEnvelope::gauge(name, *value))?;
                writeln!(writer, "{line}")?;
            }
            for (name, total) in &maps.counters {
                let line = serde_json::to_string(&MetricEnvelope::counter(name, *total))?;
                writeln!(writer, "{line}")?;
            }
            writer.flush()
        };

        write(&tmp_path)
            .and_then(|()| fs::rename(&tmp_path, path))
            .map_err(|e| StorageError::Snapshot(format!("saving to {}: {e}", path.display())))?;

        debug!(
            path = %path.display(),
            gauges = maps.gauges.len(),
            counters = maps.counters.len(),
            "snapshot saved"
        );
        Ok(())
    }

    /// Replay a snapshot through the normal update rules. A decode
    /// failure on any line aborts the load.
    pub fn load_snapshot(&self, path: &Path) -> StorageResult<()> {
        let file = File::open(path)
            .map_err(|e| StorageError::Snapshot(format!("opening {}: {e}", path.display())))?;

        let mut maps = self.locked();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line
                .map_err(|e| StorageError::Snapshot(format!("reading line {}: {e}", line_no + 1)))?;
            if line.is_empty() {
                continue;
            }
            let envelope: MetricEnvelope = serde_json::from_str(&line).map_err(|e| {
                StorageError::Snapshot(format!("decoding line {}: {e}", line_no + 1))
            })?;
            let metric = Metric::try_from(&envelope)?;
            maps.apply(&metric);
        }

        debug!(path = %path.display(), "snapshot restored");
        Ok(())
    }

    /// Persist snapshots on a schedule. A zero interval saves once and
    /// returns; otherwise the store is saved on every tick, with a
    /// final save when the shutdown signal fires. Save failures are
    /// logged, never fatal.
    pub async fn run_periodic_save(
        &self,
        path: PathBuf,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        if interval.is_zero() {
            if let Err(e) = self.save_snapshot(&path) {
                error!(error = %e, "one-shot snapshot save failed");
            }
            return;
        }

        info!(interval_secs = interval.as_secs(), path = %path.display(), "periodic snapshot saving started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.save_snapshot(&path) {
                        error!(error = %e, "periodic snapshot save failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("snapshot loop shutting down");
                    if let Err(e) = self.save_snapshot(&path) {
                        error!(error = %e, "final snapshot save failed");
                    }
                    break;
                }
            }
        }
    }
}

fn snapshot_tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[async_trait]
impl MetricStorage for MemoryStorage {
    async fn update(&self, metric: &Metric) -> StorageResult<()> {
        self.locked().apply(metric);
        Ok(())
    }

    async fn update_batch(
        &self,
        metrics: &[Metric],
    ) -> StorageResult<HashMap<String, MetricEnvelope>> {
        // One lock acquisition for the whole batch keeps it atomic with
        // respect to concurrent readers and other batches.
        let mut maps = self.locked();
        let mut applied = HashMap::with_capacity(metrics.len());
        for metric in metrics {
            let envelope = maps.apply(metric);
            applied.insert(metric.name().to_string(), envelope);
        }
        Ok(applied)
    }

    async fn get(&self, kind: MetricKind, name: &str) -> StorageResult<Metric> {
        let maps = self.locked();
        let metric = match kind {
            MetricKind::Gauge => maps
                .gauges
                .get(name)
                .map(|v| Metric::gauge(name, *v))
                .transpose()?,
            MetricKind::Counter => maps
                .counters
                .get(name)
                .map(|c| Metric::counter(name, *c))
                .transpose()?,
        };
        metric.ok_or(StorageError::Metric(MetricError::MetricNotFound))
    }

    async fn get_all(&self) -> StorageResult<(HashMap<String, f64>, HashMap<String, i64>)> {
        let maps = self.locked();
        Ok((maps.gauges.clone(), maps.counters.clone()))
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gauge(name: &str, value: f64) -> Metric {
        Metric::gauge(name, value).unwrap()
    }

    fn counter(name: &str, delta: i64) -> Metric {
        Metric::counter(name, delta).unwrap()
    }

    #[tokio::test]
    async fn gauge_overwrites() {
        let store = MemoryStorage::new();
        store.update(&gauge("Alloc", 1.0)).await.unwrap();
        store.update(&gauge("Alloc", 2.5)).await.unwrap();

        assert_eq!(
            store.get_value(MetricKind::Gauge, "Alloc").await.unwrap(),
            "2.5"
        );
    }

    #[tokio::test]
    async fn counter_accumulates() {
        let store = MemoryStorage::new();
        store.update(&counter("hits", 10)).await.unwrap();
        store.update(&counter("hits", 15)).await.unwrap();

        assert_eq!(
            store.get_value(MetricKind::Counter, "hits").await.unwrap(),
            "25"
        );
    }

    #[tokio::test]
    async fn missing_metric_is_not_found() {
        let store = MemoryStorage::new();
        let err = store.get(MetricKind::Gauge, "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn gauge_and_counter_namespaces_are_distinct() {
        let store = MemoryStorage::new();
        store.update(&gauge("x", 1.0)).await.unwrap();

        let err = store.get(MetricKind::Counter, "x").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn batch_echoes_new_totals() {
        let store = MemoryStorage::new();
        store.update(&counter("PollCount", 7)).await.unwrap();

        let applied = store
            .update_batch(&[gauge("Alloc", 3.0), counter("PollCount", 5)])
            .await
            .unwrap();

        assert_eq!(applied["Alloc"], MetricEnvelope::gauge("Alloc", 3.0));
        assert_eq!(
            applied["PollCount"],
            MetricEnvelope::counter("PollCount", 12)
        );
    }

    #[tokio::test]
    async fn repeated_counter_in_one_batch_accumulates_in_order() {
        let store = MemoryStorage::new();
        let applied = store
            .update_batch(&[counter("n", 1), counter("n", 2), counter("n", 3)])
            .await
            .unwrap();

        assert_eq!(applied["n"], MetricEnvelope::counter("n", 6));
        assert_eq!(
            store.get_value(MetricKind::Counter, "n").await.unwrap(),
            "6"
        );
    }

    #[tokio::test]
    async fn concurrent_counter_updates_do_not_lose_deltas() {
        let store = MemoryStorage::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    store.update(&counter("hits", 1)).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(
            store.get_value(MetricKind::Counter, "hits").await.unwrap(),
            "800"
        );
    }

    #[tokio::test]
    async fn get_all_returns_coherent_copy() {
        let store = MemoryStorage::new();
        store.update(&gauge("a", 1.0)).await.unwrap();
        store.update(&counter("b", 2)).await.unwrap();

        let (gauges, counters) = store.get_all().await.unwrap();
        assert_eq!(gauges.get("a"), Some(&1.0));
        assert_eq!(counters.get("b"), Some(&2));
    }

    // ── Snapshots ──────────────────────────────────────────────────

    #[tokio::test]
    async fn snapshot_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let store = MemoryStorage::new();
        store.update(&gauge("Alloc", 123.45)).await.unwrap();
        store.update(&gauge("HeapInuse", 9.0)).await.unwrap();
        store.update(&counter("PollCount", 42)).await.unwrap();
        store.save_snapshot(&path).unwrap();

        let restored = MemoryStorage::new();
        restored.load_snapshot(&path).unwrap();

        assert_eq!(store.get_all().await.unwrap(), restored.get_all().await.unwrap());
    }

    #[tokio::test]
    async fn snapshot_overwrites_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let store = MemoryStorage::new();
        store.update(&gauge("old", 1.0)).await.unwrap();
        store.save_snapshot(&path).unwrap();

        let store = MemoryStorage::new();
        store.update(&gauge("new", 2.0)).await.unwrap();
        store.save_snapshot(&path).unwrap();

        let restored = MemoryStorage::new();
        restored.load_snapshot(&path).unwrap();
        let (gauges, _) = restored.get_all().await.unwrap();
        assert!(!gauges.contains_key("old"));
        assert_eq!(gauges.get("new"), Some(&2.0));
    }

    #[test]
    fn corrupt_snapshot_line_aborts_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        fs::write(
            &path,
            "{\"id\":\"a\",\"type\":\"gauge\",\"value\":1.0}\nnot json\n",
        )
        .unwrap();

        let store = MemoryStorage::new();
        let err = store.load_snapshot(&path).unwrap_err();
        assert!(matches!(err, StorageError::Snapshot(_)));
    }

    #[test]
    fn missing_snapshot_file_is_an_error() {
        let store = MemoryStorage::new();
        assert!(store.load_snapshot(Path::new("/nonexistent/metrics.json")).is_err());
    }

    #[tokio::test]
    async fn zero_interval_saves_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let store = MemoryStorage::new();
        store.update(&counter("PollCount", 3)).await.unwrap();

        let (_tx, rx) = watch::channel(false);
        store
            .run_periodic_save(path.clone(), Duration::ZERO, rx)
            .await;

        let restored = MemoryStorage::new();
        restored.load_snapshot(&path).unwrap();
        assert_eq!(
            restored
                .get_value(MetricKind::Counter, "PollCount")
                .await
                .unwrap(),
            "3"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_save_writes_on_tick_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let store = MemoryStorage::new();
        store.update(&gauge("Alloc", 1.0)).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let saver = {
            let store = store.clone();
            let path = path.clone();
            tokio::spawn(async move {
                store
                    .run_periodic_save(path, Duration::from_secs(30), rx)
                    .await;
            })
        };

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(path.exists());

        store.update(&gauge("Alloc", 2.0)).await.unwrap();
        tx.send(true).unwrap();
        saver.await.unwrap();

        let restored = MemoryStorage::new();
        restored.load_snapshot(&path).unwrap();
        assert_eq!(
            restored.get_value(MetricKind::Gauge, "Alloc").await.unwrap(),
            "2"
        );
    }
}
