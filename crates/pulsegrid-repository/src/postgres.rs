//! PostgreSQL metric repository.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::debug;

use pulsegrid_core::{Metric, MetricEnvelope, MetricError, MetricKind, MetricValue};
use pulsegrid_storage::{MetricStorage, StorageError, StorageResult};

const ENSURE_SCHEMA: &str = "\
    CREATE TABLE IF NOT EXISTS metrics (\
        name TEXT PRIMARY KEY,\
        type TEXT NOT NULL,\
        value DOUBLE PRECISION NOT NULL\
    )";

// Counters add onto the existing row inside the conflict expression, so
// the read-modify-write happens under the row lock; gauges overwrite.
const UPSERT_METRIC: &str = "\
    INSERT INTO metrics (name, type, value) VALUES ($1, $2, $3) \
    ON CONFLICT (name) DO UPDATE \
    SET value = CASE \
            WHEN EXCLUDED.type = 'counter' THEN metrics.value + EXCLUDED.value \
            ELSE EXCLUDED.value \
        END \
    RETURNING value";

const SELECT_VALUE: &str = "SELECT value FROM metrics WHERE name = $1 AND type = $2";

const SELECT_ALL: &str = "SELECT name, type, value FROM metrics";

/// Metric storage backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgMetricStorage {
    pool: PgPool,
}

impl PgMetricStorage {
    /// Connect to the database and make sure the metrics table exists.
    pub async fn connect(dsn: &str) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(dsn)
            .await
            .map_err(db_err)?;
        let storage = Self { pool };
        storage.ensure_schema().await?;
        debug!("postgres metric storage connected");
        Ok(storage)
    }

    /// Wrap an existing pool (for tests).
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_schema(&self) -> StorageResult<()> {
        sqlx::query(ENSURE_SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    fn bind_value(metric: &Metric) -> f64 {
        match metric.value() {
            MetricValue::Gauge(v) => v,
            MetricValue::Counter(d) => d as f64,
        }
    }

    fn applied_envelope(metric: &Metric, stored: f64) -> MetricEnvelope {
        match metric.kind() {
            MetricKind::Gauge => MetricEnvelope::gauge(metric.name(), stored),
            MetricKind::Counter => MetricEnvelope::counter(metric.name(), stored as i64),
        }
    }
}

fn db_err(err: sqlx::Error) -> StorageError {
    StorageError::Database(err.to_string())
}

#[async_trait]
impl MetricStorage for PgMetricStorage {
    async fn update(&self, metric: &Metric) -> StorageResult<()> {
        sqlx::query(UPSERT_METRIC)
            .bind(metric.name())
            .bind(metric.kind().as_str())
            .bind(Self::bind_value(metric))
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn update_batch(
        &self,
        metrics: &[Metric],
    ) -> StorageResult<HashMap<String, MetricEnvelope>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut applied = HashMap::with_capacity(metrics.len());

        for metric in metrics {
            // Any failed upsert drops the transaction, rolling back
            // every prior element of the batch.
            let row = sqlx::query(UPSERT_METRIC)
                .bind(metric.name())
                .bind(metric.kind().as_str())
                .bind(Self::bind_value(metric))
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err)?;
            let stored: f64 = row.try_get("value").map_err(db_err)?;
            applied.insert(
                metric.name().to_string(),
                Self::applied_envelope(metric, stored),
            );
        }

        tx.commit().await.map_err(db_err)?;
        debug!(metrics = metrics.len(), "batch committed");
        Ok(applied)
    }

    async fn get(&self, kind: MetricKind, name: &str) -> StorageResult<Metric> {
        let row: Option<PgRow> = sqlx::query(SELECT_VALUE)
            .bind(name)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        let Some(row) = row else {
            return Err(StorageError::Metric(MetricError::MetricNotFound));
        };
        let value: f64 = row.try_get("value").map_err(db_err)?;
        let metric = match kind {
            MetricKind::Gauge => Metric::gauge(name, value)?,
            MetricKind::Counter => Metric::counter(name, value as i64)?,
        };
        Ok(metric)
    }

    async fn get_all(&self) -> StorageResult<(HashMap<String, f64>, HashMap<String, i64>)> {
        let rows = sqlx::query(SELECT_ALL)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut gauges = HashMap::new();
        let mut counters = HashMap::new();
        for row in rows {
            let name: String = row.try_get("name").map_err(db_err)?;
            let kind: String = row.try_get("type").map_err(db_err)?;
            let value: f64 = row.try_get("value").map_err(db_err)?;
            match kind.as_str() {
                "gauge" => {
                    gauges.insert(name, value);
                }
                "counter" => {
                    counters.insert(name, value as i64);
                }
                // Rows written by this repository always carry a known
                // type; anything else is skipped rather than fatal.
                _ => {}
            }
        }
        Ok((gauges, counters))
    }

    async fn ping(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

// These tests need a live PostgreSQL server; point TEST_DATABASE_DSN at
// one and drop the ignore markers to run them.
#[cfg(test)]
mod tests {
    use super::*;

    async fn test_storage() -> PgMetricStorage {
        let dsn = std::env::var("TEST_DATABASE_DSN")
            .expect("TEST_DATABASE_DSN must point at a PostgreSQL server");
        let storage = PgMetricStorage::connect(&dsn).await.unwrap();
        sqlx::query("TRUNCATE metrics")
            .execute(&storage.pool)
            .await
            .unwrap();
        storage
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL server"]
    async fn gauge_overwrites() {
        let storage = test_storage().await;
        storage.update(&Metric::gauge("Alloc", 1.0).unwrap()).await.unwrap();
        storage.update(&Metric::gauge("Alloc", 2.5).unwrap()).await.unwrap();

        assert_eq!(
            storage.get_value(MetricKind::Gauge, "Alloc").await.unwrap(),
            "2.5"
        );
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL server"]
    async fn counter_accumulates_server_side() {
        let storage = test_storage().await;
        storage.update(&Metric::counter("hits", 10).unwrap()).await.unwrap();
        storage.update(&Metric::counter("hits", 15).unwrap()).await.unwrap();

        assert_eq!(
            storage.get_value(MetricKind::Counter, "hits").await.unwrap(),
            "25"
        );
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL server"]
    async fn batch_commits_atomically() {
        let storage = test_storage().await;
        let batch = [
            Metric::gauge("Alloc", 3.0).unwrap(),
            Metric::counter("PollCount", 5).unwrap(),
        ];
        let applied = storage.update_batch(&batch).await.unwrap();

        assert_eq!(applied["Alloc"], MetricEnvelope::gauge("Alloc", 3.0));
        assert_eq!(applied["PollCount"], MetricEnvelope::counter("PollCount", 5));
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL server"]
    async fn missing_metric_is_not_found() {
        let storage = test_storage().await;
        let err = storage.get(MetricKind::Gauge, "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
