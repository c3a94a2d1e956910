//! pulsegrid-repository — PostgreSQL-backed metric storage.
//!
//! Implements the same contract as the in-memory backend with a single
//! upsert per metric. Accumulation happens server-side in the conflict
//! expression, so concurrent upserts to the same counter row serialize
//! on the database's row lock and never lose a delta. Batches run
//! inside one transaction: any failure rolls the whole batch back.

pub mod postgres;

pub use postgres::PgMetricStorage;
