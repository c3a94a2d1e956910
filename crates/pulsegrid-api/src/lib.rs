//! pulsegrid-api — the collector's HTTP boundary.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/update/{type}/{name}/{value}` | Path-encoded single update |
//! | POST | `/update/` | Single JSON envelope update |
//! | POST | `/updates/` | Atomic JSON batch update |
//! | GET | `/value/{type}/{name}` | Plain-text current value |
//! | POST | `/value/` | Envelope lookup by `{id, type}` |
//! | GET | `/ping` | Storage liveness |
//!
//! Requests declaring `Content-Encoding: gzip` are decompressed before
//! routing; when a signing key is configured, request bodies must carry
//! a valid `HashSHA256` signature and responses are signed in turn.

pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};

use pulsegrid_storage::MetricStorage;

/// Shared state for all handlers: the backend picked at boot and the
/// optional pre-shared signing key.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn MetricStorage>,
    pub signing_key: Option<String>,
}

/// Build the collector router with its middleware stack.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/update/{kind}/{name}/{value}", post(handlers::update_path))
        .route("/update/", post(handlers::update_json))
        .route("/updates/", post(handlers::update_batch_json))
        .route("/value/{kind}/{name}", get(handlers::value_path))
        .route("/value/", post(handlers::value_json))
        .route("/ping", get(handlers::ping))
        .layer(from_fn_with_state(state.clone(), middleware::verify_signature))
        // Added last so decompression runs before signature checks: the
        // signature covers the uncompressed payload.
        .layer(from_fn(middleware::decompress_request))
        .with_state(state)
}
