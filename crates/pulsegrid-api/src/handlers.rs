//! Collector route handlers.
//!
//! Validation happens entirely at this boundary: a batch only reaches
//! the backend once every envelope in it has parsed, so a single bad
//! entry rejects the whole request with nothing applied.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};

use pulsegrid_core::{Metric, MetricEnvelope, MetricError, MetricKind};
use pulsegrid_storage::StorageError;

use crate::AppState;

fn metric_error_response(err: MetricError) -> Response {
    let status = match err {
        MetricError::MetricNotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, err.to_string()).into_response()
}

fn storage_error_response(err: StorageError) -> Response {
    match err {
        StorageError::Metric(e) => metric_error_response(e),
        StorageError::Database(_) | StorageError::Snapshot(_) => {
            tracing::error!(error = %err, "storage failure");
            (StatusCode::INTERNAL_SERVER_ERROR, "storage failure").into_response()
        }
    }
}

fn require_json(headers: &HeaderMap) -> Result<(), Response> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if content_type.starts_with("application/json") {
        Ok(())
    } else {
        Err((StatusCode::BAD_REQUEST, "invalid content type").into_response())
    }
}

/// POST /update/{type}/{name}/{value}
pub async fn update_path(
    State(state): State<AppState>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> Response {
    if name.is_empty() {
        return (StatusCode::NOT_FOUND, "metric name not provided").into_response();
    }
    let metric = match Metric::parse(&kind, &name, &value) {
        Ok(metric) => metric,
        Err(e) => return metric_error_response(e),
    };
    match state.storage.update(&metric).await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(e) => storage_error_response(e),
    }
}

/// POST /update/ — body is a single JSON envelope, echoed back on success.
pub async fn update_json(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(response) = require_json(&headers) {
        return response;
    }
    let Ok(envelope) = serde_json::from_slice::<MetricEnvelope>(&body) else {
        return metric_error_response(MetricError::InvalidJson);
    };
    let metric = match Metric::try_from(&envelope) {
        Ok(metric) => metric,
        Err(e) => return metric_error_response(e),
    };
    match state.storage.update(&metric).await {
        Ok(()) => (StatusCode::OK, Json(envelope)).into_response(),
        Err(e) => storage_error_response(e),
    }
}

/// POST /updates/ — body is a JSON array applied as one atomic batch.
/// The response maps each metric id to its post-update envelope.
pub async fn update_batch_json(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(response) = require_json(&headers) {
        return response;
    }
    let Ok(envelopes) = serde_json::from_slice::<Vec<MetricEnvelope>>(&body) else {
        return metric_error_response(MetricError::InvalidJson);
    };
    if envelopes.is_empty() {
        return (StatusCode::OK, Json(serde_json::Map::new())).into_response();
    }

    let mut batch = Vec::with_capacity(envelopes.len());
    for envelope in &envelopes {
        match Metric::try_from(envelope) {
            Ok(metric) => batch.push(metric),
            Err(e) => return metric_error_response(e),
        }
    }

    match state.storage.update_batch(&batch).await {
        Ok(applied) => (StatusCode::OK, Json(applied)).into_response(),
        Err(e) => storage_error_response(e),
    }
}

/// GET /value/{type}/{name} — plain-text current value.
pub async fn value_path(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Response {
    if name.is_empty() {
        return (StatusCode::NOT_FOUND, "metric name not provided").into_response();
    }
    let kind: MetricKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => return metric_error_response(e),
    };
    match state.storage.get_value(kind, &name).await {
        Ok(value) => (StatusCode::OK, value).into_response(),
        Err(e) => storage_error_response(e),
    }
}

/// POST /value/ — body is `{id, type}`; responds with the full envelope.
pub async fn value_json(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(response) = require_json(&headers) {
        return response;
    }
    let Ok(query) = serde_json::from_slice::<MetricEnvelope>(&body) else {
        return metric_error_response(MetricError::InvalidJson);
    };
    if query.kind.is_empty() {
        return metric_error_response(MetricError::InvalidMetricType);
    }
    let kind: MetricKind = match query.kind.parse() {
        Ok(kind) => kind,
        Err(e) => return metric_error_response(e),
    };
    match state.storage.get(kind, &query.id).await {
        Ok(metric) => (StatusCode::OK, Json(MetricEnvelope::from(&metric))).into_response(),
        Err(e) => storage_error_response(e),
    }
}

/// GET /ping — storage liveness probe.
pub async fn ping(State(state): State<AppState>) -> Response {
    match state.storage.ping().await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(e) => storage_error_response(e),
    }
}
