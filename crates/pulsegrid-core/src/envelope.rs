//! JSON wire envelope shared by both sides of the pipeline.
//!
//! The `type` field stays a raw string so that an unknown kind surfaces
//! as `InvalidMetricType` during validation instead of a serde error.

use serde::{Deserialize, Serialize};

use crate::error::MetricError;
use crate::model::{Metric, MetricValue};

/// Wire representation of a single metric update or read-back.
///
/// Exactly one of `delta`/`value` is populated depending on `kind`:
/// counters carry `delta`, gauges carry `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl MetricEnvelope {
    /// Envelope for a stored gauge value.
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: "gauge".to_string(),
            delta: None,
            value: Some(value),
        }
    }

    /// Envelope for a stored counter total (or an outgoing delta).
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: "counter".to_string(),
            delta: Some(delta),
            value: None,
        }
    }
}

impl From<&Metric> for MetricEnvelope {
    fn from(metric: &Metric) -> Self {
        match metric.value() {
            MetricValue::Gauge(v) => MetricEnvelope::gauge(metric.name(), v),
            MetricValue::Counter(d) => MetricEnvelope::counter(metric.name(), d),
        }
    }
}

impl TryFrom<&MetricEnvelope> for Metric {
    type Error = MetricError;

    fn try_from(envelope: &MetricEnvelope) -> Result<Self, Self::Error> {
        if envelope.id.is_empty() {
            return Err(MetricError::InvalidMetricId);
        }
        match envelope.kind.as_str() {
            "gauge" => {
                let value = envelope.value.ok_or(MetricError::InvalidMetricDelta)?;
                Metric::gauge(envelope.id.clone(), value)
            }
            "counter" => {
                let delta = envelope.delta.ok_or(MetricError::InvalidMetricDelta)?;
                Metric::counter(envelope.id.clone(), delta)
            }
            _ => Err(MetricError::InvalidMetricType),
        }
    }
}
