//! Metric domain model.
//!
//! A metric is either a gauge (last write wins) or a counter (deltas
//! accumulate). The kind set is closed, so every consumer matches
//! exhaustively instead of dispatching through a trait object.

use std::fmt;
use std::str::FromStr;

use crate::error::MetricError;

/// The two metric kinds carried over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    /// Canonical lowercase name used in URLs, envelopes, and SQL rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            _ => Err(MetricError::InvalidMetricType),
        }
    }
}

/// A metric observation: overwrite semantics for gauges, additive
/// semantics for counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

/// A named metric observation, validated at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    name: String,
    value: MetricValue,
}

impl Metric {
    /// Build a gauge metric.
    pub fn gauge(name: impl Into<String>, value: f64) -> Result<Self, MetricError> {
        Self::new(name.into(), MetricValue::Gauge(value))
    }

    /// Build a counter metric carrying a delta.
    pub fn counter(name: impl Into<String>, delta: i64) -> Result<Self, MetricError> {
        Self::new(name.into(), MetricValue::Counter(delta))
    }

    /// Parse a metric from its textual form (kind, name, raw value), as
    /// received on the path-encoded update endpoint.
    pub fn parse(kind: &str, name: &str, raw_value: &str) -> Result<Self, MetricError> {
        let value = match MetricKind::from_str(kind)? {
            MetricKind::Gauge => {
                let v: f64 = raw_value
                    .parse()
                    .map_err(|_| MetricError::InvalidMetricValue)?;
                MetricValue::Gauge(v)
            }
            MetricKind::Counter => {
                let d: i64 = raw_value
                    .parse()
                    .map_err(|_| MetricError::InvalidMetricValue)?;
                MetricValue::Counter(d)
            }
        };
        Self::new(name.to_string(), value)
    }

    fn new(name: String, value: MetricValue) -> Result<Self, MetricError> {
        if name.is_empty() {
            return Err(MetricError::InvalidMetricId);
        }
        Ok(Self { name, value })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> MetricValue {
        self.value
    }

    pub fn kind(&self) -> MetricKind {
        match self.value {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }
}

/// Render a gauge for plain-text read-back: fixed three decimals with
/// trailing zeros (and a bare trailing dot) trimmed.
pub fn format_gauge(value: f64) -> String {
    let rendered = format!("{value:.3}");
    rendered
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}
