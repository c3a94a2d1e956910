//! pulsegrid-core — the shared vocabulary of the PulseGrid pipeline.
//!
//! Both sides of the wire depend on this crate: the agent uses it to
//! build, encode, and sign outgoing batches; the server uses it to
//! validate inbound envelopes and format read-back values.
//!
//! # Architecture
//!
//! ```text
//! Metric / MetricValue     closed sum type over gauge and counter
//! MetricEnvelope           JSON wire format {id, type, value?, delta?}
//! codec                    gzip compression for request payloads
//! signing                  hex HMAC-SHA256 over uncompressed payloads
//! MetricError              validation and lookup error taxonomy
//! ```

pub mod codec;
pub mod envelope;
pub mod error;
pub mod model;
pub mod signing;

pub use envelope::MetricEnvelope;
pub use error::MetricError;
pub use model::{Metric, MetricKind, MetricValue, format_gauge};
pub use signing::HASH_HEADER;
