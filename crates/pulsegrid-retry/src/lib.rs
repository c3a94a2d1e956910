//! pulsegrid-retry — decides which failures are worth retrying and
//! drives the fixed backoff schedule around them.
//!
//! Classification is a pure function of the error: connection-level
//! trouble (refused, reset, premature EOF, a fixed allow-list of
//! PostgreSQL connection SQLSTATEs) is transient; everything else —
//! including well-formed application rejections — is terminal and
//! returned immediately.

pub mod classify;

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

pub use classify::{Retriable, io_error_in_chain};

/// Escalating delays applied between retry attempts.
pub const BACKOFF_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
];

/// Run `action`, retrying transient failures after 1s, 3s, and 5s.
///
/// Terminal failures return at once. When every retry is exhausted, the
/// last observed error is returned. Sleeping goes through the tokio
/// clock, so tests drive this under paused virtual time.
pub async fn with_backoff<T, E, F, Fut>(mut action: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retriable + Display,
{
    let mut last_err = match action().await {
        Ok(value) => return Ok(value),
        Err(err) if !err.is_retriable() => return Err(err),
        Err(err) => err,
    };

    for (attempt, delay) in BACKOFF_DELAYS.iter().enumerate() {
        warn!(
            attempt = attempt + 1,
            delay_secs = delay.as_secs(),
            error = %last_err,
            "transient failure, backing off"
        );
        tokio::time::sleep(*delay).await;

        last_err = match action().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retriable() => return Err(err),
            Err(err) => err,
        };
    }

    Err(last_err)
}
