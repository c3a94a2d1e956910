//! Transient-versus-terminal classification for transport and database
//! failures.

use std::error::Error as StdError;

/// PostgreSQL SQLSTATEs that signal connection-level trouble: class 08
/// (connection exception, does-not-exist, failure, unable-to-establish,
/// rejected-establishment) plus transaction-resolution-unknown.
const RETRIABLE_SQLSTATES: [&str; 6] = ["08000", "08003", "08006", "08001", "08004", "08007"];

/// Classifies an error as transient (worth a backoff retry) or terminal.
pub trait Retriable {
    fn is_retriable(&self) -> bool;
}

/// Walk an error's source chain looking for an underlying I/O error —
/// the shape connection resets and premature EOFs arrive in.
pub fn io_error_in_chain(err: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if e.is::<std::io::Error>() {
            return true;
        }
        current = e.source();
    }
    false
}

impl Retriable for reqwest::Error {
    fn is_retriable(&self) -> bool {
        // Failures to connect, timeouts, and streams cut mid-body are
        // transient. A response that arrived intact is not.
        if self.is_connect() || self.is_timeout() || self.is_body() {
            return true;
        }
        io_error_in_chain(self)
    }
}

impl Retriable for sqlx::Error {
    fn is_retriable(&self) -> bool {
        match self {
            sqlx::Error::Io(_) => true,
            sqlx::Error::PoolTimedOut => true,
            sqlx::Error::Database(db) => db
                .code()
                .is_some_and(|code| RETRIABLE_SQLSTATES.contains(&code.as_ref())),
            _ => false,
        }
    }
}
