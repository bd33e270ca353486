//! The closed error-kind taxonomy surfaced by every public Service operation.
//!
//! Internal plumbing (config file parsing, CLI argument glue) is still free
//! to bubble up `anyhow::Error` for convenience, but every method reachable
//! from the external interface returns `Result<T, ErrorKind>` so a caller
//! can match on a fixed vocabulary instead of string-sniffing an error
//! message.

use thiserror::Error;

/// Closed set of error kinds a caller of the Service's public API can see.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// An unrecoverable per-call database error. The triggering transaction,
    /// if any, has already been rolled back.
    #[error("sqlite error: {0}")]
    SqliteError(String),

    /// Configuration failed validation at load time. Fatal; the daemon does
    /// not start.
    #[error("malformed configuration: {0}")]
    MalformedConfiguration(String),

    /// The configured embedding backend could not be used for this call.
    ///
    /// This variant exists for completeness and diagnostics only — per the
    /// embedding contract (spec §4.4), callers never actually observe it:
    /// the runtime falls back to the deterministic hash embedder instead of
    /// propagating this error.
    #[error("embedding runtime unavailable")]
    UnavailableEmbeddingRuntime,

    /// A bearer token presented to an authenticated RPC did not match
    /// `configuration.authToken`.
    #[error("unauthorized")]
    Unauthorized,

    /// `createContextPack` referenced a suggestion ID that is not present
    /// in the cache of the most recent suggestions for that exact query.
    #[error("missing suggestion: {0}")]
    MissingSuggestion(String),

    /// A general guard for API misuse (e.g. calling `stop()` before
    /// `start()`, or an out-of-range parameter that validation should have
    /// caught earlier).
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl From<sqlx::Error> for ErrorKind {
    fn from(e: sqlx::Error) -> Self {
        ErrorKind::SqliteError(e.to_string())
    }
}

impl From<std::io::Error> for ErrorKind {
    fn from(e: std::io::Error) -> Self {
        ErrorKind::InvalidState(e.to_string())
    }
}

impl From<serde_json::Error> for ErrorKind {
    fn from(e: serde_json::Error) -> Self {
        ErrorKind::InvalidState(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ErrorKind>;
