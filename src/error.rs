//! Main crate errors

/// Top-level outcome of consuming a query run.
///
/// Per-peer failures never show up here, they are delivered as
/// [QueryEvent::QueryError](crate::QueryEvent::QueryError) events instead.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// `run()` was called before `start()` or after `stop()`.
    #[error("query manager is not started")]
    NotStarted,

    /// The caller's cancellation token fired, or the consumer stopped
    /// pulling the sequence early.
    #[error("query was cancelled")]
    Cancelled,

    /// Indicates that an Id was built from a slice of the wrong length.
    #[error("Invalid Id size, expected 20 bytes, got {0}")]
    InvalidIdSize(usize),
}

/// Failure of a single peer's query.
///
/// Carried inside a [QueryEvent::QueryError](crate::QueryEvent::QueryError)
/// event; it abandons only that peer's branch, sibling queries and paths
/// keep going.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryFuncError {
    /// The query did not settle within the per-invocation timeout.
    #[error("peer query timed out")]
    Timeout,

    /// The connection manager reported the peer as not dialable.
    #[error("peer is not dialable")]
    Undialable,

    /// The query capability failed or panicked.
    #[error("{0}")]
    Other(String),
}
