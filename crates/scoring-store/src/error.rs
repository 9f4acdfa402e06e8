//! Error types for scoring-store.

use thiserror::Error;

/// Errors returned by an [`EventStore`](crate::EventStore).
///
/// The display text is what the client sees after `failure: db error:`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failure reported by the database itself.
    #[error("{0}")]
    Database(String),

    /// Table name that cannot be used as a SQL identifier.
    #[error("invalid table name: {0}")]
    InvalidTable(String),

    /// The blocking database task did not complete.
    #[error("store task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Task(err.to_string())
    }
}
