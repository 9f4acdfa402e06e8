//! Append-only storage for accepted scoring events.
//!
//! Handlers talk to an [`EventStore`]; the server wires in [`SqliteStore`].
//! Every append is one independent parameter-bound insert, so a store handle
//! can be shared by any number of concurrent connections.

pub mod error;
pub mod sqlite;

use async_trait::async_trait;
use scoring_core::ScoringEvent;

pub use error::StoreError;
pub use sqlite::SqliteStore;

/// Result type for scoring-store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// A scoring event plus the address of the host that reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub service: String,
    pub point_change: i64,
    pub reason: String,
    /// Remote `ip:port` of the submitting connection.
    pub reporting_host: String,
}

impl StoredRecord {
    pub fn new(event: ScoringEvent, reporting_host: impl Into<String>) -> Self {
        Self {
            service: event.service,
            point_change: event.point_change,
            reason: event.reason,
            reporting_host: reporting_host.into(),
        }
    }
}

/// Durable, append-only sink for accepted events.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append one record to `table`. Failures are never retried.
    async fn append(&self, table: &str, record: &StoredRecord) -> Result<()>;
}
