//! SQLite-backed event store.

use crate::{EventStore, Result, StoreError, StoredRecord};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use scoring_core::is_sql_identifier;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Score table backed by a single SQLite connection.
///
/// Statements run on the blocking pool; the connection mutex makes each
/// insert an isolated unit.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish()
    }
}

impl SqliteStore {
    /// Opens or creates the score database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        tracing::info!("Score database opened at {}", path.display());
        Ok(Self::from_connection(conn))
    }

    /// Opens a private in-memory database.
    pub fn open_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Creates `table` with the score columns if it does not exist yet.
    pub async fn ensure_table(&self, table: &str) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                service TEXT NOT NULL,
                point INTEGER NOT NULL,
                reason TEXT NOT NULL,
                host TEXT NOT NULL
            )",
            quote_table(table)?
        );
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute_batch(&sql)?;
            Ok::<(), StoreError>(())
        })
        .await?
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn append(&self, table: &str, record: &StoredRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (service, point, reason, host) VALUES (?1, ?2, ?3, ?4)",
            quote_table(table)?
        );
        let record = record.clone();
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                &sql,
                params![
                    record.service,
                    record.point_change,
                    record.reason,
                    record.reporting_host,
                ],
            )?;
            tracing::debug!(
                "Stored {} point(s) for {} from {}",
                record.point_change,
                record.service,
                record.reporting_host
            );
            Ok::<(), StoreError>(())
        })
        .await?
    }
}

// Table names cannot be bound, so only plain identifiers are let through.
fn quote_table(table: &str) -> Result<String> {
    if !is_sql_identifier(table) {
        return Err(StoreError::InvalidTable(table.to_string()));
    }
    Ok(format!("\"{}\"", table))
}
