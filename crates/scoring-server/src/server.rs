use scoring_core::ServerConfig;
use scoring_store::SqliteStore;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::time::sleep;

use crate::audit::AuditLog;
use crate::handler::{handle_connection, HandlerContext};

// Pause after a failed accept so a persistent error cannot spin the loop.
const ACCEPT_ERROR_BACKOFF_MS: u64 = 10;

#[derive(Debug)]
pub struct ServerError {
    message: String,
}

impl ServerError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ServerError {}

/// Open the store, bind the listener and serve until the process exits.
pub async fn run_server(config: &ServerConfig) -> Result<(), ServerError> {
    let store = SqliteStore::open(Path::new(&config.score_db_file)).map_err(|err| {
        ServerError::new(format!(
            "Cannot open score database {}: {}",
            config.score_db_file, err
        ))
    })?;
    store
        .ensure_table(&config.score_table)
        .await
        .map_err(|err| {
            ServerError::new(format!(
                "Cannot prepare table {}: {}",
                config.score_table, err
            ))
        })?;

    let listener = bind(&config.bind_addr).await?;

    let log = AuditLog::open(&config.log_file).map_err(|err| {
        ServerError::new(format!("Cannot open log file {}: {}", config.log_file, err))
    })?;
    log.startup(&config.bind_addr).map_err(map_io)?;

    let ctx = HandlerContext {
        store: Arc::new(store),
        log: Arc::new(log),
        table: Arc::from(config.score_table.as_str()),
    };
    serve(listener, ctx, config.max_connections).await;
    Ok(())
}

/// Bind the TCP endpoint. There is no retry or fallback port.
pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|err| ServerError::new(format!("Cannot bind {}: {}", addr, err)))?;
    match listener.local_addr() {
        Ok(local) => tracing::info!("Listening on {}", local),
        Err(_) => tracing::info!("Listening on {}", addr),
    }
    Ok(listener)
}

/// Accept connections forever, one spawned handler per connection.
///
/// With `max_connections` set, accepting waits for a free slot; otherwise
/// the number of in-flight handlers is unbounded.
pub async fn serve(listener: TcpListener, ctx: HandlerContext, max_connections: Option<usize>) {
    let slots = max_connections.map(|limit| Arc::new(Semaphore::new(limit)));

    loop {
        let permit = match &slots {
            Some(slots) => Arc::clone(slots).acquire_owned().await.ok(),
            None => None,
        };

        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                tracing::warn!("Accept failed: {}", err);
                sleep(Duration::from_millis(ACCEPT_ERROR_BACKOFF_MS)).await;
                continue;
            }
        };

        let ctx = ctx.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let outcome = handle_connection(socket, peer, &ctx).await;
            tracing::debug!("Connection from {} closed: {}", peer, outcome);
        });
    }
}

fn map_io(err: std::io::Error) -> ServerError {
    ServerError::new(err.to_string())
}
