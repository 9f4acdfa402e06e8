//! One connection, one request: read, decode, validate, persist, respond.

use crate::audit::AuditLog;
use scoring_core::{classify, decode, Outcome};
use scoring_store::{EventStore, StoredRecord};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Resources shared by every connection handler.
#[derive(Clone)]
pub struct HandlerContext {
    pub store: Arc<dyn EventStore>,
    pub log: Arc<AuditLog>,
    pub table: Arc<str>,
}

/// Run the request pipeline for one accepted socket.
///
/// Exactly one response line goes to the client and exactly one line to the
/// audit log, whatever happens. The socket is consumed and closed on return.
pub async fn handle_connection<S>(mut socket: S, peer: SocketAddr, ctx: &HandlerContext) -> Outcome
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let peer = peer.to_string();
    let outcome = process(&mut socket, &peer, ctx).await;

    if let Err(err) = respond(&mut socket, &outcome).await {
        tracing::warn!("Failed to send response to {}: {}", peer, err);
    }
    record(ctx, peer, &outcome).await;

    outcome
}

// File writes go to the blocking pool so a slow disk cannot stall workers.
async fn record(ctx: &HandlerContext, peer: String, outcome: &Outcome) {
    let log = Arc::clone(&ctx.log);
    let entry = outcome.clone();
    let task_peer = peer.clone();
    match tokio::task::spawn_blocking(move || log.connection(&task_peer, &entry)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::error!("Failed to write audit log for {}: {}", peer, err),
        Err(err) => tracing::error!("Audit log task for {} failed: {}", peer, err),
    }
}

async fn process<S>(socket: &mut S, peer: &str, ctx: &HandlerContext) -> Outcome
where
    S: AsyncRead + Unpin,
{
    // The client signals the end of its request by closing its write side.
    let mut body = Vec::new();
    if let Err(err) = socket.read_to_end(&mut body).await {
        tracing::warn!("Read from {} failed: {}", peer, err);
        return Outcome::ServerError;
    }

    let event = match decode(&body) {
        Ok(event) => event,
        Err(err) => {
            tracing::debug!("Undecodable request from {}: {}", peer, err);
            return Outcome::ClientError(err);
        }
    };

    let kind = match classify(event.request_kind.as_deref()) {
        Ok(kind) => kind,
        Err(err) => {
            tracing::debug!(
                "Request from {} has unknown type {:?}",
                peer,
                event.request_kind
            );
            return Outcome::ClientError(err);
        }
    };

    if !kind.is_mutating() {
        return Outcome::Success;
    }

    let record = StoredRecord::new(event, peer);
    match ctx.store.append(&ctx.table, &record).await {
        Ok(()) => {
            tracing::info!(
                "{} point(s) for {} from {}",
                record.point_change,
                record.service,
                peer
            );
            Outcome::Success
        }
        Err(err) => {
            tracing::error!("Failed to store event from {}: {}", peer, err);
            Outcome::DbError(err.to_string())
        }
    }
}

async fn respond<S>(socket: &mut S, outcome: &Outcome) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    socket.write_all(outcome.response_line().as_bytes()).await?;
    socket.flush().await?;
    socket.shutdown().await
}
