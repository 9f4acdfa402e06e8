//! Client side of the one-request-per-connection protocol.

use scoring_core::ScoringEvent;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Send one event and return the server's reply without its newline.
pub async fn submit(
    connect: SocketAddr,
    event: &ScoringEvent,
    socket_timeout: Duration,
) -> Result<String, BoxError> {
    let body = event.encode()?;

    let mut socket = timeout(socket_timeout, TcpStream::connect(connect)).await??;
    socket.set_nodelay(true)?;

    match timeout(socket_timeout, socket.write_all(&body)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err("write timeout".into()),
    }
    // The server reads until EOF, so the write side must be closed.
    socket.shutdown().await?;

    let mut response = String::new();
    match timeout(socket_timeout, socket.read_to_string(&mut response)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err("read timeout".into()),
    }

    Ok(response.trim_end_matches(['\r', '\n']).to_string())
}

#[derive(Debug, Default)]
pub struct LoadSummary {
    pub total: usize,
    pub success: usize,
    pub failure: usize,
    pub secs: f64,
}

impl LoadSummary {
    pub fn requests_per_sec(&self) -> f64 {
        if self.secs > 0.0 {
            self.total as f64 / self.secs
        } else {
            0.0
        }
    }
}

/// Submit `event` over `connections` simultaneous connections.
pub async fn run_load(
    connect: SocketAddr,
    event: &ScoringEvent,
    connections: usize,
    socket_timeout: Duration,
) -> LoadSummary {
    let start = Instant::now();

    let mut tasks = Vec::with_capacity(connections);
    for _ in 0..connections {
        let event = event.clone();
        tasks.push(tokio::spawn(async move {
            submit(connect, &event, socket_timeout).await
        }));
    }

    let mut summary = LoadSummary::default();
    for task in tasks {
        summary.total += 1;
        match task.await {
            Ok(Ok(line)) if line == "success" => summary.success += 1,
            Ok(Ok(line)) => {
                tracing::warn!("Request rejected: {}", line);
                summary.failure += 1;
            }
            Ok(Err(e)) => {
                tracing::warn!("Request failed: {}", e);
                summary.failure += 1;
            }
            Err(e) => {
                tracing::warn!("Client task failed: {}", e);
                summary.failure += 1;
            }
        }
    }
    summary.secs = start.elapsed().as_secs_f64();
    summary
}
