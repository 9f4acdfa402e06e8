//! Submit and load-test client for the scoring server.
//!
//! `send` delivers one event the way a scoring agent on a competitor host
//! does; `load` opens many connections at once to exercise the server's
//! concurrent handling.

mod client;

use clap::{Parser, Subcommand};
use scoring_core::ScoringEvent;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Scoring server client and load generator.
#[derive(Parser, Debug)]
#[command(name = "scoring-bench", about = "Scoring server client and load generator")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one scoring event and print the reply
    Send {
        /// Server address (host:port)
        #[arg(long)]
        connect: SocketAddr,

        #[command(flatten)]
        event: EventArgs,

        /// Socket timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },

    /// Submit the same event over many simultaneous connections
    Load {
        /// Server address (host:port)
        #[arg(long)]
        connect: SocketAddr,

        /// Number of concurrent connections
        #[arg(long, default_value = "100")]
        connections: usize,

        #[command(flatten)]
        event: EventArgs,

        /// Socket timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },
}

#[derive(clap::Args, Debug)]
struct EventArgs {
    /// Service or control the change applies to
    #[arg(long)]
    service: String,

    /// Signed point change
    #[arg(long, allow_hyphen_values = true)]
    points: i64,

    /// Why the score changed
    #[arg(long)]
    reason: String,

    /// Request type sent as `reqtype`; omitted when not given
    #[arg(long)]
    reqtype: Option<String>,
}

impl EventArgs {
    fn to_event(&self) -> ScoringEvent {
        let event = ScoringEvent::new(self.service.clone(), self.points, self.reason.clone());
        match &self.reqtype {
            Some(kind) => event.with_request_kind(kind.clone()),
            None => event,
        }
    }
}

fn summarize(label: &str, summary: &client::LoadSummary) {
    println!(
        "{}: total={} success={} failure={} secs={:.3} req/s={:.1}",
        label,
        summary.total,
        summary.success,
        summary.failure,
        summary.secs,
        summary.requests_per_sec()
    );
}

#[tokio::main]
async fn main() -> Result<(), client::BoxError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let args = Args::parse();

    match args.command {
        Command::Send {
            connect,
            event,
            timeout,
        } => {
            let reply =
                client::submit(connect, &event.to_event(), Duration::from_secs(timeout)).await?;
            println!("{}", reply);
            if reply != "success" {
                std::process::exit(1);
            }
        }
        Command::Load {
            connect,
            connections,
            event,
            timeout,
        } => {
            let summary = client::run_load(
                connect,
                &event.to_event(),
                connections,
                Duration::from_secs(timeout),
            )
            .await;
            summarize("load", &summary);
            if summary.failure > 0 {
                return Err(format!("{} of {} requests failed", summary.failure, summary.total).into());
            }
        }
    }

    Ok(())
}
