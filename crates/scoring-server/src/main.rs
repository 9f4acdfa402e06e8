mod audit;
mod handler;
mod server;
#[cfg(test)]
mod test_support;

use clap::Parser;
use scoring_core::{default_config_path, ConfigError, FileConfig, ServerConfig};
use server::run_server;
use std::path::PathBuf;
use tokio::runtime::Builder;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "scoring-server",
    about = "scoring-server - Score ingestion endpoint for cyber-defense competitions"
)]
struct Args {
    /// Configuration file (defaults to the platform location)
    #[arg(long = "config", short = 'c', value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long = "bind", short = 'b', value_name = "ADDR")]
    bind: Option<String>,
    /// Audit log file, `-` for stdout
    #[arg(long = "log-file", short = 'l', value_name = "PATH")]
    log_file: Option<String>,
    #[arg(long = "db", value_name = "PATH")]
    db: Option<String>,
    #[arg(long = "table")]
    table: Option<String>,
    #[arg(long = "max-connections")]
    max_connections: Option<usize>,
}

impl Args {
    fn overrides(&self) -> FileConfig {
        FileConfig {
            bind_addr: self.bind.clone(),
            log_file: self.log_file.clone(),
            score_db_file: self.db.clone(),
            score_table: self.table.clone(),
            max_connections: self.max_connections,
        }
    }
}

fn main() {
    init_logging();
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|err| {
        tracing::error!("Configuration error: {}", err);
        std::process::exit(2);
    });

    let runtime = match Builder::new_multi_thread().enable_io().enable_time().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!("Failed to build Tokio runtime: {}", err);
            std::process::exit(1);
        }
    };
    if let Err(err) = runtime.block_on(run_server(&config)) {
        tracing::error!("Server error: {}", err);
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .try_init();
}

fn load_config(args: &Args) -> Result<ServerConfig, ConfigError> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    FileConfig::load(&path)?.merge(args.overrides()).validate()
}
