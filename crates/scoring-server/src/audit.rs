//! Shared audit log.

use scoring_core::Outcome;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

/// Append-only, line-oriented log shared by every connection handler.
///
/// Each call writes one complete line while holding the internal lock, so
/// lines from concurrent handlers never interleave. Writes block; async
/// callers run them on the blocking pool.
pub struct AuditLog {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl AuditLog {
    /// Open `path` for appending, creating it if needed. `-` logs to stdout.
    pub fn open(path: &str) -> io::Result<Self> {
        if path == "-" {
            return Ok(Self::from_writer(io::stdout()));
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::from_writer(file))
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    pub fn startup(&self, bind_addr: &str) -> io::Result<()> {
        self.line(&format!(
            "Initializing scoring server: bound to \"{}\"",
            bind_addr
        ))
    }

    /// Record how one connection ended.
    pub fn connection(&self, peer: &str, outcome: &Outcome) -> io::Result<()> {
        self.line(&format!("Incoming connection from {}: {}", peer, outcome))
    }

    fn line(&self, message: &str) -> io::Result<()> {
        let mut line = message.replace(['\r', '\n'], " ");
        line.push('\n');

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(line.as_bytes())?;
        writer.flush()
    }
}
