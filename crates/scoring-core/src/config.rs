//! Server configuration file schema.
//!
//! The file is a JSON object using the key casing of the original scoring
//! engine (`BindAddr`, `LogFile`, ...). Keys this version does not know about
//! are ignored so older files that still carry database credentials load.

use serde::Deserialize;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::is_sql_identifier;

pub const DEFAULT_TABLE: &str = "scores";

#[derive(Debug, Clone)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Raw configuration as read from disk or assembled from CLI overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    #[serde(rename = "BindAddr")]
    pub bind_addr: Option<String>,
    #[serde(rename = "LogFile")]
    pub log_file: Option<String>,
    #[serde(rename = "ScoreDBFile")]
    pub score_db_file: Option<String>,
    #[serde(rename = "ScoreTable")]
    pub score_table: Option<String>,
    #[serde(rename = "MaxConnections")]
    pub max_connections: Option<usize>,
}

/// Validated settings the server runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Audit log path; `-` writes to stdout.
    pub log_file: String,
    pub score_db_file: String,
    pub score_table: String,
    /// Upper bound on concurrently handled connections. `None` is unbounded.
    pub max_connections: Option<usize>,
}

struct RequiredField {
    name: &'static str,
    value: fn(&FileConfig) -> Option<&str>,
}

const REQUIRED_FIELDS: &[RequiredField] = &[
    RequiredField {
        name: "BindAddr",
        value: bind_addr_field,
    },
    RequiredField {
        name: "LogFile",
        value: log_file_field,
    },
    RequiredField {
        name: "ScoreDBFile",
        value: score_db_file_field,
    },
];

fn bind_addr_field(config: &FileConfig) -> Option<&str> {
    config.bind_addr.as_deref()
}

fn log_file_field(config: &FileConfig) -> Option<&str> {
    config.log_file.as_deref()
}

fn score_db_file_field(config: &FileConfig) -> Option<&str> {
    config.score_db_file.as_deref()
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path).map_err(|err| {
            ConfigError::new(format!(
                "Cannot open configuration file {}: {}",
                path.display(),
                err
            ))
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|err| {
            ConfigError::new(format!(
                "Cannot parse configuration file {}: {}",
                path.display(),
                err
            ))
        })
    }

    /// Overlay `overrides` on top of `self`; set fields in `overrides` win.
    pub fn merge(self, overrides: FileConfig) -> FileConfig {
        FileConfig {
            bind_addr: overrides.bind_addr.or(self.bind_addr),
            log_file: overrides.log_file.or(self.log_file),
            score_db_file: overrides.score_db_file.or(self.score_db_file),
            score_table: overrides.score_table.or(self.score_table),
            max_connections: overrides.max_connections.or(self.max_connections),
        }
    }

    /// Check every field against its rule.
    ///
    /// All missing required fields are reported together.
    pub fn validate(self) -> Result<ServerConfig, ConfigError> {
        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .filter(|field| is_blank((field.value)(&self)))
            .map(|field| field.name)
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::new(format!(
                "Invalid configuration: missing required field(s): {}",
                missing.join(", ")
            )));
        }

        let bind_addr = normalize_bind_addr(self.bind_addr.as_deref().unwrap_or_default())?;

        let score_table = match self.score_table {
            Some(table) if !table.trim().is_empty() => table.trim().to_string(),
            _ => DEFAULT_TABLE.to_string(),
        };
        if !is_sql_identifier(&score_table) {
            return Err(ConfigError::new(format!(
                "Invalid configuration: ScoreTable must be a plain SQL identifier: {}",
                score_table
            )));
        }

        if self.max_connections == Some(0) {
            return Err(ConfigError::new(
                "Invalid configuration: MaxConnections must be greater than zero",
            ));
        }

        Ok(ServerConfig {
            bind_addr,
            log_file: self.log_file.unwrap_or_default().trim().to_string(),
            score_db_file: self.score_db_file.unwrap_or_default().trim().to_string(),
            score_table,
            max_connections: self.max_connections,
        })
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |value| value.trim().is_empty())
}

/// Where the configuration file lives when `--config` is not given.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    if cfg!(target_os = "windows") {
        Err(ConfigError::new("No Windows support at this time"))
    } else if cfg!(target_os = "freebsd") {
        Ok(PathBuf::from("/usr/local/etc/linux-scoring-engine.json"))
    } else if cfg!(target_os = "macos") {
        Ok(PathBuf::from("/Library/linux-scoring-engine.json"))
    } else {
        Ok(PathBuf::from("/etc/linux-scoring-engine.json"))
    }
}

/// Turn a configured bind address into something the socket layer accepts.
///
/// `:port` binds every IPv4 interface. IPv6 hosts must be bracketed.
pub fn normalize_bind_addr(input: &str) -> Result<String, ConfigError> {
    let input = input.trim();

    if let Some(rest) = input.strip_prefix('[') {
        let Some(end) = rest.find(']') else {
            return Err(ConfigError::new(format!(
                "Invalid IPv6 bind address (missing closing bracket): {}",
                input
            )));
        };
        let host = &rest[..end];
        if host.is_empty() {
            return Err(ConfigError::new(format!(
                "Invalid IPv6 bind address: {}",
                input
            )));
        }
        let Some(port_str) = rest[end + 1..].strip_prefix(':') else {
            return Err(ConfigError::new(format!(
                "Missing port in bind address: {}",
                input
            )));
        };
        let port = parse_port(port_str, input)?;
        return Ok(format!("[{}]:{}", host, port));
    }

    let Some((host, port_str)) = input.rsplit_once(':') else {
        return Err(ConfigError::new(format!(
            "Missing port in bind address: {}",
            input
        )));
    };
    if host.contains(':') {
        return Err(ConfigError::new(format!(
            "IPv6 bind addresses must be bracketed: {}",
            input
        )));
    }
    let port = parse_port(port_str, input)?;
    let host = if host.is_empty() { "0.0.0.0" } else { host };
    Ok(format!("{}:{}", host, port))
}

fn parse_port(port_str: &str, input: &str) -> Result<u16, ConfigError> {
    let invalid = || ConfigError::new(format!("Invalid port number in bind address: {}", input));
    if port_str.is_empty() || !port_str.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let port: u16 = port_str.parse().map_err(|_| invalid())?;
    if port == 0 {
        return Err(invalid());
    }
    Ok(port)
}
