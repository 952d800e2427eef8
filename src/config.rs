//! TOML configuration for file2tcp.
//!
//! Layered: compiled-in defaults, then an optional config file, then
//! command-line overrides. The file is looked up at an explicit path, the
//! `FILE2TCP_CONFIG` environment variable, or `./file2tcp.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bench::{TransferConfig, DEFAULT_CONCURRENCY, DEFAULT_HOST, DEFAULT_PORT};

pub const CONFIG_ENV: &str = "FILE2TCP_CONFIG";
pub const LOCAL_CONFIG: &str = "file2tcp.toml";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no source file given (use -f/--file)")]
    MissingFile,

    #[error("source file {path} is not readable: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("source path {path} is not a regular file")]
    NotAFile { path: String },

    #[error("target host cannot be empty")]
    EmptyHost,

    #[error("target port must be between 1 and 65535")]
    InvalidPort,

    #[error("concurrency must be at least 1")]
    InvalidConcurrency,
}

// ---------------------------------------------------------------------------
// File layout
// ---------------------------------------------------------------------------

/// Root of the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub transfer: TransferSection,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub host: String,
    pub port: u16,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSection {
    /// Number of parallel workers, each sending the whole file.
    pub concurrency: usize,
    /// Socket send timeout in seconds. `0` or absent disables it.
    pub send_timeout_secs: Option<u64>,
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            send_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Print the final report as JSON.
    pub json: bool,
}

/// Values given on the command line; `None` keeps the file/default value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub file: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub concurrency: Option<usize>,
    pub json: bool,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve the config file. An explicit path must load; the
    /// environment variable and local file fall back to defaults on error.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "{} set but file could not be loaded, trying fallback",
                        CONFIG_ENV
                    );
                }
            }
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %e,
                        "local config file could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }

    /// Apply command-line overrides on top of this config.
    pub fn merge(mut self, overrides: &Overrides) -> (Self, Option<PathBuf>) {
        if let Some(host) = &overrides.host {
            self.target.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.target.port = port;
        }
        if let Some(concurrency) = overrides.concurrency {
            self.transfer.concurrency = concurrency;
        }
        if overrides.json {
            self.output.json = true;
        }
        (self, overrides.file.clone())
    }

    /// Check every value and produce the parameters the workers run with.
    pub fn into_transfer_config(
        self,
        file: Option<PathBuf>,
    ) -> Result<TransferConfig, ConfigError> {
        let file_path = file.ok_or(ConfigError::MissingFile)?;
        check_readable(&file_path)?;

        if self.target.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.target.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.transfer.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }

        Ok(TransferConfig {
            file_path,
            host: self.target.host,
            port: self.target.port,
            concurrency: self.transfer.concurrency,
            send_timeout: self
                .transfer
                .send_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        })
    }
}

fn check_readable(path: &Path) -> Result<(), ConfigError> {
    let display = path.display().to_string();
    let meta = std::fs::metadata(path).map_err(|e| ConfigError::Unreadable {
        path: display.clone(),
        reason: e.to_string(),
    })?;
    if !meta.is_file() {
        return Err(ConfigError::NotAFile { path: display });
    }
    std::fs::File::open(path).map_err(|e| ConfigError::Unreadable {
        path: display,
        reason: e.to_string(),
    })?;
    Ok(())
}
