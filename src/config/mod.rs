//! Validated agent configuration.
//!
//! The core (`agent`, `scheduler`, `drainer`, …) only ever sees a
//! [`Config`] that has already passed [`Config::validate`]. Parsing and
//! validating untrusted TOML is plumbing around that core, but it is
//! still implemented here rather than left as an exercise, since
//! `cli::actions::run` needs something concrete to call.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// `server.*` — the remote ingestion endpoint.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    pub endpoint: Url,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// `agent.*` — identity and scheduling.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AgentConfig {
    pub server_id: String,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

/// One entry of `exporters[]`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ExporterEntry {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub endpoint: Url,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

const fn default_enabled() -> bool {
    true
}

/// `buffer.*` — the on-disk write-ahead log.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BufferConfig {
    pub path: PathBuf,
    pub retention_hours: u64,
    pub batch_size: usize,
}

/// `self_monitoring.*` — the agent's own `/healthz` + `/metrics`
/// surface. Absent by default; its absence must never affect
/// scrape/buffer/drain behavior.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SelfMonitoringConfig {
    pub port: u16,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub exporters: Vec<ExporterEntry>,
    pub buffer: BufferConfig,
    #[serde(default)]
    pub self_monitoring: Option<SelfMonitoringConfig>,
}

/// Intervals the scheduler is allowed to run at (spec.md §6, `agent.interval`).
const ALLOWED_INTERVALS: [Duration; 3] = [
    Duration::from_secs(15),
    Duration::from_secs(30),
    Duration::from_secs(60),
];

impl Config {
    /// Parse and validate a config file at `path`.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read, cannot be
    /// parsed as TOML, or fails [`Config::validate`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Enforce the invariants spec.md §6 states for each field.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] describing the first violation
    /// found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let id_re = server_id_pattern();
        if !id_re.is_match(&self.agent.server_id) {
            return Err(ConfigError::Invalid(format!(
                "agent.server_id {:?} does not match ^[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?$",
                self.agent.server_id
            )));
        }

        if !ALLOWED_INTERVALS.contains(&self.agent.interval) {
            return Err(ConfigError::Invalid(format!(
                "agent.interval must be one of 15s, 30s, 1m; got {:?}",
                self.agent.interval
            )));
        }

        if self.server.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "server.timeout must be positive".to_string(),
            ));
        }

        if self.buffer.retention_hours == 0 {
            return Err(ConfigError::Invalid(
                "buffer.retention_hours must be positive".to_string(),
            ));
        }

        if self.buffer.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "buffer.batch_size must be positive".to_string(),
            ));
        }

        if self.exporters.is_empty() {
            return Err(ConfigError::Invalid(
                "exporters must contain at least one entry".to_string(),
            ));
        }

        for exporter in &self.exporters {
            if exporter.name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "exporters[].name must not be empty".to_string(),
                ));
            }
            if exporter.timeout.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "exporters[{}].timeout must be positive",
                    exporter.name
                )));
            }
        }

        Ok(())
    }

    /// Entries with `enabled = true`, in configuration order.
    pub fn enabled_exporters(&self) -> impl Iterator<Item = &ExporterEntry> {
        self.exporters.iter().filter(|e| e.enabled)
    }
}

fn server_id_pattern() -> regex::Regex {
    // Safe to construct: a fixed, hand-verified pattern, not user input.
    #[allow(clippy::unwrap_used)]
    regex::Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?$").unwrap()
}

/// Resolve the durable host identifier this agent reports as.
///
/// Persisting a host id across process restarts (e.g. a machine-id file
/// written once on first start) is out of scope here; this is a
/// pass-through over whatever `agent.server_id` the validated config
/// already carries.
#[must_use]
pub fn host_id(config: &Config) -> String {
    config.agent.server_id.clone()
}
