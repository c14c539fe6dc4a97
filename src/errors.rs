//! Error kinds for the agent's core components.
//!
//! Each enum here corresponds to one row of the error-handling table: a
//! category of failure that a single component detects and either
//! recovers from locally or propagates as one of the two fatal
//! [`AgentError`] variants. Nothing outside `agent::run` is expected to
//! match on these by name except the component that raised them and its
//! immediate caller.

use thiserror::Error;

/// Failures from a single exporter scrape attempt.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("exporter {0} unreachable: {1}")]
    Unreachable(String, #[source] reqwest::Error),

    #[error("exporter {name} returned non-2xx status {status}")]
    BadStatus { name: String, status: u16 },

    #[error("exporter {0} scrape timed out")]
    Timeout(String),
}

/// Failures from the on-disk write-ahead log.
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("buffer I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt buffer entry {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Failures validating a loaded configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors that unwind all the way to `main` and terminate the process.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("configuration invalid: {0}")]
    ConfigInvalid(#[from] ConfigError),

    #[error("no exporter passed startup verification; the agent has nothing to scrape")]
    NoActiveExporters,
}
