//! HTTP client over a single exporter endpoint (spec.md §4.1).
//!
//! Expressed as a closed tagged enum rather than a trait object: the
//! capability set is fixed (`name`, `endpoint`, `scrape`, `verify`) and
//! bounded to the families the agent ships with, so dynamic dispatch
//! buys nothing here.

use crate::errors::ScrapeError;
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Which exporter family an [`Exporter`] talks to. Drives how the
/// parser interprets the scraped payload downstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExporterKind {
    Node,
    Process,
}

impl ExporterKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node_exporter",
            Self::Process => "process_exporter",
        }
    }
}

/// One configured exporter endpoint this agent scrapes.
#[derive(Clone, Debug)]
pub struct Exporter {
    kind: ExporterKind,
    name: String,
    endpoint: Url,
    timeout: Duration,
    client: Client,
}

impl Exporter {
    /// Build an exporter from its configured name, endpoint, and
    /// per-scrape timeout. `name == "process_exporter"` selects the
    /// process-exporter family; every other name is treated as
    /// node-exporter style, matching [`crate::parser::Snapshot::parse_all`].
    ///
    /// # Errors
    /// Returns [`ScrapeError::Unreachable`] if the underlying HTTP
    /// client fails to build (e.g. an invalid TLS configuration).
    pub fn new(name: impl Into<String>, endpoint: Url, timeout: Duration) -> Result<Self, ScrapeError> {
        let name = name.into();
        let kind = if name == "process_exporter" {
            ExporterKind::Process
        } else {
            ExporterKind::Node
        };

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScrapeError::Unreachable(name.clone(), e))?;

        Ok(Self {
            kind,
            name,
            endpoint,
            timeout,
            client,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn kind(&self) -> ExporterKind {
        self.kind
    }

    /// Issue one scrape, bounded by `deadline`. On success returns the
    /// raw response body; the caller is responsible for stamping and
    /// buffering it.
    ///
    /// # Errors
    /// - [`ScrapeError::Timeout`] if `deadline` elapses first.
    /// - [`ScrapeError::Unreachable`] on any transport-level failure.
    /// - [`ScrapeError::BadStatus`] on a non-2xx response.
    pub async fn scrape(&self, deadline: Duration) -> Result<Bytes, ScrapeError> {
        let request = self.client.get(self.endpoint.clone()).send();

        let response = match tokio::time::timeout(deadline, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(ScrapeError::Unreachable(self.name.clone(), e)),
            Err(_elapsed) => return Err(ScrapeError::Timeout(self.name.clone())),
        };

        if !response.status().is_success() {
            return Err(ScrapeError::BadStatus {
                name: self.name.clone(),
                status: response.status().as_u16(),
            });
        }

        match tokio::time::timeout(deadline, response.bytes()).await {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(e)) => Err(ScrapeError::Unreachable(self.name.clone(), e)),
            Err(_elapsed) => Err(ScrapeError::Timeout(self.name.clone())),
        }
    }

    /// One scrape at startup with a short, fixed deadline, used only to
    /// decide whether this exporter counts toward
    /// [`crate::errors::AgentError::NoActiveExporters`]. Any failure is
    /// reported as `false`, never propagated.
    pub async fn verify(&self) -> bool {
        const VERIFY_DEADLINE: Duration = Duration::from_secs(3);
        self.scrape(VERIFY_DEADLINE.min(self.timeout)).await.is_ok()
    }
}
