//! Background batch/send/retry/prune loop (spec.md §4.5).

use crate::buffer::{BufferFile, ScrapeBuffer};
use crate::config::{BufferConfig, ServerConfig};
use crate::parser::Snapshot;
use crate::self_monitoring::PipelineMetrics;
use rand::Rng;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Sent to `server.endpoint`: exporter name to its ordered snapshots.
type BatchPayload = HashMap<String, Vec<Snapshot>>;

/// Failure sending one batch. Transient-vs-permanent is deliberately
/// not distinguished further here: spec.md §4.5 treats 4xx and 5xx
/// identically (retain and retry).
#[derive(Debug, Error)]
enum SendError {
    #[error("POST timed out")]
    Timeout,

    #[error("POST failed: {0}")]
    Transport(#[from] reqwest::Error),
}

pub struct Drainer {
    buffer: ScrapeBuffer,
    client: Client,
    endpoint: Url,
    post_timeout: Duration,
    interval: Duration,
    retention_hours: u64,
    batch_size: usize,
    metrics: Option<PipelineMetrics>,
}

impl Drainer {
    /// # Errors
    /// Returns an error if the underlying HTTP client fails to build.
    pub fn new(
        buffer: ScrapeBuffer,
        server: &ServerConfig,
        buffer_config: &BufferConfig,
        interval: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(server.timeout).build()?;

        Ok(Self {
            buffer,
            client,
            endpoint: server.endpoint.clone(),
            post_timeout: server.timeout,
            interval,
            retention_hours: buffer_config.retention_hours,
            batch_size: buffer_config.batch_size,
            metrics: None,
        })
    }

    /// Attach the self-monitoring pipeline metrics. Absent by default;
    /// when set, every drain iteration is timed and its outcome fed to
    /// the `/healthz` liveness signal and `/metrics` counters.
    #[must_use]
    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Loop forever until `cancel` fires, running one drain iteration
    /// per pass and sleeping a jittered delay between passes.
    pub async fn run(&self, cancel: &CancellationToken) {
        loop {
            self.drain_once().await;

            let sleep_for = jittered_sleep(self.interval);
            tokio::select! {
                () = tokio::time::sleep(sleep_for) => {}
                () = cancel.cancelled() => return,
            }
        }
    }

    /// One list-batch-parse-send-delete/retain pass. `cleanup` always
    /// runs before this returns, independent of whether a batch was
    /// sent or how it fared: spec.md §3's invariant 4 ("no buffered
    /// file older than retention_hours survives a drainer iteration")
    /// is unconditional, even though §4.5 describes `cleanup` as a step
    /// that follows a successful send — scenario 4 ("Retention expiry")
    /// confirms aged files must go even with the endpoint down.
    pub(crate) async fn drain_once(&self) {
        let files = match self.buffer.list().await {
            Ok(files) => files,
            Err(e) => {
                tracing::error!(error = %e, "drainer: failed to list buffer");
                return;
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.set_buffer_depth(files.len());
        }

        if !files.is_empty() {
            self.process_batch(&files).await;
        }

        if let Err(e) = self.buffer.cleanup(self.retention_hours).await {
            tracing::error!(error = %e, "drainer: cleanup failed");
        }
    }

    /// Batch, parse, send, and delete-or-retain one prefix of `files`.
    async fn process_batch(&self, files: &[BufferFile]) {
        let batch_len = files.len().min(self.batch_size);
        #[allow(clippy::indexing_slicing)]
        let batch = &files[..batch_len];

        let mut payload: BatchPayload = HashMap::new();
        let mut host_id: Option<String> = None;
        let mut deletable: Vec<BufferFile> = Vec::new();

        for file in batch {
            let entry = match self.buffer.load(file).await {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(path = %file.path.display(), error = %e, "drainer: corrupt buffer entry, deleting");
                    if let Err(delete_err) = self.buffer.delete(file).await {
                        tracing::error!(error = %delete_err, "drainer: failed to delete corrupt entry");
                    }
                    continue;
                }
            };

            if host_id.is_none() {
                host_id = Some(entry.host_id.clone());
            }

            let snapshots = Snapshot::parse_all(&entry.exporter_name, &entry.data);
            let snapshots = if snapshots.is_empty() {
                tracing::warn!(exporter = entry.exporter_name, "drainer: parse yielded nothing, substituting zero-valued snapshot");
                vec![Snapshot::zero_valued(&entry.exporter_name)]
            } else {
                snapshots
            };

            payload
                .entry(entry.exporter_name.clone())
                .or_default()
                .extend(snapshots);

            deletable.push(file.clone());
        }

        if payload.is_empty() {
            return;
        }
        let Some(host_id) = host_id else {
            return;
        };

        let timer = self.metrics.as_ref().map(PipelineMetrics::start_drain);

        match self.send(&payload, &host_id).await {
            Ok(()) => {
                for file in &deletable {
                    if let Err(e) = self.buffer.delete(file).await {
                        tracing::error!(path = %file.path.display(), error = %e, "drainer: failed to delete sent entry");
                    }
                }
                if let Some(timer) = timer {
                    timer.finish(true);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "drainer: send failed, retaining batch for retry");
                if let Some(timer) = timer {
                    timer.finish(false);
                }
            }
        }
    }

    async fn send(&self, payload: &BatchPayload, host_id: &str) -> Result<(), SendError> {
        let mut endpoint = self.endpoint.clone();
        endpoint.query_pairs_mut().append_pair("server_id", host_id);

        let request = self
            .client
            .post(endpoint)
            .header("content-type", "application/json")
            .header("user-agent", concat!("nodepulse-agent/", env!("CARGO_PKG_VERSION")))
            .json(payload)
            .send();

        let response = match tokio::time::timeout(self.post_timeout, request).await {
            Ok(result) => result?,
            Err(_elapsed) => return Err(SendError::Timeout),
        };

        response.error_for_status()?;
        Ok(())
    }
}

/// Uniform random duration in `[0, interval)` (spec.md §4.5 step 8).
fn jittered_sleep(interval: Duration) -> Duration {
    let max_millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX).max(1);
    let millis = rand::thread_rng().gen_range(0..max_millis);
    Duration::from_millis(millis)
}
