//! Aligned periodic collection loop (spec.md §4.2, §4.3).
//!
//! Ticks on interval boundaries (`:00`, `:15`, `:30`, `:45` for a 15s
//! interval) rather than on a fixed offset from process start, so
//! restarts don't drift the schedule and two agents on the same host
//! collect at (approximately) the same wall-clock instants.

use crate::buffer::ScrapeBuffer;
use crate::exporter_client::Exporter;
use crate::self_monitoring::PipelineMetrics;
use crate::stamper;
use chrono::{DateTime, Timelike, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runs the collect-stamp-buffer loop until cancelled.
pub struct Scheduler {
    exporters: Vec<Exporter>,
    buffer: ScrapeBuffer,
    host_id: String,
    interval: Duration,
    metrics: Option<PipelineMetrics>,
}

impl Scheduler {
    #[must_use]
    pub const fn new(
        exporters: Vec<Exporter>,
        buffer: ScrapeBuffer,
        host_id: String,
        interval: Duration,
    ) -> Self {
        Self {
            exporters,
            buffer,
            host_id,
            interval,
            metrics: None,
        }
    }

    /// Attach the self-monitoring pipeline metrics. Absent by default;
    /// when set, every scrape attempt is recorded by outcome.
    #[must_use]
    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run until `cancel` fires. Collects once immediately, then once
    /// per aligned tick.
    pub async fn run(&self, cancel: &CancellationToken) {
        loop {
            let collected_at = align(Utc::now(), self.interval);
            self.collect_once(collected_at).await;

            let sleep_for = time_until_next_boundary(Utc::now(), self.interval);
            tokio::select! {
                () = tokio::time::sleep(sleep_for) => {}
                () = cancel.cancelled() => return,
            }
        }
    }

    /// One pass over every configured exporter: scrape, stamp, buffer.
    /// Exporters are visited serially and a failure on one never skips
    /// the rest (spec.md §4.2: "partial exporter failure never blocks
    /// other exporters").
    pub(crate) async fn collect_once(&self, collected_at: DateTime<Utc>) {
        for exporter in &self.exporters {
            match exporter.scrape(self.interval).await {
                Ok(body) => {
                    let stamped = stamper::stamp(&body, collected_at);
                    let saved = self
                        .buffer
                        .save(&stamped, &self.host_id, exporter.name(), collected_at)
                        .await;
                    if let Err(e) = &saved {
                        tracing::error!(exporter = exporter.name(), error = %e, "failed to buffer scrape");
                    }
                    if let Some(metrics) = &self.metrics {
                        metrics.record_scrape(exporter.name(), saved.is_ok());
                    }
                }
                Err(e) => {
                    tracing::warn!(exporter = exporter.name(), error = %e, "scrape failed, skipping this tick");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_scrape(exporter.name(), false);
                    }
                }
            }
        }
    }
}

/// Truncate `instant` down to the most recent multiple of `interval`
/// within its minute, so successive ticks land on `:00`, `:15`, `:30`,
/// `:45` (for a 15s interval) regardless of when the process started.
#[must_use]
pub fn align(instant: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let interval_secs = interval.as_secs().max(1);
    let epoch_secs = instant.timestamp();
    let aligned_secs = (epoch_secs.div_euclid(interval_secs as i64)) * interval_secs as i64;
    DateTime::<Utc>::from_timestamp(aligned_secs, 0).unwrap_or(instant)
}

fn time_until_next_boundary(now: DateTime<Utc>, interval: Duration) -> Duration {
    let interval_secs = interval.as_secs().max(1);
    let epoch_nanos = i128::from(now.timestamp()) * 1_000_000_000 + i128::from(now.nanosecond());
    let interval_nanos = i128::from(interval_secs) * 1_000_000_000;
    let remainder = epoch_nanos.rem_euclid(interval_nanos);
    let remaining_nanos = interval_nanos - remainder;
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    Duration::from_nanos(remaining_nanos as u64)
}
