//! Counters and gauges describing the health of the scrape-buffer-drain
//! pipeline itself, distinct from the exporter metrics it forwards.

use parking_lot::RwLock;
use prometheus::{CounterVec, GaugeVec, HistogramVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct PipelineMetrics {
    scrapes_total: CounterVec,
    drains_total: CounterVec,
    drain_duration_seconds: HistogramVec,
    buffer_depth: IntGauge,
    last_drain_timestamp_seconds: GaugeVec,

    state: Arc<RwLock<PipelineState>>,
}

#[derive(Default)]
struct PipelineState {
    last_drain_success: bool,
    last_drain_at: Option<SystemTime>,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let scrapes_total = CounterVec::new(
            Opts::new(
                "nodepulse_agent_scrapes_total",
                "Exporter scrape attempts, by exporter and outcome",
            ),
            &["exporter", "result"],
        )
        .expect("nodepulse_agent_scrapes_total");

        let drains_total = CounterVec::new(
            Opts::new(
                "nodepulse_agent_drains_total",
                "Drainer batch send attempts, by outcome",
            ),
            &["result"],
        )
        .expect("nodepulse_agent_drains_total");

        let drain_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "nodepulse_agent_drain_duration_seconds",
                "Time spent in one drainer iteration, in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["result"],
        )
        .expect("nodepulse_agent_drain_duration_seconds");

        let buffer_depth = IntGauge::with_opts(Opts::new(
            "nodepulse_agent_buffer_depth",
            "Number of buffered scrape files awaiting a successful drain",
        ))
        .expect("nodepulse_agent_buffer_depth");

        let last_drain_timestamp_seconds = GaugeVec::new(
            Opts::new(
                "nodepulse_agent_last_drain_timestamp_seconds",
                "Unix timestamp of the last drain attempt, by outcome",
            ),
            &["result"],
        )
        .expect("nodepulse_agent_last_drain_timestamp_seconds");

        Self {
            scrapes_total,
            drains_total,
            drain_duration_seconds,
            buffer_depth,
            last_drain_timestamp_seconds,
            state: Arc::new(RwLock::new(PipelineState::default())),
        }
    }

    /// # Errors
    /// Returns an error if a metric is already registered under the
    /// same name.
    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.scrapes_total.clone()))?;
        registry.register(Box::new(self.drains_total.clone()))?;
        registry.register(Box::new(self.drain_duration_seconds.clone()))?;
        registry.register(Box::new(self.buffer_depth.clone()))?;
        registry.register(Box::new(self.last_drain_timestamp_seconds.clone()))?;
        Ok(())
    }

    pub fn record_scrape(&self, exporter: &str, ok: bool) {
        let result = if ok { "ok" } else { "error" };
        self.scrapes_total.with_label_values(&[exporter, result]).inc();
    }

    pub fn set_buffer_depth(&self, depth: usize) {
        #[allow(clippy::cast_possible_wrap)]
        self.buffer_depth.set(depth as i64);
    }

    /// Start timing a drain iteration. Call `.finish(ok)` on the
    /// returned timer once the iteration completes.
    #[must_use]
    pub fn start_drain(&self) -> DrainTimer {
        DrainTimer {
            start: Instant::now(),
            metrics: self.clone(),
        }
    }

    fn record_drain(&self, ok: bool, duration_secs: f64) {
        let result = if ok { "ok" } else { "error" };
        self.drains_total.with_label_values(&[result]).inc();
        self.drain_duration_seconds
            .with_label_values(&[result])
            .observe(duration_secs);

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        self.last_drain_timestamp_seconds
            .with_label_values(&[result])
            .set(timestamp);

        let mut state = self.state.write();
        state.last_drain_success = ok;
        state.last_drain_at = Some(SystemTime::now());
    }

    /// Whether the most recently completed drain iteration succeeded.
    /// `None` before the first iteration has finished. Backs the
    /// `/healthz` handler.
    #[must_use]
    pub fn last_drain_success(&self) -> Option<bool> {
        let state = self.state.read();
        state.last_drain_at.map(|_| state.last_drain_success)
    }
}

/// RAII timer for one drain iteration.
pub struct DrainTimer {
    start: Instant,
    metrics: PipelineMetrics,
}

impl DrainTimer {
    pub fn finish(self, ok: bool) {
        let duration = self.start.elapsed().as_secs_f64();
        self.metrics.record_drain(ok, duration);
    }
}
