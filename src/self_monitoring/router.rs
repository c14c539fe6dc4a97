use super::handlers::{health, metrics};
use super::pipeline::PipelineMetrics;
use super::process::ProcessMonitor;
use axum::{routing::get, Router};
use prometheus::Registry;

/// Build the optional self-monitoring HTTP surface (spec.md's ambient
/// stack addition, not part of the scrape-buffer-drain pipeline
/// itself). Binding this router is opt-in; its absence must never
/// affect scrape/buffer/drain behavior.
#[must_use]
pub fn build(registry: Registry, process: ProcessMonitor, pipeline: PipelineMetrics) -> Router {
    let health_router = Router::new()
        .route("/healthz", get(health::healthz))
        .with_state(pipeline);

    let metrics_router = Router::new()
        .route("/metrics", get(metrics::metrics))
        .with_state(metrics::MetricsState { registry, process });

    health_router.merge(metrics_router)
}
