use crate::built_info::GIT_COMMIT_HASH;
use crate::self_monitoring::pipeline::PipelineMetrics;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;

#[derive(Serialize)]
struct Health {
    name: &'static str,
    version: &'static str,
    commit: &'static str,
    pipeline: &'static str,
}

/// `GET /healthz`. Reports `"unknown"` until the first drain iteration
/// completes, `"ok"`/`"degraded"` afterward based on whether that
/// iteration succeeded. This is a liveness signal about the pipeline,
/// not about any individual exporter.
pub async fn healthz(State(metrics): State<PipelineMetrics>) -> impl IntoResponse {
    let (status, pipeline) = match metrics.last_drain_success() {
        None => (StatusCode::OK, "unknown"),
        Some(true) => (StatusCode::OK, "ok"),
        Some(false) => (StatusCode::SERVICE_UNAVAILABLE, "degraded"),
    };

    let health = Health {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        commit: GIT_COMMIT_HASH,
        pipeline,
    };

    (status, Json(health))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_unknown_before_any_drain() {
        let metrics = PipelineMetrics::new();
        let response = healthz(State(metrics)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn reports_degraded_after_failed_drain() {
        let metrics = PipelineMetrics::new();
        metrics.start_drain().finish(false);
        let response = healthz(State(metrics)).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
