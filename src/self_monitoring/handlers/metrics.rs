use crate::self_monitoring::process::ProcessMonitor;
use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
};
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::error;

#[derive(Clone)]
pub struct MetricsState {
    pub registry: Registry,
    pub process: ProcessMonitor,
}

/// `GET /metrics`. Self-metrics about the agent's own pipeline and
/// process, never the payload it forwards on behalf of exporters.
pub async fn metrics(State(state): State<MetricsState>) -> impl IntoResponse {
    state.process.refresh();

    let mut headers = HeaderMap::new();
    headers.insert("content-type", HeaderValue::from_static("text/plain; version=0.0.4"));

    let encoder = TextEncoder::new();
    let families = state.registry.gather();
    let mut buffer = Vec::new();

    match encoder.encode(&families, &mut buffer) {
        Ok(()) => (StatusCode::OK, headers, buffer),
        Err(e) => {
            error!(error = %e, "failed to encode self metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, headers, Vec::new())
        }
    }
}
