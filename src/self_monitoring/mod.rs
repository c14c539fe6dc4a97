//! Optional HTTP surface reporting the agent's own health and resource
//! use. Strictly ambient: nothing in `scheduler`, `buffer`, or
//! `drainer` depends on this module, and it never serves exporter
//! payloads.

mod handlers;
pub mod pipeline;
pub mod process;
pub mod router;

pub use pipeline::PipelineMetrics;
pub use process::ProcessMonitor;

use prometheus::Registry;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Bind and serve the self-monitoring router until `cancel` fires.
///
/// # Errors
/// Returns an error if the listener fails to bind.
pub async fn serve(
    addr: SocketAddr,
    registry: Registry,
    process: ProcessMonitor,
    pipeline: PipelineMetrics,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let app = router::build(registry, process, pipeline);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "self-monitoring surface listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    Ok(())
}
