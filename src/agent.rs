//! Composition root: wires configuration into the scheduler, drainer,
//! optional self-monitoring surface, and shutdown signal handling.
//!
//! Grounded on `cli::actions::run::handle` and `exporter::{mod,
//! shutdown}` in the teacher, generalized from "serve one HTTP API"
//! to "run two background tasks plus an optional HTTP surface".

use crate::buffer::ScrapeBuffer;
use crate::config::{host_id, Config};
use crate::drainer::Drainer;
use crate::errors::AgentError;
use crate::exporter_client::Exporter;
use crate::scheduler::Scheduler;
use crate::self_monitoring::{PipelineMetrics, ProcessMonitor};
use anyhow::Context;
use std::net::SocketAddr;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Run the agent to completion. Returns once every background task has
/// stopped, either because `once` requested a single cycle or because a
/// shutdown signal was observed.
///
/// # Errors
/// Returns [`AgentError::NoActiveExporters`] if every configured
/// exporter fails its startup `verify()`. Returns other errors if
/// building the HTTP clients fails.
pub async fn run(config: &Config, once: bool) -> anyhow::Result<()> {
    let host_id = host_id(config);

    let mut exporters = Vec::new();
    for entry in config.enabled_exporters() {
        let exporter = Exporter::new(entry.name.clone(), entry.endpoint.clone(), entry.timeout)
            .context("failed to build exporter client")?;
        exporters.push(exporter);
    }

    let mut active = Vec::new();
    for exporter in exporters {
        if exporter.verify().await {
            active.push(exporter);
        } else {
            tracing::warn!(exporter = exporter.name(), "exporter failed startup verification, excluding");
        }
    }

    if active.is_empty() {
        return Err(AgentError::NoActiveExporters.into());
    }

    let buffer = ScrapeBuffer::new(config.buffer.path.clone());
    let cancel = CancellationToken::new();

    let pipeline_metrics = config.self_monitoring.as_ref().map(|_| PipelineMetrics::new());

    let mut scheduler = Scheduler::new(active, buffer.clone(), host_id, config.agent.interval);
    let mut drainer = Drainer::new(buffer, &config.server, &config.buffer, config.agent.interval)
        .context("failed to build drainer HTTP client")?;
    if let Some(metrics) = pipeline_metrics.clone() {
        scheduler = scheduler.with_metrics(metrics.clone());
        drainer = drainer.with_metrics(metrics);
    }

    if once {
        run_once(&scheduler, &drainer).await;
        return Ok(());
    }

    run_until_shutdown(config, scheduler, drainer, cancel, pipeline_metrics).await
}

async fn run_once(scheduler: &Scheduler, drainer: &Drainer) {
    scheduler.collect_once(chrono::Utc::now()).await;
    drainer.drain_once().await;
}

async fn run_until_shutdown(
    config: &Config,
    scheduler: Scheduler,
    drainer: Drainer,
    cancel: CancellationToken,
    pipeline_metrics: Option<PipelineMetrics>,
) -> anyhow::Result<()> {
    let scheduler_cancel = cancel.clone();
    let scheduler_task = tokio::spawn(async move { scheduler.run(&scheduler_cancel).await });

    let drainer_cancel = cancel.clone();
    let drainer_task = tokio::spawn(async move { drainer.run(&drainer_cancel).await });

    let monitoring_task = match (config.self_monitoring.as_ref(), pipeline_metrics) {
        (Some(self_monitoring), Some(pipeline)) => {
            let addr = SocketAddr::from(([0, 0, 0, 0], self_monitoring.port));
            let registry = prometheus::Registry::new();
            let process = ProcessMonitor::new();
            process.register(&registry).context("failed to register process metrics")?;
            pipeline.register(&registry).context("failed to register pipeline metrics")?;

            let monitoring_cancel = cancel.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = crate::self_monitoring::serve(addr, registry, process, pipeline, monitoring_cancel).await {
                    tracing::error!(error = %e, "self-monitoring surface exited with an error");
                }
            }))
        }
        _ => None,
    };

    shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping");
    cancel.cancel();

    let _ = scheduler_task.await;
    let _ = drainer_task.await;
    if let Some(task) = monitoring_task {
        let _ = task.await;
    }

    Ok(())
}

/// Wait for SIGINT/SIGTERM (Unix) or Ctrl+C (everywhere else).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let Ok(mut sigint) = signal::unix::signal(signal::unix::SignalKind::interrupt()) else {
            return;
        };
        let Ok(mut sigterm) = signal::unix::signal(signal::unix::SignalKind::terminate()) else {
            return;
        };

        tokio::select! {
            _ = sigint.recv() => tracing::info!("received SIGINT"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        if signal::ctrl_c().await.is_ok() {
            tracing::info!("received Ctrl+C");
        }
    }
}
