#![allow(clippy::unwrap_used)]
//! spec.md §8 scenario 4: "Retention expiry". With a short
//! `retention_hours` and the endpoint down, an aged file is removed by
//! `cleanup()` within one drainer iteration. spec.md §3's invariant 4
//! ("no buffered file older than retention_hours survives a drainer
//! iteration") holds unconditionally — the drainer runs `cleanup` every
//! iteration regardless of whether the batch send itself succeeded.

mod common;

use nodepulse_agent::buffer::ScrapeBuffer;
use nodepulse_agent::config::{BufferConfig, ServerConfig};
use nodepulse_agent::drainer::Drainer;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn aged_file_is_pruned_even_though_the_endpoint_is_down() {
    let ingestion = common::spawn_fake_ingestion().await;
    ingestion.set_status(503);

    let dir = tempfile::tempdir().unwrap();
    let buffer = ScrapeBuffer::new(dir.path());

    let aged_at = chrono::Utc::now() - chrono::Duration::hours(2);
    buffer
        .save(b"node_load1 0.1 0\n", "host-1", "node_exporter", aged_at)
        .await
        .unwrap();
    assert_eq!(buffer.list().await.unwrap().len(), 1);

    let server_config = ServerConfig {
        endpoint: ingestion.url.clone(),
        timeout: Duration::from_secs(1),
    };
    let buffer_config = BufferConfig {
        path: dir.path().to_path_buf(),
        retention_hours: 1,
        batch_size: 5,
    };
    let drainer = Drainer::new(buffer.clone(), &server_config, &buffer_config, Duration::from_secs(15)).unwrap();

    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();
    let task = tokio::spawn(async move { drainer.run(&task_cancel).await });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut pruned = false;
    while tokio::time::Instant::now() < deadline {
        if buffer.list().await.unwrap().is_empty() {
            pruned = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    cancel.cancel();
    let _ = task.await;

    assert!(pruned, "the aged file should be pruned by cleanup within one drainer iteration, even with the endpoint down");
    assert!(ingestion.received().is_empty(), "the endpoint never accepted a batch");
}
