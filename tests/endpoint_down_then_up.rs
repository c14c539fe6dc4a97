#![allow(clippy::unwrap_used)]
//! spec.md §8 scenario 2: "Endpoint down, then up". The ingestion
//! endpoint rejects with 503 for a while, buffering scrapes; once it
//! starts accepting, the retained batch drains and the buffer empties.

mod common;

use nodepulse_agent::buffer::ScrapeBuffer;
use nodepulse_agent::config::{BufferConfig, ServerConfig};
use nodepulse_agent::drainer::Drainer;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn retains_on_failure_then_drains_on_recovery() {
    let ingestion = common::spawn_fake_ingestion().await;
    ingestion.set_status(503);

    let dir = tempfile::tempdir().unwrap();
    let buffer = ScrapeBuffer::new(dir.path());

    let now = chrono::Utc::now();
    for i in 0..4i64 {
        let at = now - chrono::Duration::seconds(60 - i * 15);
        buffer
            .save(b"node_load1 0.1 0\n", "host-1", "node_exporter", at)
            .await
            .unwrap();
    }
    assert_eq!(buffer.list().await.unwrap().len(), 4);

    let server_config = ServerConfig {
        endpoint: ingestion.url.clone(),
        timeout: Duration::from_secs(2),
    };
    let buffer_config = BufferConfig {
        path: dir.path().to_path_buf(),
        retention_hours: 48,
        batch_size: 5,
    };
    let drainer = Drainer::new(buffer.clone(), &server_config, &buffer_config, Duration::from_secs(15)).unwrap();

    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();
    let task = tokio::spawn(async move { drainer.run(&task_cancel).await });

    // Give the first (failing) iteration a moment to run, then confirm
    // nothing was deleted while the endpoint is down.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(buffer.list().await.unwrap().len(), 4, "failed sends must retain every file");

    ingestion.set_status(200);

    let drained = common::wait_until(|| ingestion.received().len() == 1, Duration::from_secs(20)).await;
    assert!(drained, "expected exactly one batch once the endpoint recovers");

    // The drainer still has to delete the sent files and run cleanup
    // after the send resolves; give it a beat before cancelling.
    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();
    let _ = task.await;

    assert!(buffer.list().await.unwrap().is_empty(), "buffer should be empty after the successful drain");
}
