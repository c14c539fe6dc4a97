#![allow(clippy::unwrap_used)]
//! spec.md §8 scenario 3: "Corrupt file". A buffer file with a
//! malformed filename is deleted outright; a well-formed file alongside
//! it is still parsed, sent, and deleted.

mod common;

use nodepulse_agent::buffer::ScrapeBuffer;
use nodepulse_agent::config::{BufferConfig, ServerConfig};
use nodepulse_agent::drainer::Drainer;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn corrupt_entry_is_deleted_while_valid_entry_still_drains() {
    let ingestion = common::spawn_fake_ingestion().await;

    let dir = tempfile::tempdir().unwrap();
    let buffer = ScrapeBuffer::new(dir.path());

    buffer
        .save(b"node_load1 0.1 0\n", "host-1", "node_exporter", chrono::Utc::now())
        .await
        .unwrap();

    let exporter_dir = dir.path().join("node_exporter");
    tokio::fs::create_dir_all(&exporter_dir).await.unwrap();
    tokio::fs::write(exporter_dir.join("not-a-valid-name.prom"), b"garbage bytes")
        .await
        .unwrap();

    assert_eq!(buffer.list().await.unwrap().len(), 2);

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

    let drained = common::wait_until(|| ingestion.received().len() == 1, Duration::from_secs(10)).await;
    assert!(drained, "the valid file should still reach the ingestion endpoint");

    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();
    let _ = task.await;

    assert!(
        buffer.list().await.unwrap().is_empty(),
        "both the corrupt and the sent file should be gone"
    );
}
