#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::indexing_slicing)]
#![allow(dead_code)]

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use url::Url;

/// Find an available port for testing by binding to port 0 and letting
/// the OS assign one, same technique the teacher's `tests/common`
/// uses.
pub fn get_available_port() -> u16 {
    use std::net::TcpListener;
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind to random port");
    listener.local_addr().expect("failed to get local addr").port()
}

/// A throwaway exporter stand-in: serves a fixed body at a status code
/// that can be changed at runtime via the returned `AtomicU16`, so a
/// test can flip an exporter from reachable to unreachable mid-run.
pub struct FakeExporter {
    pub url: Url,
    status: Arc<AtomicU16>,
}

impl FakeExporter {
    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }
}

#[derive(Clone)]
struct ExporterState {
    body: Arc<str>,
    status: Arc<AtomicU16>,
}

async fn serve_metrics(State(state): State<ExporterState>) -> (StatusCode, String) {
    let status = StatusCode::from_u16(state.status.load(Ordering::SeqCst)).unwrap_or(StatusCode::OK);
    (status, state.body.to_string())
}

/// Spawn an in-process exporter serving `body` at `/metrics`, starting
/// at HTTP 200.
pub async fn spawn_fake_exporter(body: &str) -> FakeExporter {
    let status = Arc::new(AtomicU16::new(200));
    let state = ExporterState {
        body: Arc::from(body),
        status: status.clone(),
    };
    let app = Router::new().route("/metrics", get(serve_metrics)).with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeExporter {
        url: Url::parse(&format!("http://{addr}/metrics")).unwrap(),
        status,
    }
}

/// A throwaway ingestion endpoint: records every batch it receives and
/// can be flipped between accepting (2xx) and rejecting (configurable
/// status) at runtime.
pub struct FakeIngestion {
    pub url: Url,
    status: Arc<AtomicU16>,
    received: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl FakeIngestion {
    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    pub fn received(&self) -> Vec<serde_json::Value> {
        self.received.lock().unwrap().clone()
    }
}

#[derive(Clone)]
struct IngestionState {
    status: Arc<AtomicU16>,
    received: Arc<Mutex<Vec<serde_json::Value>>>,
}

async fn receive_batch(
    State(state): State<IngestionState>,
    axum::Json(body): axum::Json<serde_json::Value>,
) -> StatusCode {
    let status = state.status.load(Ordering::SeqCst);
    if (200..300).contains(&status) {
        state.received.lock().unwrap().push(body);
    }
    StatusCode::from_u16(status).unwrap_or(StatusCode::OK)
}

/// Spawn an in-process ingestion endpoint at `/batch`, starting at
/// HTTP 200.
pub async fn spawn_fake_ingestion() -> FakeIngestion {
    let status = Arc::new(AtomicU16::new(200));
    let received = Arc::new(Mutex::new(Vec::new()));
    let state = IngestionState {
        status: status.clone(),
        received: received.clone(),
    };
    let app = Router::new().route("/batch", post(receive_batch)).with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeIngestion {
        url: Url::parse(&format!("http://{addr}/batch")).unwrap(),
        status,
        received,
    }
}

/// Poll `check` every 50ms until it returns `true` or `timeout` elapses.
/// Returns whether it ever became true, matching the teacher's
/// `wait_for_server` retry-loop style.
pub async fn wait_until(mut check: impl FnMut() -> bool, timeout: std::time::Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}
