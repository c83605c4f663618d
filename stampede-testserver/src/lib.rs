use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_HELLO: &str = "/hello";
pub const PATH_SLOW: &str = "/slow";
pub const PATH_FLAKY: &str = "/flaky";
pub const PATH_STATUS: &str = "/status/{code}";

const DEFAULT_SLOW_MS: u64 = 50;

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    errors_served: Arc<AtomicU64>,
    flaky_seq: Arc<AtomicU64>,
}

impl TestServerStats {
    fn inc_requests_total(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_errors_served(&self) {
        self.errors_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Responses with a 4xx/5xx status.
    pub fn errors_served(&self) -> u64 {
        self.errors_served.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct TestServerUrls {
    pub base_url: String,
    pub hello: String,
    pub slow: String,
    pub flaky: String,
}

impl TestServerUrls {
    pub fn new(base_url: String) -> Self {
        Self {
            hello: format!("{base_url}{PATH_HELLO}"),
            slow: format!("{base_url}{PATH_SLOW}"),
            flaky: format!("{base_url}{PATH_FLAKY}"),
            base_url,
        }
    }

    pub fn status(&self, code: u16) -> String {
        format!("{}/status/{code}", self.base_url)
    }

    pub fn slow_ms(&self, ms: u64) -> String {
        format!("{}?ms={ms}", self.slow)
    }

    /// Every `every`-th request to this URL answers 500.
    pub fn flaky_every(&self, every: u64) -> String {
        format!("{}?every={every}", self.flaky)
    }
}

#[derive(Debug, Deserialize)]
struct SlowQuery {
    ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FlakyQuery {
    every: Option<u64>,
}

async fn handle_hello(State(stats): State<TestServerStats>) -> &'static str {
    stats.inc_requests_total();
    "Hello World!"
}

async fn handle_slow(
    State(stats): State<TestServerStats>,
    Query(query): Query<SlowQuery>,
) -> &'static str {
    stats.inc_requests_total();
    sleep(Duration::from_millis(query.ms.unwrap_or(DEFAULT_SLOW_MS))).await;
    "slow"
}

async fn handle_flaky(
    State(stats): State<TestServerStats>,
    Query(query): Query<FlakyQuery>,
) -> (StatusCode, &'static str) {
    stats.inc_requests_total();
    let seq = stats.flaky_seq.fetch_add(1, Ordering::Relaxed) + 1;
    match query.every {
        Some(every) if every > 0 && seq % every == 0 => {
            stats.inc_errors_served();
            (StatusCode::INTERNAL_SERVER_ERROR, "flaky")
        }
        _ => (StatusCode::OK, "ok"),
    }
}

async fn handle_status(
    State(stats): State<TestServerStats>,
    Path(code): Path<u16>,
) -> (StatusCode, String) {
    stats.inc_requests_total();
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    if status.is_client_error() || status.is_server_error() {
        stats.inc_errors_served();
    }
    (status, status.as_str().to_string())
}

pub fn router(stats: TestServerStats) -> Router {
    Router::new()
        .route(PATH_HELLO, get(handle_hello))
        .route(PATH_SLOW, get(handle_slow))
        .route(PATH_FLAKY, get(handle_flaky))
        .route(PATH_STATUS, get(handle_status))
        .with_state(stats)
}

pub struct TestServer {
    addr: SocketAddr,
    urls: TestServerUrls,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Binds an ephemeral loopback port.
    pub async fn start() -> std::io::Result<Self> {
        Self::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await
    }

    pub async fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let stopped = async move {
                shutdown_rx.await.ok();
            };
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(stopped)
                .await
            {
                eprintln!("stampede-testserver: {err}");
            }
        });

        Ok(Self {
            addr,
            urls: TestServerUrls::new(format!("http://{addr}")),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.urls.base_url
    }

    pub fn urls(&self) -> &TestServerUrls {
        &self.urls
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            tx.send(()).ok();
        }
        if let Some(task) = self.task.take() {
            task.await.ok();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
