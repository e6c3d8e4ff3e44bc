//! In-memory queue server speaking the `/put`, `/take` and `/stats` API.
//!
//! Used to run the benchmark locally and from tests. Faults can be injected
//! through [`MockQueueConfig`].

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use queue_types::{PutItem, QueueStats, StatsSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex, Notify};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

/// Upper bound on how long a single `/take` may poll
const MAX_TAKE_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Default)]
pub struct MockQueueConfig {
    /// Answer every `/put` with 500
    pub fail_puts: bool,
    /// Answer every `/take` with 500
    pub fail_takes: bool,
    /// Answer every `/stats` with 500
    pub fail_stats: bool,
    /// Answer every `/stats` with 200 and a body that is not JSON
    pub malformed_stats: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<PutItem>,
    num_queued: u64,
}

/// The queues behind the server
#[derive(Debug, Default)]
pub struct QueueStore {
    queues: Mutex<HashMap<String, QueueState>>,
    /// Wakes pollers blocked in `take` when an item is put
    available: Notify,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item and return the queue's new `num-queued`
    pub async fn put(&self, queue: &str, item: PutItem) -> u64 {
        let num_queued = {
            let mut queues = self.queues.lock().await;
            let state = queues.entry(queue.to_string()).or_default();
            state.items.push_back(item);
            state.num_queued += 1;
            state.num_queued
        };
        self.available.notify_waiters();
        num_queued
    }

    pub async fn try_take(&self, queue: &str) -> Option<PutItem> {
        let mut queues = self.queues.lock().await;
        queues.get_mut(queue)?.items.pop_front()
    }

    /// Pop the oldest item, waiting up to `timeout` for one to arrive
    pub async fn take(&self, queue: &str, timeout: Duration) -> Option<PutItem> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register before checking so a put in between is not missed
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_take(queue).await {
                return Some(item);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    pub async fn stats(&self) -> StatsSnapshot {
        let queues = self.queues.lock().await;
        StatsSnapshot::new(
            queues
                .iter()
                .map(|(name, state)| {
                    let stats = QueueStats {
                        num_queued: state.num_queued,
                        num_pending: Some(state.items.len() as u64),
                    };
                    (name.clone(), stats)
                })
                .collect(),
        )
    }
}

#[derive(Clone)]
struct AppState {
    store: Arc<QueueStore>,
    config: Arc<MockQueueConfig>,
}

#[derive(Debug, Deserialize)]
struct PutParams {
    queue: String,
}

#[derive(Debug, Deserialize)]
struct TakeParams {
    queue: String,
    #[serde(rename = "timeout-millis", default)]
    timeout_millis: u64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn injected_failure(endpoint: &str) -> Response {
    let response = ErrorResponse {
        error: format!("Injected /{} failure", endpoint),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response()
}

/// POST /put?queue=<name>
async fn put_handler(
    State(state): State<AppState>,
    Query(params): Query<PutParams>,
    Json(item): Json<PutItem>,
) -> Response {
    if state.config.fail_puts {
        return injected_failure("put");
    }
    let num_queued = state.store.put(&params.queue, item).await;
    debug!(queue = %params.queue, num_queued, "put");
    StatusCode::OK.into_response()
}

/// POST /take?queue=<name>&timeout-millis=<ms>
async fn take_handler(
    State(state): State<AppState>,
    Query(params): Query<TakeParams>,
) -> Response {
    if state.config.fail_takes {
        return injected_failure("take");
    }
    let timeout = Duration::from_millis(params.timeout_millis.min(MAX_TAKE_TIMEOUT_MS));
    match state.store.take(&params.queue, timeout).await {
        Some(item) => (StatusCode::OK, Json(item)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// GET /stats
async fn stats_handler(State(state): State<AppState>) -> Response {
    if state.config.fail_stats {
        return injected_failure("stats");
    }
    if state.config.malformed_stats {
        return (StatusCode::OK, "num-queued: not json").into_response();
    }
    Json(state.store.stats().await).into_response()
}

/// Health check endpoint
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "mock-queue"
    }))
}

/// Build the HTTP routes over `store`
pub fn router(store: Arc<QueueStore>, config: MockQueueConfig) -> Router {
    let state = AppState {
        store,
        config: Arc::new(config),
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/put", post(put_handler))
        .route("/take", post(take_handler))
        .route("/stats", get(stats_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A mock queue server running on a background task
pub struct MockQueueServer {
    config: MockQueueConfig,
    store: Arc<QueueStore>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    port: u16,
}

impl MockQueueServer {
    pub fn new(config: MockQueueConfig) -> Self {
        Self {
            config,
            store: Arc::new(QueueStore::new()),
            shutdown_tx: None,
            port: 0,
        }
    }

    /// Bind to a free port on 127.0.0.1 and start serving; returns the port
    pub async fn start(&mut self) -> Result<u16> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        self.port = port;

        let app = router(self.store.clone(), self.config.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                warn!("Mock queue server error: {:#}", e);
            }
        });

        Ok(port)
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn store(&self) -> Arc<QueueStore> {
        self.store.clone()
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockQueueServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn put_request(queue: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/put?queue={}", queue))
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::to_vec(&PutItem::default()).unwrap(),
            ))
            .unwrap()
    }

    fn take_request(queue: &str, timeout_millis: u64) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/take?queue={}&timeout-millis={}", queue, timeout_millis))
            .body(Body::empty())
            .unwrap()
    }

    fn stats_request() -> Request<Body> {
        Request::builder()
            .uri("/stats")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_take_stats_over_routes() {
        let store = Arc::new(QueueStore::new());
        let app = router(store.clone(), MockQueueConfig::default());

        let resp = app.clone().oneshot(put_request("q1")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app.clone().oneshot(take_request("q1", 10)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let item: PutItem = serde_json::from_slice(&body).unwrap();
        assert_eq!(item, PutItem::default());

        let resp = app.clone().oneshot(take_request("q1", 10)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = app.oneshot(stats_request()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["q1"]["num-queued"], 1);
        assert_eq!(value["q1"]["num-pending"], 0);
    }

    #[tokio::test]
    async fn test_take_without_queue_param_is_rejected() {
        let app = router(Arc::new(QueueStore::new()), MockQueueConfig::default());
        let req = Request::builder()
            .method("POST")
            .uri("/take")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let config = MockQueueConfig {
            fail_puts: true,
            fail_stats: true,
            ..Default::default()
        };
        let store = Arc::new(QueueStore::new());
        let app = router(store.clone(), config);

        let resp = app.clone().oneshot(put_request("q1")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let resp = app.oneshot(stats_request()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert!(store.stats().await.is_empty());
    }

    #[tokio::test]
    async fn test_failing_takes_leave_items_queued() {
        let config = MockQueueConfig {
            fail_takes: true,
            ..Default::default()
        };
        let store = Arc::new(QueueStore::new());
        let app = router(store.clone(), config);

        let resp = app.clone().oneshot(put_request("q1")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let resp = app.oneshot(take_request("q1", 10)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let stats = store.stats().await;
        let q = stats.get(&queue_types::QueueName::new("q1")).unwrap();
        assert_eq!(q.num_pending, Some(1));
    }

    #[tokio::test]
    async fn test_malformed_stats_body() {
        let config = MockQueueConfig {
            malformed_stats: true,
            ..Default::default()
        };
        let app = router(Arc::new(QueueStore::new()), config);

        let resp = app.oneshot(stats_request()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(serde_json::from_slice::<serde_json::Value>(&body).is_err());
    }

    #[tokio::test]
    async fn test_take_waits_for_late_put() {
        let store = Arc::new(QueueStore::new());

        let taker = tokio::spawn({
            let store = store.clone();
            async move { store.take("q", Duration::from_secs(5)).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.put("q", PutItem::new("late", 1)).await;

        let item = taker.await.unwrap().expect("take timed out");
        assert_eq!(item.item, "late");
    }

    #[tokio::test]
    async fn test_take_times_out_on_empty_queue() {
        let store = QueueStore::new();
        assert!(store.take("nothing", Duration::from_millis(20)).await.is_none());
        // Taking from an unknown queue does not create it
        assert!(store.stats().await.is_empty());
    }

    #[tokio::test]
    async fn test_num_queued_counts_every_put() {
        let store = QueueStore::new();
        for expected in 1..=3 {
            assert_eq!(store.put("q", PutItem::default()).await, expected);
        }
        store.try_take("q").await.unwrap();

        let stats = store.stats().await;
        let q = stats.get(&queue_types::QueueName::new("q")).unwrap();
        assert_eq!(q.num_queued, 3);
        assert_eq!(q.num_pending, Some(2));
    }

    #[tokio::test]
    async fn test_server_accepts_connections() {
        let mut server = MockQueueServer::new(MockQueueConfig::default());
        let port = server.start().await.unwrap();
        assert!(port > 0);

        let stream = tokio::net::TcpStream::connect(("127.0.0.1", port)).await;
        assert!(stream.is_ok());
        server.stop();
    }
}
