use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{Map, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

use echgo_common::{ErrorResponse, Message, ECHO_PATH};

pub mod config;
pub mod metrics;

use config::SERVER_KIND;
pub use metrics::{AccessMetrics, Clock, SystemClock};

#[derive(Clone)]
pub struct AppState {
    /// Name this server replies with.
    pub name: String,
    pub metrics: Arc<AccessMetrics>,
    /// Messages received so far; numbers the replies.
    pub received: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(name: impl Into<String>, metrics: Arc<AccessMetrics>) -> Self {
        Self {
            name: name.into(),
            metrics,
            received: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: SocketAddr,
    pub name: String,
}

/// Echo server
pub struct Server {
    config: ServerConfig,
    metrics: Arc<AccessMetrics>,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self::with_metrics(config, Arc::new(AccessMetrics::new()))
    }

    /// Create a server that records into existing metrics.
    pub fn with_metrics(config: ServerConfig, metrics: Arc<AccessMetrics>) -> Self {
        Self { config, metrics }
    }

    /// Get the server's configured address
    pub fn address(&self) -> SocketAddr {
        self.config.address
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Metrics shared with the request handlers.
    pub fn metrics(&self) -> Arc<AccessMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Create the application router with the given state
    pub fn create_router(state: AppState) -> Router {
        Router::new()
            .route(ECHO_PATH, post(handle_echo))
            .fallback(handle_not_found)
            .with_state(state)
    }

    /// Serve until `shutdown` resolves, signalling `ready_tx` with the bound
    /// address once accepting connections.
    pub async fn run(
        &self,
        ready_tx: tokio::sync::oneshot::Sender<SocketAddr>,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let state = AppState::new(self.config.name.clone(), self.metrics());
        let app = Self::create_router(state);
        let listener = tokio::net::TcpListener::bind(self.config.address).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, name = %self.config.name, "bound echo server");
        ready_tx.send(local_addr).ok();
        axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;
        Ok(())
    }

    /// Log the metrics summary and append the metrics record to `path`
    /// (skipped when `path` is empty).
    pub fn shutdown(&self, path: impl AsRef<Path>) -> echgo_common::Result<()> {
        info!("{}", self.metrics);
        let mut extra = Map::new();
        extra.insert("server".to_string(), Value::from(SERVER_KIND));
        self.metrics.write(path, &extra)
    }
}

/// Handler for POST /echo: counts the access against the sender and replies
/// with a numbered acknowledgement.
///
/// Requests whose body is not a valid message are rejected before anything is
/// counted.
pub async fn handle_echo(
    State(state): State<AppState>,
    payload: Result<Json<Message>, JsonRejection>,
) -> Response {
    let Json(msg) = match payload {
        Ok(msg) => msg,
        Err(rejection) => {
            debug!("rejected echo request: {}", rejection.body_text());
            return error_response(rejection.status(), rejection.body_text());
        }
    };

    let n = state.received.fetch_add(1, Ordering::Relaxed) + 1;
    trace!(sender = %msg.sender, message = %msg.message, "received");
    state.metrics.increment(&msg.sender);

    let reply = Message {
        sender: state.name.clone(),
        message: format!("reply msg #{n}"),
    };

    state.metrics.complete();
    (StatusCode::OK, Json(reply)).into_response()
}

/// Fallback for unknown routes.
pub async fn handle_not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}
