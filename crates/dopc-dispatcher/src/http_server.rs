//! The dispatcher's HTTP surface: round-robin request forwarding.
//!
//! The dispatcher serves the same pricing endpoint as the workers and
//! proxies each request to the next enabled worker, passing the worker's
//! status and body back verbatim; pricing semantics are never
//! reinterpreted here.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use dopc_core::error::PricingError;
use dopc_core::types::{ErrorResponse, PRICE_ENDPOINT};

use crate::http_client::{build_http_client, HttpClient};
use crate::load_balancer::WorkerPool;

/// Dispatcher server configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Timeout for one forwarded request, end to end
    pub forward_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            forward_timeout: Duration::from_secs(30),
        }
    }
}

struct DispatcherState {
    pool: Arc<RwLock<WorkerPool>>,
    client: HttpClient,
    forward_timeout: Duration,
}

/// HTTP server routing client requests across the worker fleet.
pub struct DispatcherServer {
    state: Arc<DispatcherState>,
}

impl DispatcherServer {
    pub fn new(pool: Arc<RwLock<WorkerPool>>, config: DispatcherConfig) -> Self {
        Self {
            state: Arc::new(DispatcherState {
                pool,
                client: build_http_client(),
                forward_timeout: config.forward_timeout,
            }),
        }
    }

    /// The axum router serving the dispatcher.
    pub fn router(&self) -> axum::Router {
        axum::Router::new()
            .route(PRICE_ENDPOINT, axum::routing::get(forward_handler))
            .route("/health", axum::routing::get(health_handler))
            .layer(CorsLayer::permissive())
            .with_state(Arc::clone(&self.state))
    }

    /// Binds and serves until shutdown.
    pub async fn run(self, addr: SocketAddr) -> dopc_core::error::Result<()> {
        let app = self.router();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| PricingError::Transport(format!("failed to bind to {addr}: {e}")))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| PricingError::Transport(format!("failed to get local addr: {e}")))?;
        info!("dispatcher listening on {local_addr}");

        axum::serve(listener, app)
            .await
            .map_err(|e| PricingError::Transport(format!("server error: {e}")))?;

        Ok(())
    }
}

/// Forwards one pricing request to the next enabled worker.
async fn forward_handler(
    State(state): State<Arc<DispatcherState>>,
    RawQuery(query): RawQuery,
) -> Response {
    let worker = {
        let mut pool = state.pool.write().await;
        pool.next_worker()
    };
    let Some(worker) = worker else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("no healthy workers available")),
        )
            .into_response();
    };
    debug!(worker = %worker, "forwarding request");

    match forward_to(&state, &worker, query.as_deref()).await {
        Ok(response) => response,
        Err(reason) => {
            warn!("failed to forward request to {worker}: {reason}");
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse::new(format!("failed to reach worker: {reason}"))),
            )
                .into_response()
        }
    }
}

/// One proxied GET: worker status and body come back untouched.
async fn forward_to(
    state: &DispatcherState,
    worker: &str,
    query: Option<&str>,
) -> Result<Response, String> {
    let uri = match query {
        Some(query) => format!("http://{worker}{PRICE_ENDPOINT}?{query}"),
        None => format!("http://{worker}{PRICE_ENDPOINT}"),
    };
    let request = hyper::Request::builder()
        .method("GET")
        .uri(&uri)
        .body(Full::new(Bytes::new()))
        .map_err(|e| format!("failed to build request: {e}"))?;

    let response = tokio::time::timeout(state.forward_timeout, state.client.request(request))
        .await
        .map_err(|_| {
            format!(
                "worker did not answer within {}ms",
                state.forward_timeout.as_millis()
            )
        })?
        .map_err(|e| format!("request failed: {e}"))?;

    let (parts, body) = response.into_parts();
    let bytes = body
        .collect()
        .await
        .map_err(|e| format!("failed to read worker response: {e}"))?
        .to_bytes();

    let mut builder = Response::builder().status(parts.status);
    if let Some(content_type) = parts.headers.get(hyper::header::CONTENT_TYPE) {
        builder = builder.header(hyper::header::CONTENT_TYPE, content_type);
    }
    builder
        .body(Body::from(bytes))
        .map_err(|e| format!("failed to assemble response: {e}"))
}

/// Liveness view of the dispatcher itself.
async fn health_handler(State(state): State<Arc<DispatcherState>>) -> Json<serde_json::Value> {
    let enabled = state.pool.read().await.enabled_workers().len();
    Json(serde_json::json!({"status": "healthy", "enabled_workers": enabled}))
}
