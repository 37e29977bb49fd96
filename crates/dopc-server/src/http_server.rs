//! HTTP server for a single pricing worker.
//!
//! One pricing endpoint plus a liveness endpoint for the dispatcher's
//! probes. Request intake passes a bounded concurrency gate before touching
//! the pipeline; the gate is defense-in-depth against unbounded in-flight
//! growth even when the hosting server already applies backpressure.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use dopc_core::error::PricingError;
use dopc_core::types::{ErrorResponse, PRICE_ENDPOINT};
use dopc_core::validate::RawOrderParams;
use dopc_upstream::VenueDataSource;

use crate::orchestrator::PriceOrchestrator;

/// Worker server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of requests allowed in flight at once
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 5000,
        }
    }
}

struct WorkerState<S> {
    orchestrator: PriceOrchestrator<S>,
    gate: Semaphore,
}

/// HTTP server wrapping one pricing orchestrator.
pub struct HttpServer<S> {
    state: Arc<WorkerState<S>>,
}

impl<S: VenueDataSource + 'static> HttpServer<S> {
    pub fn new(orchestrator: PriceOrchestrator<S>, config: ServerConfig) -> Self {
        Self {
            state: Arc::new(WorkerState {
                orchestrator,
                gate: Semaphore::new(config.max_concurrent_requests.max(1)),
            }),
        }
    }

    /// The axum router serving this worker. Exposed so tests can drive the
    /// routes without binding a socket.
    pub fn router(&self) -> axum::Router {
        axum::Router::new()
            .route(PRICE_ENDPOINT, axum::routing::get(price_handler::<S>))
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
        info!("pricing worker listening on {local_addr}");

        axum::serve(listener, app)
            .await
            .map_err(|e| PricingError::Transport(format!("server error: {e}")))?;

        Ok(())
    }
}

/// Handles `GET /api/v1/delivery-order-price`.
///
/// Acquires a concurrency permit (queueing when the worker is saturated),
/// hands the raw query parameters to the pipeline, and renders either the
/// price breakdown or the uniform error body.
async fn price_handler<S: VenueDataSource + 'static>(
    State(state): State<Arc<WorkerState<S>>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Ok(_permit) = state.gate.acquire().await else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("server too busy")),
        )
            .into_response();
    };

    let raw = RawOrderParams {
        venue_slug: params.get("venue_slug").cloned(),
        cart_value: params.get("cart_value").cloned(),
        user_lat: params.get("user_lat").cloned(),
        user_lon: params.get("user_lon").cloned(),
    };

    match state.orchestrator.price_order(raw).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => {
            match &err {
                PricingError::Validation { .. } | PricingError::DistanceExceeded { .. } => {}
                other => warn!(error = %other, "request failed"),
            }
            render_error(&err)
        }
    }
}

/// Liveness endpoint probed by the dispatcher.
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy"}))
}

/// Renders any pipeline error as the uniform `{"success": false, ...}` body
/// with the category's HTTP status.
fn render_error(err: &PricingError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorResponse::new(err.to_string()))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.max_concurrent_requests, 5000);
    }

    #[test]
    fn test_zero_gate_is_clamped() {
        // A misconfigured zero-permit gate would deadlock every request.
        let config = ServerConfig {
            max_concurrent_requests: 0,
        };
        assert_eq!(config.max_concurrent_requests.max(1), 1);
    }

    #[test]
    fn test_render_error_maps_categories() {
        let response = render_error(&PricingError::UpstreamTimeout { elapsed_ms: 100 });
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

        let response = render_error(&PricingError::DistanceExceeded { distance: 9000 });
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = render_error(&PricingError::UpstreamStatus { status: 404 });
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
