//! Full-system integration test: dispatcher + supervised pricing workers +
//! mock upstream venue API, driven over HTTP like a real client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Path;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::RwLock;

use dopc_core::types::PRICE_ENDPOINT;
use dopc_dispatcher::{
    DispatcherConfig, DispatcherServer, SupervisorConfig, WorkerLauncher, WorkerPool,
    WorkerSupervisor,
};
use dopc_server::{HttpServer, PriceOrchestrator, ServerConfig};
use dopc_upstream::{PoolConfig, UpstreamPool, VenueHttpClient};

// ============================================================================
// Test helpers
// ============================================================================

async fn static_handler(Path(_venue_slug): Path<String>) -> Json<serde_json::Value> {
    Json(json!({
        "venue_raw": {
            "location": {
                "coordinates": [24.92813512, 60.17012143]
            }
        }
    }))
}

async fn dynamic_handler(Path(_venue_slug): Path<String>) -> Json<serde_json::Value> {
    Json(json!({
        "venue_raw": {
            "delivery_specs": {
                "order_minimum_no_surcharge": 1000,
                "delivery_pricing": {
                    "base_price": 190,
                    "distance_ranges": [
                        {"min": 0, "max": 500, "a": 0, "b": 0},
                        {"min": 500, "max": 1000, "a": 100, "b": 0},
                        {"min": 1000, "max": 1500, "a": 200, "b": 0},
                        {"min": 1500, "max": 2000, "a": 200, "b": 1},
                        {"min": 2000, "max": 0, "a": 0, "b": 0}
                    ]
                }
            }
        }
    }))
}

async fn spawn_mock_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/home-assignment-api/v1/venues/{venue_slug}/static", get(static_handler))
        .route("/home-assignment-api/v1/venues/{venue_slug}/dynamic", get(dynamic_handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Launches complete pricing workers, each with its own upstream pool.
struct TestWorkerLauncher {
    base_url: String,
}

impl WorkerLauncher for TestWorkerLauncher {
    fn launch(&self, port: u16) -> tokio::task::JoinHandle<()> {
        let base_url = self.base_url.clone();
        tokio::spawn(async move {
            let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
            let pool_config = PoolConfig {
                static_pool_size: 2,
                dynamic_pool_size: 2,
                ..Default::default()
            };
            let pool = Arc::new(UpstreamPool::new(base_url, pool_config));
            let client = VenueHttpClient::new(pool);
            let server = HttpServer::new(PriceOrchestrator::new(client), ServerConfig::default());
            let _ = server.run(addr).await;
        })
    }
}

async fn spawn_dispatcher(pool: Arc<RwLock<WorkerPool>>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let server = DispatcherServer::new(pool, DispatcherConfig::default());
    tokio::spawn(async move {
        let _ = server.run(addr).await;
    });

    let client = reqwest::Client::new();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        if std::time::Instant::now() > deadline {
            panic!("dispatcher did not start within timeout");
        }
        if client.get(format!("http://{addr}/health")).send().await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    addr
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_worked_example_through_the_full_fleet() {
    let upstream = spawn_mock_upstream().await;
    let launcher = TestWorkerLauncher {
        base_url: format!("http://{upstream}/home-assignment-api/v1"),
    };
    let supervisor = WorkerSupervisor::new(
        launcher,
        SupervisorConfig {
            host: "127.0.0.1".to_string(),
            base_port: 52000,
            num_workers: 2,
            startup_timeout: Duration::from_secs(5),
        },
    );

    let pool = Arc::new(RwLock::new(WorkerPool::new()));
    supervisor.start_all(&pool).await;
    assert_eq!(pool.read().await.enabled_workers().len(), 2);

    let dispatcher = spawn_dispatcher(Arc::clone(&pool)).await;
    let url = format!(
        "http://{dispatcher}{PRICE_ENDPOINT}?venue_slug=home-assignment-venue-helsinki&cart_value=2000&user_lat=60.17094&user_lon=24.93087"
    );

    // Several requests so both workers serve at least one.
    for _ in 0..4 {
        let response = reqwest::get(&url).await.unwrap();
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(
            body,
            json!({
                "total_price": 2190,
                "small_order_surcharge": 0,
                "cart_value": 2000,
                "delivery": {"fee": 190, "distance": 177}
            })
        );
    }

    supervisor.stop_all().await;
}

#[tokio::test]
async fn test_validation_error_through_the_full_fleet() {
    let upstream = spawn_mock_upstream().await;
    let launcher = TestWorkerLauncher {
        base_url: format!("http://{upstream}/home-assignment-api/v1"),
    };
    let supervisor = WorkerSupervisor::new(
        launcher,
        SupervisorConfig {
            host: "127.0.0.1".to_string(),
            base_port: 52010,
            num_workers: 1,
            startup_timeout: Duration::from_secs(5),
        },
    );

    let pool = Arc::new(RwLock::new(WorkerPool::new()));
    supervisor.start_all(&pool).await;
    let dispatcher = spawn_dispatcher(Arc::clone(&pool)).await;

    // Latitude 200 must come back as the worker's 400, proxied unchanged.
    let url = format!(
        "http://{dispatcher}{PRICE_ENDPOINT}?venue_slug=home-assignment-venue-helsinki&cart_value=2000&user_lat=200&user_lon=24.93087"
    );
    let response = reqwest::get(&url).await.unwrap();
    assert_eq!(response.status(), 400);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("user_lat"));

    supervisor.stop_all().await;
}
