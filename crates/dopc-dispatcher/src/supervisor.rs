//! Worker supervision: launching, reachability gating, and restarts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::Bytes;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::http_client::{build_http_client, HttpClient};
use crate::load_balancer::WorkerPool;
use crate::worker::WorkerRecord;

/// Starts one worker instance bound to a port.
///
/// The returned handle is the worker's task; aborting it tears the instance
/// down. The CLI's launcher runs a full pricing stack; tests substitute
/// stubs. Launch itself is synchronous; readiness is established
/// separately by polling the worker's liveness endpoint.
pub trait WorkerLauncher: Send + Sync + 'static {
    fn launch(&self, port: u16) -> tokio::task::JoinHandle<()>;
}

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Host the workers bind and are reached on
    pub host: String,
    /// First worker port; worker `i` gets `base_port + i`
    pub base_port: u16,
    /// Number of worker instances to run
    pub num_workers: usize,
    /// How long to wait for a launched worker to answer its liveness probe
    pub startup_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            base_port: 8081,
            num_workers: 4,
            startup_timeout: Duration::from_secs(10),
        }
    }
}

/// Owns the worker task handles and drives launch/restart.
///
/// The routing table (`WorkerPool`) is shared with the dispatcher and the
/// health checker; the supervisor only writes to it when admitting workers.
pub struct WorkerSupervisor {
    launcher: Box<dyn WorkerLauncher>,
    config: SupervisorConfig,
    handles: Mutex<HashMap<u16, tokio::task::JoinHandle<()>>>,
    client: HttpClient,
}

impl WorkerSupervisor {
    pub fn new(launcher: impl WorkerLauncher, config: SupervisorConfig) -> Self {
        Self {
            launcher: Box::new(launcher),
            config,
            handles: Mutex::new(HashMap::new()),
            client: build_http_client(),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Launches every configured worker and admits the reachable ones.
    ///
    /// A worker that answers its liveness probe within `startup_timeout`
    /// joins the routing rotation immediately; one that does not is still
    /// recorded, but disabled; the health checker re-admits it if it comes
    /// up later. Startup never fails as a whole because of one worker.
    pub async fn start_all(&self, pool: &Arc<RwLock<WorkerPool>>) {
        info!("starting {} pricing workers", self.config.num_workers);

        for i in 0..self.config.num_workers {
            let port = self.config.base_port + i as u16;
            let handle = self.launcher.launch(port);
            self.handles.lock().await.insert(port, handle);

            let addr = format!("{}:{}", self.config.host, port);
            let reachable = self.wait_reachable(&addr).await;

            let mut pool = pool.write().await;
            pool.add_worker(WorkerRecord::new(&self.config.host, port, reachable));
            if reachable {
                info!("worker on {addr} is up and eligible for routing");
            } else {
                warn!("worker on {addr} did not become reachable; admitted disabled");
            }
        }
    }

    /// Tears down and relaunches the worker on `port`.
    ///
    /// Returns an error message when the relaunched worker does not become
    /// reachable; the caller decides whether that is fatal (the health
    /// checker just logs it and waits for the next cycle).
    pub async fn restart(&self, port: u16) -> Result<(), String> {
        if let Some(old) = self.handles.lock().await.remove(&port) {
            old.abort();
        }
        info!("restarting worker on port {port}");

        let handle = self.launcher.launch(port);
        self.handles.lock().await.insert(port, handle);

        let addr = format!("{}:{}", self.config.host, port);
        if self.wait_reachable(&addr).await {
            Ok(())
        } else {
            Err(format!("restarted worker on {addr} did not become reachable"))
        }
    }

    /// Stops the worker on `port`, leaving its pool record untouched.
    pub async fn stop(&self, port: u16) {
        if let Some(handle) = self.handles.lock().await.remove(&port) {
            handle.abort();
        }
    }

    /// Stops every supervised worker.
    pub async fn stop_all(&self) {
        let mut handles = self.handles.lock().await;
        for (_, handle) in handles.drain() {
            handle.abort();
        }
    }

    /// Polls the worker's liveness endpoint until it answers 200 or the
    /// startup timeout elapses.
    async fn wait_reachable(&self, addr: &str) -> bool {
        let deadline = tokio::time::Instant::now() + self.config.startup_timeout;
        let url = format!("http://{addr}/health");

        while tokio::time::Instant::now() < deadline {
            let request = hyper::Request::builder()
                .method("GET")
                .uri(&url)
                .body(Full::new(Bytes::new()));
            if let Ok(request) = request {
                if let Ok(Ok(response)) = tokio::time::timeout(
                    Duration::from_millis(500),
                    self.client.request(request),
                )
                .await
                {
                    if response.status().is_success() {
                        return true;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supervisor_config_default() {
        let config = SupervisorConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.base_port, 8081);
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.startup_timeout, Duration::from_secs(10));
    }
}
