//! Periodic worker liveness checking.
//!
//! The checker probes every worker concurrently on a fixed interval and
//! applies each outcome as one batched update under a single write lock, so
//! routing never observes a half-applied transition. Crossing the failure
//! threshold excludes a worker from routing and triggers a supervisor
//! restart; a disabled worker that passes a probe is re-admitted.

use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::Bytes;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::http_client::{build_http_client, HttpClient};
use crate::load_balancer::WorkerPool;
use crate::supervisor::WorkerSupervisor;
use crate::worker::{ProbeStatus, WorkerRecord};

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    pub interval: Duration,
    pub timeout: Duration,
    pub failure_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_millis(2000),
            failure_threshold: 3,
        }
    }
}

/// Batched probe outcome to apply atomically.
pub struct ProbeOutcome {
    pub addr: String,
    pub port: u16,
    pub status: ProbeStatus,
    pub should_enable: bool,
    pub should_disable: bool,
}

/// Background worker health checker.
pub struct HealthChecker {
    pool: Arc<RwLock<WorkerPool>>,
    supervisor: Arc<WorkerSupervisor>,
    config: HealthCheckConfig,
    client: HttpClient,
}

impl HealthChecker {
    pub fn new(
        pool: Arc<RwLock<WorkerPool>>,
        supervisor: Arc<WorkerSupervisor>,
        config: HealthCheckConfig,
    ) -> Self {
        Self {
            pool,
            supervisor,
            config,
            client: build_http_client(),
        }
    }

    /// Starts the health checker task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Main health check loop
    async fn run(self) {
        let mut interval = tokio::time::interval(self.config.interval);
        loop {
            interval.tick().await;
            self.check_all_workers().await;
        }
    }

    /// One full sweep: probe every worker concurrently, then apply the
    /// outcomes in order.
    pub async fn check_all_workers(&self) {
        let workers = {
            let pool = self.pool.read().await;
            pool.all_workers()
        };

        let probes: Vec<_> = workers
            .into_iter()
            .map(|worker| {
                let client = &self.client;
                let timeout = self.config.timeout;
                async move {
                    let result = Self::probe_worker(client, &worker.addr, timeout).await;
                    (worker, result)
                }
            })
            .collect();

        let results = futures::future::join_all(probes).await;

        for (worker, result) in results {
            let outcome = self.process_result(&worker, result).await;
            self.apply_outcome(outcome).await;
        }
    }

    /// Probes one worker's liveness endpoint.
    async fn probe_worker(
        client: &HttpClient,
        addr: &str,
        timeout: Duration,
    ) -> Result<(), String> {
        let url = format!("http://{addr}/health");
        let request = hyper::Request::builder()
            .method("GET")
            .uri(&url)
            .body(Full::new(Bytes::new()))
            .map_err(|e| format!("failed to build probe request: {e}"))?;

        let response = tokio::time::timeout(timeout, client.request(request))
            .await
            .map_err(|_| format!("probe timed out after {}ms", timeout.as_millis()))?
            .map_err(|e| format!("probe request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("probe returned status {}", response.status()));
        }
        Ok(())
    }

    /// Turns a probe result into the transition to apply.
    async fn process_result(
        &self,
        worker: &WorkerRecord,
        result: Result<(), String>,
    ) -> ProbeOutcome {
        match result {
            Ok(()) => ProbeOutcome {
                addr: worker.addr.clone(),
                port: worker.port,
                status: ProbeStatus::Healthy,
                should_enable: !worker.enabled,
                should_disable: false,
            },
            Err(reason) => {
                let failures = {
                    let pool = self.pool.read().await;
                    pool.consecutive_failures(&worker.addr) + 1
                };
                ProbeOutcome {
                    addr: worker.addr.clone(),
                    port: worker.port,
                    status: ProbeStatus::Unhealthy(reason),
                    should_enable: false,
                    should_disable: worker.enabled && failures >= self.config.failure_threshold,
                }
            }
        }
    }

    /// Applies one outcome atomically; a disable also schedules a restart.
    ///
    /// The restart runs as its own task: supervision failures are logged
    /// and never take the checker (or the dispatcher) down with them.
    async fn apply_outcome(&self, outcome: ProbeOutcome) {
        let failure_reason = match &outcome.status {
            ProbeStatus::Unhealthy(reason) => Some(reason.clone()),
            ProbeStatus::Healthy => None,
        };

        let mut pool = self.pool.write().await;
        pool.record_probe(&outcome.addr, outcome.status);

        if outcome.should_enable {
            pool.set_enabled(&outcome.addr, true);
            info!("worker {} re-admitted after passing health probe", outcome.addr);
        }

        if outcome.should_disable {
            let failures = pool.consecutive_failures(&outcome.addr);
            pool.set_enabled(&outcome.addr, false);
            warn!(
                "worker {} excluded after {} consecutive failed probes: {}",
                outcome.addr,
                failures,
                failure_reason.unwrap_or_else(|| "unknown error".to_string())
            );
            drop(pool);

            let supervisor = Arc::clone(&self.supervisor);
            let port = outcome.port;
            tokio::spawn(async move {
                if let Err(reason) = supervisor.restart(port).await {
                    error!("failed to restart worker on port {port}: {reason}");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::{SupervisorConfig, WorkerLauncher};

    /// Launcher whose workers are tasks that never serve anything.
    struct NullLauncher;

    impl WorkerLauncher for NullLauncher {
        fn launch(&self, _port: u16) -> tokio::task::JoinHandle<()> {
            tokio::spawn(async {})
        }
    }

    fn checker_with_pool(
        pool: Arc<RwLock<WorkerPool>>,
        config: HealthCheckConfig,
    ) -> HealthChecker {
        let supervisor = Arc::new(WorkerSupervisor::new(NullLauncher, SupervisorConfig::default()));
        HealthChecker::new(pool, supervisor, config)
    }

    fn outcome(addr: &str, port: u16, status: ProbeStatus, enable: bool, disable: bool) -> ProbeOutcome {
        ProbeOutcome {
            addr: addr.to_string(),
            port,
            status,
            should_enable: enable,
            should_disable: disable,
        }
    }

    #[test]
    fn test_health_check_config_default() {
        let config = HealthCheckConfig::default();
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.timeout, Duration::from_millis(2000));
        assert_eq!(config.failure_threshold, 3);
    }

    #[tokio::test]
    async fn test_apply_outcome_disables_worker() {
        let pool = Arc::new(RwLock::new(WorkerPool::new()));
        pool.write()
            .await
            .add_worker(WorkerRecord::new("127.0.0.1", 9001, true));

        let checker = checker_with_pool(Arc::clone(&pool), HealthCheckConfig::default());
        checker
            .apply_outcome(outcome(
                "127.0.0.1:9001",
                9001,
                ProbeStatus::Unhealthy("connection refused".to_string()),
                false,
                true,
            ))
            .await;

        assert!(pool.read().await.enabled_workers().is_empty());
    }

    #[tokio::test]
    async fn test_apply_outcome_readmits_worker() {
        let pool = Arc::new(RwLock::new(WorkerPool::new()));
        pool.write()
            .await
            .add_worker(WorkerRecord::new("127.0.0.1", 9001, false));

        let checker = checker_with_pool(Arc::clone(&pool), HealthCheckConfig::default());
        checker
            .apply_outcome(outcome("127.0.0.1:9001", 9001, ProbeStatus::Healthy, true, false))
            .await;

        assert_eq!(
            pool.read().await.enabled_workers(),
            vec!["127.0.0.1:9001".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failures_below_threshold_keep_worker_enabled() {
        let pool = Arc::new(RwLock::new(WorkerPool::new()));
        pool.write()
            .await
            .add_worker(WorkerRecord::new("127.0.0.1", 9001, true));

        let config = HealthCheckConfig {
            failure_threshold: 3,
            ..Default::default()
        };
        let checker = checker_with_pool(Arc::clone(&pool), config);

        // Two failures: streak advances but the worker stays routable.
        for _ in 0..2 {
            let workers = pool.read().await.all_workers();
            let result = Err("probe timed out after 2000ms".to_string());
            let outcome = checker.process_result(&workers[0], result).await;
            assert!(!outcome.should_disable);
            checker.apply_outcome(outcome).await;
        }

        let pool = pool.read().await;
        assert_eq!(pool.consecutive_failures("127.0.0.1:9001"), 2);
        assert_eq!(pool.enabled_workers().len(), 1);
    }

    #[tokio::test]
    async fn test_threshold_crossing_disables_worker() {
        let pool = Arc::new(RwLock::new(WorkerPool::new()));
        pool.write()
            .await
            .add_worker(WorkerRecord::new("127.0.0.1", 9001, true));

        let config = HealthCheckConfig {
            failure_threshold: 3,
            ..Default::default()
        };
        let checker = checker_with_pool(Arc::clone(&pool), config);

        for _ in 0..3 {
            let workers = pool.read().await.all_workers();
            let worker = workers.iter().find(|w| w.port == 9001).unwrap();
            let result = Err("connection refused".to_string());
            let outcome = checker.process_result(worker, result).await;
            checker.apply_outcome(outcome).await;
        }

        assert!(pool.read().await.enabled_workers().is_empty());
    }

    #[tokio::test]
    async fn test_healthy_probe_resets_failure_streak() {
        let pool = Arc::new(RwLock::new(WorkerPool::new()));
        pool.write()
            .await
            .add_worker(WorkerRecord::new("127.0.0.1", 9001, true));

        let checker = checker_with_pool(Arc::clone(&pool), HealthCheckConfig::default());

        let workers = pool.read().await.all_workers();
        let failing = checker
            .process_result(&workers[0], Err("timeout".to_string()))
            .await;
        checker.apply_outcome(failing).await;
        assert_eq!(pool.read().await.consecutive_failures("127.0.0.1:9001"), 1);

        let workers = pool.read().await.all_workers();
        let healthy = checker.process_result(&workers[0], Ok(())).await;
        checker.apply_outcome(healthy).await;
        assert_eq!(pool.read().await.consecutive_failures("127.0.0.1:9001"), 0);
    }
}
