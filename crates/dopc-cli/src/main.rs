//! # DOPC CLI Entry Point
//!
//! Main binary for the delivery order price calculator service.
//!
//! ## Usage
//!
//! ```bash
//! # Start a single pricing worker
//! dopc serve -b 127.0.0.1:8000 --base-url http://localhost:10000/home-assignment-api/v1
//!
//! # Start the dispatcher with four supervised workers
//! dopc fleet -b 127.0.0.1:8000 --workers 4 --worker-port-start 8081
//! ```
//!
//! Logging defaults to `info` and honors `RUST_LOG`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use tokio::sync::RwLock;

use dopc_dispatcher::{
    DispatcherConfig, DispatcherServer, HealthCheckConfig, HealthChecker, SupervisorConfig,
    WorkerLauncher, WorkerPool, WorkerSupervisor,
};
use dopc_server::{HttpServer, PriceOrchestrator, ServerConfig};
use dopc_upstream::{PoolConfig, UpstreamPool, VenueHttpClient};

const DEFAULT_BASE_URL: &str =
    "https://consumer-api.development.dev.woltapi.com/home-assignment-api/v1";

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// DOPC - delivery order price calculation service
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands: a single worker, or a dispatched fleet.
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Fleet(FleetArgs),
}

/// Arguments for running a single pricing worker.
///
/// The worker serves the pricing endpoint directly, with its own upstream
/// connection pools and background pool health monitoring.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// start a single pricing worker
struct ServeArgs {
    /// address to bind the worker's HTTP server to
    #[argh(option, short = 'b', default = "\"127.0.0.1:8000\".into()")]
    bind: String,

    /// base URL of the upstream venue API
    #[argh(option, long = "base-url", default = "DEFAULT_BASE_URL.into()")]
    base_url: String,

    /// persistent connections held for the static endpoint category
    #[argh(option, long = "static-pool-size", default = "5")]
    static_pool_size: usize,

    /// persistent connections held for the dynamic endpoint category
    #[argh(option, long = "dynamic-pool-size", default = "5")]
    dynamic_pool_size: usize,

    /// seconds between upstream pool health checks
    #[argh(option, long = "pool-health-interval-secs", default = "30")]
    pool_health_interval_secs: u64,

    /// timeout for each upstream call in milliseconds
    #[argh(option, long = "upstream-timeout-ms", default = "30000")]
    upstream_timeout_ms: u64,

    /// venue slug used by pool health probes
    #[argh(
        option,
        long = "probe-venue",
        default = "\"home-assignment-venue-helsinki\".into()"
    )]
    probe_venue: String,

    /// maximum number of requests in flight per worker
    #[argh(option, long = "max-concurrent-requests", default = "5000")]
    max_concurrent_requests: usize,
}

/// Arguments for running the dispatcher with a supervised worker fleet.
///
/// The dispatcher launches the configured number of workers on consecutive
/// ports, round-robins client requests across the healthy ones, and
/// restarts workers that fail their liveness probes.
#[derive(FromArgs)]
#[argh(subcommand, name = "fleet")]
/// start the dispatcher and its worker fleet
struct FleetArgs {
    /// address to bind the dispatcher's HTTP server to
    #[argh(option, short = 'b', default = "\"127.0.0.1:8000\".into()")]
    bind: String,

    /// number of pricing workers to launch
    #[argh(option, long = "workers", default = "4")]
    workers: usize,

    /// first worker port; worker i binds worker-port-start + i
    #[argh(option, long = "worker-port-start", default = "8081")]
    worker_port_start: u16,

    /// host the workers bind and are probed on
    #[argh(option, long = "worker-host", default = "\"127.0.0.1\".into()")]
    worker_host: String,

    /// seconds between worker liveness probes
    #[argh(option, long = "health-check-interval", default = "5")]
    health_check_interval_secs: u64,

    /// timeout for each worker probe in milliseconds
    #[argh(option, long = "health-check-timeout", default = "2000")]
    health_check_timeout_ms: u64,

    /// consecutive failed probes before a worker is excluded and restarted
    #[argh(option, long = "failure-threshold", default = "3")]
    failure_threshold: u32,

    /// base URL of the upstream venue API
    #[argh(option, long = "base-url", default = "DEFAULT_BASE_URL.into()")]
    base_url: String,

    /// persistent connections held for the static endpoint category
    #[argh(option, long = "static-pool-size", default = "5")]
    static_pool_size: usize,

    /// persistent connections held for the dynamic endpoint category
    #[argh(option, long = "dynamic-pool-size", default = "5")]
    dynamic_pool_size: usize,

    /// seconds between upstream pool health checks
    #[argh(option, long = "pool-health-interval-secs", default = "30")]
    pool_health_interval_secs: u64,

    /// timeout for each upstream call in milliseconds
    #[argh(option, long = "upstream-timeout-ms", default = "30000")]
    upstream_timeout_ms: u64,

    /// venue slug used by pool health probes
    #[argh(
        option,
        long = "probe-venue",
        default = "\"home-assignment-venue-helsinki\".into()"
    )]
    probe_venue: String,

    /// maximum number of requests in flight per worker
    #[argh(option, long = "max-concurrent-requests", default = "5000")]
    max_concurrent_requests: usize,
}

/// Launches full pricing workers for the dispatcher's supervisor.
///
/// Each worker gets its own upstream connection pools and pool health
/// monitor, so a fleet is N independent copies of the whole pricing stack.
struct PricingWorkerLauncher {
    host: String,
    base_url: String,
    pool_config: PoolConfig,
    server_config: ServerConfig,
}

impl WorkerLauncher for PricingWorkerLauncher {
    fn launch(&self, port: u16) -> tokio::task::JoinHandle<()> {
        let bind = format!("{}:{}", self.host, port);
        let base_url = self.base_url.clone();
        let pool_config = self.pool_config.clone();
        let server_config = self.server_config.clone();

        tokio::spawn(async move {
            let addr: SocketAddr = match bind.parse() {
                Ok(addr) => addr,
                Err(e) => {
                    tracing::error!("invalid worker bind address {bind}: {e}");
                    return;
                }
            };

            let pool = Arc::new(UpstreamPool::new(base_url, pool_config));
            let monitor = Arc::clone(&pool).spawn_health_monitor();
            let client = VenueHttpClient::new(pool);
            let server = HttpServer::new(PriceOrchestrator::new(client), server_config);

            if let Err(e) = server.run(addr).await {
                tracing::error!("worker on port {port} exited: {e}");
            }
            monitor.abort();
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Default log level is INFO; RUST_LOG overrides.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Fleet(args) => run_fleet(args).await,
    }
}

/// Runs one pricing worker in the foreground.
async fn run_serve(args: ServeArgs) -> Result<()> {
    tracing::info!("starting pricing worker on {}", args.bind);
    tracing::info!("upstream venue API: {}", args.base_url);

    let addr: SocketAddr = args
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address {}: {}", args.bind, e))?;

    let pool_config = PoolConfig {
        static_pool_size: args.static_pool_size,
        dynamic_pool_size: args.dynamic_pool_size,
        health_check_interval: Duration::from_secs(args.pool_health_interval_secs),
        request_timeout: Duration::from_millis(args.upstream_timeout_ms),
        probe_venue: args.probe_venue,
    };
    let server_config = ServerConfig {
        max_concurrent_requests: args.max_concurrent_requests,
    };

    let pool = Arc::new(UpstreamPool::new(args.base_url, pool_config));
    let _monitor = Arc::clone(&pool).spawn_health_monitor();
    let client = VenueHttpClient::new(pool);
    let server = HttpServer::new(PriceOrchestrator::new(client), server_config);

    server.run(addr).await?;
    Ok(())
}

/// Runs the dispatcher and its supervised fleet in the foreground.
async fn run_fleet(args: FleetArgs) -> Result<()> {
    tracing::info!(
        "starting dispatcher on {} with {} workers from port {}",
        args.bind,
        args.workers,
        args.worker_port_start
    );

    let addr: SocketAddr = args
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address {}: {}", args.bind, e))?;

    let launcher = PricingWorkerLauncher {
        host: args.worker_host.clone(),
        base_url: args.base_url,
        pool_config: PoolConfig {
            static_pool_size: args.static_pool_size,
            dynamic_pool_size: args.dynamic_pool_size,
            health_check_interval: Duration::from_secs(args.pool_health_interval_secs),
            request_timeout: Duration::from_millis(args.upstream_timeout_ms),
            probe_venue: args.probe_venue,
        },
        server_config: ServerConfig {
            max_concurrent_requests: args.max_concurrent_requests,
        },
    };

    let supervisor = Arc::new(WorkerSupervisor::new(
        launcher,
        SupervisorConfig {
            host: args.worker_host,
            base_port: args.worker_port_start,
            num_workers: args.workers,
            startup_timeout: Duration::from_secs(10),
        },
    ));

    let pool = Arc::new(RwLock::new(WorkerPool::new()));
    supervisor.start_all(&pool).await;

    let checker = HealthChecker::new(
        Arc::clone(&pool),
        Arc::clone(&supervisor),
        HealthCheckConfig {
            interval: Duration::from_secs(args.health_check_interval_secs),
            timeout: Duration::from_millis(args.health_check_timeout_ms),
            failure_threshold: args.failure_threshold,
        },
    );
    let _checker_handle = checker.spawn();

    let server = DispatcherServer::new(pool, DispatcherConfig::default());
    server.run(addr).await?;
    Ok(())
}

/// CLI argument parsing tests.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_serve_defaults() {
        let cli: Cli = Cli::from_args(&["dopc"], &["serve"]).unwrap();
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.bind, "127.0.0.1:8000");
                assert_eq!(args.base_url, DEFAULT_BASE_URL);
                assert_eq!(args.static_pool_size, 5);
                assert_eq!(args.dynamic_pool_size, 5);
                assert_eq!(args.pool_health_interval_secs, 30);
                assert_eq!(args.upstream_timeout_ms, 30000);
                assert_eq!(args.max_concurrent_requests, 5000);
            }
            _ => panic!("expected serve command"),
        }
    }

    #[test]
    fn test_cli_parse_serve_custom_bind_and_pool() {
        let cli: Cli = Cli::from_args(
            &["dopc"],
            &[
                "serve",
                "-b",
                "0.0.0.0:9000",
                "--static-pool-size",
                "8",
                "--base-url",
                "http://localhost:10000/home-assignment-api/v1",
            ],
        )
        .unwrap();
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.bind, "0.0.0.0:9000");
                assert_eq!(args.static_pool_size, 8);
                assert_eq!(
                    args.base_url,
                    "http://localhost:10000/home-assignment-api/v1"
                );
            }
            _ => panic!("expected serve command"),
        }
    }

    #[test]
    fn test_cli_parse_fleet_defaults() {
        let cli: Cli = Cli::from_args(&["dopc"], &["fleet"]).unwrap();
        match cli.command {
            Commands::Fleet(args) => {
                assert_eq!(args.bind, "127.0.0.1:8000");
                assert_eq!(args.workers, 4);
                assert_eq!(args.worker_port_start, 8081);
                assert_eq!(args.worker_host, "127.0.0.1");
                assert_eq!(args.health_check_interval_secs, 5);
                assert_eq!(args.health_check_timeout_ms, 2000);
                assert_eq!(args.failure_threshold, 3);
            }
            _ => panic!("expected fleet command"),
        }
    }

    #[test]
    fn test_cli_parse_fleet_custom_fleet_shape() {
        let cli: Cli = Cli::from_args(
            &["dopc"],
            &[
                "fleet",
                "--workers",
                "2",
                "--worker-port-start",
                "9100",
                "--failure-threshold",
                "5",
            ],
        )
        .unwrap();
        match cli.command {
            Commands::Fleet(args) => {
                assert_eq!(args.workers, 2);
                assert_eq!(args.worker_port_start, 9100);
                assert_eq!(args.failure_threshold, 5);
            }
            _ => panic!("expected fleet command"),
        }
    }
}
