//! Worker dispatcher: supervision, health-checked routing, and the
//! proxying HTTP server in front of the pricing worker fleet.

mod http_client;

pub mod health_checker;
pub mod http_server;
pub mod load_balancer;
pub mod supervisor;
pub mod worker;

pub use health_checker::{HealthCheckConfig, HealthChecker};
pub use http_server::{DispatcherConfig, DispatcherServer};
pub use load_balancer::WorkerPool;
pub use supervisor::{SupervisorConfig, WorkerLauncher, WorkerSupervisor};
pub use worker::{ProbeStatus, WorkerRecord};
