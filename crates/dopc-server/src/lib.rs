//! A single pricing worker: the request orchestrator plus its HTTP surface.

pub mod http_server;
pub mod orchestrator;

pub use dopc_core::types::PRICE_ENDPOINT;
pub use http_server::{HttpServer, ServerConfig};
pub use orchestrator::PriceOrchestrator;
