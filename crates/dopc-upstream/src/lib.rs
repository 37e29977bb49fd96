//! Upstream venue-data access: persistent connection pool + typed client.

pub mod client;
pub mod pool;

pub use client::{VenueDataSource, VenueHttpClient};
pub use pool::{EndpointKind, PoolConfig, PooledSession, UpstreamHttpClient, UpstreamPool};
