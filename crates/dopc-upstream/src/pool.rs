//! Persistent connection pool for the upstream venue-data service.
//!
//! The pool holds a fixed number of slots per endpoint category, each owning
//! one persistent HTTP client whose keep-alive connections amortize
//! connection establishment across requests. Selection is a lock-free
//! round-robin over an atomic cursor; health checking runs entirely in a
//! background task so the request path never waits on pool maintenance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use http_body_util::Full;
use hyper::body::Bytes;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// The HTTP client type used for all upstream traffic.
pub type UpstreamHttpClient = Client<HttpConnector, Full<Bytes>>;

/// Upstream endpoint categories, each backed by its own slot set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Venue location data (`/venues/{slug}/static`)
    Static,
    /// Venue pricing data (`/venues/{slug}/dynamic`)
    Dynamic,
}

impl EndpointKind {
    /// Path segment for this category on the upstream API.
    pub fn as_path(&self) -> &'static str {
        match self {
            EndpointKind::Static => "static",
            EndpointKind::Dynamic => "dynamic",
        }
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Slots for the static endpoint category
    pub static_pool_size: usize,
    /// Slots for the dynamic endpoint category
    pub dynamic_pool_size: usize,
    /// Period of the background health monitor
    pub health_check_interval: Duration,
    /// Timeout applied to each upstream call, probes included
    pub request_timeout: Duration,
    /// Venue slug the monitor probes against
    pub probe_venue: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            static_pool_size: 5,
            dynamic_pool_size: 5,
            health_check_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            probe_venue: "home-assignment-venue-helsinki".to_string(),
        }
    }
}

/// One pool slot: a persistent client plus its health metadata.
///
/// Slots belong to exactly one category and are owned exclusively by the
/// pool; the request path only ever receives client clones.
struct ConnectionSlot {
    client: UpstreamHttpClient,
    healthy: bool,
    last_checked: Option<Instant>,
}

impl ConnectionSlot {
    fn new() -> Self {
        Self {
            client: build_client(),
            healthy: true,
            last_checked: None,
        }
    }
}

/// Slot set and rotation cursor for one endpoint category.
struct CategoryPool {
    slots: RwLock<Vec<ConnectionSlot>>,
    cursor: AtomicU64,
}

impl CategoryPool {
    fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            slots: RwLock::new((0..size).map(|_| ConnectionSlot::new()).collect()),
            cursor: AtomicU64::new(0),
        }
    }
}

/// A selected pool session: the slot index and a clone of its client.
///
/// Dropping the session is the release: the slot stays open in the pool
/// and will be handed out again.
pub struct PooledSession {
    pub slot: usize,
    pub client: UpstreamHttpClient,
}

/// The two-category upstream connection pool.
pub struct UpstreamPool {
    base_url: String,
    config: PoolConfig,
    statics: CategoryPool,
    dynamics: CategoryPool,
}

fn build_client() -> UpstreamHttpClient {
    Client::builder(TokioExecutor::new()).build_http()
}

impl UpstreamPool {
    /// Creates a pool with `static_pool_size` + `dynamic_pool_size` slots.
    ///
    /// `base_url` is the upstream API root without a trailing slash, e.g.
    /// `http://localhost:10000/home-assignment-api/v1`.
    pub fn new(base_url: impl Into<String>, config: PoolConfig) -> Self {
        let statics = CategoryPool::new(config.static_pool_size);
        let dynamics = CategoryPool::new(config.dynamic_pool_size);
        Self {
            base_url: base_url.into(),
            config,
            statics,
            dynamics,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request_timeout(&self) -> Duration {
        self.config.request_timeout
    }

    fn category(&self, kind: EndpointKind) -> &CategoryPool {
        match kind {
            EndpointKind::Static => &self.statics,
            EndpointKind::Dynamic => &self.dynamics,
        }
    }

    /// Selects the next slot for `kind` by round-robin.
    ///
    /// The cursor is a monotonically increasing atomic taken modulo the pool
    /// size, so `len` consecutive selections visit every slot exactly once
    /// even under concurrent callers. Health state is deliberately ignored
    /// here: an unhealthy slot is used opportunistically and only ever
    /// replaced by the background monitor, never in the request path.
    pub async fn select(&self, kind: EndpointKind) -> PooledSession {
        let category = self.category(kind);
        let slots = category.slots.read().await;
        let index = (category.cursor.fetch_add(1, Ordering::Relaxed) % slots.len() as u64) as usize;
        PooledSession {
            slot: index,
            client: slots[index].client.clone(),
        }
    }

    /// Starts the background health monitor task.
    ///
    /// Every `health_check_interval` the monitor probes each slot with a
    /// lightweight GET against the probe venue. A failing slot's client is
    /// torn down and replaced; the slot is marked healthy only once the
    /// replacement passes a probe.
    pub fn spawn_health_monitor(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.health_check_interval);
            loop {
                interval.tick().await;
                self.check_category(EndpointKind::Static).await;
                self.check_category(EndpointKind::Dynamic).await;
            }
        })
    }

    /// Probes every slot of one category and replaces the failed ones.
    async fn check_category(&self, kind: EndpointKind) {
        let clients: Vec<(usize, UpstreamHttpClient)> = {
            let slots = self.category(kind).slots.read().await;
            slots
                .iter()
                .enumerate()
                .map(|(index, slot)| (index, slot.client.clone()))
                .collect()
        };

        for (index, client) in clients {
            match self.probe(kind, &client).await {
                Ok(()) => {
                    let mut slots = self.category(kind).slots.write().await;
                    if let Some(slot) = slots.get_mut(index) {
                        slot.healthy = true;
                        slot.last_checked = Some(Instant::now());
                    }
                }
                Err(reason) => {
                    warn!(
                        category = kind.as_path(),
                        slot = index,
                        reason = %reason,
                        "upstream slot failed health probe, replacing connection"
                    );

                    let replacement = build_client();
                    let replacement_healthy = self.probe(kind, &replacement).await.is_ok();

                    let mut slots = self.category(kind).slots.write().await;
                    if let Some(slot) = slots.get_mut(index) {
                        // Overwriting drops the old client and its connections.
                        slot.client = replacement;
                        slot.healthy = replacement_healthy;
                        slot.last_checked = Some(Instant::now());
                    }
                    drop(slots);

                    if replacement_healthy {
                        info!(
                            category = kind.as_path(),
                            slot = index,
                            "replacement connection established"
                        );
                    }
                }
            }
        }
    }

    /// One lightweight liveness probe: any non-5xx answer counts as alive.
    async fn probe(
        &self,
        kind: EndpointKind,
        client: &UpstreamHttpClient,
    ) -> std::result::Result<(), String> {
        let url = format!(
            "{}/venues/{}/{}",
            self.base_url,
            self.config.probe_venue,
            kind.as_path()
        );
        let request = hyper::Request::builder()
            .method("GET")
            .uri(&url)
            .body(Full::new(Bytes::new()))
            .map_err(|e| format!("failed to build probe request: {e}"))?;

        let timeout = self.config.request_timeout;
        let response = tokio::time::timeout(timeout, client.request(request))
            .await
            .map_err(|_| format!("probe timed out after {}ms", timeout.as_millis()))?
            .map_err(|e| format!("probe request failed: {e}"))?;

        if response.status().is_server_error() {
            return Err(format!("probe returned status {}", response.status()));
        }
        Ok(())
    }

    /// Health flags per slot, in slot order. Diagnostic view for tests and
    /// operational introspection.
    pub async fn slot_health(&self, kind: EndpointKind) -> Vec<bool> {
        let slots = self.category(kind).slots.read().await;
        slots.iter().map(|slot| slot.healthy).collect()
    }
}
