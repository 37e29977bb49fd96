//! Venue-data client over the upstream connection pool.
//!
//! Two stateless operations, one GET each: the static lookup yields the
//! venue's location, the dynamic lookup yields its pricing schedule. Every
//! transport, status, and data-shape failure is translated into the typed
//! error taxonomy; nothing is retried here.

use std::future::Future;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use dopc_core::error::{PricingError, Result};
use dopc_core::types::{DistanceRange, PricingSchedule, VenueLocation};

use crate::pool::{EndpointKind, UpstreamPool};

/// Source of venue data, the seam between the pricing pipeline and the
/// upstream service.
///
/// The production implementation is [`VenueHttpClient`]; tests substitute
/// counting mocks to assert on call sequencing.
pub trait VenueDataSource: Send + Sync {
    /// Fetches the venue's geographic location (static lookup).
    fn fetch_location(
        &self,
        venue_slug: &str,
    ) -> impl Future<Output = Result<VenueLocation>> + Send;

    /// Fetches the venue's pricing schedule (dynamic lookup).
    fn fetch_pricing(
        &self,
        venue_slug: &str,
    ) -> impl Future<Output = Result<PricingSchedule>> + Send;
}

/// HTTP venue-data client backed by the connection pool.
#[derive(Clone)]
pub struct VenueHttpClient {
    pool: Arc<UpstreamPool>,
}

impl VenueHttpClient {
    pub fn new(pool: Arc<UpstreamPool>) -> Self {
        Self { pool }
    }

    /// One pooled GET, decoded straight into the wire payload type.
    async fn get<T: DeserializeOwned>(&self, kind: EndpointKind, venue_slug: &str) -> Result<T> {
        let session = self.pool.select(kind).await;
        let url = format!(
            "{}/venues/{}/{}",
            self.pool.base_url(),
            venue_slug,
            kind.as_path()
        );
        debug!(slot = session.slot, %url, "upstream venue lookup");

        let request = hyper::Request::builder()
            .method("GET")
            .uri(&url)
            .header("accept", "application/json")
            .body(Full::new(Bytes::new()))
            .map_err(|e| PricingError::Transport(format!("failed to build request: {e}")))?;

        let timeout = self.pool.request_timeout();
        let response = tokio::time::timeout(timeout, session.client.request(request))
            .await
            .map_err(|_| PricingError::UpstreamTimeout {
                elapsed_ms: timeout.as_millis() as u64,
            })?
            .map_err(|e| PricingError::Transport(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PricingError::UpstreamStatus {
                status: status.as_u16(),
            });
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| PricingError::Transport(format!("failed to read response body: {e}")))?
            .to_bytes();

        serde_json::from_slice(&body)
            .map_err(|e| PricingError::UpstreamData(format!("undecodable response body: {e}")))
    }
}

impl VenueDataSource for VenueHttpClient {
    async fn fetch_location(&self, venue_slug: &str) -> Result<VenueLocation> {
        let payload: StaticPayload = self.get(EndpointKind::Static, venue_slug).await?;
        location_from_wire(&payload.venue_raw.location.coordinates)
    }

    async fn fetch_pricing(&self, venue_slug: &str) -> Result<PricingSchedule> {
        let payload: DynamicPayload = self.get(EndpointKind::Dynamic, venue_slug).await?;
        schedule_from_wire(payload.venue_raw.delivery_specs)
    }
}

// ============================================================================
// Wire payloads
// ============================================================================

#[derive(Debug, Deserialize)]
struct StaticPayload {
    venue_raw: StaticVenueRaw,
}

#[derive(Debug, Deserialize)]
struct StaticVenueRaw {
    location: WireLocation,
}

#[derive(Debug, Deserialize)]
struct WireLocation {
    /// `[longitude, latitude]` on the wire
    coordinates: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct DynamicPayload {
    venue_raw: DynamicVenueRaw,
}

#[derive(Debug, Deserialize)]
struct DynamicVenueRaw {
    delivery_specs: WireDeliverySpecs,
}

#[derive(Debug, Deserialize)]
struct WireDeliverySpecs {
    order_minimum_no_surcharge: i64,
    delivery_pricing: WireDeliveryPricing,
}

#[derive(Debug, Deserialize)]
struct WireDeliveryPricing {
    base_price: i64,
    distance_ranges: Vec<WireDistanceRange>,
}

#[derive(Debug, Deserialize)]
struct WireDistanceRange {
    min: u32,
    /// 0 (or absent) encodes the open-ended terminator
    #[serde(default)]
    max: u32,
    a: i64,
    b: i64,
}

/// Decodes and bounds-checks the wire coordinate pair.
fn location_from_wire(coordinates: &[f64]) -> Result<VenueLocation> {
    let [longitude, latitude] = coordinates else {
        return Err(PricingError::UpstreamData(format!(
            "expected a [longitude, latitude] coordinate pair, got {} values",
            coordinates.len()
        )));
    };

    let (longitude, latitude) = (*longitude, *latitude);
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(PricingError::UpstreamData(format!(
            "venue latitude {latitude} is out of bounds"
        )));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(PricingError::UpstreamData(format!(
            "venue longitude {longitude} is out of bounds"
        )));
    }

    Ok(VenueLocation {
        latitude,
        longitude,
    })
}

/// Decodes the delivery specs and enforces the schedule invariants.
///
/// Ranges come back sorted ascending by `min`. Overlapping ranges, a
/// non-final open-ended range, or an inverted bounded range are malformed
/// data; gaps are left alone, since an uncovered distance is a business
/// outcome decided at evaluation time.
fn schedule_from_wire(specs: WireDeliverySpecs) -> Result<PricingSchedule> {
    let mut ranges: Vec<DistanceRange> = specs
        .delivery_pricing
        .distance_ranges
        .into_iter()
        .map(|range| DistanceRange {
            min: range.min,
            max: (range.max != 0).then_some(range.max),
            a: range.a,
            b: range.b,
        })
        .collect();
    ranges.sort_by_key(|range| range.min);

    for (position, range) in ranges.iter().enumerate() {
        match range.max {
            None => {
                if position + 1 != ranges.len() {
                    return Err(PricingError::UpstreamData(
                        "open-ended distance range must be the last range".to_string(),
                    ));
                }
            }
            Some(max) => {
                if max <= range.min {
                    return Err(PricingError::UpstreamData(format!(
                        "distance range [{}, {}) has an inverted bound",
                        range.min, max
                    )));
                }
                if let Some(next) = ranges.get(position + 1) {
                    if next.min < max {
                        return Err(PricingError::UpstreamData(format!(
                            "distance ranges overlap at {}m",
                            next.min
                        )));
                    }
                }
            }
        }
    }

    Ok(PricingSchedule {
        order_minimum_no_surcharge: specs.order_minimum_no_surcharge,
        base_price: specs.delivery_pricing.base_price,
        distance_ranges: ranges,
    })
}
