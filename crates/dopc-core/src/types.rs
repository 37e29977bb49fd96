//! Domain types for delivery order pricing.
//!
//! All money values are integers in the lowest denomination of the local
//! currency (cents, öre, yen); distances are integer meters.

use serde::{Deserialize, Serialize};

/// Path of the client-facing pricing endpoint, served by every worker and
/// proxied unchanged by the dispatcher.
pub const PRICE_ENDPOINT: &str = "/api/v1/delivery-order-price";

/// A validated delivery order request.
///
/// Constructed only by the request validator; immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    /// Venue identifier (opaque slug)
    pub venue_slug: String,
    /// Cart value in minor currency units, non-negative
    pub cart_value: i64,
    /// User latitude in degrees, [-90, 90]
    pub user_lat: f64,
    /// User longitude in degrees, [-180, 180]
    pub user_lon: f64,
}

/// Geographic location of a venue, from the static upstream lookup.
///
/// Fetched once per request and discarded with the response; never cached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VenueLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// One entry of the tiered delivery fee schedule.
///
/// A range covers distances in the half-open interval `[min, max)`.
/// `max: None` is the open-ended terminator: the venue does not deliver to
/// any distance at or beyond `min`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceRange {
    /// Lower bound in meters, inclusive
    pub min: u32,
    /// Upper bound in meters, exclusive; `None` means no service from `min` on
    pub max: Option<u32>,
    /// Flat fee component for this range
    pub a: i64,
    /// Per-distance fee component, applied per ten meters
    pub b: i64,
}

impl DistanceRange {
    /// Whether this range's fee formula applies to `distance`.
    ///
    /// The open-ended terminator never matches; it marks the cutoff.
    pub fn contains(&self, distance: u32) -> bool {
        match self.max {
            Some(max) => self.min <= distance && distance < max,
            None => false,
        }
    }
}

/// Delivery pricing rules for a venue, from the dynamic upstream lookup.
///
/// `distance_ranges` is sorted ascending by `min` after decoding. Overlaps
/// and a non-final open-ended range are rejected at decode time; gaps are
/// permitted: an uncovered distance is a business outcome, not malformed
/// data.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingSchedule {
    /// Cart value under which the small order surcharge applies
    pub order_minimum_no_surcharge: i64,
    /// Base delivery fee before range components
    pub base_price: i64,
    /// Tiered fee schedule, sorted ascending by `min`
    pub distance_ranges: Vec<DistanceRange>,
}

/// Delivery fee and distance portion of a price breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeliveryBreakdown {
    /// Delivery fee in minor currency units
    pub fee: i64,
    /// Straight-line distance from venue to user in meters
    pub distance: u32,
}

/// The assembled price breakdown returned to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceResult {
    pub total_price: i64,
    pub small_order_surcharge: i64,
    pub cart_value: i64,
    pub delivery: DeliveryBreakdown,
}

/// The uniform failure body: `{"success": false, "error": "<message>"}`.
///
/// Every error category renders through this shape, on workers and on the
/// dispatcher; the HTTP status carries the category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}
