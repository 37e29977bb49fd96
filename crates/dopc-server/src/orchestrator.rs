//! The pricing pipeline: validate, locate, measure, price, assemble.

use dopc_core::distance::haversine_distance;
use dopc_core::error::Result;
use dopc_core::fee;
use dopc_core::types::PriceResult;
use dopc_core::validate::{validate_order, RawOrderParams};
use dopc_upstream::VenueDataSource;

/// Drives one delivery-price request end to end.
///
/// The pipeline is strictly sequential and fail-fast:
///
/// 1. validate the raw parameters (no I/O happens for invalid input)
/// 2. static lookup: venue location
/// 3. great-circle distance venue → user
/// 4. dynamic lookup: pricing schedule
/// 5. fee evaluation and breakdown assembly
///
/// Each stage short-circuits with its typed error; no partial results leave
/// this type. Generic over the venue-data source so tests can count and
/// script upstream interactions.
pub struct PriceOrchestrator<S> {
    source: S,
}

impl<S: VenueDataSource> PriceOrchestrator<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Computes the full price breakdown for one inbound request.
    pub async fn price_order(&self, params: RawOrderParams) -> Result<PriceResult> {
        let request = validate_order(params)?;

        let venue = self.source.fetch_location(&request.venue_slug).await?;
        let distance = haversine_distance(
            request.user_lat,
            request.user_lon,
            venue.latitude,
            venue.longitude,
        );

        let schedule = self.source.fetch_pricing(&request.venue_slug).await?;
        fee::price_order(distance, &schedule, request.cart_value)
    }
}
