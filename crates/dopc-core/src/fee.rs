//! Tiered delivery fee evaluation and price assembly.

use crate::error::{PricingError, Result};
use crate::types::{DeliveryBreakdown, PriceResult, PricingSchedule};

/// Rounds `n / 10` to the nearest integer, halves away from the floor.
///
/// The schedule's `b` coefficient is declared per ten meters of distance.
fn per_ten_meters(n: i64) -> i64 {
    (n + 5).div_euclid(10)
}

/// Evaluates the tiered fee schedule for a computed distance.
///
/// Ranges are scanned in ascending `min` order and the first bounded range
/// containing the distance wins:
/// `fee = base_price + a + round(b * distance / 10)`.
///
/// A distance at or beyond an open-ended range's `min`, or covered by no
/// range at all, is a `DistanceExceeded` outcome, expected and non-fatal.
/// A negative computed fee is an invariant violation and surfaces as
/// `Internal` rather than being clamped.
pub fn delivery_fee(distance: u32, schedule: &PricingSchedule) -> Result<i64> {
    for range in &schedule.distance_ranges {
        if range.max.is_none() {
            if distance >= range.min {
                return Err(PricingError::DistanceExceeded { distance });
            }
            continue;
        }

        if range.contains(distance) {
            let fee = schedule.base_price + range.a + per_ten_meters(range.b * i64::from(distance));
            if fee < 0 {
                return Err(PricingError::Internal(format!(
                    "computed negative delivery fee {fee} for distance {distance}m"
                )));
            }
            return Ok(fee);
        }
    }

    Err(PricingError::DistanceExceeded { distance })
}

/// Surcharge applied when the cart value is below the venue's minimum.
pub fn small_order_surcharge(cart_value: i64, order_minimum: i64) -> i64 {
    (order_minimum - cart_value).max(0)
}

/// Evaluates the full price breakdown for a validated request.
///
/// `total_price = cart_value + fee + small_order_surcharge`, all in minor
/// currency units. Negative components are invariant violations.
pub fn price_order(distance: u32, schedule: &PricingSchedule, cart_value: i64) -> Result<PriceResult> {
    let fee = delivery_fee(distance, schedule)?;
    let surcharge = small_order_surcharge(cart_value, schedule.order_minimum_no_surcharge);
    let total_price = cart_value + fee + surcharge;

    if total_price < 0 {
        return Err(PricingError::Internal(format!(
            "computed negative total price {total_price}"
        )));
    }

    Ok(PriceResult {
        total_price,
        small_order_surcharge: surcharge,
        cart_value,
        delivery: DeliveryBreakdown { fee, distance },
    })
}
