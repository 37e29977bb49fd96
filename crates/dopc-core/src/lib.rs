//! Pure pricing engine for the delivery order price calculator.
//!
//! Everything in this crate is synchronous and I/O-free: domain types, the
//! error taxonomy, inbound parameter validation, great-circle distance, and
//! tiered fee evaluation. The serving and upstream crates compose these.

pub mod distance;
pub mod error;
pub mod fee;
pub mod types;
pub mod validate;

pub use distance::haversine_distance;
pub use error::{PricingError, Result};
pub use fee::{delivery_fee, price_order, small_order_surcharge};
pub use types::{
    DeliveryBreakdown, DistanceRange, ErrorResponse, OrderRequest, PriceResult, PricingSchedule,
    VenueLocation, PRICE_ENDPOINT,
};
pub use validate::{validate_order, RawOrderParams};
