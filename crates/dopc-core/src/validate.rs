//! Inbound parameter validation.
//!
//! Validation runs before anything else in the pipeline: a request that
//! fails here never causes an upstream call. Bounds checks are expressed as
//! an ordered rule table evaluated against the candidate request; the first
//! violated rule produces the error.

use crate::error::{PricingError, Result};
use crate::types::OrderRequest;

/// The four inbound parameters exactly as the query layer saw them.
///
/// `None` means the parameter was absent from the request.
#[derive(Debug, Clone, Default)]
pub struct RawOrderParams {
    pub venue_slug: Option<String>,
    pub cart_value: Option<String>,
    pub user_lat: Option<String>,
    pub user_lon: Option<String>,
}

/// Ordered bounds rules: (field, predicate, violation message).
const RULES: &[(&'static str, fn(&OrderRequest) -> bool, &'static str)] = &[
    ("venue_slug", |r| !r.venue_slug.is_empty(), "venue slug must be a non-empty string"),
    ("cart_value", |r| r.cart_value >= 0, "cart value must be a non-negative integer"),
    (
        "user_lat",
        |r| r.user_lat.is_finite() && (-90.0..=90.0).contains(&r.user_lat),
        "latitude must be a finite number between -90 and 90 degrees",
    ),
    (
        "user_lon",
        |r| r.user_lon.is_finite() && (-180.0..=180.0).contains(&r.user_lon),
        "longitude must be a finite number between -180 and 180 degrees",
    ),
];

/// Parses and bounds-checks the raw parameters into an [`OrderRequest`].
///
/// Order of checks:
/// 1. all required parameters present (absent ones reported together)
/// 2. each parameter parses as its type
/// 3. the bounds rule table, first violation wins
pub fn validate_order(params: RawOrderParams) -> Result<OrderRequest> {
    let mut missing = Vec::new();
    if params.venue_slug.is_none() {
        missing.push("venue_slug");
    }
    if params.cart_value.is_none() {
        missing.push("cart_value");
    }
    if params.user_lat.is_none() {
        missing.push("user_lat");
    }
    if params.user_lon.is_none() {
        missing.push("user_lon");
    }
    if !missing.is_empty() {
        return Err(PricingError::Validation {
            field: missing[0],
            message: format!("missing required parameters: {}", missing.join(", ")),
        });
    }

    let venue_slug = params.venue_slug.unwrap_or_default();
    let cart_value = parse_i64("cart_value", &params.cart_value.unwrap_or_default())?;
    let user_lat = parse_f64("user_lat", &params.user_lat.unwrap_or_default())?;
    let user_lon = parse_f64("user_lon", &params.user_lon.unwrap_or_default())?;

    let request = OrderRequest {
        venue_slug,
        cart_value,
        user_lat,
        user_lon,
    };

    for (field, predicate, message) in RULES.iter().copied() {
        if !predicate(&request) {
            return Err(PricingError::Validation {
                field,
                message: message.to_string(),
            });
        }
    }

    Ok(request)
}

fn parse_i64(field: &'static str, raw: &str) -> Result<i64> {
    raw.trim().parse::<i64>().map_err(|_| PricingError::Validation {
        field,
        message: format!("'{raw}' is not a valid integer"),
    })
}

fn parse_f64(field: &'static str, raw: &str) -> Result<f64> {
    raw.trim().parse::<f64>().map_err(|_| PricingError::Validation {
        field,
        message: format!("'{raw}' is not a valid number"),
    })
}
