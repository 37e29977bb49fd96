use thiserror::Error;

/// Error taxonomy for the delivery order price calculator.
///
/// Every failure a request can hit falls into one of these categories:
///
/// - `Validation`: a malformed or out-of-range inbound parameter, detected
///   before any upstream call is made
/// - `UpstreamTimeout` / `UpstreamStatus` / `UpstreamData` / `Transport`:
///   failures talking to the venue-data service; never retried here
/// - `DistanceExceeded`: the request and upstream data are fine, but the
///   venue does not deliver that far, an expected business outcome
/// - `Internal`: an invariant violation not attributable to input or
///   upstream data
#[derive(Error, Debug)]
pub enum PricingError {
    #[error("validation failed for {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("upstream request timed out after {elapsed_ms}ms")]
    UpstreamTimeout { elapsed_ms: u64 },

    #[error("upstream request failed with status {status}")]
    UpstreamStatus { status: u16 },

    #[error("invalid upstream venue data: {0}")]
    UpstreamData(String),

    #[error("upstream connection error: {0}")]
    Transport(String),

    #[error("delivery distance {distance}m exceeds the venue's maximum delivery distance")]
    DistanceExceeded { distance: u32 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl PricingError {
    /// HTTP status code this error category maps to at the boundary.
    ///
    /// Validation and business errors are the client's problem (400),
    /// upstream failures are gateway-class (502/504), invariant violations
    /// are ours (500). The response body shape is uniform regardless.
    pub fn status_code(&self) -> u16 {
        match self {
            PricingError::Validation { .. } => 400,
            PricingError::DistanceExceeded { .. } => 400,
            PricingError::UpstreamTimeout { .. } => 504,
            PricingError::UpstreamStatus { .. } => 502,
            PricingError::UpstreamData(_) => 502,
            PricingError::Transport(_) => 502,
            PricingError::Internal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, PricingError>;
