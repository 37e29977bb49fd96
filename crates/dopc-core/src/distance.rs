//! Great-circle distance between two geographic points.

/// Earth's mean radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Computes the great-circle distance between two points using the
/// haversine formula, rounded to the nearest integer meter.
///
/// Deterministic and symmetric; returns 0 for coincident points. Inputs
/// are expected to be within coordinate bounds; the request validator and
/// the venue client both enforce that before this is reached.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> u32 {
    let (lat1, lon1) = (lat1.to_radians(), lon1.to_radians());
    let (lat2, lon2) = (lat2.to_radians(), lon2.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    (EARTH_RADIUS_M * c).round() as u32
}
