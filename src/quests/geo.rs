//! Great-circle distance and geofence checks.

use serde::{Deserialize, Serialize};

/// Mean earth radius used by the haversine formula, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A GPS position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees (-90..=90)
    pub latitude: f64,
    /// Longitude in degrees (-180..=180)
    pub longitude: f64,
}

impl Coordinate {
    /// Create a new coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check that both components are finite and within their ranges.
    pub fn validate(&self) -> Result<(), String> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(format!(
                "latitude must be between -90 and 90, got {}",
                self.latitude
            ));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(format!(
                "longitude must be between -180 and 180, got {}",
                self.longitude
            ));
        }
        Ok(())
    }
}

/// Calculate the distance in meters between two points (Haversine formula).
///
/// Inputs are not range checked; malformed coordinates yield meaningless
/// (possibly NaN) results. Use [`Coordinate::validate`] first.
pub fn distance_meters(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos()
            * b.latitude.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();

    EARTH_RADIUS_METERS * c
}

/// Whether `position` lies inside the geofence of `radius` meters around `center`.
pub fn within_radius(position: Coordinate, center: Coordinate, radius: f64) -> bool {
    distance_meters(position, center) <= radius
}
