//! Spherical Mercator projection.
//!
//! Raw coordinates are on the unit sphere: `x` is the longitude in radians,
//! `y = ln(tan(π/4 + φ/2))`. Latitudes are clamped to the web-mercator
//! limit so the poles stay finite.

use std::f64::consts::PI;

/// Latitude at which the web-mercator square ends, in degrees.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Spherical Mercator on a unit sphere.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Mercator;

impl Mercator {
    /// Convert geographic coordinates (degrees) to raw projected coordinates.
    pub fn project(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let lat = lat_deg.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
        (lon_deg.to_radians(), (PI / 4.0 + lat / 2.0).tan().ln())
    }

    /// Convert raw projected coordinates back to `(lon, lat)` in degrees.
    pub fn invert(&self, x: f64, y: f64) -> (f64, f64) {
        let lat = 2.0 * y.exp().atan() - PI / 2.0;
        (x.to_degrees(), lat.to_degrees())
    }
}
