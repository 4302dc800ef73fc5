//! Equirectangular (plate carrée) projection.

/// Longitude and latitude mapped linearly to radians.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Equirectangular;

impl Equirectangular {
    pub fn project(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        (lon_deg.to_radians(), lat_deg.to_radians())
    }

    pub fn invert(&self, x: f64, y: f64) -> (f64, f64) {
        (x.to_degrees(), y.to_degrees())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_in_both_axes() {
        let proj = Equirectangular;
        let (x1, y1) = proj.project(10.0, 20.0);
        let (x2, y2) = proj.project(20.0, 40.0);

        assert!((x2 - 2.0 * x1).abs() < 1e-12);
        assert!((y2 - 2.0 * y1).abs() < 1e-12);

        let (lon, lat) = proj.invert(x2, y2);
        assert!((lon - 20.0).abs() < 1e-9 && (lat - 40.0).abs() < 1e-9);
    }
}
