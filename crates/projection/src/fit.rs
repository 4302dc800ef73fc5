//! Fitting a projection to a geographic extent.
//!
//! [`map_props`] turns a `lat`/`lon` bounding box into the `scale` and
//! `translate` a renderer needs to show that box in a `[-1, 1]` viewport.
//! [`projection_from_props`] rebuilds a usable projection from those
//! parameters for forward and inverse point queries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::equirectangular::Equirectangular;
use crate::error::{ProjectionError, Result};
use crate::mercator::Mercator;

/// Supported projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionKind {
    Mercator,
    Equirectangular,
}

impl ProjectionKind {
    /// Raw projected coordinates of `(lon, lat)` in degrees.
    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            Self::Mercator => Mercator.project(lon, lat),
            Self::Equirectangular => Equirectangular.project(lon, lat),
        }
    }

    /// `(lon, lat)` in degrees of raw projected coordinates.
    pub fn invert(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Self::Mercator => Mercator.invert(x, y),
            Self::Equirectangular => Equirectangular.invert(x, y),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mercator => "mercator",
            Self::Equirectangular => "equirectangular",
        }
    }
}

impl FromStr for ProjectionKind {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mercator" => Ok(Self::Mercator),
            "equirectangular" | "platecarree" => Ok(Self::Equirectangular),
            _ => Err(ProjectionError::UnknownProjection(s.to_string())),
        }
    }
}

impl fmt::Display for ProjectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geographic extent in degrees.
///
/// `lon[0] > lon[1]` describes a box crossing the 180° meridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    /// `[min, max]` latitude.
    pub lat: [f64; 2],
    /// `[west, east]` longitude.
    pub lon: [f64; 2],
}

impl GeoBounds {
    pub fn new(lat: [f64; 2], lon: [f64; 2]) -> Self {
        Self { lat, lon }
    }

    /// Build from a `(min_lon, min_lat, max_lon, max_lat)` tuple.
    pub fn from_bbox(bbox: (f64, f64, f64, f64)) -> Self {
        let (min_lon, min_lat, max_lon, max_lat) = bbox;
        Self::new([min_lat, max_lat], [min_lon, max_lon])
    }

    /// Check if the box crosses the 180° meridian.
    pub fn crosses_antimeridian(&self) -> bool {
        self.lon[0] > self.lon[1]
    }

    /// Longitude width in degrees, measured eastward across 180° when the
    /// box wraps.
    pub fn lon_span(&self) -> f64 {
        if self.crosses_antimeridian() {
            (180.0 - self.lon[0]) + (self.lon[1] + 180.0)
        } else {
            self.lon[1] - self.lon[0]
        }
    }

    fn validate(&self) -> Result<()> {
        let finite = self.lat.iter().chain(&self.lon).all(|v| v.is_finite());
        if !finite {
            return Err(ProjectionError::InvalidBounds(format!(
                "non-finite bounds {:?}",
                self
            )));
        }
        if self.lat[0] > self.lat[1] {
            return Err(ProjectionError::InvalidBounds(format!(
                "latitude range {:?} is inverted",
                self.lat
            )));
        }
        Ok(())
    }
}

/// Renderer parameters: `viewport = translate + scale * (x, -y)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapProps {
    pub projection: ProjectionKind,
    pub scale: f64,
    pub translate: [f64; 2],
}

/// Fit `projection_id` to `bounds` inside the `[-1, 1]` viewport.
///
/// The longer projected side spans the full viewport and the box center
/// lands on the origin. A box crossing the 180° meridian is fitted through
/// the equivalent non-wrapping span starting at 0°, and its scale reused.
pub fn map_props(bounds: &GeoBounds, projection_id: &str) -> Result<MapProps> {
    let projection: ProjectionKind = projection_id.parse()?;
    bounds.validate()?;

    if bounds.crosses_antimeridian() {
        let unwrapped = GeoBounds::new(bounds.lat, [0.0, bounds.lon_span()]);
        let fitted = map_props(&unwrapped, projection_id)?;

        let center_lon = wrap_longitude(bounds.lon[0] + bounds.lon_span() / 2.0);
        let (cx, _) = projection.project(center_lon, 0.0);

        return Ok(MapProps {
            translate: [-fitted.scale * cx, fitted.translate[1]],
            ..fitted
        });
    }

    let (x0, y0) = projection.project(bounds.lon[0], bounds.lat[0]);
    let (x1, y1) = projection.project(bounds.lon[1], bounds.lat[1]);
    let extent = (x1 - x0).abs().max((y1 - y0).abs());

    if extent <= 0.0 {
        return Err(ProjectionError::InvalidBounds(format!(
            "bounds {:?} have no projected extent",
            bounds
        )));
    }

    let scale = 2.0 / extent;
    Ok(MapProps {
        projection,
        scale,
        translate: [-scale * (x0 + x1) / 2.0, scale * (y0 + y1) / 2.0],
    })
}

/// A projection fitted to a viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FittedProjection {
    props: MapProps,
    center_lon: f64,
}

/// Rebuild a projection from previously computed [`MapProps`].
pub fn projection_from_props(props: &MapProps) -> Result<FittedProjection> {
    if !(props.scale.is_finite() && props.scale > 0.0) {
        return Err(ProjectionError::InvalidBounds(format!(
            "scale must be positive, got {}",
            props.scale
        )));
    }

    let (center_lon, _) = props
        .projection
        .invert(-props.translate[0] / props.scale, 0.0);

    Ok(FittedProjection {
        props: *props,
        center_lon,
    })
}

impl FittedProjection {
    pub fn props(&self) -> &MapProps {
        &self.props
    }

    /// Viewport position of `[lon, lat]`.
    ///
    /// Longitudes are taken on the copy nearest the viewport center, so a
    /// box fitted across 180° stays contiguous.
    pub fn forward(&self, point: [f64; 2]) -> [f64; 2] {
        let [lon, lat] = point;
        let offset = lon - self.center_lon;
        let lon = if offset.abs() > 180.0 {
            self.center_lon + wrap_longitude(offset)
        } else {
            lon
        };
        let (x, y) = self.props.projection.project(lon, lat);
        [
            self.props.translate[0] + self.props.scale * x,
            self.props.translate[1] - self.props.scale * y,
        ]
    }

    /// `[lon, lat]` under a viewport position, longitude in `[-180, 180)`.
    pub fn invert(&self, position: [f64; 2]) -> [f64; 2] {
        let x = (position[0] - self.props.translate[0]) / self.props.scale;
        let y = (self.props.translate[1] - position[1]) / self.props.scale;
        let (lon, lat) = self.props.projection.invert(x, y);
        [wrap_longitude(lon), lat]
    }
}

/// Check a `[lon, lat]` point.
///
/// Longitudes are valid within any ±360° copy of `[-180, 180]`, latitudes
/// within `[-90, 90]`.
pub fn validate_point(point: [f64; 2]) -> bool {
    let [lon, lat] = point;
    let lon_ok = [lon, lon - 360.0, lon + 360.0]
        .iter()
        .any(|v| (-180.0..=180.0).contains(v));
    lon_ok && (-90.0..=90.0).contains(&lat)
}

/// Longitude wrapped into `[-180, 180)`.
pub fn wrap_longitude(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{assert_approx_eq, assert_coords_approx_eq, bbox};

    #[test]
    fn test_projection_ids() {
        assert_eq!("mercator".parse::<ProjectionKind>(), Ok(ProjectionKind::Mercator));
        assert_eq!(
            "Equirectangular".parse::<ProjectionKind>(),
            Ok(ProjectionKind::Equirectangular)
        );
        assert_eq!(
            "orthographic".parse::<ProjectionKind>(),
            Err(ProjectionError::UnknownProjection("orthographic".to_string()))
        );
    }

    #[test]
    fn test_global_equirectangular_fit() {
        let props = map_props(&GeoBounds::from_bbox(bbox::GLOBAL), "equirectangular").unwrap();

        // Longitude is the longer side: 2π radians span the viewport.
        assert_approx_eq!(props.scale, 1.0 / std::f64::consts::PI, 1e-12);
        assert_coords_approx_eq!((props.translate[0], props.translate[1]), (0.0, 0.0), 1e-12);

        let proj = projection_from_props(&props).unwrap();
        let [x, y] = proj.forward([180.0, 90.0]);
        assert_coords_approx_eq!((x, y), (1.0, -0.5), 1e-9);
    }

    #[test]
    fn test_fitted_box_fills_viewport() {
        let bounds = GeoBounds::from_bbox(bbox::CONUS);
        let props = map_props(&bounds, "mercator").unwrap();
        let proj = projection_from_props(&props).unwrap();

        let [x0, y0] = proj.forward([-130.0, 20.0]);
        let [x1, y1] = proj.forward([-60.0, 55.0]);

        // Longer side touches both viewport edges, box centered.
        assert_approx_eq!((x1 - x0).abs().max((y1 - y0).abs()), 2.0, 1e-9);
        assert_approx_eq!(x0 + x1, 0.0, 1e-9);
        assert_approx_eq!(y0 + y1, 0.0, 1e-9);
        // North is up.
        assert!(y1 < y0);
    }

    #[test]
    fn test_antimeridian_reuses_unwrapped_scale() {
        let pacific = GeoBounds::from_bbox(bbox::PACIFIC);
        assert!(pacific.crosses_antimeridian());
        assert_eq!(pacific.lon_span(), 60.0);

        let wrapped = map_props(&pacific, "equirectangular").unwrap();
        let unwrapped =
            map_props(&GeoBounds::new(pacific.lat, [0.0, 60.0]), "equirectangular").unwrap();
        assert_eq!(wrapped.scale, unwrapped.scale);

        let shifted =
            map_props(&GeoBounds::new(pacific.lat, [100.0, 160.0]), "equirectangular").unwrap();
        assert_approx_eq!(wrapped.scale, shifted.scale, 1e-9);

        // Both edges land on the viewport border, the box stays contiguous.
        let proj = projection_from_props(&wrapped).unwrap();
        let [west, _] = proj.forward([160.0, 0.0]);
        let [east, _] = proj.forward([-140.0, 0.0]);
        let [center, _] = proj.forward([-170.0, 0.0]);
        assert_approx_eq!(west, -1.0, 1e-9);
        assert_approx_eq!(east, 1.0, 1e-9);
        assert_approx_eq!(center, 0.0, 1e-9);
    }

    #[test]
    fn test_scale_independent_of_longitude_offset() {
        let lat = [-10.0, 10.0];
        for projection in ["equirectangular", "mercator"] {
            let base = map_props(&GeoBounds::new(lat, [0.0, 20.0]), projection).unwrap();
            let past_180 = map_props(&GeoBounds::new(lat, [170.0, 190.0]), projection).unwrap();
            let wrapped = map_props(&GeoBounds::new(lat, [170.0, -170.0]), projection).unwrap();

            assert_approx_eq!(past_180.scale, base.scale, 1e-12);
            assert_approx_eq!(wrapped.scale, base.scale, 1e-12);
            assert_approx_eq!(past_180.translate[1], base.translate[1], 1e-12);
        }
    }

    #[test]
    fn test_forward_invert_consistent() {
        let props = map_props(&GeoBounds::from_bbox(bbox::EUROPE), "mercator").unwrap();
        let proj = projection_from_props(&props).unwrap();

        let [x, y] = proj.forward([2.35, 48.85]);
        let [lon, lat] = proj.invert([x, y]);
        assert_coords_approx_eq!((lon, lat), (2.35, 48.85), 1e-9);
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let point = GeoBounds::new([10.0, 10.0], [5.0, 5.0]);
        assert!(matches!(
            map_props(&point, "mercator"),
            Err(ProjectionError::InvalidBounds(_))
        ));

        let inverted = GeoBounds::new([50.0, 10.0], [0.0, 10.0]);
        assert!(map_props(&inverted, "mercator").is_err());

        let nan = GeoBounds::new([f64::NAN, 10.0], [0.0, 10.0]);
        assert!(map_props(&nan, "equirectangular").is_err());

        let props = MapProps {
            projection: ProjectionKind::Mercator,
            scale: 0.0,
            translate: [0.0, 0.0],
        };
        assert!(projection_from_props(&props).is_err());
    }

    #[test]
    fn test_validate_point() {
        assert!(validate_point([0.0, 0.0]));
        assert!(validate_point([-180.0, 90.0]));
        assert!(validate_point([350.0, -45.0]));
        assert!(validate_point([-530.0, 10.0]));
        assert!(!validate_point([541.0, 0.0]));
        assert!(!validate_point([0.0, 90.5]));
        assert!(!validate_point([f64::NAN, 0.0]));
    }

    #[test]
    fn test_props_serialize() {
        let props = MapProps {
            projection: ProjectionKind::Mercator,
            scale: 2.0,
            translate: [0.5, -0.25],
        };
        let json = serde_json::to_value(props).unwrap();
        assert_eq!(json["projection"], "mercator");
        assert_eq!(json["translate"][1], -0.25);
    }
}
