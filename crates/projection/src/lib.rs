//! Viewport projections for geographic extents.
//!
//! Converts the bounding box of a loaded chunk window into the `scale` and
//! `translate` parameters a renderer uses to place it in a `[-1, 1]`
//! viewport, and back into a projection for point queries.
//!
//! ```
//! use projection::{map_props, projection_from_props, GeoBounds};
//!
//! let bounds = GeoBounds::new([-45.0, 0.0], [0.0, 90.0]);
//! let props = map_props(&bounds, "equirectangular").unwrap();
//! let proj = projection_from_props(&props).unwrap();
//!
//! let [x, y] = proj.forward([45.0, -22.5]);
//! assert!(x.abs() < 1e-9 && y.abs() < 1e-9);
//! ```

pub mod equirectangular;
pub mod error;
pub mod fit;
pub mod mercator;

pub use equirectangular::Equirectangular;
pub use error::{ProjectionError, Result};
pub use fit::{
    map_props, projection_from_props, validate_point, wrap_longitude, FittedProjection, GeoBounds,
    MapProps, ProjectionKind,
};
pub use mercator::{Mercator, MAX_LATITUDE};
