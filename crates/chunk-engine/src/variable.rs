//! Validated per-level description of the active variable.

use std::sync::Arc;

use projection::Mercator;
use serde_json::{Map, Value};

use crate::axis::{AxisRoles, CfAxis};
use crate::error::{EngineError, Result};
use crate::metadata::ArrayMetadata;

/// Dimension names treated as geographic when no `units` attribute says so.
const GEOGRAPHIC_NAMES: &[&str] = &["lat", "lon", "latitude", "longitude", "nlat", "nlon"];

/// Radius of the EPSG:3857 sphere, in metres.
pub const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

fn units(attrs: Option<&Map<String, Value>>) -> Option<String> {
    attrs
        .and_then(|a| a.get("units"))
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase)
}

/// Check whether a spatial dimension is in degrees of latitude/longitude.
pub fn is_geographic(dim: &str, attrs: Option<&Map<String, Value>>) -> bool {
    match units(attrs) {
        Some(units) => units.starts_with("degree"),
        None => GEOGRAPHIC_NAMES.contains(&dim.to_ascii_lowercase().as_str()),
    }
}

/// Check whether a coordinate's `units` attribute is metres.
pub fn is_metric(attrs: Option<&Map<String, Value>>) -> bool {
    matches!(
        units(attrs).as_deref(),
        Some("m" | "metre" | "metres" | "meter" | "meters")
    )
}

/// Inverse-project web-mercator metres along one axis to degrees.
pub fn mercator_metres_to_degrees(values: &[f64], role: CfAxis) -> Vec<f64> {
    values
        .iter()
        .map(|&v| {
            let (lon, lat) = Mercator.invert(v / WEB_MERCATOR_RADIUS, v / WEB_MERCATOR_RADIUS);
            match role {
                CfAxis::X => lon,
                _ => lat,
            }
        })
        .collect()
}

/// Cell-center longitudes of a global web-mercator level with `n` columns.
pub fn mercator_longitudes(n: usize) -> Vec<f64> {
    let width = 360.0 / n as f64;
    (0..n).map(|i| -180.0 + (i as f64 + 0.5) * width).collect()
}

/// Cell-center latitudes of a global web-mercator level with `n` rows,
/// north first.
pub fn mercator_latitudes(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let y = std::f64::consts::PI * (1.0 - 2.0 * (i as f64 + 0.5) / n as f64);
            y.sinh().atan().to_degrees()
        })
        .collect()
}

/// Coordinate array and orientation of one spatial dimension.
#[derive(Debug, Clone)]
pub struct SpatialAxis {
    /// Dimension name.
    pub dimension: String,
    /// Position of the dimension in the variable's shape.
    pub index: usize,
    /// Cell-center coordinates in stored order.
    pub array: Arc<Vec<f64>>,
    /// Signed mean spacing between consecutive coordinates.
    pub step: f64,
    /// Stored order is south-up (Y) or east-left (X); decoded grids are flipped.
    pub reversed: bool,
    /// Spacing is near-constant, so indices follow from `step` directly.
    pub uniform: bool,
}

impl SpatialAxis {
    /// Build an axis from coordinate values.
    pub fn new(
        dimension: impl Into<String>,
        index: usize,
        role: CfAxis,
        array: Vec<f64>,
        tolerance: f64,
    ) -> Result<Self> {
        let dimension = dimension.into();
        if array.is_empty() {
            return Err(EngineError::configuration(format!(
                "coordinate array '{}' is empty",
                dimension
            )));
        }

        let n = array.len();
        let step = if n > 1 {
            (array[n - 1] - array[0]) / (n - 1) as f64
        } else {
            0.0
        };

        let uniform = step != 0.0
            && array
                .windows(2)
                .all(|w| ((w[1] - w[0]) - step).abs() <= tolerance * step.abs());

        let reversed = match role {
            CfAxis::Y => step > 0.0,
            _ => step < 0.0,
        };

        Ok(Self {
            dimension,
            index,
            array: Arc::new(array),
            step,
            reversed,
            uniform,
        })
    }

    /// Require strictly monotonic, near-constant spacing.
    pub fn validate_spacing(&self) -> Result<()> {
        let monotonic = self
            .array
            .windows(2)
            .all(|w| (w[1] - w[0]) * self.step > 0.0);

        if !monotonic {
            return Err(EngineError::configuration(format!(
                "coordinate array '{}' is not monotonic",
                self.dimension
            )));
        }

        if self.array.len() > 1 && !self.uniform {
            return Err(EngineError::configuration(format!(
                "coordinate array '{}' is not equally spaced",
                self.dimension
            )));
        }

        Ok(())
    }

    /// Require coordinates inside the physical range of the role.
    pub fn validate_range(&self, role: CfAxis) -> Result<()> {
        let (lo, hi) = match role {
            CfAxis::X => (-180.0, 360.0),
            CfAxis::Y => (-90.0, 90.0),
            CfAxis::T => return Ok(()),
        };

        let [min, max] = self.value_range();
        if min < lo || max > hi {
            return Err(EngineError::configuration(format!(
                "coordinate array '{}' spans [{}, {}], outside [{}, {}]",
                self.dimension, min, max, lo, hi
            )));
        }
        Ok(())
    }

    /// `[min, max]` of the cell centers.
    pub fn value_range(&self) -> [f64; 2] {
        let first = self.array[0];
        let last = self.array[self.array.len() - 1];
        [first.min(last), first.max(last)]
    }

    /// `[min, max]` of the cell edges.
    pub fn span(&self) -> [f64; 2] {
        let n = self.array.len();
        let a = self.edge_before(0);
        let b = self.edge_after(n - 1);
        [a.min(b), a.max(b)]
    }

    /// Check if a coordinate lies inside the span (edges inclusive).
    pub fn contains(&self, value: f64) -> bool {
        let [min, max] = self.span();
        value >= min && value <= max
    }

    /// Edge-padded extent of chunk `chunk` of length `chunk_len`.
    pub fn chunk_extent(&self, chunk: usize, chunk_len: usize) -> Option<[f64; 2]> {
        let n = self.array.len();
        let start = chunk * chunk_len;
        if start >= n {
            return None;
        }
        let end = (start + chunk_len).min(n) - 1;

        let a = self.edge_before(start);
        let b = self.edge_after(end);
        Some([a.min(b), a.max(b)])
    }

    /// Signed chunk index containing `value`, before any clamping.
    pub fn chunk_index(&self, value: f64, chunk_len: usize) -> i64 {
        if self.array.len() < 2 {
            return 0;
        }

        if self.uniform {
            let origin = self.array[0] - self.step / 2.0;
            let ratio = (value - origin) / (self.step * chunk_len as f64);
            return if ratio >= 0.0 {
                ratio.floor() as i64
            } else {
                ratio.ceil() as i64
            };
        }

        (self.nearest_cell(value) / chunk_len) as i64
    }

    /// Index of the cell containing `value`, clamped to the array.
    pub fn cell_index(&self, value: f64) -> usize {
        let n = self.array.len();
        if n < 2 {
            return 0;
        }

        if self.uniform {
            let origin = self.array[0] - self.step / 2.0;
            let cell = ((value - origin) / self.step).floor();
            return cell.clamp(0.0, (n - 1) as f64) as usize;
        }

        self.nearest_cell(value)
    }

    fn nearest_cell(&self, value: f64) -> usize {
        let n = self.array.len();
        let p = if self.step > 0.0 {
            self.array.partition_point(|&c| c < value)
        } else {
            self.array.partition_point(|&c| c > value)
        };

        if p == 0 {
            0
        } else if p >= n {
            n - 1
        } else if (self.array[p - 1] - value).abs() <= (self.array[p] - value).abs() {
            p - 1
        } else {
            p
        }
    }

    fn edge_before(&self, i: usize) -> f64 {
        if i > 0 {
            (self.array[i - 1] + self.array[i]) / 2.0
        } else if self.array.len() > 1 {
            self.array[0] - (self.array[1] - self.array[0]) / 2.0
        } else {
            self.array[0]
        }
    }

    fn edge_after(&self, i: usize) -> f64 {
        let n = self.array.len();
        if i + 1 < n {
            (self.array[i] + self.array[i + 1]) / 2.0
        } else if n > 1 {
            self.array[n - 1] + (self.array[n - 1] - self.array[n - 2]) / 2.0
        } else {
            self.array[n - 1]
        }
    }
}

/// Everything the key codec and decoder need to know about a variable at
/// one level.
#[derive(Debug, Clone)]
pub struct VariableDescriptor {
    pub name: String,
    /// Array path inside the store (includes the level prefix).
    pub path: String,
    pub dimensions: Vec<String>,
    pub shape: Vec<usize>,
    pub chunk_shape: Vec<usize>,
    pub separator: String,
    pub fill_value: Option<f64>,
    /// Parsed `.zarray`, used to decode chunk elements.
    pub array: ArrayMetadata,
    pub roles: AxisRoles,
    pub x: SpatialAxis,
    pub y: SpatialAxis,
}

impl VariableDescriptor {
    /// Assemble a descriptor, checking that coordinates match the shape.
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        dimensions: Vec<String>,
        array: &ArrayMetadata,
        roles: AxisRoles,
        x: SpatialAxis,
        y: SpatialAxis,
    ) -> Result<Self> {
        let name = name.into();

        if dimensions.len() != array.ndim() {
            return Err(EngineError::configuration(format!(
                "variable '{}' declares {} dimensions but has {} in its shape",
                name,
                dimensions.len(),
                array.ndim()
            )));
        }

        for axis in [&x, &y] {
            if array.shape[axis.index] != axis.array.len() {
                return Err(EngineError::configuration(format!(
                    "coordinate array '{}' has {} values, expected {}",
                    axis.dimension,
                    axis.array.len(),
                    array.shape[axis.index]
                )));
            }
        }

        Ok(Self {
            name,
            path: path.into(),
            dimensions,
            shape: array.shape.clone(),
            chunk_shape: array.chunks.clone(),
            separator: array.separator.clone(),
            fill_value: array.fill_value,
            array: array.clone(),
            roles,
            x,
            y,
        })
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of chunks along each dimension.
    pub fn chunk_counts(&self) -> Vec<usize> {
        self.shape
            .iter()
            .zip(&self.chunk_shape)
            .map(|(&s, &c)| s.div_ceil(c))
            .collect()
    }

    /// Elements of chunk `chunk` along `dim` that lie inside the array.
    pub fn valid_len(&self, dim: usize, chunk: usize) -> usize {
        let len = self.chunk_shape[dim];
        self.shape[dim].saturating_sub(chunk * len).min(len)
    }

    /// Index of a dimension by name.
    pub fn dimension_index(&self, dim: &str) -> Option<usize> {
        self.dimensions.iter().position(|d| d == dim)
    }

    /// True for the X and Y dimensions.
    pub fn is_spatial(&self, dim: usize) -> bool {
        dim == self.x.index || dim == self.y.index
    }
}
