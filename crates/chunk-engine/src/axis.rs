//! Axis-role inference.
//!
//! Works out which dimension of each variable plays the longitude (X),
//! latitude (Y) and time (T) role. Explicit `axis`/`cartesian_axis`
//! attributes win, a `calendar` attribute marks time, and well-known
//! dimension name pairs fill in whatever is still missing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::metadata::{join_path, ConsolidatedMetadata};

/// CF axis role of a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CfAxis {
    X,
    Y,
    T,
}

/// Dimension names assigned to each role for one variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisRoles {
    pub x: String,
    pub y: String,
    pub t: Option<String>,
}

impl AxisRoles {
    /// Role of a dimension, if it has one.
    pub fn role_of(&self, dim: &str) -> Option<CfAxis> {
        if self.x == dim {
            Some(CfAxis::X)
        } else if self.y == dim {
            Some(CfAxis::Y)
        } else if self.t.as_deref() == Some(dim) {
            Some(CfAxis::T)
        } else {
            None
        }
    }
}

/// Variable name to axis roles. Only variables with both X and Y appear.
pub type AxisMap = BTreeMap<String, AxisRoles>;

/// `(x, y)` name pairs tried when attributes leave X or Y unresolved.
const FALLBACK_PAIRS: &[(&str, &str)] = &[
    ("x", "y"),
    ("lon", "lat"),
    ("longitude", "latitude"),
    ("nlon", "nlat"),
];

/// Rotated-pole pair, only meaningful for flat (non-pyramid) stores.
const ROTATED_PAIR: (&str, &str) = ("rlon", "rlat");

/// Infer axis roles for every variable under `prefix`.
///
/// `prefix` is `""` for flat datasets and the first level path for pyramids.
pub fn infer_axes(metadata: &ConsolidatedMetadata, prefix: &str, pyramid: bool) -> AxisMap {
    let mut axes = AxisMap::new();

    for path in metadata.array_paths(prefix) {
        let Some(dims) = metadata.dimensions(&path) else {
            continue;
        };

        let name = match path.rsplit_once('/') {
            Some((_, name)) => name.to_string(),
            None => path.clone(),
        };

        if let Some(roles) = infer_variable(metadata, prefix, &dims, pyramid) {
            axes.insert(name, roles);
        }
    }

    tracing::debug!(
        prefix = prefix,
        variables = ?axes.keys().collect::<Vec<_>>(),
        "Inferred axis roles"
    );

    axes
}

/// Resolve roles for one variable's dimension list.
pub fn infer_variable(
    metadata: &ConsolidatedMetadata,
    prefix: &str,
    dims: &[String],
    pyramid: bool,
) -> Option<AxisRoles> {
    let mut x = None;
    let mut y = None;
    let mut t = None;
    let mut calendar_dim = None;

    for dim in dims {
        let Some(attrs) = metadata.attrs(&join_path(prefix, dim)) else {
            continue;
        };

        let declared = attrs
            .get("axis")
            .or_else(|| attrs.get("cartesian_axis"))
            .and_then(Value::as_str)
            .map(|s| s.trim().to_ascii_uppercase());

        match declared.as_deref() {
            Some("X") => x = x.or_else(|| Some(dim.clone())),
            Some("Y") => y = y.or_else(|| Some(dim.clone())),
            Some("T") => t = t.or_else(|| Some(dim.clone())),
            _ => {}
        }

        if calendar_dim.is_none() && attrs.contains_key("calendar") {
            calendar_dim = Some(dim.clone());
        }
    }

    if t.is_none() {
        t = calendar_dim;
    }

    if x.is_none() || y.is_none() {
        let has = |name: &str| dims.iter().any(|d| d == name);
        let rotated = (!pyramid).then_some(ROTATED_PAIR);

        let pair = FALLBACK_PAIRS
            .iter()
            .copied()
            .chain(rotated)
            .find(|&(px, py)| has(px) && has(py));

        if let Some((px, py)) = pair {
            x = x.or_else(|| Some(px.to_string()));
            y = y.or_else(|| Some(py.to_string()));
        }
    }

    match (x, y) {
        (Some(x), Some(y)) if x != y => Some(AxisRoles { x, y, t }),
        _ => None,
    }
}
