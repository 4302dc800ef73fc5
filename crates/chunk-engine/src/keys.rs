//! Chunk key encoding and active-window arithmetic.
//!
//! A chunk key is the separator-joined tuple of per-dimension chunk
//! indices, e.g. `"0/2/2"`. Keys are absolute: they name the same chunk
//! regardless of which request produced them.

use std::collections::BTreeSet;

use crate::error::{EngineError, Result};
use crate::selector::Selector;
use crate::types::ChunkBounds;
use crate::variable::VariableDescriptor;

/// Join chunk indices with the separator.
pub fn encode_key(indices: &[usize], separator: &str) -> String {
    indices
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}

/// Split a key into chunk indices.
pub fn decode_key(key: &str, separator: &str) -> Result<Vec<usize>> {
    key.split(separator)
        .map(|part| {
            let invalid = || EngineError::configuration(format!("invalid chunk key '{}'", key));
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse::<usize>().map_err(|_| invalid())
        })
        .collect()
}

/// Decode a key and check it addresses an existing chunk of `variable`.
pub fn decode_variable_key(key: &str, variable: &VariableDescriptor) -> Result<Vec<usize>> {
    let indices = decode_key(key, &variable.separator)?;
    let counts = variable.chunk_counts();

    if indices.len() != counts.len() || indices.iter().zip(&counts).any(|(&i, &c)| i >= c) {
        return Err(EngineError::configuration(format!(
            "chunk key '{}' is outside the {:?} chunk grid of '{}'",
            key, counts, variable.name
        )));
    }

    Ok(indices)
}

/// Key of the chunk `offset = (dx, dy)` chunks away from `key`.
///
/// `dx` wraps around the X axis; `None` when `dy` leaves the grid.
pub fn adjacent_chunk(offset: (i64, i64), key: &str, variable: &VariableDescriptor) -> Option<String> {
    let mut indices = decode_variable_key(key, variable).ok()?;
    let counts = variable.chunk_counts();
    let (dx, dy) = offset;

    let xi = variable.x.index;
    let count = counts[xi] as i64;
    indices[xi] = (indices[xi] as i64 + dx).rem_euclid(count) as usize;

    let yi = variable.y.index;
    let y = indices[yi] as i64 + dy;
    if y < 0 || y >= counts[yi] as i64 {
        return None;
    }
    indices[yi] = y as usize;

    Some(encode_key(&indices, &variable.separator))
}

/// Deduplicated, sorted keys of the window footprint around `key`.
pub fn active_window(key: &str, variable: &VariableDescriptor, offsets: &[(i64, i64)]) -> Vec<String> {
    offsets
        .iter()
        .filter_map(|&offset| adjacent_chunk(offset, key, variable))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Key of the chunk under a geographic point for the given selectors.
///
/// Longitudes outside the X span are retried shifted by ±360° and fall
/// back to chunk 0. Latitudes outside the Y span clamp to the edge chunk.
/// Non-spatial dimensions take the selector's chunk.
pub fn point_to_chunk_key(
    point: [f64; 2],
    selectors: &[Selector],
    variable: &VariableDescriptor,
) -> Option<String> {
    let [lon, lat] = point;
    let counts = variable.chunk_counts();
    let mut indices: Vec<i64> = Vec::with_capacity(variable.ndim());

    for dim in 0..variable.ndim() {
        let len = variable.chunk_shape[dim];
        let last = counts[dim] as i64 - 1;

        let index = if dim == variable.x.index {
            let axis = &variable.x;
            [lon, lon - 360.0, lon + 360.0]
                .into_iter()
                .find(|&v| axis.contains(v))
                .map_or(0, |v| axis.chunk_index(v, len).min(last))
        } else if dim == variable.y.index {
            let axis = &variable.y;
            let [min, max] = axis.span();
            axis.chunk_index(lat.clamp(min, max), len).clamp(0, last)
        } else {
            selectors
                .iter()
                .find(|s| s.metadata.dimension_index == dim)
                .and_then(|s| s.chunk)
                .map_or(0, |c| c as i64)
        };

        indices.push(index);
    }

    if indices.iter().any(|&i| i < 0) {
        tracing::warn!(
            variable = %variable.name,
            lon = lon,
            lat = lat,
            indices = ?indices,
            "Point mapped to a negative chunk index"
        );
        return None;
    }

    let indices: Vec<usize> = indices.into_iter().map(|i| i as usize).collect();
    Some(encode_key(&indices, &variable.separator))
}

/// Key of the center chunk of the spatial grid for the given selectors.
pub fn center_chunk_key(selectors: &[Selector], variable: &VariableDescriptor) -> String {
    let counts = variable.chunk_counts();
    let indices: Vec<usize> = (0..variable.ndim())
        .map(|dim| {
            if variable.is_spatial(dim) {
                counts[dim] / 2
            } else {
                selectors
                    .iter()
                    .find(|s| s.metadata.dimension_index == dim)
                    .and_then(|s| s.chunk)
                    .unwrap_or(0)
            }
        })
        .collect();

    encode_key(&indices, &variable.separator)
}

/// Geographic extent of a chunk, from the coordinate arrays.
pub fn chunk_bounds(indices: &[usize], variable: &VariableDescriptor) -> Option<ChunkBounds> {
    let (xi, yi) = (variable.x.index, variable.y.index);
    let lon = variable
        .x
        .chunk_extent(*indices.get(xi)?, variable.chunk_shape[xi])?;
    let lat = variable
        .y
        .chunk_extent(*indices.get(yi)?, variable.chunk_shape[yi])?;
    Some(ChunkBounds::new(lat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::{AxisRoles, CfAxis};
    use crate::config::EngineConfig;
    use crate::metadata::ArrayMetadata;
    use crate::variable::SpatialAxis;
    use serde_json::json;

    /// `[1, 180, 360]` global 1° grid in `[1, 45, 90]` chunks.
    fn air_temperature() -> VariableDescriptor {
        let array = ArrayMetadata::from_value(
            &json!({
                "shape": [1, 180, 360],
                "chunks": [1, 45, 90],
                "dtype": "<f4",
                "fill_value": "NaN",
                "dimension_separator": "/"
            }),
            ".",
        )
        .unwrap();

        let lat = (0..180).map(|i| 89.5 - i as f64).collect();
        let lon = (0..360).map(|i| -179.5 + i as f64).collect();

        VariableDescriptor::new(
            "air_temperature",
            "air_temperature",
            vec!["time".into(), "lat".into(), "lon".into()],
            &array,
            AxisRoles {
                x: "lon".into(),
                y: "lat".into(),
                t: Some("time".into()),
            },
            SpatialAxis::new("lon", 2, CfAxis::X, lon, 0.01).unwrap(),
            SpatialAxis::new("lat", 1, CfAxis::Y, lat, 0.01).unwrap(),
        )
        .unwrap()
    }

    fn selectors() -> Vec<Selector> {
        vec![
            Selector::new(
                "time",
                crate::selector::SelectorMetadata {
                    array: None,
                    dimension_index: 0,
                    cf_axis: Some(CfAxis::T),
                    units: None,
                    calendar: None,
                },
            ),
            Selector::spatial("lat", 1, CfAxis::Y),
            Selector::spatial("lon", 2, CfAxis::X),
        ]
    }

    #[test]
    fn test_encode_decode() {
        assert_eq!(encode_key(&[0, 2, 2], "/"), "0/2/2");
        assert_eq!(encode_key(&[3], "."), "3");
        assert_eq!(decode_key("0.12.7", ".").unwrap(), vec![0, 12, 7]);
        assert!(decode_key("0/x/1", "/").is_err());
        assert!(decode_key("0/-1/1", "/").is_err());
        assert!(decode_key("0/+1/2", "/").is_err());
        assert!(decode_key("0//2", "/").is_err());
        assert!(decode_key(" 1.2", ".").is_err());

        let var = air_temperature();
        assert!(decode_variable_key("0/4/0", &var).is_err());
        assert!(decode_variable_key("0/1", &var).is_err());
    }

    #[test]
    fn test_center_chunk() {
        let var = air_temperature();
        assert_eq!(var.chunk_counts(), vec![1, 4, 4]);
        assert_eq!(center_chunk_key(&selectors(), &var), "0/2/2");
    }

    #[test]
    fn test_adjacent_wraps_x_only() {
        let var = air_temperature();
        assert_eq!(adjacent_chunk((1, 0), "0/2/3", &var).as_deref(), Some("0/2/0"));
        assert_eq!(adjacent_chunk((-1, 0), "0/2/0", &var).as_deref(), Some("0/2/3"));
        assert_eq!(adjacent_chunk((0, 1), "0/3/1", &var), None);
        assert_eq!(adjacent_chunk((0, -1), "0/0/1", &var), None);
        assert_eq!(adjacent_chunk((0, 0), "0/9/1", &var), None);
    }

    #[test]
    fn test_active_window_unique_and_in_range() {
        let var = air_temperature();
        let offsets = EngineConfig::default().window_offsets();

        // 5 columns wrap onto a 4-wide grid, so one column repeats.
        let window = active_window("0/2/2", &var, &offsets);
        assert_eq!(window.len(), 12);

        let unique: BTreeSet<_> = window.iter().collect();
        assert_eq!(unique.len(), window.len());

        for key in &window {
            assert!(decode_variable_key(key, &var).is_ok(), "{key}");
        }

        // At the pole row, nothing above is requested.
        let window = active_window("0/0/0", &var, &offsets);
        assert_eq!(window.len(), 8);
        assert!(window.iter().all(|k| !k.starts_with("0/3/")));
    }

    #[test]
    fn test_point_to_chunk_key() {
        let var = air_temperature();
        let sel = selectors();

        assert_eq!(point_to_chunk_key([10.0, -10.0], &sel, &var).as_deref(), Some("0/2/2"));
        assert_eq!(point_to_chunk_key([-170.0, 80.0], &sel, &var).as_deref(), Some("0/0/0"));

        // Shifted copies of the globe land on the same chunk.
        assert_eq!(point_to_chunk_key([370.0, -10.0], &sel, &var).as_deref(), Some("0/2/2"));
        assert_eq!(point_to_chunk_key([-350.0, -10.0], &sel, &var).as_deref(), Some("0/2/2"));

        // Latitude clamps to the edge row.
        assert_eq!(point_to_chunk_key([10.0, -95.0], &sel, &var).as_deref(), Some("0/3/2"));
        assert_eq!(point_to_chunk_key([180.0, 90.0], &sel, &var).as_deref(), Some("0/0/3"));

        // Longitude unreachable even after shifting falls back to column 0.
        assert_eq!(point_to_chunk_key([900.0, 0.0], &sel, &var).as_deref(), Some("0/2/0"));
    }

    #[test]
    fn test_point_lies_in_its_chunk_bounds() {
        let var = air_temperature();
        let sel = selectors();

        for lon in (-180..=180).step_by(7) {
            for lat in (-90..=90).step_by(5) {
                let (lon, lat) = (lon as f64 + 0.3, lat as f64 * 0.99);
                let key = point_to_chunk_key([lon, lat], &sel, &var).unwrap();
                let indices = decode_variable_key(&key, &var).unwrap();
                let bounds = chunk_bounds(&indices, &var).unwrap();
                let lon = if lon > 180.0 { lon - 360.0 } else { lon };
                assert!(bounds.contains(lon, lat), "{key} {bounds:?} ({lon}, {lat})");
            }
        }
    }

    #[test]
    fn test_center_chunk_bounds() {
        let var = air_temperature();
        let bounds = chunk_bounds(&[0, 2, 2], &var).unwrap();
        assert_eq!(bounds.lat, [-45.0, 0.0]);
        assert_eq!(bounds.lon, [0.0, 90.0]);
    }
}
