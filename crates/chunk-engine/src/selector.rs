//! Per-dimension cursor state.
//!
//! Spatial dimensions carry no cursor: their chunk comes from the
//! geographic center. Every other dimension has a `(chunk, index)` pair
//! addressing one slice of the variable.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;

use crate::axis::CfAxis;
use crate::error::{EngineError, Result};
use crate::variable::VariableDescriptor;

/// Calendars whose dates chrono can represent.
const GREGORIAN_CALENDARS: &[&str] = &["standard", "gregorian", "proleptic_gregorian"];

/// Static information about the dimension a selector moves along.
#[derive(Debug, Clone, Serialize)]
pub struct SelectorMetadata {
    /// Coordinate values, when the store carries a coordinate array.
    #[serde(skip)]
    pub array: Option<Arc<Vec<f64>>>,
    /// Position of the dimension in the variable's shape.
    pub dimension_index: usize,
    pub cf_axis: Option<CfAxis>,
    pub units: Option<String>,
    pub calendar: Option<String>,
}

/// Cursor along one dimension.
#[derive(Debug, Clone, Serialize)]
pub struct Selector {
    pub name: String,
    pub chunk: Option<usize>,
    pub index: Option<usize>,
    pub metadata: SelectorMetadata,
}

impl Selector {
    /// Selector for an X or Y dimension. It never holds a cursor.
    pub fn spatial(name: impl Into<String>, dimension_index: usize, axis: CfAxis) -> Self {
        Self {
            name: name.into(),
            chunk: None,
            index: None,
            metadata: SelectorMetadata {
                array: None,
                dimension_index,
                cf_axis: Some(axis),
                units: None,
                calendar: None,
            },
        }
    }

    /// Selector for a non-spatial dimension, starting at the first slice.
    pub fn new(name: impl Into<String>, metadata: SelectorMetadata) -> Self {
        Self {
            name: name.into(),
            chunk: Some(0),
            index: Some(0),
            metadata,
        }
    }

    /// True for X and Y selectors.
    pub fn is_spatial(&self) -> bool {
        matches!(self.metadata.cf_axis, Some(CfAxis::X) | Some(CfAxis::Y))
    }

    /// Absolute position along the dimension.
    pub fn absolute_index(&self, variable: &VariableDescriptor) -> Option<usize> {
        let len = variable.chunk_shape[self.metadata.dimension_index];
        Some(self.chunk? * len + self.index?)
    }
}

/// Step a selector forward by one slice.
///
/// Moves within the current chunk, rolls into the next chunk on overflow
/// and wraps to the first chunk after the last one. A truncated final
/// chunk only has its valid slices visited. Spatial selectors are returned
/// unchanged.
pub fn advance_selector(selector: &Selector, variable: &VariableDescriptor) -> Selector {
    let (Some(chunk), Some(index)) = (selector.chunk, selector.index) else {
        return selector.clone();
    };

    let dim = selector.metadata.dimension_index;
    let count = variable.chunk_counts()[dim];
    let valid = variable.valid_len(dim, chunk);

    let (chunk, index) = if index + 1 < valid {
        (chunk, index + 1)
    } else if chunk + 1 < count {
        (chunk + 1, 0)
    } else {
        (0, 0)
    };

    Selector {
        chunk: Some(chunk),
        index: Some(index),
        ..selector.clone()
    }
}

/// Point a selector at an absolute position along its dimension.
pub fn select_index(
    selector: &Selector,
    variable: &VariableDescriptor,
    absolute: usize,
) -> Result<Selector> {
    if selector.is_spatial() {
        return Err(EngineError::configuration(format!(
            "dimension '{}' is spatial and follows the map center",
            selector.name
        )));
    }

    let dim = selector.metadata.dimension_index;
    if absolute >= variable.shape[dim] {
        return Err(EngineError::configuration(format!(
            "index {} out of range for dimension '{}' of length {}",
            absolute, selector.name, variable.shape[dim]
        )));
    }

    let len = variable.chunk_shape[dim];
    Ok(Selector {
        chunk: Some(absolute / len),
        index: Some(absolute % len),
        ..selector.clone()
    })
}

/// Coordinate value under the cursor.
pub fn selector_value(selector: &Selector, variable: &VariableDescriptor) -> Option<f64> {
    let position = selector.absolute_index(variable)?;
    selector.metadata.array.as_ref()?.get(position).copied()
}

/// Human-readable label for the cursor position.
///
/// CF time coordinates (`"<unit> since <date>"`) on a Gregorian calendar
/// are rendered as dates; anything else as the raw value with its units.
pub fn selector_label(selector: &Selector, variable: &VariableDescriptor) -> Option<String> {
    let value = selector_value(selector, variable)
        .or_else(|| selector.absolute_index(variable).map(|i| i as f64))?;

    let units = selector.metadata.units.as_deref();
    let gregorian = selector
        .metadata
        .calendar
        .as_deref()
        .map_or(true, |c| GREGORIAN_CALENDARS.contains(&c.to_ascii_lowercase().as_str()));

    if gregorian {
        if let Some(time) = units.and_then(|u| cf_datetime(value, u)) {
            return Some(format_datetime(&time));
        }
    }

    Some(match units {
        Some(units) if !units.is_empty() => format!("{} {}", value, units),
        _ => value.to_string(),
    })
}

/// Decode a CF time value such as `"hours since 1800-01-01 00:00:0.0"`.
pub fn cf_datetime(value: f64, units: &str) -> Option<NaiveDateTime> {
    let (unit, reference) = units.split_once(" since ")?;

    let seconds = match unit.trim().to_ascii_lowercase().as_str() {
        "seconds" | "second" | "secs" | "sec" | "s" => 1.0,
        "minutes" | "minute" | "mins" | "min" => 60.0,
        "hours" | "hour" | "hrs" | "hr" | "h" => 3600.0,
        "days" | "day" | "d" => 86_400.0,
        _ => return None,
    };

    let origin = parse_reference(reference.trim())?;
    let offset = Duration::milliseconds((value * seconds * 1000.0).round() as i64);
    origin.checked_add_signed(offset)
}

fn parse_reference(reference: &str) -> Option<NaiveDateTime> {
    let reference = reference.trim_end_matches('Z');
    let (date, time) = match reference.split_once(|c: char| c == 'T' || c == ' ') {
        Some((date, time)) => (date, Some(time.trim())),
        None => (reference, None),
    };

    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;

    let time = match time {
        None | Some("") => NaiveTime::from_hms_opt(0, 0, 0)?,
        Some(time) => {
            // Drop any trailing zone offset; CF references are UTC in practice.
            let time = time.split_whitespace().next()?;
            let mut parts = time.split(':');
            let h: u32 = parts.next()?.parse().ok()?;
            let m: u32 = parts.next().map_or(Some(0), |p| p.parse().ok())?;
            let s: f64 = parts.next().map_or(Some(0.0), |p| p.parse().ok())?;
            NaiveTime::from_hms_opt(h, m, s.floor() as u32)?
        }
    };

    Some(NaiveDateTime::new(date, time))
}

fn format_datetime(time: &NaiveDateTime) -> String {
    if time.num_seconds_from_midnight() == 0 {
        time.format("%Y-%m-%d").to_string()
    } else {
        time.format("%Y-%m-%d %H:%M").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::AxisRoles;
    use crate::metadata::ArrayMetadata;
    use crate::variable::SpatialAxis;
    use serde_json::json;

    fn variable(time_len: usize, time_chunk: usize) -> VariableDescriptor {
        let array = ArrayMetadata::from_value(
            &json!({
                "shape": [time_len, 4, 8],
                "chunks": [time_chunk, 4, 8],
                "dtype": "<f4",
                "fill_value": null
            }),
            ".",
        )
        .unwrap();

        let lat = (0..4).map(|i| 67.5 - 45.0 * i as f64).collect();
        let lon = (0..8).map(|i| -157.5 + 45.0 * i as f64).collect();

        VariableDescriptor::new(
            "air",
            "air",
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

    fn time_selector(units: &str) -> Selector {
        Selector::new(
            "time",
            SelectorMetadata {
                array: Some(Arc::new((0..5).map(|i| 24.0 * i as f64).collect())),
                dimension_index: 0,
                cf_axis: Some(CfAxis::T),
                units: Some(units.to_string()),
                calendar: Some("standard".to_string()),
            },
        )
    }

    #[test]
    fn test_advance_rolls_and_wraps() {
        // 5 time steps in chunks of 2: the last chunk holds a single slice.
        let var = variable(5, 2);
        let mut sel = time_selector("hours since 2000-01-01");

        let mut visited = Vec::new();
        for _ in 0..6 {
            visited.push((sel.chunk.unwrap(), sel.index.unwrap()));
            sel = advance_selector(&sel, &var);
        }

        assert_eq!(
            visited,
            vec![(0, 0), (0, 1), (1, 0), (1, 1), (2, 0), (0, 0)]
        );
    }

    #[test]
    fn test_spatial_selector_unchanged() {
        let var = variable(5, 2);
        let sel = Selector::spatial("lat", 1, CfAxis::Y);
        let next = advance_selector(&sel, &var);
        assert!(next.chunk.is_none() && next.index.is_none());
        assert!(select_index(&sel, &var, 0).is_err());
    }

    #[test]
    fn test_select_index() {
        let var = variable(5, 2);
        let sel = select_index(&time_selector("days since 2000-01-01"), &var, 3).unwrap();
        assert_eq!((sel.chunk, sel.index), (Some(1), Some(1)));
        assert_eq!(selector_value(&sel, &var), Some(72.0));
        assert!(select_index(&sel, &var, 5).is_err());
    }

    #[test]
    fn test_time_labels() {
        let var = variable(5, 2);
        let sel = select_index(&time_selector("hours since 1800-01-01 00:00:0.0"), &var, 2).unwrap();
        assert_eq!(selector_label(&sel, &var).as_deref(), Some("1800-01-03"));

        let mut sel = time_selector("minutes since 2020-06-01T12:00:00");
        sel.index = Some(1);
        assert_eq!(selector_label(&sel, &var).as_deref(), Some("2020-06-01 12:24"));
    }

    #[test]
    fn test_non_time_and_noleap_labels() {
        let var = variable(5, 2);
        let mut sel = time_selector("m");
        sel.index = Some(1);
        assert_eq!(selector_label(&sel, &var).as_deref(), Some("24 m"));

        let mut sel = time_selector("days since 0001-01-01");
        sel.metadata.calendar = Some("noleap".to_string());
        assert_eq!(
            selector_label(&sel, &var).as_deref(),
            Some("0 days since 0001-01-01")
        );
    }
}
