//! Raw chunk bytes to decoded [`Chunk`].
//!
//! ```text
//! encoded bytes
//!      │
//!      ├─► codec (zlib / blosc / raw)
//!      ├─► zarrs bytes codec → f32
//!      ├─► truncate edge chunk to the valid sub-rectangle
//!      ├─► flip reversed axes (north-up, west-left)
//!      ├─► clim over valid samples
//!      └─► bounds from the coordinate arrays
//! ```

use crate::codec::ChunkCodec;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::keys::chunk_bounds;
use crate::types::{Chunk, Clim, EMPTY_CLIM};
use crate::variable::VariableDescriptor;

/// Options controlling how a local clim is computed.
#[derive(Debug, Clone, Copy)]
pub struct ClimOptions {
    pub percentile_threshold: usize,
    pub lower: f64,
    pub upper: f64,
}

impl From<&EngineConfig> for ClimOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            percentile_threshold: config.clim_percentile_threshold,
            lower: config.clim_lower_percentile,
            upper: config.clim_upper_percentile,
        }
    }
}

impl Default for ClimOptions {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// Decode one chunk of `variable` at `indices`.
pub fn decode_chunk(
    raw: &[u8],
    indices: &[usize],
    variable: &VariableDescriptor,
    codec: Option<&dyn ChunkCodec>,
    options: ClimOptions,
) -> Result<Chunk> {
    let bytes = match codec {
        Some(codec) => codec.decode(raw)?,
        None => raw.to_vec(),
    };

    let values: Vec<f32> = variable
        .array
        .decode_elements(bytes)?
        .into_iter()
        .map(|v| v as f32)
        .collect();

    if indices.len() != variable.ndim() {
        return Err(EngineError::decode(format!(
            "chunk index {:?} does not match {} dimensions",
            indices,
            variable.ndim()
        )));
    }

    let valid_shape: Vec<usize> = indices
        .iter()
        .enumerate()
        .map(|(dim, &chunk)| variable.valid_len(dim, chunk))
        .collect();

    if valid_shape.iter().any(|&len| len == 0) {
        return Err(EngineError::decode(format!(
            "chunk index {:?} lies outside shape {:?}",
            indices, variable.shape
        )));
    }

    let mut data = truncate(values, &variable.chunk_shape, &valid_shape);

    for axis in [&variable.x, &variable.y] {
        if axis.reversed {
            data = flip_axis(&data, &valid_shape, axis.index);
        }
    }

    let clim = local_clim(&data, variable.fill_value, options);

    let bounds = chunk_bounds(indices, variable).ok_or_else(|| {
        EngineError::decode(format!("no coordinate extent for chunk {:?}", indices))
    })?;

    tracing::debug!(
        variable = %variable.name,
        indices = ?indices,
        shape = ?valid_shape,
        clim = ?clim,
        "Decoded chunk"
    );

    Ok(Chunk {
        data,
        shape: valid_shape,
        clim,
        bounds,
    })
}

/// Copy the leading `valid` sub-rectangle out of a full chunk.
fn truncate(values: Vec<f32>, full: &[usize], valid: &[usize]) -> Vec<f32> {
    if full == valid {
        return values;
    }

    let total: usize = valid.iter().product();
    let mut out = Vec::with_capacity(total);
    let mut index = vec![0usize; valid.len()];

    for _ in 0..total {
        let mut flat = 0;
        for (dim, &i) in index.iter().enumerate() {
            flat = flat * full[dim] + i;
        }
        out.push(values[flat]);

        for dim in (0..valid.len()).rev() {
            index[dim] += 1;
            if index[dim] < valid[dim] {
                break;
            }
            index[dim] = 0;
        }
    }

    out
}

/// Reverse a row-major grid along one axis.
fn flip_axis(data: &[f32], shape: &[usize], axis: usize) -> Vec<f32> {
    let len = shape[axis];
    let inner: usize = shape[axis + 1..].iter().product();
    let outer: usize = shape[..axis].iter().product();

    let mut out = Vec::with_capacity(data.len());
    for o in 0..outer {
        for i in (0..len).rev() {
            let start = (o * len + i) * inner;
            out.extend_from_slice(&data[start..start + inner]);
        }
    }
    out
}

/// Range over samples that are neither NaN nor the fill value.
///
/// Above the percentile threshold the range is the configured percentile
/// band of the sorted samples.
pub fn local_clim(data: &[f32], fill_value: Option<f64>, options: ClimOptions) -> Clim {
    let fill = fill_value.map(|f| f as f32);
    let is_valid = |v: f32| !v.is_nan() && Some(v) != fill;

    let count = data.iter().filter(|&&v| is_valid(v)).count();
    if count == 0 {
        return EMPTY_CLIM;
    }

    if count <= options.percentile_threshold {
        return data
            .iter()
            .copied()
            .filter(|&v| is_valid(v))
            .fold(EMPTY_CLIM, |[lo, hi], v| [lo.min(v), hi.max(v)]);
    }

    let mut valid: Vec<f32> = data.iter().copied().filter(|&v| is_valid(v)).collect();
    valid.sort_unstable_by(f32::total_cmp);

    let last = (valid.len() - 1) as f64;
    let lo = valid[(last * options.lower).round() as usize];
    let hi = valid[(last * options.upper).round() as usize];
    [lo, hi]
}
