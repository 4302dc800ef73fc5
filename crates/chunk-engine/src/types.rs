//! Core types shared by the decoder, cache and aggregator.

use serde::{Deserialize, Serialize};

/// `[min, max]` value range used to map data values to a color scale.
pub type Clim = [f32; 2];

/// Fold identity: the range of a window with no valid sample.
pub const EMPTY_CLIM: Clim = [f32::INFINITY, f32::NEG_INFINITY];

/// Range substituted for [`EMPTY_CLIM`] before it reaches a caller.
pub const DEFAULT_CLIM: Clim = [0.0, 0.0];

/// True when no valid sample contributed to the range.
pub fn is_empty_clim(clim: &Clim) -> bool {
    !(clim[0] <= clim[1])
}

/// Elementwise min/max of two ranges.
pub fn merge_clim(a: Clim, b: Clim) -> Clim {
    [a[0].min(b[0]), a[1].max(b[1])]
}

/// Geographic extent of a chunk, padded from cell centers to cell edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkBounds {
    /// `[min, max]` latitude in degrees.
    pub lat: [f64; 2],
    /// `[min, max]` longitude in degrees.
    pub lon: [f64; 2],
}

impl ChunkBounds {
    /// Create bounds from latitude and longitude ranges.
    pub fn new(lat: [f64; 2], lon: [f64; 2]) -> Self {
        Self { lat, lon }
    }

    /// Fold identity for [`ChunkBounds::union`].
    pub fn empty() -> Self {
        Self {
            lat: [f64::INFINITY, f64::NEG_INFINITY],
            lon: [f64::INFINITY, f64::NEG_INFINITY],
        }
    }

    /// True if no chunk has been folded in.
    pub fn is_empty(&self) -> bool {
        !(self.lat[0] <= self.lat[1] && self.lon[0] <= self.lon[1])
    }

    /// Smallest bounds enclosing both.
    pub fn union(&self, other: &ChunkBounds) -> Self {
        Self {
            lat: [self.lat[0].min(other.lat[0]), self.lat[1].max(other.lat[1])],
            lon: [self.lon[0].min(other.lon[0]), self.lon[1].max(other.lon[1])],
        }
    }

    /// Check if a point lies inside (edges inclusive).
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.lon[0] && lon <= self.lon[1] && lat >= self.lat[0] && lat <= self.lat[1]
    }
}

/// A decoded chunk. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Row-major values, north-up / west-left.
    pub data: Vec<f32>,
    /// Valid (possibly edge-truncated) shape, one entry per dimension.
    pub shape: Vec<usize>,
    /// Local value range over non-NaN, non-fill entries.
    pub clim: Clim,
    /// Geographic extent.
    pub bounds: ChunkBounds,
}

impl Chunk {
    /// Value at a multi-dimensional index within the chunk.
    pub fn get(&self, index: &[usize]) -> Option<f32> {
        if index.len() != self.shape.len() {
            return None;
        }

        let mut flat = 0;
        for (i, (&idx, &len)) in index.iter().zip(&self.shape).enumerate() {
            if idx >= len {
                return None;
            }
            let stride: usize = self.shape[i + 1..].iter().product();
            flat += idx * stride;
        }
        self.data.get(flat).copied()
    }

    /// Approximate in-memory size of the decoded values.
    pub fn size_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of chunks currently resident.
    pub entries: usize,
    /// Decoded bytes held by the cache.
    pub memory_bytes: u64,
}

impl CacheStats {
    /// Hit rate as a fraction of lookups (0 when there were none).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
