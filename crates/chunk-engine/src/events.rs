//! Notifications for observers of a [`Dataset`](crate::Dataset).

use serde::Serialize;

use crate::types::{ChunkBounds, Clim};

/// Capacity of the broadcast channel. Slow subscribers lose the oldest
/// events first.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// State change published by a dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DatasetEvent {
    /// A variable was selected and every level initialized for it.
    VariableSelected { variable: String, levels: usize },

    /// The cursor moved: new level and/or active window.
    SelectionChanged {
        level: usize,
        active_chunk_keys: Vec<String>,
    },

    /// The active window is resident and aggregated.
    WindowLoaded {
        clim: Clim,
        bounds: ChunkBounds,
        chunks: usize,
    },
}
