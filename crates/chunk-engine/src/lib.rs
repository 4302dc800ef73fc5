//! Chunk Windowing Engine for Chunked Geospatial Arrays
//!
//! This crate drives interactive exploration of large Zarr v2 datasets
//! served over HTTP. Given a dataset's consolidated metadata, a variable
//! and a cursor (map center, zoom, per-dimension selectors), it works out
//! exactly which chunks are needed, fetches and decodes each of them at
//! most once, and keeps a running value range and extent over the active
//! window.
//!
//! # Architecture
//!
//! ```text
//! Dataset::initialize(url)
//!      │
//!      ├─► GET <url>/.zmetadata ─► ConsolidatedMetadata
//!      ├─► infer_axes (X / Y / T per variable)
//!      └─► Level::open per resolution
//!
//! Dataset::select_variable(name)
//!      │
//!      └─► Level::initialize_variable (coordinates, codec, fresh ChunkCache)
//!
//! Dataset::update_selection(center, zoom)
//!      │
//!      ├─► level_for_zoom
//!      └─► point_to_chunk_key ─► active_window
//!
//! Dataset::fetch_window()
//!      │
//!      └─► get_clim
//!               │
//!               ├─► ChunkCache hit: reuse decoded chunk
//!               │
//!               └─► miss: fetch (shared while in flight) ─► decode_chunk
//!                        │
//!                        ▼
//!                   WindowSnapshot { clim, bounds, chunks, selectors }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use chunk_engine::{Dataset, EngineConfig};
//!
//! let mut dataset = Dataset::initialize("s3://bucket/air.zarr", EngineConfig::from_env()).await?;
//! dataset.select_variable("air").await?;
//! dataset.update_selection([-100.0, 40.0], 0.0).await?;
//!
//! let window = dataset.fetch_window().await?;
//! for (key, chunk) in &window.chunks {
//!     // hand chunk.data / chunk.bounds to the renderer
//! }
//! ```

pub mod aggregate;
pub mod axis;
pub mod cache;
pub mod codec;
pub mod config;
pub mod dataset;
pub mod decoder;
pub mod error;
pub mod events;
pub mod keys;
pub mod level;
pub mod metadata;
pub mod selector;
pub mod store;
pub mod types;
pub mod variable;

// Re-export commonly used types at crate root
pub use aggregate::{get_clim, WindowAggregate};
pub use axis::{infer_axes, AxisMap, AxisRoles, CfAxis};
pub use cache::{ChunkCache, InFlight, SharedChunkCache};
pub use codec::{ChunkCodec, CodecRegistry};
pub use config::EngineConfig;
pub use dataset::{Dataset, WindowSnapshot};
pub use decoder::{decode_chunk, ClimOptions};
pub use error::{status_message, EngineError, ErrorKind, Result};
pub use events::DatasetEvent;
pub use keys::{
    active_window, adjacent_chunk, center_chunk_key, decode_key, encode_key, point_to_chunk_key,
};
pub use level::{Level, LevelContext, LevelVariable};
pub use metadata::{ArrayMetadata, ConsolidatedMetadata};
pub use selector::{advance_selector, selector_label, selector_value, Selector, SelectorMetadata};
pub use store::{normalize_url, ChunkStore, HttpStore, MemoryStore};
pub use types::{CacheStats, Chunk, ChunkBounds, Clim, DEFAULT_CLIM, EMPTY_CLIM};
pub use variable::{SpatialAxis, VariableDescriptor, WEB_MERCATOR_RADIUS};
