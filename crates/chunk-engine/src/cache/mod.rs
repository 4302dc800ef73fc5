//! Decoded chunk caching and in-flight fetch sharing.

mod chunk_cache;
mod in_flight;

use std::sync::Arc;

use tokio::sync::RwLock;

pub use chunk_cache::ChunkCache;
pub use in_flight::InFlight;

/// Cache handle shared between a level and its concurrent fetches.
pub type SharedChunkCache = Arc<RwLock<ChunkCache>>;
