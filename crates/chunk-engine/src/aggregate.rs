//! Window-wide value range and extent.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;

use crate::cache::SharedChunkCache;
use crate::error::Result;
use crate::types::{merge_clim, Chunk, ChunkBounds, Clim, EMPTY_CLIM};

/// Aggregate over a fully resident chunk window.
#[derive(Debug, Clone)]
pub struct WindowAggregate {
    /// Elementwise min/max of the chunk clims. [`EMPTY_CLIM`] when no
    /// chunk holds a valid sample.
    pub clim: Clim,
    /// Union of the chunk bounds.
    pub bounds: ChunkBounds,
    /// The window's chunks by key.
    pub chunks: BTreeMap<String, Arc<Chunk>>,
}

/// Make every key in `keys` resident and fold their ranges and bounds.
///
/// Keys missing from the cache are fetched concurrently with `fetch`. Every
/// fetch runs to completion and each successful chunk is cached even when a
/// sibling fails; the first failure then fails the call. The aggregate
/// always describes a complete window.
pub async fn get_clim<F, Fut>(
    keys: &[String],
    cache: &SharedChunkCache,
    fetch: F,
) -> Result<WindowAggregate>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<Arc<Chunk>>>,
{
    let mut chunks = BTreeMap::new();
    let mut missing = Vec::new();

    {
        let cache = cache.read().await;
        for key in keys {
            match cache.get(key) {
                Some(chunk) => {
                    chunks.insert(key.clone(), chunk);
                }
                None => missing.push(key.clone()),
            }
        }
    }

    if !missing.is_empty() {
        tracing::debug!(
            resident = chunks.len(),
            missing = ?missing,
            "Fetching window chunks"
        );

        let fetched = join_all(missing.iter().cloned().map(&fetch)).await;

        let mut failure = None;
        {
            let mut cache = cache.write().await;
            for (key, result) in missing.into_iter().zip(fetched) {
                match result {
                    Ok(chunk) => {
                        if !cache.has(&key) {
                            cache.put(key.clone(), Arc::clone(&chunk));
                        }
                        chunks.insert(key, chunk);
                    }
                    Err(err) => {
                        tracing::warn!(key = %key, error = %err, "Window chunk failed");
                        failure.get_or_insert(err);
                    }
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }
    }

    let (clim, bounds) = chunks.values().fold(
        (EMPTY_CLIM, ChunkBounds::empty()),
        |(clim, bounds), chunk| (merge_clim(clim, chunk.clim), bounds.union(&chunk.bounds)),
    );

    Ok(WindowAggregate {
        clim,
        bounds,
        chunks,
    })
}
