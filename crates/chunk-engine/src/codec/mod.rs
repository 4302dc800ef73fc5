//! Chunk decompression codecs, registered by Zarr compressor id.

mod blosc;
mod zlib;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{EngineError, Result};

pub use blosc::BloscChunkCodec;
pub use zlib::ZlibCodec;

/// A bytes-to-bytes decompressor for one compressor id.
pub trait ChunkCodec: Send + Sync {
    /// Compressor id as it appears in `.zarray` (`compressor.id`).
    fn id(&self) -> &str;

    /// Decompress one encoded chunk.
    fn decode(&self, encoded: &[u8]) -> Result<Vec<u8>>;
}

/// Codecs available to the decoder, keyed by compressor id.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn ChunkCodec>>,
}

impl CodecRegistry {
    /// An empty registry. Every compressed array fails to open.
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Register a codec, replacing any previous one with the same id.
    pub fn register(&mut self, codec: Arc<dyn ChunkCodec>) {
        self.codecs.insert(codec.id().to_string(), codec);
    }

    /// Look up the codec for an array's compressor.
    ///
    /// `None` (no compressor) resolves to `None`: chunks are stored raw.
    /// An id with no registered codec is a configuration error.
    pub fn resolve(&self, compressor: Option<&str>) -> Result<Option<Arc<dyn ChunkCodec>>> {
        match compressor {
            None => Ok(None),
            Some(id) => self
                .codecs
                .get(id)
                .cloned()
                .map(Some)
                .ok_or_else(|| EngineError::configuration(format!("unsupported compressor '{}'", id))),
        }
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.codecs.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(ZlibCodec));
        registry.register(Arc::new(BloscChunkCodec::new()));
        registry
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codecs", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_default_registry() {
        let registry = CodecRegistry::default();
        assert_eq!(registry.ids(), vec!["blosc", "zlib"]);
        assert!(registry.resolve(Some("zlib")).unwrap().is_some());
        assert!(registry.resolve(None).unwrap().is_none());
    }

    #[test]
    fn test_unregistered_compressor_is_fatal() {
        let err = CodecRegistry::default().resolve(Some("zstd")).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("zstd"));
    }
}
