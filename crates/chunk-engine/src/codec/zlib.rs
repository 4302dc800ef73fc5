use std::io::Read;

use flate2::read::ZlibDecoder;

use super::ChunkCodec;
use crate::error::{EngineError, Result};

/// `zlib` compressor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZlibCodec;

impl ChunkCodec for ZlibCodec {
    fn id(&self) -> &str {
        "zlib"
    }

    fn decode(&self, encoded: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(encoded);
        let mut decoded = Vec::new();
        decoder
            .read_to_end(&mut decoded)
            .map_err(|e| EngineError::decode(format!("zlib: {}", e)))?;
        Ok(decoded)
    }
}
