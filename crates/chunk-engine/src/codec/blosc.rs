use std::borrow::Cow;

use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::codec::{BytesToBytesCodecTraits, CodecOptions};
use zarrs::array::BytesRepresentation;

use super::ChunkCodec;
use crate::error::{EngineError, Result};

/// `blosc` compressor.
///
/// Blosc frames are self-describing, so the inner compressor, shuffle mode
/// and type size are read from each frame header. The parameters given to
/// the wrapped codec only matter for encoding.
pub struct BloscChunkCodec {
    inner: Option<BloscCodec>,
}

impl BloscChunkCodec {
    pub fn new() -> Self {
        let inner = BloscCompressionLevel::try_from(5u8)
            .ok()
            .and_then(|level| {
                BloscCodec::new(BloscCompressor::LZ4, level, None, BloscShuffleMode::NoShuffle, None)
                    .ok()
            });
        Self { inner }
    }
}

impl Default for BloscChunkCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkCodec for BloscChunkCodec {
    fn id(&self) -> &str {
        "blosc"
    }

    fn decode(&self, encoded: &[u8]) -> Result<Vec<u8>> {
        let codec = self
            .inner
            .as_ref()
            .ok_or_else(|| EngineError::configuration("blosc codec unavailable"))?;

        let decoded = codec
            .decode(
                Cow::Borrowed(encoded),
                &BytesRepresentation::UnboundedSize,
                &CodecOptions::default(),
            )
            .map_err(|e| EngineError::decode(format!("blosc: {}", e)))?;

        Ok(decoded.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blosc_roundtrip_through_zarrs_encoder() {
        let raw: Vec<u8> = (0..1024u32).flat_map(|v| (v as f32).to_le_bytes()).collect();
        let codec = BloscChunkCodec::new();
        let inner = codec.inner.as_ref().unwrap();
        let encoded = inner
            .encode(Cow::Borrowed(&raw), &CodecOptions::default())
            .unwrap();

        assert_eq!(codec.decode(&encoded).unwrap(), raw);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let err = BloscChunkCodec::new().decode(&[1, 2, 3]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Decode);
    }
}
