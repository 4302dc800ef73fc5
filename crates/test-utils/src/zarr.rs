//! In-memory Zarr v2 store builder.
//!
//! Produces the object map a real store would serve: `.zgroup`, per-array
//! `.zarray`/`.zattrs`, encoded chunk objects and a consolidated
//! `.zmetadata` document covering every metadata key.
//!
//! Arrays are written through zarrs into a [`MemoryStore`]. zarrs has no
//! zlib codec, so zlib chunks are written raw and compressed afterwards.
//!
//! ```
//! use test_utils::zarr::{ArraySpec, Compression, ZarrStoreBuilder};
//!
//! let objects = ZarrStoreBuilder::new()
//!     .coordinate("x", &[0.5, 1.5], serde_json::json!({"axis": "X"}))
//!     .array(ArraySpec::new("v", &["x"], &[2], &[2], vec![1.0, 2.0]).compression(Compression::Zlib))
//!     .build();
//!
//! assert!(objects.contains_key(".zmetadata"));
//! assert!(objects.contains_key("v/0"));
//! ```

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use flate2::write::ZlibEncoder;
use serde_json::{json, Map, Value};
use zarrs::array::codec::CodecOptionsBuilder;
use zarrs::array::{
    Array, ArrayMetadata, ArrayMetadataOptions, ArrayMetadataV2, ChunkKeySeparator, ChunkShape,
};
use zarrs::array_subset::ArraySubset;
use zarrs::metadata::v2::array::FillValueMetadataV2;
use zarrs::metadata::v2::MetadataV2;
use zarrs::storage::store::MemoryStore;
use zarrs::storage::{ListableStorageTraits, ReadableStorageTraits};

/// Chunk compression applied by the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Raw,
    Zlib,
    /// LZ4 blosc frames, encoded by zarrs.
    Blosc,
}

/// Description of one array to write.
#[derive(Debug, Clone)]
pub struct ArraySpec {
    pub path: String,
    pub dimensions: Vec<String>,
    pub shape: Vec<usize>,
    pub chunks: Vec<usize>,
    /// Numpy dtype string: `<f4`, `>f4`, `<f8`, `<i2`, `<u1` ...
    pub dtype: String,
    pub compression: Compression,
    /// Overrides the compressor id written to `.zarray` (unknown codecs).
    pub compressor_id: Option<String>,
    pub fill_value: Value,
    pub dimension_separator: Option<String>,
    pub attrs: Map<String, Value>,
    /// Row-major values, `shape.iter().product()` of them.
    pub data: Vec<f64>,
}

impl ArraySpec {
    pub fn new(
        path: &str,
        dimensions: &[&str],
        shape: &[usize],
        chunks: &[usize],
        data: Vec<f64>,
    ) -> Self {
        Self {
            path: path.to_string(),
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            shape: shape.to_vec(),
            chunks: chunks.to_vec(),
            dtype: "<f4".to_string(),
            compression: Compression::Raw,
            compressor_id: None,
            fill_value: Value::Null,
            dimension_separator: None,
            attrs: Map::new(),
            data,
        }
    }

    pub fn dtype(mut self, dtype: &str) -> Self {
        self.dtype = dtype.to_string();
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn compressor_id(mut self, id: &str) -> Self {
        self.compressor_id = Some(id.to_string());
        self
    }

    pub fn fill_value(mut self, fill: Value) -> Self {
        self.fill_value = fill;
        self
    }

    pub fn separator(mut self, separator: &str) -> Self {
        self.dimension_separator = Some(separator.to_string());
        self
    }

    pub fn attr(mut self, key: &str, value: Value) -> Self {
        self.attrs.insert(key.to_string(), value);
        self
    }

    fn separator_char(&self) -> ChunkKeySeparator {
        match self.dimension_separator.as_deref() {
            Some("/") => ChunkKeySeparator::Slash,
            Some(".") | None => ChunkKeySeparator::Dot,
            Some(other) => panic!("unsupported test separator '{}'", other),
        }
    }

    /// The `.zarray` as published in the store, attributes included.
    fn metadata(&self) -> ArrayMetadataV2 {
        let compressor = match (&self.compressor_id, self.compression) {
            (Some(id), _) => Some(json!({ "id": id })),
            (None, Compression::Zlib) => Some(json!({ "id": "zlib", "level": 1 })),
            (None, Compression::Blosc) => Some(json!({
                "id": "blosc", "cname": "lz4", "clevel": 5, "shuffle": 1, "blocksize": 0
            })),
            (None, Compression::Raw) => None,
        };
        let compressor: Option<MetadataV2> = compressor
            .map(|c| serde_json::from_value(c).expect("valid compressor metadata"));
        let fill_value: FillValueMetadataV2 =
            serde_json::from_value(self.fill_value.clone()).expect("valid fill value");
        let chunks = ChunkShape::try_from(
            self.chunks.iter().map(|&c| c as u64).collect::<Vec<u64>>(),
        )
        .expect("chunk dimensions must be > 0");

        let mut attrs = self.attrs.clone();
        attrs.insert("_ARRAY_DIMENSIONS".to_string(), json!(self.dimensions));

        ArrayMetadataV2::new(
            self.shape.iter().map(|&n| n as u64).collect(),
            chunks,
            self.dtype.as_str().into(),
            fill_value,
            compressor,
            None,
        )
        .with_dimension_separator(self.separator_char())
        .with_attributes(attrs)
    }

    /// Write this array into a fresh zarrs memory store and return every
    /// object it produced, keyed by store path.
    fn write(&self) -> BTreeMap<String, Vec<u8>> {
        let published = self.metadata();

        // zarrs encodes everything but zlib and unknown compressor ids.
        // Null fill values pad edge chunks with zero.
        let mut staged = published.clone();
        if self.compressor_id.is_some() || self.compression != Compression::Blosc {
            staged.compressor = None;
        }
        if staged.fill_value == FillValueMetadataV2::Null {
            staged.fill_value = FillValueMetadataV2::Number(0.into());
        }

        let store = Arc::new(MemoryStore::new());
        let array = Array::new_with_metadata(
            store.clone(),
            &format!("/{}", self.path),
            ArrayMetadata::V2(staged),
        )
        .expect("valid array metadata");
        array
            .store_metadata_opt(&ArrayMetadataOptions::default().with_include_zarrs_metadata(false))
            .expect("memory store accepts metadata");

        let options = CodecOptionsBuilder::new().store_empty_chunks(true).build();
        let subset = ArraySubset::new_with_shape(array.shape().to_vec());
        macro_rules! store_as {
            ($t:ty) => {{
                let elements: Vec<$t> = self.data.iter().map(|&v| v as $t).collect();
                array.store_array_subset_elements_opt(&subset, &elements, &options)
            }};
        }
        match self.dtype.trim_start_matches(['<', '>', '|', '=']) {
            "f4" => store_as!(f32),
            "f8" => store_as!(f64),
            "i1" => store_as!(i8),
            "i2" => store_as!(i16),
            "i4" => store_as!(i32),
            "i8" => store_as!(i64),
            "u1" => store_as!(u8),
            "u2" => store_as!(u16),
            "u4" => store_as!(u32),
            "u8" => store_as!(u64),
            other => panic!("unsupported test dtype '{}'", other),
        }
        .expect("memory store accepts chunks");

        let zlib_chunks = self.compression == Compression::Zlib && self.compressor_id.is_none();
        let mut objects = BTreeMap::new();
        for key in store.list().expect("memory store lists keys") {
            let bytes = store
                .get(&key)
                .expect("memory store reads keys")
                .map(|b| b.to_vec())
                .unwrap_or_default();
            let key = key.as_str().to_string();
            let bytes = if zlib_chunks && !is_metadata_key(&key) {
                zlib(&bytes)
            } else {
                bytes
            };
            objects.insert(key, bytes);
        }

        let mut zarray = published;
        zarray.attributes = Map::new();
        objects.insert(
            format!("{}/.zarray", self.path),
            serde_json::to_vec(&zarray).expect("array metadata always serializes"),
        );
        objects
    }
}

/// Builder for a consolidated Zarr v2 store.
#[derive(Debug, Default)]
pub struct ZarrStoreBuilder {
    metadata: BTreeMap<String, Value>,
    objects: BTreeMap<String, Vec<u8>>,
    omitted: Vec<String>,
}

impl ZarrStoreBuilder {
    pub fn new() -> Self {
        let mut builder = Self::default();
        builder
            .metadata
            .insert(".zgroup".to_string(), json!({ "zarr_format": 2 }));
        builder
    }

    /// Attributes of the root group.
    pub fn root_attrs(mut self, attrs: Value) -> Self {
        self.metadata.insert(".zattrs".to_string(), attrs);
        self
    }

    /// Declare a sub-group (pyramid level).
    pub fn group(mut self, path: &str) -> Self {
        self.metadata
            .insert(format!("{}/.zgroup", path), json!({ "zarr_format": 2 }));
        self
    }

    /// Write a 1-D `<f8` coordinate array stored in a single raw chunk.
    pub fn coordinate(self, path: &str, values: &[f64], attrs: Value) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path);
        let mut spec = ArraySpec::new(path, &[name], &[values.len()], &[values.len()], values.to_vec())
            .dtype("<f8");
        if let Value::Object(map) = attrs {
            spec.attrs = map;
        }
        self.array(spec)
    }

    /// Write an array: metadata plus every chunk.
    pub fn array(mut self, spec: ArraySpec) -> Self {
        for (key, bytes) in spec.write() {
            if is_metadata_key(&key) {
                let value = serde_json::from_slice(&bytes).expect("zarrs writes JSON metadata");
                self.metadata.insert(key, value);
            } else {
                self.objects.insert(key, bytes);
            }
        }
        self
    }

    /// Replace a stored object verbatim.
    pub fn object(mut self, key: &str, bytes: Vec<u8>) -> Self {
        self.objects.insert(key.to_string(), bytes);
        self
    }

    /// Drop a stored object (simulate a missing chunk).
    pub fn without(mut self, key: &str) -> Self {
        self.omitted.push(key.to_string());
        self
    }

    /// The consolidated `.zmetadata` document.
    pub fn consolidated(&self) -> Value {
        json!({
            "zarr_consolidated_format": 1,
            "metadata": self.metadata,
        })
    }

    /// All objects of the store, metadata included.
    pub fn build(self) -> BTreeMap<String, Vec<u8>> {
        let mut objects = BTreeMap::new();
        objects.insert(".zmetadata".to_string(), to_bytes(&self.consolidated()));
        for (key, value) in &self.metadata {
            objects.insert(key.clone(), to_bytes(value));
        }
        objects.extend(self.objects);
        for key in &self.omitted {
            objects.remove(key);
        }
        objects
    }
}

fn is_metadata_key(key: &str) -> bool {
    key.ends_with(".zarray") || key.ends_with(".zattrs") || key.ends_with(".zgroup")
}

fn zlib(raw: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder
        .write_all(raw)
        .expect("writing to a Vec cannot fail");
    encoder.finish().expect("writing to a Vec cannot fail")
}

fn to_bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).expect("JSON values always serialize")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_partial_chunk_padded_with_fill() {
        let spec = ArraySpec::new("a", &["y", "x"], &[3, 3], &[2, 2], (0..9).map(|v| v as f64).collect())
            .fill_value(json!(-1.0))
            .dtype("<f8");
        let objects = spec.write();
        let chunks: Vec<&String> = objects.keys().filter(|k| !is_metadata_key(k)).collect();
        assert_eq!(chunks.len(), 4);

        let values: Vec<f64> = objects["a/1.1"]
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes(b.try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![8.0, -1.0, -1.0, -1.0]);
    }

    #[test]
    fn test_big_endian_and_published_metadata() {
        let spec = ArraySpec::new("b", &["x"], &[2], &[2], vec![1.0, -2.0])
            .dtype(">i2")
            .compressor_id("lzma");
        let objects = spec.write();

        assert_eq!(objects["b/0"], vec![0x00, 0x01, 0xff, 0xfe]);
        let zarray: Value = serde_json::from_slice(&objects["b/.zarray"]).unwrap();
        assert_eq!(zarray["compressor"]["id"], json!("lzma"));
        assert_eq!(zarray["fill_value"], Value::Null);
        assert!(zarray.get("attributes").is_none());

        let zattrs: Value = serde_json::from_slice(&objects["b/.zattrs"]).unwrap();
        assert_eq!(zattrs["_ARRAY_DIMENSIONS"], json!(["x"]));
    }

    #[test]
    fn test_zlib_chunks_and_separator() {
        let objects = ZarrStoreBuilder::new()
            .array(
                ArraySpec::new("v", &["t", "x"], &[1, 4], &[1, 2], vec![1.0, 2.0, 3.0, 4.0])
                    .compression(Compression::Zlib)
                    .separator("/"),
            )
            .build();

        let mut raw = Vec::new();
        flate2::read::ZlibDecoder::new(objects["v/0/1"].as_slice())
            .read_to_end(&mut raw)
            .unwrap();
        let values: Vec<f32> = raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes(b.try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![3.0, 4.0]);
    }

    #[test]
    fn test_consolidated_covers_metadata_keys() {
        let builder = ZarrStoreBuilder::new()
            .root_attrs(json!({"title": "test"}))
            .coordinate("lat", &[10.0, 20.0], json!({"units": "degrees_north"}));
        let consolidated = builder.consolidated();
        let metadata = consolidated["metadata"].as_object().unwrap();

        assert!(metadata.contains_key(".zgroup"));
        assert!(metadata.contains_key(".zattrs"));
        assert_eq!(metadata["lat/.zattrs"]["_ARRAY_DIMENSIONS"], json!(["lat"]));
        assert_eq!(metadata["lat/.zarray"]["dtype"], json!("<f8"));

        let objects = builder.without("lat/0").build();
        assert!(!objects.contains_key("lat/0"));
        assert!(objects.contains_key("lat/.zarray"));
    }
}
