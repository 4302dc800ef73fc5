//! Consolidated Zarr v2 metadata parsing.
//!
//! The `.zmetadata` document is a flat, string-keyed map of `.zarray` and
//! `.zattrs` JSON objects. It is parsed once at the dataset boundary into
//! validated [`ArrayMetadata`] records so that missing or malformed
//! attributes surface as configuration errors instead of propagating.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::num::NonZeroU64;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use zarrs::array::codec::{ArrayToBytesCodecTraits, CodecOptions};
use zarrs::array::{
    convert_from_bytes_slice, ArrayBytes, ArrayMetadataV2, ChunkRepresentation, CodecChain,
    DataType,
};
use zarrs::metadata::v2::array::{ArrayMetadataV2Order, FillValueMetadataV2};
use zarrs::metadata::v2_to_v3::array_metadata_v2_to_v3;

use crate::error::{EngineError, Result};

/// Name of the consolidated metadata object at the store root.
pub const CONSOLIDATED_KEY: &str = ".zmetadata";

/// Attribute listing the dimension names of an array.
pub const ARRAY_DIMENSIONS: &str = "_ARRAY_DIMENSIONS";

/// Join a store prefix and a relative path.
pub fn join_path(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Immutable string-keyed metadata tree.
#[derive(Debug, Clone, Default)]
pub struct ConsolidatedMetadata {
    entries: BTreeMap<String, Value>,
}

impl ConsolidatedMetadata {
    /// Parse a `.zmetadata` document.
    ///
    /// Accepts either the consolidated envelope (`{"metadata": {...}}`) or a
    /// bare key map.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Build from an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        let object = match value {
            Value::Object(mut object) => match object.remove("metadata") {
                Some(Value::Object(inner)) => inner,
                Some(_) => {
                    return Err(EngineError::configuration(
                        "consolidated metadata field 'metadata' is not an object",
                    ))
                }
                None => object,
            },
            _ => {
                return Err(EngineError::configuration(
                    "consolidated metadata is not a JSON object",
                ))
            }
        };

        Ok(Self {
            entries: object.into_iter().collect(),
        })
    }

    /// Raw entry by key (e.g. `"tas/.zarray"`).
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// All keys, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Attributes of the node at `path` (`""` for the root group).
    pub fn attrs(&self, path: &str) -> Option<&Map<String, Value>> {
        self.entries
            .get(&join_path(path, ".zattrs"))
            .and_then(Value::as_object)
    }

    /// Check if an array exists at `path`.
    pub fn has_array(&self, path: &str) -> bool {
        self.entries.contains_key(&join_path(path, ".zarray"))
    }

    /// Parse and validate the `.zarray` of the array at `path`.
    pub fn array(&self, path: &str, default_separator: &str) -> Result<ArrayMetadata> {
        let value = self
            .entries
            .get(&join_path(path, ".zarray"))
            .ok_or_else(|| EngineError::configuration(format!("missing array '{}'", path)))?;
        ArrayMetadata::from_value(value, default_separator)
            .map_err(|e| e.with_context(format!("array '{}'", path)))
    }

    /// Paths of all arrays directly below `prefix`.
    pub fn array_paths(&self, prefix: &str) -> Vec<String> {
        let prefix = prefix.trim_end_matches('/');
        self.entries
            .keys()
            .filter_map(|key| key.strip_suffix("/.zarray"))
            .filter(|path| match path.rsplit_once('/') {
                Some((parent, _)) => parent == prefix,
                None => prefix.is_empty(),
            })
            .map(str::to_string)
            .collect()
    }

    /// Dimension names of the array at `path` from `_ARRAY_DIMENSIONS`.
    pub fn dimensions(&self, path: &str) -> Option<Vec<String>> {
        let dims = self.attrs(path)?.get(ARRAY_DIMENSIONS)?.as_array()?;
        dims.iter()
            .map(|d| d.as_str().map(str::to_string))
            .collect()
    }

    /// Level paths of a multiscale pyramid, from the root `multiscales`
    /// attribute. `None` for flat datasets.
    pub fn pyramid_levels(&self) -> Option<Vec<String>> {
        let multiscales = self.attrs("")?.get("multiscales")?.as_array()?;
        let datasets = multiscales.first()?.get("datasets")?.as_array()?;
        let levels: Vec<String> = datasets
            .iter()
            .filter_map(|d| d.get("path").and_then(Value::as_str))
            .map(str::to_string)
            .collect();

        if levels.is_empty() {
            None
        } else {
            Some(levels)
        }
    }
}

/// Validated `.zarray` record.
///
/// The document is parsed into zarrs' v2 metadata types and converted to a
/// v3 codec chain holding just the `bytes` codec, which carries the stored
/// endianness. Decompression stays with the [`CodecRegistry`] so that only
/// registered compressor ids can be opened.
///
/// [`CodecRegistry`]: crate::codec::CodecRegistry
#[derive(Debug, Clone)]
pub struct ArrayMetadata {
    /// Array shape, one entry per dimension.
    pub shape: Vec<usize>,
    /// Chunk shape, one entry per dimension.
    pub chunks: Vec<usize>,
    /// Stored element type.
    pub data_type: DataType,
    /// Compressor id (`None` means raw bytes).
    pub compressor: Option<String>,
    /// Null/fill sentinel. `None` when the array declares no fill value.
    pub fill_value: Option<f64>,
    /// Chunk key separator.
    pub separator: String,
    codecs: Arc<CodecChain>,
    representation: ChunkRepresentation,
}

impl ArrayMetadata {
    /// Parse a `.zarray` JSON value.
    ///
    /// `zarr_format`, `order` and `fill_value` may be omitted and default to
    /// `2`, `"C"` and `null`. An absent `dimension_separator` falls back to
    /// `default_separator`.
    pub fn from_value(value: &Value, default_separator: &str) -> Result<Self> {
        let mut object = value
            .as_object()
            .cloned()
            .ok_or_else(|| EngineError::configuration(".zarray is not a JSON object"))?;
        let explicit_separator = object.contains_key("dimension_separator");
        object.entry("zarr_format").or_insert(json!(2));
        object.entry("order").or_insert(json!("C"));
        object.entry("fill_value").or_insert(Value::Null);

        let v2: ArrayMetadataV2 = serde_json::from_value(Value::Object(object))?;

        if v2.shape.len() != v2.chunks.len() {
            return Err(EngineError::configuration(format!(
                "shape has {} dimensions but chunks has {}",
                v2.shape.len(),
                v2.chunks.len()
            )));
        }

        let chunk_shape: Vec<NonZeroU64> = v2.chunks.iter().copied().collect();

        if v2.order != ArrayMetadataV2Order::C {
            return Err(EngineError::configuration("unsupported memory order 'F'"));
        }

        if v2.filters.as_ref().is_some_and(|filters| !filters.is_empty()) {
            return Err(EngineError::configuration("filters are not supported"));
        }

        // The compressor is applied by the codec registry, so the zarrs chain
        // only needs the array-to-bytes stage. A null fill value still needs
        // a concrete chunk fill for the representation.
        let mut stage = v2.clone();
        stage.compressor = None;
        if stage.fill_value == FillValueMetadataV2::Null {
            stage.fill_value = FillValueMetadataV2::Number(0.into());
        }
        let v3 = array_metadata_v2_to_v3(&stage)
            .map_err(|e| EngineError::configuration(e.to_string()))?;

        let data_type = DataType::from_metadata(&v3.data_type)
            .map_err(|e| EngineError::configuration(e.to_string()))?;
        if !is_numeric(&data_type) {
            return Err(EngineError::configuration(format!(
                "unsupported data type '{}'",
                data_type.name()
            )));
        }

        let chunk_fill = data_type
            .fill_value_from_metadata(&v3.fill_value)
            .map_err(|e| EngineError::configuration(e.to_string()))?;
        let fill_value = match v2.fill_value {
            FillValueMetadataV2::Null => None,
            _ => v3.fill_value.try_as_float::<f64>(),
        };

        let codecs = CodecChain::from_metadata(&v3.codecs)
            .map_err(|e| EngineError::configuration(e.to_string()))?;
        let representation = ChunkRepresentation::new(chunk_shape, data_type.clone(), chunk_fill)
            .map_err(|e| EngineError::configuration(e.to_string()))?;

        let separator = if explicit_separator {
            v2.dimension_separator.to_string()
        } else {
            default_separator.to_string()
        };

        Ok(Self {
            shape: v2.shape.iter().map(|&s| s as usize).collect(),
            chunks: v2.chunks.iter().map(|c| c.get() as usize).collect(),
            data_type,
            compressor: v2.compressor.as_ref().map(|c| c.id().to_string()),
            fill_value,
            separator,
            codecs: Arc::new(codecs),
            representation,
        })
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of chunks along each dimension.
    pub fn chunk_counts(&self) -> Vec<usize> {
        self.shape
            .iter()
            .zip(&self.chunks)
            .map(|(&s, &c)| s.div_ceil(c))
            .collect()
    }

    /// Decode one decompressed chunk into its elements, widened to `f64`.
    ///
    /// The byte length must match the full chunk shape.
    pub fn decode_elements(&self, bytes: Vec<u8>) -> Result<Vec<f64>> {
        let decoded = self
            .codecs
            .decode(Cow::Owned(bytes), &self.representation, &CodecOptions::default())
            .and_then(ArrayBytes::into_fixed)
            .map_err(|e| EngineError::decode(e.to_string()))?;

        macro_rules! widen {
            ($ty:ty) => {
                convert_from_bytes_slice::<$ty>(&decoded)
                    .into_iter()
                    .map(|v| v as f64)
                    .collect()
            };
        }

        let values: Vec<f64> = match self.data_type {
            DataType::Int8 => widen!(i8),
            DataType::Int16 => widen!(i16),
            DataType::Int32 => widen!(i32),
            DataType::Int64 => widen!(i64),
            DataType::UInt8 => widen!(u8),
            DataType::UInt16 => widen!(u16),
            DataType::UInt32 => widen!(u32),
            DataType::UInt64 => widen!(u64),
            DataType::Float32 => widen!(f32),
            DataType::Float64 => convert_from_bytes_slice::<f64>(&decoded),
            ref other => {
                return Err(EngineError::decode(format!(
                    "unsupported data type '{}'",
                    other.name()
                )))
            }
        };
        Ok(values)
    }
}

/// Integer and 32/64-bit float types, the ones widened to `f64`.
fn is_numeric(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ConsolidatedMetadata {
        ConsolidatedMetadata::from_value(json!({
            "zarr_consolidated_format": 1,
            "metadata": {
                ".zattrs": {},
                ".zgroup": {"zarr_format": 2},
                "tas/.zarray": {
                    "shape": [1, 180, 360],
                    "chunks": [1, 45, 90],
                    "dtype": "<f4",
                    "compressor": {"id": "zlib", "level": 1},
                    "fill_value": "NaN",
                    "order": "C",
                    "zarr_format": 2
                },
                "tas/.zattrs": {"_ARRAY_DIMENSIONS": ["time", "lat", "lon"]},
                "lat/.zarray": {
                    "shape": [180], "chunks": [180], "dtype": "<f8",
                    "compressor": null, "fill_value": null, "order": "C"
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_consolidated() {
        let meta = sample();
        assert!(meta.has_array("tas"));
        assert!(!meta.has_array("lon"));
        assert_eq!(
            meta.dimensions("tas"),
            Some(vec!["time".to_string(), "lat".to_string(), "lon".to_string()])
        );
        assert_eq!(meta.array_paths(""), vec!["lat".to_string(), "tas".to_string()]);
        assert!(meta.pyramid_levels().is_none());
    }

    #[test]
    fn test_parse_array_metadata() {
        let meta = sample();
        let tas = meta.array("tas", ".").unwrap();
        assert_eq!(tas.shape, vec![1, 180, 360]);
        assert_eq!(tas.chunks, vec![1, 45, 90]);
        assert_eq!(tas.chunk_counts(), vec![1, 4, 4]);
        assert_eq!(tas.compressor.as_deref(), Some("zlib"));
        assert!(tas.fill_value.unwrap().is_nan());
        assert_eq!(tas.separator, ".");

        let lat = meta.array("lat", ".").unwrap();
        assert!(lat.compressor.is_none());
        assert!(lat.fill_value.is_none());
    }

    #[test]
    fn test_missing_array_is_configuration_error() {
        let err = sample().array("pr", ".").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_fortran_order_rejected() {
        let value = json!({
            "shape": [4], "chunks": [2], "dtype": "<f4", "order": "F", "fill_value": 0
        });
        assert!(ArrayMetadata::from_value(&value, ".").is_err());
    }

    fn array(dtype: &str, fill_value: Value) -> Result<ArrayMetadata> {
        ArrayMetadata::from_value(
            &json!({"shape": [2], "chunks": [2], "dtype": dtype, "fill_value": fill_value}),
            ".",
        )
    }

    #[test]
    fn test_data_types_through_zarrs() {
        assert_eq!(array("<f4", json!(0)).unwrap().data_type, DataType::Float32);
        assert_eq!(array(">i2", json!(0)).unwrap().data_type, DataType::Int16);
        assert_eq!(array("|u1", json!(null)).unwrap().data_type, DataType::UInt8);

        for unsupported in ["<c8", "|b1", "<f2", "<M8[s]"] {
            let err = array(unsupported, json!(null)).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::Configuration, "{}", unsupported);
        }
    }

    #[test]
    fn test_decode_elements_respects_endianness() {
        let bytes: Vec<u8> = [1.5f32, -2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        let values = array("<f4", json!("NaN")).unwrap().decode_elements(bytes).unwrap();
        assert_eq!(values, vec![1.5, -2.0]);

        let bytes: Vec<u8> = [300i16, -7].iter().flat_map(|v| v.to_be_bytes()).collect();
        let values = array(">i2", json!(-1)).unwrap().decode_elements(bytes).unwrap();
        assert_eq!(values, vec![300.0, -7.0]);

        let err = array("<f8", json!(null)).unwrap().decode_elements(vec![0u8; 5]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Decode);
    }

    #[test]
    fn test_fill_values() {
        assert_eq!(array("<i2", json!(-9999)).unwrap().fill_value, Some(-9999.0));
        assert_eq!(array("<f8", json!("-Infinity")).unwrap().fill_value, Some(f64::NEG_INFINITY));
        assert!(array("<f4", json!(null)).unwrap().fill_value.is_none());
    }

    #[test]
    fn test_explicit_separator_wins() {
        let value = json!({
            "shape": [4, 4], "chunks": [2, 2], "dtype": "<f4",
            "fill_value": null, "dimension_separator": "."
        });
        assert_eq!(ArrayMetadata::from_value(&value, "/").unwrap().separator, ".");
    }

    #[test]
    fn test_pyramid_levels() {
        let meta = ConsolidatedMetadata::from_value(json!({
            ".zattrs": {"multiscales": [{"datasets": [{"path": "0"}, {"path": "1"}]}]},
            "0/tas/.zarray": {"shape": [256, 256], "chunks": [128, 128], "dtype": "<f4", "fill_value": null}
        }))
        .unwrap();

        assert_eq!(
            meta.pyramid_levels(),
            Some(vec!["0".to_string(), "1".to_string()])
        );
        assert_eq!(meta.array_paths("0"), vec!["0/tas".to_string()]);
        assert_eq!(meta.array("0/tas", "/").unwrap().separator, "/");
    }
}
