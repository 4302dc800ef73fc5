//! One resolution of a dataset.
//!
//! A [`Level`] owns the parsed array handles found under its prefix. The
//! variable-specific part ([`LevelVariable`]: descriptor, codec, chunk
//! cache and in-flight fetches) is rebuilt from scratch on every variable
//! switch. Dataset-wide collaborators are passed in through
//! [`LevelContext`] rather than stored.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture, FutureExt};
use metrics::counter;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::aggregate::{get_clim, WindowAggregate};
use crate::axis::{AxisRoles, CfAxis};
use crate::cache::{ChunkCache, InFlight, SharedChunkCache};
use crate::codec::{ChunkCodec, CodecRegistry};
use crate::config::EngineConfig;
use crate::decoder::{decode_chunk, ClimOptions};
use crate::error::{EngineError, Result};
use crate::keys::decode_variable_key;
use crate::metadata::{join_path, ArrayMetadata, ConsolidatedMetadata};
use crate::store::ChunkStore;
use crate::types::{CacheStats, Chunk};
use crate::variable::{
    is_geographic, is_metric, mercator_latitudes, mercator_longitudes,
    mercator_metres_to_degrees, SpatialAxis, VariableDescriptor,
};

/// Dataset-wide collaborators a level operation needs.
#[derive(Clone, Copy)]
pub struct LevelContext<'a> {
    pub store: &'a Arc<dyn ChunkStore>,
    pub metadata: &'a ConsolidatedMetadata,
    pub config: &'a EngineConfig,
    pub codecs: &'a CodecRegistry,
    pub pyramid: bool,
}

/// Array handles of one resolution.
#[derive(Debug)]
pub struct Level {
    /// Pyramid level path, `None` for flat datasets.
    pub level_id: Option<String>,
    prefix: String,
    arrays: BTreeMap<String, Result<ArrayMetadata>>,
}

impl Level {
    /// Parse every array under the level's prefix.
    ///
    /// Arrays that fail to parse are kept as errors and only reported when
    /// something asks for them.
    pub fn open(level_id: Option<String>, metadata: &ConsolidatedMetadata) -> Self {
        let prefix = level_id.clone().unwrap_or_default();
        let default_separator = if level_id.is_some() { "/" } else { "." };

        let arrays = metadata
            .array_paths(&prefix)
            .into_iter()
            .map(|path| {
                let parsed = metadata.array(&path, default_separator);
                let name = path.rsplit('/').next().unwrap_or(&path).to_string();
                (name, parsed)
            })
            .collect();

        Self {
            level_id,
            prefix,
            arrays,
        }
    }

    /// Store path of an array at this level.
    pub fn path(&self, name: &str) -> String {
        join_path(&self.prefix, name)
    }

    /// Parsed `.zarray` of an array at this level.
    pub fn array(&self, name: &str) -> Result<&ArrayMetadata> {
        match self.arrays.get(name) {
            Some(Ok(array)) => Ok(array),
            Some(Err(e)) => Err(e.clone()),
            None => Err(EngineError::configuration(format!(
                "missing array '{}'",
                self.path(name)
            ))),
        }
    }

    /// Names of the arrays at this level.
    pub fn array_names(&self) -> impl Iterator<Item = &str> {
        self.arrays.keys().map(String::as_str)
    }

    /// Build the variable state for `name` at this level.
    pub async fn initialize_variable(
        &self,
        ctx: LevelContext<'_>,
        name: &str,
        roles: &AxisRoles,
    ) -> Result<LevelVariable> {
        let path = self.path(name);
        let array = self.array(name)?.clone();

        let dimensions = ctx.metadata.dimensions(&path).ok_or_else(|| {
            EngineError::configuration(format!("array '{}' has no _ARRAY_DIMENSIONS", path))
        })?;

        let codec = ctx.codecs.resolve(array.compressor.as_deref())?;

        let x = self
            .spatial_axis(ctx, &dimensions, &array.shape, &roles.x, CfAxis::X)
            .await?;
        let y = self
            .spatial_axis(ctx, &dimensions, &array.shape, &roles.y, CfAxis::Y)
            .await?;

        let descriptor =
            VariableDescriptor::new(name, path, dimensions, &array, roles.clone(), x, y)?;

        info!(
            variable = name,
            level = ?self.level_id,
            shape = ?descriptor.shape,
            chunks = ?descriptor.chunk_counts(),
            compressor = ?descriptor.array.compressor,
            "Initialized variable"
        );

        Ok(LevelVariable {
            descriptor: Arc::new(descriptor),
            codec,
            cache: Arc::new(RwLock::new(ChunkCache::new())),
            in_flight: InFlight::new(),
        })
    }

    async fn spatial_axis(
        &self,
        ctx: LevelContext<'_>,
        dimensions: &[String],
        shape: &[usize],
        dim: &str,
        role: CfAxis,
    ) -> Result<SpatialAxis> {
        let index = dimensions.iter().position(|d| d == dim).ok_or_else(|| {
            EngineError::configuration(format!("dimension '{}' is not a dimension of the array", dim))
        })?;

        let tolerance = ctx.config.spacing_tolerance;
        let n = shape.get(index).copied().unwrap_or_default();
        // Pyramid levels without usable coordinates are global web-mercator tiles.
        let tiled = || match role {
            CfAxis::X => mercator_longitudes(n),
            _ => mercator_latitudes(n),
        };

        if !self.arrays.contains_key(dim) {
            if !ctx.pyramid {
                return Err(EngineError::configuration(format!(
                    "missing coordinate array for dimension '{}'",
                    dim
                )));
            }
            return SpatialAxis::new(dim, index, role, tiled(), tolerance);
        }

        let path = self.path(dim);
        let attrs = ctx.metadata.attrs(&path);
        let geographic = is_geographic(dim, attrs);

        if ctx.pyramid && !geographic && !is_metric(attrs) {
            warn!(
                dimension = dim,
                level = ?self.level_id,
                "Pyramid coordinates are neither degrees nor metres, using web-mercator tiling"
            );
            return SpatialAxis::new(dim, index, role, tiled(), tolerance);
        }

        let mut values = load_coordinate(ctx, &path, self.array(dim)?).await?;
        if ctx.pyramid && !geographic {
            debug!(dimension = dim, level = ?self.level_id, "Inverse-projecting web-mercator metres");
            values = mercator_metres_to_degrees(&values, role);
        }

        let axis = SpatialAxis::new(dim, index, role, values, tolerance)?;

        if !ctx.pyramid {
            axis.validate_spacing()?;
        }

        if geographic || ctx.pyramid {
            axis.validate_range(role)?;
        }

        Ok(axis)
    }
}

/// Fetch and decode a whole 1-D coordinate array.
pub async fn load_coordinate(
    ctx: LevelContext<'_>,
    path: &str,
    array: &ArrayMetadata,
) -> Result<Vec<f64>> {
    if array.ndim() != 1 {
        return Err(EngineError::configuration(format!(
            "coordinate array '{}' is not one-dimensional",
            path
        )));
    }

    let codec = ctx.codecs.resolve(array.compressor.as_deref())?;
    let (n, len) = (array.shape[0], array.chunks[0]);
    let count = array.chunk_counts()[0];

    let requests = (0..count).map(|i| {
        let key = join_path(path, &i.to_string());
        async move {
            ctx.store
                .get(&key)
                .await
                .map_err(|e| e.with_context(format!("coordinate chunk '{}'", key)))
        }
    });
    let raw_chunks = try_join_all(requests).await?;

    let mut values = Vec::with_capacity(n);
    for raw in raw_chunks {
        let bytes = match &codec {
            Some(codec) => codec.decode(&raw)?,
            None => raw.to_vec(),
        };
        let decoded = array.decode_elements(bytes)?;
        let take = len.min(n - values.len()).min(decoded.len());
        values.extend_from_slice(&decoded[..take]);
    }

    if values.len() != n {
        return Err(EngineError::decode(format!(
            "coordinate array '{}' decoded to {} values, expected {}",
            path,
            values.len(),
            n
        )));
    }

    debug!(path = path, values = n, "Loaded coordinate array");
    Ok(values)
}

/// Variable-specific state of a level.
pub struct LevelVariable {
    pub descriptor: Arc<VariableDescriptor>,
    codec: Option<Arc<dyn ChunkCodec>>,
    cache: SharedChunkCache,
    in_flight: InFlight,
}

impl LevelVariable {
    /// Make `keys` resident and aggregate them.
    pub async fn fetch_window(
        &self,
        keys: &[String],
        store: &Arc<dyn ChunkStore>,
        config: &EngineConfig,
    ) -> Result<WindowAggregate> {
        let options = ClimOptions::from(config);
        let dedupe = config.dedupe_in_flight;

        get_clim(keys, &self.cache, |key| {
            self.load_chunk(key, Arc::clone(store), options, dedupe)
        })
        .await
        .map_err(|e| e.with_context(format!("variable '{}'", self.descriptor.name)))
    }

    /// Fetch and decode one chunk, sharing an outstanding fetch if allowed.
    fn load_chunk(
        &self,
        key: String,
        store: Arc<dyn ChunkStore>,
        options: ClimOptions,
        dedupe: bool,
    ) -> BoxFuture<'static, Result<Arc<Chunk>>> {
        let descriptor = Arc::clone(&self.descriptor);
        let codec = self.codec.clone();
        let cache = Arc::clone(&self.cache);
        let in_flight = self.in_flight.clone();

        let fetch_key = key.clone();
        let start = move || -> BoxFuture<'static, Result<Arc<Chunk>>> {
            fetch_chunk(store, descriptor, codec, cache, fetch_key, options).boxed()
        };

        async move {
            if dedupe {
                in_flight.run(&key, start).await
            } else {
                start().await
            }
        }
        .boxed()
    }

    /// Cached chunk, if resident.
    pub async fn cached(&self, key: &str) -> Option<Arc<Chunk>> {
        self.cache.read().await.peek(key)
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.read().await.stats()
    }
}

impl std::fmt::Debug for LevelVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelVariable")
            .field("variable", &self.descriptor.name)
            .field("codec", &self.codec.as_ref().map(|c| c.id().to_string()))
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

/// Fetch, decode and cache one chunk.
///
/// The chunk is cached before the future resolves, so it is resident by the
/// time the in-flight entry for `key` is released. A fetch that starts after
/// an earlier one finished returns the resident chunk.
async fn fetch_chunk(
    store: Arc<dyn ChunkStore>,
    descriptor: Arc<VariableDescriptor>,
    codec: Option<Arc<dyn ChunkCodec>>,
    cache: SharedChunkCache,
    key: String,
    options: ClimOptions,
) -> Result<Arc<Chunk>> {
    if let Some(chunk) = cache.read().await.peek(&key) {
        return Ok(chunk);
    }

    let context = || format!("chunk '{}'", key);

    let indices = decode_variable_key(&key, &descriptor).map_err(|e| e.with_context(context()))?;
    let object = join_path(&descriptor.path, &key);

    counter!("chunk_fetches_total").increment(1);
    debug!(key = %key, object = %object, "Fetching chunk");

    let raw = store
        .get(&object)
        .await
        .map_err(|e| e.with_context(context()))?;

    let chunk = decode_chunk(&raw, &indices, &descriptor, codec.as_deref(), options)
        .map_err(|e| e.with_context(context()))?;

    if crate::types::is_empty_clim(&chunk.clim) {
        warn!(key = %key, variable = %descriptor.name, "Chunk holds no valid samples");
    }

    let chunk = Arc::new(chunk);
    cache.write().await.put(key, Arc::clone(&chunk));
    Ok(chunk)
}
