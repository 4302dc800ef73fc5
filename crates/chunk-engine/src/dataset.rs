//! Root orchestrator: metadata, levels, the selected variable and the
//! active chunk window.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::try_join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::axis::{infer_axes, AxisMap};
use crate::codec::CodecRegistry;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::{DatasetEvent, EVENT_CHANNEL_CAPACITY};
use crate::keys::{active_window, center_chunk_key, encode_key, point_to_chunk_key};
use crate::level::{load_coordinate, Level, LevelContext, LevelVariable};
use crate::metadata::ConsolidatedMetadata;
use crate::selector::{self, Selector, SelectorMetadata};
use crate::store::{ChunkStore, HttpStore};
use crate::types::{is_empty_clim, CacheStats, Chunk, ChunkBounds, Clim, DEFAULT_CLIM};
use crate::variable::VariableDescriptor;

/// Everything the rendering layer needs for the current window.
#[derive(Debug, Clone, Serialize)]
pub struct WindowSnapshot {
    /// Level the window was loaded from.
    pub level: usize,
    pub active_chunk_keys: Vec<String>,
    /// Aggregate range; `[0, 0]` when the window holds no valid sample.
    pub clim: Clim,
    pub bounds: ChunkBounds,
    #[serde(skip)]
    pub chunks: BTreeMap<String, Arc<Chunk>>,
    pub selectors: Vec<Selector>,
}

/// State that exists only while a variable is selected.
#[derive(Debug)]
struct Selection {
    variable: String,
    /// One entry per level, aligned with `Dataset::levels`.
    level_states: Vec<LevelVariable>,
    selectors: Vec<Selector>,
    center: Option<[f64; 2]>,
    active_chunk_keys: Vec<String>,
}

/// A chunked dataset opened for interactive exploration.
pub struct Dataset {
    url: String,
    store: Arc<dyn ChunkStore>,
    config: EngineConfig,
    codecs: CodecRegistry,
    metadata: ConsolidatedMetadata,
    pyramid: bool,
    axes: AxisMap,
    levels: Vec<Level>,
    current_level: usize,
    selection: Option<Selection>,
    events: broadcast::Sender<DatasetEvent>,
}

impl Dataset {
    /// Open a dataset served over HTTP(S), S3 or GCS.
    pub async fn initialize(url: &str, config: EngineConfig) -> Result<Self> {
        config.validate().map_err(EngineError::configuration)?;

        let mut store = HttpStore::new(url, config.request_timeout_secs)?;
        if let Some(proxy) = &config.metadata_proxy_url {
            store = store.with_metadata_proxy(proxy.as_str());
        }

        Self::from_store(Arc::new(store), config).await
    }

    /// Open a dataset from any store.
    pub async fn from_store(store: Arc<dyn ChunkStore>, config: EngineConfig) -> Result<Self> {
        config.validate().map_err(EngineError::configuration)?;

        let url = store.location().to_string();
        let metadata = store
            .consolidated_metadata()
            .await
            .map_err(|e| e.with_context(format!("dataset '{}'", url)))?;

        let (pyramid, levels) = match metadata.pyramid_levels() {
            Some(ids) => (
                true,
                ids.into_iter()
                    .map(|id| Level::open(Some(id), &metadata))
                    .collect::<Vec<_>>(),
            ),
            None => (false, vec![Level::open(None, &metadata)]),
        };

        let prefix = levels[0].level_id.clone().unwrap_or_default();
        let axes = infer_axes(&metadata, &prefix, pyramid);

        info!(
            url = %url,
            pyramid = pyramid,
            levels = levels.len(),
            variables = ?axes.keys().collect::<Vec<_>>(),
            "Loaded dataset"
        );

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            url,
            store,
            config,
            codecs: CodecRegistry::default(),
            metadata,
            pyramid,
            axes,
            levels,
            current_level: 0,
            selection: None,
            events,
        })
    }

    /// Replace the codec registry used for subsequently selected variables.
    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metadata(&self) -> &ConsolidatedMetadata {
        &self.metadata
    }

    pub fn is_pyramid(&self) -> bool {
        self.pyramid
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn current_level(&self) -> usize {
        self.current_level
    }

    /// Axis roles of every viewable variable.
    pub fn axes(&self) -> &AxisMap {
        &self.axes
    }

    /// Names of the variables with resolvable X/Y axes.
    pub fn variables(&self) -> Vec<&str> {
        self.axes.keys().map(String::as_str).collect()
    }

    /// Name of the selected variable.
    pub fn selected_variable(&self) -> Option<&str> {
        self.selection.as_ref().map(|s| s.variable.as_str())
    }

    /// Level to display at a map zoom.
    pub fn level_for_zoom(&self, zoom: f64) -> usize {
        if !self.pyramid {
            return 0;
        }
        let level = zoom.floor().max(0.0) as usize;
        level.min(self.levels.len() - 1)
    }

    /// Subscribe to dataset events.
    pub fn subscribe(&self) -> broadcast::Receiver<DatasetEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: DatasetEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    fn context(&self) -> LevelContext<'_> {
        LevelContext {
            store: &self.store,
            metadata: &self.metadata,
            config: &self.config,
            codecs: &self.codecs,
            pyramid: self.pyramid,
        }
    }

    fn selection(&self) -> Result<&Selection> {
        self.selection
            .as_ref()
            .ok_or_else(|| EngineError::uninitialized("no variable selected"))
    }

    fn selection_mut(&mut self) -> Result<&mut Selection> {
        self.selection
            .as_mut()
            .ok_or_else(|| EngineError::uninitialized("no variable selected"))
    }

    /// Select a variable, rebuilding every level's state for it.
    ///
    /// On failure no variable is selected.
    pub async fn select_variable(&mut self, name: &str) -> Result<()> {
        self.selection = None;

        let roles = self.axes.get(name).cloned().ok_or_else(|| {
            EngineError::configuration(format!(
                "variable '{}' is not viewable (no resolvable X/Y axes)",
                name
            ))
        })?;

        let ctx = self.context();
        let roles = &roles;
        let states = try_join_all(self.levels.iter().enumerate().map(|(i, level)| async move {
            level
                .initialize_variable(ctx, name, roles)
                .await
                .map_err(|e| e.with_context(format!("level {}", i)))
        }))
        .await
        .map_err(|e| e.with_context(format!("variable '{}'", name)))?;

        let selectors = self
            .build_selectors(&states[0].descriptor)
            .await
            .map_err(|e| e.with_context(format!("variable '{}'", name)))?;

        self.current_level = self.current_level.min(self.levels.len() - 1);
        self.selection = Some(Selection {
            variable: name.to_string(),
            level_states: states,
            selectors,
            center: None,
            active_chunk_keys: Vec::new(),
        });

        self.emit(DatasetEvent::VariableSelected {
            variable: name.to_string(),
            levels: self.levels.len(),
        });

        self.refresh_window()
    }

    async fn build_selectors(&self, descriptor: &VariableDescriptor) -> Result<Vec<Selector>> {
        let ctx = self.context();
        let level = &self.levels[0];
        let mut selectors = Vec::with_capacity(descriptor.ndim());

        for (i, dim) in descriptor.dimensions.iter().enumerate() {
            if i == descriptor.x.index || i == descriptor.y.index {
                let axis = descriptor.roles.role_of(dim).ok_or_else(|| {
                    EngineError::configuration(format!("dimension '{}' has no axis role", dim))
                })?;
                selectors.push(Selector::spatial(dim.as_str(), i, axis));
                continue;
            }

            let path = level.path(dim);
            let attrs = self.metadata.attrs(&path);
            let text = |key: &str| {
                attrs
                    .and_then(|a| a.get(key))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };

            let array = match level.array(dim) {
                Ok(array) => match load_coordinate(ctx, &path, array).await {
                    Ok(values) => Some(Arc::new(values)),
                    Err(e) => {
                        warn!(dimension = %dim, error = %e, "Coordinate values unavailable");
                        None
                    }
                },
                Err(_) => None,
            };

            selectors.push(Selector::new(
                dim.as_str(),
                SelectorMetadata {
                    array,
                    dimension_index: i,
                    cf_axis: descriptor.roles.role_of(dim),
                    units: text("units"),
                    calendar: text("calendar"),
                },
            ));
        }

        Ok(selectors)
    }

    /// Recompute the active window from the stored center and selectors.
    fn refresh_window(&mut self) -> Result<()> {
        let offsets = self.config.window_offsets();
        let level = self.current_level;
        let selection = self.selection_mut()?;
        let descriptor = Arc::clone(&selection.level_states[level].descriptor);

        let key = match selection.center {
            Some(center) => point_to_chunk_key(center, &selection.selectors, &descriptor)
                .ok_or_else(|| {
                    EngineError::configuration(format!(
                        "point {:?} maps outside the chunk grid of '{}'",
                        center, descriptor.name
                    ))
                })?,
            None => center_chunk_key(&selection.selectors, &descriptor),
        };

        selection.active_chunk_keys = active_window(&key, &descriptor, &offsets);
        let active_chunk_keys = selection.active_chunk_keys.clone();

        debug!(
            variable = %descriptor.name,
            level = level,
            center_key = %key,
            chunks = ?active_chunk_keys,
            "Active window changed"
        );

        self.emit(DatasetEvent::SelectionChanged {
            level,
            active_chunk_keys,
        });
        Ok(())
    }

    /// Move the cursor: pick the level for `zoom` and the window around
    /// `center` (`[lon, lat]`).
    pub async fn update_selection(&mut self, center: [f64; 2], zoom: f64) -> Result<Vec<String>> {
        if !center[0].is_finite() || !center[1].is_finite() {
            return Err(EngineError::configuration(format!(
                "invalid center {:?}",
                center
            )));
        }

        let level = self.level_for_zoom(zoom);
        self.selection_mut()?.center = Some(center);
        self.current_level = level;
        self.refresh_window()?;
        self.active_chunk_keys().map(<[String]>::to_vec)
    }

    /// Point a non-spatial selector at an absolute index.
    pub fn set_selector_index(&mut self, dimension: &str, index: usize) -> Result<()> {
        let level = self.current_level;
        let selection = self.selection_mut()?;
        let position = selector_position(&selection.selectors, dimension)?;
        let descriptor = &selection.level_states[level].descriptor;

        let updated = selector::select_index(&selection.selectors[position], descriptor, index)?;
        selection.selectors[position] = updated;
        self.refresh_window()
    }

    /// Step a selector forward one slice, wrapping at the end.
    pub fn advance_selector(&mut self, dimension: &str) -> Result<Selector> {
        let level = self.current_level;
        let selection = self.selection_mut()?;
        let position = selector_position(&selection.selectors, dimension)?;
        let descriptor = &selection.level_states[level].descriptor;

        let updated = selector::advance_selector(&selection.selectors[position], descriptor);
        selection.selectors[position] = updated.clone();
        self.refresh_window()?;
        Ok(updated)
    }

    /// Load the active window and aggregate it.
    pub async fn fetch_window(&self) -> Result<WindowSnapshot> {
        let selection = self.selection()?;
        let level = self.current_level;
        let state = &selection.level_states[level];

        let aggregate = state
            .fetch_window(&selection.active_chunk_keys, &self.store, &self.config)
            .await
            .map_err(|e| e.with_context(format!("level {}", level)))?;

        let clim = if is_empty_clim(&aggregate.clim) {
            warn!(
                variable = %selection.variable,
                chunks = ?selection.active_chunk_keys,
                "Window holds no valid samples, using default clim"
            );
            DEFAULT_CLIM
        } else {
            aggregate.clim
        };

        self.emit(DatasetEvent::WindowLoaded {
            clim,
            bounds: aggregate.bounds,
            chunks: aggregate.chunks.len(),
        });

        Ok(WindowSnapshot {
            level,
            active_chunk_keys: selection.active_chunk_keys.clone(),
            clim,
            bounds: aggregate.bounds,
            chunks: aggregate.chunks,
            selectors: selection.selectors.clone(),
        })
    }

    /// Key of the chunk under `[lon, lat]` for the current selectors.
    pub fn chunk_for_point(&self, point: [f64; 2]) -> Result<String> {
        let selection = self.selection()?;
        let descriptor = &selection.level_states[self.current_level].descriptor;
        point_to_chunk_key(point, &selection.selectors, descriptor).ok_or_else(|| {
            EngineError::configuration(format!(
                "point {:?} maps outside the chunk grid of '{}'",
                point, descriptor.name
            ))
        })
    }

    /// Data value at `[lon, lat]` for the current selectors.
    ///
    /// `None` outside the variable's extent and for fill or NaN samples.
    pub async fn value_at(&self, point: [f64; 2]) -> Result<Option<f32>> {
        let selection = self.selection()?;
        let state = &selection.level_states[self.current_level];
        let descriptor = &state.descriptor;
        let (x, y) = (&descriptor.x, &descriptor.y);

        let [lon, lat] = point;
        let Some(lon) = [lon, lon - 360.0, lon + 360.0]
            .into_iter()
            .find(|&v| x.contains(v))
        else {
            return Ok(None);
        };
        if !y.contains(lat) {
            return Ok(None);
        }

        let mut chunk_indices = Vec::with_capacity(descriptor.ndim());
        let mut local = Vec::with_capacity(descriptor.ndim());

        for dim in 0..descriptor.ndim() {
            let len = descriptor.chunk_shape[dim];
            let (cell, reversed) = if dim == x.index {
                (x.cell_index(lon), x.reversed)
            } else if dim == y.index {
                (y.cell_index(lat), y.reversed)
            } else {
                let cell = selection
                    .selectors
                    .iter()
                    .find(|s| s.metadata.dimension_index == dim)
                    .and_then(|s| s.absolute_index(descriptor))
                    .ok_or_else(|| {
                        EngineError::uninitialized(format!(
                            "no selector for dimension '{}'",
                            descriptor.dimensions[dim]
                        ))
                    })?;
                (cell, false)
            };

            let chunk = cell / len;
            let mut offset = cell % len;
            if reversed {
                offset = descriptor.valid_len(dim, chunk) - 1 - offset;
            }
            chunk_indices.push(chunk);
            local.push(offset);
        }

        let key = encode_key(&chunk_indices, &descriptor.separator);
        let aggregate = state
            .fetch_window(std::slice::from_ref(&key), &self.store, &self.config)
            .await?;

        let fill = descriptor.fill_value.map(|f| f as f32);
        Ok(aggregate
            .chunks
            .get(&key)
            .and_then(|chunk| chunk.get(&local))
            .filter(|&v| !v.is_nan() && Some(v) != fill))
    }

    /// Current selectors.
    pub fn selectors(&self) -> Result<&[Selector]> {
        Ok(&self.selection()?.selectors)
    }

    /// Keys of the active window.
    pub fn active_chunk_keys(&self) -> Result<&[String]> {
        Ok(&self.selection()?.active_chunk_keys)
    }

    /// Descriptor of the selected variable at the current level.
    pub fn variable(&self) -> Result<&VariableDescriptor> {
        let selection = self.selection()?;
        Ok(&selection.level_states[self.current_level].descriptor)
    }

    /// Display label of a selector's position.
    pub fn selector_label(&self, dimension: &str) -> Result<Option<String>> {
        let selection = self.selection()?;
        let position = selector_position(&selection.selectors, dimension)?;
        let descriptor = &selection.level_states[self.current_level].descriptor;
        Ok(selector::selector_label(&selection.selectors[position], descriptor))
    }

    /// Resident chunk of the current level, without fetching it.
    pub async fn cached_chunk(&self, key: &str) -> Result<Option<Arc<Chunk>>> {
        let selection = self.selection()?;
        Ok(selection.level_states[self.current_level].cached(key).await)
    }

    /// Cache statistics of the current level.
    pub async fn cache_stats(&self) -> Result<CacheStats> {
        let selection = self.selection()?;
        Ok(selection.level_states[self.current_level].cache_stats().await)
    }
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("url", &self.url)
            .field("pyramid", &self.pyramid)
            .field("levels", &self.levels.len())
            .field("current_level", &self.current_level)
            .field("variable", &self.selected_variable())
            .finish()
    }
}

fn selector_position(selectors: &[Selector], dimension: &str) -> Result<usize> {
    selectors
        .iter()
        .position(|s| s.name == dimension)
        .ok_or_else(|| EngineError::configuration(format!("unknown dimension '{}'", dimension)))
}
