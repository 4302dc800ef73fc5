use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::ChunkStore;
use crate::error::{EngineError, Result};

/// In-memory store. Missing keys answer like an HTTP 404.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: BTreeMap<String, Bytes>,
    latency: BTreeMap<String, Duration>,
    requests: AtomicU64,
    log: std::sync::Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from key/bytes pairs.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bytes>,
    {
        Self {
            objects: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            ..Self::default()
        }
    }

    /// Insert or replace an object.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Bytes>) {
        self.objects.insert(key.into(), value.into());
    }

    /// Delay every answer for `key` by `latency`.
    pub fn with_latency(mut self, key: impl Into<String>, latency: Duration) -> Self {
        self.latency.insert(key.into(), latency);
        self
    }

    /// Number of `get` calls served so far.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Number of `get` calls for one key.
    pub fn requests_for(&self, key: &str) -> usize {
        self.log
            .lock()
            .map(|log| log.iter().filter(|k| k.as_str() == key).count())
            .unwrap_or(0)
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Bytes> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut log) = self.log.lock() {
            log.push(key.to_string());
        }

        // Yield so concurrent requests interleave like real I/O.
        match self.latency.get(key) {
            Some(latency) => tokio::time::sleep(*latency).await,
            None => tokio::task::yield_now().await,
        }

        self.objects
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::http_status(404, &format!("memory://{}", key)))
    }

    fn location(&self) -> &str {
        "memory://"
    }
}
