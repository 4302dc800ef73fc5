//! One shared future per chunk key while a fetch is outstanding.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use metrics::counter;

use crate::error::{EngineError, Result};
use crate::types::Chunk;

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<Chunk>>>>;

/// Registry of outstanding chunk fetches.
///
/// The first request for a key starts the fetch; later requests for the
/// same key await the same future and receive a clone of its result.
#[derive(Clone, Default)]
pub struct InFlight {
    pending: Arc<Mutex<HashMap<String, SharedFetch>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Await the outstanding fetch for `key`, or start one with `start`.
    pub async fn run<F>(&self, key: &str, start: F) -> Result<Arc<Chunk>>
    where
        F: FnOnce() -> BoxFuture<'static, Result<Arc<Chunk>>>,
    {
        let (fetch, leader) = {
            let mut pending = self
                .pending
                .lock()
                .map_err(|_| EngineError::decode("in-flight registry poisoned"))?;

            match pending.get(key) {
                Some(fetch) => {
                    counter!("chunk_fetch_dedup_total").increment(1);
                    tracing::debug!(key = key, "Joining in-flight fetch");
                    (fetch.clone(), false)
                }
                None => {
                    let fetch = start().shared();
                    pending.insert(key.to_string(), fetch.clone());
                    (fetch, true)
                }
            }
        };

        let result = fetch.await;

        if leader {
            if let Ok(mut pending) = self.pending.lock() {
                pending.remove(key);
            }
        }

        result
    }

    /// Number of fetches currently outstanding.
    pub fn len(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for InFlight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlight").field("pending", &self.len()).finish()
    }
}
