//! Keyed byte stores holding a Zarr hierarchy.

mod http;
mod memory;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{EngineError, Result};
use crate::metadata::{ConsolidatedMetadata, CONSOLIDATED_KEY};

pub use http::HttpStore;
pub use memory::MemoryStore;

/// Read access to objects of a Zarr store, addressed by store-relative key
/// (e.g. `"air/0.2.2"` or `".zmetadata"`).
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Fetch one object.
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Location of the store, for logs and error context.
    fn location(&self) -> &str;

    /// Fetch and parse the consolidated metadata.
    async fn consolidated_metadata(&self) -> Result<ConsolidatedMetadata> {
        let bytes = self.get(CONSOLIDATED_KEY).await?;
        ConsolidatedMetadata::from_json(&bytes)
    }
}

/// Rewrite a dataset URL to its HTTPS equivalent.
///
/// `s3://bucket/key` and `gs://bucket/key` map onto the public endpoints
/// of the respective object stores. Any scheme other than these and
/// `http(s)://` is rejected.
pub fn normalize_url(url: &str) -> Result<String> {
    let url = url.trim().trim_end_matches('/');

    if url.starts_with("https://") || url.starts_with("http://") {
        return Ok(url.to_string());
    }

    if let Some(rest) = url.strip_prefix("s3://") {
        let (bucket, key) = split_bucket(rest, url)?;
        return Ok(match key {
            Some(key) => format!("https://{}.s3.amazonaws.com/{}", bucket, key),
            None => format!("https://{}.s3.amazonaws.com", bucket),
        });
    }

    if let Some(rest) = url.strip_prefix("gs://") {
        let (bucket, key) = split_bucket(rest, url)?;
        return Ok(match key {
            Some(key) => format!("https://storage.googleapis.com/{}/{}", bucket, key),
            None => format!("https://storage.googleapis.com/{}", bucket),
        });
    }

    Err(EngineError::configuration(format!(
        "unsupported URL scheme: '{}' (expected https, http, s3 or gs)",
        url
    )))
}

fn split_bucket<'a>(rest: &'a str, url: &str) -> Result<(&'a str, Option<&'a str>)> {
    let (bucket, key) = match rest.split_once('/') {
        Some((bucket, key)) => (bucket, Some(key).filter(|k| !k.is_empty())),
        None => (rest, None),
    };

    if bucket.is_empty() {
        return Err(EngineError::configuration(format!("missing bucket in '{}'", url)));
    }
    Ok((bucket, key))
}
