use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::{debug, instrument};

use super::{normalize_url, ChunkStore};
use crate::error::{EngineError, Result};
use crate::metadata::ConsolidatedMetadata;

/// Store served over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base_url: String,
    metadata_proxy: Option<String>,
}

impl HttpStore {
    /// Open a store at `url` (any scheme accepted by [`normalize_url`]).
    pub fn new(url: &str, timeout_secs: u64) -> Result<Self> {
        let base_url = normalize_url(url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| EngineError::configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            metadata_proxy: None,
        })
    }

    /// Route the consolidated metadata request through a proxy
    /// (`<proxy>/api/metadata?path=<url>`).
    pub fn with_metadata_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.metadata_proxy = Some(proxy.into().trim_end_matches('/').to_string());
        self
    }

    async fn fetch(&self, request: reqwest::RequestBuilder, url: &str) -> Result<Bytes> {
        let response = request
            .send()
            .await
            .map_err(|e| EngineError::transport(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::http_status(status.as_u16(), url));
        }

        response
            .bytes()
            .await
            .map_err(|e| EngineError::transport(format!("reading {} failed: {}", url, e)))
    }
}

#[async_trait]
impl ChunkStore for HttpStore {
    #[instrument(skip(self), fields(base = %self.base_url))]
    async fn get(&self, key: &str) -> Result<Bytes> {
        let url = format!("{}/{}", self.base_url, key);
        let bytes = self.fetch(self.client.get(&url), &url).await?;
        debug!(url = %url, bytes = bytes.len(), "Fetched object");
        Ok(bytes)
    }

    fn location(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self), fields(base = %self.base_url))]
    async fn consolidated_metadata(&self) -> Result<ConsolidatedMetadata> {
        let bytes = match &self.metadata_proxy {
            Some(proxy) => {
                let endpoint = format!("{}/api/metadata", proxy);
                let request = self
                    .client
                    .get(&endpoint)
                    .query(&[("path", self.base_url.as_str())]);
                self.fetch(request, &self.base_url).await?
            }
            None => self.get(crate::metadata::CONSOLIDATED_KEY).await?,
        };

        ConsolidatedMetadata::from_json(&bytes)
    }
}
