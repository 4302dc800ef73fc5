//! Shared application state.

use std::time::Duration;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusHandle;
use reqwest::Client;

use crate::config::ProxyConfig;

/// Shared application state.
pub struct AppState {
    /// HTTP client for upstream stores.
    pub client: Client,

    pub config: ProxyConfig,

    /// Renders `/metrics`; `None` when no recorder is installed.
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: ProxyConfig, prometheus: Option<PrometheusHandle>) -> Result<Self> {
        config.validate().map_err(anyhow::Error::msg)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            prometheus,
        })
    }
}
