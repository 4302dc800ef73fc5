//! Proxy configuration.

use serde::{Deserialize, Serialize};

/// Runtime settings of the proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Upstream request timeout in seconds.
    pub timeout_secs: u64,

    /// Upper bound on the size of a proxied `.zmetadata` document.
    pub max_metadata_bytes: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_metadata_bytes: 64 * 1024 * 1024,
        }
    }
}

impl ProxyConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PROXY_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.timeout_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("PROXY_MAX_METADATA_BYTES") {
            if let Ok(bytes) = val.parse() {
                config.max_metadata_bytes = bytes;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be > 0".to_string());
        }
        if self.max_metadata_bytes == 0 {
            return Err("max_metadata_bytes must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ProxyConfig::default().validate().is_ok());

        let config = ProxyConfig {
            timeout_secs: 0,
            ..ProxyConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
