//! Configuration for the chunk engine.

use serde::{Deserialize, Serialize};

/// Configuration for dataset loading and window refreshes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Horizontal neighbour margin of the active window, in chunks.
    pub window_x_radius: usize,

    /// Vertical neighbour margin of the active window, in chunks.
    pub window_y_radius: usize,

    /// Above this many valid samples a chunk's clim is the percentile band
    /// instead of the full min/max.
    pub clim_percentile_threshold: usize,

    /// Lower percentile of the trimmed clim band (0-1).
    pub clim_lower_percentile: f64,

    /// Upper percentile of the trimmed clim band (0-1).
    pub clim_upper_percentile: f64,

    /// Share one in-flight fetch between concurrent requests for the same key.
    pub dedupe_in_flight: bool,

    /// Allowed relative deviation from the mean step of a coordinate array.
    pub spacing_tolerance: f64,

    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Optional metadata proxy base URL (`<proxy>/api/metadata?path=<url>`).
    pub metadata_proxy_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_x_radius: 2,
            window_y_radius: 1,
            clim_percentile_threshold: 1_000_000,
            clim_lower_percentile: 0.05,
            clim_upper_percentile: 0.95,
            dedupe_in_flight: true,
            spacing_tolerance: 0.01,
            request_timeout_secs: 30,
            metadata_proxy_url: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("WINDOW_X_RADIUS") {
            if let Ok(radius) = val.parse() {
                config.window_x_radius = radius;
            }
        }

        if let Ok(val) = std::env::var("WINDOW_Y_RADIUS") {
            if let Ok(radius) = val.parse() {
                config.window_y_radius = radius;
            }
        }

        if let Ok(val) = std::env::var("CLIM_PERCENTILE_THRESHOLD") {
            if let Ok(threshold) = val.parse() {
                config.clim_percentile_threshold = threshold;
            }
        }

        if let Ok(val) = std::env::var("DEDUPE_IN_FLIGHT") {
            config.dedupe_in_flight = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("REQUEST_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.request_timeout_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("METADATA_PROXY_URL") {
            if !val.is_empty() {
                config.metadata_proxy_url = Some(val);
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.window_x_radius < self.window_y_radius {
            return Err("window_x_radius must be >= window_y_radius".to_string());
        }

        if !(0.0..1.0).contains(&self.clim_lower_percentile)
            || !(0.0..=1.0).contains(&self.clim_upper_percentile)
            || self.clim_lower_percentile >= self.clim_upper_percentile
        {
            return Err("clim percentiles must satisfy 0 <= lower < upper <= 1".to_string());
        }

        if self.spacing_tolerance <= 0.0 {
            return Err("spacing_tolerance must be > 0".to_string());
        }

        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be > 0".to_string());
        }

        Ok(())
    }

    /// Column/row offsets of the active window footprint.
    pub fn window_offsets(&self) -> Vec<(i64, i64)> {
        let rx = self.window_x_radius as i64;
        let ry = self.window_y_radius as i64;
        (-ry..=ry)
            .flat_map(|dy| (-rx..=rx).map(move |dx| (dx, dy)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.window_x_radius, 2);
        assert_eq!(config.window_y_radius, 1);
        assert!(config.dedupe_in_flight);
        assert!(config.metadata_proxy_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        config.window_y_radius = 3;
        assert!(config.validate().is_err());

        config = EngineConfig::default();
        config.clim_lower_percentile = 0.9;
        config.clim_upper_percentile = 0.1;
        assert!(config.validate().is_err());

        config = EngineConfig::default();
        config.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_window_offsets_wider_than_tall() {
        let offsets = EngineConfig::default().window_offsets();
        assert_eq!(offsets.len(), 15);
        assert!(offsets.contains(&(0, 0)));
        assert!(offsets.contains(&(2, 1)));
        assert!(offsets.contains(&(-2, -1)));
        assert!(!offsets.contains(&(0, 2)));
    }
}
