use crate::error::{EffectError, EffectResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 33;
pub const DEFAULT_WIDTH: u32 = 640;
pub const DEFAULT_HEIGHT: u32 = 360;
pub const DEFAULT_MAX_SURFACE_DIMENSION: u32 = 8192;
pub const DEFAULT_STREAM_KEY: &str = "filtered_stream";

/// Controller settings, loadable from JSON. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tick_interval_ms: u64,
    pub default_width: u32,
    pub default_height: u32,
    pub max_surface_dimension: u32,
    pub stream_key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            default_width: DEFAULT_WIDTH,
            default_height: DEFAULT_HEIGHT,
            max_surface_dimension: DEFAULT_MAX_SURFACE_DIMENSION,
            stream_key: DEFAULT_STREAM_KEY.to_string(),
        }
    }
}

impl Settings {
    pub fn from_json_str(json: &str) -> EffectResult<Self> {
        serde_json::from_str(json).map_err(|e| EffectError::config(format!("invalid settings: {e}")))
    }

    pub fn load(path: impl AsRef<Path>) -> EffectResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            EffectError::config(format!("cannot read settings {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Scheduler period, never shorter than one millisecond
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_ms = interval.as_millis().max(1) as u64;
        self
    }

    pub fn default_size(&self) -> (u32, u32) {
        (self.default_width, self.default_height)
    }
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_values() {
        let settings = Settings::default();
        assert_eq!(settings.tick_interval(), Duration::from_millis(33));
        assert_eq!(settings.default_size(), (640, 360));
        assert_eq!(settings.stream_key, "filtered_stream");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings = Settings::from_json_str(r#"{ "tick_interval_ms": 10 }"#).unwrap();
        assert_eq!(settings.tick_interval_ms, 10);
        assert_eq!(settings.default_width, DEFAULT_WIDTH);
        assert_eq!(settings.max_surface_dimension, DEFAULT_MAX_SURFACE_DIMENSION);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = Settings::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, EffectError::Config(_)));
    }

    #[test]
    fn zero_interval_is_clamped() {
        let settings = Settings {
            tick_interval_ms: 0,
            ..Settings::default()
        };
        assert_eq!(settings.tick_interval(), Duration::from_millis(1));
    }
}
