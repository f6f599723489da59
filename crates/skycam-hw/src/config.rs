//! Adapter configuration: TOML file plus `SKYCAM_*` environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::sdk::StreamMode;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Adapter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SkycamConfig {
    /// Explicit path to `libqhyccd`; platform defaults are probed when unset.
    pub sdk_library: Option<PathBuf>,
    /// Value written to the USB traffic control.
    pub usb_traffic: u32,
    /// Wait after a trigger that did not report "read directly".
    pub readout_delay_ms: u64,
    /// Stream mode selected by camera initialization.
    pub stream_mode: StreamMode,
    /// Default capture settings for the CLI.
    pub capture: ExposureSettings,
}

impl Default for SkycamConfig {
    fn default() -> Self {
        Self {
            sdk_library: None,
            usb_traffic: 10,
            readout_delay_ms: 1000,
            stream_mode: StreamMode::Single,
            capture: ExposureSettings::default(),
        }
    }
}

impl SkycamConfig {
    /// Load from the file named by `SKYCAM_CONFIG` (if set), then apply
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os("SKYCAM_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `SKYCAM_SDK_LIBRARY`, `SKYCAM_USB_TRAFFIC` and
    /// `SKYCAM_READOUT_DELAY_MS`. Unparseable values are ignored.
    pub fn apply_env(&mut self) {
        if let Some(path) = std::env::var_os("SKYCAM_SDK_LIBRARY") {
            self.sdk_library = Some(PathBuf::from(path));
        }
        self.usb_traffic = env_parse("SKYCAM_USB_TRAFFIC", self.usb_traffic);
        self.readout_delay_ms = env_parse("SKYCAM_READOUT_DELAY_MS", self.readout_delay_ms);
    }

    pub fn readout_delay(&self) -> Duration {
        Duration::from_millis(self.readout_delay_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Acquisition parameters applied before an exposure.
///
/// A zero `width` or `height` selects the full sensor area.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExposureSettings {
    pub roi_x: u32,
    pub roi_y: u32,
    pub width: u32,
    pub height: u32,
    pub bin_x: u32,
    pub bin_y: u32,
    pub bit_depth: u32,
    pub gain: f64,
    pub offset: f64,
    /// Exposure time in microseconds.
    pub exposure_us: f64,
}

impl Default for ExposureSettings {
    fn default() -> Self {
        Self {
            roi_x: 0,
            roi_y: 0,
            width: 0,
            height: 0,
            bin_x: 1,
            bin_y: 1,
            bit_depth: 16,
            gain: 0.0,
            offset: 0.0,
            exposure_us: 1_000_000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SkycamConfig::default();
        assert_eq!(config.usb_traffic, 10);
        assert_eq!(config.readout_delay(), Duration::from_secs(1));
        assert_eq!(config.stream_mode, StreamMode::Single);
        assert!(config.sdk_library.is_none());
        assert_eq!(config.capture.bit_depth, 16);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SkycamConfig::from_toml(
            r#"
            usb_traffic = 30
            stream_mode = "live"

            [capture]
            gain = 12.5
            exposure_us = 2000000
            "#,
        )
        .unwrap();
        assert_eq!(config.usb_traffic, 30);
        assert_eq!(config.stream_mode, StreamMode::Live);
        assert_eq!(config.readout_delay_ms, 1000);
        assert_eq!(config.capture.gain, 12.5);
        assert_eq!(config.capture.exposure_us, 2_000_000.0);
        assert_eq!(config.capture.bin_x, 1);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = SkycamConfig::from_toml("usb_trafic = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = SkycamConfig::from_file(Path::new("/nonexistent/skycam.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/skycam.toml"));
    }

    #[test]
    fn env_parse_falls_back_on_garbage() {
        std::env::set_var("SKYCAM_TEST_ENV_PARSE", "not-a-number");
        assert_eq!(env_parse("SKYCAM_TEST_ENV_PARSE", 7u32), 7);
        std::env::set_var("SKYCAM_TEST_ENV_PARSE", "42");
        assert_eq!(env_parse("SKYCAM_TEST_ENV_PARSE", 7u32), 42);
        std::env::remove_var("SKYCAM_TEST_ENV_PARSE");
    }
}
