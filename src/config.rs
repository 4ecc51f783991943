//! Configuration for the recorder
//!
//! Tuning knobs only: network timeouts, the fallback frame rate and encoder
//! settings. The camera address and output folder are never stored here.

use crate::errors::RecorderError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecorderConfig {
    pub network: NetworkConfig,
    pub capture: CaptureConfig,
}

/// Page and stream retrieval settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// Scheme prefixed to addresses that carry none
    pub default_scheme: String,
    /// Timeout for the camera page request in milliseconds
    pub request_timeout_ms: u64,
    /// Connect timeout for the stream request in milliseconds
    pub stream_connect_timeout_ms: u64,
    /// Longest wait for stream data before the recording ends, in milliseconds
    pub stream_read_timeout_ms: u64,
}

/// Recording settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureConfig {
    /// Frame rate used when the source reports a non-positive rate
    pub default_fps: f64,
    /// Target encoder bitrate in bits per second
    pub bitrate: u32,
    /// Output container extension, without the dot
    pub container_extension: String,
    /// chrono format string for the output file stem
    pub filename_pattern: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                default_scheme: "http".to_string(),
                request_timeout_ms: 10_000,
                stream_connect_timeout_ms: 10_000,
                stream_read_timeout_ms: 10_000,
            },
            capture: CaptureConfig {
                default_fps: 30.0,
                bitrate: 5_000_000,
                container_extension: "mp4".to_string(),
                filename_pattern: "[%d-%m-%Y] (%H-%M-%S)".to_string(),
            },
        }
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn stream_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_connect_timeout_ms)
    }

    pub fn stream_read_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_read_timeout_ms)
    }
}

impl RecorderConfig {
    /// Load configuration from a TOML file
    ///
    /// Unlike a settings store, a missing file is an error: the file is only
    /// consulted when a caller names it explicitly.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, RecorderError> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path).map_err(|e| {
            RecorderError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config: RecorderConfig = toml::from_str(&contents)
            .map_err(|e| RecorderError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate().map_err(RecorderError::Config)?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), RecorderError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    RecorderError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| RecorderError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| RecorderError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        let scheme = &self.network.default_scheme;
        if scheme.is_empty()
            || !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        {
            return Err(format!("Invalid default scheme: {:?}", scheme));
        }
        if self.network.request_timeout_ms == 0 {
            return Err("Request timeout must be greater than zero".to_string());
        }
        if self.network.stream_connect_timeout_ms == 0 {
            return Err("Stream connect timeout must be greater than zero".to_string());
        }
        if self.network.stream_read_timeout_ms == 0 {
            return Err("Stream read timeout must be greater than zero".to_string());
        }

        if !(self.capture.default_fps > 0.0 && self.capture.default_fps <= 240.0) {
            return Err("Default FPS must be within (0, 240]".to_string());
        }
        if self.capture.bitrate == 0 {
            return Err("Bitrate must be greater than zero".to_string());
        }
        let ext = &self.capture.container_extension;
        if ext.is_empty() || ext.contains(['.', '/', '\\']) {
            return Err(format!("Invalid container extension: {:?}", ext));
        }
        if self.capture.filename_pattern.trim().is_empty() {
            return Err("Filename pattern must not be empty".to_string());
        }
        if self.capture.filename_pattern.contains(['/', '\\']) {
            return Err("Filename pattern must not contain path separators".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RecorderConfig::default();
        assert_eq!(config.network.default_scheme, "http");
        assert_eq!(config.capture.default_fps, 30.0);
        assert_eq!(config.capture.container_extension, "mp4");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut bad_fps = RecorderConfig::default();
        bad_fps.capture.default_fps = 0.0;
        assert!(bad_fps.validate().is_err());

        let mut bad_scheme = RecorderConfig::default();
        bad_scheme.network.default_scheme = "ht tp".to_string();
        assert!(bad_scheme.validate().is_err());

        let mut bad_read_timeout = RecorderConfig::default();
        bad_read_timeout.network.stream_read_timeout_ms = 0;
        assert!(bad_read_timeout.validate().is_err());

        let mut bad_ext = RecorderConfig::default();
        bad_ext.capture.container_extension = ".mp4".to_string();
        assert!(bad_ext.validate().is_err());

        let mut bad_pattern = RecorderConfig::default();
        bad_pattern.capture.filename_pattern = "%Y/%m".to_string();
        assert!(bad_pattern.validate().is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("nested").join("recorder.toml");

        let mut config = RecorderConfig::default();
        config.capture.default_fps = 15.0;
        config.network.request_timeout_ms = 2_500;
        assert!(config.save_to_file(&config_path).is_ok());

        let loaded = RecorderConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_toml_format() {
        let config = RecorderConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[network]"));
        assert!(toml_string.contains("[capture]"));
        assert!(toml_string.contains("default_fps"));
        assert!(toml_string.contains("filename_pattern"));
    }

    #[test]
    fn test_load_nonexistent_file_is_error() {
        let result = RecorderConfig::load_from_file("nonexistent_recorder_config.toml");
        assert!(matches!(result, Err(RecorderError::Config(_))));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        let mut config = RecorderConfig::default();
        config.capture.bitrate = 0;
        fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        assert!(matches!(
            RecorderConfig::load_from_file(&path),
            Err(RecorderError::Config(_))
        ));
    }
}
