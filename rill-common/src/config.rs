//! Engine configuration loading
//!
//! Configuration is resolved in priority order:
//! 1. Command-line config path (highest priority)
//! 2. `RILL_CONFIG` environment variable
//! 3. `<config_dir>/rill/config.toml`
//! 4. Compiled defaults (fallback)
//!
//! A missing file never prevents startup: a warning is logged and the
//! compiled defaults are used. A file that exists but cannot be parsed is an
//! error, since silently ignoring it would hide a typo in a real setting.

use crate::{Error, FadeCurve, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable naming a config file path
pub const CONFIG_ENV_VAR: &str = "RILL_CONFIG";

/// Default number of chunks in a streaming ring
pub const DEFAULT_STREAM_BUFFER_COUNT: usize = 3;

/// Default size of one streaming chunk in bytes
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 16384;

/// How the engine drives `tick`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateMode {
    /// An owning thread ticks at a fixed interval and pre-mixes output
    #[default]
    Polling,

    /// The audio driver's callback thread ticks once per output quantum
    DriverCallback,
}

/// Audio engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tick driver selection
    pub mode: UpdateMode,

    /// Polling interval in milliseconds (polling mode only)
    pub update_interval_ms: u64,

    /// Bytes per streaming chunk (must be a multiple of 4 so that every
    /// chunk holds whole 16-bit stereo frames)
    pub stream_buffer_size: usize,

    /// Chunks per streaming ring
    pub stream_buffer_count: usize,

    /// Size of the voice pool
    pub voice_count: usize,

    /// Output sample rate in Hz
    pub sample_rate: u32,

    /// Output channel count
    pub channels: u16,

    /// Output quantum in frames
    pub buffer_frames: u32,

    /// Output device name (None = default device)
    pub device_name: Option<String>,

    /// Log level used when RUST_LOG is not set
    pub log_level: String,

    /// Shape of fade ramps
    pub fade_curve: FadeCurve,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: UpdateMode::Polling,
            update_interval_ms: 10,
            stream_buffer_size: DEFAULT_STREAM_BUFFER_SIZE,
            stream_buffer_count: DEFAULT_STREAM_BUFFER_COUNT,
            voice_count: 16,
            sample_rate: 44100,
            channels: 2,
            buffer_frames: 2048,
            device_name: None,
            log_level: "info".to_string(),
            fade_curve: FadeCurve::Linear,
        }
    }
}

impl EngineConfig {
    /// Resolve configuration following the priority order in the module docs
    ///
    /// # Arguments
    /// * `cli_path` - Config path given on the command line, if any
    pub fn resolve(cli_path: Option<&Path>) -> Result<Self> {
        // Priority 1: command-line argument
        if let Some(path) = cli_path {
            info!("Loading configuration from command line path {}", path.display());
            return Self::load_from_file(path);
        }

        // Priority 2: environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(path);
            if path.exists() {
                info!("Loading configuration from {}={}", CONFIG_ENV_VAR, path.display());
                return Self::load_from_file(&path);
            }
            warn!(
                "{} points to missing file {}, ignoring",
                CONFIG_ENV_VAR,
                path.display()
            );
        }

        // Priority 3: platform config directory
        if let Some(path) = default_config_path() {
            if path.exists() {
                info!("Loading configuration from {}", path.display());
                return Self::load_from_file(&path);
            }
            debug!("No config file at {}", path.display());
        }

        // Priority 4: compiled defaults
        warn!("No configuration file found, using compiled defaults");
        Ok(Self::default())
    }

    /// Load and validate a TOML configuration file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the playback core cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.stream_buffer_count == 0 {
            return Err(Error::Config("stream_buffer_count must be at least 1".to_string()));
        }
        if self.stream_buffer_size == 0 || self.stream_buffer_size % 4 != 0 {
            return Err(Error::Config(format!(
                "stream_buffer_size must be a non-zero multiple of 4, got {}",
                self.stream_buffer_size
            )));
        }
        if self.voice_count == 0 {
            return Err(Error::Config("voice_count must be at least 1".to_string()));
        }
        if self.sample_rate == 0 || self.channels == 0 || self.buffer_frames == 0 {
            return Err(Error::Config(format!(
                "invalid output format: {} Hz, {} channels, {} frames",
                self.sample_rate, self.channels, self.buffer_frames
            )));
        }
        // A quantum is mixed from what is queued after one refill, which is
        // every chunk but the one already playing
        let quantum_bytes = self.buffer_frames as usize * self.channels as usize * 2;
        let refillable = (self.stream_buffer_count - 1) * self.stream_buffer_size;
        if refillable < quantum_bytes {
            return Err(Error::Config(format!(
                "stream ring of {} x {} bytes cannot cover a {}-frame output quantum; \
                 {} bytes beyond the playing chunk are needed",
                self.stream_buffer_count, self.stream_buffer_size, self.buffer_frames, quantum_bytes
            )));
        }
        if self.mode == UpdateMode::Polling && self.update_interval_ms == 0 {
            return Err(Error::Config("update_interval_ms must be non-zero in polling mode".to_string()));
        }
        Ok(())
    }

    /// Polling interval as a Duration
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    /// Duration of one output quantum in seconds
    pub fn quantum_seconds(&self) -> f32 {
        self.buffer_frames as f32 / self.sample_rate as f32
    }
}

/// Platform config file location (`~/.config/rill/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rill").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stream_buffer_count, 3);
        assert_eq!(config.mode, UpdateMode::Polling);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            mode = "driver-callback"
            stream_buffer_size = 4096
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, UpdateMode::DriverCallback);
        assert_eq!(config.stream_buffer_size, 4096);
        assert_eq!(config.voice_count, 16);
        assert_eq!(config.fade_curve, FadeCurve::Linear);
    }

    #[test]
    fn test_odd_buffer_size_rejected() {
        let result = EngineConfig::from_toml_str("stream_buffer_size = 4097");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_ring_rejected() {
        let result = EngineConfig::from_toml_str("stream_buffer_count = 0");
        assert!(result.is_err());
    }

    #[test]
    fn test_ring_smaller_than_quantum_rejected() {
        // Two refillable 4096-byte chunks hold 2048 stereo frames
        let fits = EngineConfig {
            stream_buffer_size: 4096,
            buffer_frames: 2048,
            ..Default::default()
        };
        assert!(fits.validate().is_ok());

        let too_small = EngineConfig {
            buffer_frames: 2049,
            ..fits.clone()
        };
        assert!(matches!(too_small.validate(), Err(Error::Config(_))));

        let single_chunk = EngineConfig {
            stream_buffer_count: 1,
            ..fits
        };
        assert!(single_chunk.validate().is_err());
    }

    #[test]
    fn test_malformed_toml_is_error() {
        let result = EngineConfig::from_toml_str("mode = [");
        assert!(matches!(result, Err(Error::Toml(_))));
    }

    #[test]
    fn test_quantum_seconds() {
        let config = EngineConfig {
            sample_rate: 1000,
            buffer_frames: 250,
            ..Default::default()
        };
        assert!((config.quantum_seconds() - 0.25).abs() < f32::EPSILON);
    }
}
