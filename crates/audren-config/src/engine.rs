//! Engine configuration file.
//!
//! An [`EngineConfig`] pairs renderer allocation limits with hardware driver
//! settings. Every field has a default, so a partial file (or an empty one)
//! loads.
//!
//! ```toml
//! [renderer]
//! sample_rate = 48000
//! sub_mix_count = 8
//!
//! [driver]
//! poll_interval_ms = 5
//! channel_count = 2
//! ```

use std::path::Path;
use std::time::Duration;

use audren_core::RendererParameters;
use audren_io::SessionConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::validation::{ValidationResult, validate_engine};

/// Renderer allocation limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Output sample rate in Hz (32000 or 48000).
    pub sample_rate: u32,
    /// Samples per channel per frame.
    pub sample_count: u32,
    /// Mix buffers shared by all mixes.
    pub mix_buffer_count: u32,
    /// Mixes besides the final mix.
    pub sub_mix_count: u32,
    /// Effect slots.
    pub effect_count: u32,
    /// Splitter slots.
    pub splitter_count: u32,
    /// Splitter destination slots.
    pub splitter_destination_count: u32,
    /// Sink slots.
    pub sink_count: u32,
    /// Guest revision features are gated on.
    pub revision: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::from(RendererParameters::default())
    }
}

impl From<RendererParameters> for RendererConfig {
    fn from(p: RendererParameters) -> Self {
        Self {
            sample_rate: p.sample_rate,
            sample_count: p.sample_count,
            mix_buffer_count: p.mix_buffer_count,
            sub_mix_count: p.sub_mix_count,
            effect_count: p.effect_count,
            splitter_count: p.splitter_count,
            splitter_destination_count: p.splitter_destination_count,
            sink_count: p.sink_count,
            revision: p.revision,
        }
    }
}

impl RendererConfig {
    /// Renderer parameters with these limits.
    pub fn to_parameters(&self) -> RendererParameters {
        RendererParameters {
            sample_rate: self.sample_rate,
            sample_count: self.sample_count,
            mix_buffer_count: self.mix_buffer_count,
            sub_mix_count: self.sub_mix_count,
            effect_count: self.effect_count,
            splitter_count: self.splitter_count,
            splitter_destination_count: self.splitter_destination_count,
            sink_count: self.sink_count,
            revision: self.revision,
        }
    }
}

/// Hardware driver and default session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Milliseconds between completion polls.
    pub poll_interval_ms: u64,
    /// In-flight buffer cap per session.
    pub queue_capacity: usize,
    /// Maximum live sessions.
    pub max_sessions: usize,
    /// Channels per session.
    pub channel_count: u16,
    /// Output device name filter; the default device when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        let driver = audren_io::DriverConfig::default();
        let session = SessionConfig::default();
        Self {
            poll_interval_ms: u64::try_from(driver.poll_interval.as_millis()).unwrap_or(10),
            queue_capacity: driver.queue_capacity,
            max_sessions: driver.max_sessions,
            channel_count: session.channel_count,
            device: None,
        }
    }
}

impl DriverConfig {
    /// Driver settings for [`audren_io::HardwareDeviceDriver`].
    pub fn to_driver_config(&self) -> audren_io::DriverConfig {
        audren_io::DriverConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            queue_capacity: self.queue_capacity,
            max_sessions: self.max_sessions,
        }
    }

    /// Session settings at `sample_rate`.
    pub fn session_config(&self, sample_rate: u32) -> SessionConfig {
        SessionConfig {
            sample_rate,
            channel_count: self.channel_count,
            queue_capacity: self.queue_capacity,
            device_name: self.device.clone(),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Renderer limits.
    pub renderer: RendererConfig,
    /// Hardware driver settings.
    pub driver: DriverConfig,
}

impl EngineConfig {
    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Load a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
        std::fs::write(path, self.to_toml()?).map_err(|e| ConfigError::write_file(path, e))
    }

    /// Convert the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every field, reporting all violations.
    pub fn validate(&self) -> ValidationResult<()> {
        validate_engine(self)
    }

    /// Load and validate in one step.
    pub fn load_validated(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}
