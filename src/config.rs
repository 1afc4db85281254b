// SPDX-License-Identifier: GPL-3.0-only

//! JSON configuration
//!
//! Every section falls back to its defaults, so a file only needs the keys
//! it changes. Command-line flags are applied on top of the loaded file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backends::camera::{DeviceConfiguration, SyntheticConfig};
use crate::constants::{DEFAULT_WAIT_KEY_DELAY, display};
use crate::errors::ConfigError;
use crate::media::{DepthColormap, DepthDisplayOptions};
use crate::pipelines::{SessionConfig, TimeoutPolicy};

/// Display settings shared by all devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Depth shown at the dark end of the scale
    pub depth_max_mm: u16,
    pub colormap: DepthColormap,
    /// Render the point-cloud view
    pub show_point_cloud: bool,
    /// Keyboard poll per presented frame
    pub wait_key_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            depth_max_mm: display::DEPTH_MAX_MM,
            colormap: DepthColormap::Grayscale,
            show_point_cloud: true,
            wait_key_ms: DEFAULT_WAIT_KEY_DELAY.as_millis() as u64,
        }
    }
}

impl DisplayConfig {
    /// Depth rescaling options for the depth view
    pub fn depth_options(&self) -> DepthDisplayOptions {
        let base = match self.colormap {
            DepthColormap::Grayscale => DepthDisplayOptions::default(),
            DepthColormap::Turbo => DepthDisplayOptions::turbo(),
        };
        DepthDisplayOptions {
            max_depth_mm: self.depth_max_mm,
            ..base
        }
    }

    pub fn wait_key(&self) -> Duration {
        Duration::from_millis(self.wait_key_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device indices to run, one session each
    pub devices: Vec<u32>,
    /// Stream configuration applied to every device
    pub device: DeviceConfiguration,
    pub session: SessionConfig,
    pub display: DisplayConfig,
    /// Settings of the built-in synthetic sensor
    pub synthetic: SyntheticConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            devices: vec![0],
            device: DeviceConfiguration::default(),
            session: SessionConfig::default(),
            display: DisplayConfig::default(),
            synthetic: SyntheticConfig::default(),
        }
    }
}

impl Config {
    /// Read and validate a JSON configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text)?;
        info!(path = %path.display(), devices = ?config.devices, "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        debug!(?config, "Parsed configuration");
        Ok(config)
    }

    /// Check values that serde cannot
    ///
    /// Stream rules of the device configuration are not checked here; the
    /// device rejects them at stream start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.devices.is_empty() {
            return Err(ConfigError::Invalid("no devices selected".to_string()));
        }
        let mut seen = self.devices.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != self.devices.len() {
            return Err(ConfigError::Invalid(format!(
                "device listed more than once: {:?}",
                self.devices
            )));
        }
        if self.display.depth_max_mm == 0 {
            return Err(ConfigError::Invalid(
                "display.depth_max_mm must be positive".to_string(),
            ));
        }
        if self.session.max_frames == Some(0) {
            return Err(ConfigError::Invalid(
                "session.max_frames must be positive when set".to_string(),
            ));
        }
        if let TimeoutPolicy::Retry { max_consecutive: 0 } = self.session.timeout_policy {
            return Err(ConfigError::Invalid(
                "retry policy needs max_consecutive of at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_gives_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.devices, vec![0]);
    }

    #[test]
    fn test_turbo_display_keeps_max_depth() {
        let display = DisplayConfig {
            colormap: DepthColormap::Turbo,
            depth_max_mm: 3000,
            ..Default::default()
        };
        let opts = display.depth_options();
        assert_eq!(opts.colormap, DepthColormap::Turbo);
        assert_eq!(opts.max_depth_mm, 3000);
        assert!(opts.quantize_bands.is_some());
    }

    #[test]
    fn test_duplicate_devices_rejected() {
        let err = Config::from_json(r#"{ "devices": [0, 1, 0] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
