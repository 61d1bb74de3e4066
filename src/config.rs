//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::calibration::radio::CAPTURE_SETTLE_TICKS;
use crate::error::{FcLinkError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub calibration: CalibrationConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_device_paths")]
    pub device_paths: Vec<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

/// Link-layer timing configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    /// Tick rate of the ground-station loop in Hz
    #[serde(default = "default_tick_rate_hz")]
    pub tick_rate_hz: u32,

    /// Ticks between heartbeat commands
    #[serde(default = "default_heartbeat_ticks")]
    pub heartbeat_ticks: u32,
}

/// Radio calibration timing configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CalibrationConfig {
    /// Total sampling window in ticks
    #[serde(default = "default_sample_ticks")]
    pub sample_ticks: u32,

    /// Channel movement hysteresis threshold in raw channel units
    #[serde(default = "default_move_threshold")]
    pub move_threshold: i16,
}

// Default value functions
fn default_device_paths() -> Vec<String> {
    vec!["/dev/ttyUSB0".to_string(), "/dev/ttyACM0".to_string()]
}
fn default_baud_rate() -> u32 {
    115_200
}

fn default_tick_rate_hz() -> u32 {
    40
}
fn default_heartbeat_ticks() -> u32 {
    20
}

fn default_sample_ticks() -> u32 {
    600
}
fn default_move_threshold() -> i16 {
    30
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device_paths: default_device_paths(),
            baud_rate: default_baud_rate(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: default_tick_rate_hz(),
            heartbeat_ticks: default_heartbeat_ticks(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            sample_ticks: default_sample_ticks(),
            move_threshold: default_move_threshold(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Missing fields fall back to their defaults, so a partial file is fine.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the timing math cannot work with
    fn validate(&self) -> Result<()> {
        if self.link.tick_rate_hz == 0 || self.link.tick_rate_hz > 1000 {
            return Err(FcLinkError::InvalidConfig(format!(
                "tick_rate_hz must be 1..=1000, got {}",
                self.link.tick_rate_hz
            )));
        }
        if self.link.heartbeat_ticks == 0 {
            return Err(FcLinkError::InvalidConfig(
                "heartbeat_ticks must be nonzero".to_string(),
            ));
        }
        if self.calibration.sample_ticks <= CAPTURE_SETTLE_TICKS {
            return Err(FcLinkError::InvalidConfig(format!(
                "sample_ticks must exceed the {}-tick settle window, got {}",
                CAPTURE_SETTLE_TICKS, self.calibration.sample_ticks
            )));
        }
        Ok(())
    }

    /// Load configuration from a file if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Tick period in milliseconds
    pub fn tick_period_ms(&self) -> u64 {
        (1000 / self.link.tick_rate_hz) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.link.tick_rate_hz, 40);
        assert_eq!(config.link.heartbeat_ticks, 20);
        assert_eq!(config.calibration.sample_ticks, 600);
        assert_eq!(config.calibration.move_threshold, 30);
    }

    #[test]
    fn test_tick_period() {
        let config = Config::default();
        assert_eq!(config.tick_period_ms(), 25, "40Hz should be a 25ms tick");
    }

    #[test]
    fn test_load_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[serial]\nbaud_rate = 57600").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.serial.baud_rate, 57_600);
        // Everything else defaulted
        assert_eq!(config.link.tick_rate_hz, 40);
        assert_eq!(config.calibration.sample_ticks, 600);
    }

    #[test]
    fn test_load_invalid_toml_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not toml [").unwrap();

        let result = Config::load(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_rejects_zero_tick_rate() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[link]\ntick_rate_hz = 0").unwrap();

        let result = Config::load(file.path());
        assert!(matches!(
            result.unwrap_err(),
            FcLinkError::InvalidConfig(_)
        ));
    }

    #[test]
    fn test_load_rejects_zero_heartbeat_interval() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[link]\nheartbeat_ticks = 0").unwrap();

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_load_rejects_short_sampling_window() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[calibration]\nsample_ticks = 10").unwrap();

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/fc-link.toml")).unwrap();
        assert_eq!(config.link.heartbeat_ticks, 20);
    }
}
