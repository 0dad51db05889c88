//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;

use crate::error::{Max14906Error, Result};
use crate::protocol::registers::{
    ChannelFunction, CurrentLimit, MAX14906_CHANNELS, MAX14906_MAX_CHIP_ADDRESS,
};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub device: DeviceConfig,
    pub spi: SpiConfig,
    #[serde(default)]
    pub enable: Option<EnableConfig>,
    pub channels: ChannelConfig,
    pub monitor: MonitorConfig,
    pub logging: LoggingConfig,
}

/// Device protocol configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    #[serde(default = "default_crc_enabled")]
    pub crc_enabled: bool,

    #[serde(default)]
    pub chip_address: u8,
}

/// SPI bus configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SpiConfig {
    #[serde(default)]
    pub bus: u8,

    #[serde(default)]
    pub chip_select: u8,

    #[serde(default = "default_max_speed_hz")]
    pub max_speed_hz: u32,
}

/// Enable line configuration
#[derive(Debug, Deserialize, Clone)]
pub struct EnableConfig {
    /// BCM GPIO number
    pub pin: u8,
}

/// Channel setup applied after init
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    #[serde(default = "default_functions")]
    pub functions: [ChannelFunction; MAX14906_CHANNELS as usize],

    #[serde(default = "default_current_limits")]
    pub current_limits: [CurrentLimit; MAX14906_CHANNELS as usize],
}

/// Transport used by the monitor
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    Simulated,
    RaspberryPi,
}

/// Monitor loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default = "default_transport")]
    pub transport: TransportKind,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily log files; empty logs to stdout only
    #[serde(default)]
    pub directory: String,
}

// Default value functions
fn default_crc_enabled() -> bool { true }

fn default_max_speed_hz() -> u32 { 1_000_000 }

fn default_functions() -> [ChannelFunction; MAX14906_CHANNELS as usize] {
    [ChannelFunction::HighZ; MAX14906_CHANNELS as usize]
}
fn default_current_limits() -> [CurrentLimit; MAX14906_CHANNELS as usize] {
    [CurrentLimit::MIN; MAX14906_CHANNELS as usize]
}

fn default_transport() -> TransportKind { TransportKind::Simulated }
fn default_poll_interval_ms() -> u64 { 500 }

fn default_log_level() -> String { "info".to_string() }

/// Highest SPI clock the MAX14906 accepts
const MAX_SPI_SPEED_HZ: u32 = 10_000_000;

/// Highest BCM GPIO on the 40-pin header
const MAX_BCM_GPIO: u8 = 27;

fn invalid(msg: impl std::fmt::Display) -> Max14906Error {
    Max14906Error::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use max14906::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.device.chip_address > MAX14906_MAX_CHIP_ADDRESS {
            return Err(invalid(format!(
                "chip_address must be between 0 and {}",
                MAX14906_MAX_CHIP_ADDRESS
            )));
        }

        if self.spi.bus > 1 {
            return Err(invalid("spi bus must be 0 or 1"));
        }

        if self.spi.chip_select > 2 {
            return Err(invalid("chip_select must be between 0 and 2"));
        }

        if self.spi.max_speed_hz == 0 || self.spi.max_speed_hz > MAX_SPI_SPEED_HZ {
            return Err(invalid(format!(
                "max_speed_hz must be between 1 and {}",
                MAX_SPI_SPEED_HZ
            )));
        }

        if let Some(enable) = &self.enable {
            if enable.pin > MAX_BCM_GPIO {
                return Err(invalid(format!(
                    "enable pin must be between 0 and {}",
                    MAX_BCM_GPIO
                )));
            }
        }

        if self.monitor.poll_interval_ms == 0 || self.monitor.poll_interval_ms > 60000 {
            return Err(invalid("poll_interval_ms must be between 1 and 60000"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid(
                "log level must be one of: trace, debug, info, warn, error",
            ));
        }

        Ok(())
    }
}
