//! Configuration loading traits and types.
//!
//! Compile-time constants in [`crate::consts`] are the defaults; a TOML
//! file may override timing, naming and the client stream table. Table
//! capacities are never configurable.
//!
//! # Usage
//!
//! ```rust,no_run
//! use mdb_common::config::{ConfigLoader, DeviceConfig, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = DeviceConfig::load(Path::new("device.toml"))?;
//!     config.validate()?;
//!     println!("Device: {}", config.device.name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::consts::{
    ADDRESS_MAX, ADDRESS_MIN, BAUD, CLIENT_STREAM_COUNT, CYCLE_TIME_US, DEFAULT_CLIENT_STREAMS,
    DEVICE_NAME, FORM_FACTOR, FORWARD_TIMEOUT_MS, SERIAL_TIMEOUT_MS, STREAM_NAME_LEN_MAX,
    TIME_ZONE_OFFSET_DEFAULT, TIME_ZONE_OFFSET_MAX, TIME_ZONE_OFFSET_MIN,
    WATCHDOG_RESET_INTERVAL_MS, WATCHDOG_TIMEOUT_MS,
};
use crate::types::Address;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Matching `tracing` level.
    pub fn as_tracing(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

/// Common configuration fields.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "mdb-bench-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: DEVICE_NAME.to_string(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// `[device]` section: identity and serial line settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceSection {
    /// Device name reported by `getDeviceId`.
    pub name: String,
    /// Mechanical form factor.
    pub form_factor: String,
    /// Serial baud rate for every channel.
    pub baud: u32,
    /// Serial write timeout [ms].
    pub serial_timeout_ms: u64,
    /// Pacing of idle loop iterations [µs].
    pub cycle_time_us: u64,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            name: DEVICE_NAME.to_string(),
            form_factor: FORM_FACTOR.to_string(),
            baud: BAUD,
            serial_timeout_ms: SERIAL_TIMEOUT_MS,
            cycle_time_us: CYCLE_TIME_US,
        }
    }
}

/// `[watchdog]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchdogConfig {
    /// Hardware timeout [ms].
    pub timeout_ms: u64,
    /// Re-arm interval [ms]; must be shorter than `timeout_ms`.
    pub reset_interval_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            timeout_ms: WATCHDOG_TIMEOUT_MS,
            reset_interval_ms: WATCHDOG_RESET_INTERVAL_MS,
        }
    }
}

/// `[forward]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForwardConfig {
    /// Upper bound on waiting for a forwarded response [ms].
    pub timeout_ms: u64,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            timeout_ms: FORWARD_TIMEOUT_MS,
        }
    }
}

/// `[time]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeConfig {
    /// Default value of the `timeZoneOffset` property [h].
    pub time_zone_offset: i64,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            time_zone_offset: TIME_ZONE_OFFSET_DEFAULT,
        }
    }
}

/// One `[[streams]]` entry binding a serial channel to an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamConfig {
    /// Routing address of the stream.
    pub address: Address,
    /// Display name reported by `getClientInfo`.
    pub name: String,
    /// Serial device path (e.g. `/dev/ttyUSB0`). Simulated when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_streams() -> Vec<StreamConfig> {
    DEFAULT_CLIENT_STREAMS
        .iter()
        .map(|(address, name)| StreamConfig {
            address: *address,
            name: name.to_string(),
            path: None,
        })
        .collect()
}

/// Complete device configuration.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "bench-rig"
///
/// [watchdog]
/// timeout_ms = 2000
/// reset_interval_ms = 500
///
/// [[streams]]
/// address = 1
/// name = "east"
/// path = "/dev/ttyUSB0"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Logging and instance naming.
    #[serde(default)]
    pub shared: SharedConfig,
    /// Identity and serial settings.
    #[serde(default)]
    pub device: DeviceSection,
    /// Watchdog timing.
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    /// Forwarding timing.
    #[serde(default)]
    pub forward: ForwardConfig,
    /// Time service defaults.
    #[serde(default)]
    pub time: TimeConfig,
    /// Client stream table.
    #[serde(default = "default_streams")]
    pub streams: Vec<StreamConfig>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            shared: SharedConfig::default(),
            device: DeviceSection::default(),
            watchdog: WatchdogConfig::default(),
            forward: ForwardConfig::default(),
            time: TimeConfig::default(),
            streams: default_streams(),
        }
    }
}

impl DeviceConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::FileNotFound) => {
                tracing::info!("No config at {:?}, using built-in defaults", path);
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - a name is empty or a stream name is too long
    /// - `reset_interval_ms >= timeout_ms` or `forward.timeout_ms >= reset_interval_ms`
    /// - the idle pause `cycle_time_us` is not shorter than `reset_interval_ms`
    /// - a blocked serial write could outlast `reset_interval_ms` (`serial_timeout_ms`)
    /// - there are more streams than the compile-time capacity
    /// - stream addresses collide or fall outside the address range
    /// - the default time zone offset is out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.device.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "device.name cannot be empty".to_string(),
            ));
        }

        let wd = &self.watchdog;
        if wd.reset_interval_ms == 0 || wd.reset_interval_ms >= wd.timeout_ms {
            return Err(ConfigError::ValidationError(format!(
                "watchdog.reset_interval_ms ({}) must be in 1..{}",
                wd.reset_interval_ms, wd.timeout_ms
            )));
        }
        if self.forward.timeout_ms >= wd.reset_interval_ms {
            return Err(ConfigError::ValidationError(format!(
                "forward.timeout_ms ({}) must be shorter than watchdog.reset_interval_ms ({})",
                self.forward.timeout_ms, wd.reset_interval_ms
            )));
        }

        if self.device.cycle_time_us / 1000 >= wd.reset_interval_ms {
            return Err(ConfigError::ValidationError(format!(
                "device.cycle_time_us ({}) must be shorter than watchdog.reset_interval_ms ({})",
                self.device.cycle_time_us, wd.reset_interval_ms
            )));
        }

        if self.device.serial_timeout_ms >= wd.reset_interval_ms {
            return Err(ConfigError::ValidationError(format!(
                "device.serial_timeout_ms ({}) must be shorter than watchdog.reset_interval_ms ({})",
                self.device.serial_timeout_ms, wd.reset_interval_ms
            )));
        }

        let offset = self.time.time_zone_offset;
        if !(TIME_ZONE_OFFSET_MIN..=TIME_ZONE_OFFSET_MAX).contains(&offset) {
            return Err(ConfigError::ValidationError(format!(
                "time.time_zone_offset ({offset}) outside [{TIME_ZONE_OFFSET_MIN}, {TIME_ZONE_OFFSET_MAX}]"
            )));
        }

        if self.streams.len() > CLIENT_STREAM_COUNT {
            return Err(ConfigError::ValidationError(format!(
                "{} streams configured, capacity is {CLIENT_STREAM_COUNT}",
                self.streams.len()
            )));
        }

        for (idx, stream) in self.streams.iter().enumerate() {
            if stream.name.is_empty() || stream.name.len() > STREAM_NAME_LEN_MAX {
                return Err(ConfigError::ValidationError(format!(
                    "stream {idx}: name must be 1..={STREAM_NAME_LEN_MAX} bytes"
                )));
            }
            let address = i64::from(stream.address);
            if !(ADDRESS_MIN..=ADDRESS_MAX).contains(&address) {
                return Err(ConfigError::ValidationError(format!(
                    "stream '{}': address {address} outside [{ADDRESS_MIN}, {ADDRESS_MAX}]",
                    stream.name
                )));
            }
            if self.streams[..idx].iter().any(|s| s.address == stream.address) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate stream address {}",
                    stream.address
                )));
            }
        }

        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::Warn.as_tracing(), tracing::Level::WARN);
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"trace\"")
                .unwrap()
                .level,
            LogLevel::Trace
        );
        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"error\"")
                .unwrap()
                .level,
            LogLevel::Error
        );
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = DeviceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.streams.len(), CLIENT_STREAM_COUNT);
    }

    #[test]
    fn test_shared_config_validation_empty_service_name() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: "".to_string(),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_reset_interval_must_be_shorter_than_timeout() {
        let mut config = DeviceConfig::default();
        config.watchdog.reset_interval_ms = config.watchdog.timeout_ms;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_forward_timeout_must_be_shorter_than_reset_interval() {
        let mut config = DeviceConfig::default();
        config.forward.timeout_ms = config.watchdog.reset_interval_ms;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cycle_time_must_be_shorter_than_reset_interval() {
        let mut config = DeviceConfig::default();
        config.device.cycle_time_us = config.watchdog.reset_interval_ms * 1000;
        assert!(config.validate().is_err());
        config.device.cycle_time_us = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_stream_address_rejected() {
        let mut config = DeviceConfig::default();
        config.streams[1].address = config.streams[0].address;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate stream address"));
    }

    #[test]
    fn test_too_many_streams_rejected() {
        let mut config = DeviceConfig::default();
        config.streams.push(StreamConfig {
            address: 42,
            name: "extra".to_string(),
            path: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_time_zone_offset_out_of_range() {
        let mut config = DeviceConfig::default();
        config.time.time_zone_offset = TIME_ZONE_OFFSET_MAX + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_loader_file_not_found() {
        let result = DeviceConfig::load(Path::new("/nonexistent/path/device.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));

        let fallback = DeviceConfig::load_or_default(Path::new("/nonexistent/path/device.toml"))
            .expect("defaults");
        assert_eq!(fallback.device.name, DEVICE_NAME);
    }

    #[test]
    fn test_config_loader_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml {{{{").unwrap();

        let result = DeviceConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_config_loader_success() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[shared]
log_level = "debug"
service_name = "bench"

[forward]
timeout_ms = 150

[[streams]]
address = 1
name = "east"

[[streams]]
address = 2
name = "west"
path = "/dev/ttyUSB1"
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = DeviceConfig::load(file.path()).unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Debug);
        assert_eq!(config.forward.timeout_ms, 150);
        assert_eq!(config.watchdog, WatchdogConfig::default());
        assert_eq!(config.streams.len(), 2);
        assert_eq!(config.streams[1].path, Some(PathBuf::from("/dev/ttyUSB1")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[watchdog]\ntimeout_ms = 2000\nbogus = 1\n").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            DeviceConfig::load(file.path()),
            Err(ConfigError::ParseError(_))
        ));
    }
}
