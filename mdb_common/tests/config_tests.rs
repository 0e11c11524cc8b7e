//! Device config loading tests.
//!
//! Tests for `DeviceConfig` from TOML on disk: defaults when the file is
//! missing, partial overrides, stream tables, unknown fields rejection,
//! and the timing and range checks in `validate()`.

use mdb_common::config::{ConfigError, ConfigLoader, DeviceConfig, LogLevel};
use mdb_common::consts::{CLIENT_STREAM_COUNT, DEFAULT_CLIENT_STREAMS};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write `content` as device.toml in `dir` and return its path.
fn write_device_toml(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("device.toml");
    fs::write(&path, content).unwrap();
    path
}

fn load(content: &str) -> Result<DeviceConfig, ConfigError> {
    let tmp = TempDir::new().unwrap();
    let path = write_device_toml(tmp.path(), content);
    DeviceConfig::load(&path)
}

// ─── Loading ────────────────────────────────────────────────────────

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let tmp = TempDir::new().unwrap();
    let config = DeviceConfig::load_or_default(&tmp.path().join("absent.toml")).unwrap();

    assert_eq!(config.streams.len(), CLIENT_STREAM_COUNT);
    for (stream, (address, name)) in config.streams.iter().zip(DEFAULT_CLIENT_STREAMS) {
        assert_eq!(stream.address, address);
        assert_eq!(stream.name, name);
        assert!(stream.path.is_none());
    }
    assert!(config.validate().is_ok());
}

#[test]
fn test_empty_file_is_all_defaults() {
    let config = load("").unwrap();
    assert_eq!(config.watchdog.timeout_ms, 2000);
    assert_eq!(config.watchdog.reset_interval_ms, 500);
    assert_eq!(config.forward.timeout_ms, 300);
    assert_eq!(config.time.time_zone_offset, 0);
    assert_eq!(config.shared.log_level, LogLevel::Info);
}

#[test]
fn test_full_file() {
    let config = load(
        r#"
[shared]
log_level = "trace"
service_name = "rig-7"

[device]
name = "arena_controller"
form_factor = "3x2"
baud = 230400
serial_timeout_ms = 20
cycle_time_us = 250

[watchdog]
timeout_ms = 1000
reset_interval_ms = 200

[forward]
timeout_ms = 120

[time]
time_zone_offset = -8

[[streams]]
address = 10
name = "east"
path = "/dev/ttyUSB0"

[[streams]]
address = 20
name = "west"
path = "/dev/ttyUSB1"
"#,
    )
    .unwrap();

    assert_eq!(config.shared.service_name, "rig-7");
    assert_eq!(config.device.name, "arena_controller");
    assert_eq!(config.device.baud, 230_400);
    assert_eq!(config.watchdog.reset_interval_ms, 200);
    assert_eq!(config.forward.timeout_ms, 120);
    assert_eq!(config.time.time_zone_offset, -8);
    assert_eq!(config.streams.len(), 2);
    assert_eq!(config.streams[0].path, Some(PathBuf::from("/dev/ttyUSB0")));
    assert!(config.validate().is_ok());
}

#[test]
fn test_unknown_section_rejected() {
    let result = load("[motors]\ncount = 4\n");
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn test_stream_address_out_of_u8_range_rejected() {
    let result = load("[[streams]]\naddress = 300\nname = \"far\"\n");
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

// ─── Validation ─────────────────────────────────────────────────────

#[test]
fn test_forward_timeout_not_below_reset_interval() {
    let config = load("[forward]\ntimeout_ms = 500\n").unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("forward.timeout_ms"), "{err}");
}

#[test]
fn test_serial_timeout_not_below_reset_interval() {
    let config = load("[device]\nserial_timeout_ms = 5000\n").unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("serial_timeout_ms"), "{err}");

    let config = load("[device]\nserial_timeout_ms = 499\n").unwrap();
    assert!(config.validate().is_ok());
}

#[test]
fn test_reset_interval_not_below_timeout() {
    let config = load("[watchdog]\ntimeout_ms = 400\nreset_interval_ms = 400\n").unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
fn test_duplicate_addresses_rejected() {
    let config = load(
        r#"
[[streams]]
address = 1
name = "a"

[[streams]]
address = 1
name = "b"
"#,
    )
    .unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_overlong_stream_name_rejected() {
    let name = "s".repeat(64);
    let config = load(&format!("[[streams]]\naddress = 1\nname = \"{name}\"\n")).unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_empty_device_name_rejected() {
    let config = load("[device]\nname = \"\"\n").unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_time_zone_default_out_of_range() {
    let config = load("[time]\ntime_zone_offset = -13\n").unwrap();
    assert!(config.validate().is_err());
}
