//! Compile-time constants for the modular device workspace.
//!
//! Single source of truth for table capacities, timing limits and
//! parameter ranges. Runtime configuration may override the timing and
//! naming values, never the capacities.

use static_assertions::const_assert;

use crate::types::Address;

// ─── Identity ───────────────────────────────────────────────────────

/// Default device name reported by `getDeviceId`.
pub const DEVICE_NAME: &str = "modular_device_base";

/// Default form factor reported by `getDeviceId`.
pub const FORM_FACTOR: &str = "5x3";

/// Firmware name reported by `getDeviceInfo`.
pub const FIRMWARE_NAME: &str = "ModularDeviceBase";

/// Firmware version reported by `getDeviceInfo`.
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Processor description reported by `getDeviceInfo`.
pub const PROCESSOR_NAME: &str = "host";

/// Hardware name reported by `getDeviceInfo`.
pub const HARDWARE_NAME: &str = "modular_device_base";

/// Hardware part number reported by `getDeviceInfo`.
pub const HARDWARE_PART_NUMBER: u32 = 1100;

// ─── Streams ────────────────────────────────────────────────────────

/// Number of serial streams that can be bound as client streams.
pub const CLIENT_STREAM_COUNT: usize = 3;

/// Default client stream table: `(address, name)` per serial stream.
pub const DEFAULT_CLIENT_STREAMS: [(Address, &str); CLIENT_STREAM_COUNT] =
    [(1, "serial1"), (2, "serial2"), (3, "serial3")];

/// Maximum stream name length in bytes.
pub const STREAM_NAME_LEN_MAX: usize = 32;

/// Capacity of each channel's inbound message buffer in bytes.
pub const MESSAGE_BUFFER_LEN: usize = 512;

/// Default serial baud rate.
pub const BAUD: u32 = 115_200;

/// Default bound on a blocked serial write in milliseconds.
pub const SERIAL_TIMEOUT_MS: u64 = 100;

// ─── Watchdog ───────────────────────────────────────────────────────

/// Hardware watchdog timeout in milliseconds.
pub const WATCHDOG_TIMEOUT_MS: u64 = 2000;

/// Interval after which the dispatch loop re-arms the watchdog.
pub const WATCHDOG_RESET_INTERVAL_MS: u64 = 500;

/// Upper bound on waiting for a forwarded response.
pub const FORWARD_TIMEOUT_MS: u64 = 300;

/// Default outer loop pacing in microseconds (idle iterations only).
pub const CYCLE_TIME_US: u64 = 1000;

const_assert!(WATCHDOG_RESET_INTERVAL_MS < WATCHDOG_TIMEOUT_MS);
const_assert!(FORWARD_TIMEOUT_MS < WATCHDOG_RESET_INTERVAL_MS);
const_assert!(CYCLE_TIME_US / 1000 < WATCHDOG_RESET_INTERVAL_MS);
const_assert!(SERIAL_TIMEOUT_MS < WATCHDOG_RESET_INTERVAL_MS);

// ─── Parameter ranges ───────────────────────────────────────────────

/// Smallest routable address.
pub const ADDRESS_MIN: i64 = 0;

/// Largest routable address.
pub const ADDRESS_MAX: i64 = 255;

/// Minimum number of hops in an address path.
pub const ADDRESS_ARRAY_LENGTH_MIN: usize = 1;

/// Maximum number of hops in an address path.
pub const ADDRESS_ARRAY_LENGTH_MAX: usize = 8;

/// Minimum number of elements in a forwarded request array.
pub const REQUEST_ARRAY_LENGTH_MIN: usize = 1;

/// Maximum number of elements in a forwarded request array.
pub const REQUEST_ARRAY_LENGTH_MAX: usize = 32;

/// Smallest accepted epoch time in seconds.
pub const EPOCH_TIME_MIN: i64 = 0;

/// Largest accepted epoch time in seconds (32-bit `time_t`).
pub const EPOCH_TIME_MAX: i64 = 2_147_483_647;

/// Default time zone offset in hours.
pub const TIME_ZONE_OFFSET_DEFAULT: i64 = 0;

/// Smallest time zone offset in hours.
pub const TIME_ZONE_OFFSET_MIN: i64 = -12;

/// Largest time zone offset in hours.
pub const TIME_ZONE_OFFSET_MAX: i64 = 14;

/// Seconds per hour, used for time zone localization.
pub const SECONDS_PER_HOUR: i64 = 3600;

const_assert!(ADDRESS_MAX <= Address::MAX as i64);
const_assert!(ADDRESS_ARRAY_LENGTH_MIN >= 1);
const_assert!(TIME_ZONE_OFFSET_MIN <= TIME_ZONE_OFFSET_DEFAULT);
const_assert!(TIME_ZONE_OFFSET_DEFAULT <= TIME_ZONE_OFFSET_MAX);
