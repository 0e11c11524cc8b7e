//! Prelude module for common re-exports.
//!
//! ```rust
//! use mdb_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, DeviceConfig, LogLevel, StreamConfig};

// ─── Hardware seams ─────────────────────────────────────────────────
pub use crate::channel::{BoxedChannel, Channel, ChannelError, ChannelId};
pub use crate::clock::{Clock, SystemClock};
pub use crate::watchdog::{HardwareWatchdog, WatchdogError};

// ─── Routing ────────────────────────────────────────────────────────
pub use crate::types::{Address, AddressPath, DeviceIdentity, address_path};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{CLIENT_STREAM_COUNT, MESSAGE_BUFFER_LEN};
