//! Channel, clock and watchdog drivers.
//!
//! - [`sim`] - In-memory drivers for tests and `--simulate`
//! - [`stdio`] - Terminal channel for the simulated primary
//! - [`serial`] - Non-blocking tty channel (Linux)
//! - [`linux_watchdog`] - `/dev/watchdog` timer (Linux)

#[cfg(target_os = "linux")]
pub mod linux_watchdog;
#[cfg(target_os = "linux")]
pub mod serial;
pub mod sim;
pub mod stdio;
