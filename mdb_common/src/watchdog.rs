//! # Hardware Watchdog Trait
//!
//! Defines the contract between the watchdog supervisor and the timer
//! that physically resets the device. The supervisor decides *when* to
//! re-arm; implementors only know *how*.
//!
//! # Timing Contracts
//!
//! | Operation | Called | RT Constraint |
//! |-----------|--------|---------------|
//! | `enable()` | once at boot | None (pre-loop) |
//! | `reset()` | from the dispatch loop | **HARD**, must not block |

use thiserror::Error;

/// Error type for watchdog operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchdogError {
    /// The timer could not be armed with the requested timeout.
    #[error("failed to enable watchdog ({timeout_ms} ms): {reason}")]
    EnableFailed {
        timeout_ms: u64,
        reason: String,
    },

    /// Generic I/O error while feeding the timer.
    #[error("watchdog I/O error: {0}")]
    Io(String),
}

/// A timer that forces a device reset unless re-armed in time.
pub trait HardwareWatchdog {
    /// Arm the timer with `timeout_ms`. The countdown starts immediately.
    fn enable(&mut self, timeout_ms: u64) -> Result<(), WatchdogError>;

    /// Re-arm the timer, restarting the countdown.
    fn reset(&mut self) -> Result<(), WatchdogError>;

    /// Whether the timer has already expired and forced a reset.
    ///
    /// Real hardware never observes this (the device restarts); software
    /// implementations report it so the host can emulate the restart.
    fn has_fired(&self) -> bool {
        false
    }
}
