//! Watchdog supervisor.
//!
//! Decides when the hardware watchdog is re-armed. Two states:
//!
//! ```text
//!            service(now): now - last_reset >= reset_interval
//!            ┌───────────┐ → hw.reset(), last_reset = now
//!            ▼           │
//!        ┌───────┐───────┘      request_system_reset()     ┌──────────────┐
//!  boot ─►│ Armed │──────────────────────────────────────►│ ResetPending │
//!        └───────┘                                         └──────────────┘
//!                                                  service() is a no-op; the
//!                                                  hardware timeout resets
//!                                                  the unit
//! ```
//!
//! `ResetPending` is terminal: software never leaves it, the physical
//! reset brings the device back up `Armed`.

use mdb_common::config::WatchdogConfig;
use mdb_common::watchdog::{HardwareWatchdog, WatchdogError};
use tracing::{info, warn};

/// Supervisor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    /// Re-arming normally.
    Armed {
        /// Tick of the last successful re-arm [ms].
        last_reset_ms: u64,
    },
    /// A system reset was requested; the hardware is left to expire.
    ResetPending,
}

/// Keeps the hardware watchdog armed from the dispatch loop.
#[derive(Debug, Clone)]
pub struct WatchdogSupervisor {
    state: WatchdogState,
    timeout_ms: u64,
    reset_interval_ms: u64,
}

impl WatchdogSupervisor {
    /// Enable `hw` with the configured timeout and start `Armed`.
    ///
    /// # Errors
    /// Returns the hardware error if the timer cannot be enabled or fed.
    pub fn arm<W: HardwareWatchdog + ?Sized>(
        hw: &mut W,
        config: &WatchdogConfig,
        now_ms: u64,
    ) -> Result<Self, WatchdogError> {
        hw.enable(config.timeout_ms)?;
        hw.reset()?;
        info!(
            "Watchdog armed: timeout={}ms, reset_interval={}ms",
            config.timeout_ms, config.reset_interval_ms
        );
        Ok(Self {
            state: WatchdogState::Armed {
                last_reset_ms: now_ms,
            },
            timeout_ms: config.timeout_ms,
            reset_interval_ms: config.reset_interval_ms,
        })
    }

    /// Re-arm `hw` if `reset_interval` has elapsed since the last re-arm.
    ///
    /// Returns `true` if the hardware was fed. Never feeds in `ResetPending`.
    pub fn service<W: HardwareWatchdog + ?Sized>(&mut self, hw: &mut W, now_ms: u64) -> bool {
        let WatchdogState::Armed { last_reset_ms } = self.state else {
            return false;
        };
        let elapsed = now_ms.saturating_sub(last_reset_ms);
        if elapsed < self.reset_interval_ms {
            return false;
        }
        if elapsed >= self.timeout_ms {
            warn!(
                "Watchdog serviced {}ms after last reset (timeout {}ms)",
                elapsed, self.timeout_ms
            );
        }
        match hw.reset() {
            Ok(()) => {
                self.state = WatchdogState::Armed {
                    last_reset_ms: now_ms,
                };
                true
            }
            Err(e) => {
                warn!("Watchdog reset failed: {}", e);
                false
            }
        }
    }

    /// Stop re-arming so the hardware timeout resets the device.
    pub fn request_system_reset(&mut self) {
        if self.state != WatchdogState::ResetPending {
            info!(
                "System reset requested; watchdog will expire within {}ms",
                self.timeout_ms
            );
        }
        self.state = WatchdogState::ResetPending;
    }

    /// Current state.
    pub fn state(&self) -> WatchdogState {
        self.state
    }

    /// Whether a system reset has been requested.
    pub fn is_reset_pending(&self) -> bool {
        self.state == WatchdogState::ResetPending
    }

    /// Milliseconds since the last re-arm, `None` once a reset is pending.
    pub fn since_last_reset(&self, now_ms: u64) -> Option<u64> {
        match self.state {
            WatchdogState::Armed { last_reset_ms } => Some(now_ms.saturating_sub(last_reset_ms)),
            WatchdogState::ResetPending => None,
        }
    }

    /// Configured re-arm interval [ms].
    pub fn reset_interval_ms(&self) -> u64 {
        self.reset_interval_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::sim::{SimClock, SimWatchdog};
    use mdb_common::clock::Clock;

    fn config() -> WatchdogConfig {
        WatchdogConfig {
            timeout_ms: 100,
            reset_interval_ms: 40,
        }
    }

    #[test]
    fn arm_enables_hardware() {
        let clock = SimClock::new();
        let mut hw = SimWatchdog::new(clock.clone());
        let sup = WatchdogSupervisor::arm(&mut hw, &config(), clock.now_ms()).unwrap();
        assert_eq!(sup.state(), WatchdogState::Armed { last_reset_ms: 0 });
        clock.advance(100);
        assert!(hw.has_fired());
    }

    #[test]
    fn service_feeds_only_after_interval() {
        let clock = SimClock::new();
        let mut hw = SimWatchdog::new(clock.clone());
        let mut sup = WatchdogSupervisor::arm(&mut hw, &config(), 0).unwrap();
        let fed_at_arm = hw.feeds();

        clock.advance(39);
        assert!(!sup.service(&mut hw, clock.peek()));
        clock.advance(1);
        assert!(sup.service(&mut hw, clock.peek()));
        assert_eq!(hw.feeds(), fed_at_arm + 1);
        assert_eq!(sup.since_last_reset(clock.peek()), Some(0));
    }

    #[test]
    fn reset_pending_stops_feeding() {
        let clock = SimClock::new();
        let mut hw = SimWatchdog::new(clock.clone());
        let mut sup = WatchdogSupervisor::arm(&mut hw, &config(), 0).unwrap();

        sup.request_system_reset();
        assert!(sup.is_reset_pending());
        for _ in 0..10 {
            clock.advance(40);
            assert!(!sup.service(&mut hw, clock.peek()));
        }
        assert!(hw.has_fired());
        assert_eq!(sup.since_last_reset(clock.peek()), None);
    }
}
