//! Wall-clock time service.
//!
//! Epoch seconds are derived from the monotonic tick: `set_time` pins an
//! epoch value to the current tick and time then advances with the tick
//! in whole seconds. Time is unset until the first `set_time`.
//!
//! `adjust_time` before `set_time` shifts the implicit zero epoch but does
//! not mark time as set.

use chrono::{DateTime, Datelike, Timelike};
use mdb_common::config::TimeConfig;
use mdb_common::consts::SECONDS_PER_HOUR;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Time service errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimeError {
    /// No absolute time has been set since boot.
    #[error("Time not set")]
    TimeNotSet,

    /// The value cannot be represented as a calendar date.
    #[error("epoch time {0} is out of range")]
    OutOfRange(i64),
}

/// Local calendar time as written to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LocalDateTime {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// Epoch time base plus the time zone offset property.
#[derive(Debug, Clone)]
pub struct TimeService {
    base_epoch_s: i64,
    base_tick_ms: u64,
    is_set: bool,
    time_zone_offset_h: i64,
}

impl TimeService {
    /// Unset time base with the configured default offset.
    pub fn new(config: &TimeConfig) -> Self {
        Self {
            base_epoch_s: 0,
            base_tick_ms: 0,
            is_set: false,
            time_zone_offset_h: config.time_zone_offset,
        }
    }

    /// Set absolute epoch time at tick `now_ms`.
    pub fn set_time(&mut self, epoch_s: i64, now_ms: u64) {
        debug!("Time set to {} at tick {}", epoch_s, now_ms);
        self.base_epoch_s = epoch_s;
        self.base_tick_ms = now_ms;
        self.is_set = true;
    }

    /// Shift the time base by `delta_s` seconds.
    pub fn adjust_time(&mut self, delta_s: i64) {
        self.base_epoch_s = self.base_epoch_s.saturating_add(delta_s);
    }

    /// Whether `set_time` has been called.
    pub fn is_set(&self) -> bool {
        self.is_set
    }

    /// Current epoch seconds.
    pub fn get_time(&self, now_ms: u64) -> Result<i64, TimeError> {
        if !self.is_set {
            return Err(TimeError::TimeNotSet);
        }
        let elapsed_s = now_ms.saturating_sub(self.base_tick_ms) / 1000;
        Ok(self.base_epoch_s.saturating_add(elapsed_s as i64))
    }

    /// Alias of [`get_time`](Self::get_time).
    pub fn now(&self, now_ms: u64) -> Result<i64, TimeError> {
        self.get_time(now_ms)
    }

    /// Current time zone offset [h].
    pub fn time_zone_offset(&self) -> i64 {
        self.time_zone_offset_h
    }

    /// Replace the time zone offset. Range checking belongs to the caller.
    pub fn set_time_zone_offset(&mut self, hours: i64) {
        self.time_zone_offset_h = hours;
    }

    /// Apply the time zone offset to an epoch value.
    pub fn epoch_to_local(&self, epoch_s: i64) -> i64 {
        epoch_s.saturating_add(self.time_zone_offset_h * SECONDS_PER_HOUR)
    }

    /// Decompose `epoch_s` into local calendar fields.
    pub fn local_date_time(&self, epoch_s: i64) -> Result<LocalDateTime, TimeError> {
        let local = self.epoch_to_local(epoch_s);
        let dt = DateTime::from_timestamp(local, 0).ok_or(TimeError::OutOfRange(local))?;
        // chrono's calendar fields are all well below u8::MAX.
        Ok(LocalDateTime {
            year: dt.year(),
            month: dt.month() as u8,
            day: dt.day() as u8,
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
            second: dt.second() as u8,
        })
    }
}
