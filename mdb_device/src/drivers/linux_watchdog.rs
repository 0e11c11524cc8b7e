//! Linux `/dev/watchdog` driver.
//!
//! Dropping the handle without writing the magic close character leaves
//! the timer armed, so a crashed process still ends in a reset.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use mdb_common::watchdog::{HardwareWatchdog, WatchdogError};
use tracing::info;

nix::ioctl_readwrite!(wdioc_settimeout, b'W', 6, libc::c_int);

/// Kernel watchdog device.
pub struct DevWatchdog {
    path: PathBuf,
    file: Option<File>,
}

impl DevWatchdog {
    /// Watchdog at `path`; the device is opened by `enable()`.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            file: None,
        }
    }
}

impl HardwareWatchdog for DevWatchdog {
    fn enable(&mut self, timeout_ms: u64) -> Result<(), WatchdogError> {
        let fail = |reason: String| WatchdogError::EnableFailed { timeout_ms, reason };

        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| fail(format!("{}: {e}", self.path.display())))?;

        // Kernel granularity is whole seconds; round up.
        let mut secs = libc::c_int::try_from(timeout_ms.div_ceil(1000).max(1))
            .map_err(|e| fail(e.to_string()))?;
        // SAFETY: fd is open for the duration of the call and `secs` is a valid c_int.
        unsafe { wdioc_settimeout(file.as_raw_fd(), &mut secs) }.map_err(|e| fail(e.to_string()))?;

        info!("Hardware watchdog {} armed ({} s)", self.path.display(), secs);
        self.file = Some(file);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), WatchdogError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| WatchdogError::Io("watchdog not enabled".to_string()))?;
        file.write_all(b"k")
            .map_err(|e| WatchdogError::Io(e.to_string()))
    }
}
