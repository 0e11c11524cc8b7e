//! Serial tty channel.
//!
//! Opens the device non-blocking and switches it to raw mode, so `read()`
//! returns immediately with whatever bytes the UART has buffered.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use mdb_common::channel::{Channel, ChannelError, ChannelId};
use nix::sys::termios::{self, BaudRate, SetArg};
use tracing::info;

/// A tty bound as a [`Channel`].
pub struct SerialChannel {
    id: ChannelId,
    path: PathBuf,
    file: File,
    write_timeout: Duration,
}

impl SerialChannel {
    /// Open `path` as channel `id` at `baud`.
    ///
    /// # Errors
    /// Returns `ChannelError::Io` if the device cannot be opened or
    /// configured, or the baud rate is unsupported.
    pub fn open(
        id: ChannelId,
        path: &Path,
        baud: u32,
        write_timeout_ms: u64,
    ) -> Result<Self, ChannelError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(path)
            .map_err(|e| ChannelError::Io(format!("{}: {e}", path.display())))?;

        let errno = |e: nix::Error| ChannelError::Io(format!("{}: {e}", path.display()));
        let mut tio = termios::tcgetattr(&file).map_err(errno)?;
        termios::cfmakeraw(&mut tio);
        termios::cfsetspeed(&mut tio, baud_rate(baud)?).map_err(errno)?;
        termios::tcsetattr(&file, SetArg::TCSANOW, &tio).map_err(errno)?;

        info!("Opened serial channel {} at {} ({} baud)", id, path.display(), baud);
        Ok(Self {
            id,
            path: path.to_path_buf(),
            file,
            write_timeout: Duration::from_millis(write_timeout_ms),
        })
    }

    /// Device path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn baud_rate(baud: u32) -> Result<BaudRate, ChannelError> {
    Ok(match baud {
        9_600 => BaudRate::B9600,
        19_200 => BaudRate::B19200,
        38_400 => BaudRate::B38400,
        57_600 => BaudRate::B57600,
        115_200 => BaudRate::B115200,
        230_400 => BaudRate::B230400,
        460_800 => BaudRate::B460800,
        other => return Err(ChannelError::Io(format!("unsupported baud rate {other}"))),
    })
}

impl Channel for SerialChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        match self.file.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => Ok(0),
            Err(e) => Err(ChannelError::Io(e.to_string())),
        }
    }

    fn write_all(&mut self, mut bytes: &[u8]) -> Result<(), ChannelError> {
        let deadline = Instant::now() + self.write_timeout;
        while !bytes.is_empty() {
            match self.file.write(bytes) {
                Ok(0) => return Err(ChannelError::Disconnected(self.id)),
                Ok(n) => bytes = &bytes[n..],
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                    if Instant::now() >= deadline {
                        return Err(ChannelError::Io(format!(
                            "write timeout on {}",
                            self.path.display()
                        )));
                    }
                    std::hint::spin_loop();
                }
                Err(e) => return Err(ChannelError::Io(e.to_string())),
            }
        }
        Ok(())
    }
}
