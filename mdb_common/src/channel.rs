//! Serial channel trait and error types.
//!
//! A [`Channel`] is one physical serial endpoint bound at initialization.
//! The dispatch loop polls every channel once per iteration, so both
//! operations must return promptly:
//!
//! | Operation | Contract |
//! |-----------|----------|
//! | `read()`  | Non-blocking. Returns `Ok(0)` when no byte is pending. |
//! | `write_all()` | Bounded by the channel's serial timeout. |

use std::fmt;
use thiserror::Error;

/// Hardware handle identifying a physical channel (e.g. UART index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u8);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// Error types for channel I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Underlying device read/write failed.
    #[error("channel I/O error: {0}")]
    Io(String),

    /// The peer end of the channel is gone.
    #[error("channel {0} disconnected")]
    Disconnected(ChannelId),
}

/// A byte-oriented serial endpoint.
pub trait Channel {
    /// Hardware handle of this channel. Stable for the channel's lifetime.
    fn id(&self) -> ChannelId;

    /// Read whatever bytes are pending into `buf` without blocking.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError>;

    /// Write all of `bytes` to the channel.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ChannelError>;
}

impl<T: Channel + ?Sized> Channel for Box<T> {
    fn id(&self) -> ChannelId {
        (**self).id()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        (**self).read(buf)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        (**self).write_all(bytes)
    }
}

/// Owned, type-erased channel as stored in the stream registry.
pub type BoxedChannel = Box<dyn Channel>;
