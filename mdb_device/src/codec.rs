//! Newline-delimited JSON message codec.
//!
//! Each channel owns one [`JsonStream`]: a fixed-capacity receive buffer
//! that accumulates bytes across loop iterations and yields one complete
//! message at a time. A message longer than the buffer is dropped up to
//! its terminating newline and reported once as [`CodecError::Overflow`].
//!
//! [`MessageStream`] binds a codec to the channel it decodes, so the two
//! can be polled and written as a unit.

use mdb_common::channel::{BoxedChannel, Channel, ChannelError, ChannelId};
use mdb_common::consts::MESSAGE_BUFFER_LEN;
use serde_json::Value;
use thiserror::Error;

/// Bytes requested from a channel per read call.
const READ_CHUNK: usize = 64;

/// Message framing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The underlying channel failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// A complete line was received but is not valid JSON.
    #[error("malformed message: {0}")]
    Parse(String),

    /// A message exceeded the receive buffer and was discarded.
    #[error("message exceeds {capacity}-byte receive buffer")]
    Overflow { capacity: usize },

    /// An outbound message could not be encoded.
    #[error("failed to encode message: {0}")]
    Serialize(String),
}

/// Fixed-capacity line decoder for JSON messages.
#[derive(Debug)]
pub struct JsonStream<const CAP: usize = MESSAGE_BUFFER_LEN> {
    buf: heapless::Vec<u8, CAP>,
    /// Dropping bytes of an overlong message until its newline.
    discarding: bool,
    /// An overflow happened and has not been reported yet.
    overflowed: bool,
}

impl<const CAP: usize> JsonStream<CAP> {
    /// Create an empty decoder.
    pub const fn new() -> Self {
        Self {
            buf: heapless::Vec::new(),
            discarding: false,
            overflowed: false,
        }
    }

    /// Number of buffered, not yet decoded bytes.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drain pending bytes from `channel` into the receive buffer.
    ///
    /// Never blocks and never reads more than `CAP` bytes per call, so a
    /// chatty peer cannot stall the loop.
    pub fn fill(&mut self, channel: &mut dyn Channel) -> Result<usize, ChannelError> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut total = 0;

        loop {
            let free = CAP - self.buf.len();
            if free == 0 {
                if self.buf.contains(&b'\n') {
                    break;
                }
                self.buf.clear();
                self.discarding = true;
                self.overflowed = true;
                continue;
            }
            if total >= CAP {
                break;
            }

            let want = free.min(READ_CHUNK);
            let n = channel.read(&mut chunk[..want])?;
            if n == 0 {
                break;
            }
            total += n;

            for &byte in &chunk[..n] {
                if self.discarding {
                    if byte == b'\n' {
                        self.discarding = false;
                    }
                    continue;
                }
                // n <= free, so this cannot overflow.
                let _ = self.buf.push(byte);
            }
        }

        Ok(total)
    }

    /// Decode the next complete message already in the buffer.
    pub fn next_message(&mut self) -> Result<Option<Value>, CodecError> {
        if self.overflowed {
            self.overflowed = false;
            return Err(CodecError::Overflow { capacity: CAP });
        }

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let parsed = {
                let line = self.buf[..pos].trim_ascii();
                (!line.is_empty()).then(|| serde_json::from_slice::<Value>(line))
            };
            self.consume(pos + 1);

            match parsed {
                None => continue,
                Some(Ok(message)) => return Ok(Some(message)),
                Some(Err(e)) => return Err(CodecError::Parse(e.to_string())),
            }
        }
        Ok(None)
    }

    /// Return the next message, reading from `channel` if none is buffered.
    pub fn poll(&mut self, channel: &mut dyn Channel) -> Result<Option<Value>, CodecError> {
        if let Some(message) = self.next_message()? {
            return Ok(Some(message));
        }
        self.fill(channel)?;
        self.next_message()
    }

    /// Encode `message` as one line and write it to `channel`.
    pub fn send(&self, channel: &mut dyn Channel, message: &Value) -> Result<(), CodecError> {
        let mut bytes =
            serde_json::to_vec(message).map_err(|e| CodecError::Serialize(e.to_string()))?;
        bytes.push(b'\n');
        channel.write_all(&bytes)?;
        Ok(())
    }

    fn consume(&mut self, n: usize) {
        let len = self.buf.len();
        self.buf.copy_within(n..len, 0);
        self.buf.truncate(len - n);
    }
}

impl<const CAP: usize> Default for JsonStream<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

/// A channel together with the codec decoding its byte stream.
pub struct MessageStream {
    channel: BoxedChannel,
    codec: JsonStream,
}

impl MessageStream {
    /// Bind a fresh codec to `channel`.
    pub fn new(channel: BoxedChannel) -> Self {
        Self {
            channel,
            codec: JsonStream::new(),
        }
    }

    /// Hardware handle of the bound channel.
    pub fn id(&self) -> ChannelId {
        self.channel.id()
    }

    /// Next complete inbound message, if any.
    pub fn poll(&mut self) -> Result<Option<Value>, CodecError> {
        self.codec.poll(&mut *self.channel)
    }

    /// Buffer pending bytes without decoding them.
    pub fn pump(&mut self) -> Result<usize, ChannelError> {
        self.codec.fill(&mut *self.channel)
    }

    /// Write one message.
    pub fn send(&mut self, message: &Value) -> Result<(), CodecError> {
        self.codec.send(&mut *self.channel, message)
    }

    /// Direct access to the bound channel.
    pub fn channel_mut(&mut self) -> &mut dyn Channel {
        &mut *self.channel
    }
}

impl std::fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStream")
            .field("channel", &self.channel.id())
            .field("buffered", &self.codec.buffered())
            .finish()
    }
}
