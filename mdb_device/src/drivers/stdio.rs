//! Terminal channel: stdin in, stdout out.
//!
//! A reader thread forwards stdin in chunks over an mpsc queue, so
//! `read()` only ever does a `try_recv` and never blocks the loop.

use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use mdb_common::channel::{Channel, ChannelError, ChannelId};
use tracing::debug;

/// Stdin/stdout bound as a [`Channel`].
pub struct StdioChannel {
    id: ChannelId,
    rx: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
    closed: bool,
}

impl StdioChannel {
    /// Start the stdin reader thread.
    pub fn spawn(id: ChannelId) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut lock = stdin.lock();
            let mut line = Vec::new();
            loop {
                line.clear();
                match lock.read_until(b'\n', &mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if tx.send(line.clone()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Self::from_receiver(id, rx)
    }

    fn from_receiver(id: ChannelId, rx: Receiver<Vec<u8>>) -> Self {
        Self {
            id,
            rx,
            pending: VecDeque::new(),
            closed: false,
        }
    }
}

impl Channel for StdioChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        while !self.closed && self.pending.len() < buf.len() {
            match self.rx.try_recv() {
                Ok(chunk) => self.pending.extend(chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("stdin closed");
                    self.closed = true;
                }
            }
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(bytes)
            .and_then(|()| stdout.flush())
            .map_err(|e| ChannelError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_drains_queued_chunks_without_blocking() {
        let (tx, rx) = mpsc::channel();
        let mut ch = StdioChannel::from_receiver(ChannelId(0), rx);
        let mut buf = [0u8; 8];
        assert_eq!(ch.read(&mut buf).unwrap(), 0);

        tx.send(b"[\"now\"]\n".to_vec()).unwrap();
        let n = ch.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"[\"now\"]\n");
    }

    #[test]
    fn read_splits_chunks_larger_than_buffer() {
        let (tx, rx) = mpsc::channel();
        let mut ch = StdioChannel::from_receiver(ChannelId(0), rx);
        tx.send(b"abcdef".to_vec()).unwrap();
        drop(tx);

        let mut buf = [0u8; 4];
        assert_eq!(ch.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(ch.read(&mut buf).unwrap(), 2);
        assert_eq!(ch.read(&mut buf).unwrap(), 0);
    }
}
