//! Stream registry: addressable client streams.
//!
//! Built at startup from the stream table. Immutable after construction:
//! there is no removal and entries never move, so indices handed out by
//! the lookups stay valid for the device's lifetime. Lookups are a linear
//! scan over at most `N` entries, no heap allocation.

use mdb_common::channel::{BoxedChannel, ChannelId};
use mdb_common::types::Address;
use thiserror::Error;
use tracing::{debug, warn};

use crate::client_stream::ClientStream;

/// Boot-time registration errors. Fatal: the table is fixed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Another stream already owns this address.
    #[error("stream address {0} is already registered")]
    DuplicateAddress(Address),

    /// Another stream already wraps this channel.
    #[error("channel {0} is already registered")]
    DuplicateChannel(ChannelId),

    /// All `capacity` slots are taken.
    #[error("stream registry full ({capacity} entries)")]
    Full { capacity: usize },

    /// Display name longer than the fixed name buffer.
    #[error("stream name '{0}' does not fit the name buffer")]
    NameTooLong(String),
}

/// Fixed-capacity table of client streams.
#[derive(Debug)]
pub struct StreamRegistry<const N: usize> {
    streams: heapless::Vec<ClientStream, N>,
}

impl<const N: usize> StreamRegistry<N> {
    /// Create an empty registry.
    pub const fn new() -> Self {
        Self {
            streams: heapless::Vec::new(),
        }
    }

    /// Register `channel` under `address` and `name`.
    ///
    /// # Errors
    /// Returns an error if the address or channel is already registered,
    /// the name does not fit, or the table is full.
    pub fn register_client(
        &mut self,
        channel: BoxedChannel,
        address: Address,
        name: &str,
    ) -> Result<usize, RegistryError> {
        if self.lookup_by_address(address).is_some() {
            return Err(RegistryError::DuplicateAddress(address));
        }
        let channel_id = channel.id();
        if self.lookup_by_channel(channel_id).is_some() {
            return Err(RegistryError::DuplicateChannel(channel_id));
        }
        let stream = ClientStream::new(channel, address, name)
            .ok_or_else(|| RegistryError::NameTooLong(name.to_string()))?;

        self.streams
            .push(stream)
            .map_err(|_| RegistryError::Full { capacity: N })?;

        debug!(
            "Registered client stream '{}' (address {}, {})",
            name, address, channel_id
        );
        Ok(self.streams.len() - 1)
    }

    /// Index of the stream registered under `address`.
    pub fn lookup_by_address(&self, address: Address) -> Option<usize> {
        self.streams.iter().position(|s| *s == address)
    }

    /// Index of the stream wrapping channel `id`.
    pub fn lookup_by_channel(&self, id: ChannelId) -> Option<usize> {
        self.streams.iter().position(|s| s.channel_id() == id)
    }

    /// Stream at `index`.
    pub fn get(&self, index: usize) -> Option<&ClientStream> {
        self.streams.get(index)
    }

    /// Mutable stream at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut ClientStream> {
        self.streams.get_mut(index)
    }

    /// Stream registered under `address`.
    pub fn find_mut(&mut self, address: Address) -> Option<&mut ClientStream> {
        self.streams.iter_mut().find(|s| **s == address)
    }

    /// Buffer pending bytes on every stream except `skip`.
    ///
    /// Called while the forwarder waits on one stream, so the others keep
    /// draining their UARTs without dispatching anything.
    pub fn pump_except(&mut self, skip: usize) {
        for (idx, stream) in self.streams.iter_mut().enumerate() {
            if idx == skip {
                continue;
            }
            if let Err(e) = stream.message_stream().pump() {
                warn!("Stream '{}' read failed while pumping: {}", stream.name(), e);
            }
        }
    }

    /// Number of registered streams.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Whether no stream is registered.
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Registered streams in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ClientStream> {
        self.streams.iter()
    }
}

impl<const N: usize> Default for StreamRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::sim::{SimChannel, SimClock};
    use mdb_common::consts::STREAM_NAME_LEN_MAX;

    fn channel(id: u8, clock: &SimClock) -> BoxedChannel {
        Box::new(SimChannel::new(ChannelId(id), clock).0)
    }

    fn east_west() -> StreamRegistry<3> {
        let clock = SimClock::new();
        let mut reg = StreamRegistry::<3>::new();
        reg.register_client(channel(1, &clock), 1, "east").unwrap();
        reg.register_client(channel(2, &clock), 2, "west").unwrap();
        reg
    }

    #[test]
    fn lookup_by_address_finds_registered_streams() {
        let reg = east_west();
        let east = reg.lookup_by_address(1).and_then(|i| reg.get(i)).unwrap();
        assert_eq!(east.name(), "east");
        let west = reg.lookup_by_address(2).and_then(|i| reg.get(i)).unwrap();
        assert_eq!(west.name(), "west");
        assert_eq!(west.address(), 2);
    }

    #[test]
    fn lookup_unregistered_address_is_none() {
        let reg = east_west();
        assert_eq!(reg.lookup_by_address(3), None);
        assert_eq!(reg.lookup_by_address(0), None);
    }

    #[test]
    fn lookup_by_channel() {
        let reg = east_west();
        assert_eq!(reg.lookup_by_channel(ChannelId(2)), Some(1));
        assert_eq!(reg.lookup_by_channel(ChannelId(7)), None);
    }

    #[test]
    fn duplicate_address_rejected() {
        let clock = SimClock::new();
        let mut reg = east_west();
        let err = reg.register_client(channel(3, &clock), 2, "south").unwrap_err();
        assert_eq!(err, RegistryError::DuplicateAddress(2));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn duplicate_channel_rejected() {
        let clock = SimClock::new();
        let mut reg = east_west();
        let err = reg.register_client(channel(1, &clock), 9, "again").unwrap_err();
        assert_eq!(err, RegistryError::DuplicateChannel(ChannelId(1)));
    }

    #[test]
    fn full_registry_rejected() {
        let clock = SimClock::new();
        let mut reg = StreamRegistry::<1>::new();
        reg.register_client(channel(1, &clock), 1, "only").unwrap();
        let err = reg.register_client(channel(2, &clock), 2, "extra").unwrap_err();
        assert_eq!(err, RegistryError::Full { capacity: 1 });
    }

    #[test]
    fn overlong_name_rejected() {
        let clock = SimClock::new();
        let mut reg = StreamRegistry::<1>::new();
        let name = "n".repeat(STREAM_NAME_LEN_MAX + 1);
        assert!(matches!(
            reg.register_client(channel(1, &clock), 1, &name),
            Err(RegistryError::NameTooLong(_))
        ));
    }
}
