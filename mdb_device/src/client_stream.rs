//! Client stream: an addressable, named serial channel.
//!
//! Pairs a [`MessageStream`] with the routing address and display name
//! the stream registry indexes it by.

use mdb_common::channel::{BoxedChannel, ChannelId};
use mdb_common::consts::STREAM_NAME_LEN_MAX;
use mdb_common::types::Address;

use crate::codec::MessageStream;

/// Display name of a stream, bounded at compile time.
pub type StreamName = heapless::String<STREAM_NAME_LEN_MAX>;

/// One registry entry.
#[derive(Debug)]
pub struct ClientStream {
    address: Address,
    name: StreamName,
    stream: MessageStream,
}

impl ClientStream {
    /// Bind `channel` under `address`/`name`. `None` if the name is too long.
    pub fn new(channel: BoxedChannel, address: Address, name: &str) -> Option<Self> {
        let name = StreamName::try_from(name).ok()?;
        Some(Self {
            address,
            name,
            stream: MessageStream::new(channel),
        })
    }

    /// Routing address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hardware handle of the underlying channel.
    pub fn channel_id(&self) -> ChannelId {
        self.stream.id()
    }

    /// Codec bound to the channel.
    pub fn message_stream(&mut self) -> &mut MessageStream {
        &mut self.stream
    }
}

impl PartialEq<Address> for ClientStream {
    fn eq(&self, address: &Address) -> bool {
        self.address == *address
    }
}
