//! Client sessions to downstream devices.
//!
//! A [`ModularClient`] pins a full address path to the channel its first
//! hop resolves to. At most one session exists per channel, so a channel
//! never has two requests in flight.

use mdb_common::channel::ChannelId;
use mdb_common::consts::ADDRESS_ARRAY_LENGTH_MAX;
use mdb_common::types::{Address, AddressPath, address_path};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::debug;

use crate::forward::RoutingError;
use crate::registry::StreamRegistry;

/// Client management errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The address path does not resolve.
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// Another client already owns the channel.
    #[error("channel {0} already has a client")]
    ChannelBusy(ChannelId),

    /// More hops than an address path holds.
    #[error("address path has more than {max} hops")]
    PathTooLong { max: usize },

    /// All client slots are taken.
    #[error("client table full ({capacity} entries)")]
    Full { capacity: usize },

    /// No client at this index.
    #[error("no client at index {0}")]
    NotFound(usize),
}

/// Session to a device reachable by `address`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModularClient {
    address: AddressPath,
    channel: ChannelId,
}

impl ModularClient {
    /// Full address path, first hop first.
    pub fn address(&self) -> &[Address] {
        &self.address
    }

    /// Channel the first hop resolved to.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }
}

/// Fixed-capacity client table.
#[derive(Debug, Clone, Default)]
pub struct ClientTable<const N: usize> {
    clients: heapless::Vec<ModularClient, N>,
}

impl<const N: usize> ClientTable<N> {
    pub const fn new() -> Self {
        Self {
            clients: heapless::Vec::new(),
        }
    }

    /// Open a session to `path`.
    ///
    /// # Errors
    /// - `Routing` if the path is empty or its first hop is not registered
    /// - `ChannelBusy` if the first hop's channel already has a client
    /// - `PathTooLong` if the path does not fit an [`AddressPath`]
    /// - `Full` if every slot is taken
    pub fn create<const R: usize>(
        &mut self,
        registry: &StreamRegistry<R>,
        path: &[Address],
    ) -> Result<usize, ClientError> {
        let &first = path.first().ok_or(RoutingError::EmptyPath)?;
        let channel = registry
            .lookup_by_address(first)
            .and_then(|idx| registry.get(idx))
            .map(|stream| stream.channel_id())
            .ok_or(RoutingError::UnknownAddress(first))?;
        if self.clients.iter().any(|c| c.channel == channel) {
            return Err(ClientError::ChannelBusy(channel));
        }
        let address = address_path(path).ok_or(ClientError::PathTooLong {
            max: ADDRESS_ARRAY_LENGTH_MAX,
        })?;

        self.clients
            .push(ModularClient { address, channel })
            .map_err(|_| ClientError::Full { capacity: N })?;
        debug!("Client {:?} opened on {}", path, channel);
        Ok(self.clients.len() - 1)
    }

    /// Close the session at `index`. Later indices shift down by one.
    pub fn remove(&mut self, index: usize) -> Result<ModularClient, ClientError> {
        if index >= self.clients.len() {
            return Err(ClientError::NotFound(index));
        }
        let client = self.clients.remove(index);
        debug!("Client {:?} closed", client.address());
        Ok(client)
    }

    pub fn get(&self, index: usize) -> Option<&ModularClient> {
        self.clients.get(index)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModularClient> {
        self.clients.iter()
    }

    /// `getClientInfo` document: one entry per client, with the display
    /// name of the stream its first hop resolves to. `stream` is left out
    /// when the channel is not registered.
    pub fn info<const R: usize>(&self, registry: &StreamRegistry<R>) -> Value {
        self.clients
            .iter()
            .map(|client| {
                let mut entry = Map::new();
                if let Some(stream) = registry
                    .lookup_by_channel(client.channel)
                    .and_then(|idx| registry.get(idx))
                {
                    entry.insert("stream".into(), json!(stream.name()));
                }
                entry.insert("address".into(), json!(client.address()));
                Value::Object(entry)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::sim::{SimChannel, SimClock};

    fn registry() -> StreamRegistry<3> {
        let clock = SimClock::new();
        let mut reg = StreamRegistry::new();
        for (id, address, name) in [(1, 1, "east"), (2, 2, "west")] {
            let (ch, _) = SimChannel::new(ChannelId(id), &clock);
            reg.register_client(Box::new(ch), address, name).unwrap();
        }
        reg
    }

    #[test]
    fn create_resolves_first_hop() {
        let reg = registry();
        let mut clients = ClientTable::<3>::new();
        let idx = clients.create(&reg, &[2, 5]).unwrap();
        let client = clients.get(idx).unwrap();
        assert_eq!(client.address(), &[2, 5]);
        assert_eq!(client.channel(), ChannelId(2));
    }

    #[test]
    fn create_rejects_unknown_and_empty() {
        let reg = registry();
        let mut clients = ClientTable::<3>::new();
        assert_eq!(
            clients.create(&reg, &[7]),
            Err(ClientError::Routing(RoutingError::UnknownAddress(7)))
        );
        assert_eq!(
            clients.create(&reg, &[]),
            Err(ClientError::Routing(RoutingError::EmptyPath))
        );
        assert!(clients.is_empty());
    }

    #[test]
    fn one_client_per_channel() {
        let reg = registry();
        let mut clients = ClientTable::<3>::new();
        clients.create(&reg, &[1]).unwrap();
        assert_eq!(
            clients.create(&reg, &[1, 4]),
            Err(ClientError::ChannelBusy(ChannelId(1)))
        );
        clients.remove(0).unwrap();
        assert!(clients.create(&reg, &[1, 4]).is_ok());
    }

    #[test]
    fn remove_out_of_range() {
        let mut clients = ClientTable::<3>::new();
        assert_eq!(clients.remove(0), Err(ClientError::NotFound(0)));
    }

    #[test]
    fn info_names_streams() {
        let reg = registry();
        let mut clients = ClientTable::<3>::new();
        clients.create(&reg, &[1]).unwrap();
        clients.create(&reg, &[2, 9]).unwrap();
        assert_eq!(
            clients.info(&reg),
            json!([
                {"stream": "east", "address": [1]},
                {"stream": "west", "address": [2, 9]},
            ])
        );
    }

    #[test]
    fn info_omits_unresolved_stream() {
        let reg = registry();
        let mut clients = ClientTable::<3>::new();
        clients.create(&reg, &[1]).unwrap();
        assert_eq!(
            clients.info(&StreamRegistry::<3>::new()),
            json!([{"address": [1]}])
        );
    }
}
