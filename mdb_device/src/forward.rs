//! Request forwarder.
//!
//! Routes a request to a downstream device by address path and relays the
//! single response message back. The first hop is resolved through the
//! stream registry; remaining hops travel inside the payload as a nested
//! `forwardToAddress` call, so each device along the chain only ever
//! resolves one hop.
//!
//! Waiting for the response is a poll-with-deadline loop. Every pass hands
//! control to an idle hook (the device services its watchdog and primary
//! channel there) and drains the other client streams, so a silent
//! downstream device costs at most `timeout_ms` and never starves the loop.
//!
//! Only a message that answers the outgoing request ends the wait. For a
//! request that is a response document carrying the request's id; for an
//! opaque payload it is the first message that is not itself a request.
//! Anything else read from the target stream meanwhile (a late reply to an
//! earlier, timed-out forward, or a request from the peer) is dropped.

use mdb_common::clock::Clock;
use mdb_common::config::ForwardConfig;
use mdb_common::types::Address;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::codec::CodecError;
use crate::registry::StreamRegistry;
use crate::server::{Request, is_request, is_response};

/// Method name used for nested multi-hop forwarding.
pub const FORWARD_TO_ADDRESS: &str = "forwardToAddress";

/// Routing failures. Reported to the requester, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// The address path has no hops.
    #[error("address path is empty")]
    EmptyPath,

    /// No client stream is registered under the first hop.
    #[error("no client stream at address {0}")]
    UnknownAddress(Address),

    /// The downstream device did not answer in time.
    #[error("no response within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// The request could not be written or the response not decoded.
    #[error("transport error: {0}")]
    Transport(#[from] CodecError),
}

/// Bounded-time request relay.
#[derive(Debug, Clone, Copy)]
pub struct RequestForwarder {
    timeout_ms: u64,
}

impl RequestForwarder {
    /// Forwarder waiting at most `config.timeout_ms` per request.
    pub fn new(config: &ForwardConfig) -> Self {
        Self {
            timeout_ms: config.timeout_ms,
        }
    }

    /// Response deadline [ms].
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Payload sent to the first hop: the request itself for a direct
    /// neighbour, otherwise a nested forward carrying the remaining hops.
    pub fn hop_payload(remaining: &[Address], request: &Value) -> Value {
        if remaining.is_empty() {
            request.clone()
        } else {
            json!([FORWARD_TO_ADDRESS, remaining, request])
        }
    }

    /// Whether `message` answers a payload whose reply id is `expected`.
    /// `None` means the payload was not a request and carries no id.
    fn answers(expected: Option<&Value>, message: &Value) -> bool {
        match expected {
            Some(id) => is_response(message) && message.get("id") == Some(id),
            None => !is_request(message),
        }
    }

    /// Send `request` along `path` and wait for one response.
    ///
    /// `idle` is invoked with the current tick on every polling pass.
    ///
    /// # Errors
    /// - `EmptyPath` / `UnknownAddress` immediately, before any I/O
    /// - `Transport` if the request cannot be written or the reply is malformed
    /// - `Timeout` once `timeout_ms` has elapsed without a matching reply
    pub fn forward<const N: usize>(
        &self,
        registry: &mut StreamRegistry<N>,
        path: &[Address],
        request: &Value,
        clock: &dyn Clock,
        idle: &mut dyn FnMut(u64),
    ) -> Result<Value, RoutingError> {
        let (&first, remaining) = path.split_first().ok_or(RoutingError::EmptyPath)?;
        let index = registry
            .lookup_by_address(first)
            .ok_or(RoutingError::UnknownAddress(first))?;

        let payload = Self::hop_payload(remaining, request);
        let expected = is_request(&payload).then(|| Request::id_of(&payload));
        let stream = registry
            .get_mut(index)
            .ok_or(RoutingError::UnknownAddress(first))?;
        debug!(
            "Forwarding to {:?} via '{}' ({} hop(s) remaining)",
            path,
            stream.name(),
            remaining.len()
        );
        stream.message_stream().send(&payload)?;

        let deadline = clock.now_ms().saturating_add(self.timeout_ms);
        loop {
            let now = clock.now_ms();
            idle(now);
            registry.pump_except(index);

            if let Some(stream) = registry.get_mut(index) {
                while let Some(message) = stream.message_stream().poll()? {
                    if Self::answers(expected.as_ref(), &message) {
                        return Ok(message);
                    }
                    debug!("Dropping unmatched message from '{}': {}", stream.name(), message);
                }
            }

            if now >= deadline {
                warn!(
                    "No response from address {} within {}ms",
                    first, self.timeout_ms
                );
                return Err(RoutingError::Timeout {
                    timeout_ms: self.timeout_ms,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::sim::{SimChannel, SimClock, SimHandle};
    use mdb_common::channel::ChannelId;

    fn setup(clock: &SimClock) -> (StreamRegistry<3>, SimHandle, SimHandle) {
        let mut reg = StreamRegistry::<3>::new();
        let (east, east_h) = SimChannel::new(ChannelId(1), clock);
        let (west, west_h) = SimChannel::new(ChannelId(2), clock);
        reg.register_client(Box::new(east), 1, "east").unwrap();
        reg.register_client(Box::new(west), 2, "west").unwrap();
        (reg, east_h, west_h)
    }

    fn forwarder() -> RequestForwarder {
        RequestForwarder::new(&ForwardConfig { timeout_ms: 300 })
    }

    #[test]
    fn hop_payload_nests_remaining_hops() {
        let req = json!(["getTime"]);
        assert_eq!(RequestForwarder::hop_payload(&[], &req), req);
        assert_eq!(
            RequestForwarder::hop_payload(&[4, 7], &req),
            json!(["forwardToAddress", [4, 7], ["getTime"]])
        );
    }

    #[test]
    fn empty_path_rejected() {
        let clock = SimClock::new();
        let (mut reg, _, _) = setup(&clock);
        let err = forwarder()
            .forward(&mut reg, &[], &json!({}), &clock, &mut |_| {})
            .unwrap_err();
        assert_eq!(err, RoutingError::EmptyPath);
    }

    #[test]
    fn unknown_address_rejected_without_io() {
        let clock = SimClock::with_auto_advance(1);
        let (mut reg, east, west) = setup(&clock);
        let err = forwarder()
            .forward(&mut reg, &[3], &json!({"cmd": "ping"}), &clock, &mut |_| {})
            .unwrap_err();
        assert_eq!(err, RoutingError::UnknownAddress(3));
        assert!(east.take_sent().is_empty());
        assert!(west.take_sent().is_empty());
        assert_eq!(clock.peek(), 0);
    }

    #[test]
    fn relays_response_from_first_hop() {
        let clock = SimClock::with_auto_advance(1);
        let (mut reg, east, _) = setup(&clock);
        east.set_responder(100, |_| Some(json!({"cmd": "pong"})));

        let mut idle_calls = 0;
        let resp = forwarder()
            .forward(
                &mut reg,
                &[1],
                &json!({"cmd": "ping"}),
                &clock,
                &mut |_| idle_calls += 1,
            )
            .unwrap();
        assert_eq!(resp, json!({"cmd": "pong"}));
        assert_eq!(east.take_sent(), vec![json!({"cmd": "ping"})]);
        assert!(idle_calls > 0);
    }

    #[test]
    fn multi_hop_sends_nested_forward() {
        let clock = SimClock::with_auto_advance(1);
        let (mut reg, _, west) = setup(&clock);
        west.set_responder(5, |msg| Some(json!({"id": msg[0].clone(), "result": 42})));

        let resp = forwarder()
            .forward(&mut reg, &[2, 9], &json!(["getTime"]), &clock, &mut |_| {})
            .unwrap();
        assert_eq!(resp, json!({"id": "forwardToAddress", "result": 42}));
        assert_eq!(
            west.take_sent(),
            vec![json!(["forwardToAddress", [9], ["getTime"]])]
        );
    }

    #[test]
    fn silent_device_times_out_at_bound() {
        let clock = SimClock::with_auto_advance(1);
        let (mut reg, _, _) = setup(&clock);

        let start = clock.peek();
        let err = forwarder()
            .forward(&mut reg, &[1], &json!({"cmd": "ping"}), &clock, &mut |_| {})
            .unwrap_err();
        let elapsed = clock.peek() - start;

        assert_eq!(err, RoutingError::Timeout { timeout_ms: 300 });
        assert!((300..=302).contains(&elapsed), "elapsed {elapsed}");
    }

    #[test]
    fn other_streams_are_pumped_while_waiting() {
        let clock = SimClock::with_auto_advance(1);
        let (mut reg, east, west) = setup(&clock);
        east.set_responder(20, |msg| Some(json!({"id": msg[0].clone(), "result": "ok"})));
        west.push_message(&json!(["getTime"]));

        forwarder()
            .forward(&mut reg, &[1], &json!(["now"]), &clock, &mut |_| {})
            .unwrap();

        // West's request was buffered, not consumed.
        let west_stream = reg.get_mut(1).unwrap().message_stream();
        assert_eq!(west_stream.poll().unwrap(), Some(json!(["getTime"])));
    }

    #[test]
    fn stale_reply_is_skipped() {
        let clock = SimClock::with_auto_advance(1);
        let (mut reg, east, _) = setup(&clock);
        east.push_message(&json!({"id": "getTime", "result": 1000}));
        east.push_message(&json!(["getTime"]));
        east.set_responder(10, |msg| Some(json!({"id": msg[0].clone(), "result": 7})));

        let resp = forwarder()
            .forward(&mut reg, &[1], &json!(["now"]), &clock, &mut |_| {})
            .unwrap();
        assert_eq!(resp, json!({"id": "now", "result": 7}));
    }

    #[test]
    fn opaque_payload_ignores_peer_requests() {
        let clock = SimClock::with_auto_advance(1);
        let (mut reg, east, _) = setup(&clock);
        east.push_message(&json!(["getTime"]));
        east.set_responder(10, |_| Some(json!({"cmd": "pong"})));

        let resp = forwarder()
            .forward(&mut reg, &[1], &json!({"cmd": "ping"}), &clock, &mut |_| {})
            .unwrap();
        assert_eq!(resp, json!({"cmd": "pong"}));
    }
}
