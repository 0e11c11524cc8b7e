//! Request forwarding tests.
//!
//! A device with two client streams, "east" (address 1) and "west"
//! (address 2), each backed by a simulated downstream device. Covers:
//!
//! - Relaying a single response from the first hop
//! - Nested multi-hop payloads
//! - Unknown addresses rejected before any I/O
//! - The bounded wait for a silent device
//! - Late replies never taken as the answer to a later request
//! - Watchdog and primary channel servicing while a forward waits
//! - Client sessions

use mdb_common::channel::ChannelId;
use mdb_common::config::DeviceConfig;
use mdb_common::watchdog::HardwareWatchdog;
use mdb_device::client::ClientError;
use mdb_device::drivers::sim::{SimChannel, SimClock, SimHandle, SimWatchdog};
use mdb_device::{DeviceBuilder, ModularDevice, RoutingError};
use serde_json::json;

type Device = ModularDevice<SimWatchdog<SimClock>, SimClock>;

// ─── Helpers ────────────────────────────────────────────────────────

struct Rig {
    device: Device,
    clock: SimClock,
    watchdog: SimWatchdog<SimClock>,
    primary: SimHandle,
    east: SimHandle,
    west: SimHandle,
}

/// Boot a device whose clock advances 1 ms per reading.
fn rig() -> Rig {
    let clock = SimClock::with_auto_advance(1);
    let watchdog = SimWatchdog::new(clock.clone());
    let (primary, primary_h) = SimChannel::new(ChannelId(0), &clock);
    let (east, east_h) = SimChannel::new(ChannelId(1), &clock);
    let (west, west_h) = SimChannel::new(ChannelId(2), &clock);

    let device = DeviceBuilder::new(
        DeviceConfig::default(),
        Box::new(primary),
        watchdog.clone(),
        clock.clone(),
    )
    .client_stream(Box::new(east), 1, "east")
    .client_stream(Box::new(west), 2, "west")
    .build()
    .expect("boot");

    Rig {
        device,
        clock,
        watchdog,
        primary: primary_h,
        east: east_h,
        west: west_h,
    }
}

// ─── Relaying ───────────────────────────────────────────────────────

#[test]
fn test_forward_to_east_relays_pong() {
    let mut rig = rig();
    rig.east
        .set_responder(100, |_| Some(json!({"cmd": "pong"})));
    rig.primary
        .push_message(&json!(["forwardToAddress", [1], {"cmd": "ping"}]));

    rig.device.update();

    assert_eq!(rig.east.take_sent(), vec![json!({"cmd": "ping"})]);
    assert!(rig.west.take_sent().is_empty());
    assert_eq!(
        rig.primary.take_sent(),
        vec![json!({"id": "forwardToAddress", "result": {"cmd": "pong"}})]
    );
}

#[test]
fn test_multi_hop_path_nests_remaining_hops() {
    let mut rig = rig();
    rig.west
        .set_responder(10, |msg| Some(json!({"id": msg[0].clone(), "result": 1234})));

    let resp = rig.device.forward(&[2, 9, 4], &json!(["getTime"])).unwrap();

    assert_eq!(resp, json!({"id": "forwardToAddress", "result": 1234}));
    assert_eq!(
        rig.west.take_sent(),
        vec![json!(["forwardToAddress", [9, 4], ["getTime"]])]
    );
}

#[test]
fn test_request_from_client_stream_answered_on_that_stream() {
    let mut rig = rig();
    rig.east
        .set_responder(5, |msg| Some(json!({"id": msg[0].clone(), "result": "east-ok"})));
    rig.west
        .push_message(&json!({"id": 77, "method": "forwardToAddress", "params": [[1], ["now"]]}));

    rig.device.update();

    assert!(rig.primary.take_sent().is_empty());
    assert_eq!(
        rig.west.take_sent(),
        vec![json!({"id": 77, "result": {"id": "now", "result": "east-ok"}})]
    );
}

// ─── Errors ─────────────────────────────────────────────────────────

#[test]
fn test_unknown_address_is_rejected_without_io() {
    let mut rig = rig();
    rig.primary
        .push_message(&json!(["forwardToAddress", [3], {"cmd": "ping"}]));

    rig.device.update();

    let sent = rig.primary.take_sent();
    assert_eq!(sent[0]["error"]["code"], -32000);
    assert!(
        sent[0]["error"]["data"]
            .as_str()
            .is_some_and(|d| d.contains("address 3")),
        "unexpected error: {}",
        sent[0]
    );
    assert!(rig.east.take_sent().is_empty());
    assert!(rig.west.take_sent().is_empty());
}

#[test]
fn test_invalid_address_parameter() {
    let mut rig = rig();
    rig.primary
        .push_message(&json!(["forwardToAddress", [], {"cmd": "ping"}]));
    rig.primary
        .push_message(&json!(["forwardToAddress", [1]]));

    rig.device.update();
    rig.device.update();

    let sent = rig.primary.take_sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|r| r["error"]["code"] == -32602));
    assert!(rig.east.take_sent().is_empty());
}

#[test]
fn test_silent_device_times_out_within_bound() {
    let mut rig = rig();
    let start = rig.clock.peek();

    let err = rig
        .device
        .forward(&[1], &json!({"cmd": "ping"}))
        .unwrap_err();
    let elapsed = rig.clock.peek() - start;

    assert_eq!(err, RoutingError::Timeout { timeout_ms: 300 });
    assert!(
        (300..320).contains(&elapsed),
        "forward took {elapsed}ms"
    );
}

#[test]
fn test_timeout_reported_to_requester() {
    let mut rig = rig();
    rig.primary
        .push_message(&json!({"id": 5, "method": "forwardToAddress", "params": [[2], ["now"]]}));

    rig.device.update();

    let sent = rig.primary.take_sent();
    assert_eq!(sent[0]["id"], 5);
    assert_eq!(sent[0]["error"]["code"], -32000);
    assert_eq!(rig.west.take_sent(), vec![json!(["now"])]);
}

#[test]
fn test_late_reply_not_taken_for_next_request() {
    let mut rig = rig();
    rig.east
        .set_responder(350, |msg| Some(json!({"id": msg[0].clone(), "result": msg[0].clone()})));

    let first = rig.device.forward(&[1], &json!(["getTime"]));
    assert_eq!(first, Err(RoutingError::Timeout { timeout_ms: 300 }));

    // The reply to getTime is still in flight when the next forward starts.
    rig.east
        .set_responder(10, |msg| Some(json!({"id": msg[0].clone(), "result": msg[0].clone()})));
    let second = rig.device.forward(&[1], &json!(["now"])).unwrap();
    assert_eq!(second, json!({"id": "now", "result": "now"}));

    // Nothing is left behind to be answered on the next cycle.
    rig.east.take_sent();
    rig.device.update();
    assert!(rig.east.take_sent().is_empty());
}

#[test]
fn test_stray_reply_on_client_stream_not_answered() {
    let mut rig = rig();
    rig.east
        .push_message(&json!({"id": "getTime", "result": 1000}));
    rig.west
        .push_message(&json!({"id": 4, "error": {"code": -32000, "message": "Server error"}}));

    rig.device.update();
    rig.device.update();

    assert!(rig.east.take_sent().is_empty());
    assert!(rig.west.take_sent().is_empty());
    assert_eq!(rig.device.stats().requests, 0);
}

// ─── Servicing while waiting ────────────────────────────────────────

#[test]
fn test_watchdog_serviced_while_forward_waits() {
    let mut rig = rig();
    let feeds_before = rig.watchdog.feeds();

    // Start waiting shortly before the next re-arm is due.
    rig.clock.advance(450);
    let _ = rig.device.forward(&[1], &json!(["now"]));

    assert_eq!(rig.watchdog.feeds(), feeds_before + 1);
    assert!(!rig.watchdog.has_fired());
    let since = rig
        .device
        .watchdog()
        .since_last_reset(rig.clock.peek())
        .unwrap();
    assert!(since < 300, "last re-arm {since}ms ago");
}

#[test]
fn test_primary_request_buffered_during_forward() {
    let mut rig = rig();
    rig.east
        .set_responder(200, |msg| Some(json!({"id": msg[0].clone(), "result": "late"})));
    rig.primary
        .push_message(&json!(["forwardToAddress", [1], ["now"]]));
    rig.primary.push_message_after(50, &json!(["getDeviceId"]));

    rig.device.update();
    let first = rig.primary.take_sent();
    assert_eq!(
        first,
        vec![json!({"id": "forwardToAddress", "result": {"id": "now", "result": "late"}})]
    );

    rig.device.update();
    let second = rig.primary.take_sent();
    assert_eq!(second[0]["id"], "getDeviceId");
}

// ─── Clients ────────────────────────────────────────────────────────

#[test]
fn test_call_client_uses_full_path() {
    let mut rig = rig();
    rig.east
        .set_responder(20, |msg| Some(json!({"id": msg[0].clone(), "result": msg.clone()})));

    let idx = rig.device.create_client(&[1, 6]).unwrap();
    let resp = rig.device.call_client(idx, &json!(["getTime"])).unwrap();

    assert_eq!(
        resp,
        json!({"id": "forwardToAddress", "result": ["forwardToAddress", [6], ["getTime"]]})
    );
}

#[test]
fn test_second_client_on_same_channel_rejected() {
    let mut rig = rig();
    rig.device.create_client(&[1]).unwrap();
    assert_eq!(
        rig.device.create_client(&[1, 2]),
        Err(ClientError::ChannelBusy(ChannelId(1)))
    );
    rig.device.remove_client(0).unwrap();
    assert!(rig.device.create_client(&[1, 2]).is_ok());
}

#[test]
fn test_call_missing_client() {
    let mut rig = rig();
    assert_eq!(
        rig.device.call_client(0, &json!(["now"])),
        Err(ClientError::NotFound(0))
    );
}
