//! Simulation drivers.
//!
//! In-memory stand-ins for the serial channels, the millisecond tick and
//! the hardware watchdog. Each device-side object has a cloneable host-side
//! view sharing its state, so a test (or the `--simulate` binary) can
//! inject traffic, play a downstream device, move time, and observe
//! whether the watchdog would have reset the unit.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Instant;

use mdb_common::channel::{Channel, ChannelError, ChannelId};
use mdb_common::clock::Clock;
use mdb_common::watchdog::{HardwareWatchdog, WatchdogError};
use serde_json::Value;

// ─── Clock ──────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ClockState {
    now_ms: Cell<u64>,
    step_ms: Cell<u64>,
    /// Real time origin added to `now_ms` when following the wall clock.
    wall_origin: Option<Instant>,
}

/// Shared simulated millisecond clock.
///
/// With a non-zero auto-advance step every [`Clock::now_ms`] call moves
/// time forward, which models time passing while code busy-polls.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    state: Rc<ClockState>,
}

impl SimClock {
    /// Clock frozen at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock that advances `step_ms` on every reading.
    pub fn with_auto_advance(step_ms: u64) -> Self {
        let clock = Self::new();
        clock.set_auto_advance(step_ms);
        clock
    }

    /// Clock following real elapsed time. `advance` still adds an offset.
    pub fn wall() -> Self {
        Self {
            state: Rc::new(ClockState {
                wall_origin: Some(Instant::now()),
                ..ClockState::default()
            }),
        }
    }

    /// Change the auto-advance step.
    pub fn set_auto_advance(&self, step_ms: u64) {
        self.state.step_ms.set(step_ms);
    }

    /// Move time forward.
    pub fn advance(&self, ms: u64) {
        self.state.now_ms.set(self.state.now_ms.get() + ms);
    }

    /// Current time without auto-advancing.
    pub fn peek(&self) -> u64 {
        let offset = self.state.now_ms.get();
        match self.state.wall_origin {
            Some(origin) => offset + origin.elapsed().as_millis() as u64,
            None => offset,
        }
    }
}

impl Clock for SimClock {
    fn now_ms(&self) -> u64 {
        let now = self.peek();
        self.advance(self.state.step_ms.get());
        now
    }
}

// ─── Channel ────────────────────────────────────────────────────────

/// Simulated downstream device: maps each received message to an
/// optional reply, delivered `delay_ms` later.
struct Responder {
    delay_ms: u64,
    respond: Box<dyn FnMut(&Value) -> Option<Value>>,
}

#[derive(Default)]
struct SimLink {
    /// Bytes readable by the device.
    inbound: VecDeque<u8>,
    /// `(ready_at_ms, bytes)` not yet readable.
    delayed: VecDeque<(u64, Vec<u8>)>,
    /// Partial outbound line.
    outbound_line: Vec<u8>,
    /// Complete messages written by the device.
    sent: Vec<Value>,
    responder: Option<Responder>,
    disconnected: bool,
}

impl SimLink {
    fn release_due(&mut self, now_ms: u64) {
        // Preserve order: stop at the first message that is not due yet.
        while self.delayed.front().is_some_and(|(at, _)| *at <= now_ms) {
            if let Some((_, bytes)) = self.delayed.pop_front() {
                self.inbound.extend(bytes);
            }
        }
    }
}

fn line(message: &Value) -> Vec<u8> {
    let mut bytes = message.to_string().into_bytes();
    bytes.push(b'\n');
    bytes
}

/// Device side of a simulated serial link.
pub struct SimChannel {
    id: ChannelId,
    link: Rc<RefCell<SimLink>>,
    clock: SimClock,
}

/// Host side of a simulated serial link.
#[derive(Clone)]
pub struct SimHandle {
    link: Rc<RefCell<SimLink>>,
    clock: SimClock,
}

impl SimChannel {
    /// Create a linked channel/handle pair timed by `clock`.
    pub fn new(id: ChannelId, clock: &SimClock) -> (Self, SimHandle) {
        let link = Rc::new(RefCell::new(SimLink::default()));
        (
            Self {
                id,
                link: Rc::clone(&link),
                clock: clock.clone(),
            },
            SimHandle {
                link,
                clock: clock.clone(),
            },
        )
    }
}

impl Channel for SimChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        let mut link = self.link.borrow_mut();
        if link.disconnected {
            return Err(ChannelError::Disconnected(self.id));
        }
        link.release_due(self.clock.peek());

        let n = buf.len().min(link.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(link.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        let mut link = self.link.borrow_mut();
        if link.disconnected {
            return Err(ChannelError::Disconnected(self.id));
        }
        link.outbound_line.extend_from_slice(bytes);

        let mut responder = link.responder.take();
        while let Some(pos) = link.outbound_line.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = link.outbound_line.drain(..=pos).collect();
            let Ok(message) = serde_json::from_slice::<Value>(raw.trim_ascii()) else {
                continue;
            };
            if let Some(r) = responder.as_mut() {
                if let Some(reply) = (r.respond)(&message) {
                    let at = self.clock.peek() + r.delay_ms;
                    link.delayed.push_back((at, line(&reply)));
                }
            }
            link.sent.push(message);
        }
        link.responder = responder;
        Ok(())
    }
}

impl SimHandle {
    /// Make raw bytes readable immediately.
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.link.borrow_mut().inbound.extend(bytes.iter().copied());
    }

    /// Make one message readable immediately.
    pub fn push_message(&self, message: &Value) {
        self.push_bytes(&line(message));
    }

    /// Make one message readable `delay_ms` from now.
    pub fn push_message_after(&self, delay_ms: u64, message: &Value) {
        let at = self.clock.peek() + delay_ms;
        self.link.borrow_mut().delayed.push_back((at, line(message)));
    }

    /// Messages written by the device since the last call.
    pub fn take_sent(&self) -> Vec<Value> {
        std::mem::take(&mut self.link.borrow_mut().sent)
    }

    /// Play a downstream device answering each message after `delay_ms`.
    pub fn set_responder<F>(&self, delay_ms: u64, respond: F)
    where
        F: FnMut(&Value) -> Option<Value> + 'static,
    {
        self.link.borrow_mut().responder = Some(Responder {
            delay_ms,
            respond: Box::new(respond),
        });
    }

    /// Remove the simulated downstream device; writes go unanswered.
    pub fn clear_responder(&self) {
        self.link.borrow_mut().responder = None;
    }

    /// Fail all further reads and writes on the device side.
    pub fn disconnect(&self) {
        self.link.borrow_mut().disconnected = true;
    }
}

// ─── Watchdog ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct WatchdogState {
    timeout_ms: Option<u64>,
    last_feed_ms: u64,
    feeds: u64,
    fired: bool,
}

/// Software watchdog timed by an injected clock.
///
/// Clones share state, so a test keeps one clone to inspect while the
/// device owns another.
#[derive(Debug, Clone)]
pub struct SimWatchdog<K: Clock + Clone> {
    clock: K,
    state: Rc<RefCell<WatchdogState>>,
}

impl<K: Clock + Clone> SimWatchdog<K> {
    /// Disabled watchdog reading time from `clock`.
    pub fn new(clock: K) -> Self {
        Self {
            clock,
            state: Rc::new(RefCell::new(WatchdogState::default())),
        }
    }

    /// Number of successful re-arms.
    pub fn feeds(&self) -> u64 {
        self.state.borrow().feeds
    }

    /// Tick of the last successful re-arm.
    pub fn last_feed_ms(&self) -> u64 {
        self.state.borrow().last_feed_ms
    }

    fn check_expiry(&self, now_ms: u64) -> bool {
        let mut state = self.state.borrow_mut();
        if let Some(timeout) = state.timeout_ms {
            if now_ms.saturating_sub(state.last_feed_ms) >= timeout {
                state.fired = true;
            }
        }
        state.fired
    }
}

impl<K: Clock + Clone> HardwareWatchdog for SimWatchdog<K> {
    fn enable(&mut self, timeout_ms: u64) -> Result<(), WatchdogError> {
        if timeout_ms == 0 {
            return Err(WatchdogError::EnableFailed {
                timeout_ms,
                reason: "timeout must be non-zero".to_string(),
            });
        }
        let now = self.clock.now_ms();
        let mut state = self.state.borrow_mut();
        state.timeout_ms = Some(timeout_ms);
        state.last_feed_ms = now;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), WatchdogError> {
        let now = self.clock.now_ms();
        // A feed after expiry is too late: the unit has already reset.
        if self.check_expiry(now) {
            return Ok(());
        }
        let mut state = self.state.borrow_mut();
        state.last_feed_ms = now;
        state.feeds += 1;
        Ok(())
    }

    fn has_fired(&self) -> bool {
        self.check_expiry(self.clock.now_ms())
    }
}
