//! Device core: the cooperative dispatch loop.
//!
//! `ModularDevice` owns every channel, the stream registry, the watchdog
//! supervisor and the time service. One call to [`ModularDevice::update`]
//! is one loop iteration:
//!
//! 1. service the watchdog
//! 2. poll the primary channel, dispatch at most one request, reply on it
//! 3. the same for every registered client stream, in registration order
//!
//! Nothing in an iteration blocks except a forwarded request, which waits
//! at most the forward timeout and keeps servicing the watchdog while it
//! does.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bitflags::bitflags;
use mdb_common::channel::BoxedChannel;
use mdb_common::clock::Clock;
use mdb_common::config::{ConfigError, DeviceConfig};
use mdb_common::consts::CLIENT_STREAM_COUNT;
use mdb_common::types::{Address, DeviceIdentity};
use mdb_common::watchdog::{HardwareWatchdog, WatchdogError};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::{ClientError, ClientTable, ModularClient};
use crate::client_stream::ClientStream;
use crate::codec::{CodecError, MessageStream};
use crate::forward::{RequestForwarder, RoutingError};
use crate::registry::{RegistryError, StreamRegistry};
use crate::server::{ServerError, error_response, is_response};
use crate::time::TimeService;
use crate::watchdog::WatchdogSupervisor;

/// Iterations between loop statistics debug logs.
const STATS_LOG_INTERVAL: u64 = 10_000;

/// Boot errors. Any of these keeps the device from starting.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Watchdog(#[from] WatchdogError),
}

bitflags! {
    /// What happened during one loop iteration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Activity: u8 {
        /// The hardware watchdog was re-armed.
        const WATCHDOG_FED = 1 << 0;
        /// At least one request was answered.
        const REQUEST_HANDLED = 1 << 1;
        /// A channel read or write failed.
        const CHANNEL_ERROR = 1 << 2;
    }
}

/// Why [`ModularDevice::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The running flag was cleared.
    Stopped,
    /// The hardware watchdog expired; on real hardware the unit resets.
    WatchdogExpired,
}

/// Dispatch loop statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Completed iterations.
    pub iterations: u64,
    /// Requests answered on any channel.
    pub requests: u64,
    /// Channel read/write failures.
    pub channel_errors: u64,
    /// Longest iteration [ms].
    pub max_iteration_ms: u64,
    /// Iterations that took at least the watchdog reset interval.
    pub slow_iterations: u64,
}

/// Where a message came from, and where its reply goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Primary,
    Stream(usize),
}

/// Collects channels and settings, then boots a [`ModularDevice`].
pub struct DeviceBuilder<W, K> {
    config: DeviceConfig,
    primary: BoxedChannel,
    hw_watchdog: W,
    clock: K,
    streams: Vec<(BoxedChannel, Address, String)>,
}

impl<W: HardwareWatchdog, K: Clock> DeviceBuilder<W, K> {
    pub fn new(config: DeviceConfig, primary: BoxedChannel, hw_watchdog: W, clock: K) -> Self {
        Self {
            config,
            primary,
            hw_watchdog,
            clock,
            streams: Vec::new(),
        }
    }

    /// Add a client stream to register at boot.
    pub fn client_stream(
        mut self,
        channel: BoxedChannel,
        address: Address,
        name: impl Into<String>,
    ) -> Self {
        self.streams.push((channel, address, name.into()));
        self
    }

    /// Validate the configuration, register the client streams and arm
    /// the watchdog.
    ///
    /// # Errors
    /// Returns the first configuration, registration or watchdog error.
    pub fn build<const N: usize>(self) -> Result<ModularDevice<W, K, N>, DeviceError> {
        let Self {
            config,
            primary,
            mut hw_watchdog,
            clock,
            streams,
        } = self;
        config.validate()?;

        let mut registry = StreamRegistry::<N>::new();
        for (channel, address, name) in streams {
            registry.register_client(channel, address, &name)?;
        }

        let identity = DeviceIdentity {
            name: config.device.name.clone(),
            form_factor: config.device.form_factor.clone(),
            ..DeviceIdentity::default()
        };
        let watchdog = WatchdogSupervisor::arm(&mut hw_watchdog, &config.watchdog, clock.now_ms())?;

        info!(
            "Device '{}' booted: {} client stream(s), forward timeout {}ms",
            identity.name,
            registry.len(),
            config.forward.timeout_ms
        );

        Ok(ModularDevice {
            identity,
            primary: MessageStream::new(primary),
            registry,
            clients: ClientTable::new(),
            watchdog,
            hw_watchdog,
            clock,
            time: TimeService::new(&config.time),
            time_zone_offset_default: config.time.time_zone_offset,
            forwarder: RequestForwarder::new(&config.forward),
            cycle_time: Duration::from_micros(config.device.cycle_time_us),
            stats: LoopStats::default(),
            running: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// A modular device: primary channel, client streams, watchdog, time.
pub struct ModularDevice<W: HardwareWatchdog, K: Clock, const N: usize = CLIENT_STREAM_COUNT> {
    pub(crate) identity: DeviceIdentity,
    pub(crate) primary: MessageStream,
    pub(crate) registry: StreamRegistry<N>,
    pub(crate) clients: ClientTable<N>,
    pub(crate) watchdog: WatchdogSupervisor,
    pub(crate) hw_watchdog: W,
    pub(crate) clock: K,
    pub(crate) time: TimeService,
    pub(crate) time_zone_offset_default: i64,
    forwarder: RequestForwarder,
    /// Pause after an iteration that answered nothing.
    cycle_time: Duration,
    stats: LoopStats,
    running: Arc<AtomicBool>,
}

impl<W: HardwareWatchdog, K: Clock, const N: usize> ModularDevice<W, K, N> {
    /// Run one loop iteration.
    pub fn update(&mut self) -> Activity {
        let started_ms = self.clock.now_ms();
        let mut activity = Activity::empty();

        if self.watchdog.service(&mut self.hw_watchdog, started_ms) {
            activity |= Activity::WATCHDOG_FED;
        }

        activity |= self.service_origin(Origin::Primary);
        for index in 0..self.registry.len() {
            activity |= self.service_origin(Origin::Stream(index));
        }

        let elapsed_ms = self.clock.now_ms().saturating_sub(started_ms);
        self.record_iteration(elapsed_ms, activity);
        activity
    }

    /// Loop until the running flag is cleared or the watchdog expires.
    pub fn run(&mut self) -> RunOutcome {
        info!(
            "Starting dispatch loop (cycle_time={}us)...",
            self.cycle_time.as_micros()
        );
        self.running.store(true, Ordering::SeqCst);

        let outcome = loop {
            if !self.running.load(Ordering::SeqCst) {
                break RunOutcome::Stopped;
            }

            let activity = self.update();

            if self.hw_watchdog.has_fired() {
                warn!("Hardware watchdog expired");
                break RunOutcome::WatchdogExpired;
            }

            if !activity.contains(Activity::REQUEST_HANDLED) && !self.cycle_time.is_zero() {
                std::thread::sleep(self.cycle_time);
            }
        };

        info!(
            "Dispatch loop stopped after {} iterations ({} requests, {} slow)",
            self.stats.iterations, self.stats.requests, self.stats.slow_iterations
        );
        outcome
    }

    /// Request shutdown of the loop.
    pub fn stop(&self) {
        info!("Shutdown requested");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Get the running flag for signal handlers.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Forward `request` along `path` and return the single response.
    ///
    /// The watchdog keeps being serviced and the primary channel keeps
    /// being drained while waiting.
    pub fn forward(&mut self, path: &[Address], request: &Value) -> Result<Value, RoutingError> {
        let Self {
            primary,
            registry,
            watchdog,
            hw_watchdog,
            clock,
            forwarder,
            ..
        } = self;
        let clock: &dyn Clock = &*clock;

        forwarder.forward(registry, path, request, clock, &mut |now_ms| {
            watchdog.service(&mut *hw_watchdog, now_ms);
            if let Err(e) = primary.pump() {
                debug!("Primary channel read failed while forwarding: {}", e);
            }
        })
    }

    /// Open a client session to the device at `path`.
    pub fn create_client(&mut self, path: &[Address]) -> Result<usize, ClientError> {
        self.clients.create(&self.registry, path)
    }

    /// Close the client session at `index`.
    pub fn remove_client(&mut self, index: usize) -> Result<ModularClient, ClientError> {
        self.clients.remove(index)
    }

    /// Send `request` through the client session at `index`.
    pub fn call_client(&mut self, index: usize, request: &Value) -> Result<Value, ClientError> {
        let path = self
            .clients
            .get(index)
            .map(|client| client.address().to_vec())
            .ok_or(ClientError::NotFound(index))?;
        Ok(self.forward(&path, request)?)
    }

    /// Client sessions.
    pub fn clients(&self) -> &ClientTable<N> {
        &self.clients
    }

    /// Registered client streams.
    pub fn registry(&self) -> &StreamRegistry<N> {
        &self.registry
    }

    /// Stop re-arming the watchdog so the unit resets.
    pub fn request_system_reset(&mut self) {
        self.watchdog.request_system_reset();
    }

    pub fn watchdog(&self) -> &WatchdogSupervisor {
        &self.watchdog
    }

    pub fn hw_watchdog(&self) -> &W {
        &self.hw_watchdog
    }

    pub fn time(&self) -> &TimeService {
        &self.time
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Get loop statistics.
    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    fn message_stream(&mut self, origin: Origin) -> Option<&mut MessageStream> {
        match origin {
            Origin::Primary => Some(&mut self.primary),
            Origin::Stream(index) => self.registry.get_mut(index).map(ClientStream::message_stream),
        }
    }

    /// Poll one channel and answer at most one message on it. Response
    /// documents are never answered.
    fn service_origin(&mut self, origin: Origin) -> Activity {
        let Some(polled) = self.message_stream(origin).map(MessageStream::poll) else {
            return Activity::empty();
        };

        let response = match polled {
            Ok(None) => return Activity::empty(),
            Ok(Some(message)) if is_response(&message) => {
                debug!("Ignoring unsolicited response on {:?}: {}", origin, message);
                return Activity::empty();
            }
            Ok(Some(message)) => self.handle_request(message),
            Err(CodecError::Parse(detail)) => {
                error_response(&Value::Null, &ServerError::Parse(detail))
            }
            Err(e @ CodecError::Overflow { .. }) => {
                error_response(&Value::Null, &ServerError::InvalidRequest(e.to_string()))
            }
            Err(e) => {
                self.note_channel_error(origin, &e);
                return Activity::CHANNEL_ERROR;
            }
        };

        let mut activity = Activity::REQUEST_HANDLED;
        self.stats.requests += 1;
        if let Some(Err(e)) = self.message_stream(origin).map(|s| s.send(&response)) {
            self.note_channel_error(origin, &e);
            activity |= Activity::CHANNEL_ERROR;
        }
        activity
    }

    fn note_channel_error(&mut self, origin: Origin, error: &CodecError) {
        self.stats.channel_errors += 1;
        let errors = self.stats.channel_errors;
        if errors <= 10 || errors % 1000 == 0 {
            warn!("Channel error #{} on {:?}: {}", errors, origin, error);
        }
    }

    fn record_iteration(&mut self, elapsed_ms: u64, activity: Activity) {
        let stats = &mut self.stats;
        stats.iterations += 1;
        stats.max_iteration_ms = stats.max_iteration_ms.max(elapsed_ms);

        if elapsed_ms >= self.watchdog.reset_interval_ms() {
            stats.slow_iterations += 1;
            if stats.slow_iterations <= 10 || stats.slow_iterations % 1000 == 0 {
                warn!(
                    "Slow iteration #{}: {}ms (watchdog reset interval {}ms, {:?})",
                    stats.slow_iterations,
                    elapsed_ms,
                    self.watchdog.reset_interval_ms(),
                    activity
                );
            }
        }

        if stats.iterations % STATS_LOG_INTERVAL == 0 {
            debug!(
                "Dispatch loop: {} iterations, {} requests, max={}ms, slow={}, channel errors={}",
                stats.iterations,
                stats.requests,
                stats.max_iteration_ms,
                stats.slow_iterations,
                stats.channel_errors
            );
        }
    }
}
