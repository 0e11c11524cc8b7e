//! # Modular Device Library
//!
//! Command routing core for a modular device: answers JSON requests on a
//! primary channel and several addressable client streams, forwards
//! requests to downstream devices by address path, and keeps a hardware
//! watchdog armed from a single cooperative loop.
//!
//! # Module Structure
//!
//! - [`device`] - `ModularDevice`, the dispatch loop and its builder
//! - [`handlers`] - Request handlers run against the device
//! - [`server`] - Request envelope, error codes and the declared API
//! - [`forward`] - Bounded-time request forwarding
//! - [`registry`] - Fixed-capacity client stream registry
//! - [`client_stream`] - Addressable, named channel
//! - [`client`] - Client sessions to downstream devices
//! - [`codec`] - Newline-delimited JSON framing
//! - [`watchdog`] - Watchdog supervisor state machine
//! - [`time`] - Epoch time and time zone offset
//! - [`drivers`] - Serial, watchdog and simulation drivers
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         ModularDevice                            │
//! │  ┌─────────────┐    ┌──────────────┐    ┌─────────────────────┐  │
//! │  │  Primary    │───►│  update()    │◄──►│  StreamRegistry     │  │
//! │  │  channel    │◄───│  (loop)      │    │  addr → ClientStream│  │
//! │  └─────────────┘    └──────┬───────┘    └──────────▲──────────┘  │
//! │                            │                       │             │
//! │          ┌─────────────────┼───────────────┐       │             │
//! │          ▼                 ▼               ▼       │             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────┴──────────┐    │
//! │  │  Watchdog    │  │  Handlers    │─►│  RequestForwarder    │    │
//! │  │  Supervisor  │  │  (api table) │  │  (poll + deadline)   │    │
//! │  └──────┬───────┘  └──────────────┘  └──────────────────────┘    │
//! │         ▼                                                        │
//! │  HardwareWatchdog (trait)                                        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod client;
pub mod client_stream;
pub mod codec;
pub mod device;
pub mod drivers;
pub mod forward;
pub mod handlers;
pub mod registry;
pub mod server;
pub mod time;
pub mod watchdog;

// Re-export key types for convenience
pub use crate::device::{Activity, DeviceBuilder, DeviceError, LoopStats, ModularDevice, RunOutcome};
pub use crate::forward::{RequestForwarder, RoutingError};
pub use crate::registry::{RegistryError, StreamRegistry};
pub use crate::server::{Request, ServerError};
pub use crate::watchdog::{WatchdogState, WatchdogSupervisor};
