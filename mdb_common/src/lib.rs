//! Modular Device Common Library
//!
//! Shared constants, traits and configuration loading for the modular
//! device workspace.
//!
//! # Module Structure
//!
//! - [`consts`] - Compile-time capacities, timing limits and parameter ranges
//! - [`config`] - TOML configuration types and the `ConfigLoader` trait
//! - [`channel`] - The `Channel` trait implemented by serial drivers
//! - [`watchdog`] - The `HardwareWatchdog` trait
//! - [`clock`] - Monotonic millisecond time source
//! - [`types`] - Addresses and device identity
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use mdb_common::prelude::*;
//! ```

pub mod channel;
pub mod clock;
pub mod config;
pub mod consts;
pub mod prelude;
pub mod types;
pub mod watchdog;
