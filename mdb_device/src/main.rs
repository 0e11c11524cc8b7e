//! # Modular Device Binary
//!
//! Runs the dispatch loop on real serial lines, or fully simulated.
//!
//! # Usage
//!
//! ```bash
//! # Simulated peers on every stream, requests typed on stdin
//! mdb_device --simulate
//!
//! # Serial primary and streams from the config, kernel watchdog
//! mdb_device --config /etc/mdb/device.toml --primary /dev/ttyS0 \
//!     --watchdog-device /dev/watchdog
//!
//! # Verbose JSON logs
//! mdb_device -s -v --json
//! ```

use clap::Parser;
use mdb_common::channel::{BoxedChannel, ChannelId};
use mdb_common::clock::{Clock, SystemClock};
use mdb_common::config::{DeviceConfig, LogLevel};
use mdb_common::consts::FIRMWARE_VERSION;
use mdb_common::types::Address;
use mdb_common::watchdog::HardwareWatchdog;
use mdb_device::drivers::sim::{SimChannel, SimClock, SimWatchdog};
use mdb_device::drivers::stdio::StdioChannel;
use mdb_device::{DeviceBuilder, ModularDevice, Request, RunOutcome};
use serde_json::{Value, json};
use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Modular device - watchdog-supervised command routing core
#[derive(Parser, Debug)]
#[command(name = "mdb_device")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Watchdog-supervised command routing core for modular devices")]
#[command(long_about = None)]
struct Args {
    /// Path to the device configuration file. Defaults apply if it is missing.
    #[arg(short, long, default_value = "/etc/mdb/device.toml")]
    config: PathBuf,

    /// Serial device of the primary channel (required without --simulate)
    #[arg(long, value_name = "TTY")]
    primary: Option<PathBuf>,

    /// Primary on stdin/stdout, a simulated peer device on every stream
    #[arg(short = 's', long)]
    simulate: bool,

    /// Reply delay of simulated peer devices [ms]
    #[arg(long, default_value_t = 50)]
    sim_delay_ms: u64,

    /// Kernel watchdog device (default: simulated watchdog)
    #[arg(long, value_name = "PATH")]
    watchdog_device: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

/// Channels and clock collected before boot.
struct Parts<K> {
    config: DeviceConfig,
    primary: BoxedChannel,
    streams: Vec<(BoxedChannel, Address, String)>,
    clock: K,
}

fn main() -> Result<(), Box<dyn Error>> {
    if let Err(e) = run() {
        error!("Device startup failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let config = DeviceConfig::load_or_default(&args.config);

    // A broken config still gets its error logged, at the default level.
    let level = config
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, level);
    let config = config?;

    info!(
        "Modular device v{} starting ({})...",
        FIRMWARE_VERSION, config.shared.service_name
    );
    config.validate()?;

    let outcome = if args.simulate {
        let parts = simulated_parts(&args, config)?;
        select_watchdog(&args, parts)?
    } else {
        let parts = hardware_parts(&args, config)?;
        select_watchdog(&args, parts)?
    };

    match outcome {
        RunOutcome::Stopped => info!("Modular device shutdown complete"),
        RunOutcome::WatchdogExpired => warn!("Watchdog reset: the device restarts here"),
    }
    Ok(())
}

/// Stdio primary plus a simulated peer behind every configured stream.
fn simulated_parts(args: &Args, config: DeviceConfig) -> Result<Parts<SimClock>, Box<dyn Error>> {
    info!(
        "Simulation mode: primary on stdio, {} simulated peer(s) replying after {}ms",
        config.streams.len(),
        args.sim_delay_ms
    );
    let clock = SimClock::wall();
    let primary: BoxedChannel = Box::new(StdioChannel::spawn(ChannelId(0)));

    let mut streams = Vec::new();
    for (idx, stream) in config.streams.iter().enumerate() {
        let (channel, peer) = SimChannel::new(ChannelId(u8::try_from(idx + 1)?), &clock);
        peer.set_responder(args.sim_delay_ms, simulated_peer(stream.name.clone()));
        streams.push((
            Box::new(channel) as BoxedChannel,
            stream.address,
            stream.name.clone(),
        ));
    }

    Ok(Parts {
        config,
        primary,
        streams,
        clock,
    })
}

/// A downstream device answering every request with its stream name.
fn simulated_peer(name: String) -> impl FnMut(&Value) -> Option<Value> + 'static {
    move |request| {
        Some(json!({
            "id": Request::id_of(request),
            "result": { "stream": name, "request": request },
        }))
    }
}

#[cfg(target_os = "linux")]
fn hardware_parts(args: &Args, config: DeviceConfig) -> Result<Parts<SystemClock>, Box<dyn Error>> {
    use mdb_device::drivers::serial::SerialChannel;
    use std::path::Path;

    let primary_path = args
        .primary
        .as_deref()
        .ok_or("--primary <TTY> is required without --simulate")?;
    let open = |id: u8, path: &Path| {
        SerialChannel::open(
            ChannelId(id),
            path,
            config.device.baud,
            config.device.serial_timeout_ms,
        )
    };
    let primary: BoxedChannel = Box::new(open(0, primary_path)?);

    let mut streams = Vec::new();
    for (idx, stream) in config.streams.iter().enumerate() {
        let Some(path) = &stream.path else {
            warn!("Stream '{}' has no device path, skipped", stream.name);
            continue;
        };
        let channel = open(u8::try_from(idx + 1)?, path.as_path())?;
        streams.push((
            Box::new(channel) as BoxedChannel,
            stream.address,
            stream.name.clone(),
        ));
    }

    Ok(Parts {
        config,
        primary,
        streams,
        clock: SystemClock::new(),
    })
}

#[cfg(not(target_os = "linux"))]
fn hardware_parts(_args: &Args, _config: DeviceConfig) -> Result<Parts<SystemClock>, Box<dyn Error>> {
    Err("serial channels require Linux; use --simulate".into())
}

fn select_watchdog<K: Clock + Clone>(args: &Args, parts: Parts<K>) -> Result<RunOutcome, Box<dyn Error>> {
    match &args.watchdog_device {
        #[cfg(target_os = "linux")]
        Some(path) => {
            let hw = mdb_device::drivers::linux_watchdog::DevWatchdog::new(path);
            boot_and_run(parts, hw)
        }
        #[cfg(not(target_os = "linux"))]
        Some(_) => Err("--watchdog-device requires Linux".into()),
        None => {
            info!("Using simulated watchdog");
            let hw = SimWatchdog::new(parts.clock.clone());
            boot_and_run(parts, hw)
        }
    }
}

fn boot_and_run<W: HardwareWatchdog, K: Clock>(
    parts: Parts<K>,
    hw: W,
) -> Result<RunOutcome, Box<dyn Error>> {
    let Parts {
        config,
        primary,
        streams,
        clock,
    } = parts;

    let builder = streams.into_iter().fold(
        DeviceBuilder::new(config, primary, hw, clock),
        |builder, (channel, address, name)| builder.client_stream(channel, address, name),
    );
    let mut device: ModularDevice<W, K> = builder.build()?;

    // Setup signal handler.
    let running = device.running_flag();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    Ok(device.run())
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
///
/// Logs go to stderr so they never mix with responses on a stdio primary.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        configured.as_tracing()
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
