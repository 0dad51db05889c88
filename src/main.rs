//! # MAX14906 Monitor
//!
//! Bring up a MAX14906, apply the channel setup from the configuration file
//! and log channel levels and latched faults until Ctrl+C.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load configuration (first argument, default `config/default.toml`)
//!    - Set up logging with tracing subscriber
//!    - Open the configured transport and initialize the device
//!    - Apply per-channel current limit and function
//!
//! 2. **Main Loop**
//!    - Poll channel levels and latched faults every `poll_interval_ms`
//!    - Log whenever the snapshot changes
//!
//! 3. **Graceful Shutdown**
//!    - Put every channel in high-Z and release the bus and enable line
//!
//! ```bash
//! cargo run --release -- config/default.toml
//! ```

use anyhow::{Context, Result};
use tokio::time::{interval, Duration};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use max14906::config::{ChannelConfig, Config, LoggingConfig, TransportKind};
use max14906::protocol::registers::MAX14906_CHANNELS;
use max14906::transport::{EnableLine, SimulatedEnableLine, SimulatedMax14906, SpiBus};
use max14906::{FaultStatus, InitParam, Max14906};

/// Configuration file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Log file name prefix inside the logging directory
const LOG_FILE_PREFIX: &str = "max14906-monitor.log";

/// Channel levels and latched faults at one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Snapshot {
    levels: [bool; MAX14906_CHANNELS as usize],
    faults: FaultStatus,
}

impl Snapshot {
    fn read<S: SpiBus, G: EnableLine>(dev: &mut Max14906<S, G>) -> max14906::Result<Self> {
        let mut levels = [false; MAX14906_CHANNELS as usize];
        for (ch, level) in (0..MAX14906_CHANNELS).zip(levels.iter_mut()) {
            *level = dev.ch_get(ch)?;
        }

        Ok(Self {
            levels,
            faults: dev.read_faults()?,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let _log_guard = init_logging(&config.logging);

    info!("MAX14906 monitor v{} starting...", env!("CARGO_PKG_VERSION"));

    match config.monitor.transport {
        TransportKind::Simulated => {
            info!("Using simulated MAX14906");
            let param = InitParam {
                spi: SimulatedMax14906::new(config.device.crc_enabled, config.device.chip_address),
                enable: config.enable.as_ref().map(|_| SimulatedEnableLine::new()),
                crc_enabled: config.device.crc_enabled,
                chip_address: config.device.chip_address,
            };
            run(param, &config).await
        }
        TransportKind::RaspberryPi => run_raspberry_pi(&config).await,
    }
}

/// Initialize tracing, to stdout or to a daily log file
///
/// `RUST_LOG` overrides the configured level. The returned guard must stay
/// alive for buffered file output to be flushed.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.directory.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.directory, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Some(guard)
}

#[cfg(feature = "raspberry-pi")]
async fn run_raspberry_pi(config: &Config) -> Result<()> {
    use max14906::transport::raspberry_pi::{RaspberryPiEnableLine, RaspberryPiSpi};

    let spi = RaspberryPiSpi::open(config.spi.bus, config.spi.chip_select, config.spi.max_speed_hz)?;
    let enable = match &config.enable {
        Some(enable) => Some(RaspberryPiEnableLine::open(enable.pin)?),
        None => None,
    };

    let param = InitParam {
        spi,
        enable,
        crc_enabled: config.device.crc_enabled,
        chip_address: config.device.chip_address,
    };
    run(param, config).await
}

#[cfg(not(feature = "raspberry-pi"))]
async fn run_raspberry_pi(_config: &Config) -> Result<()> {
    anyhow::bail!("raspberry-pi transport requested but the `raspberry-pi` feature is not enabled")
}

/// Set current limits first so outputs come up limited
fn apply_channel_config<S: SpiBus, G: EnableLine>(
    dev: &mut Max14906<S, G>,
    channels: &ChannelConfig,
) -> max14906::Result<()> {
    for ch in 0..MAX14906_CHANNELS {
        let idx = ch as usize;
        dev.climit_set(ch, channels.current_limits[idx])?;
        dev.ch_func(ch, channels.functions[idx])?;
        info!(
            "Channel {}: {:?}, limit {} mA",
            ch,
            channels.functions[idx],
            channels.current_limits[idx].milliamps()
        );
    }
    Ok(())
}

async fn run<S: SpiBus, G: EnableLine>(param: InitParam<S, G>, config: &Config) -> Result<()> {
    let mut dev = Max14906::init(param).context("Failed to initialize MAX14906")?;

    if let Err(e) = apply_channel_config(&mut dev, &config.channels) {
        if let Err(remove_err) = dev.remove() {
            warn!("Teardown after failed channel setup also failed: {}", remove_err);
        }
        return Err(e).context("Failed to apply channel configuration");
    }

    let mut ticker = interval(Duration::from_millis(config.monitor.poll_interval_ms));
    let mut last: Option<Snapshot> = None;

    info!("Polling every {} ms, press Ctrl+C to exit", config.monitor.poll_interval_ms);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match Snapshot::read(&mut dev) {
                    Ok(snapshot) if last != Some(snapshot) => {
                        info!("Levels {:?}", snapshot.levels);
                        if !snapshot.faults.is_clear() {
                            warn!("Latched faults {:?}", snapshot.faults);
                        }
                        last = Some(snapshot);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Poll failed: {}", e),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    dev.remove().context("Failed to remove MAX14906")?;
    info!("All channels in high-Z, bye");
    Ok(())
}
