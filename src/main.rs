//! # FC Link
//!
//! Ground-station link daemon for an Elev-8 style flight controller.
//!
//! Opens the serial link, then runs the station tick loop: drain telemetry,
//! advance calibration sessions, keep the heartbeat going.

use anyhow::Result;
use std::path::Path;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

use fc_link::config::Config;
use fc_link::serial::FcSerial;
use fc_link::station::Station;

/// Configuration file looked up in the working directory
const CONFIG_PATH: &str = "fc-link.toml";

/// Ticks between status log messages (~10 seconds at 40Hz)
const LOG_INTERVAL_TICKS: u64 = 400;

/// Main entry point.
///
/// Initializes logging, loads configuration, opens the serial link and runs
/// the tick loop at the configured rate until Ctrl+C.
///
/// # Errors
///
/// Returns an error if:
/// - The configuration file exists but cannot be parsed
/// - No serial device can be opened
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("fc-link v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::load_or_default(Path::new(CONFIG_PATH))?;

    let serial = FcSerial::open_with_paths(&config.serial.device_paths, config.serial.baud_rate)?;
    info!("flight controller link open at {}", serial.device_path());

    let mut station = Station::new(serial, &config);

    // Fetch the device's current preferences right away so edits start
    // from its real state
    station.query_preferences().await?;

    let mut tick_interval = interval(Duration::from_millis(config.tick_period_ms()));

    info!("starting tick loop at {}Hz", config.link.tick_rate_hz);
    info!("Press Ctrl+C to exit");

    let mut tick_count: u64 = 0;

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                if let Err(e) = station.tick().await {
                    warn!("tick failed: {}", e);
                    continue;
                }

                tick_count += 1;
                if tick_count % LOG_INTERVAL_TICKS == 0 {
                    let radio = station.latest_radio();
                    match station.firmware_version() {
                        Some((major, minor, patch)) => info!(
                            "link up, firmware v{}.{}.{}, battery {:.2}V",
                            major, minor, patch,
                            f64::from(radio.battery_volts) / 100.0
                        ),
                        None => info!("link up, no debug frame from device yet"),
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                if station.calibrating() {
                    // Leave the device in its own calibration, not ours
                    if let Err(e) = station.leave_calibration_view().await {
                        warn!("failed to cancel calibration on shutdown: {}", e);
                    }
                }
                break;
            }
        }
    }

    Ok(())
}
