//! GPS telemetry reader
//!
//! Opens the GPS serial port, parses NMEA GPGGA sentences, and persists
//! each fix as the telemetry record consumed by the call client's
//! publisher.

use anyhow::Result;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drone_voip_client::{
    config::AppConfig,
    telemetry::{parse_gpgga, TelemetryRecord},
};

/// Wait between failed attempts to open the serial port
const OPEN_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Serial read timeout
const READ_TIMEOUT: Duration = Duration::from_secs(10);

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config()?;
    tracing::info!(
        port = %config.telemetry.gps_port,
        record = %config.telemetry.source_path.display(),
        "starting GPS reader"
    );

    loop {
        let port = open_port(&config);
        let mut reader = BufReader::new(port);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => {
                    tracing::warn!("serial port closed, reopening");
                    break;
                }
                Ok(_) => {
                    let sentence = line.trim();
                    if sentence.len() < 10 {
                        continue;
                    }
                    if let Some((lat, long)) = parse_gpgga(sentence) {
                        let record = TelemetryRecord {
                            drone_id: config.device.device_id.clone(),
                            lat,
                            long,
                            bat: config.telemetry.battery.clone(),
                        };
                        match persist(&record, &config.telemetry.source_path) {
                            Ok(()) => {
                                tracing::info!(lat, long, "telemetry record updated")
                            }
                            Err(e) => {
                                tracing::warn!("failed to persist telemetry record: {}", e)
                            }
                        }
                    }
                }
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::TimedOut
                        || e.kind() == std::io::ErrorKind::WouldBlock =>
                {
                    tracing::debug!("no NMEA data within timeout");
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    // Partial or corrupted sentence; skip it
                    tracing::debug!("discarding non-text serial data");
                }
                Err(e) => {
                    tracing::warn!("serial read failed: {}, reopening port", e);
                    break;
                }
            }
        }
    }
}

/// Open the configured serial port, retrying until it appears
fn open_port(config: &AppConfig) -> Box<dyn serialport::SerialPort> {
    loop {
        match serialport::new(&config.telemetry.gps_port, config.telemetry.gps_baud)
            .timeout(READ_TIMEOUT)
            .open()
        {
            Ok(port) => {
                tracing::info!("serial port opened");
                return port;
            }
            Err(e) => {
                tracing::warn!(
                    "failed to open serial port: {}; retrying in {}s",
                    e,
                    OPEN_RETRY_DELAY.as_secs()
                );
                thread::sleep(OPEN_RETRY_DELAY);
            }
        }
    }
}

/// Write the record for the telemetry publisher to pick up
fn persist(record: &TelemetryRecord, path: &std::path::Path) -> Result<()> {
    let json = serde_json::to_string(record)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Load config from the CLI argument, the default path, or built-in defaults
fn load_config() -> Result<AppConfig> {
    if let Some(arg) = std::env::args().nth(1) {
        return Ok(AppConfig::load(&PathBuf::from(arg))?);
    }

    if let Some(path) = AppConfig::default_path() {
        if path.exists() {
            return Ok(AppConfig::load(&path)?);
        }
    }

    Ok(AppConfig::default())
}
