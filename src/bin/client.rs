//! Drone call client
//!
//! Connects to the MQTT broker, waits for call on/off signals, bridges the
//! audio hardware to the relay server while a call is active, and publishes
//! telemetry in the background.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drone_voip_client::{
    audio::CpalAudioSystem,
    config::AppConfig,
    control::MqttControlChannel,
    network::TcpRelayConnector,
    session::CallSessionController,
    telemetry::{FileTelemetrySource, TelemetryPublisher},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config()?;
    tracing::info!(
        device = %config.device.device_id,
        relay = %format!("{}:{}", config.relay.host, config.relay.port),
        "starting call client"
    );

    let connector = Arc::new(TcpRelayConnector::new(&config.relay));
    let audio = Arc::new(CpalAudioSystem::new());
    let controller = Arc::new(CallSessionController::new(
        connector,
        audio,
        config.audio.clone(),
    ));

    let signal_controller = controller.clone();
    let mut channel = MqttControlChannel::connect(&config, move |signal| {
        signal_controller.on_signal(signal);
    })?;

    let mut telemetry = TelemetryPublisher::start(
        Box::new(FileTelemetrySource::new(
            config.telemetry.source_path.clone(),
        )),
        channel.publisher(),
        Duration::from_secs(config.telemetry.interval_secs),
    )?;

    tracing::info!("waiting for call signals on {}", config.call_topic());
    tokio::signal::ctrl_c().await?;

    tracing::info!("shutting down");
    telemetry.stop();
    controller.shutdown();
    channel.stop();

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
