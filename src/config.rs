//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::*;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Device identity
    pub device: DeviceConfig,

    /// Call-relay server configuration
    pub relay: RelayConfig,

    /// Audio configuration
    pub audio: AudioConfig,

    /// Control channel (MQTT broker) configuration
    pub control: ControlConfig,

    /// Telemetry configuration
    pub telemetry: TelemetryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            relay: RelayConfig::default(),
            audio: AudioConfig::default(),
            control: ControlConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Device identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device/session identifier; also the control topic prefix
    pub device_id: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: "drone101".to_string(),
        }
    }
}

/// Call-relay server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Relay server host
    pub host: String,

    /// Relay server TCP port
    pub port: u16,

    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Bound on a single socket read/write in milliseconds
    pub io_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_RELAY_PORT,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            io_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
        }
    }
}

impl RelayConfig {
    /// Connect timeout as a `Duration`
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Per-call I/O timeout as a `Duration`
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

/// Audio configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Channel count
    pub channels: u16,

    /// Frame size in samples per channel
    pub frame_size: usize,

    /// Bound on a single frame read/write in milliseconds
    pub io_timeout_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            frame_size: DEFAULT_FRAME_SIZE,
            io_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
        }
    }
}

impl AudioConfig {
    /// Size of one frame on the wire in bytes (S16LE interleaved)
    pub fn frame_bytes(&self) -> usize {
        self.frame_size * self.channels as usize * 2
    }

    /// Per-call frame I/O timeout as a `Duration`
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

/// Control channel (MQTT broker) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Broker host
    pub broker_host: String,

    /// Broker port
    pub broker_port: u16,

    /// MQTT keepalive in seconds
    pub keepalive_secs: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            broker_host: "broker.hivemq.com".to_string(),
            broker_port: DEFAULT_BROKER_PORT,
            keepalive_secs: DEFAULT_KEEPALIVE_SECS,
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Publish interval in seconds
    pub interval_secs: u64,

    /// Path of the persisted telemetry record
    pub source_path: PathBuf,

    /// GPS serial port device
    pub gps_port: String,

    /// GPS serial port baud rate
    pub gps_baud: u32,

    /// Reported battery level until battery readout is wired to hardware
    pub battery: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_TELEMETRY_INTERVAL_SECS,
            source_path: PathBuf::from("device.json"),
            gps_port: "/dev/ttyUSB2".to_string(),
            gps_baud: 115_200,
            battery: "85%".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load(path: &PathBuf) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &PathBuf) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "drone-link", "voip-client")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Inbound control topic carrying `on`/`off` call signals
    pub fn call_topic(&self) -> String {
        format!("{}/{}", self.device.device_id, CALL_TOPIC_SUFFIX)
    }

    /// Outbound data topic carrying telemetry reports
    pub fn data_topic(&self) -> String {
        format!("{}/{}", self.device.device_id, DATA_TOPIC_SUFFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let restored: AppConfig = toml::from_str(&serialized).unwrap();

        assert_eq!(restored.device.device_id, config.device.device_id);
        assert_eq!(restored.relay.port, config.relay.port);
        assert_eq!(restored.audio.frame_size, config.audio.frame_size);
        assert_eq!(restored.control.broker_host, config.control.broker_host);
        assert_eq!(restored.telemetry.interval_secs, config.telemetry.interval_secs);
    }

    #[test]
    fn test_topics_follow_device_id() {
        let mut config = AppConfig::default();
        config.device.device_id = "drone7".to_string();

        assert_eq!(config.call_topic(), "drone7/call");
        assert_eq!(config.data_topic(), "drone7/data");
    }

    #[test]
    fn test_frame_bytes() {
        let audio = AudioConfig {
            sample_rate: 16_000,
            channels: 1,
            frame_size: 512,
            io_timeout_ms: 250,
        };

        // 512 mono samples, 2 bytes each
        assert_eq!(audio.frame_bytes(), 1024);
    }
}
