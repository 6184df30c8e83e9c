//! Crate-wide default constants

/// Default audio sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// Default channel count (mono voice)
pub const DEFAULT_CHANNELS: u16 = 1;

/// Default audio frame size in samples per channel
pub const DEFAULT_FRAME_SIZE: usize = 512;

/// Default relay server TCP port
pub const DEFAULT_RELAY_PORT: u16 = 50_007;

/// Default MQTT broker port
pub const DEFAULT_BROKER_PORT: u16 = 1883;

/// Default MQTT keepalive in seconds
pub const DEFAULT_KEEPALIVE_SECS: u64 = 60;

/// Default telemetry publish interval in seconds
pub const DEFAULT_TELEMETRY_INTERVAL_SECS: u64 = 60;

/// Default bound on a single blocking I/O call in milliseconds; cancellation
/// is observed within one such window
pub const DEFAULT_IO_TIMEOUT_MS: u64 = 250;

/// Default relay connect timeout in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Capacity of the frame channels between stream callbacks and the pump loops
pub const FRAME_CHANNEL_CAPACITY: usize = 64;

/// Suffix of the control topic carrying call on/off signals
pub const CALL_TOPIC_SUFFIX: &str = "call";

/// Suffix of the data topic carrying telemetry reports
pub const DATA_TOPIC_SUFFIX: &str = "data";
