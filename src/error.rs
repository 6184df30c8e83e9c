//! Error types for the call client
//!
//! Each subsystem has its own error enum; the top-level `Error` aggregates
//! them for the crate-wide `Result` alias. Session-level failures
//! (connection, device) are contained by the session controller and never
//! terminate the process.

use thiserror::Error;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration parse or validation failure
    #[error("configuration error: {0}")]
    Config(String),

    /// Relay network channel failure
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Audio device failure
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Telemetry source failure
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// Control channel failure
    #[error(transparent)]
    Control(#[from] ControlError),

    /// Underlying I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from the relay TCP channel
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Relay server unreachable or refused the connection
    #[error("failed to connect to relay {addr}: {reason}")]
    ConnectFailed { addr: String, reason: String },

    /// Send side of the connection failed
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive side of the connection failed
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

/// Errors from the audio capture/playback device
#[derive(Debug, Error)]
pub enum AudioError {
    /// No usable capture or playback device
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Requested sample rate / channel layout not supported
    #[error("unsupported stream configuration: {0}")]
    UnsupportedConfig(String),

    /// Stream build or runtime failure
    #[error("stream error: {0}")]
    StreamError(String),
}

/// Errors from the telemetry record source
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Record not readable (typically: not written yet)
    #[error("telemetry record unavailable: {0}")]
    Unavailable(String),

    /// Record exists but does not parse
    #[error("malformed telemetry record: {0}")]
    Malformed(String),
}

/// Errors from the MQTT control channel
#[derive(Debug, Error)]
pub enum ControlError {
    /// Could not reach the broker
    #[error("failed to connect to broker: {0}")]
    ConnectFailed(String),

    /// Subscription to the call topic failed
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    /// Outgoing publish was not accepted by the client
    #[error("publish failed: {0}")]
    PublishFailed(String),
}
