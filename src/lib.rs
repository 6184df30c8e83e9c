//! Edge call client for drone audio
//!
//! Waits for `on`/`off` call signals on an MQTT control channel, bridges
//! the device's duplex audio hardware to a call-relay server over TCP
//! while a call is active, and periodically publishes device telemetry on
//! the same control channel.

pub mod audio;
pub mod config;
pub mod constants;
pub mod control;
pub mod error;
pub mod network;
pub mod session;
pub mod telemetry;

pub use error::{AudioError, ControlError, Error, NetworkError, TelemetryError};

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;
