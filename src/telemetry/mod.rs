//! Telemetry subsystem
//!
//! The GPS reader persists the latest location/battery record; the
//! publisher reads it on a fixed interval and reports it on the control
//! channel, independent of call state.

pub mod nmea;
pub mod publisher;
pub mod source;

pub use nmea::parse_gpgga;
pub use publisher::TelemetryPublisher;
pub use source::{FileTelemetrySource, TelemetryRecord, TelemetrySource};
