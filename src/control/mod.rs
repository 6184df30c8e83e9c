//! Control channel subsystem
//!
//! The publish/subscribe signaling path: call on/off signals in, telemetry
//! reports out.

pub mod mqtt;

pub use mqtt::{ControlPublisher, MqttControlChannel};
