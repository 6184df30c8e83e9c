//! Call session subsystem
//!
//! The controller reacts to control signals and owns at most one duplex
//! audio pump bridging the local audio device to the relay server.

pub mod controller;
pub mod pump;

pub use controller::{CallSessionController, ControlSignal, SessionEvent, SessionState};
pub use pump::{DuplexAudioPump, ExitCause};
