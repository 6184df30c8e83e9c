//! Audio subsystem
//!
//! Frame representation plus the capture/playback capability consumed by
//! the session pump, with a cpal-backed implementation.

pub mod device;
pub mod frame;

pub use device::{
    AudioPair, AudioSystem, CaptureRead, CaptureSource, CpalAudioSystem, PlaybackSink, WriteStatus,
};
pub use frame::AudioFrame;
