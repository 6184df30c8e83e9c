//! Audio capture and playback devices
//!
//! Wraps the platform audio backend behind blocking read-frame/write-frame
//! halves. cpal delivers samples on its own callback threads; each half
//! bridges the callbacks to a bounded channel so the session loops see
//! bounded blocking calls and can observe cancellation between attempts.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::frame::AudioFrame;
use crate::config::AudioConfig;
use crate::constants::FRAME_CHANNEL_CAPACITY;
use crate::error::AudioError;

/// Outcome of a bounded capture read
#[derive(Debug)]
pub enum CaptureRead {
    /// One complete frame, in arrival order
    Frame(AudioFrame),
    /// No frame within the timeout window
    TimedOut,
}

/// Outcome of a bounded playback write
#[derive(Debug)]
pub enum WriteStatus {
    /// Frame accepted for playback
    Queued,
    /// Playback queue stayed full for the whole timeout window
    TimedOut,
}

/// Capture half of a duplex audio device
pub trait CaptureSource: Send {
    /// Block up to the configured timeout for the next captured frame
    fn read_frame(&mut self) -> Result<CaptureRead, AudioError>;
}

/// Playback half of a duplex audio device
pub trait PlaybackSink: Send {
    /// Queue one frame for playback, blocking up to the configured timeout
    fn write_frame(&mut self, frame: AudioFrame) -> Result<WriteStatus, AudioError>;
}

/// Capture and playback halves of one opened duplex device
pub struct AudioPair {
    pub capture: Box<dyn CaptureSource>,
    pub playback: Box<dyn PlaybackSink>,
}

/// Factory for the capture/playback halves of the audio hardware
pub trait AudioSystem: Send + Sync {
    fn open(&self, config: &AudioConfig) -> Result<AudioPair, AudioError>;
}

/// Audio system backed by the default cpal host devices
pub struct CpalAudioSystem;

impl CpalAudioSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CpalAudioSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSystem for CpalAudioSystem {
    fn open(&self, config: &AudioConfig) -> Result<AudioPair, AudioError> {
        let capture = CpalCapture::open(config)?;
        let playback = CpalPlayback::open(config)?;

        Ok(AudioPair {
            capture: Box::new(capture),
            playback: Box::new(playback),
        })
    }
}

/// How long to wait for a stream thread to report readiness
const STREAM_START_TIMEOUT: Duration = Duration::from_secs(5);

/// Capture half backed by the default cpal input device
pub struct CpalCapture {
    frame_rx: Receiver<AudioFrame>,
    timeout: Duration,
    running: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    overflows: Arc<AtomicU32>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CpalCapture {
    /// Open the default input device and start capturing
    pub fn open(config: &AudioConfig) -> Result<Self, AudioError> {
        let (frame_tx, frame_rx) = bounded::<AudioFrame>(FRAME_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        let running = Arc::new(AtomicBool::new(true));
        let failed = Arc::new(AtomicBool::new(false));
        let overflows = Arc::new(AtomicU32::new(0));

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let samples_per_frame = config.frame_size * config.channels as usize;

        let running_for_thread = running.clone();
        let failed_for_stream = failed.clone();
        let overflows_for_stream = overflows.clone();

        let handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                let host = cpal::default_host();
                let device = match host.default_input_device() {
                    Some(device) => device,
                    None => {
                        let _ = ready_tx.send(Err(AudioError::DeviceUnavailable(
                            "no default input device".to_string(),
                        )));
                        return;
                    }
                };

                // Carry samples across callbacks until a full frame accumulates
                let mut pending: Vec<f32> = Vec::with_capacity(samples_per_frame * 2);

                let stream = device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        pending.extend_from_slice(data);
                        while pending.len() >= samples_per_frame {
                            let samples: Vec<f32> = pending.drain(..samples_per_frame).collect();
                            let frame = AudioFrame::from_f32_samples(&samples);
                            if frame_tx.try_send(frame).is_err() {
                                overflows_for_stream.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    },
                    move |err| {
                        tracing::warn!("capture stream error: {}", err);
                        failed_for_stream.store(true, Ordering::Relaxed);
                    },
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    return;
                }

                let _ = ready_tx.send(Ok(()));

                // Keep the stream alive while the half is open
                while running_for_thread.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let mut capture = Self {
            frame_rx,
            timeout: config.io_timeout(),
            running,
            failed,
            overflows,
            thread_handle: Some(handle),
        };

        match ready_rx.recv_timeout(STREAM_START_TIMEOUT) {
            Ok(Ok(())) => Ok(capture),
            Ok(Err(e)) => {
                capture.stop();
                Err(e)
            }
            Err(_) => {
                capture.stop();
                Err(AudioError::StreamError(
                    "capture stream did not start".to_string(),
                ))
            }
        }
    }

    /// Number of frames dropped because the session loop fell behind
    pub fn overflows(&self) -> u32 {
        self.overflows.load(Ordering::Relaxed)
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl CaptureSource for CpalCapture {
    fn read_frame(&mut self) -> Result<CaptureRead, AudioError> {
        if self.failed.load(Ordering::Relaxed) {
            return Err(AudioError::StreamError(
                "capture stream reported an error".to_string(),
            ));
        }

        match self.frame_rx.recv_timeout(self.timeout) {
            Ok(frame) => Ok(CaptureRead::Frame(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(CaptureRead::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(AudioError::StreamError(
                "capture stream closed".to_string(),
            )),
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Playback half backed by the default cpal output device
pub struct CpalPlayback {
    frame_tx: Sender<AudioFrame>,
    timeout: Duration,
    running: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    underruns: Arc<AtomicU32>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CpalPlayback {
    /// Open the default output device and start playback
    pub fn open(config: &AudioConfig) -> Result<Self, AudioError> {
        let (frame_tx, frame_rx) = bounded::<AudioFrame>(FRAME_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        let running = Arc::new(AtomicBool::new(true));
        let failed = Arc::new(AtomicBool::new(false));
        let underruns = Arc::new(AtomicU32::new(0));

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let running_for_thread = running.clone();
        let failed_for_stream = failed.clone();
        let underruns_for_stream = underruns.clone();

        let handle = thread::Builder::new()
            .name("audio-playback".to_string())
            .spawn(move || {
                let host = cpal::default_host();
                let device = match host.default_output_device() {
                    Some(device) => device,
                    None => {
                        let _ = ready_tx.send(Err(AudioError::DeviceUnavailable(
                            "no default output device".to_string(),
                        )));
                        return;
                    }
                };

                // Carry decoded samples across callbacks
                let mut buffer: Vec<f32> = Vec::new();
                let mut pos = 0usize;

                let stream = device.build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        for sample in data.iter_mut() {
                            if pos >= buffer.len() {
                                match frame_rx.try_recv() {
                                    Ok(frame) => {
                                        buffer = frame.to_f32_samples();
                                        pos = 0;
                                    }
                                    Err(_) => {
                                        // Underrun: output silence
                                        underruns_for_stream.fetch_add(1, Ordering::Relaxed);
                                        *sample = 0.0;
                                        continue;
                                    }
                                }
                            }

                            *sample = buffer[pos];
                            pos += 1;
                        }
                    },
                    move |err| {
                        tracing::warn!("playback stream error: {}", err);
                        failed_for_stream.store(true, Ordering::Relaxed);
                    },
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    return;
                }

                let _ = ready_tx.send(Ok(()));

                while running_for_thread.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let mut playback = Self {
            frame_tx,
            timeout: config.io_timeout(),
            running,
            failed,
            underruns,
            thread_handle: Some(handle),
        };

        match ready_rx.recv_timeout(STREAM_START_TIMEOUT) {
            Ok(Ok(())) => Ok(playback),
            Ok(Err(e)) => {
                playback.stop();
                Err(e)
            }
            Err(_) => {
                playback.stop();
                Err(AudioError::StreamError(
                    "playback stream did not start".to_string(),
                ))
            }
        }
    }

    /// Number of callback runs that had to emit silence
    pub fn underruns(&self) -> u32 {
        self.underruns.load(Ordering::Relaxed)
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl PlaybackSink for CpalPlayback {
    fn write_frame(&mut self, frame: AudioFrame) -> Result<WriteStatus, AudioError> {
        if self.failed.load(Ordering::Relaxed) {
            return Err(AudioError::StreamError(
                "playback stream reported an error".to_string(),
            ));
        }

        match self.frame_tx.send_timeout(frame, self.timeout) {
            Ok(()) => Ok(WriteStatus::Queued),
            Err(SendTimeoutError::Timeout(_)) => Ok(WriteStatus::TimedOut),
            Err(SendTimeoutError::Disconnected(_)) => Err(AudioError::StreamError(
                "playback stream closed".to_string(),
            )),
        }
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}
