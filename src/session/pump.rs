//! Duplex audio pump
//!
//! While a call is active, two directional loops bridge the audio device
//! and the relay socket: uplink (capture -> relay) and downlink (relay ->
//! playback). Both loops share one cancellation flag; a loop that exits on
//! an unrecoverable error raises the flag so its sibling winds down within
//! one blocking-call timeout. A supervisor thread joins both loops and only
//! then reports the exit, so a reported exit means every session resource
//! has been released.

use bytes::Bytes;
use crossbeam_channel::Sender;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::{AudioFrame, AudioPair, CaptureRead, CaptureSource, PlaybackSink, WriteStatus};
use crate::network::{RelayPair, RelayRead, RelayRx, RelayTx, SendStatus};

/// Why a pump wound down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitCause {
    /// Explicit stop request
    Stopped,
    /// Relay closed the connection
    RemoteClosed,
    /// Capture-to-relay loop hit an unrecoverable error
    UplinkFailed(String),
    /// Relay-to-playback loop hit an unrecoverable error
    DownlinkFailed(String),
}

impl fmt::Display for ExitCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::RemoteClosed => write!(f, "relay closed the connection"),
            Self::UplinkFailed(reason) => write!(f, "uplink failed: {}", reason),
            Self::DownlinkFailed(reason) => write!(f, "downlink failed: {}", reason),
        }
    }
}

/// Exit notice delivered to the session controller once both loops have
/// exited and all session resources are released
#[derive(Debug)]
pub(crate) struct PumpExit {
    pub generation: u64,
    pub cause: ExitCause,
}

/// One running capture/playback bridge, owned by the active call session
pub struct DuplexAudioPump {
    generation: u64,
    cancel: Arc<AtomicBool>,
    supervisor: Option<JoinHandle<()>>,
}

impl DuplexAudioPump {
    /// Spawn the two directional loops and their supervisor
    pub(crate) fn spawn(
        generation: u64,
        relay: RelayPair,
        audio: AudioPair,
        frame_bytes: usize,
        exit_tx: Sender<PumpExit>,
    ) -> std::io::Result<Self> {
        let cancel = Arc::new(AtomicBool::new(false));

        let mut capture = audio.capture;
        let mut relay_tx = relay.tx;
        let cancel_uplink = cancel.clone();
        let uplink = thread::Builder::new()
            .name("call-uplink".to_string())
            .spawn(move || uplink_loop(&mut *capture, &mut *relay_tx, &cancel_uplink))?;

        let mut playback = audio.playback;
        let mut relay_rx = relay.rx;
        let cancel_downlink = cancel.clone();
        let downlink = thread::Builder::new()
            .name("call-downlink".to_string())
            .spawn(move || downlink_loop(&mut *relay_rx, &mut *playback, &cancel_downlink, frame_bytes));

        let downlink = match downlink {
            Ok(handle) => handle,
            Err(e) => {
                cancel.store(true, Ordering::SeqCst);
                let _ = uplink.join();
                return Err(e);
            }
        };

        let supervisor = thread::Builder::new()
            .name("call-supervisor".to_string())
            .spawn(move || {
                // Each loop owns its direction's halves and releases them on
                // return; joining both therefore guarantees the socket and
                // device are gone before the exit is reported.
                let uplink_cause = uplink
                    .join()
                    .unwrap_or_else(|_| Some(ExitCause::UplinkFailed("loop panicked".to_string())));
                let downlink_cause = downlink.join().unwrap_or_else(|_| {
                    Some(ExitCause::DownlinkFailed("loop panicked".to_string()))
                });

                let cause = uplink_cause
                    .or(downlink_cause)
                    .unwrap_or(ExitCause::Stopped);
                let _ = exit_tx.send(PumpExit { generation, cause });
            });

        let supervisor = match supervisor {
            Ok(handle) => handle,
            Err(e) => {
                // The loops observe the flag and wind down detached
                cancel.store(true, Ordering::SeqCst);
                return Err(e);
            }
        };

        Ok(Self {
            generation,
            cancel,
            supervisor: Some(supervisor),
        })
    }

    /// Generation id distinguishing this pump from earlier sessions
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancel both loops and block until they have exited and every session
    /// resource is released
    pub fn stop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);

        if let Some(handle) = self.supervisor.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DuplexAudioPump {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Forward captured frames to the relay until cancelled or failed.
/// Returns the failure cause, or `None` when exiting on cancellation.
fn uplink_loop(
    capture: &mut dyn CaptureSource,
    relay_tx: &mut dyn RelayTx,
    cancel: &AtomicBool,
) -> Option<ExitCause> {
    while !cancel.load(Ordering::Relaxed) {
        let frame = match capture.read_frame() {
            Ok(CaptureRead::Frame(frame)) => frame,
            Ok(CaptureRead::TimedOut) => continue,
            Err(e) => {
                tracing::warn!("uplink capture failed: {}", e);
                cancel.store(true, Ordering::SeqCst);
                return Some(ExitCause::UplinkFailed(e.to_string()));
            }
        };

        // Retry bounded sends until the frame is out or the pump is cancelled
        loop {
            if cancel.load(Ordering::Relaxed) {
                return None;
            }
            match relay_tx.send(frame.as_bytes()) {
                Ok(SendStatus::Sent) => break,
                Ok(SendStatus::TimedOut) => continue,
                Err(e) => {
                    tracing::warn!("uplink send failed: {}", e);
                    cancel.store(true, Ordering::SeqCst);
                    return Some(ExitCause::UplinkFailed(e.to_string()));
                }
            }
        }
    }
    None
}

/// Play received frames until cancelled, failed, or the relay closes.
/// Returns the exit cause, or `None` when exiting on cancellation.
fn downlink_loop(
    relay_rx: &mut dyn RelayRx,
    playback: &mut dyn PlaybackSink,
    cancel: &AtomicBool,
    frame_bytes: usize,
) -> Option<ExitCause> {
    let mut buf = vec![0u8; frame_bytes];

    while !cancel.load(Ordering::Relaxed) {
        let received = match relay_rx.recv(&mut buf) {
            Ok(RelayRead::Data(n)) => n,
            Ok(RelayRead::TimedOut) => continue,
            Ok(RelayRead::Closed) => {
                cancel.store(true, Ordering::SeqCst);
                return Some(ExitCause::RemoteClosed);
            }
            Err(e) => {
                tracing::warn!("downlink receive failed: {}", e);
                cancel.store(true, Ordering::SeqCst);
                return Some(ExitCause::DownlinkFailed(e.to_string()));
            }
        };

        let frame = AudioFrame::from_bytes(Bytes::copy_from_slice(&buf[..received]));
        loop {
            if cancel.load(Ordering::Relaxed) {
                return None;
            }
            match playback.write_frame(frame.clone()) {
                Ok(WriteStatus::Queued) => break,
                Ok(WriteStatus::TimedOut) => continue,
                Err(e) => {
                    tracing::warn!("downlink playback failed: {}", e);
                    cancel.store(true, Ordering::SeqCst);
                    return Some(ExitCause::DownlinkFailed(e.to_string()));
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioSystem;
    use crate::config::AudioConfig;
    use crate::network::RelayConnector;
    use crate::session::testing::{FakeAudioSystem, FakeRelayConnector, HandleTracker};
    use crossbeam_channel::unbounded;
    use std::time::{Duration, Instant};

    fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    struct PumpFixture {
        tracker: HandleTracker,
        relay: crate::session::testing::FakeRelayEndpoints,
        audio: crate::session::testing::FakeAudioEndpoints,
        exit_rx: crossbeam_channel::Receiver<PumpExit>,
        pump: DuplexAudioPump,
    }

    fn start_pump() -> PumpFixture {
        let tracker = HandleTracker::default();
        let connector = FakeRelayConnector::new(tracker.clone());
        let audio_system = FakeAudioSystem::new(tracker.clone());

        let relay_pair = connector.connect().unwrap();
        let audio_pair = audio_system.open(&AudioConfig::default()).unwrap();
        let relay = connector.take_endpoints();
        let audio = audio_system.take_endpoints();

        let (exit_tx, exit_rx) = unbounded();
        let pump = DuplexAudioPump::spawn(1, relay_pair, audio_pair, 1024, exit_tx).unwrap();

        PumpFixture {
            tracker,
            relay,
            audio,
            exit_rx,
            pump,
        }
    }

    #[test]
    fn test_frames_flow_in_arrival_order() {
        let mut fixture = start_pump();

        // Uplink: 100 frames reach the relay in capture order
        for i in 0..100u8 {
            let frame = AudioFrame::from_bytes(Bytes::from(vec![i; 4]));
            fixture.audio.capture_feed.send(frame).unwrap();
        }
        for i in 0..100u8 {
            let sent = fixture
                .relay
                .sent
                .recv_timeout(Duration::from_secs(2))
                .unwrap();
            assert_eq!(sent[0], i);
        }

        // Downlink: 100 frames reach playback in receive order
        for i in 0..100u8 {
            fixture.relay.incoming.send(Bytes::from(vec![i; 4])).unwrap();
        }
        assert!(wait_until(Duration::from_secs(2), || {
            fixture.audio.played.lock().len() == 100
        }));
        let played = fixture.audio.played.lock();
        for (i, frame) in played.iter().enumerate() {
            assert_eq!(frame.as_bytes()[0], i as u8);
        }
        drop(played);

        fixture.pump.stop();
        let exit = fixture.exit_rx.try_recv().unwrap();
        assert_eq!(exit.generation, 1);
        assert_eq!(exit.cause, ExitCause::Stopped);
        assert_eq!(fixture.tracker.live(), 0);
    }

    #[test]
    fn test_stop_joins_both_loops_and_releases() {
        let mut fixture = start_pump();

        fixture.pump.stop();

        // Stop returns only once both loops exited and dropped their halves
        assert_eq!(fixture.tracker.live(), 0);
        let exit = fixture.exit_rx.try_recv().unwrap();
        assert_eq!(exit.cause, ExitCause::Stopped);
    }

    #[test]
    fn test_capture_failure_cancels_downlink() {
        let fixture = start_pump();

        // Dropping the capture feed makes the next uplink read fail
        drop(fixture.audio.capture_feed);

        let exit = fixture
            .exit_rx
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        assert!(matches!(exit.cause, ExitCause::UplinkFailed(_)));
        // Both loops are gone, not just the failed one
        assert_eq!(fixture.tracker.live(), 0);
    }

    #[test]
    fn test_playback_failure_cancels_uplink() {
        let fixture = start_pump();

        fixture
            .audio
            .playback_fail
            .store(true, std::sync::atomic::Ordering::SeqCst);
        fixture.relay.incoming.send(Bytes::from(vec![0; 4])).unwrap();

        let exit = fixture
            .exit_rx
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        assert!(matches!(exit.cause, ExitCause::DownlinkFailed(_)));
        assert_eq!(fixture.tracker.live(), 0);
    }

    #[test]
    fn test_relay_close_ends_pump() {
        let fixture = start_pump();

        drop(fixture.relay.incoming);

        let exit = fixture
            .exit_rx
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        assert_eq!(exit.cause, ExitCause::RemoteClosed);
        assert_eq!(fixture.tracker.live(), 0);
    }
}
