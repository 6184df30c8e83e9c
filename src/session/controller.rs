//! Call session controller
//!
//! The single serialization point for call lifecycle: control signals,
//! session start/stop, and pump-failure handling all funnel through one
//! mutex, so evaluate-state-plus-act is atomic and two pumps can never be
//! live at once. A reaper thread consumes pump exit notices so a session
//! that dies on an internal error is returned to idle without waiting for
//! the next control signal.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::audio::AudioSystem;
use crate::config::AudioConfig;
use crate::network::RelayConnector;
use crate::session::pump::{DuplexAudioPump, ExitCause, PumpExit};

/// How often the reaper wakes to check for shutdown
const REAPER_POLL: Duration = Duration::from_millis(50);

/// Call session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No call; waiting for a start signal
    Idle,
    /// Start accepted; acquiring the relay connection and audio device
    Starting,
    /// Pump running; audio is being bridged
    Active,
    /// Stop accepted; waiting for both loops to exit
    Stopping,
}

/// Inbound call control signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Start,
    Stop,
}

impl ControlSignal {
    /// Parse a control payload; `on` starts a call, `off` stops it
    pub fn from_payload(payload: &str) -> Option<Self> {
        match payload.trim() {
            "on" => Some(Self::Start),
            "off" => Some(Self::Stop),
            _ => None,
        }
    }
}

/// Observable session lifecycle events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Call bridged to the relay server
    Connected,
    /// Call ended, by stop signal or by the relay closing
    Disconnected,
    /// Call setup failed before the pump started
    ConnectFailed { reason: String },
    /// Active call ended on an unrecoverable loop error
    Failed { reason: String },
}

struct ControllerInner {
    state: SessionState,
    pump: Option<DuplexAudioPump>,
    next_generation: u64,
}

struct ControllerShared {
    inner: Mutex<ControllerInner>,
    event_tx: broadcast::Sender<SessionEvent>,
    connector: Arc<dyn RelayConnector>,
    audio: Arc<dyn AudioSystem>,
    audio_config: AudioConfig,
    exit_tx: Sender<PumpExit>,
    shutdown: AtomicBool,
}

/// Serialized state machine owning at most one active call session
pub struct CallSessionController {
    shared: Arc<ControllerShared>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl CallSessionController {
    pub fn new(
        connector: Arc<dyn RelayConnector>,
        audio: Arc<dyn AudioSystem>,
        audio_config: AudioConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(32);
        let (exit_tx, exit_rx) = unbounded();

        let shared = Arc::new(ControllerShared {
            inner: Mutex::new(ControllerInner {
                state: SessionState::Idle,
                pump: None,
                next_generation: 1,
            }),
            event_tx,
            connector,
            audio,
            audio_config,
            exit_tx,
            shutdown: AtomicBool::new(false),
        });

        let reaper = spawn_reaper(shared.clone(), exit_rx);

        Self {
            shared,
            reaper: Mutex::new(reaper),
        }
    }

    /// Handle one control signal; transitions are serialized and idempotent
    pub fn on_signal(&self, signal: ControlSignal) {
        self.shared.handle_signal(signal);
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.shared.inner.lock().state
    }

    /// Subscribe to session lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Process-teardown hook: end any active call and stop the reaper
    pub fn shutdown(&self) {
        self.shared.handle_signal(ControlSignal::Stop);
        self.shared.shutdown.store(true, Ordering::SeqCst);

        if let Some(handle) = self.reaper.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CallSessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_reaper(
    shared: Arc<ControllerShared>,
    exit_rx: Receiver<PumpExit>,
) -> Option<JoinHandle<()>> {
    thread::Builder::new()
        .name("session-reaper".to_string())
        .spawn(move || loop {
            match exit_rx.recv_timeout(REAPER_POLL) {
                Ok(exit) => shared.handle_pump_exit(exit),
                Err(RecvTimeoutError::Timeout) => {
                    if shared.shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        })
        .ok()
}

impl ControllerShared {
    fn handle_signal(&self, signal: ControlSignal) {
        let mut inner = self.inner.lock();
        match signal {
            ControlSignal::Start => self.handle_start(&mut inner),
            ControlSignal::Stop => self.handle_stop(&mut inner),
        }
    }

    fn handle_start(&self, inner: &mut ControllerInner) {
        if inner.state != SessionState::Idle {
            tracing::debug!(state = ?inner.state, "start signal ignored; call already up");
            return;
        }
        if self.shutdown.load(Ordering::SeqCst) {
            tracing::warn!("start signal ignored; controller is shut down");
            return;
        }

        inner.state = SessionState::Starting;
        match self.start_pump(inner) {
            Ok(()) => {
                inner.state = SessionState::Active;
                tracing::info!("connected to relay server");
                let _ = self.event_tx.send(SessionEvent::Connected);
            }
            Err(e) => {
                inner.state = SessionState::Idle;
                tracing::warn!("call setup failed: {}", e);
                let _ = self.event_tx.send(SessionEvent::ConnectFailed {
                    reason: e.to_string(),
                });
            }
        }
    }

    fn start_pump(&self, inner: &mut ControllerInner) -> crate::Result<()> {
        let relay = self.connector.connect()?;
        let audio = self.audio.open(&self.audio_config)?;

        let generation = inner.next_generation;
        inner.next_generation += 1;

        let pump = DuplexAudioPump::spawn(
            generation,
            relay,
            audio,
            self.audio_config.frame_bytes(),
            self.exit_tx.clone(),
        )?;
        inner.pump = Some(pump);
        Ok(())
    }

    fn handle_stop(&self, inner: &mut ControllerInner) {
        if inner.state == SessionState::Idle {
            tracing::debug!("stop signal ignored; no active call");
            return;
        }

        inner.state = SessionState::Stopping;
        if let Some(mut pump) = inner.pump.take() {
            // Blocks until both loops exited and resources are released
            pump.stop();
        }
        inner.state = SessionState::Idle;
        tracing::info!("disconnected from relay server");
        let _ = self.event_tx.send(SessionEvent::Disconnected);
    }

    fn handle_pump_exit(&self, exit: PumpExit) {
        let mut inner = self.inner.lock();

        // A notice from an already-reaped pump (explicit stop won the race)
        let current = inner.pump.as_ref().map(|pump| pump.generation());
        if current != Some(exit.generation) {
            return;
        }

        if let Some(mut pump) = inner.pump.take() {
            pump.stop();
        }
        inner.state = SessionState::Idle;

        match exit.cause {
            ExitCause::RemoteClosed => {
                tracing::info!("call ended by relay server");
                let _ = self.event_tx.send(SessionEvent::Disconnected);
            }
            cause => {
                tracing::warn!("call session failed: {}", cause);
                let _ = self.event_tx.send(SessionEvent::Failed {
                    reason: cause.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{FakeAudioSystem, FakeRelayConnector, HandleTracker};
    use proptest::prelude::*;
    use std::time::Instant;

    struct Fixture {
        tracker: HandleTracker,
        connector: Arc<FakeRelayConnector>,
        audio: Arc<FakeAudioSystem>,
        controller: CallSessionController,
    }

    fn fixture() -> Fixture {
        let tracker = HandleTracker::default();
        let connector = Arc::new(FakeRelayConnector::new(tracker.clone()));
        let audio = Arc::new(FakeAudioSystem::new(tracker.clone()));
        let controller = CallSessionController::new(
            connector.clone(),
            audio.clone(),
            AudioConfig::default(),
        );

        Fixture {
            tracker,
            connector,
            audio,
            controller,
        }
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

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

    #[test]
    fn test_control_signal_parsing() {
        assert_eq!(ControlSignal::from_payload("on"), Some(ControlSignal::Start));
        assert_eq!(ControlSignal::from_payload("off"), Some(ControlSignal::Stop));
        assert_eq!(ControlSignal::from_payload(" on\n"), Some(ControlSignal::Start));
        assert_eq!(ControlSignal::from_payload("restart"), None);
        assert_eq!(ControlSignal::from_payload(""), None);
    }

    #[test]
    fn test_repeated_start_acquires_nothing_new() {
        let f = fixture();
        let mut events = f.controller.subscribe();

        f.controller.on_signal(ControlSignal::Start);
        assert_eq!(f.controller.state(), SessionState::Active);
        assert_eq!(f.connector.connects(), 1);
        assert_eq!(f.audio.opens(), 1);

        f.controller.on_signal(ControlSignal::Start);
        assert_eq!(f.connector.connects(), 1);
        assert_eq!(f.audio.opens(), 1);

        assert_eq!(drain(&mut events), vec![SessionEvent::Connected]);
    }

    #[test]
    fn test_stop_releases_everything_across_cycles() {
        let f = fixture();

        for cycle in 1..=3 {
            f.controller.on_signal(ControlSignal::Start);
            assert_eq!(f.controller.state(), SessionState::Active);
            assert_eq!(f.tracker.live(), 4);

            f.controller.on_signal(ControlSignal::Stop);
            assert_eq!(f.controller.state(), SessionState::Idle);
            assert_eq!(f.tracker.live(), 0, "leak after cycle {}", cycle);
        }

        assert_eq!(f.connector.connects(), 3);
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let f = fixture();
        let mut events = f.controller.subscribe();

        f.controller.on_signal(ControlSignal::Stop);

        assert_eq!(f.controller.state(), SessionState::Idle);
        assert_eq!(f.connector.connects(), 0);
        assert!(drain(&mut events).is_empty());
    }

    #[test]
    fn test_unreachable_relay_returns_to_idle() {
        let f = fixture();
        let mut events = f.controller.subscribe();
        f.connector.fail_next_connect();

        f.controller.on_signal(ControlSignal::Start);

        assert_eq!(f.controller.state(), SessionState::Idle);
        // No audio loop was ever started
        assert_eq!(f.audio.opens(), 0);
        assert_eq!(f.tracker.live(), 0);
        assert!(matches!(
            drain(&mut events).as_slice(),
            [SessionEvent::ConnectFailed { .. }]
        ));

        // The next start succeeds again
        f.controller.on_signal(ControlSignal::Start);
        assert_eq!(f.controller.state(), SessionState::Active);
    }

    #[test]
    fn test_capture_failure_tears_down_session() {
        let f = fixture();
        let mut events = f.controller.subscribe();

        f.controller.on_signal(ControlSignal::Start);
        let endpoints = f.audio.take_endpoints();
        drop(endpoints.capture_feed);

        assert!(wait_until(Duration::from_secs(2), || {
            f.controller.state() == SessionState::Idle
        }));
        assert_eq!(f.tracker.live(), 0);

        let events = drain(&mut events);
        assert!(matches!(events[0], SessionEvent::Connected));
        assert!(matches!(events[1], SessionEvent::Failed { .. }));
    }

    #[test]
    fn test_relay_close_disconnects_session() {
        let f = fixture();
        let mut events = f.controller.subscribe();

        f.controller.on_signal(ControlSignal::Start);
        let endpoints = f.connector.take_endpoints();
        drop(endpoints.incoming);

        assert!(wait_until(Duration::from_secs(2), || {
            f.controller.state() == SessionState::Idle
        }));
        assert_eq!(f.tracker.live(), 0);

        let events = drain(&mut events);
        assert!(matches!(events[0], SessionEvent::Connected));
        assert!(matches!(events[1], SessionEvent::Disconnected));
    }

    #[test]
    fn test_telemetry_runs_through_a_full_call_cycle() {
        use crate::error::TelemetryError;
        use crate::telemetry::{TelemetryPublisher, TelemetryRecord, TelemetrySource};

        struct StaticSource;
        impl TelemetrySource for StaticSource {
            fn latest(&self) -> Result<TelemetryRecord, TelemetryError> {
                Ok(TelemetryRecord {
                    drone_id: "drone101".to_string(),
                    lat: 25.43,
                    long: 54.65,
                    bat: "85%".to_string(),
                })
            }
        }

        struct CountingPublisher(Arc<std::sync::atomic::AtomicUsize>);
        impl crate::control::ControlPublisher for CountingPublisher {
            fn publish(&self, _payload: &str) -> Result<(), crate::error::ControlError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let published = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut telemetry = TelemetryPublisher::start(
            Box::new(StaticSource),
            Arc::new(CountingPublisher(published.clone())),
            Duration::from_millis(20),
        )
        .unwrap();

        let f = fixture();
        f.controller.on_signal(ControlSignal::Start);
        let before = published.load(Ordering::SeqCst);
        assert!(wait_until(Duration::from_secs(2), || {
            published.load(Ordering::SeqCst) > before
        }));

        f.controller.on_signal(ControlSignal::Stop);
        let after_stop = published.load(Ordering::SeqCst);
        assert!(wait_until(Duration::from_secs(2), || {
            published.load(Ordering::SeqCst) > after_stop
        }));

        telemetry.stop();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// For any signal sequence the controller never holds more than one
        /// session's worth of resources, and a final stop releases them all.
        #[test]
        fn prop_signal_sequences_never_leak(signals in proptest::collection::vec(any::<bool>(), 0..8)) {
            let f = fixture();
            let mut live_sessions = 0usize;
            let mut expected_connects = 0usize;

            for &start in &signals {
                if start {
                    f.controller.on_signal(ControlSignal::Start);
                    if live_sessions == 0 {
                        live_sessions = 1;
                        expected_connects += 1;
                    }
                } else {
                    f.controller.on_signal(ControlSignal::Stop);
                    live_sessions = 0;
                }

                prop_assert_eq!(f.tracker.live(), live_sessions * 4);
                prop_assert!(f.tracker.live() <= 4);
            }

            prop_assert_eq!(f.connector.connects(), expected_connects);

            f.controller.shutdown();
            prop_assert_eq!(f.tracker.live(), 0);
        }
    }
}
