//! Background telemetry publisher
//!
//! Periodically reads the latest telemetry record and publishes it on the
//! control channel's data topic. The loop runs for the lifetime of the
//! process, independent of call state; a missing or malformed record only
//! skips the current tick.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::control::ControlPublisher;
use crate::telemetry::source::TelemetrySource;

/// Background loop publishing telemetry reports at a fixed interval
pub struct TelemetryPublisher {
    stop_tx: Option<Sender<()>>,
    thread_handle: Option<JoinHandle<()>>,
    published: Arc<AtomicU64>,
}

impl TelemetryPublisher {
    /// Start the publisher loop; the first report goes out immediately
    pub fn start(
        source: Box<dyn TelemetrySource>,
        publisher: Arc<dyn ControlPublisher>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let published = Arc::new(AtomicU64::new(0));
        let published_for_loop = published.clone();

        let handle = thread::Builder::new()
            .name("telemetry".to_string())
            .spawn(move || {
                publish_loop(&*source, &*publisher, interval, &stop_rx, &published_for_loop);
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            thread_handle: Some(handle),
            published,
        })
    }

    /// Number of reports published so far
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Shutdown hook: end the loop and join the thread
    pub fn stop(&mut self) {
        // Dropping the sender wakes the interval wait immediately
        self.stop_tx.take();

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TelemetryPublisher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn publish_loop(
    source: &dyn TelemetrySource,
    publisher: &dyn ControlPublisher,
    interval: Duration,
    stop_rx: &Receiver<()>,
    published: &AtomicU64,
) {
    loop {
        tick(source, publisher, published);

        // The interval sleep doubles as the shutdown wait
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// One publish attempt; any failure skips the tick and keeps the loop alive
fn tick(source: &dyn TelemetrySource, publisher: &dyn ControlPublisher, published: &AtomicU64) {
    let record = match source.latest() {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!("skipping telemetry tick: {}", e);
            return;
        }
    };

    let report = record.format_report();
    match publisher.publish(&report) {
        Ok(()) => {
            published.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(report = %report, "published telemetry");
        }
        Err(e) => {
            // Best-effort channel: no retry within the tick
            tracing::warn!("telemetry publish failed: {}", e);
        }
    }
}
