//! Realtime health counters and their monitor
//!
//! The audio callback may not log, lock or send on channels, so it reports
//! trouble by bumping the counters here. A monitoring task on the tokio
//! runtime polls the counters and turns changes into log lines and
//! [`ScribeEvent`]s for the presentation layer.

use cscribe_common::events::{EventBus, ScribeEvent};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default polling interval of the monitoring task
pub const MONITOR_INTERVAL: Duration = Duration::from_millis(100);

/// Lock-free counters shared between the engine, the sink and the monitor
///
/// **REAL-TIME SAFE**: every `record_*` method is a single relaxed atomic
/// increment.
#[derive(Debug, Default)]
pub struct RealtimeHealth {
    callback_count: AtomicU64,
    frames_rendered: AtomicU64,
    read_failures: AtomicU64,
    device_errors: AtomicU64,
}

impl RealtimeHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one audio block of `frames` frames
    pub fn record_block(&self, frames: u64) {
        self.callback_count.fetch_add(1, Ordering::Relaxed);
        self.frames_rendered.fetch_add(frames, Ordering::Relaxed);
    }

    /// Record a block that was replaced (fully or partly) with silence
    pub fn record_read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an error reported by the output stream
    pub fn record_device_error(&self) {
        self.device_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> HealthStats {
        HealthStats {
            callback_count: self.callback_count.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            device_errors: self.device_errors.load(Ordering::Relaxed),
        }
    }
}

/// Health counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthStats {
    pub callback_count: u64,
    pub frames_rendered: u64,
    pub read_failures: u64,
    pub device_errors: u64,
}

/// Tracks what the monitor has already reported
#[derive(Debug, Default)]
pub(crate) struct HealthReporter {
    last: HealthStats,
}

impl HealthReporter {
    /// Compare a new snapshot with the last one and produce the events to emit
    pub(crate) fn observe(&mut self, stats: HealthStats) -> Vec<ScribeEvent> {
        let mut events = Vec::new();

        if stats.read_failures > self.last.read_failures {
            warn!(
                "Realtime source reads failed: {} total (+{} since last check), silence substituted",
                stats.read_failures,
                stats.read_failures - self.last.read_failures
            );
            events.push(ScribeEvent::RealtimeReadFailure {
                total_failures: stats.read_failures,
                timestamp: chrono::Utc::now(),
            });
        }

        if stats.device_errors > self.last.device_errors {
            error!("Audio device reported {} stream errors", stats.device_errors);
            events.push(ScribeEvent::AudioDeviceError {
                total_errors: stats.device_errors,
                timestamp: chrono::Utc::now(),
            });
        }

        // Periodic health line (~every 1000 blocks)
        if stats.callback_count / 1000 > self.last.callback_count / 1000 {
            debug!(
                "Audio callback health: {} callbacks, {} frames, {} read failures",
                stats.callback_count, stats.frames_rendered, stats.read_failures
            );
        }

        self.last = stats;
        events
    }
}

/// Spawn the monitoring task for one engine attachment.
///
/// **Returns:** Shutdown flag (set to true to stop monitoring)
pub fn spawn_monitor(
    health: Arc<RealtimeHealth>,
    bus: EventBus,
    interval: Duration,
) -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);

    tokio::spawn(async move {
        let mut reporter = HealthReporter::default();
        let mut ticker = tokio::time::interval(interval);
        debug!("Health monitor started");

        while !shutdown_clone.load(Ordering::Relaxed) {
            ticker.tick().await;
            for event in reporter.observe(health.stats()) {
                let kind = event.event_type();
                if bus.emit(event).is_err() {
                    debug!("No subscriber for {} event", kind);
                }
            }
        }

        info!("Health monitor stopped");
    });

    shutdown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let health = RealtimeHealth::new();
        health.record_block(512);
        health.record_block(512);
        health.record_read_failure();

        let stats = health.stats();
        assert_eq!(stats.callback_count, 2);
        assert_eq!(stats.frames_rendered, 1024);
        assert_eq!(stats.read_failures, 1);
        assert_eq!(stats.device_errors, 0);
    }

    #[test]
    fn test_reporter_emits_only_on_change() {
        let health = RealtimeHealth::new();
        let mut reporter = HealthReporter::default();

        assert!(reporter.observe(health.stats()).is_empty());

        health.record_read_failure();
        health.record_read_failure();
        let events = reporter.observe(health.stats());
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            ScribeEvent::RealtimeReadFailure { total_failures: 2, .. }
        ));

        // Nothing new: nothing emitted
        assert!(reporter.observe(health.stats()).is_empty());

        health.record_device_error();
        let events = reporter.observe(health.stats());
        assert!(matches!(
            events[0],
            ScribeEvent::AudioDeviceError { total_errors: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_monitor_task_emits_events() {
        let health = Arc::new(RealtimeHealth::new());
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let shutdown = spawn_monitor(Arc::clone(&health), bus.clone(), Duration::from_millis(5));
        health.record_read_failure();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("monitor should report within timeout")
            .unwrap();
        assert!(matches!(event, ScribeEvent::RealtimeReadFailure { .. }));

        shutdown.store(true, Ordering::Relaxed);
    }

    #[tokio::test]
    async fn test_monitor_reports_stream_errors() {
        let health = Arc::new(RealtimeHealth::new());
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let shutdown = spawn_monitor(Arc::clone(&health), bus.clone(), Duration::from_millis(5));
        health.record_device_error();
        health.record_device_error();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("monitor should report within timeout")
            .unwrap();
        match event {
            ScribeEvent::AudioDeviceError { total_errors, .. } => assert!(total_errors >= 1),
            other => panic!("unexpected event {:?}", other),
        }

        shutdown.store(true, Ordering::Relaxed);
    }
}
