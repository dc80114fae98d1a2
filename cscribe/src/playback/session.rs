//! Engine lifecycle
//!
//! `Unloaded -> Loading -> Playing -> Stopped`
//!
//! A [`Session`] owns the active sink (which owns the engine, which owns the
//! source) and the current [`TransportState`]. Loading a file decodes it
//! while the previous song keeps playing; only once decoding succeeded is
//! the old sink stopped and a new one opened for the new stream format.
//!
//! Sinks are built by an injected [`SinkOpener`] so the lifecycle runs the
//! same way against a real device and in tests.

use crate::audio::sink::{AudioSink, StreamSpec};
use crate::audio::source::{AudioSource, DecodedSource};
use crate::error::{Error, Result};
use crate::playback::controller::TransportController;
use crate::playback::engine::PlaybackEngine;
use crate::playback::health::{spawn_monitor, RealtimeHealth, MONITOR_INTERVAL};
use crate::playback::transport::TransportState;
use cscribe_common::events::{EngineState, EventBus, ScribeEvent};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Builds an output sink for a stream format
pub type SinkOpener = Box<dyn FnMut(&StreamSpec, Arc<RealtimeHealth>) -> Result<Box<dyn AudioSink>>>;

/// One run of the player, from first load to stop
pub struct Session {
    state: EngineState,
    /// State to return to if the load in progress fails
    state_before_load: EngineState,
    transport: Option<Arc<TransportState>>,
    sink: Option<Box<dyn AudioSink>>,
    monitor_shutdown: Option<Arc<AtomicBool>>,
    monitor_interval: Duration,
    open_sink: SinkOpener,
    bus: EventBus,
}

impl Session {
    pub fn new(bus: EventBus, open_sink: SinkOpener) -> Self {
        Self {
            state: EngineState::Unloaded,
            state_before_load: EngineState::Unloaded,
            transport: None,
            sink: None,
            monitor_shutdown: None,
            monitor_interval: MONITOR_INTERVAL,
            open_sink,
            bus,
        }
    }

    /// Override the health polling interval (tests use a short one)
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Transport of the current song, if one was ever loaded
    pub fn transport(&self) -> Option<&Arc<TransportState>> {
        self.transport.as_ref()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Controller for the playing song; None unless `Playing`
    pub fn controller(&self) -> Option<TransportController> {
        if self.state != EngineState::Playing {
            return None;
        }
        self.transport
            .as_ref()
            .map(|t| TransportController::new(Arc::clone(t), self.bus.clone()))
    }

    /// Decode and play a file, replacing the current song.
    ///
    /// Blocks while decoding. See [`begin_load`](Self::begin_load) and
    /// [`finish_load`](Self::finish_load) to decode elsewhere.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        self.begin_load()?;
        let opened = DecodedSource::open(path).map(|s| Box::new(s) as Box<dyn AudioSource>);
        self.finish_load(path, opened)
    }

    /// Enter `Loading`. The current song, if any, keeps playing.
    ///
    /// # Errors
    /// `Error::InvalidState` once the session is stopped or while another
    /// load is in progress.
    pub fn begin_load(&mut self) -> Result<()> {
        match self.state {
            EngineState::Stopped => {
                return Err(Error::InvalidState("Session is stopped".to_string()));
            }
            EngineState::Loading => {
                return Err(Error::InvalidState("A file is already loading".to_string()));
            }
            EngineState::Unloaded | EngineState::Playing => {}
        }
        self.state_before_load = self.state;
        self.transition(EngineState::Loading);
        Ok(())
    }

    /// Complete a load started with [`begin_load`](Self::begin_load).
    ///
    /// On a source failure the previous song keeps playing and the state
    /// returns to what it was. On a sink failure the session stops; those
    /// errors are fatal.
    pub fn finish_load(&mut self, path: &Path, opened: Result<Box<dyn AudioSource>>) -> Result<()> {
        if self.state != EngineState::Loading {
            return Err(Error::InvalidState(format!("No load in progress (state {})", self.state)));
        }

        let source = match opened {
            Ok(source) => source,
            Err(e) => {
                warn!("Load failed: {}", e);
                self.bus.emit_lossy(ScribeEvent::LoadFailed {
                    path: path.display().to_string(),
                    message: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
                self.transition(self.state_before_load);
                return Err(e);
            }
        };

        // Old engine leaves the device before its source is released
        self.detach();

        let spec = StreamSpec {
            channels: source.channel_count(),
            sample_rate: source.sample_rate(),
        };
        let transport = Arc::new(TransportState::new(
            source.name(),
            source.frame_count(),
            spec.sample_rate,
            spec.channels,
        ));
        let health = Arc::new(RealtimeHealth::new());
        self.transport = Some(Arc::clone(&transport));

        let mut sink = match (self.open_sink)(&spec, Arc::clone(&health)) {
            Ok(sink) => sink,
            Err(e) => return Err(self.fail_device(as_open_error(e))),
        };

        let engine = PlaybackEngine::new(source, Arc::clone(&transport), Arc::clone(&health));
        if let Err(e) = sink.start(engine) {
            return Err(self.fail_device(as_start_error(e)));
        }

        info!(
            "Playing {} on {} ({} Hz, {} channels, {:.1}s)",
            transport.song_name(),
            sink.device_name(),
            spec.sample_rate,
            spec.channels,
            transport.duration_seconds()
        );
        self.sink = Some(sink);
        self.monitor_shutdown = Some(spawn_monitor(health, self.bus.clone(), self.monitor_interval));

        self.bus.emit_lossy(ScribeEvent::SongLoaded {
            song_name: transport.song_name().to_string(),
            duration_ms: transport.duration_frames() * 1000 / spec.sample_rate as u64,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            timestamp: chrono::Utc::now(),
        });
        self.transition(EngineState::Playing);
        Ok(())
    }

    /// Tear down playback. Idempotent.
    pub fn stop(&mut self) {
        if self.state == EngineState::Stopped {
            return;
        }
        self.detach();
        self.transition(EngineState::Stopped);
    }

    /// Stop the sink (releasing engine and source) and the health monitor
    fn detach(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.stop() {
                warn!("Failed to stop audio output cleanly: {}", e);
            }
        }
        if let Some(shutdown) = self.monitor_shutdown.take() {
            shutdown.store(true, Ordering::Relaxed);
        }
    }

    fn fail_device(&mut self, e: Error) -> Error {
        error!("Audio output failed: {}", e);
        self.detach();
        self.transition(EngineState::Stopped);
        e
    }

    fn transition(&mut self, new_state: EngineState) {
        if new_state == self.state {
            return;
        }
        let old_state = self.state;
        self.state = new_state;
        info!("Engine state: {} -> {}", old_state, new_state);
        self.bus.emit_lossy(ScribeEvent::EngineStateChanged {
            old_state,
            new_state,
            timestamp: chrono::Utc::now(),
        });
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.detach();
    }
}

fn as_open_error(e: Error) -> Error {
    match e {
        Error::SinkOpen(_) | Error::SinkStart(_) => e,
        other => Error::SinkOpen(other.to_string()),
    }
}

fn as_start_error(e: Error) -> Error {
    match e {
        Error::SinkOpen(_) | Error::SinkStart(_) => e,
        other => Error::SinkStart(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Slot = Arc<Mutex<Option<PlaybackEngine>>>;

    /// Sink that parks the engine where the test can render from it
    struct ManualSink {
        slot: Slot,
    }

    impl AudioSink for ManualSink {
        fn start(&mut self, engine: PlaybackEngine) -> Result<()> {
            *self.slot.lock().unwrap() = Some(engine);
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.slot.lock().unwrap().take();
            Ok(())
        }

        fn device_name(&self) -> String {
            "manual".to_string()
        }
    }

    fn manual_session() -> (Session, Slot, EventBus) {
        let bus = EventBus::new(64);
        let slot: Slot = Arc::new(Mutex::new(None));
        let sink_slot = Arc::clone(&slot);
        let opener: SinkOpener = Box::new(move |_spec, _health| {
            Ok(Box::new(ManualSink {
                slot: Arc::clone(&sink_slot),
            }) as Box<dyn AudioSink>)
        });
        (Session::new(bus.clone(), opener), slot, bus)
    }

    fn ramp(name: &str, frames: usize) -> Result<Box<dyn AudioSource>> {
        let samples = (0..frames).map(|f| f as f32).collect();
        Ok(Box::new(DecodedSource::from_samples(name, samples, 1, 10)?))
    }

    fn load_ramp(session: &mut Session, name: &str, frames: usize) -> Result<()> {
        session.begin_load()?;
        session.finish_load(Path::new(name), ramp(name, frames))
    }

    #[tokio::test]
    async fn test_load_attaches_engine_and_plays() {
        let (mut session, slot, _bus) = manual_session();
        assert_eq!(session.state(), EngineState::Unloaded);
        assert!(session.controller().is_none());

        load_ramp(&mut session, "etude", 100).unwrap();
        assert_eq!(session.state(), EngineState::Playing);

        let controller = session.controller().unwrap();
        controller.seek_to(8.0);

        let mut out = [0.0f32; 30];
        slot.lock().unwrap().as_mut().unwrap().render(&mut out);
        assert_eq!(out[0], 80.0);
        assert_eq!(out[20], 0.0);
        assert_eq!(session.transport().unwrap().position_frames(), 10);
    }

    #[tokio::test]
    async fn test_failed_first_load_returns_to_unloaded() {
        let (mut session, slot, bus) = manual_session();
        let mut rx = bus.subscribe();

        let err = session.load(Path::new("/nonexistent/song.flac")).unwrap_err();
        assert!(matches!(err, Error::SourceOpen { .. }));
        assert_eq!(session.state(), EngineState::Unloaded);
        assert!(session.transport().is_none());
        assert!(slot.lock().unwrap().is_none());

        let mut saw_failure = false;
        while let Ok(event) = rx.try_recv() {
            if let ScribeEvent::LoadFailed { path, .. } = event {
                assert!(path.contains("song.flac"));
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn test_failed_switch_keeps_current_song() {
        let (mut session, slot, _bus) = manual_session();
        load_ramp(&mut session, "first", 100).unwrap();
        session.controller().unwrap().seek_to(4.0);

        assert!(session.load(Path::new("/nonexistent/second.wav")).is_err());

        assert_eq!(session.state(), EngineState::Playing);
        assert_eq!(session.transport().unwrap().song_name(), "first");
        assert_eq!(session.transport().unwrap().position_frames(), 40);
        assert!(slot.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_switch_replaces_transport() {
        let (mut session, slot, _bus) = manual_session();
        load_ramp(&mut session, "first", 100).unwrap();
        let first = Arc::clone(session.transport().unwrap());
        session.controller().unwrap().seek_to(5.0);

        load_ramp(&mut session, "second", 50).unwrap();
        let second = session.transport().unwrap();
        assert_eq!(second.song_name(), "second");
        assert_eq!(second.duration_frames(), 50);
        assert_eq!(second.position_frames(), 0);

        // The attached engine follows the new transport
        let mut out = [0.0f32; 4];
        slot.lock().unwrap().as_mut().unwrap().render(&mut out);
        assert_eq!(second.position_frames(), 4);
        assert_eq!(first.position_frames(), 50);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_terminal() {
        let (mut session, slot, bus) = manual_session();
        load_ramp(&mut session, "etude", 100).unwrap();
        let mut rx = bus.subscribe();

        session.stop();
        session.stop();
        assert_eq!(session.state(), EngineState::Stopped);
        assert!(slot.lock().unwrap().is_none());
        assert!(session.controller().is_none());

        let transitions: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| matches!(e, ScribeEvent::EngineStateChanged { .. }))
            .collect();
        assert_eq!(transitions.len(), 1);

        let err = load_ramp(&mut session, "again", 10).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_sink_open_failure_stops_session() {
        let bus = EventBus::new(16);
        let opener: SinkOpener = Box::new(|_spec, _health| Err(Error::SinkOpen("no device".to_string())));
        let mut session = Session::new(bus, opener);

        let err = load_ramp(&mut session, "etude", 100).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(session.state(), EngineState::Stopped);
    }

    /// Opens fine but refuses to start, like a device that vanished in between
    struct RefusingSink;

    impl AudioSink for RefusingSink {
        fn start(&mut self, _engine: PlaybackEngine) -> Result<()> {
            Err(Error::SinkStart("device busy".to_string()))
        }

        fn stop(&mut self) -> Result<()> {
            Ok(())
        }

        fn device_name(&self) -> String {
            "refusing".to_string()
        }
    }

    #[tokio::test]
    async fn test_sink_start_failure_stops_session() {
        let bus = EventBus::new(16);
        let opener: SinkOpener = Box::new(|_spec, _health| Ok(Box::new(RefusingSink) as Box<dyn AudioSink>));
        let mut session = Session::new(bus.clone(), opener);
        let mut rx = bus.subscribe();

        let err = load_ramp(&mut session, "etude", 100).unwrap_err();
        assert!(matches!(err, Error::SinkStart(_)));
        assert!(err.is_fatal());
        assert_eq!(session.state(), EngineState::Stopped);
        assert!(session.controller().is_none());

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(!events.iter().any(|e| matches!(e, ScribeEvent::SongLoaded { .. })));
        assert!(matches!(
            events.last(),
            Some(ScribeEvent::EngineStateChanged {
                new_state: EngineState::Stopped,
                ..
            })
        ));

        // A later load is refused rather than reopening the device
        let again = load_ramp(&mut session, "again", 10).unwrap_err();
        assert!(matches!(again, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_lifecycle_events_in_order() {
        let (mut session, _slot, bus) = manual_session();
        let mut rx = bus.subscribe();
        load_ramp(&mut session, "etude", 100).unwrap();

        let types: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.event_type())
            .collect();
        assert_eq!(types, vec!["EngineStateChanged", "SongLoaded", "EngineStateChanged"]);
    }
}
