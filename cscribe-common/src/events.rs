//! Event types for the cscribe event system
//!
//! Events flow from the command context (transport commands, file loading)
//! and the realtime health monitor to the presentation layer. The realtime
//! audio callback never emits events directly; it only bumps counters that
//! the monitor turns into events.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Engine lifecycle state
///
/// `Unloaded -> Loading -> Playing -> Stopped`. A failed load returns to the
/// state held before the attempt. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Unloaded,
    Loading,
    Playing,
    Stopped,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Unloaded => write!(f, "unloaded"),
            EngineState::Loading => write!(f, "loading"),
            EngineState::Playing => write!(f, "playing"),
            EngineState::Stopped => write!(f, "stopped"),
        }
    }
}

/// cscribe event types
///
/// Every variant except the error reports doubles as a refresh request for
/// the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScribeEvent {
    /// Engine lifecycle transition
    EngineStateChanged {
        old_state: EngineState,
        new_state: EngineState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A new file was decoded and attached to the output
    SongLoaded {
        song_name: String,
        duration_ms: u64,
        sample_rate: u32,
        channels: u16,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Opening a file failed; previous state is unchanged
    LoadFailed {
        path: String,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Position, mark or tempo changed by a user command
    TransportChanged {
        position_ms: u64,
        /// None when no mark is set
        mark_ms: Option<u64>,
        tempo: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Realtime reads from the source failed and were replaced with silence
    RealtimeReadFailure {
        /// Failures since the engine was attached
        total_failures: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The output stream reported an error; playback cannot continue
    AudioDeviceError {
        total_errors: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl ScribeEvent {
    /// Event type name, used as a log label
    pub fn event_type(&self) -> &'static str {
        match self {
            ScribeEvent::EngineStateChanged { .. } => "EngineStateChanged",
            ScribeEvent::SongLoaded { .. } => "SongLoaded",
            ScribeEvent::LoadFailed { .. } => "LoadFailed",
            ScribeEvent::TransportChanged { .. } => "TransportChanged",
            ScribeEvent::RealtimeReadFailure { .. } => "RealtimeReadFailure",
            ScribeEvent::AudioDeviceError { .. } => "AudioDeviceError",
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use cscribe_common::events::{EngineState, EventBus, ScribeEvent};
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(ScribeEvent::EngineStateChanged {
///     old_state: EngineState::Loading,
///     new_state: EngineState::Playing,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ScribeEvent>,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ScribeEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    pub fn emit(
        &self,
        event: ScribeEvent,
    ) -> Result<usize, broadcast::error::SendError<ScribeEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the absence of subscribers
    pub fn emit_lossy(&self, event: ScribeEvent) {
        let _ = self.tx.send(event);
    }
}
