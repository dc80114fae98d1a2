//! Transport controller
//!
//! Translates user commands into [`TransportState`] writes. Every operation
//! clamps instead of failing, then asks the presentation layer to refresh by
//! emitting a [`ScribeEvent::TransportChanged`].

use crate::playback::transport::TransportState;
use cscribe_common::events::{EventBus, ScribeEvent};
use std::sync::Arc;
use tracing::debug;

/// Command-context writer for one loaded song's transport
#[derive(Clone)]
pub struct TransportController {
    transport: Arc<TransportState>,
    bus: EventBus,
}

impl TransportController {
    pub fn new(transport: Arc<TransportState>, bus: EventBus) -> Self {
        Self { transport, bus }
    }

    pub fn transport(&self) -> &Arc<TransportState> {
        &self.transport
    }

    /// Seek to an absolute time, clamped into `[0, duration)`.
    ///
    /// Negative and NaN inputs seek to the start.
    pub fn seek_to(&self, seconds: f64) {
        let frames = self.seconds_to_frames(seconds);
        self.transport.set_position(frames);
        debug!("Seek to {:.2}s (frame {})", seconds, self.transport.position_frames());
        self.refresh();
    }

    /// Seek relative to the last known position
    ///
    /// The position read may be one engine block stale.
    pub fn seek_relative(&self, delta_seconds: f64) {
        let position = self.transport.position_frames() as i128;
        let target = (position + self.delta_frames(delta_seconds)).max(0);
        self.transport.set_position(u64::try_from(target).unwrap_or(u64::MAX));
        debug!(
            "Seek by {:+.2}s (frame {})",
            delta_seconds,
            self.transport.position_frames()
        );
        self.refresh();
    }

    /// Remember the current position as the mark
    pub fn set_mark_here(&self) {
        let position = self.transport.position_frames();
        self.transport.set_mark(position);
        debug!("Mark set at frame {}", position);
        self.refresh();
    }

    /// Return to the mark; does nothing while no mark is set
    pub fn jump_to_mark(&self) {
        match self.transport.mark() {
            Some(mark) => {
                self.transport.set_position(mark);
                debug!("Jumped to mark at frame {}", mark);
            }
            None => debug!("Jump to mark ignored: no mark set"),
        }
        self.refresh();
    }

    /// Change the display tempo by `delta`, saturating at 0
    pub fn adjust_tempo(&self, delta: f32) {
        self.transport.set_tempo(self.transport.tempo() + delta);
        debug!("Tempo now x{:.2}", self.transport.tempo());
        self.refresh();
    }

    fn seconds_to_frames(&self, seconds: f64) -> u64 {
        if seconds.is_nan() || seconds <= 0.0 {
            return 0;
        }
        // Float-to-int `as` saturates, and set_position clamps the rest
        (seconds * self.transport.sample_rate() as f64).round() as u64
    }

    /// Signed frame offset nearest to `seconds`; NaN is no offset
    fn delta_frames(&self, seconds: f64) -> i128 {
        (seconds * self.transport.sample_rate() as f64).round() as i128
    }

    fn refresh(&self) {
        let sample_rate = self.transport.sample_rate() as u64;
        self.bus.emit_lossy(ScribeEvent::TransportChanged {
            position_ms: self.transport.position_ms(),
            mark_ms: self.transport.mark().map(|m| m * 1000 / sample_rate),
            tempo: self.transport.tempo(),
            timestamp: chrono::Utc::now(),
        });
    }
}
