//! Shared transport state
//!
//! The transport is read by the realtime engine on every audio block and by
//! the presentation layer whenever it redraws, and written by the command
//! context. Each control signal is an independent atomic scalar so the
//! realtime reader never needs a lock and can never see a torn value.
//! There are no multi-field transactions; readers that combine fields get
//! a best-effort view.
//!
//! Writers per field:
//! - `position_frames`: the engine (advance) and the controller (seek)
//! - `mark_frames`, `tempo`: the controller only

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Lock-free playback position, mark and tempo for one loaded song
#[derive(Debug)]
pub struct TransportState {
    /// Current frame, always `< duration_frames`
    position_frames: AtomicU64,

    /// Remembered frame; 0 means no mark
    mark_frames: AtomicU64,

    /// Display-only tempo multiplier, stored as `f32` bits
    tempo_bits: AtomicU32,

    duration_frames: u64,
    sample_rate: u32,
    channel_count: u16,
    song_name: String,
}

impl TransportState {
    /// Create the transport for a freshly loaded song, positioned at frame 0
    pub fn new(song_name: impl Into<String>, duration_frames: u64, sample_rate: u32, channel_count: u16) -> Self {
        Self {
            position_frames: AtomicU64::new(0),
            mark_frames: AtomicU64::new(0),
            tempo_bits: AtomicU32::new(1.0f32.to_bits()),
            duration_frames,
            sample_rate,
            channel_count,
            song_name: song_name.into(),
        }
    }

    // === Immutable song properties ===

    pub fn song_name(&self) -> &str {
        &self.song_name
    }

    pub fn duration_frames(&self) -> u64 {
        self.duration_frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_frames as f64 / self.sample_rate as f64
    }

    // === Getters (realtime and presentation safe) ===

    pub fn position_frames(&self) -> u64 {
        self.position_frames.load(Ordering::Acquire)
    }

    pub fn mark_frames(&self) -> u64 {
        self.mark_frames.load(Ordering::Acquire)
    }

    /// Mark position, or None when unset
    pub fn mark(&self) -> Option<u64> {
        match self.mark_frames() {
            0 => None,
            frames => Some(frames),
        }
    }

    pub fn tempo(&self) -> f32 {
        f32::from_bits(self.tempo_bits.load(Ordering::Acquire))
    }

    /// Position in whole milliseconds
    pub fn position_ms(&self) -> u64 {
        self.position_frames() * 1000 / self.sample_rate as u64
    }

    // === Setters (command context) ===

    /// Seek, clamping into `[0, duration_frames)`
    pub fn set_position(&self, frames: u64) {
        let clamped = frames.min(self.last_frame());
        self.position_frames.store(clamped, Ordering::Release);
    }

    /// Store a mark verbatim; 0 clears it
    pub fn set_mark(&self, frames: u64) {
        self.mark_frames.store(frames, Ordering::Release);
    }

    /// Set the tempo multiplier, clamping to `>= 0` (NaN becomes 0)
    pub fn set_tempo(&self, tempo: f32) {
        let clamped = if tempo > 0.0 { tempo } else { 0.0 };
        self.tempo_bits.store(clamped.to_bits(), Ordering::Release);
    }

    // === Engine-side update ===

    /// Advance from the position the engine snapshotted at the start of a
    /// block by `frames`, wrapping at the end of the song.
    ///
    /// The update is a single compare-and-swap against `snapshot`: if a seek
    /// landed while the block was being rendered, the seek wins and the
    /// advance is dropped. Returns the position now in effect.
    pub fn advance_from(&self, snapshot: u64, frames: u64) -> u64 {
        if self.duration_frames == 0 {
            return 0;
        }
        let next = (snapshot % self.duration_frames + frames % self.duration_frames) % self.duration_frames;
        match self.position_frames.compare_exchange(
            snapshot,
            next,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => next,
            Err(current) => current,
        }
    }

    fn last_frame(&self) -> u64 {
        self.duration_frames.saturating_sub(1)
    }
}
