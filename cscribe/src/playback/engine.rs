//! Realtime playback engine
//!
//! [`PlaybackEngine::render`] is the production step invoked by the output
//! device once per audio block. Per block it:
//! 1. snapshots the transport position (one atomic load),
//! 2. copies frames from the source starting there, wrapping to frame 0 at
//!    the end of the song as many times as the block needs,
//! 3. advances the position by the block length with one compare-and-swap,
//! 4. always fills the whole block.
//!
//! **REAL-TIME SAFE**: no locks, no allocation, no logging, no I/O. Read
//! failures become silence plus a counter in [`RealtimeHealth`].

use crate::audio::source::AudioSource;
use crate::playback::health::RealtimeHealth;
use crate::playback::transport::TransportState;
use std::sync::Arc;

/// Looping producer feeding the output device from an [`AudioSource`]
///
/// Owns its source exclusively; dropping the engine releases the source.
pub struct PlaybackEngine {
    source: Box<dyn AudioSource>,
    transport: Arc<TransportState>,
    health: Arc<RealtimeHealth>,
    channels: usize,
}

impl PlaybackEngine {
    pub fn new(
        source: Box<dyn AudioSource>,
        transport: Arc<TransportState>,
        health: Arc<RealtimeHealth>,
    ) -> Self {
        let channels = source.channel_count().max(1) as usize;
        Self {
            source,
            transport,
            health,
            channels,
        }
    }

    /// Interleaved channel count of the blocks this engine produces
    pub fn channels(&self) -> u16 {
        self.channels as u16
    }

    pub fn transport(&self) -> &Arc<TransportState> {
        &self.transport
    }

    /// Fill `out` (interleaved, `channels()` samples per frame) with the next
    /// block of looping playback.
    ///
    /// A trailing partial frame, if any, is zeroed and not counted.
    pub fn render(&mut self, out: &mut [f32]) {
        let requested = out.len() / self.channels;
        let body = requested * self.channels;
        out[body..].fill(0.0);

        let duration = self.transport.duration_frames();
        if requested == 0 || duration == 0 {
            out.fill(0.0);
            return;
        }

        let start = self.transport.position_frames();
        let mut position = start % duration;
        let mut filled = 0usize;
        let mut short_read = false;
        let mut read_error = false;

        while filled < requested {
            let until_end = (duration - position) as usize;
            let frames = (requested - filled).min(until_end);
            let chunk = &mut out[filled * self.channels..(filled + frames) * self.channels];

            match self.source.read_frames(position, chunk) {
                Ok(read) if read == frames => {}
                Ok(read) => {
                    // Source ended early: keep timing, pad with silence
                    chunk[read * self.channels..].fill(0.0);
                    short_read = true;
                }
                Err(_) => {
                    read_error = true;
                    break;
                }
            }

            filled += frames;
            position = (position + frames as u64) % duration;
        }

        if read_error {
            out[..body].fill(0.0);
        }
        if read_error || short_read {
            self.health.record_read_failure();
        }

        self.transport.advance_from(start, requested as u64);
        self.health.record_block(requested as u64);
    }
}
