//! Sink that parks the engine for the test to drive

use cscribe::audio::sink::AudioSink;
use cscribe::playback::engine::PlaybackEngine;
use cscribe::Result;
use std::sync::{Arc, Mutex};

/// Shared slot holding the currently attached engine
pub type EngineSlot = Arc<Mutex<Option<PlaybackEngine>>>;

pub struct CaptureSink {
    slot: EngineSlot,
}

impl CaptureSink {
    pub fn new(slot: EngineSlot) -> Self {
        Self { slot }
    }

    /// Pull one block the way a device callback would.
    ///
    /// Returns None when no engine is attached.
    pub fn pull(slot: &EngineSlot, frames: usize, channels: usize) -> Option<Vec<f32>> {
        let mut guard = slot.lock().unwrap();
        let engine = guard.as_mut()?;
        let mut block = vec![0.0f32; frames * channels];
        engine.render(&mut block);
        Some(block)
    }
}

impl AudioSink for CaptureSink {
    fn start(&mut self, engine: PlaybackEngine) -> Result<()> {
        *self.slot.lock().unwrap() = Some(engine);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.slot.lock().unwrap().take();
        Ok(())
    }

    fn device_name(&self) -> String {
        "capture".to_string()
    }
}
