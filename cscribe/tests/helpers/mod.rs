//! Test helpers for cscribe integration tests
//!
//! - audio_generator: deterministic WAV fixtures
//! - capture_sink: an `AudioSink` that lets the test pull blocks itself

#![allow(dead_code)]

pub mod audio_generator;
pub mod capture_sink;

pub use audio_generator::{generate_ramp_wav, generate_sine_wav, ramp_value};
pub use capture_sink::CaptureSink;
