//! Audio Test File Generation Utilities
//!
//! Ramps are written as 32-bit float WAV so that decoded samples compare
//! exactly against [`ramp_value`].

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::Path;

/// Period of the ramp pattern in frames
const RAMP_PERIOD: u64 = 100;

/// Sample value the ramp holds at `frame`
pub fn ramp_value(frame: u64) -> f32 {
    (frame % RAMP_PERIOD) as f32 / 1000.0
}

/// Generate a float WAV whose every channel holds `ramp_value(frame)`
pub fn generate_ramp_wav<P: AsRef<Path>>(
    path: P,
    frames: u64,
    channels: u16,
    sample_rate: u32,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for frame in 0..frames {
        for _ in 0..channels {
            writer.write_sample(ramp_value(frame))?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Generate a 16-bit stereo sine wave WAV file
///
/// # Arguments
/// * `duration_ms` - Duration in milliseconds
/// * `frequency_hz` - Sine wave frequency in Hz (e.g., 440.0 for A4)
/// * `amplitude` - Amplitude 0.0-1.0 (0.5 recommended to avoid clipping)
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    duration_ms: u64,
    frequency_hz: f32,
    amplitude: f32,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    let total_frames = (sample_rate as u64 * duration_ms) / 1000;
    let amplitude_i16 = (amplitude.clamp(0.0, 1.0) * i16::MAX as f32) as i16;

    for frame in 0..total_frames {
        let t = frame as f32 / sample_rate as f32;
        let sample = ((2.0 * PI * frequency_hz * t).sin() * amplitude_i16 as f32) as i16;
        writer.write_sample(sample)?;
        writer.write_sample(sample)?;
    }

    writer.finalize()?;
    Ok(())
}
