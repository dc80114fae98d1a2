//! Audio output using cpal
//!
//! An [`AudioSink`] drives a [`PlaybackEngine`] from the output device's
//! clock. Opening is construction, closing is drop.
//!
//! The cpal data callback owns the engine and a scratch buffer allocated
//! before the stream starts. It takes no locks and never allocates or logs.
//! Stream errors arrive on cpal's separate error callback, which bumps the
//! device error counter in [`RealtimeHealth`] and logs.

use crate::error::{Error, Result};
use crate::playback::engine::PlaybackEngine;
use crate::playback::health::RealtimeHealth;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Scratch capacity in frames; larger device blocks are rendered in chunks
const SCRATCH_FRAMES: usize = 16384;

/// Stream format the engine produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub channels: u16,
    pub sample_rate: u32,
}

/// Realtime output device capability
pub trait AudioSink {
    /// Attach the engine and begin pulling blocks from it
    fn start(&mut self, engine: PlaybackEngine) -> Result<()>;

    /// Stop requesting blocks and release the engine. Safe to call repeatedly.
    fn stop(&mut self) -> Result<()>;

    fn device_name(&self) -> String;
}

/// Output device options coming from the command line or config file
#[derive(Debug, Clone, Default)]
pub struct DeviceOptions {
    /// Device name (None = default device)
    pub device: Option<String>,
    /// Fixed buffer size in frames (None = device default)
    pub buffer_size: Option<u32>,
}

/// Audio output manager using cpal
pub struct CpalSink {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    source_channels: u16,
    stream: Option<Stream>,
    health: Arc<RealtimeHealth>,
}

impl CpalSink {
    /// List available audio output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open an output device for the given stream format.
    ///
    /// If the requested device is not found, falls back to the default
    /// device with a warning.
    ///
    /// # Errors
    /// `Error::SinkOpen` when no device is available or none of its
    /// configurations supports the stream's sample rate.
    pub fn open(spec: &StreamSpec, options: &DeviceOptions, health: Arc<RealtimeHealth>) -> Result<Self> {
        let device = Self::select_device(options.device.as_deref())?;

        let (mut config, sample_format) = Self::get_best_config(&device, spec)?;

        if let Some(size) = options.buffer_size {
            config.buffer_size = cpal::BufferSize::Fixed(size);
            debug!("Using requested buffer size: {} frames", size);
        } else {
            debug!("Using device default buffer size");
        }

        if config.channels != spec.channels {
            info!(
                "Remapping {} source channels onto {} device channels",
                spec.channels, config.channels
            );
        }

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
            config.sample_rate.0, config.channels, sample_format, config.buffer_size
        );

        Ok(Self {
            device,
            config,
            sample_format,
            source_channels: spec.channels,
            stream: None,
            health,
        })
    }

    fn select_device(requested: Option<&str>) -> Result<Device> {
        let host = cpal::default_host();

        if let Some(name) = requested {
            let mut devices = host
                .output_devices()
                .map_err(|e| Error::SinkOpen(format!("Failed to enumerate devices: {}", e)))?;

            if let Some(dev) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                info!("Found requested audio device: {}", name);
                return Ok(dev);
            }

            warn!("Requested device '{}' not found, falling back to default device", name);
            let dev = host.default_output_device().ok_or_else(|| {
                Error::SinkOpen(format!("Device '{}' not found and no default device available", name))
            })?;
            info!(
                "Using default audio device as fallback: {}",
                dev.name().unwrap_or_else(|_| "Unknown".to_string())
            );
            return Ok(dev);
        }

        let dev = host
            .default_output_device()
            .ok_or_else(|| Error::SinkOpen("No default output device found".to_string()))?;
        info!(
            "Using default audio device: {}",
            dev.name().unwrap_or_else(|_| "Unknown".to_string())
        );
        Ok(dev)
    }

    /// Pick a device configuration for the stream.
    ///
    /// Prefers the source's own channel count at the source's rate, then
    /// any channel count at that rate. f32 wins ties.
    fn get_best_config(device: &Device, spec: &StreamSpec) -> Result<(StreamConfig, SampleFormat)> {
        let rate = spec.sample_rate;
        let candidates: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| Error::SinkOpen(format!("Failed to get device configs: {}", e)))?
            .filter(|c| c.min_sample_rate().0 <= rate && c.max_sample_rate().0 >= rate)
            .filter(|c| is_supported_format(c.sample_format()))
            .collect();

        let rank = |c: &cpal::SupportedStreamConfigRange| {
            (
                c.channels() != spec.channels,
                c.sample_format() != SampleFormat::F32,
            )
        };

        let best = candidates
            .into_iter()
            .min_by_key(rank)
            .ok_or_else(|| Error::SinkOpen(format!("No output configuration supports {} Hz", rate)))?;

        let sample_format = best.sample_format();
        let config = best.with_sample_rate(cpal::SampleRate(rate)).config();
        Ok((config, sample_format))
    }

    /// Build the stream for sample type `T`.
    ///
    /// The data closure moves the engine and the scratch buffer onto the
    /// audio thread; dropping the stream drops both.
    fn build_stream<T>(&self, mut engine: PlaybackEngine) -> Result<Stream>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let device_channels = self.config.channels as usize;
        let source_channels = self.source_channels as usize;
        let mut scratch = vec![0.0f32; SCRATCH_FRAMES * source_channels];
        let health = Arc::clone(&self.health);

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    for block in data.chunks_mut(SCRATCH_FRAMES * device_channels) {
                        let frames = block.len() / device_channels;
                        let rendered = &mut scratch[..frames * source_channels];
                        engine.render(rendered);
                        remap_channels(rendered, source_channels, block, device_channels);
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    health.record_device_error();
                },
                None,
            )
            .map_err(|e| Error::SinkOpen(format!("Failed to build stream: {}", e)))
    }
}

impl AudioSink for CpalSink {
    fn start(&mut self, engine: PlaybackEngine) -> Result<()> {
        if self.stream.is_some() {
            return Err(Error::InvalidState("Audio stream already started".to_string()));
        }
        if engine.channels() != self.source_channels {
            return Err(Error::SinkStart(format!(
                "Engine produces {} channels, sink was opened for {}",
                engine.channels(),
                self.source_channels
            )));
        }

        info!("Starting audio stream");

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(engine)?,
            SampleFormat::I16 => self.build_stream::<i16>(engine)?,
            SampleFormat::U16 => self.build_stream::<u16>(engine)?,
            sample_format => {
                return Err(Error::SinkStart(format!(
                    "Unsupported sample format: {:?}",
                    sample_format
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::SinkStart(format!("Failed to start stream: {}", e)))?;

        self.stream = Some(stream);

        info!("Audio stream started successfully");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            info!("Stopping audio stream");
            let paused = stream.pause();
            // Dropping the stream joins the callback and releases the engine
            drop(stream);
            paused.map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e)))?;
        }
        Ok(())
    }

    fn device_name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "Unknown".to_string())
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn is_supported_format(format: SampleFormat) -> bool {
    matches!(format, SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16)
}

/// Copy interleaved frames between channel layouts, converting samples.
///
/// Mono is duplicated to every device channel. Otherwise channels map one to
/// one; extra device channels get silence and extra source channels are
/// dropped. Samples are clamped to `[-1, 1]` before conversion.
fn remap_channels<T>(input: &[f32], in_channels: usize, output: &mut [T], out_channels: usize)
where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    for (src, dst) in input.chunks(in_channels).zip(output.chunks_mut(out_channels)) {
        for (i, sample) in dst.iter_mut().enumerate() {
            let value = if in_channels == 1 {
                src[0]
            } else {
                src.get(i).copied().unwrap_or(0.0)
            };
            *sample = T::from_sample(value.clamp(-1.0, 1.0));
        }
    }
}
