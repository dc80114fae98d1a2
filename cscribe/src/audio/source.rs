//! Decodable audio sources
//!
//! A source is a finite run of interleaved `f32` PCM frames addressed by
//! frame index. [`DecodedSource`] decodes the whole file with symphonia when
//! it is opened, so reads afterwards are plain memory copies: no I/O, no
//! allocation and bounded time, which is what the realtime engine needs.

use crate::error::{Error, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failure of a single realtime read
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    #[error("start frame {start} is past the end of the source ({frame_count} frames)")]
    OutOfRange { start: u64, frame_count: u64 },

    #[error("buffer of {len} samples is not a whole number of {channels}-channel frames")]
    Misaligned { len: usize, channels: u16 },
}

/// Seekable PCM frame source
///
/// Implementations must make `read_frames` safe to call from the realtime
/// audio callback: no blocking, no allocation.
pub trait AudioSource: Send {
    /// Display name of the source (file stem for files)
    fn name(&self) -> &str;

    /// Total decodable frames; fixed for the lifetime of the source
    fn frame_count(&self) -> u64;

    fn channel_count(&self) -> u16;

    fn sample_rate(&self) -> u32;

    /// Copy frames starting at `start_frame` into `out`.
    ///
    /// `out.len()` must be a multiple of `channel_count()`. Returns the number
    /// of frames copied, which is short only when the end of the source is
    /// reached. Samples in `out` past the returned frames are left untouched.
    fn read_frames(&mut self, start_frame: u64, out: &mut [f32]) -> std::result::Result<usize, ReadError>;
}

/// Source backed by fully decoded, interleaved PCM in memory
pub struct DecodedSource {
    name: String,
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
    frame_count: u64,
    /// One past the last frame read; `0 <= cursor <= frame_count`
    cursor: u64,
}

impl DecodedSource {
    /// Decode an entire audio file.
    ///
    /// # Errors
    /// `Error::SourceOpen` when the file is missing, the format is not
    /// recognised, no audio track exists, or nothing decodes.
    pub fn open(path: &Path) -> Result<Self> {
        let open_err = |reason: String| Error::SourceOpen {
            path: path.to_path_buf(),
            reason,
        };

        debug!("Decoding entire file: {}", path.display());

        let file = std::fs::File::open(path).map_err(|e| open_err(e.to_string()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create a hint to help the format registry guess the format
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| open_err(format!("Failed to probe format: {}", e)))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| open_err("No audio track found".to_string()))?;

        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate;
        let mut channels = track.codec_params.channels.map(|c| c.count() as u16);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| open_err(format!("Failed to create decoder: {}", e)))?;

        let mut samples = Vec::new();
        if let Some(n_frames) = track.codec_params.n_frames {
            let ch = channels.unwrap_or(2) as usize;
            samples.reserve(n_frames as usize * ch);
        }
        let mut sample_buf: Option<SampleBuffer<f32>> = None;
        let mut sample_buf_frames = 0usize;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    debug!("Reached end of file");
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(e) => {
                    warn!("Error reading packet: {}", e);
                    break;
                }
            };

            // Skip packets for other tracks
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error (skipping packet): {}", e);
                    continue;
                }
                Err(e) => {
                    warn!("Decoder failed: {}", e);
                    break;
                }
            };

            let spec = *decoded.spec();
            sample_rate.get_or_insert(spec.rate);
            let stream_channels = *channels.get_or_insert(spec.channels.count() as u16);
            if spec.channels.count() as u16 != stream_channels {
                warn!(
                    "Skipping packet with {} channels in a {}-channel stream",
                    spec.channels.count(),
                    stream_channels
                );
                continue;
            }

            let frames = decoded.capacity();
            if sample_buf.is_none() || sample_buf_frames < frames {
                sample_buf = Some(SampleBuffer::new(frames as u64, spec));
                sample_buf_frames = frames;
            }
            if let Some(buf) = sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
        }

        let sample_rate = sample_rate.ok_or_else(|| open_err("Sample rate not found".to_string()))?;
        let channels = channels.ok_or_else(|| open_err("Channel count not found".to_string()))?;

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let source = Self::from_samples(name, samples, channels, sample_rate)
            .map_err(|e| open_err(e.to_string()))?;

        info!(
            "Decoded {}: {} frames, {} Hz, {} channels",
            source.name, source.frame_count, source.sample_rate, source.channels
        );

        Ok(source)
    }

    /// Build a source from interleaved PCM already in memory.
    ///
    /// # Errors
    /// `Error::InvalidState` when the buffer is empty, the channel count or
    /// sample rate is zero, or the samples don't divide into whole frames.
    pub fn from_samples(
        name: impl Into<String>,
        samples: Vec<f32>,
        channels: u16,
        sample_rate: u32,
    ) -> Result<Self> {
        if channels == 0 || sample_rate == 0 {
            return Err(Error::InvalidState(format!(
                "Invalid stream format: {} channels at {} Hz",
                channels, sample_rate
            )));
        }
        if samples.len() % channels as usize != 0 {
            return Err(Error::InvalidState(format!(
                "{} samples do not form whole {}-channel frames",
                samples.len(),
                channels
            )));
        }
        if samples.is_empty() {
            return Err(Error::InvalidState("Source contains no audio frames".to_string()));
        }

        let frame_count = (samples.len() / channels as usize) as u64;
        Ok(Self {
            name: name.into(),
            samples,
            channels,
            sample_rate,
            frame_count,
            cursor: 0,
        })
    }

    /// Duration in whole milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.frame_count * 1000 / self.sample_rate as u64
    }
}

impl AudioSource for DecodedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_frames(&mut self, start_frame: u64, out: &mut [f32]) -> std::result::Result<usize, ReadError> {
        let channels = self.channels as usize;
        if out.len() % channels != 0 {
            return Err(ReadError::Misaligned {
                len: out.len(),
                channels: self.channels,
            });
        }
        if start_frame > self.frame_count {
            return Err(ReadError::OutOfRange {
                start: start_frame,
                frame_count: self.frame_count,
            });
        }

        let requested = out.len() / channels;
        let available = (self.frame_count - start_frame) as usize;
        let frames = requested.min(available);

        let from = start_frame as usize * channels;
        let len = frames * channels;
        out[..len].copy_from_slice(&self.samples[from..from + len]);

        self.cursor = start_frame + frames as u64;
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, channels: u16) -> DecodedSource {
        // Each sample encodes its frame index so reads are easy to check
        let samples = (0..frames)
            .flat_map(|f| std::iter::repeat(f as f32).take(channels as usize))
            .collect();
        DecodedSource::from_samples("ramp", samples, channels, 10).unwrap()
    }

    #[test]
    fn test_read_within_bounds() {
        let mut source = ramp(100, 2);
        let mut out = [0.0f32; 8];
        assert_eq!(source.read_frames(10, &mut out).unwrap(), 4);
        assert_eq!(out, [10.0, 10.0, 11.0, 11.0, 12.0, 12.0, 13.0, 13.0]);
        assert_eq!(source.cursor, 14);
    }

    #[test]
    fn test_short_read_at_end() {
        let mut source = ramp(100, 1);
        let mut out = [-1.0f32; 5];
        assert_eq!(source.read_frames(98, &mut out).unwrap(), 2);
        assert_eq!(out, [98.0, 99.0, -1.0, -1.0, -1.0]);
        assert_eq!(source.cursor, 100);

        assert_eq!(source.read_frames(100, &mut out).unwrap(), 0);
    }

    #[test]
    fn test_read_past_end_is_error() {
        let mut source = ramp(10, 1);
        let mut out = [0.0f32; 2];
        assert_eq!(
            source.read_frames(11, &mut out),
            Err(ReadError::OutOfRange { start: 11, frame_count: 10 })
        );
    }

    #[test]
    fn test_misaligned_buffer_is_error() {
        let mut source = ramp(10, 2);
        let mut out = [0.0f32; 3];
        assert!(matches!(
            source.read_frames(0, &mut out),
            Err(ReadError::Misaligned { len: 3, channels: 2 })
        ));
    }

    #[test]
    fn test_from_samples_validation() {
        assert!(DecodedSource::from_samples("empty", vec![], 2, 44100).is_err());
        assert!(DecodedSource::from_samples("odd", vec![0.0; 3], 2, 44100).is_err());
        assert!(DecodedSource::from_samples("mono0", vec![0.0; 4], 0, 44100).is_err());
        assert!(DecodedSource::from_samples("rate0", vec![0.0; 4], 1, 0).is_err());
    }

    #[test]
    fn test_properties() {
        let source = DecodedSource::from_samples("tone", vec![0.0; 44100 * 2], 2, 44100).unwrap();
        assert_eq!(source.name(), "tone");
        assert_eq!(source.frame_count(), 44100);
        assert_eq!(source.channel_count(), 2);
        assert_eq!(source.duration_ms(), 1000);
    }

    #[test]
    fn test_open_missing_file() {
        let err = DecodedSource::open(Path::new("/nonexistent/cscribe/track.wav")).err().unwrap();
        assert!(matches!(err, Error::SourceOpen { .. }));
    }
}
