//! Audio input and output adapters
//!
//! - [`source`]: decodable, seekable PCM sources (symphonia)
//! - [`sink`]: realtime output devices (cpal)

pub mod sink;
pub mod source;

pub use sink::{AudioSink, CpalSink, DeviceOptions, StreamSpec};
pub use source::{AudioSource, DecodedSource, ReadError};
