//! # cscribe player library
//!
//! Looping audio playback for transcription practice: a file is decoded
//! once, then streamed round and round to the output device while the user
//! seeks, sets a mark and adjusts a tempo indicator.
//!
//! **Architecture:** symphonia decodes into memory, a realtime engine feeds
//! a cpal output stream from that memory, and a lock-free transport record
//! is shared between the engine and the command context.

pub mod audio;
pub mod console;
pub mod error;
pub mod playback;

pub use error::{Error, Result};
