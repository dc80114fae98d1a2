//! Error types for the cscribe player
//!
//! Only the command context ever sees these. The realtime audio callback
//! converts its failures into silence plus a counter in
//! [`RealtimeHealth`](crate::playback::health::RealtimeHealth).

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the player
#[derive(Error, Debug)]
pub enum Error {
    /// File missing, unreadable or in an unsupported format
    #[error("Cannot open {}: {reason}", path.display())]
    SourceOpen { path: PathBuf, reason: String },

    /// No usable output device or configuration
    #[error("Audio device unavailable: {0}")]
    SinkOpen(String),

    /// Output stream could not be started
    #[error("Audio stream failed to start: {0}")]
    SinkStart(String),

    /// Other audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Operation not valid in the current engine state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared library (configuration, input)
    #[error(transparent)]
    Common(#[from] cscribe_common::Error),
}

impl Error {
    /// Device failures end the session; everything else is reported and survived
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::SinkOpen(_) | Error::SinkStart(_) | Error::AudioOutput(_)
        )
    }
}

/// Convenience Result type using the player Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_open_message_names_file() {
        let err = Error::SourceOpen {
            path: PathBuf::from("/music/take5.flac"),
            reason: "No audio track found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot open /music/take5.flac: No audio track found"
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_device_errors_are_fatal() {
        assert!(Error::SinkOpen("no device".into()).is_fatal());
        assert!(Error::SinkStart("busy".into()).is_fatal());
        assert!(!Error::InvalidState("stopped".into()).is_fatal());
    }
}
