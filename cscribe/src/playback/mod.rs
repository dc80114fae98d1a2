//! Playback core
//!
//! - [`transport`]: lock-free shared position, mark and tempo
//! - [`engine`]: realtime looping producer
//! - [`controller`]: command-context transport writer
//! - [`health`]: realtime counters and their monitor task
//! - [`session`]: engine lifecycle state machine

pub mod controller;
pub mod engine;
pub mod health;
pub mod session;
pub mod transport;

pub use controller::TransportController;
pub use engine::PlaybackEngine;
pub use health::{HealthStats, RealtimeHealth};
pub use session::{Session, SinkOpener};
pub use transport::TransportState;
