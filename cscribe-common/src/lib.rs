//! # cscribe common library
//!
//! Shared code for the cscribe player and any front end built on it:
//! - Error type
//! - TOML configuration loading
//! - Event types and the EventBus
//! - Human-readable time formatting

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;

pub use error::{Error, Result};
