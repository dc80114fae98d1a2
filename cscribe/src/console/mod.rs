//! Line-oriented console front end
//!
//! - [`commands`]: input parsing
//! - [`view`]: status screen rendering
//! - [`app`]: command loop and presentation task

pub mod app;
pub mod commands;
pub mod view;

pub use app::ConsoleApp;
pub use commands::Command;
pub use view::{StatusView, TransportSnapshot};
