//! Console command parsing
//!
//! One command per input line. Single-key commands keep the keys of the
//! original curses interface; `o` and `g` take an argument.

use cscribe_common::human_time::parse_clock;
use cscribe_common::{Error, Result};
use std::path::PathBuf;

/// A parsed user command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `'`
    JumpToMark,
    /// `<`
    TempoDown,
    /// `>`
    TempoUp,
    /// `h`
    Help,
    /// `j`
    Back,
    /// `k`
    Forward,
    /// `m`
    SetMark,
    /// `o <path>`
    Open(PathBuf),
    /// `g <seconds>` or `g <m:ss>`
    SeekTo(f64),
    /// `q`
    Quit,
    /// Empty line
    Redraw,
}

impl Command {
    /// Parse one input line.
    ///
    /// # Errors
    /// `Error::InvalidInput` with a message suitable for the mode line.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (key, arg) = match line.char_indices().nth(1) {
            Some((split, _)) => (&line[..split], line[split..].trim()),
            None => (line, ""),
        };

        let command = match key {
            "" => Command::Redraw,
            "o" => {
                if arg.is_empty() {
                    return Err(Error::InvalidInput("Usage: o <path to audio file>".to_string()));
                }
                Command::Open(PathBuf::from(arg))
            }
            "g" => {
                let seconds = parse_clock(arg).ok_or_else(|| {
                    Error::InvalidInput(format!("Not a time: '{}' (use seconds or m:ss)", arg))
                })?;
                Command::SeekTo(seconds)
            }
            _ if !arg.is_empty() => return Err(unknown(line)),
            "'" => Command::JumpToMark,
            "<" => Command::TempoDown,
            ">" => Command::TempoUp,
            "h" => Command::Help,
            "j" => Command::Back,
            "k" => Command::Forward,
            "m" => Command::SetMark,
            "q" => Command::Quit,
            _ => return Err(unknown(line)),
        };
        Ok(command)
    }
}

fn unknown(line: &str) -> Error {
    Error::InvalidInput(format!("Unknown command '{}'. Type h for the list of all commands.", line))
}
