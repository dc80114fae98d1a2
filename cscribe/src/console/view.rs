//! Text rendering of the player status
//!
//! The view reads transport getters one at a time. Fields may come from
//! slightly different instants; that is fine for display.

use crate::playback::transport::TransportState;
use cscribe_common::human_time::{format_frames, format_tempo};

const GREETING: &str = "Welcome to cscribe!";
const DEFAULT_MODE_LINE: &str = "Type h for the list of all commands.";

const HELP_LINES: &[&str] = &[
    "': Jump to mark",
    "<: Decrease tempo",
    ">: Increase tempo",
    "h: Show / exit this help menu",
    "j: Back one seek step",
    "k: Forward one seek step",
    "m: Create mark",
    "o <path>: Open file",
    "g <m:ss>: Go to time",
    "q: Quit cscribe",
];

/// Best-effort copy of the transport fields the screen shows
#[derive(Debug, Clone, PartialEq)]
pub struct TransportSnapshot {
    pub song_name: String,
    pub position_frames: u64,
    pub duration_frames: u64,
    pub mark_frames: Option<u64>,
    pub tempo: f32,
    pub sample_rate: u32,
}

impl TransportSnapshot {
    pub fn capture(transport: &TransportState) -> Self {
        Self {
            song_name: transport.song_name().to_string(),
            position_frames: transport.position_frames(),
            duration_frames: transport.duration_frames(),
            mark_frames: transport.mark(),
            tempo: transport.tempo(),
            sample_rate: transport.sample_rate(),
        }
    }
}

/// Screen state that isn't part of the transport
#[derive(Debug, Clone)]
pub struct StatusView {
    width: usize,
    mode_line: String,
    read_failures: u64,
    show_help: bool,
}

impl StatusView {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(20),
            mode_line: DEFAULT_MODE_LINE.to_string(),
            read_failures: 0,
            show_help: false,
        }
    }

    pub fn set_mode_line(&mut self, message: impl Into<String>) {
        self.mode_line = message.into();
    }

    pub fn reset_mode_line(&mut self) {
        self.mode_line = DEFAULT_MODE_LINE.to_string();
    }

    pub fn mode_line(&self) -> &str {
        &self.mode_line
    }

    pub fn set_read_failures(&mut self, total: u64) {
        self.read_failures = total;
    }

    /// Help replaces the main screen until toggled again
    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    /// Render the whole screen
    pub fn render(&self, song: Option<&TransportSnapshot>) -> String {
        let mut lines = Vec::new();

        if self.show_help {
            lines.push(self.center("cscribe help:"));
            lines.push(String::new());
            lines.extend(HELP_LINES.iter().map(|l| l.to_string()));
        } else {
            lines.push(self.center(GREETING));
            lines.push(String::new());
            match song {
                None => lines.push("Type o to open an audio file.".to_string()),
                Some(song) => self.render_song(song, &mut lines),
            }
            if self.read_failures > 0 {
                lines.push(String::new());
                lines.push(format!(
                    "! {} audio blocks could not be read and were played as silence",
                    self.read_failures
                ));
            }
        }

        lines.push(String::new());
        lines.push(self.mode_line.clone());
        lines.join("\n")
    }

    fn render_song(&self, song: &TransportSnapshot, lines: &mut Vec<String>) {
        let bar_len = self.width / 2;
        lines.push(self.center(&song.song_name));
        lines.push(String::new());
        lines.push(self.center(&progress_bar(
            song.position_frames,
            song.duration_frames,
            song.mark_frames,
            bar_len,
        )));
        lines.push(String::new());
        lines.push(self.center(&format!(
            "{} | {}",
            format_frames(song.position_frames, song.sample_rate),
            format_tempo(song.tempo)
        )));
        if let Some(mark) = song.mark_frames {
            lines.push(String::new());
            lines.push(self.center(&format!(
                "(*) mark set at {}",
                format_frames(mark, song.sample_rate)
            )));
        }
    }

    fn center(&self, text: &str) -> String {
        let len = text.chars().count();
        let pad = self.width.saturating_sub(len) / 2;
        format!("{}{}", " ".repeat(pad), text)
    }
}

/// `[====      ]` with `len` inner cells and `*` where the mark sits
pub fn progress_bar(position: u64, duration: u64, mark: Option<u64>, len: usize) -> String {
    if len == 0 || duration == 0 {
        return "[]".to_string();
    }

    let fraction = |frames: u64| frames.min(duration) as f64 / duration as f64;
    let filled = ((fraction(position) * len as f64).ceil() as usize).min(len);

    let mut cells: Vec<char> = std::iter::repeat('=')
        .take(filled)
        .chain(std::iter::repeat(' ').take(len - filled))
        .collect();

    if let Some(mark) = mark {
        let at = ((fraction(mark) * len as f64) as usize).min(len - 1);
        cells[at] = '*';
    }

    format!("[{}]", cells.into_iter().collect::<String>())
}
