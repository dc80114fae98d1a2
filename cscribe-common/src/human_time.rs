//! Human-readable time formatting and parsing for the console display

/// Format whole seconds as `M:SS`.
///
/// Minutes are not wrapped into hours; a 75 minute file shows `75:00`.
///
/// # Examples
///
/// ```
/// use cscribe_common::human_time::format_clock;
///
/// assert_eq!(format_clock(0), "0:00");
/// assert_eq!(format_clock(65), "1:05");
/// assert_eq!(format_clock(4500), "75:00");
/// ```
pub fn format_clock(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Format a frame offset as `M:SS` at the given sample rate
pub fn format_frames(frames: u64, sample_rate: u32) -> String {
    if sample_rate == 0 {
        return format_clock(0);
    }
    format_clock(frames / sample_rate as u64)
}

/// Format a tempo multiplier as shown next to the clock, e.g. `x1.00`
pub fn format_tempo(tempo: f32) -> String {
    format!("x{:.2}", tempo)
}

/// Parse a user-entered time: plain seconds (`95`, `12.5`) or `M:SS` (`1:35`).
///
/// Returns None for anything else, including negative values.
pub fn parse_clock(input: &str) -> Option<f64> {
    let input = input.trim();
    let seconds = match input.split_once(':') {
        Some((minutes, secs)) => {
            let minutes: u64 = minutes.parse().ok()?;
            let secs: f64 = secs.parse().ok()?;
            if !(0.0..60.0).contains(&secs) {
                return None;
            }
            minutes as f64 * 60.0 + secs
        }
        None => input.parse::<f64>().ok()?,
    };

    if seconds.is_finite() && seconds >= 0.0 {
        Some(seconds)
    } else {
        None
    }
}
