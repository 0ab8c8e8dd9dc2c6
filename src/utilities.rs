//! Internal utility functions.
//!
//! Helpers for timestamp parsing and formatting, clock-unit conversion and
//! big-endian reads that do not belong in any single public module.

use std::time::Duration;

/// Format a duration as SRT timestamp (HH:MM:SS,mmm).
pub(crate) fn format_srt_timestamp(duration: Duration) -> String {
    let (hours, minutes, seconds, millis) = split_timestamp(duration);
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

/// Format a duration as WebVTT timestamp (HH:MM:SS.mmm).
pub(crate) fn format_vtt_timestamp(duration: Duration) -> String {
    let (hours, minutes, seconds, millis) = split_timestamp(duration);
    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}

fn split_timestamp(duration: Duration) -> (u64, u64, u64, u32) {
    let total_secs = duration.as_secs();
    (
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60,
        duration.subsec_millis(),
    )
}

/// Parse `HH:MM:SS,mmm`, `HH:MM:SS.mmm` or `MM:SS.mmm`.
///
/// The fractional part may have any number of digits; ASS-style
/// centiseconds (`0:00:01.50`) parse as 1.5 seconds. Hour counts too large
/// to represent yield `None`.
pub(crate) fn parse_timestamp(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (clock, fraction) = match value.rfind([',', '.']) {
        Some(index) => (&value[..index], &value[index + 1..]),
        None => (value, ""),
    };

    let parts: Vec<&str> = clock.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (h.parse::<u64>().ok()?, m.parse::<u64>().ok()?, s.parse::<u64>().ok()?),
        [m, s] => (0, m.parse::<u64>().ok()?, s.parse::<u64>().ok()?),
        _ => return None,
    };
    if minutes >= 60 || seconds >= 60 {
        return None;
    }

    let nanos = if fraction.is_empty() {
        0
    } else {
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let digits: String = fraction.chars().take(9).collect();
        let scale = 10u32.pow(9 - digits.len() as u32);
        digits.parse::<u32>().ok()? * scale
    };

    let total = hours
        .checked_mul(3600)?
        .checked_add(minutes * 60 + seconds)?;
    Some(Duration::new(total, nanos))
}

/// Convert 90 kHz MPEG clock ticks to a duration.
pub(crate) fn duration_from_90khz(ticks: u64) -> Duration {
    Duration::from_nanos(ticks * 1_000_000_000 / 90_000)
}

/// Read a big-endian `u16` at `offset`, if in bounds.
pub(crate) fn read_be16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}
