//! This module is responsible for SRT parsing and serialization.
//! Timestamps are carried as the raw time-range line so a parse/format
//! round trip never rewrites them.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Token separating the start and end timestamps of a cue.
pub const TIME_SEPARATOR: &str = "-->";

/// Value returned by [`total_duration`] when the end timestamp is unreadable.
pub const DURATION_UNAVAILABLE: &str = "N/A";

/// Represents a single SRT cue (index, time range line, text).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleEntry {
    /// Ordinal from the source file; not necessarily contiguous.
    pub index: u32,
    /// The time range line exactly as it appeared, e.g. `00:00:01,000 --> 00:00:02,000`.
    pub time_range: String,
    /// Cue text, lines joined with `\n`.
    pub text: String,
}

/// Parse SRT text into a list of entries.
///
/// A leading byte order mark is dropped. Blocks are separated by a blank
/// line. A block needs a numeric index line,
/// a line containing [`TIME_SEPARATOR`] and at least one text line; blocks
/// that do not qualify are skipped. An input without a single valid block
/// yields an empty vector, which callers treat as an invalid document.
pub fn parse(input: &str) -> Vec<SubtitleEntry> {
    trace!("parse len={}", input.len());
    let input = input.strip_prefix('\u{FEFF}').unwrap_or(input);
    let normalized = input.replace("\r\n", "\n").replace('\r', "\n");
    let mut entries = Vec::new();
    let mut skipped = 0usize;
    for block in normalized.split("\n\n") {
        match parse_block(block) {
            Some(entry) => entries.push(entry),
            None if block.trim().is_empty() => {}
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!("skipped {skipped} malformed subtitle block(s)");
    }
    entries
}

/// Parse one blank-line separated block.
fn parse_block(block: &str) -> Option<SubtitleEntry> {
    let lines: Vec<&str> = block.trim().split('\n').collect();
    if lines.len() < 3 {
        return None;
    }
    let index: u32 = lines[0].trim().parse().ok()?;
    let time_range = lines[1];
    if !time_range.contains(TIME_SEPARATOR) {
        return None;
    }
    let text = lines[2..].join("\n");
    if text.is_empty() {
        return None;
    }
    Some(SubtitleEntry {
        index,
        time_range: time_range.to_string(),
        text,
    })
}

/// Format entries back to SRT text.
/// Each entry becomes `index\ntime_range\ntext`; entries are joined by one blank line.
pub fn format(entries: &[SubtitleEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}\n{}\n{}", e.index, e.time_range, e.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Human readable length of the document, taken from the end timestamp of the last entry.
///
/// Units run from the largest non-zero one down to seconds, e.g. `1h 0m 12s`.
/// An empty document is `0s`; an unreadable end timestamp is [`DURATION_UNAVAILABLE`].
pub fn total_duration(entries: &[SubtitleEntry]) -> String {
    let Some(last) = entries.last() else {
        return "0s".to_string();
    };
    let end = last
        .time_range
        .split(TIME_SEPARATOR)
        .nth(1)
        .and_then(|t| parse_timestamp(t.trim()));
    match end {
        Some(ms) => format_duration(ms),
        None => DURATION_UNAVAILABLE.to_string(),
    }
}

/// Parse `HH:MM:SS,mmm` (a `.` before the milliseconds is accepted too) into milliseconds.
fn parse_timestamp(t: &str) -> Option<u64> {
    let parts: Vec<&str> = t.split([':', ',', '.']).collect();
    if parts.len() != 4 {
        return None;
    }
    let h: u64 = parts[0].trim().parse().ok()?;
    let m: u64 = parts[1].parse().ok()?;
    let s: u64 = parts[2].parse().ok()?;
    let ms: u64 = parts[3].parse().ok()?;
    h.checked_mul(60)?
        .checked_add(m)?
        .checked_mul(60)?
        .checked_add(s)?
        .checked_mul(1000)?
        .checked_add(ms)
}

fn format_duration(ms: u64) -> String {
    let total_secs = ms / 1000;
    let units = [
        (total_secs / 86_400, "d"),
        ((total_secs % 86_400) / 3600, "h"),
        ((total_secs % 3600) / 60, "m"),
        (total_secs % 60, "s"),
    ];
    let first = units.iter().position(|(v, _)| *v > 0).unwrap_or(units.len() - 1);
    units[first..]
        .iter()
        .map(|(v, unit)| format!("{v}{unit}"))
        .collect::<Vec<_>>()
        .join(" ")
}
