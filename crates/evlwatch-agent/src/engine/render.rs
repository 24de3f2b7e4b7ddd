//! Text rendering of log blocks and record lines

use chrono::Local;

use evlwatch_common::{EventLevel, EventRecord};

/// Symbol of a line shown only as context
pub const CONTEXT_SYMBOL: char = '.';

/// Block header for a log
pub fn log_header(name: &str) -> String {
    format!("[[[{}]]]\n", name)
}

/// Block header for a log that could not be opened
pub fn missing_header(name: &str) -> String {
    format!("[[[{}:missing]]]\n", name)
}

/// Line symbol for a record at `level` under `threshold`.
///
/// All-class records are only `O` when everything is watched; otherwise they
/// are context lines.
pub fn symbol(level: EventLevel, threshold: EventLevel) -> char {
    match level {
        EventLevel::Crit => 'C',
        EventLevel::Warn => 'W',
        _ if threshold == EventLevel::All => 'O',
        _ => CONTEXT_SYMBOL,
    }
}

/// `<symbol> <Mon> <DD> <HH:MM:SS> <qualifier>.<eventid> <source> <message>`
pub fn render_line(symbol: char, record: &EventRecord, message: &str) -> String {
    format!(
        "{} {} {}.{} {} {}",
        symbol,
        record.timestamp.with_timezone(&Local).format("%b %d %H:%M:%S"),
        record.qualifier,
        record.event_id,
        record.source_name.replace(' ', "_"),
        message
    )
}

/// Marker following a collapsed run of identical lines
pub fn duplicate_marker(repeats: usize) -> String {
    format!("{} [the above message was repeated {} times]", CONTEXT_SYMBOL, repeats)
}

/// Cut `line` to at most `max` bytes on a character boundary
pub fn truncate_line(line: &mut String, max: usize) {
    if line.len() <= max {
        return;
    }
    let mut end = max;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    line.truncate(end);
}
