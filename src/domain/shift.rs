//! Shift boundaries and ticket display numbers.
//!
//! A service date is split into shifts at the room's configured reset
//! times. Ticket numbering restarts at 1 in every shift and each shift is
//! labelled with a letter (`A`, `B`, ...), which prefixes the display
//! number: shift `A`, ticket 7 is shown as `A-007`.

use chrono::NaiveTime;

/// Shift labels for the first six shifts of a day.
const SHIFT_PREFIXES: [&str; 6] = ["A", "B", "C", "D", "E", "F"];

/// Default schedule: two shifts starting at 00:00 and 13:00.
fn default_reset_times() -> Vec<NaiveTime> {
    vec![NaiveTime::MIN, NaiveTime::from_hms_opt(13, 0, 0).unwrap_or(NaiveTime::MIN)]
}

/// Parses a comma-separated list of `HH:mm` reset times.
///
/// Blank and unparseable tokens are ignored. When nothing usable is left
/// (including a missing config) the default `[00:00, 13:00]` schedule is
/// returned. The result is always sorted ascending and never empty.
#[must_use]
pub fn parse_shift_reset_times(config: Option<&str>) -> Vec<NaiveTime> {
    let mut times: Vec<NaiveTime> = config
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(parse_time_of_day)
        .collect();

    if times.is_empty() {
        return default_reset_times();
    }

    times.sort_unstable();
    times
}

fn parse_time_of_day(token: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(token, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(token, "%H:%M:%S"))
        .ok()
}

/// Returns the shift label active at `current_time`.
///
/// The label is the index of the latest reset time that is `<=
/// current_time`. A time earlier than every reset time maps to the first
/// shift (`A`) rather than to the last shift of the previous day.
#[must_use]
pub fn current_shift_prefix(current_time: NaiveTime, reset_times: &[NaiveTime]) -> String {
    let index = reset_times
        .iter()
        .rposition(|reset| *reset <= current_time)
        .unwrap_or(0);
    shift_label(index)
}

/// Maps a zero-based shift index to its label; index 6 and above become
/// `S{index + 1}`.
#[must_use]
pub fn shift_label(index: usize) -> String {
    SHIFT_PREFIXES
        .get(index)
        .map_or_else(|| format!("S{}", index + 1), |prefix| (*prefix).to_string())
}

/// Renders a ticket number for display, e.g. `("A", 7)` -> `"A-007"`.
///
/// Presentation only: ordering always uses the numeric value.
#[must_use]
pub fn format_ticket_number(shift_prefix: &str, number: i32) -> String {
    format!("{shift_prefix}-{number:03}")
}
