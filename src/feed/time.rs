//! Publish time and client label parsing.
//!
//! The feed writes times relative to the viewer: `刚刚`, `5分钟前`,
//! `今天 14:30`, `10月19日 14:30`, or an absolute `2023-05-06 14:30:12`,
//! optionally followed by `来自<client>`. Labels without a year are read
//! against the current date, so a `12月31日` label parsed on January 1st lands
//! in the wrong year.

use chrono::{Datelike, Duration, NaiveDateTime, Timelike};

use super::markup::CLIENT_MARKER;

const JUST_NOW: &str = "刚刚";
const MINUTES_AGO: &str = "分钟";
const TODAY: &str = "今天";
const MONTH: &str = "月";

/// Resolution of every publish time.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Split a time label into its time part and optional client part.
#[must_use]
pub fn split_time_label(label: &str) -> (&str, Option<&str>) {
    match label.split_once(CLIENT_MARKER) {
        Some((time, tool)) => (time, Some(tool)),
        None => (label, None),
    }
}

/// Parse the time part of a label relative to `now`.
///
/// Returns `None` when the label matches no known shape.
#[must_use]
pub fn parse_publish_time(label: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let (time, _) = split_time_label(label);
    let now = truncate_to_minute(now);

    if time.contains(JUST_NOW) {
        return Some(now);
    }

    if let Some((minutes, _)) = time.split_once(MINUTES_AGO) {
        let minutes: i64 = minutes.trim().parse().ok()?;
        return now.checked_sub_signed(Duration::try_minutes(minutes)?);
    }

    if time.contains(TODAY) {
        let clock: String = time.chars().skip(TODAY.chars().count() + 1).collect();
        let stamp = format!("{} {}", now.format("%Y-%m-%d"), clock);
        return parse_absolute(&stamp);
    }

    if time.contains(MONTH) {
        let chars: Vec<char> = time.chars().collect();
        let month: String = chars.iter().take(2).collect();
        let day: String = chars.iter().skip(3).take(2).collect();
        let clock: String = chars.iter().skip(7).take(5).collect();
        let stamp = format!("{}-{month}-{day} {clock}", now.year());
        return parse_absolute(&stamp);
    }

    parse_absolute(time)
}

/// Client label after the from-client marker, if any.
#[must_use]
pub fn parse_publish_tool(label: &str) -> Option<String> {
    let (_, tool) = split_time_label(label);
    tool.map(str::trim)
        .filter(|tool| !tool.is_empty())
        .map(ToString::to_string)
}

fn parse_absolute(stamp: &str) -> Option<NaiveDateTime> {
    let truncated: String = stamp.chars().take(16).collect();
    NaiveDateTime::parse_from_str(truncated.trim(), TIME_FORMAT).ok()
}

fn truncate_to_minute(time: NaiveDateTime) -> NaiveDateTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}
