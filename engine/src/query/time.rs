//! Time range and duration expressions.
//!
//! Queries carry a window expression that is either relative (`-24h`, `-7d`,
//! `1w` — a bare value reads as the same lookback) or absolute
//! (`2024-01-01T00:00:00Z..2024-01-02T00:00:00Z`).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A resolved, half-open `[start, end)` evaluation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Window start (inclusive).
    pub start: DateTime<Utc>,
    /// Window end (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Returns the same window shifted back by `offset_seconds`.
    #[must_use]
    pub fn shifted_back(&self, offset_seconds: u64) -> Self {
        let offset = Duration::seconds(i64::try_from(offset_seconds).unwrap_or(i64::MAX));
        Self {
            start: self.start - offset,
            end: self.end - offset,
        }
    }
}

/// Parses a duration token (`90s`, `5m`, `1h`, `7d`, `2w`) into seconds.
#[must_use]
pub fn parse_duration(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.len() < 2 || !text.is_ascii() {
        return None;
    }
    let (number, unit) = text.split_at(text.len() - 1);
    let value: u64 = number.parse().ok()?;
    if value == 0 {
        return None;
    }
    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86_400,
        "w" => 604_800,
        _ => return None,
    };
    value.checked_mul(multiplier)
}

/// Renders seconds as the largest exact duration unit (`300` → `5m`).
#[must_use]
pub fn format_duration(seconds: u64) -> String {
    for (unit, multiplier) in [("w", 604_800), ("d", 86_400), ("h", 3600), ("m", 60)] {
        if seconds >= multiplier && seconds % multiplier == 0 {
            return format!("{}{unit}", seconds / multiplier);
        }
    }
    format!("{seconds}s")
}

/// Resolves a window expression against `now`.
///
/// Returns `None` when the expression cannot be parsed or the window is
/// empty or inverted.
#[must_use]
pub fn resolve_time_range(expr: &str, now: DateTime<Utc>) -> Option<TimeRange> {
    let expr = expr.trim();
    if let Some((start_text, end_text)) = expr.split_once("..") {
        let start = DateTime::parse_from_rfc3339(start_text.trim())
            .ok()?
            .with_timezone(&Utc);
        let end = DateTime::parse_from_rfc3339(end_text.trim())
            .ok()?
            .with_timezone(&Utc);
        if start >= end {
            return None;
        }
        return Some(TimeRange { start, end });
    }

    let lookback = expr.strip_prefix('-').unwrap_or(expr);
    let seconds = parse_duration(lookback)?;
    let start = now - Duration::seconds(i64::try_from(seconds).ok()?);
    Some(TimeRange { start, end: now })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("90s"), Some(90));
        assert_eq!(parse_duration("5m"), Some(300));
        assert_eq!(parse_duration("1h"), Some(3600));
        assert_eq!(parse_duration("7d"), Some(604_800));
        assert_eq!(parse_duration("2w"), Some(1_209_600));
    }

    #[test]
    fn test_parse_duration_rejects_invalid() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("5"), None);
        assert_eq!(parse_duration("5x"), None);
        assert_eq!(parse_duration("m"), None);
        assert_eq!(parse_duration("0m"), None);
    }

    #[test]
    fn test_format_duration_round_trip() {
        for text in ["45s", "5m", "90m", "1h", "36h", "7d", "2w"] {
            let seconds = parse_duration(text).unwrap();
            assert_eq!(format_duration(seconds), text);
        }
    }

    #[test]
    fn test_resolve_relative_range() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let range = resolve_time_range("-24h", now).unwrap();

        assert_eq!(range.end, now);
        assert_eq!(range.start, now - Duration::hours(24));
    }

    #[test]
    fn test_resolve_bare_relative_range() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        assert_eq!(
            resolve_time_range("1w", now),
            resolve_time_range("-1w", now)
        );
    }

    #[test]
    fn test_resolve_absolute_range() {
        let now = Utc::now();
        let range =
            resolve_time_range("2024-01-01T00:00:00Z..2024-01-02T00:00:00Z", now).unwrap();

        assert_eq!(range.start, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(range.end, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_resolve_rejects_inverted_range() {
        let now = Utc::now();
        assert!(resolve_time_range("2024-01-02T00:00:00Z..2024-01-01T00:00:00Z", now).is_none());
    }

    #[test]
    fn test_resolve_rejects_garbage() {
        let now = Utc::now();
        assert!(resolve_time_range("yesterday", now).is_none());
        assert!(resolve_time_range("", now).is_none());
    }

    #[test]
    fn test_shifted_back() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let range = resolve_time_range("-1h", now).unwrap();
        let shifted = range.shifted_back(86_400);

        assert_eq!(shifted.end, now - Duration::days(1));
        assert_eq!(shifted.start, now - Duration::days(1) - Duration::hours(1));
    }
}
