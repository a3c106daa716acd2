//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::{Context, bail};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use regex::Regex;

use tm_core::Metadata;

/// Pre-compiled regex for relative time parsing.
static RELATIVE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s+(second|minute|hour|day|week)s?\s+ago$").expect("valid regex")
});

/// Pre-compiled regex for clock-style durations (`MM:SS` or `HH:MM:SS`).
static CLOCK_DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\d+):)?([0-5]?\d):([0-5]\d)$").expect("valid regex")
});

/// Conservative bounds for relative time parsing (~1000 years in seconds).
const MAX_RELATIVE_SECONDS: i64 = 1000 * 365 * 24 * 60 * 60;

/// Parse a datetime string as either ISO 8601 or relative to `now`.
///
/// Supports:
/// - ISO 8601: "2026-01-15T10:30:00Z"
/// - Relative: "45 seconds ago", "2 hours ago", "30 minutes ago", "1 day ago", "1 week ago"
pub fn parse_datetime(s: &str, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let Some(caps) = RELATIVE_TIME_RE.captures(s) else {
        bail!(
            "Invalid datetime: {s}. Use ISO 8601 (e.g., 2026-01-15T10:30:00Z) or relative (e.g., '2 hours ago')"
        );
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative time")?;

    let seconds_per_unit = match &caps[2] {
        "second" => 1,
        "minute" => 60,
        "hour" => 60 * 60,
        "day" => 60 * 60 * 24,
        "week" => 60 * 60 * 24 * 7,
        unit => bail!("Unknown time unit: {unit}"),
    };

    if n > MAX_RELATIVE_SECONDS / seconds_per_unit {
        bail!("Relative time value too large: {n} {}", &caps[2]);
    }

    Ok(now - Duration::seconds(n * seconds_per_unit))
}

/// Parse a duration given as whole seconds, `MM:SS` or `HH:MM:SS`.
///
/// Zero and negative values are returned as-is so entry validation can
/// report them.
pub fn parse_duration(s: &str) -> anyhow::Result<i64> {
    let s = s.trim();
    if let Ok(seconds) = s.parse::<i64>() {
        return Ok(seconds);
    }

    let Some(caps) = CLOCK_DURATION_RE.captures(s) else {
        bail!("Invalid duration: {s}. Use seconds (e.g., 900), MM:SS or HH:MM:SS");
    };

    let hours: i64 = match caps.get(1) {
        Some(h) => h.as_str().parse().context("hours out of range")?,
        None => 0,
    };
    let minutes: i64 = caps[2].parse().context("invalid minutes")?;
    let seconds: i64 = caps[3].parse().context("invalid seconds")?;

    hours
        .checked_mul(3600)
        .and_then(|h| h.checked_add(minutes * 60 + seconds))
        .context("duration too large")
}

/// Parse repeated `KEY=VALUE` metadata arguments.
///
/// Values that parse as JSON keep their JSON type; anything else is a string.
pub fn parse_metadata(pairs: &[String]) -> anyhow::Result<Metadata> {
    let mut metadata = Metadata::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid metadata: {pair}. Use KEY=VALUE");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid metadata: {pair}. Key cannot be empty");
        }
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        metadata.insert(key.to_string(), value);
    }
    Ok(metadata)
}

/// Formats a timestamp for display, to the second.
pub fn format_time(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Formats an optional timestamp for display.
pub fn format_optional_time(timestamp: Option<DateTime<Utc>>) -> String {
    timestamp.map_or_else(|| "-".to_string(), format_time)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn parse_datetime_accepts_iso8601() {
        let parsed = parse_datetime("2025-03-10T10:30:00+02:00", now()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 3, 10, 8, 30, 0).unwrap());
    }

    #[test]
    fn parse_datetime_accepts_relative() {
        assert_eq!(
            parse_datetime("2 hours ago", now()).unwrap(),
            now() - Duration::hours(2)
        );
        assert_eq!(
            parse_datetime("1 minute ago", now()).unwrap(),
            now() - Duration::minutes(1)
        );
        assert_eq!(
            parse_datetime("30 seconds ago", now()).unwrap(),
            now() - Duration::seconds(30)
        );
    }

    #[test]
    fn parse_datetime_rejects_garbage_and_overflow() {
        assert!(parse_datetime("yesterday", now()).is_err());
        assert!(parse_datetime("999999999999 weeks ago", now()).is_err());
    }

    #[test]
    fn parse_duration_formats() {
        assert_eq!(parse_duration("900").unwrap(), 900);
        assert_eq!(parse_duration("15:00").unwrap(), 900);
        assert_eq!(parse_duration("1:30:05").unwrap(), 5405);
        assert_eq!(parse_duration("0").unwrap(), 0);
        assert!(parse_duration("1:75").is_err());
        assert!(parse_duration("ninety").is_err());
    }

    #[test]
    fn parse_metadata_keeps_json_types() {
        let metadata = parse_metadata(&[
            "project=apollo".to_string(),
            "billable=true".to_string(),
            "rate=42".to_string(),
            "note=a=b".to_string(),
        ])
        .unwrap();
        assert_eq!(metadata["project"], "apollo");
        assert_eq!(metadata["billable"], true);
        assert_eq!(metadata["rate"], 42);
        assert_eq!(metadata["note"], "a=b");

        assert!(parse_metadata(&["novalue".to_string()]).is_err());
        assert!(parse_metadata(&["=x".to_string()]).is_err());
    }
}
