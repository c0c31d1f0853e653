//! Lenient date and date-time parsing for model output.
//!
//! Dates must be `YYYY-MM-DD`. Date-times must be
//! `YYYY-MM-DD HH:mm[:ss] <zone>` where the zone is `UTC`, `GMT`, `Z`, a
//! numeric offset (`+05:30`, `-0800`, `UTC+2`) or a common abbreviation
//! such as `EST` or `CEST`. Date-times are normalised to UTC.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;

const DATE_FORMAT_HINT: &str =
    "Invalid date format. Please provide the date in \"YYYY-MM-DD\" format.";
const DATETIME_FORMAT_HINT: &str = "Invalid date and time format. Please provide the date and time in \"YYYY-MM-DD HH:mm\" or \"YYYY-MM-DD HH:mm:ss\" format, followed by the timezone.";

/// Zone abbreviations and their offsets in minutes east of UTC.
const ZONE_ABBREVIATIONS: &[(&str, i32)] = &[
    ("UTC", 0),
    ("GMT", 0),
    ("Z", 0),
    ("WET", 0),
    ("WEST", 60),
    ("BST", 60),
    ("CET", 60),
    ("CEST", 120),
    ("EET", 120),
    ("EEST", 180),
    ("MSK", 180),
    ("IST", 330),
    ("SGT", 480),
    ("HKT", 480),
    ("AWST", 480),
    ("JST", 540),
    ("KST", 540),
    ("ACST", 570),
    ("AEST", 600),
    ("AEDT", 660),
    ("NZST", 720),
    ("NZDT", 780),
    ("HST", -600),
    ("AKST", -540),
    ("AKDT", -480),
    ("PST", -480),
    ("PDT", -420),
    ("MST", -420),
    ("MDT", -360),
    ("CST", -360),
    ("CDT", -300),
    ("EST", -300),
    ("EDT", -240),
];

fn date_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static pattern"))
}

fn datetime_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}(?::\d{2})?) (.+)$").expect("static pattern")
    })
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(input: &str) -> Result<NaiveDate, String> {
    let input = input.trim();
    if !date_shape().is_match(input) {
        return Err(DATE_FORMAT_HINT.into());
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|_| DATE_FORMAT_HINT.to_string())
}

/// Parse a date-time with a zone and convert it to UTC.
pub fn parse_datetime(input: &str) -> Result<DateTime<Utc>, String> {
    let input = input.trim();
    let caps = datetime_shape()
        .captures(input)
        .ok_or_else(|| DATETIME_FORMAT_HINT.to_string())?;
    let (Some(local), Some(zone)) = (caps.get(1), caps.get(2)) else {
        return Err(DATETIME_FORMAT_HINT.into());
    };

    let local = local.as_str();
    let format = if local.matches(':').count() == 2 {
        "%Y-%m-%d %H:%M:%S"
    } else {
        "%Y-%m-%d %H:%M"
    };
    let naive = NaiveDateTime::parse_from_str(local, format).map_err(|_| {
        "Invalid date and time values. Please ensure all components are correct.".to_string()
    })?;

    let zone = zone.as_str().trim();
    let offset = parse_zone(zone).ok_or_else(|| {
        format!(
            "Unrecognized time zone {zone}. Please provide a valid time zone abbreviation or offset. For example, \"UTC\", \"EST\" or \"+05:30\"."
        )
    })?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| "Invalid date and time values. Please ensure all components are correct.".into())
}

/// Resolve a zone name or offset.
#[must_use]
pub fn parse_zone(zone: &str) -> Option<FixedOffset> {
    let upper = zone.to_ascii_uppercase();
    if let Some((_, minutes)) = ZONE_ABBREVIATIONS.iter().find(|(name, _)| *name == upper) {
        return FixedOffset::east_opt(minutes * 60);
    }
    let numeric = upper
        .strip_prefix("UTC")
        .or_else(|| upper.strip_prefix("GMT"))
        .unwrap_or(&upper);
    parse_offset(numeric)
}

fn parse_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };
    if hours.is_empty() || hours.len() > 2 || !hours.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Canonical JSON text for a date value.
#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Canonical JSON text for a date-time value (RFC 3339, UTC).
#[must_use]
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Render a date-time the way prompts show it: `YYYY-MM-DD HH:mm:ss UTC`.
#[must_use]
pub fn format_datetime_for_prompt(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_date() {
        let date = parse_date("2024-02-29").unwrap();
        assert_eq!(format_date(date), "2024-02-29");
        assert!(parse_date("2023-02-29").is_err());
        assert!(parse_date("2024-2-9").is_err());
        assert!(parse_date("tomorrow").unwrap_err().contains("YYYY-MM-DD"));
    }

    #[rstest]
    #[case("2024-05-01 12:30 UTC", "2024-05-01T12:30:00Z")]
    #[case("2024-05-01 12:30:15 Z", "2024-05-01T12:30:15Z")]
    #[case("2024-05-01 08:30 EST", "2024-05-01T13:30:00Z")]
    #[case("2024-05-01 18:00 +05:30", "2024-05-01T12:30:00Z")]
    #[case("2024-05-01 04:30 -0800", "2024-05-01T12:30:00Z")]
    #[case("2024-05-01 14:30 UTC+2", "2024-05-01T12:30:00Z")]
    #[case("2024-05-01 14:30 cest", "2024-05-01T12:30:00Z")]
    fn test_parse_datetime(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(format_datetime(parse_datetime(input).unwrap()), expected);
    }

    #[test]
    fn test_parse_datetime_errors() {
        assert!(parse_datetime("2024-05-01").unwrap_err().starts_with("Invalid date and time format"));
        assert!(parse_datetime("2024-05-01 25:00 UTC").unwrap_err().starts_with("Invalid date and time values"));
        assert!(parse_datetime("2024-05-01 10:00 Mars/Olympus")
            .unwrap_err()
            .starts_with("Unrecognized time zone Mars/Olympus"));
    }

    #[test]
    fn test_prompt_format() {
        let dt = parse_datetime("2024-05-01 12:30 UTC").unwrap();
        assert_eq!(format_datetime_for_prompt(dt), "2024-05-01 12:30:00 UTC");
    }
}
