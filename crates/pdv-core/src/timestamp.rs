//! # Timestamps
//!
//! Every timestamp written to the local store goes through [`format`], which
//! always produces the same width (`2026-01-31T14:05:09.000123Z`). Because of
//! that, comparing two stored values as strings gives the same answer as
//! comparing the instants, which the last-write-wins upserts rely on.

use chrono::{DateTime, SecondsFormat, Utc};

/// Formats a timestamp in the canonical storage format.
pub fn format(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses any RFC 3339 timestamp (with or without offset normalization).
///
/// Remote rows arrive with a variety of offsets and precisions; they are
/// normalized to UTC before storage.
pub fn parse(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }

    // PostgREST may omit the `T` separator and the offset minutes.
    let normalized = value.replacen(' ', "T", 1);
    if let Ok(ts) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f%#z") {
        return Some(ts.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Current time in the canonical storage format.
pub fn now() -> String {
    format(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2026, 1, 31, 14, 5, 9).unwrap();
        let b = a + chrono::Duration::microseconds(123);
        assert_eq!(format(a), "2026-01-31T14:05:09.000000Z");
        assert_eq!(format(b), "2026-01-31T14:05:09.000123Z");
        assert!(format(a) < format(b));
    }

    #[test]
    fn test_parse_postgrest_formats() {
        let expected = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(parse("2026-03-01T12:00:00Z"), Some(expected));
        assert_eq!(parse("2026-03-01T09:00:00-03:00"), Some(expected));
        assert_eq!(parse("2026-03-01 12:00:00+00"), Some(expected));
        assert_eq!(parse("2026-03-01T12:00:00"), Some(expected));
        assert_eq!(parse("not a date"), None);
    }
}
