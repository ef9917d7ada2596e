//! Canonical timeline handling.
//!
//! Every timestamp crossing the API boundary must carry an explicit offset.
//! Once accepted it is moved onto UTC and the offset is discarded, so all
//! stored instants compare as plain values.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

/// Parses an RFC 3339 timestamp. Inputs without an offset are rejected, never
/// assumed local or UTC.
pub fn parse_aware(input: &str) -> Result<DateTime<FixedOffset>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("must not be empty".to_string());
    }

    match DateTime::parse_from_rfc3339(input) {
        Ok(ts) => Ok(ts),
        Err(_) if input.parse::<NaiveDateTime>().is_ok() => {
            Err("must include a timezone offset (e.g. 'Z' or '+00:00')".to_string())
        }
        Err(e) => Err(format!("is not a valid RFC 3339 timestamp: {}", e)),
    }
}

/// Moves an instant onto the UTC timeline. Preserves the instant, not the
/// wall-clock digits.
pub fn normalize<Tz: TimeZone>(ts: &DateTime<Tz>) -> DateTime<Utc> {
    ts.with_timezone(&Utc)
}

/// `parse_aware` followed by `normalize`.
pub fn parse_utc(input: &str) -> Result<DateTime<Utc>, String> {
    parse_aware(input).map(|ts| normalize(&ts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_instant_in_different_offsets_is_identical() {
        let a = parse_utc("2026-02-23T12:00:00Z").unwrap();
        let b = parse_utc("2026-02-23T14:00:00+02:00").unwrap();
        let c = parse_utc("2026-02-23T07:30:00-04:30").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.to_rfc3339(), "2026-02-23T12:00:00+00:00");
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["2026-02-23T12:00:00Z", "1999-12-31T23:59:59.987654321+05:45", "2026-02-23T00:00:00-11:00"] {
            let once = normalize(&parse_aware(raw).unwrap());
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn naive_timestamp_is_rejected() {
        let err = parse_aware("2026-02-23T12:00:00").unwrap_err();
        assert!(err.contains("timezone"), "{}", err);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_aware("yesterday").is_err());
        assert!(parse_aware("").is_err());
        assert!(parse_aware("2026-13-01T00:00:00Z").is_err());
    }

    #[test]
    fn offset_crossing_midnight_moves_the_date() {
        let ts = parse_utc("2026-03-01T01:00:00+03:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2026, 2, 28, 22, 0, 0).unwrap());
    }
}
