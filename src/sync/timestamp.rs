//! Canonicalizes heterogeneous time inputs to epoch milliseconds.

use crate::types::TimeValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Epoch milliseconds for `value`, or the current instant when it is
/// absent or unparseable.
pub fn normalize_timestamp(value: Option<&TimeValue>) -> i64 {
    value.and_then(parse_time_value).unwrap_or_else(now_millis)
}

/// First present value wins, even if it does not parse.
pub fn normalize_first(candidates: &[Option<&TimeValue>]) -> i64 {
    normalize_timestamp(candidates.iter().flatten().next().copied())
}

fn parse_time_value(value: &TimeValue) -> Option<i64> {
    match value {
        TimeValue::Millis(ms) => Some(*ms),
        TimeValue::Float(ms) if ms.is_finite() => Some(ms.trunc() as i64),
        TimeValue::Float(_) => None,
        TimeValue::Text(text) => parse_time_text(text),
    }
}

fn parse_time_text(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(ms) = text.parse::<i64>() {
        return Some(ms);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_millis());
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.timestamp_millis());
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_pass_through() {
        assert_eq!(normalize_timestamp(Some(&TimeValue::Millis(1_700_000_000_123))), 1_700_000_000_123);
        assert_eq!(normalize_timestamp(Some(&TimeValue::Float(1500.9))), 1500);
    }

    #[test]
    fn test_numeric_string() {
        assert_eq!(normalize_timestamp(Some(&TimeValue::from("42000"))), 42000);
    }

    #[test]
    fn test_date_strings() {
        assert_eq!(
            normalize_timestamp(Some(&TimeValue::from("2024-01-02T03:04:05Z"))),
            1_704_164_645_000
        );
        assert_eq!(
            normalize_timestamp(Some(&TimeValue::from("2024-01-02T03:04:05+01:00"))),
            1_704_161_045_000
        );
        assert_eq!(
            normalize_timestamp(Some(&TimeValue::from("2024-01-02 03:04:05"))),
            1_704_164_645_000
        );
        assert_eq!(
            normalize_timestamp(Some(&TimeValue::from("2024-01-02"))),
            1_704_153_600_000
        );
    }

    #[test]
    fn test_fallback_to_now() {
        let before = now_millis();
        let absent = normalize_timestamp(None);
        let garbage = normalize_timestamp(Some(&TimeValue::from("not a date")));
        let nan = normalize_timestamp(Some(&TimeValue::Float(f64::NAN)));
        let after = now_millis();

        for value in [absent, garbage, nan] {
            assert!(value >= before && value <= after);
        }
    }

    #[test]
    fn test_first_present_candidate() {
        let created = TimeValue::Millis(10);
        let later = TimeValue::Millis(20);
        assert_eq!(normalize_first(&[None, Some(&created), Some(&later)]), 10);
    }
}
