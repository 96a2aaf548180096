use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

const FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// Try each supported format in order (§4.2 expansion); `None` on total
/// failure, letting the Alert Engine fall back to `received_at`.
#[must_use]
pub fn parse(value: &str) -> Option<DateTime<Utc>> {
    for fmt in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso8601_with_fractional_seconds() {
        let ts = parse("2024-01-15T10:30:00.500Z").unwrap();
        assert_eq!(ts.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-01-15 10:30:00");
    }

    #[test]
    fn parses_date_only() {
        assert!(parse("2024-01-15").is_some());
    }

    #[test]
    fn unparseable_value_is_none() {
        assert!(parse("not a date").is_none());
    }
}
