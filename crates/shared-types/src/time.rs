use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Half-open UTC interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Length of the intersection with `other` (zero when disjoint).
    pub fn overlap(&self, other: &TimeWindow) -> Duration {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if end > start {
            end - start
        } else {
            Duration::zero()
        }
    }

    /// True when `other` lies entirely inside this window.
    pub fn covers(&self, other: &TimeWindow) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Parse an ISO-8601 timestamp into UTC.
///
/// Values with an explicit offset are taken as-is; naive date-times and plain
/// dates are interpreted as wall-clock time in `tz`.
pub fn parse_timestamp(input: &str, tz: Tz) -> Result<DateTime<Utc>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("timestamp is empty".to_string());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| {
            format!(
                "'{}' is not a valid timestamp; use ISO-8601 such as 2025-03-05T15:00:00 or 2025-03-05T15:00:00+05:30",
                input
            )
        })?;

    tz.from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| format!("'{}' does not exist in timezone {}", input, tz.name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kolkata() -> Tz {
        "Asia/Kolkata".parse().unwrap()
    }

    #[test]
    fn test_parse_with_offset() {
        let parsed = parse_timestamp("2025-03-05T00:00:00.0000+00:00", kolkata()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 3, 5, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_naive_uses_timezone() {
        let parsed = parse_timestamp("2025-03-05T15:00:00", kolkata()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 3, 5, 9, 30, 0).unwrap());

        let parsed = parse_timestamp("2025-03-05 15:00", kolkata()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 3, 5, 9, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_plain_date() {
        let parsed = parse_timestamp("2025-03-05", kolkata()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 3, 4, 18, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_timestamp("tomorrow at 3", kolkata()).unwrap_err();
        assert!(err.contains("not a valid timestamp"));
        assert!(parse_timestamp("  ", kolkata()).is_err());
    }

    #[test]
    fn test_overlap_and_cover() {
        let t = |h| Utc.with_ymd_and_hms(2025, 3, 5, h, 0, 0).unwrap();
        let day = TimeWindow::new(t(0), t(23));
        let meeting = TimeWindow::new(t(9), t(10));
        let later = TimeWindow::new(t(11), t(12));

        assert!(day.covers(&meeting));
        assert!(!meeting.covers(&day));
        assert_eq!(day.overlap(&meeting), Duration::hours(1));
        assert_eq!(meeting.overlap(&later), Duration::zero());
    }
}
