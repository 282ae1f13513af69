//! Timestamp parsing and time ranges.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Naive layouts accepted after RFC 3339; interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse a timestamp as written in track files and CLI arguments.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]`, `YYYY-MM-DDTHH:MM:SS[.fff]`
/// and bare dates (midnight UTC).
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(ndt) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    Err(TimeParseError::InvalidFormat(s.to_string()))
}

/// An inclusive time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn try_new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TimeParseError> {
        if start > end {
            return Err(TimeParseError::InvalidRange(format!("{} > {}", start, end)));
        }
        Ok(Self { start, end })
    }

    /// Parse `start/end` or a single instant.
    pub fn parse(s: &str) -> Result<Self, TimeParseError> {
        match s.split_once('/') {
            Some((start, end)) => Self::try_new(parse_timestamp(start)?, parse_timestamp(end)?),
            None => {
                let instant = parse_timestamp(s)?;
                Ok(Self {
                    start: instant,
                    end: instant,
                })
            }
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }

    /// Range covering every instant of an iterator, or None if it is empty.
    pub fn spanning(times: impl IntoIterator<Item = DateTime<Utc>>) -> Option<Self> {
        times.into_iter().fold(None, |acc, t| match acc {
            None => Some(Self { start: t, end: t }),
            Some(r) => Some(Self {
                start: r.start.min(t),
                end: r.end.max(t),
            }),
        })
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),

    #[error("Invalid time range: {0}")]
    InvalidRange(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_variants() {
        let a = parse_timestamp("2024-01-15T12:30:00Z").unwrap();
        let b = parse_timestamp("2024-01-15 12:30:00").unwrap();
        let c = parse_timestamp("2024-01-15T12:30:00.000").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);

        let d = parse_timestamp("2024-01-15").unwrap();
        assert_eq!(d.day(), 15);
        assert_eq!(d.hour(), 0);
    }

    #[test]
    fn test_parse_offset_converts_to_utc() {
        let t = parse_timestamp("2024-01-15T14:00:00+02:00").unwrap();
        assert_eq!(t.hour(), 12);
    }

    #[test]
    fn test_invalid() {
        assert!(parse_timestamp("15/01/2024").is_err());
        assert!(TimeRange::parse("2024-01-16/2024-01-15").is_err());
    }

    #[test]
    fn test_range_contains() {
        let range = TimeRange::parse("2024-01-15T00:00:00Z/2024-01-16T00:00:00Z").unwrap();
        assert!(range.contains(parse_timestamp("2024-01-15T06:00:00Z").unwrap()));
        assert!(range.contains(range.end));
        assert!(!range.contains(parse_timestamp("2024-01-16T00:00:01Z").unwrap()));
    }

    #[test]
    fn test_spanning() {
        let times = ["2024-01-02", "2024-01-01", "2024-01-03"]
            .iter()
            .map(|s| parse_timestamp(s).unwrap());
        let range = TimeRange::spanning(times).unwrap();
        assert_eq!(range.start, parse_timestamp("2024-01-01").unwrap());
        assert_eq!(range.end, parse_timestamp("2024-01-03").unwrap());
        assert!(TimeRange::spanning(Vec::new()).is_none());
    }
}
