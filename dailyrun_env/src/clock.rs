//! UTC day boundary helpers.
//!
//! A "day" is always the UTC calendar date. Weeks start on Sunday, matching
//! the `DAYOFWEEK()` convention the leaderboard has always used
//! (Sunday = 1, Saturday = 7).

use crate::error::EnvError;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

/// Canonical wire/display format for days.
const DAY_FORMAT: &str = "%Y-%m-%d";

/// Returns the UTC calendar date containing `ts`.
pub fn utc_day(ts: DateTime<Utc>) -> NaiveDate {
    ts.date_naive()
}

/// Returns the first day of the week containing `day` (the most recent Sunday,
/// or `day` itself when it is a Sunday).
pub fn week_start(day: NaiveDate) -> NaiveDate {
    let offset = day.weekday().num_days_from_sunday();
    day - Duration::days(i64::from(offset))
}

/// Parses a `YYYY-MM-DD` day string.
pub fn parse_day(input: &str) -> Result<NaiveDate, EnvError> {
    NaiveDate::parse_from_str(input.trim(), DAY_FORMAT)
        .map_err(|_| EnvError::invalid_day(input))
}

/// Formats a day as `YYYY-MM-DD`.
pub fn format_day(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    
    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }
    
    #[test]
    fn test_utc_day_ignores_time_of_day() {
        let late = Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 59).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        
        assert_eq!(utc_day(late), day(2024, 3, 9));
        assert_eq!(utc_day(early), day(2024, 3, 10));
    }
    
    #[test]
    fn test_week_starts_on_sunday() {
        // 2024-01-07 is a Sunday
        assert_eq!(week_start(day(2024, 1, 7)), day(2024, 1, 7));
        assert_eq!(week_start(day(2024, 1, 8)), day(2024, 1, 7));
        assert_eq!(week_start(day(2024, 1, 13)), day(2024, 1, 7));
        assert_eq!(week_start(day(2024, 1, 14)), day(2024, 1, 14));
    }
    
    #[test]
    fn test_week_start_crosses_month_and_year() {
        // 2024-01-01 is a Monday; its week began on New Year's Eve
        assert_eq!(week_start(day(2024, 1, 1)), day(2023, 12, 31));
    }
    
    #[test]
    fn test_parse_day_roundtrip() {
        let parsed = parse_day("2024-02-29").unwrap();
        assert_eq!(parsed, day(2024, 2, 29));
        assert_eq!(format_day(parsed), "2024-02-29");
        
        // Surrounding whitespace is tolerated
        assert_eq!(parse_day(" 2024-02-29\n").unwrap(), parsed);
    }
    
    #[test]
    fn test_parse_day_rejects_malformed() {
        assert!(matches!(parse_day("2023-02-29"), Err(EnvError::InvalidDay(_))));
        assert!(matches!(parse_day("yesterday"), Err(EnvError::InvalidDay(_))));
        assert!(matches!(parse_day(""), Err(EnvError::InvalidDay(_))));
    }
}
