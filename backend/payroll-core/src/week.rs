// src/week.rs

//! Week arithmetic shared by sync and payroll generation.
//!
//! Every week key in the system is the Monday of the week, derived from the
//! calendar date alone. Callers never derive a week from a UTC timestamp.

use chrono::{Datelike, Duration, NaiveDate, ParseError};

use crate::clock::Clock;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Historical rows were written with week keys that could drift a day or two
/// from the canonical Monday. Lookups and deletes widen by this many days so
/// those rows are still found.
pub const LEGACY_WEEK_KEY_TOLERANCE_DAYS: i64 = 2;

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    // 0 = Sunday .. 6 = Saturday
    let day_of_week = date.weekday().num_days_from_sunday() as i64;
    let offset = if day_of_week == 0 { -6 } else { 1 - day_of_week };
    date + Duration::days(offset)
}

/// Sunday closing the week that starts on `week_start`.
pub fn week_end(week_start: NaiveDate) -> NaiveDate {
    week_start + Duration::days(6)
}

/// `(monday, sunday)` for the week containing `date`.
pub fn week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = week_start(date);
    (start, week_end(start))
}

pub fn current_week_start(clock: &dyn Clock) -> NaiveDate {
    week_start(clock.today())
}

/// Date window used to find rows keyed on a possibly drifted week start.
pub fn legacy_week_window(week_start: NaiveDate) -> (NaiveDate, NaiveDate) {
    let tolerance = Duration::days(LEGACY_WEEK_KEY_TOLERANCE_DAYS);
    (week_start - tolerance, week_start + tolerance)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parses a `YYYY-MM-DD` key. Timestamps such as `2024-01-01T00:00:00Z` are
/// accepted and reduced to their date part.
pub fn parse_date(value: &str) -> Result<NaiveDate, ParseError> {
    let trimmed = value.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, DATE_FORMAT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use chrono::Weekday;

    fn d(date_str: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date_str, DATE_FORMAT).unwrap()
    }

    #[test]
    fn wednesday_and_closing_sunday_share_a_monday() {
        // 2024-01-03 is a Wednesday, 2024-01-07 the Sunday ending that week.
        assert_eq!(week_start(d("2024-01-03")), d("2024-01-01"));
        assert_eq!(week_start(d("2024-01-07")), d("2024-01-01"));
    }

    #[test]
    fn sunday_maps_six_days_back() {
        let sunday = d("2024-01-14");
        assert_eq!(sunday.weekday(), Weekday::Sun);
        assert_eq!(week_start(sunday), d("2024-01-08"));
    }

    #[test]
    fn monday_is_its_own_week_start() {
        assert_eq!(week_start(d("2024-01-08")), d("2024-01-08"));
    }

    #[test]
    fn week_crossing_year_boundary() {
        // Tuesday 2025-01-01 belongs to the week starting Monday 2024-12-30.
        let (start, end) = week_bounds(d("2025-01-01"));
        assert_eq!(start, d("2024-12-30"));
        assert_eq!(end, d("2025-01-05"));
    }

    #[test]
    fn current_week_uses_clock_calendar_date() {
        let clock = TestClock::new("2024-03-10 23:59:00"); // Sunday night
        assert_eq!(current_week_start(&clock), d("2024-03-04"));
    }

    #[test]
    fn legacy_window_spans_two_days_each_side() {
        let (from, to) = legacy_week_window(d("2024-01-08"));
        assert_eq!(from, d("2024-01-06"));
        assert_eq!(to, d("2024-01-10"));
    }

    #[test]
    fn parse_date_accepts_timestamps() {
        assert_eq!(parse_date("2024-01-08").unwrap(), d("2024-01-08"));
        assert_eq!(parse_date("2024-01-08T00:00:00+00:00").unwrap(), d("2024-01-08"));
        assert!(parse_date("08/01/2024").is_err());
    }

    #[test]
    fn format_round_trips_key() {
        assert_eq!(format_date(d("2024-02-05")), "2024-02-05");
    }
}
