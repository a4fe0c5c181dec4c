//! Day-granularity date helpers.

use chrono::{Duration, NaiveDate, NaiveDateTime};

/// Format of dates in URLs, stored values and chart categories
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Format used when showing a timestamp to the user
pub const TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

pub fn format_date(date: NaiveDate) -> String {
  date.format(DATE_FORMAT).to_string()
}

/// Parse a `yyyy-mm-dd` date, surrounding whitespace allowed
pub fn parse_date(s: &str) -> Option<NaiveDate> {
  NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

/// Parse a database timestamp: `yyyy-mm-dd hh:mm:ss` with optional fraction.
///
/// The value is a local wall-clock time, so no timezone conversion happens.
pub fn parse_db_timestamp(s: &str) -> Option<NaiveDateTime> {
  let head = s.get(..19)?;
  NaiveDateTime::parse_from_str(head, "%Y-%m-%d %H:%M:%S")
    .or_else(|_| NaiveDateTime::parse_from_str(head, "%Y-%m-%dT%H:%M:%S"))
    .ok()
}

/// Every day from `start` (inclusive) to `end` (exclusive).
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
  start.iter_days().take_while(|d| *d < end).collect()
}

/// Number of whole days from `start` to `day`, negative if `day` is earlier
pub fn day_offset(start: NaiveDate, day: NaiveDate) -> i64 {
  (day - start).num_days()
}

pub fn next_day(date: NaiveDate) -> NaiveDate {
  date + Duration::days(1)
}
