use chrono::{DateTime, Local, NaiveDate, Utc};
use regex::Regex;
use lazy_static::lazy_static;

// chrono formatting reference:
// https://docs.rs/chrono/0.4.19/chrono/format/strftime/index.html
const DATE_FORMAT_ISSUE: &'static str = "%Y-%m-%d";
const DATE_FORMAT_TIMESTAMP: &'static str = "%Y-%m-%d %H:%M";

// chrono happily accepts "2024-6-1" with %m and %d, but
// issue URLs have to be the zero-padded form or the same
// issue would live under several URLs.
pub fn parse_issue_date(value: &str) -> Option<NaiveDate> {
  lazy_static! {
    static ref ISSUE_DATE_REGEX: Regex = Regex::new(
      r"^\d{4}-\d{2}-\d{2}$"
    ).unwrap();
  }
  if !ISSUE_DATE_REGEX.is_match(value) {
    return None;
  }
  NaiveDate::parse_from_str(value, DATE_FORMAT_ISSUE).ok()
}

pub fn format_issue_date(date: &NaiveDate) -> String {
  date.format(DATE_FORMAT_ISSUE).to_string()
}

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
  timestamp.with_timezone(&Local)
    .format(DATE_FORMAT_TIMESTAMP)
    .to_string()
}

// "Today" is whatever the server's local calendar says.
pub fn today() -> NaiveDate {
  Local::now().date_naive()
}
