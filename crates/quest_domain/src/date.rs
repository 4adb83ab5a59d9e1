//! Calendar-day helpers.
//!
//! Every date the engine stores is a local calendar day ([`NaiveDate`]) and is
//! serialized as a zero-padded `YYYY-MM-DD` string, so string order and
//! chronological order agree.

use chrono::{DateTime, Days, Local, Months, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DateError;

const DAY_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Days,
    Weeks,
    Months,
    Years,
}

/// Anything that can be read as a local calendar day.
pub trait ToCalendarDay {
    fn to_calendar_day(&self) -> Result<NaiveDate, DateError>;
}

impl ToCalendarDay for NaiveDate {
    fn to_calendar_day(&self) -> Result<NaiveDate, DateError> {
        Ok(*self)
    }
}

impl ToCalendarDay for DateTime<Local> {
    fn to_calendar_day(&self) -> Result<NaiveDate, DateError> {
        Ok(self.date_naive())
    }
}

impl ToCalendarDay for DateTime<Utc> {
    fn to_calendar_day(&self) -> Result<NaiveDate, DateError> {
        Ok(self.with_timezone(&Local).date_naive())
    }
}

impl ToCalendarDay for str {
    fn to_calendar_day(&self) -> Result<NaiveDate, DateError> {
        parse_day(self)
    }
}

impl ToCalendarDay for String {
    fn to_calendar_day(&self) -> Result<NaiveDate, DateError> {
        parse_day(self)
    }
}

impl<T: ToCalendarDay + ?Sized> ToCalendarDay for &T {
    fn to_calendar_day(&self) -> Result<NaiveDate, DateError> {
        (**self).to_calendar_day()
    }
}

pub fn to_calendar_day(input: impl ToCalendarDay) -> Result<NaiveDate, DateError> {
    input.to_calendar_day()
}

/// Parses `YYYY-MM-DD`, falling back to RFC 3339 timestamps which are read in
/// local time.
pub fn parse_day(input: &str) -> Result<NaiveDate, DateError> {
    let trimmed = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, DAY_FORMAT) {
        return Ok(date);
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(Local.from_utc_datetime(&stamp.naive_utc()).date_naive());
    }
    Err(DateError::Invalid {
        input: input.to_string(),
    })
}

pub fn format_day(date: NaiveDate) -> String {
    date.format(DAY_FORMAT).to_string()
}

/// Calendar-correct interval arithmetic.
///
/// Months and years move by calendar month; a day-of-month the target month
/// lacks is clamped to that month's last day (`01-31 + 1 month` is the last
/// day of February).
pub fn add_interval(date: NaiveDate, interval: u32, unit: IntervalUnit) -> NaiveDate {
    let shifted = match unit {
        IntervalUnit::Days => date.checked_add_days(Days::new(u64::from(interval))),
        IntervalUnit::Weeks => date.checked_add_days(Days::new(u64::from(interval) * 7)),
        IntervalUnit::Months => date.checked_add_months(Months::new(interval)),
        IntervalUnit::Years => interval
            .checked_mul(12)
            .and_then(|months| date.checked_add_months(Months::new(months))),
    };
    shifted.unwrap_or(NaiveDate::MAX)
}

/// Same clamp policy as [`add_interval`], backwards.
pub fn sub_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}

pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Every day from `from` to `to`, both inclusive. Empty when `from > to`.
pub fn iter_days(from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    from.iter_days().take_while(move |day| *day <= to)
}

/// Source of "today". Injected so tests can pin the calendar.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        parse_day(s).unwrap()
    }

    #[test]
    fn parses_canonical_and_rfc3339_input() {
        assert_eq!(
            to_calendar_day("2024-03-09").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
        );
        let local_noon = Local.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(
            to_calendar_day(local_noon.to_rfc3339()).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
        );
        assert_eq!(to_calendar_day(local_noon).unwrap(), day("2024-03-09"));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(
            to_calendar_day("").unwrap_err(),
            DateError::Invalid { input: String::new() }
        );
        assert!(to_calendar_day("2024-13-01").is_err());
        assert!(to_calendar_day("yesterday").is_err());
    }

    #[test]
    fn month_arithmetic_clamps_to_month_end() {
        assert_eq!(add_interval(day("2024-01-31"), 1, IntervalUnit::Months), day("2024-02-29"));
        assert_eq!(add_interval(day("2023-01-31"), 1, IntervalUnit::Months), day("2023-02-28"));
        assert_eq!(add_interval(day("2024-01-15"), 3, IntervalUnit::Months), day("2024-04-15"));
        assert_eq!(add_interval(day("2024-02-29"), 1, IntervalUnit::Years), day("2025-02-28"));
        assert_eq!(add_interval(day("2024-12-30"), 2, IntervalUnit::Days), day("2025-01-01"));
        assert_eq!(add_interval(day("2024-01-01"), 2, IntervalUnit::Weeks), day("2024-01-15"));
    }

    #[test]
    fn canonical_strings_sort_chronologically() {
        let mut dates = vec![day("2024-10-02"), day("2024-09-30"), day("2023-12-31")];
        let mut strings: Vec<String> = dates.iter().copied().map(format_day).collect();
        dates.sort();
        strings.sort();
        assert_eq!(strings, dates.into_iter().map(format_day).collect::<Vec<_>>());
    }

    #[test]
    fn iter_days_is_inclusive() {
        let days: Vec<_> = iter_days(day("2024-02-27"), day("2024-03-01")).collect();
        assert_eq!(days.len(), 4);
        assert_eq!(iter_days(day("2024-03-02"), day("2024-03-01")).count(), 0);
    }
}
