use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::date::{add_interval, days_between, IntervalUnit};
use crate::error::RecurrenceError;

/// Fixed-interval recurrence rule of a habit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Recurrence {
    pub interval: u32,
    pub unit: IntervalUnit,
}

impl Default for Recurrence {
    fn default() -> Self {
        Self::daily()
    }
}

impl Recurrence {
    pub fn new(interval: u32, unit: IntervalUnit) -> Result<Self, RecurrenceError> {
        if interval == 0 {
            return Err(RecurrenceError::ZeroInterval);
        }
        Ok(Self { interval, unit })
    }

    pub fn daily() -> Self {
        Self {
            interval: 1,
            unit: IntervalUnit::Days,
        }
    }

    pub fn weekly() -> Self {
        Self {
            interval: 1,
            unit: IntervalUnit::Weeks,
        }
    }

    /// The occurrence due one interval after `reference`.
    pub fn next_due(&self, reference: NaiveDate) -> NaiveDate {
        add_interval(reference, self.interval.max(1), self.unit)
    }

    /// Length in days of the period that starts at `anchor`.
    pub fn period_days(&self, anchor: NaiveDate) -> i64 {
        days_between(anchor, self.next_due(anchor))
    }

    /// Expected occurrences strictly after `from` and strictly before `until`.
    pub fn occurrences_between(&self, from: NaiveDate, until: NaiveDate) -> Vec<NaiveDate> {
        let mut out = Vec::new();
        let mut cursor = self.next_due(from);
        while cursor < until {
            out.push(cursor);
            let next = self.next_due(cursor);
            if next <= cursor {
                break;
            }
            cursor = next;
        }
        out
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = match self.unit {
            IntervalUnit::Days => 'd',
            IntervalUnit::Weeks => 'w',
            IntervalUnit::Months => 'm',
            IntervalUnit::Years => 'y',
        };
        write!(f, "+{}{}", self.interval, suffix)
    }
}

/// Accepts org-style repeaters (`+1d`, `.+2w`, `++1m`, `3y`) and spelled out
/// forms (`2 weeks`, `1 month`).
impl FromStr for Recurrence {
    type Err = RecurrenceError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let unrecognised = || RecurrenceError::Unrecognised(input.to_string());
        let mut s = input.trim();
        if let Some(stripped) = s.strip_prefix('.') {
            s = stripped;
        }
        s = s.trim_start_matches('+');

        let digits_len = s.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits_len == 0 {
            return Err(unrecognised());
        }
        let interval = s[..digits_len].parse::<u32>().map_err(|_| unrecognised())?;
        let unit_part = s[digits_len..].trim().to_ascii_lowercase();
        let unit = match unit_part.as_str() {
            "d" | "day" | "days" => IntervalUnit::Days,
            "w" | "week" | "weeks" => IntervalUnit::Weeks,
            "m" | "month" | "months" => IntervalUnit::Months,
            "y" | "year" | "years" => IntervalUnit::Years,
            _ => return Err(unrecognised()),
        };
        Recurrence::new(interval, unit)
    }
}
