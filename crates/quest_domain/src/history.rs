//! History reconciliation.
//!
//! Turns a sparse completion log into the canonical list of checkbox dates:
//! every eligible day between creation and today carries exactly one entry,
//! days already covered by a nearby success are left out, and stale misses are
//! pruned.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::debug;

use crate::date::{days_between, iter_days, sub_months};
use crate::habit::HistoryEntry;
use crate::recurrence::Recurrence;

/// Misses older than this many months before today are dropped.
pub const RETENTION_MONTHS: u32 = 1;

/// First day whose misses are still retained.
pub fn retention_cutoff(today: NaiveDate) -> NaiveDate {
    sub_months(today, RETENTION_MONTHS)
}

pub fn reconcile(
    created_at: NaiveDate,
    recurrence: &Recurrence,
    history: &[HistoryEntry],
    today: NaiveDate,
) -> Vec<HistoryEntry> {
    let recorded = collapse(history);
    let successes: BTreeSet<NaiveDate> = recorded
        .iter()
        .filter(|(_, success)| **success)
        .map(|(date, _)| *date)
        .collect();
    let cutoff = retention_cutoff(today);

    let mut out: BTreeMap<NaiveDate, bool> = BTreeMap::new();
    for (date, success) in &recorded {
        if *success {
            out.insert(*date, true);
        } else if *date >= cutoff && !is_blocked(*date, &successes, recurrence) {
            out.insert(*date, false);
        }
    }

    let mut synthesized = 0usize;
    for date in iter_days(created_at.max(cutoff), today) {
        if out.contains_key(&date) || is_blocked(date, &successes, recurrence) {
            continue;
        }
        out.insert(date, false);
        synthesized += 1;
    }
    debug!(
        entries = out.len(),
        synthesized,
        dropped = recorded.len() + synthesized - out.len(),
        "reconciled habit history"
    );

    out.into_iter()
        .map(|(date, success)| HistoryEntry { date, success })
        .collect()
}

/// Dates a UI should offer a checkbox for, ascending.
pub fn eligible_dates(
    created_at: NaiveDate,
    recurrence: &Recurrence,
    history: &[HistoryEntry],
    today: NaiveDate,
) -> Vec<NaiveDate> {
    reconcile(created_at, recurrence, history, today)
        .into_iter()
        .filter(|entry| entry.date >= created_at.min(today) && entry.date <= today)
        .map(|entry| entry.date)
        .collect()
}

/// Successful dates of `history`, ascending and unique.
pub fn success_dates(history: &[HistoryEntry]) -> Vec<NaiveDate> {
    let dates: BTreeSet<NaiveDate> = history
        .iter()
        .filter(|entry| entry.success)
        .map(|entry| entry.date)
        .collect();
    dates.into_iter().collect()
}

/// One entry per date; a success on any duplicate wins.
fn collapse(history: &[HistoryEntry]) -> BTreeMap<NaiveDate, bool> {
    let mut recorded: BTreeMap<NaiveDate, bool> = BTreeMap::new();
    for entry in history {
        *recorded.entry(entry.date).or_insert(false) |= entry.success;
    }
    recorded
}

/// A date sits inside the recurrence window of a different successful date.
fn is_blocked(date: NaiveDate, successes: &BTreeSet<NaiveDate>, recurrence: &Recurrence) -> bool {
    successes.iter().any(|success| {
        if *success == date {
            return false;
        }
        let window = recurrence.period_days(*success) - 1;
        window > 0 && days_between(*success, date).abs() <= window
    })
}
