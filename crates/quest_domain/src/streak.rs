//! Streak and freeze calculation over a reconciled history.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::debug;

use crate::difficulty::Allowance;
use crate::habit::{Freeze, HistoryEntry};
use crate::history::success_dates;
use crate::recurrence::Recurrence;

/// Freeze units granted each time the streak passes a multiple of this.
pub const FREEZE_REGEN_STEP: u32 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreakOutcome {
    pub current: u32,
    /// Length of the run ending at the last success, whether or not that
    /// success is today.
    pub run: u32,
    pub best: u32,
    pub last_completed: Option<NaiveDate>,
    pub freeze: Freeze,
}

/// Walks the successful dates in order, bridging gaps with freeze units.
///
/// Missed occurrences already listed in `freeze.history` were paid for by an
/// earlier pass and cost nothing again. With an unlimited `ceiling` every gap
/// is forgiven and nothing is spent.
pub fn calculate(
    history: &[HistoryEntry],
    recurrence: &Recurrence,
    freeze: &Freeze,
    ceiling: Allowance,
    today: NaiveDate,
) -> StreakOutcome {
    let successes = success_dates(history);
    let mut spent: BTreeSet<NaiveDate> = freeze.history.iter().copied().collect();
    let mut available = freeze.available.clamp_to(ceiling);
    let mut seq: u32 = 0;
    let mut best: u32 = 0;

    for (idx, curr) in successes.iter().copied().enumerate() {
        if idx == 0 {
            seq = 1;
            best = best.max(seq);
            continue;
        }
        let prev = successes[idx - 1];
        let expected = recurrence.next_due(prev);
        match curr.cmp(&expected) {
            Ordering::Equal => seq += 1,
            Ordering::Less => seq = 1,
            Ordering::Greater => {
                let mut missed = vec![expected];
                missed.extend(recurrence.occurrences_between(expected, curr));
                if bridge_gap(&missed, &mut available, &mut spent) {
                    seq += 1;
                } else {
                    debug!(%prev, %curr, missed = missed.len(), "streak broken");
                    seq = 1;
                }
            }
        }
        best = best.max(seq);
    }

    let last_completed = successes.last().copied();
    let current = if last_completed == Some(today) { seq } else { 0 };

    StreakOutcome {
        current,
        run: seq,
        best,
        last_completed,
        freeze: Freeze {
            available,
            history: spent.into_iter().collect(),
        },
    }
}

/// Spends freeze units on the unpaid dates of `missed`. On shortfall the
/// affordable prefix is still paid, the budget drops to zero and the gap stays
/// open.
fn bridge_gap(
    missed: &[NaiveDate],
    available: &mut Allowance,
    spent: &mut BTreeSet<NaiveDate>,
) -> bool {
    let Allowance::Limited(budget) = *available else {
        return true;
    };
    let unpaid: Vec<NaiveDate> = missed
        .iter()
        .copied()
        .filter(|date| !spent.contains(date))
        .collect();
    let needed = u32::try_from(unpaid.len()).unwrap_or(u32::MAX);
    if budget >= needed {
        spent.extend(unpaid);
        *available = Allowance::Limited(budget - needed);
        return true;
    }
    spent.extend(unpaid.into_iter().take(budget as usize));
    *available = Allowance::Limited(0);
    false
}

/// Grants one freeze unit per multiple of [`FREEZE_REGEN_STEP`] the run
/// passed on its way from `previous` up to `current`, capped at the ceiling.
/// Both sides must be run lengths, not the today-only `current` streak.
pub fn regenerate_freeze(
    available: Allowance,
    ceiling: Allowance,
    previous: u32,
    current: u32,
) -> Allowance {
    let Allowance::Limited(max) = ceiling else {
        return Allowance::Unlimited;
    };
    let held = available.limit().unwrap_or(max).min(max);
    let crossed = (current / FREEZE_REGEN_STEP).saturating_sub(previous / FREEZE_REGEN_STEP);
    Allowance::Limited(held.saturating_add(crossed).min(max))
}
