//! The toggle pipeline: mutate one history entry, then reconcile, recount the
//! streak, regenerate freezes, move milestones and assemble the reward delta.
//!
//! Everything here is pure. Persistence and broadcasting belong to
//! [`crate::service::HabitService`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::date::{to_calendar_day, ToCalendarDay};
use crate::difficulty::DifficultyTable;
use crate::error::HabitError;
use crate::habit::{Habit, HistoryEntry};
use crate::{history, milestone, streak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Completed,
    Uncompleted,
    /// Uncomplete of a date without any entry; the habit is returned as is.
    AlreadyUncompleted,
    /// No toggle, only a recount against a new "today".
    Recalculated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HabitUpdate {
    pub habit: Habit,
    pub outcome: ToggleOutcome,
    pub date: NaiveDate,
    pub previous_current: u32,
    pub previous_level: u32,
    pub level: u32,
    /// XP computed for the state after the toggle.
    pub xp: u32,
    /// XP of the state before the toggle, i.e. what its last completion
    /// granted.
    pub previous_xp: u32,
    /// Signed change of `habit.reward.attributes`; zero deltas are omitted.
    pub attribute_delta: BTreeMap<String, i64>,
    pub milestones_reached: Vec<u32>,
    pub milestones_lost: Vec<u32>,
}

impl HabitUpdate {
    pub fn completed(&self) -> bool {
        matches!(self.outcome, ToggleOutcome::Completed)
    }

    pub fn leveled_up(&self) -> bool {
        self.level > self.previous_level
    }

    /// XP to hand to the ledger: the gain of a completion, or on uncompletion
    /// the gain the reversed state had been granted.
    pub fn ledger_xp(&self) -> u32 {
        match self.outcome {
            ToggleOutcome::Completed => self.xp,
            ToggleOutcome::Uncompleted => self.previous_xp,
            ToggleOutcome::AlreadyUncompleted | ToggleOutcome::Recalculated => 0,
        }
    }

    fn unchanged(habit: &Habit, outcome: ToggleOutcome, date: NaiveDate) -> Self {
        Self {
            habit: habit.clone(),
            outcome,
            date,
            previous_current: habit.streak.current,
            previous_level: habit.progress.level,
            level: habit.progress.level,
            xp: 0,
            previous_xp: 0,
            attribute_delta: BTreeMap::new(),
            milestones_reached: Vec::new(),
            milestones_lost: Vec::new(),
        }
    }
}

/// Marks `date` completed (`completed == true`) or missed and recomputes the
/// habit. Fails before touching anything on a bad date, an archived habit, a
/// completion outside `created_at..=today` or a second completion of the same
/// date.
pub fn apply_toggle(
    habit: &Habit,
    date: impl ToCalendarDay,
    completed: bool,
    today: NaiveDate,
    table: &DifficultyTable,
) -> Result<HabitUpdate, HabitError> {
    let date = to_calendar_day(date)?;
    if habit.is_archived() {
        return Err(HabitError::Archived(habit.id.clone()));
    }
    if completed && (date > today || date < habit.created_at) {
        return Err(HabitError::OutsideWindow {
            habit_id: habit.id.clone(),
            date,
        });
    }
    if completed && habit.is_completed_on(date) {
        return Err(HabitError::DuplicateCompletion {
            habit_id: habit.id.clone(),
            date,
        });
    }
    if !completed && habit.entry_on(date).is_none() {
        warn!(habit_id = %habit.id, %date, "uncomplete requested for a date without history entry");
        return Ok(HabitUpdate::unchanged(
            habit,
            ToggleOutcome::AlreadyUncompleted,
            date,
        ));
    }

    let mut next = habit.clone();
    next.streak.history.retain(|entry| entry.date != date);
    next.streak.history.push(HistoryEntry {
        date,
        success: completed,
    });

    let outcome = if completed {
        ToggleOutcome::Completed
    } else {
        ToggleOutcome::Uncompleted
    };
    Ok(settle(next, habit, outcome, date, today, table))
}

/// Recounts a habit against `today` without toggling anything, e.g. after the
/// calendar rolled over.
pub fn recalculate(habit: &Habit, today: NaiveDate, table: &DifficultyTable) -> HabitUpdate {
    if habit.is_archived() {
        return HabitUpdate::unchanged(habit, ToggleOutcome::Recalculated, today);
    }
    settle(
        habit.clone(),
        habit,
        ToggleOutcome::Recalculated,
        today,
        today,
        table,
    )
}

fn settle(
    mut next: Habit,
    before: &Habit,
    outcome: ToggleOutcome,
    date: NaiveDate,
    today: NaiveDate,
    table: &DifficultyTable,
) -> HabitUpdate {
    let difficulty = next.settings.difficulty;
    let ceiling = table.freeze_ceiling(difficulty);
    let previous_current = before.streak.current;
    let previous_level = before.progress.level;
    let multiplier = table.reward_multiplier(difficulty);
    // Pre-toggle run, recounted against the same `today` as the new state.
    let previous_run = streak::calculate(
        &history::reconcile(
            before.created_at,
            &before.recurrence,
            &before.streak.history,
            today,
        ),
        &before.recurrence,
        &before.streak.freeze,
        ceiling,
        today,
    )
    .run;

    let reconciled = history::reconcile(
        next.created_at,
        &next.recurrence,
        &next.streak.history,
        today,
    );
    let counted = streak::calculate(
        &reconciled,
        &next.recurrence,
        &next.streak.freeze,
        ceiling,
        today,
    );
    let current = counted.current;

    next.streak.history = reconciled;
    next.streak.current = current;
    next.streak.best = counted.best;
    next.streak.is_completed_today = next.is_completed_on(today);
    next.streak.last_completed_date = counted.last_completed;
    next.streak.next_date = counted
        .last_completed
        .map(|last| next.recurrence.next_due(last))
        .unwrap_or(next.created_at);
    next.streak.freeze.history = counted.freeze.history;
    next.streak.freeze.available =
        streak::regenerate_freeze(counted.freeze.available, ceiling, previous_run, counted.run);

    let curve = table.curve(difficulty);
    milestone::maybe_generate_next(
        &mut next.progress.milestones,
        current,
        curve,
        &next.settings,
    );
    let milestones_reached = milestone::apply_upgrade(
        &next.progress.milestones,
        previous_current,
        current,
        &mut next.reward.attributes,
    );
    let milestones_lost = milestone::apply_downgrade(
        &next.progress.milestones,
        previous_current,
        current,
        &mut next.reward.attributes,
    );
    let level = milestone::level(&next.progress.milestones, current);
    let xp = milestone::xp_gain(level, multiplier);
    let previous_xp = milestone::xp_gain(previous_level, multiplier);
    next.progress.level = level;
    next.progress.xp = xp;

    let attribute_delta = attribute_delta(&before.reward.attributes, &next.reward.attributes);
    debug!(
        habit_id = %next.id,
        previous_current,
        current,
        best = next.streak.best,
        level,
        xp,
        "habit settled"
    );

    HabitUpdate {
        habit: next,
        outcome,
        date,
        previous_current,
        previous_level,
        level,
        xp,
        previous_xp,
        attribute_delta,
        milestones_reached,
        milestones_lost,
    }
}

fn attribute_delta(
    before: &BTreeMap<String, u32>,
    after: &BTreeMap<String, u32>,
) -> BTreeMap<String, i64> {
    let names: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    names
        .into_iter()
        .filter_map(|name| {
            let old = i64::from(before.get(name).copied().unwrap_or(0));
            let new = i64::from(after.get(name).copied().unwrap_or(0));
            (old != new).then(|| (name.clone(), new - old))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::{add_interval, parse_day, IntervalUnit};
    use crate::difficulty::{Allowance, Difficulty};
    use crate::habit::{HabitSettings, NewHabit};
    use crate::recurrence::Recurrence;

    fn day(s: &str) -> NaiveDate {
        parse_day(s).unwrap()
    }

    fn habit(difficulty: Difficulty, recurrence: Recurrence, created: &str) -> Habit {
        Habit::create(
            "habit-1",
            NewHabit {
                title: "Practice".into(),
                recurrence,
                settings: HabitSettings {
                    difficulty,
                    attributes: vec!["strength".into()],
                },
                ..NewHabit::default()
            },
            day(created),
            &DifficultyTable::default(),
        )
    }

    fn complete(habit: &Habit, date: &str, today: &str) -> HabitUpdate {
        apply_toggle(habit, date, true, day(today), &DifficultyTable::default()).unwrap()
    }

    #[test]
    fn consecutive_daily_completions() {
        let mut h = habit(Difficulty::Normal, Recurrence::daily(), "2024-01-01");
        for date in ["2024-01-01", "2024-01-02", "2024-01-03"] {
            h = complete(&h, date, date).habit;
        }
        assert_eq!((h.streak.current, h.streak.best), (3, 3));
        assert!(h.streak.is_completed_today);
        assert_eq!(h.streak.last_completed_date, Some(day("2024-01-03")));
        assert_eq!(h.streak.next_date, day("2024-01-04"));
    }

    #[test]
    fn single_gap_bridged_by_freeze() {
        let mut h = habit(Difficulty::Hard, Recurrence::daily(), "2024-01-01");
        for date in ["2024-01-01", "2024-01-02", "2024-01-03"] {
            h = complete(&h, date, date).habit;
        }
        assert_eq!(h.streak.freeze.available, Allowance::Limited(1));
        let h = complete(&h, "2024-01-05", "2024-01-05").habit;
        assert_eq!(h.streak.current, 4);
        assert_eq!(h.streak.freeze.available, Allowance::Limited(0));
        assert_eq!(h.streak.freeze.history, vec![day("2024-01-04")]);
    }

    #[test]
    fn gap_without_freeze_breaks_the_streak() {
        let mut h = habit(Difficulty::Extreme, Recurrence::daily(), "2024-01-01");
        for date in ["2024-01-01", "2024-01-02", "2024-01-03"] {
            h = complete(&h, date, date).habit;
        }
        let on_the_day = complete(&h, "2024-01-05", "2024-01-05").habit;
        assert_eq!((on_the_day.streak.current, on_the_day.streak.best), (1, 3));
        let late = complete(&h, "2024-01-05", "2024-01-06").habit;
        assert_eq!(late.streak.current, 0);
    }

    #[test]
    fn duplicate_completion_is_rejected_without_mutation() {
        let h = habit(Difficulty::Normal, Recurrence::daily(), "2024-01-01");
        let h = complete(&h, "2024-01-01", "2024-01-01").habit;
        let err = apply_toggle(&h, "2024-01-01", true, day("2024-01-01"), &DifficultyTable::default())
            .unwrap_err();
        assert_eq!(
            err,
            HabitError::DuplicateCompletion {
                habit_id: "habit-1".into(),
                date: day("2024-01-01"),
            }
        );
    }

    #[test]
    fn invalid_date_fails_before_anything_else() {
        let h = habit(Difficulty::Normal, Recurrence::daily(), "2024-01-01");
        let err = apply_toggle(&h, "01/02/2024", true, day("2024-01-02"), &DifficultyTable::default())
            .unwrap_err();
        assert!(matches!(err, HabitError::InvalidDate(_)));
    }

    #[test]
    fn uncompleting_a_missing_entry_is_a_no_op() {
        let h = habit(Difficulty::Normal, Recurrence::daily(), "2024-01-01");
        let update =
            apply_toggle(&h, "2024-01-01", false, day("2024-01-03"), &DifficultyTable::default())
                .unwrap();
        assert_eq!(update.outcome, ToggleOutcome::AlreadyUncompleted);
        assert_eq!(update.habit, h);
        assert_eq!(update.xp, 0);
        assert!(update.attribute_delta.is_empty());
    }

    #[test]
    fn weekly_milestone_is_granted_and_clawed_back() {
        let mut h = habit(Difficulty::Normal, Recurrence::weekly(), "2024-01-01");
        let dates: Vec<NaiveDate> = (0..7)
            .map(|week| add_interval(day("2024-01-01"), week, IntervalUnit::Weeks))
            .collect();
        let today = dates[6];
        let table = DifficultyTable::default();
        let mut last = None;
        for date in &dates {
            let update = apply_toggle(&h, *date, true, today, &table).unwrap();
            h = update.habit.clone();
            last = Some(update);
        }
        let reached = last.unwrap();
        assert_eq!(h.streak.current, 7);
        assert_eq!(h.progress.level, 1);
        assert_eq!(reached.milestones_reached, vec![7]);
        assert_eq!(reached.attribute_delta, BTreeMap::from([("strength".to_string(), 1)]));
        assert_eq!(reached.xp, 20);
        assert_eq!(h.reward.attributes.get("strength"), Some(&1));
        assert_eq!(h.progress.milestones.len(), 2);

        let undone = apply_toggle(&h, today, false, today, &table).unwrap();
        assert_eq!(undone.level, 0);
        assert_eq!(undone.previous_level, 1);
        assert_eq!(undone.milestones_lost, vec![7]);
        assert!(undone.habit.reward.attributes.is_empty());
        assert_eq!(undone.attribute_delta, BTreeMap::from([("strength".to_string(), -1)]));
        assert_eq!(undone.habit.progress.milestones.len(), 2);
    }

    #[test]
    fn milestone_round_trip_restores_attributes_exactly() {
        let mut h = habit(Difficulty::Easy, Recurrence::daily(), "2024-01-01");
        h.reward.attributes.insert("wisdom".into(), 5);
        let before = h.reward.attributes.clone();
        let table = DifficultyTable::default();
        for date in ["2024-01-01", "2024-01-02"] {
            h = apply_toggle(&h, date, true, day("2024-01-03"), &table).unwrap().habit;
        }
        let up = apply_toggle(&h, "2024-01-03", true, day("2024-01-03"), &table).unwrap();
        assert_eq!(up.milestones_reached, vec![3]);
        let down = apply_toggle(&up.habit, "2024-01-02", false, day("2024-01-03"), &table).unwrap();
        assert_eq!(down.habit.streak.current, 2);
        assert_eq!(down.habit.reward.attributes, before);
    }

    #[test]
    fn freeze_regenerates_when_a_week_is_completed() {
        let mut h = habit(Difficulty::Normal, Recurrence::daily(), "2024-01-01");
        h.streak.freeze.available = Allowance::Limited(0);
        let table = DifficultyTable::default();
        let dates: Vec<NaiveDate> = (0..7)
            .map(|offset| add_interval(day("2024-01-01"), offset, IntervalUnit::Days))
            .collect();
        for date in &dates {
            h = apply_toggle(&h, *date, true, *date, &table).unwrap().habit;
        }
        assert_eq!(h.streak.current, 7);
        assert_eq!(h.streak.freeze.available, Allowance::Limited(1));
    }

    #[test]
    fn recalculate_drops_current_on_the_next_day() {
        let h = habit(Difficulty::Normal, Recurrence::daily(), "2024-01-01");
        let h = complete(&h, "2024-01-01", "2024-01-01").habit;
        let next_day = recalculate(&h, day("2024-01-02"), &DifficultyTable::default());
        assert_eq!(next_day.habit.streak.current, 0);
        assert_eq!(next_day.habit.streak.best, 1);
        assert!(!next_day.habit.streak.is_completed_today);
        assert_eq!(
            next_day.habit.streak.history.last(),
            Some(&HistoryEntry::missed(day("2024-01-02")))
        );
    }

    #[test]
    fn archived_habits_reject_toggles() {
        let mut h = habit(Difficulty::Normal, Recurrence::daily(), "2024-01-01");
        h.archive(day("2024-01-02"));
        let err = apply_toggle(&h, "2024-01-02", true, day("2024-01-02"), &DifficultyTable::default())
            .unwrap_err();
        assert_eq!(err, HabitError::Archived("habit-1".into()));
    }

    #[test]
    fn completions_outside_the_window_are_rejected() {
        let h = habit(Difficulty::Normal, Recurrence::daily(), "2024-01-02");
        let table = DifficultyTable::default();
        for date in ["2024-01-09", "2024-01-01"] {
            let err = apply_toggle(&h, date, true, day("2024-01-03"), &table).unwrap_err();
            assert_eq!(
                err,
                HabitError::OutsideWindow {
                    habit_id: "habit-1".into(),
                    date: day(date),
                }
            );
        }
        let update = apply_toggle(&h, "2024-01-09", false, day("2024-01-03"), &table).unwrap();
        assert_eq!(update.outcome, ToggleOutcome::AlreadyUncompleted);
    }

    #[test]
    fn removing_a_success_never_raises_best() {
        let mut h = habit(Difficulty::Normal, Recurrence::daily(), "2024-01-01");
        let dates = ["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04", "2024-01-05"];
        for date in dates {
            h = complete(&h, date, date).habit;
        }
        assert_eq!(h.streak.best, 5);
        let table = DifficultyTable::default();
        for date in dates {
            let update = apply_toggle(&h, date, false, day("2024-01-05"), &table).unwrap();
            assert_eq!(update.outcome, ToggleOutcome::Uncompleted);
            assert!(update.habit.streak.best <= h.streak.best, "removing {date}");
        }
    }

    #[test]
    fn uncomplete_reverses_the_xp_of_the_prior_state() {
        let mut h = habit(Difficulty::Easy, Recurrence::daily(), "2024-01-01");
        for date in ["2024-01-01", "2024-01-02"] {
            h = complete(&h, date, date).habit;
        }
        let up = complete(&h, "2024-01-03", "2024-01-03");
        assert_eq!((up.level, up.ledger_xp()), (1, 10));
        let down = apply_toggle(&up.habit, "2024-01-03", false, day("2024-01-03"), &DifficultyTable::default())
            .unwrap();
        assert_eq!(down.level, 0);
        assert_eq!(down.ledger_xp(), up.ledger_xp());
    }

    #[test]
    fn uncompleting_a_bridging_success_keeps_the_freeze_spent() {
        let mut h = habit(Difficulty::Hard, Recurrence::daily(), "2024-01-01");
        for date in ["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-05"] {
            h = complete(&h, date, date).habit;
        }
        assert_eq!(h.streak.freeze.history, vec![day("2024-01-04")]);
        let table = DifficultyTable::default();
        let undone = apply_toggle(&h, "2024-01-05", false, day("2024-01-05"), &table).unwrap().habit;
        assert_eq!(undone.streak.freeze.history, vec![day("2024-01-04")]);
        assert_eq!(undone.streak.freeze.available, Allowance::Limited(0));

        let redone = complete(&undone, "2024-01-05", "2024-01-05").habit;
        assert_eq!(redone.streak.current, 4);
        assert_eq!(redone.streak.freeze.available, Allowance::Limited(0));
    }
}
