use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    cascade::{self, CascadeReport},
    completion::{self, HabitUpdate, ToggleOutcome},
    date::{Clock, SystemClock, ToCalendarDay},
    difficulty::DifficultyTable,
    error::HabitError,
    habit::{Habit, NewHabit},
    notifications::{ChangeAction, ChangeEvent, ChangeListener, Notice, NotificationSink},
    profile::{ExperienceLedger, RewardSource, XpGrant},
    quest::Quest,
    repository::{MemoryRepository, Repository},
};

/// Result of a toggle: the updated habit plus the quest refresh it caused.
#[derive(Debug, Clone)]
pub struct ToggleReport {
    pub update: HabitUpdate,
    pub cascade: CascadeReport,
}

/// Habit façade. Collaborators are injected through [`HabitServiceBuilder`].
///
/// Toggles of one habit must be serialized by the caller; toggles of
/// different habits are independent.
pub struct HabitService {
    habits: Arc<dyn Repository<Habit>>,
    quests: Arc<dyn Repository<Quest>>,
    ledger: Arc<dyn ExperienceLedger>,
    notification_sink: Option<Box<dyn NotificationSink>>,
    listeners: Vec<ChangeListener>,
    clock: Box<dyn Clock>,
    difficulty: DifficultyTable,
}

pub struct HabitServiceBuilder {
    habits: Option<Arc<dyn Repository<Habit>>>,
    quests: Option<Arc<dyn Repository<Quest>>>,
    ledger: Option<Arc<dyn ExperienceLedger>>,
    notification_sink: Option<Box<dyn NotificationSink>>,
    listeners: Vec<ChangeListener>,
    clock: Box<dyn Clock>,
    difficulty: DifficultyTable,
}

impl Default for HabitServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HabitServiceBuilder {
    pub fn new() -> Self {
        Self {
            habits: None,
            quests: None,
            ledger: None,
            notification_sink: None,
            listeners: Vec::new(),
            clock: Box::new(SystemClock),
            difficulty: DifficultyTable::default(),
        }
    }

    pub fn with_habits(mut self, habits: Arc<dyn Repository<Habit>>) -> Self {
        self.habits = Some(habits);
        self
    }

    pub fn with_quests(mut self, quests: Arc<dyn Repository<Quest>>) -> Self {
        self.quests = Some(quests);
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn ExperienceLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_notification_sink(mut self, sink: Box<dyn NotificationSink>) -> Self {
        self.notification_sink = Some(sink);
        self
    }

    pub fn with_listener(mut self, listener: ChangeListener) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_difficulty_table(mut self, table: DifficultyTable) -> Self {
        self.difficulty = table;
        self
    }

    /// Habits and the ledger are required; quests default to an empty
    /// in-memory repository.
    pub fn build(self) -> Result<HabitService> {
        let habits = self
            .habits
            .ok_or_else(|| anyhow!("habit repository not configured"))?;
        let ledger = self
            .ledger
            .ok_or_else(|| anyhow!("experience ledger not configured"))?;
        let quests: Arc<dyn Repository<Quest>> = match self.quests {
            Some(quests) => quests,
            None => Arc::new(MemoryRepository::<Quest>::new()),
        };
        Ok(HabitService {
            habits,
            quests,
            ledger,
            notification_sink: self.notification_sink,
            listeners: self.listeners,
            clock: self.clock,
            difficulty: self.difficulty,
        })
    }
}

impl HabitService {
    pub fn builder() -> HabitServiceBuilder {
        HabitServiceBuilder::new()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn difficulty_table(&self) -> &DifficultyTable {
        &self.difficulty
    }

    pub fn add_listener(&mut self, listener: ChangeListener) {
        self.listeners.push(listener);
    }

    pub fn habits(&self) -> Result<Vec<Habit>> {
        self.habits.all()
    }

    pub fn quests(&self) -> Result<Vec<Quest>> {
        self.quests.all()
    }

    pub fn habit(&self, id: &str) -> Result<Habit> {
        self.habits
            .get(id)?
            .ok_or_else(|| HabitError::UnknownHabit(id.to_string()).into())
    }

    #[instrument(skip(self, new), fields(title = %new.title))]
    pub fn create_habit(&self, new: NewHabit) -> Result<Habit> {
        let habit = Habit::create(
            Uuid::new_v4().to_string(),
            new,
            self.today(),
            &self.difficulty,
        );
        self.habits
            .put(habit.clone())
            .with_context(|| format!("saving new habit `{}`", habit.id))?;
        self.broadcast(&ChangeEvent::habit(ChangeAction::Create, &habit.id));
        Ok(habit)
    }

    pub fn complete(&self, id: &str, date: impl ToCalendarDay) -> Result<ToggleReport> {
        self.toggle(id, date, true)
    }

    pub fn uncomplete(&self, id: &str, date: impl ToCalendarDay) -> Result<ToggleReport> {
        self.toggle(id, date, false)
    }

    /// Runs the toggle pipeline, persists the habit, hands the reward delta to
    /// the ledger, notifies, broadcasts and refreshes dependent quests.
    ///
    /// Typed failures ([`HabitError`]) can be recovered with
    /// `err.downcast_ref::<HabitError>()`.
    #[instrument(skip(self, date))]
    pub fn toggle(
        &self,
        id: &str,
        date: impl ToCalendarDay,
        completed: bool,
    ) -> Result<ToggleReport> {
        let habit = self.habit(id)?;
        let update =
            completion::apply_toggle(&habit, date, completed, self.today(), &self.difficulty)?;
        if update.outcome == ToggleOutcome::AlreadyUncompleted {
            return Ok(ToggleReport {
                update,
                cascade: CascadeReport::default(),
            });
        }

        let grant = XpGrant {
            source: RewardSource::Habit,
            source_id: id.to_string(),
            completed: update.completed(),
            level: update.level,
            xp: update.ledger_xp(),
            attributes: update.attribute_delta.clone(),
        };
        self.commit(&update.habit, &grant)?;
        if update.leveled_up() {
            info!(habit_id = id, level = update.level, xp = update.xp, "milestone level up");
            self.notify(Notice {
                title: format!("{}: level {}", update.habit.title, update.level),
                body: format!(
                    "Streak of {} reached. +{} XP",
                    update.habit.streak.current, update.xp
                ),
            });
        }
        let action = if update.completed() {
            ChangeAction::Complete
        } else {
            ChangeAction::Uncomplete
        };
        self.broadcast(&ChangeEvent::habit(action, id));

        let cascade = self.cascade(id)?;
        Ok(ToggleReport { update, cascade })
    }

    /// Recounts a habit against today's date, e.g. after midnight, and
    /// forwards any attribute change to the ledger.
    pub fn refresh_habit(&self, id: &str) -> Result<HabitUpdate> {
        let habit = self.habit(id)?;
        let update = completion::recalculate(&habit, self.today(), &self.difficulty);
        if update.habit == habit {
            return Ok(update);
        }
        if update.attribute_delta.is_empty() {
            self.habits
                .put(update.habit.clone())
                .with_context(|| format!("saving habit `{id}`"))?;
        } else {
            let grant = XpGrant {
                source: RewardSource::Habit,
                source_id: id.to_string(),
                completed: false,
                level: update.level,
                xp: 0,
                attributes: update.attribute_delta.clone(),
            };
            self.commit(&update.habit, &grant)?;
        }
        self.broadcast(&ChangeEvent::habit(ChangeAction::Refresh, id));
        Ok(update)
    }

    pub fn archive_habit(&self, id: &str) -> Result<Habit> {
        let mut habit = self.habit(id)?;
        habit.archive(self.today());
        self.habits.put(habit.clone())?;
        self.broadcast(&ChangeEvent::habit(ChangeAction::Archive, id));
        Ok(habit)
    }

    /// Loads the full quest snapshot, refreshes the quests depending on
    /// `habit_id` and writes the snapshot back when something changed.
    pub fn cascade(&self, habit_id: &str) -> Result<CascadeReport> {
        let mut quests = self.quests.all().context("loading quests")?;
        let habits = self.habits.all().context("loading habits")?;
        let report = cascade::cascade_from_habit(habit_id, &mut quests, &habits);
        if !report.changed.is_empty() {
            self.quests.put_all(quests).context("saving quests")?;
            for quest_id in &report.changed {
                self.broadcast(&ChangeEvent::quest(ChangeAction::Refresh, quest_id));
            }
        }
        Ok(report)
    }

    /// Grants first, then saves. A failed grant leaves nothing changed; a
    /// failed save is followed by the reversing grant.
    fn commit(&self, habit: &Habit, grant: &XpGrant) -> Result<()> {
        self.ledger.grant(grant)?;
        if let Err(err) = self.habits.put(habit.clone()) {
            if let Err(undo) = self.ledger.grant(&grant.reversed()) {
                warn!(habit_id = %habit.id, error = %undo, "could not reverse profile grant");
            }
            return Err(err.context(format!("saving habit `{}`", habit.id)));
        }
        Ok(())
    }

    fn notify(&self, notice: Notice) {
        if let Some(sink) = &self.notification_sink {
            sink.notify(notice);
        }
    }

    fn broadcast(&self, event: &ChangeEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }
}
