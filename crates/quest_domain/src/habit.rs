use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::difficulty::{Allowance, Difficulty, DifficultyTable};
use crate::milestone;
use crate::recurrence::Recurrence;

pub const DEFAULT_ATTRIBUTE: &str = "discipline";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub created_at: NaiveDate,
    pub recurrence: Recurrence,
    pub streak: Streak,
    pub progress: Progress,
    #[serde(default)]
    pub reward: Reward,
    #[serde(default)]
    pub settings: HabitSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<ArchivedStreak>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Streak {
    pub current: u32,
    pub best: u32,
    pub history: Vec<HistoryEntry>,
    pub is_completed_today: bool,
    pub next_date: NaiveDate,
    #[serde(default)]
    pub last_completed_date: Option<NaiveDate>,
    pub freeze: Freeze,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct HistoryEntry {
    pub date: NaiveDate,
    pub success: bool,
}

impl HistoryEntry {
    pub fn success(date: NaiveDate) -> Self {
        Self {
            date,
            success: true,
        }
    }

    pub fn missed(date: NaiveDate) -> Self {
        Self {
            date,
            success: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Freeze {
    pub available: Allowance,
    /// Missed occurrences a freeze unit has been spent on, ascending.
    #[serde(default)]
    pub history: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub level: u32,
    /// Gain computed by the latest toggle.
    #[serde(rename = "XP")]
    pub xp: u32,
    pub milestones: Vec<Milestone>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Milestone {
    pub target: u32,
    pub reward: MilestoneReward,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MilestoneReward {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<String>>,
}

/// Live attribute grants of a habit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reward {
    #[serde(default)]
    pub attributes: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HabitSettings {
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Attribute names generated milestone rewards rotate through.
    #[serde(default = "default_attributes")]
    pub attributes: Vec<String>,
}

impl Default for HabitSettings {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::default(),
            attributes: default_attributes(),
        }
    }
}

fn default_attributes() -> Vec<String> {
    vec![DEFAULT_ATTRIBUTE.to_string()]
}

/// Success-only snapshot taken when a habit is archived.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedStreak {
    pub archived_at: NaiveDate,
    pub best: u32,
    pub successes: Vec<NaiveDate>,
}

/// Caller-supplied fields for a new habit.
#[derive(Debug, Clone, Default)]
pub struct NewHabit {
    pub title: String,
    pub description: String,
    pub recurrence: Recurrence,
    pub settings: HabitSettings,
}

impl Habit {
    /// A habit with an empty history, full freeze budget and the first
    /// milestone of its difficulty's curve.
    pub fn create(
        id: impl Into<String>,
        new: NewHabit,
        created_at: NaiveDate,
        table: &DifficultyTable,
    ) -> Self {
        let difficulty = new.settings.difficulty;
        let seeded = milestone::seed(table.curve(difficulty), &new.settings);
        Habit {
            id: id.into(),
            title: new.title,
            description: new.description,
            created_at,
            recurrence: new.recurrence,
            streak: Streak {
                current: 0,
                best: 0,
                history: Vec::new(),
                is_completed_today: false,
                next_date: created_at,
                last_completed_date: None,
                freeze: Freeze {
                    available: table.freeze_ceiling(difficulty),
                    history: Vec::new(),
                },
            },
            progress: Progress {
                level: 0,
                xp: 0,
                milestones: vec![seeded],
            },
            reward: Reward::default(),
            settings: new.settings,
            archived: None,
        }
    }

    pub fn entry_on(&self, date: NaiveDate) -> Option<&HistoryEntry> {
        self.streak.history.iter().find(|entry| entry.date == date)
    }

    pub fn is_completed_on(&self, date: NaiveDate) -> bool {
        self.streak
            .history
            .iter()
            .any(|entry| entry.date == date && entry.success)
    }

    pub fn is_archived(&self) -> bool {
        self.archived.is_some()
    }

    /// Moves the history into a success-only snapshot. Archived habits no
    /// longer accept toggles.
    pub fn archive(&mut self, today: NaiveDate) {
        if self.archived.is_some() {
            return;
        }
        let successes = self
            .streak
            .history
            .iter()
            .filter(|entry| entry.success)
            .map(|entry| entry.date)
            .collect();
        self.archived = Some(ArchivedStreak {
            archived_at: today,
            best: self.streak.best,
            successes,
        });
        self.streak.history.clear();
        self.streak.current = 0;
        self.streak.is_completed_today = false;
    }
}
