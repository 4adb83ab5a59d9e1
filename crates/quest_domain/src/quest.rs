use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::habit::Habit;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub created_at: Option<NaiveDate>,
    /// Quests that must be completed before this one unlocks.
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub status: QuestStatus,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuestStatus {
    Locked,
    #[default]
    Active,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subtask {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<SubtaskCondition>,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SubtaskCondition {
    #[serde(rename_all = "camelCase")]
    HabitStreak { habit_id: String, streak: u32 },
    #[serde(rename_all = "camelCase")]
    QuestCompleted { quest_id: String },
}

impl Quest {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            created_at: None,
            requirements: Vec::new(),
            subtasks: Vec::new(),
            status: QuestStatus::Active,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == QuestStatus::Completed
    }

    pub fn watches_habit(&self, habit_id: &str) -> bool {
        self.subtasks.iter().any(|subtask| {
            matches!(
                &subtask.condition,
                Some(SubtaskCondition::HabitStreak { habit_id: id, .. }) if id == habit_id
            )
        })
    }

    /// Quests this one waits on, through requirements or subtask conditions.
    pub fn depends_on(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.requirements.iter().map(String::as_str).collect();
        for subtask in &self.subtasks {
            if let Some(SubtaskCondition::QuestCompleted { quest_id }) = &subtask.condition {
                out.push(quest_id.as_str());
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}

/// Re-evaluates `quest` against the current habits and quest statuses.
///
/// A quest stays locked while a requirement is unfinished. Otherwise each
/// conditioned subtask mirrors its condition and the quest completes once it
/// has subtasks and all of them are done. Returns whether anything changed.
pub fn refresh_quest(
    quest: &mut Quest,
    habits: &HashMap<String, Habit>,
    statuses: &HashMap<String, QuestStatus>,
) -> bool {
    let before = quest.clone();
    let unlocked = quest
        .requirements
        .iter()
        .all(|id| statuses.get(id) == Some(&QuestStatus::Completed));

    if !unlocked {
        quest.status = QuestStatus::Locked;
        return *quest != before;
    }

    for subtask in &mut quest.subtasks {
        match &subtask.condition {
            Some(SubtaskCondition::HabitStreak { habit_id, streak }) => {
                subtask.done = habits
                    .get(habit_id)
                    .map(|habit| habit.streak.current >= *streak)
                    .unwrap_or(false);
            }
            Some(SubtaskCondition::QuestCompleted { quest_id }) => {
                subtask.done = statuses.get(quest_id) == Some(&QuestStatus::Completed);
            }
            None => {}
        }
    }

    let all_done = !quest.subtasks.is_empty() && quest.subtasks.iter().all(|s| s.done);
    quest.status = if all_done {
        QuestStatus::Completed
    } else {
        QuestStatus::Active
    };
    *quest != before
}
