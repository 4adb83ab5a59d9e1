use serde::{Deserialize, Serialize};

/// Human readable feedback, e.g. a milestone level-up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub body: String,
}

/// Platform-specific toast/notification adapters implement this trait.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notice: Notice);
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Habit,
    Quest,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Complete,
    Uncomplete,
    Create,
    Archive,
    Refresh,
}

/// "Data changed" signal so views can refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub action: ChangeAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub habit_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quest_id: Option<String>,
}

impl ChangeEvent {
    pub fn habit(action: ChangeAction, habit_id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Habit,
            action,
            habit_id: Some(habit_id.into()),
            quest_id: None,
        }
    }

    pub fn quest(action: ChangeAction, quest_id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Quest,
            action,
            habit_id: None,
            quest_id: Some(quest_id.into()),
        }
    }
}

pub type ChangeListener = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn habit_event_payload_shape() {
        let event = ChangeEvent::habit(ChangeAction::Uncomplete, "h1");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "habit", "action": "uncomplete", "habitId": "h1" })
        );
    }
}
