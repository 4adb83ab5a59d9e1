use chrono::NaiveDate;
use thiserror::Error;

/// Raised when a date-like input cannot be read as a calendar day.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DateError {
    #[error("invalid date `{input}`")]
    Invalid { input: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecurrenceError {
    #[error("recurrence interval must be at least 1")]
    ZeroInterval,
    #[error("unrecognised recurrence `{0}`")]
    Unrecognised(String),
}

/// Failures of a habit toggle. None of them leave the habit mutated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HabitError {
    #[error("habit `{habit_id}` is already completed on {date}")]
    DuplicateCompletion { habit_id: String, date: NaiveDate },
    #[error(transparent)]
    InvalidDate(#[from] DateError),
    /// Completions are accepted from the creation date up to today.
    #[error("{date} is outside the completion window of habit `{habit_id}`")]
    OutsideWindow { habit_id: String, date: NaiveDate },
    #[error("unknown habit `{0}`")]
    UnknownHabit(String),
    #[error("habit `{0}` is archived")]
    Archived(String),
}
