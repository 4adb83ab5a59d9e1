pub mod cascade;
pub mod completion;
pub mod date;
pub mod difficulty;
pub mod error;
pub mod habit;
pub mod history;
pub mod milestone;
pub mod notifications;
pub mod profile;
pub mod quest;
pub mod recurrence;
pub mod repository;
pub mod service;
pub mod streak;

pub use crate::error::{DateError, HabitError};
pub use crate::service::{HabitService, HabitServiceBuilder, ToggleReport};
