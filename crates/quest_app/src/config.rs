use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{info, warn};

use quest_domain::date::{parse_day, Clock, FixedClock, SystemClock};
use quest_domain::difficulty::DifficultyTable;

pub const DEFAULT_DATA_DIR: &str = ".quest";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub difficulty_file: Option<PathBuf>,
    /// Pins "today" instead of reading the system clock.
    pub today: Option<NaiveDate>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            difficulty_file: None,
            today: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] but reads variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(dir) = lookup("QUEST_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir.trim());
        }
        if let Some(file) = lookup("QUEST_DIFFICULTY_FILE").filter(|v| !v.trim().is_empty()) {
            config.difficulty_file = Some(PathBuf::from(file.trim()));
        }
        if let Some(today) = lookup("QUEST_TODAY") {
            match parse_day(&today) {
                Ok(date) => config.today = Some(date),
                Err(err) => warn!(%err, "ignoring QUEST_TODAY"),
            }
        }
        Ok(config)
    }

    pub fn difficulty_table(&self) -> Result<DifficultyTable> {
        let Some(path) = &self.difficulty_file else {
            return Ok(DifficultyTable::default());
        };
        info!(path = %path.display(), "loading difficulty table");
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading difficulty table `{}`", path.display()))?;
        DifficultyTable::from_json(&raw)
    }

    pub fn clock(&self) -> Box<dyn Clock> {
        match self.today {
            Some(today) => Box::new(FixedClock(today)),
            None => Box::new(SystemClock),
        }
    }
}
