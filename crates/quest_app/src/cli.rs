//! Command-line surface: argument parsing and command execution.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use quest_domain::date::{format_day, parse_day};
use quest_domain::difficulty::{Allowance, Difficulty};
use quest_domain::habit::{Habit, HabitSettings, NewHabit, DEFAULT_ATTRIBUTE};
use quest_domain::quest::Quest;
use quest_domain::recurrence::Recurrence;
use quest_domain::{HabitService, ToggleReport};

use crate::config::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "quest")]
#[command(about = "Habit streaks, milestones and quests")]
pub struct Cli {
    /// Storage root holding habits/, quests/ and profile.json
    #[arg(short, long, env = "QUEST_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// JSON file overriding the difficulty table
    #[arg(long, env = "QUEST_DIFFICULTY_FILE")]
    pub difficulty_file: Option<PathBuf>,

    /// Treat this date as today (YYYY-MM-DD)
    #[arg(long, env = "QUEST_TODAY", value_parser = parse_day)]
    pub today: Option<NaiveDate>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List habits and quests
    List {
        /// Include archived habits
        #[arg(long)]
        archived: bool,
    },

    /// Create a habit
    Create {
        title: String,
        /// Recurrence such as +1d, +2w or +1m
        #[arg(short, long, default_value = "+1d")]
        every: Recurrence,
        #[arg(long, default_value = "normal")]
        difficulty: Difficulty,
        /// Attribute rewarded by milestones; repeat for several
        #[arg(short, long = "attribute")]
        attributes: Vec<String>,
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Mark a date completed (default: today)
    Complete {
        id: String,
        #[arg(long)]
        date: Option<String>,
    },

    /// Undo a completion (default: today)
    Uncomplete {
        id: String,
        #[arg(long)]
        date: Option<String>,
    },

    /// Archive a habit, keeping its successful dates
    Archive { id: String },

    /// Show one habit, recounted against today
    Show { id: String },
}

impl Cli {
    /// Layers the flags over `config`; unset flags keep its values.
    pub fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(file) = &self.difficulty_file {
            config.difficulty_file = Some(file.clone());
        }
        if let Some(today) = self.today {
            config.today = Some(today);
        }
        config
    }
}

/// Runs `command` and returns what should be printed.
pub fn execute(service: &HabitService, command: Command, json: bool) -> Result<String> {
    match command {
        Command::List { archived } => {
            let habits: Vec<Habit> = service
                .habits()?
                .into_iter()
                .filter(|habit| archived || !habit.is_archived())
                .collect();
            let quests = service.quests()?;
            if json {
                return Ok(serde_json::to_string_pretty(&serde_json::json!({
                    "habits": habits,
                    "quests": quests,
                }))?);
            }
            Ok(render_list(&habits, &quests))
        }
        Command::Create {
            title,
            every,
            difficulty,
            attributes,
            description,
        } => {
            let attributes = if attributes.is_empty() {
                vec![DEFAULT_ATTRIBUTE.to_string()]
            } else {
                attributes
            };
            let habit = service.create_habit(NewHabit {
                title,
                description,
                recurrence: every,
                settings: HabitSettings {
                    difficulty,
                    attributes,
                },
            })?;
            if json {
                return Ok(serde_json::to_string_pretty(&habit)?);
            }
            Ok(format!("created {}\n{}", habit.id, render_habit(&habit)))
        }
        Command::Complete { id, date } => {
            let report = match date {
                Some(date) => service.complete(&id, date)?,
                None => service.complete(&id, service.today())?,
            };
            render_report(&report, json)
        }
        Command::Uncomplete { id, date } => {
            let report = match date {
                Some(date) => service.uncomplete(&id, date)?,
                None => service.uncomplete(&id, service.today())?,
            };
            render_report(&report, json)
        }
        Command::Archive { id } => {
            let habit = service.archive_habit(&id)?;
            if json {
                return Ok(serde_json::to_string_pretty(&habit)?);
            }
            Ok(format!("archived {}\n{}", habit.id, render_habit(&habit)))
        }
        Command::Show { id } => {
            let habit = service.habit(&id)?;
            let habit = if habit.is_archived() {
                habit
            } else {
                service.refresh_habit(&id)?.habit
            };
            if json {
                return Ok(serde_json::to_string_pretty(&habit)?);
            }
            Ok(render_habit_detail(&habit))
        }
    }
}

fn render_report(report: &ToggleReport, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(&serde_json::json!({
            "habit": report.update.habit,
            "level": report.update.level,
            "xp": report.update.xp,
            "attributeDelta": report.update.attribute_delta,
            "questsChanged": report.cascade.changed,
            "questCycle": report.cascade.cycle,
        }))?);
    }
    let mut out = render_habit(&report.update.habit);
    for target in &report.update.milestones_reached {
        let _ = write!(out, "\nmilestone {target} reached");
    }
    for target in &report.update.milestones_lost {
        let _ = write!(out, "\nmilestone {target} lost");
    }
    if !report.cascade.changed.is_empty() {
        let _ = write!(out, "\nquests updated: {}", report.cascade.changed.join(", "));
    }
    if !report.cascade.cycle.is_empty() {
        let _ = write!(out, "\nquests skipped (cycle): {}", report.cascade.cycle.join(", "));
    }
    Ok(out)
}

fn render_list(habits: &[Habit], quests: &[Quest]) -> String {
    let mut out = String::new();
    if habits.is_empty() {
        out.push_str("no habits\n");
    }
    for habit in habits {
        out.push_str(&render_habit(habit));
        out.push('\n');
    }
    for quest in quests {
        let done = quest.subtasks.iter().filter(|s| s.done).count();
        let _ = writeln!(
            out,
            "quest {}  {}  {:?}  {}/{}",
            quest.id,
            quest.title,
            quest.status,
            done,
            quest.subtasks.len()
        );
    }
    out.trim_end().to_string()
}

fn render_habit(habit: &Habit) -> String {
    let mark = if habit.is_archived() {
        "archived"
    } else if habit.streak.is_completed_today {
        "done"
    } else {
        "due"
    };
    format!(
        "{}  {} ({})  [{}]  streak {}/{}  level {}  freeze {}  next {}",
        habit.id,
        habit.title,
        habit.recurrence,
        mark,
        habit.streak.current,
        habit.streak.best,
        habit.progress.level,
        render_allowance(habit.streak.freeze.available),
        format_day(habit.streak.next_date),
    )
}

fn render_habit_detail(habit: &Habit) -> String {
    let mut out = render_habit(habit);
    let _ = write!(
        out,
        "\ndifficulty {}  created {}",
        habit.settings.difficulty,
        format_day(habit.created_at)
    );
    if let Some(last) = habit.streak.last_completed_date {
        let _ = write!(out, "  last completed {}", format_day(last));
    }
    if let Some(next) = habit.progress.milestones.last() {
        let _ = write!(out, "\nnext milestone at {}", next.target);
    }
    if !habit.reward.attributes.is_empty() {
        let rewards: Vec<String> = habit
            .reward
            .attributes
            .iter()
            .map(|(name, amount)| format!("{name}+{amount}"))
            .collect();
        let _ = write!(out, "\nrewards {}", rewards.join(" "));
    }
    if let Some(archived) = &habit.archived {
        let _ = write!(
            out,
            "\narchived {} with best {} over {} completions",
            format_day(archived.archived_at),
            archived.best,
            archived.successes.len()
        );
    }
    let recent: String = habit
        .streak
        .history
        .iter()
        .rev()
        .take(14)
        .rev()
        .map(|entry| if entry.success { 'x' } else { '.' })
        .collect();
    if !recent.is_empty() {
        let _ = write!(out, "\nrecent {recent}");
    }
    out
}

fn render_allowance(allowance: Allowance) -> String {
    match allowance {
        Allowance::Limited(n) => n.to_string(),
        Allowance::Unlimited => "unlimited".to_string(),
    }
}
