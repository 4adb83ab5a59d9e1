//! On-disk storage for habits, quests and the user profile.
//!
//! Layout under the data root:
//!
//! ```text
//! <root>/habits/<id>.json
//! <root>/quests/<id>.json
//! <root>/profile.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, instrument, warn};

use quest_domain::habit::Habit;
use quest_domain::quest::Quest;
use quest_domain::HabitServiceBuilder;

pub mod ledger;
pub mod repository;

pub use ledger::ProfileLedger;
pub use repository::JsonRepository;

pub const HABITS_DIR: &str = "habits";
pub const QUESTS_DIR: &str = "quests";
pub const PROFILE_FILE: &str = "profile.json";

pub struct JsonStore {
    root: PathBuf,
    habits: Arc<JsonRepository<Habit>>,
    quests: Arc<JsonRepository<Quest>>,
    ledger: Arc<ProfileLedger>,
    watcher: Option<RecommendedWatcher>,
}

impl JsonStore {
    #[instrument(skip(root), fields(root = %root.as_ref().display()))]
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)
            .with_context(|| format!("creating data root `{}`", root.display()))?;
        let root = fs::canonicalize(root)
            .with_context(|| format!("resolving data root `{}`", root.display()))?;
        let habits = Arc::new(JsonRepository::open(root.join(HABITS_DIR))?);
        let quests = Arc::new(JsonRepository::open(root.join(QUESTS_DIR))?);
        let ledger = Arc::new(ProfileLedger::open(root.join(PROFILE_FILE))?);
        debug!(habits = habits.len(), quests = quests.len(), "store opened");
        Ok(Self {
            root,
            habits,
            quests,
            ledger,
            watcher: None,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn habits(&self) -> Arc<JsonRepository<Habit>> {
        Arc::clone(&self.habits)
    }

    pub fn quests(&self) -> Arc<JsonRepository<Quest>> {
        Arc::clone(&self.quests)
    }

    pub fn ledger(&self) -> Arc<ProfileLedger> {
        Arc::clone(&self.ledger)
    }

    /// A service builder with this store's repositories and ledger in place.
    pub fn service_builder(&self) -> HabitServiceBuilder {
        HabitServiceBuilder::new()
            .with_habits(self.habits())
            .with_quests(self.quests())
            .with_ledger(self.ledger())
    }

    pub fn reload_all(&self) -> Result<()> {
        self.habits.reload_all()?;
        self.quests.reload_all()?;
        self.ledger.reload()
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// Starts following external edits of the data root. Changed files are
    /// re-read into the caches as they land.
    pub fn watch(&mut self) -> Result<()> {
        if self.watcher.is_some() {
            return Ok(());
        }
        let refresher = Refresher {
            habits: self.habits(),
            quests: self.quests(),
            ledger: self.ledger(),
        };
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => refresher.apply(&event),
                Err(err) => warn!(error = %err, "filesystem watch error"),
            }
        })?;
        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .with_context(|| format!("watching `{}`", self.root.display()))?;
        self.watcher = Some(watcher);
        Ok(())
    }

    /// Applies one filesystem event to the caches. [`JsonStore::watch`]
    /// calls this for every event it receives.
    pub fn apply_event(&self, event: &notify::Event) {
        Refresher {
            habits: self.habits(),
            quests: self.quests(),
            ledger: self.ledger(),
        }
        .apply(event);
    }
}

struct Refresher {
    habits: Arc<JsonRepository<Habit>>,
    quests: Arc<JsonRepository<Quest>>,
    ledger: Arc<ProfileLedger>,
}

impl Refresher {
    fn apply(&self, event: &notify::Event) {
        if matches!(event.kind, EventKind::Access(_)) {
            return;
        }
        for path in &event.paths {
            debug!(path = %path.display(), kind = ?event.kind, "filesystem change detected");
            let result = if self.habits.owns(path) {
                self.habits.reload_path(path)
            } else if self.quests.owns(path) {
                self.quests.reload_path(path)
            } else if path == self.ledger.path() {
                self.ledger.reload_quietly();
                Ok(())
            } else {
                Ok(())
            };
            if let Err(err) = result {
                warn!(path = %path.display(), error = %err, "could not refresh cache");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use quest_domain::repository::Repository;
    use quest_domain::quest::QuestStatus;
    use tempfile::tempdir;

    #[test]
    fn open_creates_the_layout() {
        let dir = tempdir().unwrap();
        let store = JsonStore::open(dir.path().join("data")).unwrap();
        assert!(store.root().join(HABITS_DIR).is_dir());
        assert!(store.root().join(QUESTS_DIR).is_dir());
        assert!(!store.is_watching());
    }

    #[test]
    fn events_refresh_the_matching_cache() {
        let dir = tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        let quests = store.quests();
        let path = quests.dir().join("q1.json");

        let mut quest = Quest::new("q1", "Run a week");
        quest.status = QuestStatus::Completed;
        fs::write(&path, serde_json::to_string(&quest).unwrap()).unwrap();
        store.apply_event(&notify::Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone()));
        assert_eq!(quests.get("q1").unwrap(), Some(quest));

        fs::remove_file(&path).unwrap();
        store.apply_event(&notify::Event::new(EventKind::Remove(RemoveKind::File)).add_path(path));
        assert!(quests.get("q1").unwrap().is_none());
    }

    #[test]
    fn profile_edits_are_picked_up() {
        let dir = tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        let path = store.root().join(PROFILE_FILE);
        fs::write(&path, r#"{ "xp": 120, "attributes": { "focus": 4 } }"#).unwrap();
        store.apply_event(&notify::Event::new(EventKind::Modify(ModifyKind::Any)).add_path(path));
        let profile = store.ledger().profile();
        assert_eq!(profile.xp, 120);
        assert_eq!(profile.attributes.get("focus"), Some(&4));
    }
}
