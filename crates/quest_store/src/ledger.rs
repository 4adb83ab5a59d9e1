use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tracing::{debug, warn};

use quest_domain::profile::{ExperienceLedger, UserProfile, XpGrant};

use crate::repository::{read_document, write_json};

/// Keeps the user profile in `profile.json` and applies every grant to it.
pub struct ProfileLedger {
    path: PathBuf,
    profile: RwLock<UserProfile>,
}

impl ProfileLedger {
    /// Reads `path` when it exists; a missing file starts an empty profile.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let profile = if path.exists() {
            read_document(&path)?
        } else {
            UserProfile::default()
        };
        Ok(Self {
            path,
            profile: RwLock::new(profile),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn profile(&self) -> UserProfile {
        self.profile.read().clone()
    }

    pub fn reload(&self) -> Result<()> {
        let profile = if self.path.exists() {
            read_document(&self.path)?
        } else {
            UserProfile::default()
        };
        *self.profile.write() = profile;
        Ok(())
    }

    pub(crate) fn reload_quietly(&self) {
        if let Err(err) = self.reload() {
            warn!(file = %self.path.display(), error = %err, "keeping cached profile");
        }
    }
}

impl ExperienceLedger for ProfileLedger {
    fn grant(&self, grant: &XpGrant) -> Result<()> {
        let mut profile = self.profile.write();
        let mut next = profile.clone();
        next.apply(grant);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating `{}`", parent.display()))?;
        }
        write_json(&self.path, &next)?;
        debug!(
            source_id = %grant.source_id,
            completed = grant.completed,
            xp = next.xp,
            "profile updated"
        );
        *profile = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quest_domain::profile::RewardSource;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn grant(completed: bool, xp: u32, delta: i64) -> XpGrant {
        XpGrant {
            source: RewardSource::Habit,
            source_id: "run".into(),
            completed,
            level: 1,
            xp,
            attributes: BTreeMap::from([("stamina".to_string(), delta)]),
        }
    }

    #[test]
    fn grants_are_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profile.json");
        let ledger = ProfileLedger::open(&path).unwrap();
        ledger.grant(&grant(true, 20, 2)).unwrap();

        let reopened = ProfileLedger::open(&path).unwrap();
        assert_eq!(reopened.profile().xp, 20);
        assert_eq!(reopened.profile().attributes.get("stamina"), Some(&2));

        reopened.grant(&grant(false, 20, -2)).unwrap();
        assert_eq!(reopened.profile(), UserProfile::default());
    }

    #[test]
    fn failed_write_keeps_the_cached_profile() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file").unwrap();
        let ledger = ProfileLedger::open(blocker.join("profile.json")).unwrap();
        assert!(ledger.grant(&grant(true, 10, 1)).is_err());
        assert_eq!(ledger.profile(), UserProfile::default());
    }
}
