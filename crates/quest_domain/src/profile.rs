use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RewardSource {
    Habit,
    Quest,
}

/// What a toggle hands to the profile: signed attribute changes, the XP
/// computed for the habit and whether the toggle completed or uncompleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct XpGrant {
    pub source: RewardSource,
    pub source_id: String,
    pub completed: bool,
    pub level: u32,
    pub xp: u32,
    pub attributes: BTreeMap<String, i64>,
}

impl XpGrant {
    /// The grant that undoes this one.
    pub fn reversed(&self) -> Self {
        Self {
            completed: !self.completed,
            attributes: self
                .attributes
                .iter()
                .map(|(name, delta)| (name.clone(), -delta))
                .collect(),
            ..self.clone()
        }
    }
}

/// XP/profile collaborator. Level curves live behind this trait.
pub trait ExperienceLedger: Send + Sync {
    fn grant(&self, grant: &XpGrant) -> Result<()>;
}

/// The user profile document: lifetime XP and attribute totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub xp: u64,
    #[serde(default)]
    pub attributes: BTreeMap<String, u64>,
}

impl UserProfile {
    /// Completion adds the grant's XP, uncompletion removes it. Totals never
    /// go below zero.
    pub fn apply(&mut self, grant: &XpGrant) {
        let xp = u64::from(grant.xp);
        self.xp = if grant.completed {
            self.xp.saturating_add(xp)
        } else {
            self.xp.saturating_sub(xp)
        };
        for (name, delta) in &grant.attributes {
            let slot = self.attributes.entry(name.clone()).or_insert(0);
            *slot = slot.saturating_add_signed(*delta);
            if *slot == 0 {
                self.attributes.remove(name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(completed: bool, xp: u32, attributes: &[(&str, i64)]) -> XpGrant {
        XpGrant {
            source: RewardSource::Habit,
            source_id: "h1".into(),
            completed,
            level: 1,
            xp,
            attributes: attributes.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn completion_and_uncompletion_cancel_out() {
        let mut profile = UserProfile::default();
        profile.apply(&grant(true, 20, &[("strength", 1)]));
        assert_eq!(profile.xp, 20);
        assert_eq!(profile.attributes.get("strength"), Some(&1));
        profile.apply(&grant(false, 20, &[("strength", -1)]));
        assert_eq!(profile, UserProfile::default());
    }

    #[test]
    fn reversed_grant_restores_the_profile() {
        let mut profile = UserProfile::default();
        profile.apply(&grant(true, 5, &[("focus", 2)]));
        let before = profile.clone();
        let forward = grant(true, 30, &[("focus", 1), ("strength", 3)]);
        profile.apply(&forward);
        profile.apply(&forward.reversed());
        assert_eq!(profile, before);
    }

    #[test]
    fn totals_do_not_underflow() {
        let mut profile = UserProfile::default();
        profile.apply(&grant(false, 50, &[("focus", -3)]));
        assert_eq!(profile.xp, 0);
        assert!(profile.attributes.is_empty());
    }
}
