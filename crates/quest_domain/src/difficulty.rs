use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Normal,
    Hard,
    Extreme,
}

impl Difficulty {
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Easy,
        Difficulty::Normal,
        Difficulty::Hard,
        Difficulty::Extreme,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Normal => "normal",
            Difficulty::Hard => "hard",
            Difficulty::Extreme => "extreme",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Difficulty::ALL
            .into_iter()
            .find(|candidate| candidate.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow!("unknown difficulty `{s}`"))
    }
}

/// A count of freeze units, or no limit at all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Allowance {
    Limited(u32),
    Unlimited,
}

impl Allowance {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Allowance::Unlimited)
    }

    pub fn limit(&self) -> Option<u32> {
        match self {
            Allowance::Limited(n) => Some(*n),
            Allowance::Unlimited => None,
        }
    }

    /// Caps `self` at `ceiling`.
    pub fn clamp_to(self, ceiling: Allowance) -> Allowance {
        match (self, ceiling) {
            (_, Allowance::Unlimited) => Allowance::Unlimited,
            (Allowance::Unlimited, Allowance::Limited(max)) => Allowance::Limited(max),
            (Allowance::Limited(n), Allowance::Limited(max)) => Allowance::Limited(n.min(max)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyProfile {
    pub freeze_ceiling: Allowance,
    pub reward_multiplier: u32,
    /// Ascending streak-length thresholds for milestones.
    pub curve: Vec<u32>,
}

/// Static per-difficulty configuration: freeze ceiling, reward multiplier and
/// milestone curve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DifficultyTable {
    profiles: BTreeMap<Difficulty, DifficultyProfile>,
}

impl Default for DifficultyTable {
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            Difficulty::Easy,
            DifficultyProfile {
                freeze_ceiling: Allowance::Unlimited,
                reward_multiplier: 1,
                curve: vec![3, 7, 14, 30, 60, 90, 180, 365],
            },
        );
        profiles.insert(
            Difficulty::Normal,
            DifficultyProfile {
                freeze_ceiling: Allowance::Limited(3),
                reward_multiplier: 2,
                curve: vec![7, 14, 30, 60, 90, 180, 365],
            },
        );
        profiles.insert(
            Difficulty::Hard,
            DifficultyProfile {
                freeze_ceiling: Allowance::Limited(1),
                reward_multiplier: 3,
                curve: vec![14, 30, 60, 90, 180, 365],
            },
        );
        profiles.insert(
            Difficulty::Extreme,
            DifficultyProfile {
                freeze_ceiling: Allowance::Limited(0),
                reward_multiplier: 4,
                curve: vec![21, 45, 90, 180, 365],
            },
        );
        Self { profiles }
    }
}

impl DifficultyTable {
    /// Reads a table from JSON; difficulties missing from the document keep
    /// their defaults.
    pub fn from_json(raw: &str) -> Result<Self> {
        let overrides: BTreeMap<Difficulty, DifficultyProfile> =
            serde_json::from_str(raw).context("parsing difficulty table")?;
        let mut table = Self::default();
        for (difficulty, profile) in overrides {
            table = table.with_profile(difficulty, profile)?;
        }
        Ok(table)
    }

    pub fn with_profile(
        mut self,
        difficulty: Difficulty,
        profile: DifficultyProfile,
    ) -> Result<Self> {
        anyhow::ensure!(
            !profile.curve.is_empty(),
            "milestone curve for `{difficulty}` is empty"
        );
        anyhow::ensure!(
            profile.curve.windows(2).all(|pair| pair[0] < pair[1]) && profile.curve[0] > 0,
            "milestone curve for `{difficulty}` must be strictly ascending and positive"
        );
        self.profiles.insert(difficulty, profile);
        Ok(self)
    }

    pub fn profile(&self, difficulty: Difficulty) -> &DifficultyProfile {
        self.profiles
            .get(&difficulty)
            .or_else(|| self.profiles.get(&Difficulty::Normal))
            .unwrap_or_else(|| default_profile())
    }

    pub fn freeze_ceiling(&self, difficulty: Difficulty) -> Allowance {
        self.profile(difficulty).freeze_ceiling
    }

    pub fn reward_multiplier(&self, difficulty: Difficulty) -> u32 {
        self.profile(difficulty).reward_multiplier
    }

    pub fn curve(&self, difficulty: Difficulty) -> &[u32] {
        &self.profile(difficulty).curve
    }
}

fn default_profile() -> &'static DifficultyProfile {
    static FALLBACK: std::sync::OnceLock<DifficultyProfile> = std::sync::OnceLock::new();
    FALLBACK.get_or_init(|| DifficultyProfile {
        freeze_ceiling: Allowance::Limited(3),
        reward_multiplier: 2,
        curve: vec![7, 14, 30, 60, 90, 180, 365],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_difficulty() {
        let table = DifficultyTable::default();
        assert!(table.freeze_ceiling(Difficulty::Easy).is_unlimited());
        assert_eq!(table.freeze_ceiling(Difficulty::Hard), Allowance::Limited(1));
        assert_eq!(table.curve(Difficulty::Normal)[0], 7);
        for difficulty in Difficulty::ALL {
            assert!(table.reward_multiplier(difficulty) >= 1);
        }
    }

    #[test]
    fn json_overrides_merge_with_defaults() {
        let raw = r#"{
            "hard": { "freezeCeiling": { "limited": 2 }, "rewardMultiplier": 5, "curve": [5, 10] }
        }"#;
        let table = DifficultyTable::from_json(raw).unwrap();
        assert_eq!(table.freeze_ceiling(Difficulty::Hard), Allowance::Limited(2));
        assert_eq!(table.curve(Difficulty::Hard), &[5, 10]);
        assert_eq!(table.curve(Difficulty::Normal)[0], 7);
    }

    #[test]
    fn empty_table_falls_back_to_normal_profile() {
        let table: DifficultyTable = serde_json::from_str(r#"{ "profiles": {} }"#).unwrap();
        let profile = table.profile(Difficulty::Hard);
        assert_eq!(profile.freeze_ceiling, Allowance::Limited(3));
        assert_eq!(profile.reward_multiplier, 2);
        assert_eq!(table.curve(Difficulty::Extreme)[0], 7);
    }

    #[test]
    fn rejects_unsorted_curves() {
        let raw = r#"{ "easy": { "freezeCeiling": "unlimited", "rewardMultiplier": 1, "curve": [7, 3] } }"#;
        assert!(DifficultyTable::from_json(raw).is_err());
    }

    #[test]
    fn allowance_clamps_to_ceiling() {
        assert_eq!(
            Allowance::Limited(5).clamp_to(Allowance::Limited(3)),
            Allowance::Limited(3)
        );
        assert_eq!(
            Allowance::Limited(5).clamp_to(Allowance::Unlimited),
            Allowance::Unlimited
        );
        assert_eq!(
            Allowance::Unlimited.clamp_to(Allowance::Limited(2)),
            Allowance::Limited(2)
        );
        assert_eq!("Hard".parse::<Difficulty>().unwrap(), Difficulty::Hard);
    }
}
