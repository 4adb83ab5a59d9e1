//! Milestones: streak-length thresholds with attribute rewards that are
//! granted when the streak climbs past them and clawed back when it falls
//! below them again.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use tracing::debug;

use crate::habit::{HabitSettings, Milestone, MilestoneReward, DEFAULT_ATTRIBUTE};

pub const BASE_XP: u32 = 10;

/// The next threshold after `last_target`. Past the end of the curve the
/// curve's final step repeats.
pub fn next_target(curve: &[u32], last_target: Option<u32>) -> u32 {
    let Some(last) = last_target else {
        return curve.first().copied().unwrap_or(1).max(1);
    };
    if let Some(next) = curve.iter().copied().find(|target| *target > last) {
        return next;
    }
    let step = match curve {
        [.., a, b] => b - a,
        [only] => *only,
        [] => 1,
    };
    last.saturating_add(step.max(1))
}

/// Reward attached to the milestone at position `index`.
pub fn default_reward(index: usize, settings: &HabitSettings) -> MilestoneReward {
    let attribute = if settings.attributes.is_empty() {
        DEFAULT_ATTRIBUTE.to_string()
    } else {
        settings.attributes[index % settings.attributes.len()].clone()
    };
    let points = u32::try_from(index + 1).unwrap_or(u32::MAX);
    MilestoneReward {
        attributes: Some(BTreeMap::from([(attribute, points)])),
        items: None,
    }
}

pub fn seed(curve: &[u32], settings: &HabitSettings) -> Milestone {
    Milestone {
        target: next_target(curve, None),
        reward: default_reward(0, settings),
    }
}

/// Appends milestones until the last one lies beyond `current`. Existing
/// milestones are never touched. Returns how many were appended.
pub fn maybe_generate_next(
    milestones: &mut Vec<Milestone>,
    current: u32,
    curve: &[u32],
    settings: &HabitSettings,
) -> usize {
    let before = milestones.len();
    if milestones.is_empty() {
        milestones.push(seed(curve, settings));
    }
    while let Some(last) = milestones.last().map(|m| m.target) {
        if last > current {
            break;
        }
        let reward = default_reward(milestones.len(), settings);
        milestones.push(Milestone {
            target: next_target(curve, Some(last)),
            reward,
        });
    }
    milestones.len() - before
}

/// Milestones unlocked by a streak of `current`.
pub fn level(milestones: &[Milestone], current: u32) -> u32 {
    let count = milestones.iter().filter(|m| m.target <= current).count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

pub fn xp_gain(level: u32, reward_multiplier: u32) -> u32 {
    BASE_XP
        .saturating_mul(level)
        .saturating_mul(reward_multiplier)
}

/// Grants the attribute rewards of every milestone in `(previous, current]`.
pub fn apply_upgrade(
    milestones: &[Milestone],
    previous: u32,
    current: u32,
    attributes: &mut BTreeMap<String, u32>,
) -> Vec<u32> {
    let mut crossed = Vec::new();
    for milestone in milestones
        .iter()
        .filter(|m| m.target > previous && m.target <= current)
    {
        for (name, points) in reward_attributes(milestone) {
            let slot = attributes.entry(name.clone()).or_insert(0);
            *slot = slot.saturating_add(*points);
        }
        crossed.push(milestone.target);
    }
    if !crossed.is_empty() {
        debug!(?crossed, "milestones reached");
    }
    crossed
}

/// Takes back the attribute rewards of every milestone in `(current, previous]`.
///
/// Each lost amount comes out of its own attribute first; whatever that
/// attribute can no longer cover is taken from the largest remaining
/// attributes. Nothing goes below zero and emptied attributes are removed.
pub fn apply_downgrade(
    milestones: &[Milestone],
    previous: u32,
    current: u32,
    attributes: &mut BTreeMap<String, u32>,
) -> Vec<u32> {
    if level(milestones, current) >= level(milestones, previous) {
        return Vec::new();
    }
    let mut lost: Vec<&Milestone> = milestones
        .iter()
        .filter(|m| m.target > current && m.target <= previous)
        .collect();
    lost.sort_by_key(|m| Reverse(m.target));

    for milestone in &lost {
        for (name, points) in reward_attributes(milestone) {
            let remainder = deduct(attributes, name, *points);
            if remainder > 0 {
                let uncovered = deduct_from_largest(attributes, name, remainder);
                if uncovered > 0 {
                    debug!(attribute = %name, uncovered, "attribute deficit could not be absorbed");
                }
            }
        }
    }
    let targets: Vec<u32> = lost.iter().map(|m| m.target).collect();
    debug!(lost = ?targets, "milestones lost");
    targets
}

fn reward_attributes(milestone: &Milestone) -> impl Iterator<Item = (&String, &u32)> {
    milestone.reward.attributes.iter().flat_map(|map| map.iter())
}

/// Removes up to `amount` from `name`; returns what could not be removed.
fn deduct(attributes: &mut BTreeMap<String, u32>, name: &str, amount: u32) -> u32 {
    let Some(value) = attributes.get_mut(name) else {
        return amount;
    };
    let taken = (*value).min(amount);
    *value -= taken;
    if *value == 0 {
        attributes.remove(name);
    }
    amount - taken
}

fn deduct_from_largest(attributes: &mut BTreeMap<String, u32>, skip: &str, mut amount: u32) -> u32 {
    while amount > 0 {
        let Some(name) = attributes
            .iter()
            .filter(|(name, value)| name.as_str() != skip && **value > 0)
            .max_by_key(|(name, value)| (**value, Reverse((*name).clone())))
            .map(|(name, _)| name.clone())
        else {
            break;
        };
        amount = deduct(attributes, &name, amount);
    }
    amount
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(attributes: &[&str]) -> HabitSettings {
        HabitSettings {
            attributes: attributes.iter().map(|a| a.to_string()).collect(),
            ..HabitSettings::default()
        }
    }

    fn attrs(pairs: &[(&str, u32)]) -> BTreeMap<String, u32> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    const CURVE: [u32; 4] = [7, 14, 30, 60];

    #[test]
    fn next_target_walks_then_extends_the_curve() {
        assert_eq!(next_target(&CURVE, None), 7);
        assert_eq!(next_target(&CURVE, Some(7)), 14);
        assert_eq!(next_target(&CURVE, Some(20)), 30);
        assert_eq!(next_target(&CURVE, Some(60)), 90);
        assert_eq!(next_target(&CURVE, Some(90)), 120);
        assert_eq!(next_target(&[5], Some(5)), 10);
    }

    #[test]
    fn generates_only_after_the_last_target_is_reached() {
        let settings = settings(&["strength", "focus"]);
        let mut milestones = vec![seed(&CURVE, &settings)];
        assert_eq!(maybe_generate_next(&mut milestones, 6, &CURVE, &settings), 0);
        assert_eq!(maybe_generate_next(&mut milestones, 7, &CURVE, &settings), 1);
        assert_eq!(milestones[1].target, 14);
        assert_eq!(
            milestones[1].reward.attributes,
            Some(attrs(&[("focus", 2)]))
        );
        assert_eq!(maybe_generate_next(&mut milestones, 31, &CURVE, &settings), 2);
        let targets: Vec<u32> = milestones.iter().map(|m| m.target).collect();
        assert_eq!(targets, vec![7, 14, 30, 60]);
    }

    #[test]
    fn upgrade_then_downgrade_restores_attributes() {
        let settings = settings(&["strength"]);
        let mut milestones = vec![seed(&CURVE, &settings)];
        maybe_generate_next(&mut milestones, 7, &CURVE, &settings);
        let before = attrs(&[("wisdom", 4)]);
        let mut live = before.clone();

        assert_eq!(apply_upgrade(&milestones, 6, 7, &mut live), vec![7]);
        assert_eq!(live, attrs(&[("strength", 1), ("wisdom", 4)]));
        assert_eq!(level(&milestones, 7), 1);

        assert_eq!(apply_downgrade(&milestones, 7, 0, &mut live), vec![7]);
        assert_eq!(live, before);
        assert_eq!(level(&milestones, 0), 0);
    }

    #[test]
    fn downgrade_absorbs_deficit_from_largest_attributes() {
        let milestones = vec![Milestone {
            target: 7,
            reward: MilestoneReward {
                attributes: Some(attrs(&[("strength", 5)])),
                items: None,
            },
        }];
        let mut live = attrs(&[("strength", 2), ("focus", 1), ("wisdom", 3), ("charm", 3)]);
        apply_downgrade(&milestones, 7, 3, &mut live);
        assert_eq!(live, attrs(&[("focus", 1), ("wisdom", 3)]));

        let mut drained = attrs(&[("strength", 1)]);
        apply_downgrade(&milestones, 7, 0, &mut drained);
        assert!(drained.is_empty());
    }

    #[test]
    fn nothing_changes_without_a_crossing() {
        let settings = settings(&["strength"]);
        let milestones = vec![seed(&CURVE, &settings)];
        let mut live = attrs(&[("strength", 1)]);
        assert!(apply_upgrade(&milestones, 7, 9, &mut live).is_empty());
        assert!(apply_downgrade(&milestones, 9, 8, &mut live).is_empty());
        assert_eq!(live, attrs(&[("strength", 1)]));
    }

    #[test]
    fn xp_scales_with_level_and_difficulty() {
        assert_eq!(xp_gain(0, 3), 0);
        assert_eq!(xp_gain(2, 3), 60);
    }
}
