use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use arena_core::policy::{Ladder, PolicyConfig, Tactic};
use serde::Serialize;

struct ProfileEntry {
    id: &'static str,
    description: &'static str,
    ladder: &'static [Tactic],
    tune: fn(&mut PolicyConfig),
}

// Every profile keeps in-flight suppression first and differs only in order and constants.
const PROFILES: &[ProfileEntry] = &[
    ProfileEntry {
        id: "balanced",
        description: "Default ladder and timings.",
        ladder: &[
            Tactic::InFlight,
            Tactic::Objective,
            Tactic::SpecialAbility,
            Tactic::Escape,
            Tactic::Retrieve,
            Tactic::Mine,
            Tactic::Explore,
        ],
        tune: keep_defaults,
    },
    ProfileEntry {
        id: "miner",
        description: "Box clearing ahead of pickups, wider mining shortlist.",
        ladder: &[
            Tactic::InFlight,
            Tactic::Objective,
            Tactic::Escape,
            Tactic::Mine,
            Tactic::Retrieve,
            Tactic::SpecialAbility,
            Tactic::Explore,
        ],
        tune: tune_miner,
    },
    ProfileEntry {
        id: "cautious",
        description: "Escape first, padded arrival estimate, late attacks.",
        ladder: &[
            Tactic::InFlight,
            Tactic::Escape,
            Tactic::Objective,
            Tactic::Retrieve,
            Tactic::Mine,
            Tactic::SpecialAbility,
            Tactic::Explore,
        ],
        tune: tune_cautious,
    },
    ProfileEntry {
        id: "hunter",
        description: "Aggressive ability use and long attack reach.",
        ladder: &[
            Tactic::InFlight,
            Tactic::SpecialAbility,
            Tactic::Objective,
            Tactic::Escape,
            Tactic::Mine,
            Tactic::Retrieve,
            Tactic::Explore,
        ],
        tune: tune_hunter,
    },
];

fn keep_defaults(_: &mut PolicyConfig) {}

fn tune_miner(config: &mut PolicyConfig) {
    config.mining_candidate_limit = 8;
    config.explore_radius = 16.0;
    config.min_pickup_value = 3;
}

fn tune_cautious(config: &mut PolicyConfig) {
    config.reaction_latency_ms = 600;
    config.critical_fuse_ms = 1_400;
    config.safe_spot_slack = 4.0;
    config.attack_distance = 5.0;
    config.attack_cooldown_ms = 8_000;
}

fn tune_hunter(config: &mut PolicyConfig) {
    config.attack_distance = 12.0;
    config.attack_cooldown_ms = 3_000;
    config.ability_range = 12;
    config.ability_band = 2;
    config.ability_eval_interval_ms = 300;
}

#[derive(Clone, Debug, Serialize)]
pub struct ProfileSummary {
    pub id: &'static str,
    pub description: &'static str,
    pub ladder: Vec<Tactic>,
}

pub fn profile_ids() -> Vec<&'static str> {
    PROFILES.iter().map(|profile| profile.id).collect()
}

pub fn describe_profiles() -> Vec<ProfileSummary> {
    PROFILES
        .iter()
        .map(|profile| ProfileSummary {
            id: profile.id,
            description: profile.description,
            ladder: profile.ladder.to_vec(),
        })
        .collect()
}

pub fn create_profile(id: &str) -> Result<PolicyConfig> {
    let entry = PROFILES
        .iter()
        .find(|profile| profile.id == id)
        .ok_or_else(|| anyhow!("unknown profile '{id}'"))?;
    let ladder = Ladder::new(entry.ladder.to_vec())
        .map_err(|err| anyhow!("profile '{id}' has an invalid ladder: {err}"))?;
    let mut config = PolicyConfig {
        ladder,
        ..PolicyConfig::default()
    };
    (entry.tune)(&mut config);
    Ok(config)
}

/// A roster id, or a path to a JSON `PolicyConfig` (missing fields take defaults).
pub fn resolve_profile(name_or_path: &str) -> Result<PolicyConfig> {
    if !name_or_path.ends_with(".json") {
        return create_profile(name_or_path);
    }
    let path = Path::new(name_or_path);
    let raw = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("failed parsing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_profile_builds() {
        for id in profile_ids() {
            let config = create_profile(id).expect("profile builds");
            assert_eq!(config.ladder.tactics()[0], Tactic::InFlight, "profile={id}");
            assert_eq!(config.ladder.tactics().len(), 7, "profile={id}");
        }
    }

    #[test]
    fn balanced_matches_defaults() {
        assert_eq!(
            create_profile("balanced").expect("balanced"),
            PolicyConfig::default()
        );
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let err = create_profile("berserker").expect_err("unknown");
        assert!(err.to_string().contains("berserker"));
    }
}
