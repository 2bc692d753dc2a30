use std::env;

use arena_core::PolicyConfig;

pub const DEFAULT_PLAYER_ID: &str = "player";
pub const DEFAULT_PROFILE: &str = "balanced";

/// Process-level settings read from the environment once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AutopilotSettings {
    pub player_id: String,
    pub profile: String,
    pub step_duration_ms: Option<u64>,
    pub reaction_latency_ms: Option<u64>,
    pub cell_time_budget_ms: Option<u64>,
}

impl Default for AutopilotSettings {
    fn default() -> Self {
        Self {
            player_id: DEFAULT_PLAYER_ID.to_string(),
            profile: DEFAULT_PROFILE.to_string(),
            step_duration_ms: None,
            reaction_latency_ms: None,
            cell_time_budget_ms: None,
        }
    }
}

impl AutopilotSettings {
    pub fn from_env() -> Self {
        let step_duration_ms = read_env_optional_u64("STEP_DURATION_MS");
        let mut cell_time_budget_ms = read_env_optional_u64("CELL_TIME_BUDGET_MS");

        // A plan cell must be reachable inside the idle budget or every plan times out.
        if let (Some(step), Some(budget)) = (step_duration_ms, cell_time_budget_ms) {
            if budget <= step {
                tracing::warn!(
                    "CELL_TIME_BUDGET_MS ({}) <= STEP_DURATION_MS ({}). Falling back to the profile budget.",
                    budget,
                    step
                );
                cell_time_budget_ms = None;
            }
        }

        Self {
            player_id: read_env_string("PLAYER_ID", DEFAULT_PLAYER_ID),
            profile: read_env_string("AUTOPILOT_PROFILE", DEFAULT_PROFILE),
            step_duration_ms,
            reaction_latency_ms: read_env_optional_u64_allow_zero("REACTION_LATENCY_MS"),
            cell_time_budget_ms,
        }
    }

    /// Overlay the timing overrides on a profile.
    pub fn apply_to(&self, config: &mut PolicyConfig) {
        if let Some(step) = self.step_duration_ms {
            config.step_duration_ms = step;
        }
        if let Some(latency) = self.reaction_latency_ms {
            config.reaction_latency_ms = latency;
        }
        if let Some(budget) = self.cell_time_budget_ms {
            config.cell_time_budget_ms = budget;
        }
    }
}

pub fn read_env_string(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub fn read_env_optional_u64(name: &str) -> Option<u64> {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
}

pub fn read_env_optional_u64_allow_zero(name: &str) -> Option<u64> {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}
