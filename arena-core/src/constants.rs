//! Wire codes and default tunables for the arena agent.
//!
//! Timing values are milliseconds on the snapshot clock.

// Tile codes as they appear in the snapshot grid.
pub const TILE_ROAD: u8 = 0;
pub const TILE_WALL: u8 = 1;
pub const TILE_BOX: u8 = 2;
pub const TILE_REINFORCED_WALL: u8 = 3;
pub const TILE_SPAWN_LOCK: u8 = 5;
pub const TILE_SPECIAL_ITEM: u8 = 6;
pub const TILE_SCORCHED: u8 = 7;
pub const TILE_HAZARD_ZONE: u8 = 77;

// Outbound command codes.
pub const MOVE_LEFT: char = '1';
pub const MOVE_RIGHT: char = '2';
pub const MOVE_UP: char = '3';
pub const MOVE_DOWN: char = '4';
pub const DROP_DEVICE: char = 'b';
pub const HALT: char = 'x';

// Item slot reported while the agent still holds its primary weapon.
pub const PRIMARY_ITEM_SLOT: u8 = 1;

// Blast power assumed when neither the bomb nor its owner reports one.
pub const DEFAULT_BLAST_POWER: u32 = 3;

// Hazard timing.
pub const STEP_DURATION_MS: u64 = 300;
pub const REACTION_LATENCY_MS: u64 = 450;
pub const CRITICAL_FUSE_MS: u64 = 1_000;
pub const BOMB_ARMING_DELAY_MS: u64 = 35;
pub const SCORCH_WINDOW_MS: u64 = 2_000;

// Plan tracking.
pub const CELL_TIME_BUDGET_MS: u64 = 1_000;

// Search shaping.
pub const SAFE_SPOT_SLACK: f32 = 3.0;
pub const ESCAPE_CANDIDATE_LIMIT: usize = 20;
pub const EXPLORE_RADIUS: f32 = 12.0;
pub const MINING_CANDIDATE_LIMIT: usize = 5;
pub const PICKUP_STEP_TENTHS: u32 = 1;
pub const ROAD_STEP_TENTHS: u32 = 10;

// Offense.
pub const ATTACK_DISTANCE: f32 = 8.0;
pub const ATTACK_COOLDOWN_MS: u64 = 5_000;
pub const DEFAULT_DROP_COOLDOWN_MS: u64 = 2_000;

// Special ability.
pub const ABILITY_RANGE: u32 = 10;
pub const ABILITY_BAND: u32 = 1;
pub const ABILITY_COOLDOWN_MS: u64 = 6_000;
pub const ABILITY_EVAL_INTERVAL_MS: u64 = 500;
pub const ABILITY_LOCK_MS: u64 = 1_000;

// Side-channel requests.
pub const SIDE_REQUEST_INTERVAL_MS: u64 = 1_000;
pub const MIN_PICKUP_VALUE: u32 = 5;

/// Score value of a dropped item by kind code.
pub fn pickup_value(kind: u32) -> u32 {
    match kind {
        32 => 1,
        33 => 2,
        34 => 5,
        35 => 3,
        36 => 4,
        _ => 1,
    }
}
