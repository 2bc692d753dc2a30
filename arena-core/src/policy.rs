//! Priority ladder of tactics.
//!
//! Each tick the ladder is walked in order and the first tactic that produces
//! an [`Action`] wins. The ladder order and every constant it uses live in
//! [`PolicyConfig`], so variants are configuration rather than code.

use core::fmt;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::{Command, Step};
use crate::constants::{
    ABILITY_BAND, ABILITY_COOLDOWN_MS, ABILITY_EVAL_INTERVAL_MS, ABILITY_LOCK_MS,
    ABILITY_RANGE, ATTACK_COOLDOWN_MS, ATTACK_DISTANCE, BOMB_ARMING_DELAY_MS,
    CELL_TIME_BUDGET_MS, CRITICAL_FUSE_MS, DEFAULT_DROP_COOLDOWN_MS, ESCAPE_CANDIDATE_LIMIT,
    EXPLORE_RADIUS, MINING_CANDIDATE_LIMIT, MIN_PICKUP_VALUE, REACTION_LATENCY_MS,
    SAFE_SPOT_SLACK, SCORCH_WINDOW_MS, SIDE_REQUEST_INTERVAL_MS, STEP_DURATION_MS,
};
use crate::cooldown::RateLimiter;
use crate::error::LadderError;
use crate::grid::{Direction, Grid, Position, TileKind};
use crate::hazard::{blast_footprint, ArrivalEstimate, HazardIndex};
use crate::search::{cheapest_route, FrontierSearch, NodeId, Route, SearchTree, Visit};
use crate::tracker::Plan;

// Mining score weights.
const ISOLATED_BOX_WEIGHT: f32 = 1.5;
const OPPONENT_SIGNAL_WEIGHT: f32 = 1.0;

// Exploration score weights.
const EXPLORE_BOX_WEIGHT: f32 = 0.7;
const EXPLORE_ISOLATED_WEIGHT: f32 = 0.35;
const EXPLORE_BONUS_WEIGHT: f32 = 0.2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tactic {
    InFlight,
    Objective,
    SpecialAbility,
    Escape,
    Retrieve,
    Mine,
    Explore,
}

impl Tactic {
    pub fn name(self) -> &'static str {
        match self {
            Self::InFlight => "in_flight",
            Self::Objective => "objective",
            Self::SpecialAbility => "special_ability",
            Self::Escape => "escape",
            Self::Retrieve => "retrieve",
            Self::Mine => "mine",
            Self::Explore => "explore",
        }
    }
}

impl fmt::Display for Tactic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub const DEFAULT_LADDER: [Tactic; 7] = [
    Tactic::InFlight,
    Tactic::Objective,
    Tactic::SpecialAbility,
    Tactic::Escape,
    Tactic::Retrieve,
    Tactic::Mine,
    Tactic::Explore,
];

/// Validated tactic order: non-empty, in-flight suppression first, no repeats.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Tactic>", into = "Vec<Tactic>")]
pub struct Ladder(Vec<Tactic>);

impl Ladder {
    pub fn new(tactics: Vec<Tactic>) -> Result<Self, LadderError> {
        let Some(first) = tactics.first() else {
            return Err(LadderError::Empty);
        };
        if *first != Tactic::InFlight {
            return Err(LadderError::InFlightNotFirst);
        }
        let mut seen = HashSet::new();
        for tactic in &tactics {
            if !seen.insert(*tactic) {
                return Err(LadderError::Duplicate(*tactic));
            }
        }
        Ok(Self(tactics))
    }

    pub fn tactics(&self) -> &[Tactic] {
        &self.0
    }
}

impl Default for Ladder {
    fn default() -> Self {
        Self(DEFAULT_LADDER.to_vec())
    }
}

impl TryFrom<Vec<Tactic>> for Ladder {
    type Error = LadderError;

    fn try_from(tactics: Vec<Tactic>) -> Result<Self, Self::Error> {
        Self::new(tactics)
    }
}

impl From<Ladder> for Vec<Tactic> {
    fn from(ladder: Ladder) -> Self {
        ladder.0
    }
}

/// Every tunable the agent uses. Missing fields take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Travel time per cell for the arrival heuristic.
    pub step_duration_ms: u64,
    /// Fixed term added to every arrival estimate.
    pub reaction_latency_ms: u64,
    /// Fuse below which a blast cell is excluded outright.
    pub critical_fuse_ms: u64,
    /// Idle time before a plan is abandoned; also bounds the halt gate.
    pub cell_time_budget_ms: u64,
    pub safe_spot_slack: f32,
    pub escape_candidate_limit: usize,
    pub explore_radius: f32,
    pub attack_distance: f32,
    pub attack_cooldown_ms: u64,
    pub ability_range: u32,
    pub ability_band: u32,
    pub ability_cooldown_ms: u64,
    pub ability_eval_interval_ms: u64,
    pub ability_lock_ms: u64,
    pub bomb_arming_delay_ms: u64,
    pub scorch_window_ms: u64,
    pub default_drop_cooldown_ms: u64,
    pub mining_candidate_limit: usize,
    pub side_request_interval_ms: u64,
    pub min_pickup_value: u32,
    pub ladder: Ladder,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            step_duration_ms: STEP_DURATION_MS,
            reaction_latency_ms: REACTION_LATENCY_MS,
            critical_fuse_ms: CRITICAL_FUSE_MS,
            cell_time_budget_ms: CELL_TIME_BUDGET_MS,
            safe_spot_slack: SAFE_SPOT_SLACK,
            escape_candidate_limit: ESCAPE_CANDIDATE_LIMIT,
            explore_radius: EXPLORE_RADIUS,
            attack_distance: ATTACK_DISTANCE,
            attack_cooldown_ms: ATTACK_COOLDOWN_MS,
            ability_range: ABILITY_RANGE,
            ability_band: ABILITY_BAND,
            ability_cooldown_ms: ABILITY_COOLDOWN_MS,
            ability_eval_interval_ms: ABILITY_EVAL_INTERVAL_MS,
            ability_lock_ms: ABILITY_LOCK_MS,
            bomb_arming_delay_ms: BOMB_ARMING_DELAY_MS,
            scorch_window_ms: SCORCH_WINDOW_MS,
            default_drop_cooldown_ms: DEFAULT_DROP_COOLDOWN_MS,
            mining_candidate_limit: MINING_CANDIDATE_LIMIT,
            side_request_interval_ms: SIDE_REQUEST_INTERVAL_MS,
            min_pickup_value: MIN_PICKUP_VALUE,
            ladder: Ladder::default(),
        }
    }
}

impl PolicyConfig {
    pub fn arrival(&self) -> ArrivalEstimate {
        ArrivalEstimate {
            step_duration_ms: self.step_duration_ms,
            reaction_latency_ms: self.reaction_latency_ms,
        }
    }
}

/// Read-only view of one tick, assembled by the agent before the ladder runs.
pub struct Situation<'a> {
    pub now_ms: u64,
    pub grid: &'a Grid,
    pub hazards: &'a HazardIndex,
    pub position: usize,
    pub coords: Position,
    pub facing: Option<Direction>,
    pub blast_power: u32,
    pub is_empowered: bool,
    pub ability_ready: bool,
    pub opponents: &'a HashSet<usize>,
    pub opponent_players: &'a [(String, Position)],
    pub pickups: &'a HashMap<usize, u32>,
    pub valuable: &'a HashSet<usize>,
    pub can_drop: bool,
    pub ability_allowed: bool,
    pub objective_locked: bool,
    pub in_flight: bool,
}

/// Rate limiters owned by the agent and consulted by the ladder.
#[derive(Clone, Debug)]
pub struct PolicyMemory {
    pub attack: RateLimiter,
    pub ability_eval: RateLimiter,
}

impl PolicyMemory {
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            attack: RateLimiter::new(config.attack_cooldown_ms),
            ability_eval: RateLimiter::new(config.ability_eval_interval_ms),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Emit nothing this tick.
    Hold,
    /// Commit a route; the command is released when the plan settles.
    Drive { command: Command, plan: Plan },
    /// Face a direction without committing a plan.
    Turn(Direction),
    /// Drop a device in place.
    Drop,
    UseAbility { target: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    pub tactic: Tactic,
    pub action: Action,
}

pub fn decide(
    config: &PolicyConfig,
    situation: &Situation<'_>,
    memory: &mut PolicyMemory,
) -> Option<Decision> {
    for &tactic in config.ladder.tactics() {
        let action = match tactic {
            Tactic::InFlight => situation.in_flight.then_some(Action::Hold),
            Tactic::Objective => objective(situation),
            Tactic::SpecialAbility => special_ability(config, situation, memory),
            Tactic::Escape => escape(config, situation),
            Tactic::Retrieve => retrieve(situation),
            Tactic::Mine => mine(config, situation, memory),
            Tactic::Explore => explore(config, situation),
        };
        if let Some(action) = action {
            debug!(%tactic, cell = situation.position, "tactic fired");
            return Some(Decision { tactic, action });
        }
    }
    None
}

#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub index: usize,
    pub route: Route,
    pub distance: f32,
    pub boxes: u32,
    pub isolated_boxes: u32,
    pub bonus: u32,
    pub saw_opponent: bool,
}

impl Candidate {
    fn from_node(tree: &SearchTree, id: NodeId) -> Self {
        let node = tree.node(id);
        Self {
            index: node.index,
            route: tree.route(id),
            distance: node.distance,
            boxes: node.boxes,
            isolated_boxes: node.isolated_boxes,
            bonus: node.bonus,
            saw_opponent: node.saw_opponent,
        }
    }

    fn mining_score(&self) -> f32 {
        let opponent = if self.saw_opponent {
            OPPONENT_SIGNAL_WEIGHT
        } else {
            0.0
        };
        self.boxes as f32 + self.isolated_boxes as f32 * ISOLATED_BOX_WEIGHT + opponent
    }

    fn explore_score(&self) -> f32 {
        self.boxes as f32 * EXPLORE_BOX_WEIGHT
            + self.isolated_boxes as f32 * EXPLORE_ISOLATED_WEIGHT
            + self.bonus as f32 * EXPLORE_BONUS_WEIGHT
    }
}

/// Pick among safe-spot candidates listed in visit order.
///
/// A later candidate replaces the current pick when it has strictly more
/// boxes in range, or when the pick has no bonus and the later one has more,
/// and only while it lies within `slack` of the first candidate's distance.
pub fn select_safe_spot(candidates: Vec<Candidate>, slack: f32) -> Option<Candidate> {
    let mut candidates = candidates.into_iter();
    let mut best = candidates.next()?;
    let first_distance = best.distance;
    for spot in candidates {
        let better = best.boxes < spot.boxes || (best.bonus < 1 && best.bonus < spot.bonus);
        if better && spot.distance < first_distance + slack {
            best = spot;
        }
    }
    Some(best)
}

fn search<'a>(situation: &'a Situation<'a>) -> FrontierSearch<'a> {
    FrontierSearch::new(situation.grid, situation.blast_power)
        .with_opponents(situation.opponents)
        .with_targeted(situation.hazards.targets())
        .with_pickups(situation.pickups)
}

/// Search from `root` for a cell outside `danger`, with the escape pruning rules.
fn find_safe_spot(
    config: &PolicyConfig,
    situation: &Situation<'_>,
    root: usize,
    initial_distance: f32,
    danger: impl Fn(usize) -> bool,
) -> Option<Candidate> {
    let arrival = config.arrival();
    let hazards = situation.hazards;
    let mut candidates = Vec::new();
    let mut remaining = config.escape_candidate_limit.max(1);
    let _: Option<()> = search(situation)
        .with_initial_distance(initial_distance)
        .run(root, |tree, id| {
            let node = tree.node(id);
            let cell = node.index;
            if cell != root {
                if situation.opponents.contains(&cell)
                    || hazards.is_bomb(cell)
                    || hazards.is_immediate(cell)
                    || !hazards.can_arrive_safely(cell, node.distance, &arrival)
                {
                    return Visit::Prune;
                }
            }
            if !danger(cell) {
                let scores = node.boxes > 0 || node.isolated_boxes > 0 || node.bonus > 0;
                if candidates.is_empty() || scores {
                    candidates.push(Candidate::from_node(tree, id));
                }
                remaining -= 1;
                if remaining == 0 {
                    return Visit::Accept(());
                }
            }
            Visit::Expand
        });
    select_safe_spot(candidates, config.safe_spot_slack)
}

fn drive(route: Route) -> Option<Action> {
    if route.is_empty() {
        return None;
    }
    Some(Action::Drive {
        command: Command::moves(route.steps.iter().copied()),
        plan: Plan::new(route.cells, None),
    })
}

fn walkable(kind: Option<TileKind>) -> bool {
    matches!(
        kind,
        Some(TileKind::Road | TileKind::SpecialItem | TileKind::Scorched)
    )
}

fn objective(situation: &Situation<'_>) -> Option<Action> {
    if situation.is_empowered {
        return None;
    }
    if situation.objective_locked {
        return Some(Action::Hold);
    }
    let grid = situation.grid;
    let targets: HashSet<usize> = grid.cells_of_kind(TileKind::SpecialItem).collect();
    let item_cells: HashSet<usize> = situation.pickups.keys().copied().collect();
    let mut route = cheapest_route(grid, situation.position, &targets, &item_cells)?;

    if let Some(wall) = route
        .cells
        .iter()
        .position(|&cell| grid.kind(cell) == Some(TileKind::ReinforcedWall))
    {
        route.cells.truncate(wall + 1);
        route.steps.truncate(wall + 1);
    }

    let first_cell = *route.cells.first()?;
    let first_step = *route.steps.first()?;
    if matches!(
        grid.kind(first_cell),
        Some(TileKind::ReinforcedWall | TileKind::DestructibleBox)
    ) {
        if situation.facing != Some(first_step) {
            return Some(Action::Turn(first_step));
        }
        return Some(if situation.can_drop {
            Action::Drop
        } else {
            Action::Hold
        });
    }

    let cells: Vec<usize> = route
        .cells
        .iter()
        .copied()
        .take_while(|&cell| walkable(grid.kind(cell)))
        .collect();
    Some(Action::Drive {
        command: Command::moves(route.steps.iter().copied()),
        plan: Plan::new(cells, None),
    })
}

/// Opponent at `to` sits within `band` of the agent's line along `facing`,
/// ahead of it, no farther than `range`, with no barrier on the way.
pub fn in_line_of_fire(
    grid: &Grid,
    from: Position,
    to: Position,
    facing: Direction,
    range: u32,
    band: u32,
) -> bool {
    let (dr, dc) = facing.delta();
    let (along, across) = if facing.is_horizontal() {
        ((to.col - from.col) * dc, to.row - from.row)
    } else {
        ((to.row - from.row) * dr, to.col - from.col)
    };
    if along <= 0 || along as u32 > range || across.unsigned_abs() > band {
        return false;
    }
    for step in 0..along {
        let cell = if facing.is_horizontal() {
            Position::new(to.row, from.col + dc * step)
        } else {
            Position::new(from.row + dr * step, to.col)
        };
        let blocked = grid
            .index_of(cell)
            .and_then(|index| grid.kind(index))
            .map_or(true, TileKind::is_barrier);
        if blocked {
            return false;
        }
    }
    true
}

fn special_ability(
    config: &PolicyConfig,
    situation: &Situation<'_>,
    memory: &mut PolicyMemory,
) -> Option<Action> {
    if !situation.is_empowered || !situation.ability_ready || !situation.ability_allowed {
        return None;
    }
    if !memory.ability_eval.try_mark(situation.now_ms) {
        return None;
    }
    let facing = situation.facing?;
    let (target, _) = situation.opponent_players.iter().find(|(_, at)| {
        in_line_of_fire(
            situation.grid,
            situation.coords,
            *at,
            facing,
            config.ability_range,
            config.ability_band,
        )
    })?;
    Some(Action::UseAbility {
        target: target.clone(),
    })
}

fn escape(config: &PolicyConfig, situation: &Situation<'_>) -> Option<Action> {
    let hazards = situation.hazards;
    if !hazards.is_threatened(situation.position) {
        return None;
    }
    let spot = find_safe_spot(config, situation, situation.position, 0.0, |cell| {
        hazards.is_threatened(cell)
    })?;
    debug!(cell = spot.index, distance = spot.distance, "escape target");
    drive(spot.route)
}

fn retrieve(situation: &Situation<'_>) -> Option<Action> {
    if situation.valuable.is_empty() {
        return None;
    }
    let root = situation.position;
    let route = search(situation)
        .with_landing(situation.valuable)
        .run(root, |tree, id| {
            let cell = tree.node(id).index;
            if cell == root {
                return Visit::Expand;
            }
            if situation.opponents.contains(&cell) || situation.hazards.is_threatened(cell) {
                return Visit::Prune;
            }
            if situation.valuable.contains(&cell) {
                return Visit::Accept(tree.route(id));
            }
            Visit::Expand
        })?;
    drive(route)
}

fn mine(
    config: &PolicyConfig,
    situation: &Situation<'_>,
    memory: &mut PolicyMemory,
) -> Option<Action> {
    if !situation.can_drop {
        return None;
    }
    let arrival = config.arrival();
    let hazards = situation.hazards;
    let root = situation.position;

    let mut spots: Vec<Candidate> = Vec::new();
    let _: Option<()> = search(situation).run(root, |tree, id| {
        let node = tree.node(id);
        let cell = node.index;
        if cell != root && situation.opponents.contains(&cell) {
            return Visit::Prune;
        }
        if hazards.is_bomb(cell) || !hazards.can_arrive_safely(cell, node.distance, &arrival) {
            return Visit::Prune;
        }
        if node.boxes > 0 || node.isolated_boxes >= 1 || node.saw_opponent {
            spots.push(Candidate::from_node(tree, id));
        }
        Visit::Expand
    });
    let first_distance = spots.first()?.distance;

    let mut order: Vec<usize> = Vec::new();
    let mut attack_pick = None;
    if memory.attack.is_ready(situation.now_ms) {
        attack_pick = spots
            .iter()
            .position(|spot| spot.saw_opponent && spot.distance < config.attack_distance);
        order.extend(attack_pick);
    }
    let mut ranked: Vec<usize> = (0..spots.len())
        .filter(|&i| spots[i].distance < first_distance + config.safe_spot_slack)
        .collect();
    ranked.sort_by(|&a, &b| spots[b].mining_score().total_cmp(&spots[a].mining_score()));
    for i in ranked {
        if !order.contains(&i) {
            order.push(i);
        }
    }

    for i in order.into_iter().take(config.mining_candidate_limit) {
        let spot = &spots[i];
        let footprint = blast_footprint(situation.grid, spot.index, situation.blast_power);
        let retreat = find_safe_spot(config, situation, spot.index, spot.distance, |cell| {
            footprint.contains(cell) || hazards.is_threatened(cell)
        });
        let Some(retreat) = retreat else {
            debug!(cell = spot.index, "mining cell has no retreat");
            continue;
        };
        if attack_pick == Some(i) {
            memory.attack.mark(situation.now_ms);
        }
        debug!(
            cell = spot.index,
            retreat = retreat.index,
            boxes = spot.boxes,
            isolated = spot.isolated_boxes,
            "mining plan"
        );
        let steps: Vec<Step> = spot
            .route
            .steps
            .iter()
            .copied()
            .map(Step::Move)
            .chain(std::iter::once(Step::Drop))
            .chain(retreat.route.steps.iter().copied().map(Step::Move))
            .collect();
        let cells = spot
            .route
            .cells
            .iter()
            .chain(retreat.route.cells.iter())
            .copied();
        return Some(Action::Drive {
            command: Command::Drive(steps),
            plan: Plan::new(cells, Some(spot.index)),
        });
    }
    None
}

fn explore(config: &PolicyConfig, situation: &Situation<'_>) -> Option<Action> {
    let arrival = config.arrival();
    let hazards = situation.hazards;
    let root = situation.position;
    let mut best: Option<(f32, Candidate)> = None;
    let _: Option<()> = search(situation).run(root, |tree, id| {
        let node = tree.node(id);
        let cell = node.index;
        if node.distance > config.explore_radius {
            return Visit::Prune;
        }
        if cell != root
            && (situation.opponents.contains(&cell)
                || hazards.is_bomb(cell)
                || !hazards.can_arrive_safely(cell, node.distance, &arrival))
        {
            return Visit::Prune;
        }
        let interesting = best.is_none()
            || node.bonus > 0
            || node.boxes > 0
            || node.isolated_boxes > 1
            || node.saw_opponent;
        if interesting && !hazards.is_threatened(cell) {
            let candidate = Candidate::from_node(tree, id);
            let score = candidate.explore_score();
            if best.as_ref().map_or(true, |(top, _)| score > *top) {
                best = Some((score, candidate));
            }
        }
        Visit::Expand
    });
    let (_, pick) = best?;
    if pick.index == root {
        return None;
    }
    drive(pick.route)
}
