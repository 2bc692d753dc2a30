//! Per-agent tick entry point.
//!
//! An [`AgentContext`] owns everything that survives between ticks: the plan
//! tracker, permissions and their pending re-enables, the bomb ledger and the
//! rate limiters. Each snapshot runs one pass in a fixed order: deferred
//! grants, grid refresh, event tags, hazards, halt check, plan progress, side
//! requests, then the decision ladder.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::command::{Command, SideRequest, SideRequestKind, Step};
use crate::constants::PRIMARY_ITEM_SLOT;
use crate::cooldown::{DeferredQueue, PermissionKind, Permissions, RateLimiter};
use crate::grid::{Direction, Grid, Position};
use crate::hazard::{
    blast_footprint, effective_power, materialize_matured_blasts, BombLedger, HazardIndex,
};
use crate::policy::{decide, Action, PolicyConfig, PolicyMemory, Situation, Tactic};
use crate::snapshot::{DriveAck, EventTag, PlayerRecord, TickSnapshot};
use crate::tracker::{AwaitAck, PlanTracker, Progress};

/// Companion id derived from the controlling agent's id.
pub fn companion_id(agent_id: &str) -> String {
    format!("{agent_id}_child")
}

/// Snapshot-derived view of the controlled agent, replaced every tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: String,
    pub position: Position,
    pub blast_power: u32,
    pub is_empowered: bool,
    pub active_item: u8,
    pub cooldown_ms: u64,
    pub facing: Option<Direction>,
}

impl AgentState {
    fn from_record(record: &PlayerRecord, facing: Option<Direction>) -> Self {
        Self {
            id: record.id.clone(),
            position: record.position,
            blast_power: record.blast_power,
            is_empowered: record.is_empowered,
            active_item: record.current_weapon,
            cooldown_ms: record.cooldown_ms,
            facing,
        }
    }
}

fn facing_after(from: Position, to: Position, previous: Option<Direction>) -> Option<Direction> {
    if to.row != from.row {
        Some(if to.row < from.row {
            Direction::Up
        } else {
            Direction::Down
        })
    } else if to.col != from.col {
        Some(if to.col < from.col {
            Direction::Left
        } else {
            Direction::Right
        })
    } else {
        previous
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingAgent,
    MalformedSnapshot,
}

/// Why a tick produced what it did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trace {
    Skipped { reason: SkipReason },
    Halted,
    Decided { tactic: Tactic },
    NoDecision,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TickOutput {
    pub tick: u64,
    pub timestamp_ms: u64,
    pub command: Option<Command>,
    pub side_requests: Vec<SideRequest>,
    pub trace: Trace,
}

impl TickOutput {
    fn skipped(snapshot: &TickSnapshot, reason: SkipReason) -> Self {
        Self {
            tick: snapshot.id,
            timestamp_ms: snapshot.timestamp_ms,
            command: None,
            side_requests: Vec::new(),
            trace: Trace::Skipped { reason },
        }
    }
}

#[derive(Clone, Debug)]
pub struct AgentContext {
    id: String,
    companion_id: String,
    config: PolicyConfig,
    state: Option<AgentState>,
    grid: Option<Grid>,
    ledger: BombLedger,
    seen_bombs: HashSet<(Position, u64)>,
    tracker: PlanTracker,
    permissions: Permissions,
    deferred: DeferredQueue,
    memory: PolicyMemory,
    side_limits: HashMap<SideRequestKind, RateLimiter>,
    paired: bool,
}

impl AgentContext {
    pub fn new(id: impl Into<String>, config: PolicyConfig) -> Self {
        let id = id.into();
        Self {
            companion_id: companion_id(&id),
            id,
            tracker: PlanTracker::new(config.cell_time_budget_ms),
            memory: PolicyMemory::new(&config),
            config,
            state: None,
            grid: None,
            ledger: BombLedger::default(),
            seen_bombs: HashSet::new(),
            permissions: Permissions::default(),
            deferred: DeferredQueue::default(),
            side_limits: HashMap::new(),
            paired: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn state(&self) -> Option<&AgentState> {
        self.state.as_ref()
    }

    pub fn tracker(&self) -> &PlanTracker {
        &self.tracker
    }

    pub fn permissions(&self) -> &Permissions {
        &self.permissions
    }

    /// Grid as of the last accepted snapshot, scorched cells included.
    pub fn grid(&self) -> Option<&Grid> {
        self.grid.as_ref()
    }

    pub fn is_paired(&self) -> bool {
        self.paired
    }

    /// A drive acknowledgment with the halt code releases the halt gate.
    pub fn on_drive_ack(&mut self, ack: &DriveAck) {
        if ack.player_id != self.id {
            return;
        }
        if ack.direction.parse::<Command>().is_ok_and(|command| command.is_halt()) {
            debug!(player = %self.id, "halt acknowledged by drive ack");
            self.tracker.acknowledge_halt();
        }
    }

    pub fn on_tick(&mut self, snapshot: &TickSnapshot) -> TickOutput {
        let now = snapshot.timestamp_ms;

        for grant in self.deferred.run_due(&mut self.permissions, now) {
            debug!(kind = ?grant.kind, due = grant.due_ms, "permission re-enabled");
        }

        let mut grid = match Grid::from_rows(snapshot.size.rows, snapshot.size.cols, &snapshot.map)
        {
            Ok(grid) => grid,
            Err(err) => {
                warn!(tick = snapshot.id, error = %err, "malformed snapshot ignored");
                return TickOutput::skipped(snapshot, SkipReason::MalformedSnapshot);
            }
        };
        let Some(me) = snapshot.player(&self.id) else {
            debug!(tick = snapshot.id, player = %self.id, "agent missing from snapshot");
            return TickOutput::skipped(snapshot, SkipReason::MissingAgent);
        };
        let Some(position) = grid.index_of(me.position) else {
            warn!(tick = snapshot.id, position = ?me.position, "agent outside the grid");
            return TickOutput::skipped(snapshot, SkipReason::MalformedSnapshot);
        };

        let previous_facing = self.state.as_ref().and_then(|state| {
            facing_after(state.position, me.position, state.facing)
        });
        self.state = Some(AgentState::from_record(me, previous_facing));

        let resized = self
            .grid
            .as_ref()
            .is_some_and(|old| old.rows() != grid.rows() || old.cols() != grid.cols());
        if resized {
            self.ledger.clear();
            self.seen_bombs.clear();
        }

        let owner_power = |owner: &str| snapshot.player(owner).map(|player| player.blast_power);
        self.ledger.observe(&grid, &snapshot.bombs, owner_power, now);
        self.ledger.expire(now, self.config.scorch_window_ms);
        let scorched = materialize_matured_blasts(
            &mut grid,
            &self.ledger,
            now,
            self.config.bomb_arming_delay_ms,
        );
        if scorched > 0 {
            debug!(tick = snapshot.id, scorched, "matured blasts painted");
        }
        let hazards = HazardIndex::build(
            &grid,
            &snapshot.bombs,
            owner_power,
            self.config.critical_fuse_ms,
        );

        let mut objective_locked = false;
        if let Some(tag) = snapshot.event_for(&self.id) {
            match &tag {
                EventTag::StopMoving => {
                    self.tracker.acknowledge_halt();
                    self.tracker.clear();
                    self.recheck_drop(snapshot);
                }
                EventTag::MovingBanned => {
                    self.tracker.clear();
                    self.recheck_drop(snapshot);
                }
                EventTag::BombSetup => {
                    let cooldown = if me.cooldown_ms > 0 {
                        me.cooldown_ms
                    } else {
                        self.config.default_drop_cooldown_ms
                    };
                    self.deferred.revoke_until(
                        &mut self.permissions,
                        PermissionKind::DropDevice,
                        now + cooldown,
                    );
                }
                EventTag::PairingComplete => self.paired = true,
                EventTag::ObjectiveLocked => objective_locked = true,
                EventTag::BombExploded | EventTag::Other(_) => {
                    debug!(tick = snapshot.id, tag = ?tag, "event tag");
                }
            }
        }

        // Pop the reached cell first so only cells still ahead count for a halt.
        if self.tracker.advance(position, now) == Progress::TimedOut {
            self.recheck_drop(snapshot);
        }

        if let Some(output) = self.check_halt(snapshot, &grid) {
            self.grid = Some(grid);
            return output;
        }

        if self.tracker.expire_halt(now) {
            debug!(tick = snapshot.id, "halt gate released without acknowledgment");
        }
        self.tracker.settle(now);

        let side_requests = self.side_requests(snapshot, me, now);

        let companion_present = snapshot.player(&self.companion_id).is_some();
        let mut opponents = HashSet::new();
        let mut opponent_players = Vec::new();
        for player in &snapshot.players {
            if player.id == self.id || player.id == self.companion_id {
                continue;
            }
            if let Some(cell) = grid.index_of(player.position) {
                opponents.insert(cell);
                opponent_players.push((player.id.clone(), player.position));
            }
        }
        let mut pickups: HashMap<usize, u32> = HashMap::new();
        let mut valuable = HashSet::new();
        for item in &snapshot.items {
            let Some(cell) = grid.index_of(item.position) else {
                continue;
            };
            *pickups.entry(cell).or_default() += item.value();
            let owned = item.owner_id.as_deref() == Some(self.id.as_str());
            if owned || item.value() >= self.config.min_pickup_value {
                valuable.insert(cell);
            }
        }
        debug!(
            tick = snapshot.id,
            companion_present,
            opponents = opponents.len(),
            "tick state"
        );

        let facing = self.state.as_ref().and_then(|state| state.facing);
        let situation = Situation {
            now_ms: now,
            grid: &grid,
            hazards: &hazards,
            position,
            coords: me.position,
            facing,
            blast_power: me.blast_power.max(1),
            is_empowered: me.is_empowered,
            ability_ready: me.special_ability_ready,
            opponents: &opponents,
            opponent_players: &opponent_players,
            pickups: &pickups,
            valuable: &valuable,
            can_drop: self.permissions.get(PermissionKind::DropDevice).is_allowed(),
            ability_allowed: self.permissions.get(PermissionKind::SpecialAbility).is_allowed(),
            objective_locked,
            in_flight: self.tracker.in_flight().is_some(),
        };
        let decision = decide(&self.config, &situation, &mut self.memory);

        let mut output = TickOutput {
            tick: snapshot.id,
            timestamp_ms: now,
            command: None,
            side_requests,
            trace: Trace::NoDecision,
        };
        if let Some(decision) = decision {
            output.trace = Trace::Decided {
                tactic: decision.tactic,
            };
            self.apply(decision.action, now, &mut output);
        }
        self.grid = Some(grid);
        output
    }

    /// Halt when a newly seen opponent bomb threatens a pending plan cell.
    fn check_halt(&mut self, snapshot: &TickSnapshot, grid: &Grid) -> Option<TickOutput> {
        let current: HashSet<(Position, u64)> = snapshot
            .bombs
            .iter()
            .map(|bomb| (bomb.position, bomb.created_at))
            .collect();
        let fresh: Vec<_> = snapshot
            .bombs
            .iter()
            .filter(|bomb| !self.seen_bombs.contains(&(bomb.position, bomb.created_at)))
            .filter(|bomb| bomb.owner_id != self.id && bomb.owner_id != self.companion_id)
            .collect();
        self.seen_bombs = current;

        for bomb in fresh {
            let Some(origin) = grid.index_of(bomb.position) else {
                continue;
            };
            let owner_power = snapshot.player(&bomb.owner_id).map(|player| player.blast_power);
            let power = effective_power(bomb, owner_power);
            let footprint = blast_footprint(grid, origin, power);
            if self.tracker.pending_intersects(|cell| footprint.contains(cell)) {
                info!(
                    tick = snapshot.id,
                    bomb = ?bomb.position,
                    owner = %bomb.owner_id,
                    "opponent bomb threatens plan, halting"
                );
                self.tracker.begin_halt(snapshot.timestamp_ms);
                self.tracker.issue(AwaitAck::Stop);
                return Some(TickOutput {
                    tick: snapshot.id,
                    timestamp_ms: snapshot.timestamp_ms,
                    command: Some(Command::Halt),
                    side_requests: Vec::new(),
                    trace: Trace::Halted,
                });
            }
        }
        None
    }

    /// Drop is allowed again once none of this agent's bombs remain.
    fn recheck_drop(&mut self, snapshot: &TickSnapshot) {
        let own_active = snapshot.bombs.iter().any(|bomb| bomb.owner_id == self.id);
        if !own_active && !self.permissions.drop_device.is_allowed() {
            debug!(tick = snapshot.id, "drop permission restored");
            self.permissions.drop_device.grant();
        }
    }

    fn side_requests(
        &mut self,
        snapshot: &TickSnapshot,
        me: &PlayerRecord,
        now: u64,
    ) -> Vec<SideRequest> {
        let mut requests = Vec::new();
        if me.is_empowered && me.current_weapon == PRIMARY_ITEM_SLOT {
            requests.push(SideRequest::SwitchItem);
        }
        let companion_present = snapshot.player(&self.companion_id).is_some();
        if me.pairing_tokens > 0 && !companion_present && !self.paired {
            requests.push(SideRequest::InitiatePairing);
        }
        let interval = self.config.side_request_interval_ms;
        requests.retain(|request| {
            self.side_limits
                .entry(request.kind())
                .or_insert_with(|| RateLimiter::new(interval))
                .try_mark(now)
        });
        requests
    }

    fn apply(&mut self, action: Action, now: u64, output: &mut TickOutput) {
        match action {
            Action::Hold => {}
            Action::Drive { command, plan } => {
                if command.drops_device() {
                    self.revoke_drop(now);
                }
                debug!(command = %command, cells = plan.len(), "plan committed");
                self.tracker.install(plan, now);
                self.tracker.issue(AwaitAck::PlanSettled);
                output.command = Some(command);
            }
            Action::Turn(direction) => {
                if let Some(state) = self.state.as_mut() {
                    state.facing = Some(direction);
                }
                self.tracker
                    .issue(AwaitAck::Until(now + self.config.step_duration_ms));
                output.command = Some(Command::moves([direction]));
            }
            Action::Drop => {
                self.revoke_drop(now);
                self.tracker
                    .issue(AwaitAck::Until(now + self.config.step_duration_ms));
                output.command = Some(Command::Drive(vec![Step::Drop]));
            }
            Action::UseAbility { target } => {
                info!(target = %target, "special ability fired");
                self.deferred.revoke_until(
                    &mut self.permissions,
                    PermissionKind::SpecialAbility,
                    now + self.config.ability_cooldown_ms,
                );
                self.tracker
                    .issue(AwaitAck::Until(now + self.config.ability_lock_ms));
                output.side_requests.push(SideRequest::UseAbility { target });
            }
        }
    }

    fn revoke_drop(&mut self, now: u64) {
        self.deferred.revoke_until(
            &mut self.permissions,
            PermissionKind::DropDevice,
            now + self.config.default_drop_cooldown_ms,
        );
    }
}
