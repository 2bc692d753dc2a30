//! Committed plan, the halt gate, and the one-command-in-flight gate.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerState {
    #[default]
    Idle,
    Following,
    /// Plan pending but the agent did not move since the last tick.
    Stalled,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Plan {
    cells: VecDeque<usize>,
    drop_at: Option<usize>,
}

impl Plan {
    /// `drop_at` is the cell where the route drops a device, if any.
    pub fn new(cells: impl IntoIterator<Item = usize>, drop_at: Option<usize>) -> Self {
        Self {
            cells: cells.into_iter().collect(),
            drop_at,
        }
    }

    pub fn head(&self) -> Option<usize> {
        self.cells.front().copied()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> impl Iterator<Item = usize> + '_ {
        self.cells.iter().copied()
    }

    pub fn drop_at(&self) -> Option<usize> {
        self.drop_at
    }

    /// Pop the head only when it equals `position`.
    pub fn pop_if_head(&mut self, position: usize) -> bool {
        if self.head() != Some(position) {
            return false;
        }
        self.cells.pop_front();
        true
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    NoPlan,
    Advanced,
    Completed,
    Waiting,
    TimedOut,
}

/// What releases the in-flight command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwaitAck {
    /// The committed plan empties, times out, or is cleared.
    PlanSettled,
    /// The snapshot clock reaches this time.
    Until(u64),
    /// The halt gate clears.
    Stop,
}

#[derive(Clone, Debug)]
pub struct PlanTracker {
    plan: Plan,
    state: TrackerState,
    idle_since_ms: u64,
    last_position: Option<usize>,
    halt_issued_ms: Option<u64>,
    in_flight: Option<AwaitAck>,
    cell_time_budget_ms: u64,
}

impl PlanTracker {
    pub fn new(cell_time_budget_ms: u64) -> Self {
        Self {
            plan: Plan::default(),
            state: TrackerState::Idle,
            idle_since_ms: 0,
            last_position: None,
            halt_issued_ms: None,
            in_flight: None,
            cell_time_budget_ms,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn install(&mut self, plan: Plan, now_ms: u64) {
        self.state = if plan.is_empty() {
            TrackerState::Idle
        } else {
            TrackerState::Following
        };
        self.plan = plan;
        self.idle_since_ms = now_ms;
    }

    pub fn clear(&mut self) {
        self.plan = Plan::default();
        self.state = TrackerState::Idle;
    }

    /// Consume the plan head if the agent stands on it, or time the plan out.
    pub fn advance(&mut self, position: usize, now_ms: u64) -> Progress {
        let moved = self.last_position.is_some_and(|last| last != position);
        self.last_position = Some(position);
        if self.plan.is_empty() {
            self.state = TrackerState::Idle;
            return Progress::NoPlan;
        }
        if self.plan.pop_if_head(position) {
            self.idle_since_ms = now_ms;
            if self.plan.is_empty() {
                self.state = TrackerState::Idle;
                return Progress::Completed;
            }
            self.state = TrackerState::Following;
            return Progress::Advanced;
        }
        if now_ms.saturating_sub(self.idle_since_ms) > self.cell_time_budget_ms {
            debug!(
                remaining = self.plan.len(),
                idle_ms = now_ms.saturating_sub(self.idle_since_ms),
                "plan timed out"
            );
            self.clear();
            return Progress::TimedOut;
        }
        self.state = if moved {
            TrackerState::Following
        } else {
            TrackerState::Stalled
        };
        Progress::Waiting
    }

    /// Some still-pending plan cell satisfies `contains`.
    pub fn pending_intersects(&self, mut contains: impl FnMut(usize) -> bool) -> bool {
        self.plan.cells().any(|cell| contains(cell))
    }

    pub fn begin_halt(&mut self, now_ms: u64) {
        self.clear();
        self.halt_issued_ms = Some(now_ms);
    }

    pub fn acknowledge_halt(&mut self) {
        self.halt_issued_ms = None;
    }

    pub fn awaiting_halt(&self) -> bool {
        self.halt_issued_ms.is_some()
    }

    /// Drop an unacknowledged halt once the cell budget has elapsed.
    /// Returns true when the gate was released here.
    pub fn expire_halt(&mut self, now_ms: u64) -> bool {
        let Some(issued) = self.halt_issued_ms else {
            return false;
        };
        if now_ms.saturating_sub(issued) <= self.cell_time_budget_ms {
            return false;
        }
        debug!(issued, now_ms, "halt acknowledgment timed out");
        self.halt_issued_ms = None;
        true
    }

    pub fn issue(&mut self, ack: AwaitAck) {
        self.in_flight = Some(ack);
    }

    pub fn in_flight(&self) -> Option<AwaitAck> {
        self.in_flight
    }

    /// Release the in-flight command if its acknowledgment condition holds.
    /// Call after `advance` and the halt checks for the tick.
    pub fn settle(&mut self, now_ms: u64) -> bool {
        let released = match self.in_flight {
            None => return false,
            Some(AwaitAck::PlanSettled) => self.plan.is_empty(),
            Some(AwaitAck::Until(deadline)) => now_ms >= deadline,
            Some(AwaitAck::Stop) => self.halt_issued_ms.is_none(),
        };
        if released {
            self.in_flight = None;
        }
        released
    }
}
