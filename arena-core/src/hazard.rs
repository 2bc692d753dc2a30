//! Blast geometry and time-windowed danger.
//!
//! The hazard index is rebuilt from the bomb list every tick. The ledger is the
//! only piece that survives between ticks: it remembers bombs after the server
//! stops reporting them so their scorched footprint can be painted back onto a
//! freshly refreshed grid.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_BLAST_POWER;
use crate::grid::{Direction, Grid, TileKind};
use crate::snapshot::BombRecord;

/// Cells a blast reaches, plus the boxes it would break.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Footprint {
    pub cells: BTreeSet<usize>,
    pub targets: BTreeSet<usize>,
}

impl Footprint {
    pub fn contains(&self, index: usize) -> bool {
        self.cells.contains(&index)
    }
}

/// Ray-cast a blast of `power` from `origin` in the four cardinal directions.
///
/// A ray stops before the first tile that does not let a blast through; a box
/// at the stopping point is recorded as a target instead of a footprint cell.
pub fn blast_footprint(grid: &Grid, origin: usize, power: u32) -> Footprint {
    let mut footprint = Footprint::default();
    if origin >= grid.len() {
        return footprint;
    }
    footprint.cells.insert(origin);
    for dir in Direction::ALL {
        for step in 1..=power {
            let Some(cell) = grid.step_by(origin, dir, step) else {
                break;
            };
            let kind = grid.kind(cell).unwrap_or(TileKind::IndestructibleWall);
            if !kind.lets_blast_through() {
                if kind == TileKind::DestructibleBox {
                    footprint.targets.insert(cell);
                }
                break;
            }
            footprint.cells.insert(cell);
        }
    }
    footprint
}

/// Blast power of a bomb, falling back to its owner's power and then a default.
pub fn effective_power(bomb: &BombRecord, owner_power: Option<u32>) -> u32 {
    if bomb.blast_power > 0 {
        return bomb.blast_power;
    }
    owner_power
        .filter(|power| *power > 0)
        .unwrap_or(DEFAULT_BLAST_POWER)
}

/// Linear travel-time heuristic: `distance * step_duration + reaction_latency`.
///
/// This is not measured travel time. The latency term keeps it conservative.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArrivalEstimate {
    pub step_duration_ms: u64,
    pub reaction_latency_ms: u64,
}

impl ArrivalEstimate {
    pub fn arrival_ms(&self, distance_steps: f32) -> f32 {
        distance_steps * self.step_duration_ms as f32 + self.reaction_latency_ms as f32
    }
}

#[derive(Clone, Debug, Default)]
pub struct HazardIndex {
    danger_ms: HashMap<usize, u64>,
    immediate: HashSet<usize>,
    bomb_cells: HashSet<usize>,
    targets: HashSet<usize>,
}

impl HazardIndex {
    /// Union every bomb's footprint, keeping the earliest trigger time per cell.
    pub fn build<'a>(
        grid: &Grid,
        bombs: impl IntoIterator<Item = &'a BombRecord>,
        owner_power: impl Fn(&str) -> Option<u32>,
        critical_fuse_ms: u64,
    ) -> Self {
        let mut index = Self::default();
        for bomb in bombs {
            let Some(origin) = grid.index_of(bomb.position) else {
                continue;
            };
            let power = effective_power(bomb, owner_power(&bomb.owner_id));
            let footprint = blast_footprint(grid, origin, power);
            index.bomb_cells.insert(origin);
            index.targets.extend(footprint.targets.iter().copied());
            let critical = bomb.remaining_fuse_ms < critical_fuse_ms;
            for cell in footprint.cells {
                index
                    .danger_ms
                    .entry(cell)
                    .and_modify(|time| *time = (*time).min(bomb.remaining_fuse_ms))
                    .or_insert(bomb.remaining_fuse_ms);
                if critical {
                    index.immediate.insert(cell);
                }
            }
        }
        index
    }

    pub fn danger_time(&self, index: usize) -> Option<u64> {
        self.danger_ms.get(&index).copied()
    }

    /// Cell lies inside some predicted blast.
    pub fn is_threatened(&self, index: usize) -> bool {
        self.danger_ms.contains_key(&index)
    }

    /// Cell lies inside a blast whose fuse is below the critical threshold.
    pub fn is_immediate(&self, index: usize) -> bool {
        self.immediate.contains(&index)
    }

    pub fn is_bomb(&self, index: usize) -> bool {
        self.bomb_cells.contains(&index)
    }

    /// Boxes already inside some pending blast.
    pub fn targets(&self) -> &HashSet<usize> {
        &self.targets
    }

    pub fn threatened_cells(&self) -> impl Iterator<Item = usize> + '_ {
        self.danger_ms.keys().copied()
    }

    pub fn can_arrive_safely(
        &self,
        index: usize,
        distance_steps: f32,
        estimate: &ArrivalEstimate,
    ) -> bool {
        match self.danger_time(index) {
            None => true,
            Some(trigger_ms) => estimate.arrival_ms(distance_steps) < trigger_ms as f32,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LedgerEntry {
    cell: usize,
    created_at: u64,
    power: u32,
    detonates_at: u64,
}

/// Bombs remembered past their last sighting, keyed by (cell, creation time).
#[derive(Clone, Debug, Default)]
pub struct BombLedger {
    entries: Vec<LedgerEntry>,
}

impl BombLedger {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Record bombs seen for the first time; detonation is predicted from the
    /// fuse reported at first sighting.
    pub fn observe<'a>(
        &mut self,
        grid: &Grid,
        bombs: impl IntoIterator<Item = &'a BombRecord>,
        owner_power: impl Fn(&str) -> Option<u32>,
        now_ms: u64,
    ) {
        for bomb in bombs {
            let Some(cell) = grid.index_of(bomb.position) else {
                continue;
            };
            let known = self
                .entries
                .iter()
                .any(|entry| entry.cell == cell && entry.created_at == bomb.created_at);
            if known {
                continue;
            }
            self.entries.push(LedgerEntry {
                cell,
                created_at: bomb.created_at,
                power: effective_power(bomb, owner_power(&bomb.owner_id)),
                detonates_at: now_ms.saturating_add(bomb.remaining_fuse_ms),
            });
        }
    }

    /// Drop entries whose scorch window has elapsed.
    pub fn expire(&mut self, now_ms: u64, scorch_window_ms: u64) {
        self.entries
            .retain(|entry| now_ms <= entry.detonates_at.saturating_add(scorch_window_ms));
    }

    fn matured(&self, now_ms: u64, arming_delay_ms: u64) -> impl Iterator<Item = &LedgerEntry> {
        self.entries
            .iter()
            .filter(move |entry| now_ms >= entry.detonates_at.saturating_add(arming_delay_ms))
    }
}

/// Paint the footprint of every matured ledger bomb onto the grid as
/// `HazardZone`. Returns the number of cells flipped.
pub fn materialize_matured_blasts(
    grid: &mut Grid,
    ledger: &BombLedger,
    now_ms: u64,
    arming_delay_ms: u64,
) -> usize {
    let mut flipped = 0;
    let matured: Vec<LedgerEntry> = ledger.matured(now_ms, arming_delay_ms).copied().collect();
    for entry in matured {
        if entry.cell >= grid.len() {
            continue;
        }
        let mut scorched = vec![entry.cell];
        for dir in Direction::ALL {
            for step in 1..=entry.power {
                let Some(cell) = grid.step_by(entry.cell, dir, step) else {
                    break;
                };
                if grid.kind(cell).map_or(true, TileKind::stops_scorch) {
                    break;
                }
                scorched.push(cell);
            }
        }
        for cell in scorched {
            if grid.kind(cell) != Some(TileKind::HazardZone) {
                grid.set_kind(cell, TileKind::HazardZone);
                flipped += 1;
            }
        }
    }
    flipped
}
