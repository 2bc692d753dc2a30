//! Flattened tile grid.
//!
//! Cells are addressed by `row * cols + col`. The grid is rebuilt from every
//! snapshot and may be overwritten in place afterwards (scorched cells).

use serde::{Deserialize, Serialize};

use crate::constants::{
    MOVE_DOWN, MOVE_LEFT, MOVE_RIGHT, MOVE_UP, TILE_BOX, TILE_HAZARD_ZONE, TILE_REINFORCED_WALL,
    TILE_ROAD, TILE_SCORCHED, TILE_SPAWN_LOCK, TILE_SPECIAL_ITEM, TILE_WALL,
};
use crate::error::SnapshotError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", from = "u8")]
pub enum TileKind {
    Road,
    IndestructibleWall,
    DestructibleBox,
    ReinforcedWall,
    SpawnLock,
    SpecialItem,
    Scorched,
    HazardZone,
    Unknown(u8),
}

impl From<u8> for TileKind {
    fn from(code: u8) -> Self {
        match code {
            TILE_ROAD => Self::Road,
            TILE_WALL => Self::IndestructibleWall,
            TILE_BOX => Self::DestructibleBox,
            TILE_REINFORCED_WALL => Self::ReinforcedWall,
            TILE_SPAWN_LOCK => Self::SpawnLock,
            TILE_SPECIAL_ITEM => Self::SpecialItem,
            TILE_SCORCHED => Self::Scorched,
            TILE_HAZARD_ZONE => Self::HazardZone,
            other => Self::Unknown(other),
        }
    }
}

impl From<TileKind> for u8 {
    fn from(kind: TileKind) -> u8 {
        match kind {
            TileKind::Road => TILE_ROAD,
            TileKind::IndestructibleWall => TILE_WALL,
            TileKind::DestructibleBox => TILE_BOX,
            TileKind::ReinforcedWall => TILE_REINFORCED_WALL,
            TileKind::SpawnLock => TILE_SPAWN_LOCK,
            TileKind::SpecialItem => TILE_SPECIAL_ITEM,
            TileKind::Scorched => TILE_SCORCHED,
            TileKind::HazardZone => TILE_HAZARD_ZONE,
            TileKind::Unknown(code) => code,
        }
    }
}

impl TileKind {
    /// Kinds a blast ray travels through.
    pub fn lets_blast_through(self) -> bool {
        matches!(self, Self::Road | Self::SpecialItem | Self::HazardZone)
    }

    /// Kinds that stop a scorch ray when a blast matures.
    pub fn stops_scorch(self) -> bool {
        matches!(
            self,
            Self::IndestructibleWall | Self::SpawnLock | Self::DestructibleBox | Self::ReinforcedWall
        )
    }

    /// Kinds that block a line of fire for the special ability.
    pub fn is_barrier(self) -> bool {
        matches!(
            self,
            Self::IndestructibleWall | Self::DestructibleBox | Self::ReinforcedWall
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: i32,
    pub col: i32,
}

impl Position {
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    /// Expansion order used by every search: left, right, up, down.
    pub const ALL: [Direction; 4] = [Self::Left, Self::Right, Self::Up, Self::Down];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Self::Left => (0, -1),
            Self::Right => (0, 1),
            Self::Up => (-1, 0),
            Self::Down => (1, 0),
        }
    }

    pub fn code(self) -> char {
        match self {
            Self::Left => MOVE_LEFT,
            Self::Right => MOVE_RIGHT,
            Self::Up => MOVE_UP,
            Self::Down => MOVE_DOWN,
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            MOVE_LEFT => Some(Self::Left),
            MOVE_RIGHT => Some(Self::Right),
            MOVE_UP => Some(Self::Up),
            MOVE_DOWN => Some(Self::Down),
            _ => None,
        }
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Self::Left | Self::Right)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    tiles: Vec<TileKind>,
}

impl Grid {
    pub fn filled(rows: usize, cols: usize, kind: TileKind) -> Self {
        Self {
            rows,
            cols,
            tiles: vec![kind; rows * cols],
        }
    }

    /// Build from snapshot rows of tile codes.
    pub fn from_rows(rows: usize, cols: usize, map: &[Vec<u8>]) -> Result<Self, SnapshotError> {
        if rows == 0 || cols == 0 {
            return Err(SnapshotError::EmptyMap);
        }
        if map.len() != rows {
            return Err(SnapshotError::RowCountMismatch {
                declared: rows,
                actual: map.len(),
            });
        }
        let mut tiles = Vec::with_capacity(rows * cols);
        for (row, codes) in map.iter().enumerate() {
            if codes.len() != cols {
                return Err(SnapshotError::RaggedRow {
                    row,
                    expected: cols,
                    actual: codes.len(),
                });
            }
            tiles.extend(codes.iter().map(|&code| TileKind::from(code)));
        }
        Ok(Self { rows, cols, tiles })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn index_of(&self, pos: Position) -> Option<usize> {
        if pos.row < 0 || pos.col < 0 {
            return None;
        }
        let (row, col) = (pos.row as usize, pos.col as usize);
        if row >= self.rows || col >= self.cols {
            return None;
        }
        Some(row * self.cols + col)
    }

    pub fn position_of(&self, index: usize) -> Position {
        Position::new((index / self.cols) as i32, (index % self.cols) as i32)
    }

    pub fn kind(&self, index: usize) -> Option<TileKind> {
        self.tiles.get(index).copied()
    }

    pub fn set_kind(&mut self, index: usize, kind: TileKind) {
        if let Some(tile) = self.tiles.get_mut(index) {
            *tile = kind;
        }
    }

    pub fn is_road(&self, index: usize) -> bool {
        self.kind(index) == Some(TileKind::Road)
    }

    /// Cell one step from `index` in `dir`, or `None` past the grid edge.
    pub fn step(&self, index: usize, dir: Direction) -> Option<usize> {
        self.step_by(index, dir, 1)
    }

    pub fn step_by(&self, index: usize, dir: Direction, distance: u32) -> Option<usize> {
        let pos = self.position_of(index);
        let (dr, dc) = dir.delta();
        let distance = distance as i32;
        self.index_of(Position::new(pos.row + dr * distance, pos.col + dc * distance))
    }

    pub fn neighbors(&self, index: usize) -> impl Iterator<Item = (Direction, usize)> + '_ {
        Direction::ALL
            .into_iter()
            .filter_map(move |dir| self.step(index, dir).map(|next| (dir, next)))
    }

    /// Direction of a single orthogonal step from `from` to `to`.
    pub fn direction_between(&self, from: usize, to: usize) -> Option<Direction> {
        Direction::ALL
            .into_iter()
            .find(|&dir| self.step(from, dir) == Some(to))
    }

    /// A box with no other box among its eight surrounding cells.
    pub fn is_isolated_box(&self, index: usize) -> bool {
        let pos = self.position_of(index);
        for dr in -1..=1 {
            for dc in -1..=1 {
                if dr == 0 && dc == 0 {
                    continue;
                }
                let around = self.index_of(Position::new(pos.row + dr, pos.col + dc));
                if around.and_then(|cell| self.kind(cell)) == Some(TileKind::DestructibleBox) {
                    return false;
                }
            }
        }
        true
    }

    pub fn cells_of_kind(&self, kind: TileKind) -> impl Iterator<Item = usize> + '_ {
        self.tiles
            .iter()
            .enumerate()
            .filter(move |(_, tile)| **tile == kind)
            .map(|(index, _)| index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_from(rows: &[&[u8]]) -> Grid {
        let map: Vec<Vec<u8>> = rows.iter().map(|row| row.to_vec()).collect();
        Grid::from_rows(map.len(), map[0].len(), &map).expect("valid grid")
    }

    #[test]
    fn index_round_trips_through_position() {
        let grid = Grid::filled(4, 6, TileKind::Road);
        let index = grid.index_of(Position::new(2, 5)).expect("in range");
        assert_eq!(index, 17);
        assert_eq!(grid.position_of(index), Position::new(2, 5));
        assert_eq!(grid.index_of(Position::new(4, 0)), None);
        assert_eq!(grid.index_of(Position::new(0, -1)), None);
    }

    #[test]
    fn neighbors_drop_edges_without_wrapping_rows() {
        let grid = Grid::filled(3, 3, TileKind::Road);
        let corner: Vec<_> = grid.neighbors(3).collect();
        // (1,0): no left neighbour even though index 2 exists on the row above.
        assert_eq!(
            corner,
            vec![(Direction::Right, 4), (Direction::Up, 0), (Direction::Down, 6)]
        );
    }

    #[test]
    fn rejects_ragged_rows() {
        let map = vec![vec![0, 0], vec![0]];
        assert_eq!(
            Grid::from_rows(2, 2, &map),
            Err(SnapshotError::RaggedRow {
                row: 1,
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn isolated_box_ignores_diagonal_roads_only() {
        let grid = grid_from(&[&[0, 0, 0, 0], &[0, 2, 0, 0], &[0, 0, 0, 2], &[0, 0, 0, 0]]);
        assert!(grid.is_isolated_box(5));
        let clustered = grid_from(&[&[0, 0, 0], &[0, 2, 0], &[0, 0, 2]]);
        assert!(!clustered.is_isolated_box(4));
    }

    #[test]
    fn unknown_codes_survive_serde() {
        let kind: TileKind = serde_json::from_str("42").expect("decode");
        assert_eq!(kind, TileKind::Unknown(42));
        assert_eq!(serde_json::to_string(&TileKind::HazardZone).expect("encode"), "77");
    }
}
