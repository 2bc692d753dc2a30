//! Frontier search over walkable cells.
//!
//! Every higher-level query (escape, mining, retreat, exploration, retrieval)
//! is a single [`FrontierSearch::run`] with its own visit callback. Nodes live
//! in a [`SearchTree`] arena owned by that call; callers pull routes out of the
//! tree inside the callback.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::constants::{PICKUP_STEP_TENTHS, ROAD_STEP_TENTHS};
use crate::grid::{Direction, Grid, TileKind};

pub type NodeId = usize;

#[derive(Clone, Debug, PartialEq)]
pub struct SearchNode {
    pub index: usize,
    pub parent: Option<NodeId>,
    pub direction: Option<Direction>,
    /// Steps from the root; pickup cells cost a tenth of a step.
    pub distance: f32,
    pub boxes: u32,
    pub isolated_boxes: u32,
    pub bonus: u32,
    pub saw_opponent: bool,
    pub children: Vec<NodeId>,
    distance_tenths: u32,
}

#[derive(Clone, Debug, Default)]
pub struct SearchTree {
    nodes: Vec<SearchNode>,
}

impl SearchTree {
    pub fn node(&self, id: NodeId) -> &SearchNode {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Walk parent links from `id` back to the root.
    pub fn route(&self, id: NodeId) -> Route {
        let mut cells = Vec::new();
        let mut steps = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = &self.nodes[current];
            if let Some(dir) = node.direction {
                cells.push(node.index);
                steps.push(dir);
            }
            cursor = node.parent;
        }
        cells.reverse();
        steps.reverse();
        Route {
            cells,
            steps,
            distance: self.nodes[id].distance,
        }
    }

    fn push(&mut self, node: SearchNode) -> NodeId {
        let id = self.nodes.len();
        if let Some(parent) = node.parent {
            self.nodes[parent].children.push(id);
        }
        self.nodes.push(node);
        id
    }
}

/// Path from a search root to one node. `cells` excludes the root cell.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Route {
    pub cells: Vec<usize>,
    pub steps: Vec<Direction>,
    pub distance: f32,
}

impl Route {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn destination(&self) -> Option<usize> {
        self.cells.last().copied()
    }
}

/// Outcome of visiting one node.
#[derive(Clone, Debug, PartialEq)]
pub enum Visit<T> {
    /// Keep going and expand this node's neighbours.
    Expand,
    /// Keep going but do not expand past this node.
    Prune,
    /// Stop the whole search with this result.
    Accept(T),
}

/// Boxes and opponents reachable by a blast dropped at a cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoxHits {
    pub boxes: u32,
    pub isolated: u32,
    pub saw_opponent: bool,
}

/// Score a would-be drop cell: the first box per ray counts as isolated or
/// clustered, and any opponent on a ray before a wall is flagged. A box in
/// `targeted` still stops its ray but adds nothing.
pub fn count_box_hits(
    grid: &Grid,
    index: usize,
    power: u32,
    opponents: &HashSet<usize>,
    targeted: &HashSet<usize>,
) -> BoxHits {
    let mut hits = BoxHits::default();
    for dir in Direction::ALL {
        for step in 1..=power {
            let Some(cell) = grid.step_by(index, dir, step) else {
                break;
            };
            match grid.kind(cell) {
                Some(TileKind::IndestructibleWall | TileKind::ReinforcedWall) | None => break,
                Some(TileKind::DestructibleBox) => {
                    if targeted.contains(&cell) {
                        break;
                    }
                    if grid.is_isolated_box(cell) {
                        hits.isolated += 1;
                    } else {
                        hits.boxes += 1;
                    }
                    break;
                }
                Some(_) => {}
            }
            if opponents.contains(&cell) {
                hits.saw_opponent = true;
            }
        }
    }
    hits
}

/// Shared breadth-first traversal configured once per query.
///
/// The frontier is ordered by (distance, insertion order), so with uniform
/// step costs it is plain FIFO and with pickup discounts it still visits in
/// non-decreasing distance. Each cell is enqueued at most once.
pub struct FrontierSearch<'a> {
    grid: &'a Grid,
    blast_power: u32,
    opponents: Option<&'a HashSet<usize>>,
    targeted: Option<&'a HashSet<usize>>,
    pickups: Option<&'a HashMap<usize, u32>>,
    landing: Option<&'a HashSet<usize>>,
    initial_tenths: u32,
}

impl<'a> FrontierSearch<'a> {
    pub fn new(grid: &'a Grid, blast_power: u32) -> Self {
        Self {
            grid,
            blast_power,
            opponents: None,
            targeted: None,
            pickups: None,
            landing: None,
            initial_tenths: 0,
        }
    }

    pub fn with_opponents(mut self, opponents: &'a HashSet<usize>) -> Self {
        self.opponents = Some(opponents);
        self
    }

    /// Boxes some pending blast already reaches; drop scoring skips them.
    pub fn with_targeted(mut self, targeted: &'a HashSet<usize>) -> Self {
        self.targeted = Some(targeted);
        self
    }

    /// Pickup values by cell; they feed `bonus` and discount the step cost.
    pub fn with_pickups(mut self, pickups: &'a HashMap<usize, u32>) -> Self {
        self.pickups = Some(pickups);
        self
    }

    /// Extra cells the search may step onto even when they are not roads.
    pub fn with_landing(mut self, landing: &'a HashSet<usize>) -> Self {
        self.landing = Some(landing);
        self
    }

    pub fn with_initial_distance(mut self, distance: f32) -> Self {
        self.initial_tenths = (distance.max(0.0) * ROAD_STEP_TENTHS as f32).round() as u32;
        self
    }

    pub fn run<T>(
        &self,
        root: usize,
        mut visit: impl FnMut(&SearchTree, NodeId) -> Visit<T>,
    ) -> Option<T> {
        if root >= self.grid.len() {
            return None;
        }
        let empty = HashSet::new();
        let opponents = self.opponents.unwrap_or(&empty);
        let targeted = self.targeted.unwrap_or(&empty);

        let mut tree = SearchTree::default();
        let mut visited = HashSet::from([root]);
        let mut frontier = BinaryHeap::new();
        let mut sequence = 0u64;

        let rays = (opponents, targeted);
        let root_node = self.make_node(root, None, None, self.initial_tenths, 0, rays);
        let root_id = tree.push(root_node);
        frontier.push(Reverse((self.initial_tenths, sequence, root_id)));

        while let Some(Reverse((_, _, id))) = frontier.pop() {
            match visit(&tree, id) {
                Visit::Accept(result) => return Some(result),
                Visit::Prune => continue,
                Visit::Expand => {}
            }
            let (index, tenths, bonus) = {
                let node = tree.node(id);
                (node.index, node.distance_tenths, node.bonus)
            };
            for (dir, next) in self.grid.neighbors(index) {
                if !self.can_enter(next) || !visited.insert(next) {
                    continue;
                }
                let step = if self.pickup_value(next) > 0 {
                    PICKUP_STEP_TENTHS
                } else {
                    ROAD_STEP_TENTHS
                };
                let child = self.make_node(next, Some(id), Some(dir), tenths + step, bonus, rays);
                let child_tenths = child.distance_tenths;
                let child_id = tree.push(child);
                sequence += 1;
                frontier.push(Reverse((child_tenths, sequence, child_id)));
            }
        }
        None
    }

    fn can_enter(&self, index: usize) -> bool {
        self.grid.is_road(index) || self.landing.is_some_and(|cells| cells.contains(&index))
    }

    fn pickup_value(&self, index: usize) -> u32 {
        self.pickups
            .and_then(|pickups| pickups.get(&index).copied())
            .unwrap_or(0)
    }

    fn make_node(
        &self,
        index: usize,
        parent: Option<NodeId>,
        direction: Option<Direction>,
        distance_tenths: u32,
        parent_bonus: u32,
        (opponents, targeted): (&HashSet<usize>, &HashSet<usize>),
    ) -> SearchNode {
        let hits = count_box_hits(self.grid, index, self.blast_power, opponents, targeted);
        SearchNode {
            index,
            parent,
            direction,
            distance: distance_tenths as f32 / ROAD_STEP_TENTHS as f32,
            boxes: hits.boxes,
            isolated_boxes: hits.isolated,
            bonus: parent_bonus + self.pickup_value(index),
            saw_opponent: hits.saw_opponent,
            children: Vec::new(),
            distance_tenths,
        }
    }
}

/// Step cost for objective routing, or `None` when the tile is impassable.
pub fn objective_step_cost(kind: TileKind, holds_item: bool) -> Option<u32> {
    let base = match kind {
        TileKind::Road | TileKind::SpecialItem | TileKind::Scorched => 1,
        TileKind::DestructibleBox => 3,
        TileKind::ReinforcedWall => 4,
        TileKind::IndestructibleWall
        | TileKind::SpawnLock
        | TileKind::HazardZone
        | TileKind::Unknown(_) => return None,
    };
    Some(if holds_item { base + 2 } else { base })
}

/// Cheapest route from `from` to any cell in `targets` under
/// [`objective_step_cost`]. Ties resolve by expansion order.
pub fn cheapest_route(
    grid: &Grid,
    from: usize,
    targets: &HashSet<usize>,
    item_cells: &HashSet<usize>,
) -> Option<Route> {
    if from >= grid.len() || targets.is_empty() {
        return None;
    }
    let mut best: HashMap<usize, u32> = HashMap::from([(from, 0)]);
    let mut came_from: HashMap<usize, (usize, Direction)> = HashMap::new();
    let mut frontier = BinaryHeap::from([Reverse((0u32, 0u64, from))]);
    let mut sequence = 0u64;

    while let Some(Reverse((cost, _, cell))) = frontier.pop() {
        if best.get(&cell).is_some_and(|known| *known < cost) {
            continue;
        }
        if cell != from && targets.contains(&cell) {
            let mut cells = vec![cell];
            let mut steps = Vec::new();
            let mut cursor = cell;
            while let Some(&(previous, dir)) = came_from.get(&cursor) {
                steps.push(dir);
                if previous != from {
                    cells.push(previous);
                }
                cursor = previous;
            }
            cells.reverse();
            steps.reverse();
            return Some(Route {
                cells,
                steps,
                distance: cost as f32,
            });
        }
        for (dir, next) in grid.neighbors(cell) {
            let Some(kind) = grid.kind(next) else {
                continue;
            };
            let Some(step) = objective_step_cost(kind, item_cells.contains(&next)) else {
                continue;
            };
            let next_cost = cost + step;
            if best.get(&next).map_or(true, |known| next_cost < *known) {
                best.insert(next, next_cost);
                came_from.insert(next, (cell, dir));
                sequence += 1;
                frontier.push(Reverse((next_cost, sequence, next)));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Position;

    fn grid_from(rows: &[&[u8]]) -> Grid {
        let map: Vec<Vec<u8>> = rows.iter().map(|row| row.to_vec()).collect();
        Grid::from_rows(map.len(), map[0].len(), &map).expect("valid grid")
    }

    #[test]
    fn visits_in_non_decreasing_distance_with_pickup_discounts() {
        let grid = Grid::filled(6, 6, TileKind::Road);
        let pickups = HashMap::from([(1, 2), (8, 5), (20, 1)]);
        let mut seen = Vec::new();
        let result: Option<()> = FrontierSearch::new(&grid, 1)
            .with_pickups(&pickups)
            .run(0, |tree, id| {
                seen.push(tree.node(id).distance);
                Visit::Expand
            });
        assert!(result.is_none());
        assert_eq!(seen.len(), 36);
        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]), "{seen:?}");
    }

    #[test]
    fn uniform_costs_visit_in_fifo_order() {
        let grid = Grid::filled(1, 5, TileKind::Road);
        let mut order = Vec::new();
        let _: Option<()> = FrontierSearch::new(&grid, 1).run(2, |tree, id| {
            order.push(tree.node(id).index);
            Visit::Expand
        });
        assert_eq!(order, vec![2, 1, 3, 0, 4]);
    }

    #[test]
    fn prune_walls_off_without_stopping() {
        let grid = Grid::filled(1, 5, TileKind::Road);
        let mut order = Vec::new();
        let _: Option<()> = FrontierSearch::new(&grid, 1).run(0, |tree, id| {
            let node = tree.node(id);
            order.push(node.index);
            if node.index == 2 {
                Visit::Prune
            } else {
                Visit::Expand
            }
        });
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn accept_returns_route_excluding_root() {
        let grid = grid_from(&[&[0, 0, 0], &[1, 1, 0], &[0, 0, 0]]);
        let route = FrontierSearch::new(&grid, 1).run(0, |tree, id| {
            if tree.node(id).index == 6 {
                Visit::Accept(tree.route(id))
            } else {
                Visit::Expand
            }
        });
        let route = route.expect("reachable");
        assert_eq!(route.cells, vec![1, 2, 5, 8, 7, 6]);
        assert_eq!(route.steps.first(), Some(&Direction::Right));
        assert_eq!(route.steps.last(), Some(&Direction::Left));
        assert_eq!(route.distance, 6.0);
    }

    #[test]
    fn only_roads_are_entered_unless_landing_allowed() {
        let grid = grid_from(&[&[0, 6, 0]]);
        let mut reached = Vec::new();
        let _: Option<()> = FrontierSearch::new(&grid, 1).run(0, |tree, id| {
            reached.push(tree.node(id).index);
            Visit::Expand
        });
        assert_eq!(reached, vec![0]);

        let landing = HashSet::from([1]);
        let hit = FrontierSearch::new(&grid, 1)
            .with_landing(&landing)
            .run(0, |tree, id| {
                if tree.node(id).index == 1 {
                    Visit::Accept(id)
                } else {
                    Visit::Expand
                }
            });
        assert!(hit.is_some());
    }

    #[test]
    fn box_hits_classify_first_box_per_ray() {
        // Boxes at 2 and 3 are adjacent, so the first one counts as clustered.
        let grid = grid_from(&[&[0, 0, 2, 2, 0], &[1, 0, 0, 0, 0], &[0, 0, 0, 0, 2]]);
        let none = HashSet::new();
        let hits = count_box_hits(&grid, 0, 3, &none, &none);
        assert_eq!(hits, BoxHits { boxes: 1, isolated: 0, saw_opponent: false });

        assert_eq!(count_box_hits(&grid, 9, 0, &none, &none), BoxHits::default());
        // (1,4) down to (2,4): isolated box.
        let lone = count_box_hits(&grid, 9, 1, &none, &none);
        assert_eq!(lone, BoxHits { boxes: 0, isolated: 1, saw_opponent: false });

        let opponents = HashSet::from([grid.index_of(Position::new(1, 2)).expect("cell")]);
        let seen = count_box_hits(&grid, 6, 2, &opponents, &none);
        assert!(seen.saw_opponent);
    }

    #[test]
    fn targeted_box_blocks_ray_without_scoring() {
        let grid = grid_from(&[&[0, 2, 0, 2]]);
        let none = HashSet::new();
        let fresh = count_box_hits(&grid, 0, 3, &none, &none);
        assert_eq!(fresh, BoxHits { boxes: 0, isolated: 1, saw_opponent: false });

        // The far box stays shadowed behind the targeted one.
        let targeted = HashSet::from([1]);
        assert_eq!(count_box_hits(&grid, 0, 3, &none, &targeted), BoxHits::default());

        let node = FrontierSearch::new(&grid, 3)
            .with_targeted(&targeted)
            .run(0, |tree, id| Visit::Accept(tree.node(id).clone()))
            .expect("root");
        assert_eq!((node.boxes, node.isolated_boxes), (0, 0));
    }

    #[test]
    fn cheapest_route_prefers_roads_over_boxes() {
        let grid = grid_from(&[&[0, 2, 2, 6], &[0, 0, 0, 0]]);
        let targets = HashSet::from([3]);
        let route = cheapest_route(&grid, 0, &targets, &HashSet::new()).expect("route");
        // Through both boxes: 3 + 3 + 1 = 7. Along the bottom row: 5.
        assert_eq!(route.distance, 5.0);
        assert_eq!(route.cells, vec![4, 5, 6, 7, 3]);
        assert_eq!(route.steps[0], Direction::Down);
    }

    #[test]
    fn cheapest_route_breaks_ties_by_expansion_order() {
        let grid = grid_from(&[&[0, 2, 6], &[0, 0, 0]]);
        let targets = HashSet::from([2]);
        let route = cheapest_route(&grid, 0, &targets, &HashSet::new()).expect("route");
        // Through the box: 3 + 1 = 4. Around it: 4 as well; the box path is queued first.
        assert_eq!(route.distance, 4.0);
        assert_eq!(route.cells, vec![1, 2]);

        let walled = grid_from(&[&[0, 1, 6], &[1, 1, 0]]);
        assert!(cheapest_route(&walled, 0, &targets, &HashSet::new()).is_none());
    }
}
