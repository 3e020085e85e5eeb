//! Terrain-cost-aware search over the 4-connected grid.
//!
//! Edge cost is the destination tile's move cost (at least 1), so Manhattan
//! distance is an admissible, consistent heuristic and A* returns optimal
//! paths. Ties on `f` go to the node pushed first, which makes the chosen path
//! a pure function of (map, blockers, start, goal).

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use marchlands_protocol::TilePos;
use thiserror::Error;
use tracing::trace;

use crate::map::{movement_cost_to_enter, GameMap};
use crate::rules::CompiledRules;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("start or goal is off the map")]
    OutOfBounds,
    #[error("no path between the tiles")]
    Unreachable,
}

/// Everything a search needs besides its endpoints.
#[derive(Clone, Copy)]
pub struct PathQuery<'a> {
    pub map: &'a GameMap,
    pub rules: &'a CompiledRules,
    /// Per-tile flag for tiles the mover may not pass through. The goal tile
    /// is exempt so callers can plan toward occupied targets.
    pub blocked: &'a [bool],
    /// Upper bound on expanded nodes; hitting it reports `Unreachable`.
    pub node_limit: usize,
}

impl<'a> PathQuery<'a> {
    pub fn new(map: &'a GameMap, rules: &'a CompiledRules, blocked: &'a [bool]) -> Self {
        Self {
            map,
            rules,
            blocked,
            node_limit: rules.tuning.path_node_limit.max(1),
        }
    }

    fn is_blocked(&self, index: usize) -> bool {
        self.blocked.get(index).copied().unwrap_or(false)
    }

    fn enter_cost(&self, index: usize) -> Option<i32> {
        movement_cost_to_enter(self.map, self.rules, index)
    }
}

#[derive(Debug)]
struct OpenNode {
    f: i32,
    g: i32,
    index: usize,
    tie: u64,
}

impl OpenNode {
    fn key(&self) -> (i32, u64) {
        (self.f, self.tie)
    }
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the smallest key.
        other.key().cmp(&self.key())
    }
}

/// Shortest path from `start` to `goal`, both included.
///
/// `start == goal` yields a single-tile path. Impassable goals and goals
/// walled off from `start` report `Unreachable` once the frontier is empty.
pub fn find_path(
    query: &PathQuery<'_>,
    start: TilePos,
    goal: TilePos,
) -> Result<Vec<TilePos>, PathError> {
    let map = query.map;
    let start_idx = map.index_of(start).ok_or(PathError::OutOfBounds)?;
    let goal_idx = map.index_of(goal).ok_or(PathError::OutOfBounds)?;
    if start_idx == goal_idx {
        return Ok(vec![start]);
    }
    if query.enter_cost(goal_idx).is_none() {
        return Err(PathError::Unreachable);
    }

    let mut open = BinaryHeap::new();
    let mut tie: u64 = 0;
    let mut g_score = vec![i32::MAX; map.len()];
    let mut came_from: Vec<Option<usize>> = vec![None; map.len()];
    let mut expanded = 0usize;

    g_score[start_idx] = 0;
    open.push(OpenNode {
        f: start.distance(goal),
        g: 0,
        index: start_idx,
        tie,
    });
    tie += 1;

    while let Some(node) = open.pop() {
        if node.g != g_score[node.index] {
            // Stale heap entry.
            continue;
        }
        if node.index == goal_idx {
            let path = reconstruct_path(map, &came_from, goal_idx);
            trace!(?start, ?goal, cost = node.g, expanded, "path found");
            return Ok(path);
        }

        expanded += 1;
        if expanded > query.node_limit {
            trace!(?start, ?goal, expanded, "path search hit node limit");
            return Err(PathError::Unreachable);
        }

        for n_idx in map.neighbors_indices(node.index).into_iter().flatten() {
            if n_idx != goal_idx && query.is_blocked(n_idx) {
                continue;
            }
            let Some(step) = query.enter_cost(n_idx) else {
                continue;
            };

            let tentative_g = node.g.saturating_add(step);
            if tentative_g >= g_score[n_idx] {
                continue;
            }

            came_from[n_idx] = Some(node.index);
            g_score[n_idx] = tentative_g;
            let h = map
                .pos_at_index(n_idx)
                .map(|p| p.distance(goal))
                .unwrap_or(0);
            open.push(OpenNode {
                f: tentative_g.saturating_add(h),
                g: tentative_g,
                index: n_idx,
                tie,
            });
            tie += 1;
        }
    }

    trace!(?start, ?goal, expanded, "no path");
    Err(PathError::Unreachable)
}

fn reconstruct_path(map: &GameMap, came_from: &[Option<usize>], mut current: usize) -> Vec<TilePos> {
    let mut out = vec![current];
    while let Some(prev) = came_from[current] {
        current = prev;
        out.push(current);
    }
    out.reverse();
    out.into_iter().filter_map(|i| map.pos_at_index(i)).collect()
}

/// Total cost of walking `path` (the first tile is where the mover stands).
pub fn path_cost(map: &GameMap, rules: &CompiledRules, path: &[TilePos]) -> Option<i32> {
    path.iter().skip(1).try_fold(0i32, |acc, pos| {
        let index = map.index_of(*pos)?;
        Some(acc + movement_cost_to_enter(map, rules, index)?)
    })
}

/// Cheapest cost from `start` to every tile (Dijkstra), `None` where
/// unreachable. Blocked tiles are never entered.
pub fn cost_field(query: &PathQuery<'_>, start: TilePos) -> Vec<Option<i32>> {
    let map = query.map;
    let mut dist = vec![None; map.len()];
    let Some(start_idx) = map.index_of(start) else {
        return dist;
    };

    let mut best = vec![i32::MAX; map.len()];
    best[start_idx] = 0;
    let mut heap = BinaryHeap::new();
    heap.push(Reverse((0i32, start_idx)));

    while let Some(Reverse((cost, index))) = heap.pop() {
        if cost != best[index] {
            continue;
        }
        dist[index] = Some(cost);
        for n_idx in map.neighbors_indices(index).into_iter().flatten() {
            if query.is_blocked(n_idx) {
                continue;
            }
            let Some(step) = query.enter_cost(n_idx) else {
                continue;
            };
            let next = cost.saturating_add(step);
            if next < best[n_idx] {
                best[n_idx] = next;
                heap.push(Reverse((next, n_idx)));
            }
        }
    }

    dist
}

/// Tiles enterable from `start` within `budget` move points, with their cost.
/// Excludes `start`; ordered by tile index.
pub fn reachable_tiles(query: &PathQuery<'_>, start: TilePos, budget: i32) -> Vec<(TilePos, i32)> {
    let map = query.map;
    let Some(start_idx) = map.index_of(start) else {
        return Vec::new();
    };
    cost_field(query, start)
        .into_iter()
        .enumerate()
        .filter_map(|(index, cost)| {
            let cost = cost?;
            if index == start_idx || cost > budget {
                return None;
            }
            Some((map.pos_at_index(index)?, cost))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{load_rules, RulesSource};

    fn grid(rules: &CompiledRules, rows: &[&str]) -> GameMap {
        let grass = rules.terrain_id("grass").unwrap();
        let forest = rules.terrain_id("forest").unwrap();
        let mountain = rules.terrain_id("mountain").unwrap();
        let water = rules.terrain_id("water").unwrap();
        let width = rows[0].len() as u32;
        let mut map = GameMap::new(width, rows.len() as u32, grass);
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                let terrain = match c {
                    'f' => forest,
                    'M' => mountain,
                    '~' => water,
                    _ => grass,
                };
                map.get_mut(TilePos::new(x as i32, y as i32)).unwrap().terrain = terrain;
            }
        }
        map
    }

    #[test]
    fn straight_line_on_open_ground() {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let map = grid(&rules, &["....", "....", "...."]);
        let blocked = vec![false; map.len()];
        let query = PathQuery::new(&map, &rules, &blocked);

        let path = find_path(&query, TilePos::new(0, 0), TilePos::new(3, 0)).expect("path");
        assert_eq!(path.first(), Some(&TilePos::new(0, 0)));
        assert_eq!(path.last(), Some(&TilePos::new(3, 0)));
        assert_eq!(path_cost(&map, &rules, &path), Some(3));
    }

    #[test]
    fn detours_around_forest_when_cheaper() {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let map = grid(&rules, &[".f.", "..."]);
        let blocked = vec![false; map.len()];
        let query = PathQuery::new(&map, &rules, &blocked);

        let path = find_path(&query, TilePos::new(0, 0), TilePos::new(2, 0)).expect("path");
        // Through the forest costs 3, around it costs 4.
        assert_eq!(path_cost(&map, &rules, &path), Some(3));
    }

    #[test]
    fn walled_off_goal_is_unreachable() {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let map = grid(&rules, &["..M..", "..M..", "..~.."]);
        let blocked = vec![false; map.len()];
        let query = PathQuery::new(&map, &rules, &blocked);

        let err = find_path(&query, TilePos::new(0, 0), TilePos::new(4, 2)).unwrap_err();
        assert_eq!(err, PathError::Unreachable);
        let err = find_path(&query, TilePos::new(0, 0), TilePos::new(2, 0)).unwrap_err();
        assert_eq!(err, PathError::Unreachable);
        let err = find_path(&query, TilePos::new(0, 0), TilePos::new(9, 9)).unwrap_err();
        assert_eq!(err, PathError::OutOfBounds);
    }

    #[test]
    fn blockers_are_avoided_but_goal_is_exempt() {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let map = grid(&rules, &["...", "..."]);
        let mut blocked = vec![false; map.len()];
        blocked[map.index_of(TilePos::new(1, 0)).unwrap()] = true;
        blocked[map.index_of(TilePos::new(2, 0)).unwrap()] = true;
        let query = PathQuery::new(&map, &rules, &blocked);

        let path = find_path(&query, TilePos::new(0, 0), TilePos::new(2, 0)).expect("path");
        assert!(!path.contains(&TilePos::new(1, 0)));
        assert_eq!(path.last(), Some(&TilePos::new(2, 0)));
    }

    #[test]
    fn node_limit_bounds_the_search() {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let map = grid(&rules, &["........", "........"]);
        let blocked = vec![false; map.len()];
        let mut query = PathQuery::new(&map, &rules, &blocked);
        query.node_limit = 2;

        let err = find_path(&query, TilePos::new(0, 0), TilePos::new(7, 1)).unwrap_err();
        assert_eq!(err, PathError::Unreachable);
    }

    #[test]
    fn reachable_tiles_respect_budget_and_costs() {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let map = grid(&rules, &[".f..", "...."]);
        let blocked = vec![false; map.len()];
        let query = PathQuery::new(&map, &rules, &blocked);

        let reach = reachable_tiles(&query, TilePos::new(0, 0), 2);
        let positions = reach.iter().map(|(p, _)| *p).collect::<Vec<_>>();
        assert!(positions.contains(&TilePos::new(1, 0)));
        assert!(positions.contains(&TilePos::new(1, 1)));
        assert!(!positions.contains(&TilePos::new(2, 0)));
        assert!(!positions.contains(&TilePos::new(0, 0)));
    }
}
