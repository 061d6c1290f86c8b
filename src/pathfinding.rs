//! A* pathfinding over the tile collision grid, with danger-weighted
//! costs and a TTL-cached request table (§4.3).

use crate::components::Position;
use crate::error::PathError;
use crate::grid::{CollisionGrid, DangerGrids, TILE};
use crate::ids::PlayerId;
use bevy_ecs::prelude::Resource;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// Weight applied to accumulated danger when scoring a tile. Large enough
/// that a short detour around a turret beats cutting through its aura,
/// but finite so a sole path through danger is still found.
pub const DANGER_WEIGHT: f32 = 4.0;

/// Ticks a cached path result remains valid before being recomputed.
pub const PATH_CACHE_TTL: u64 = 60;

const WAYPOINT_RADIUS: f32 = TILE * 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RadiusClass(pub u8);

impl RadiusClass {
    pub fn from_radius(radius: f32) -> Self {
        RadiusClass(((radius / TILE).ceil() as u8).max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathKey {
    pub start_tile: (i32, i32),
    pub goal_tile: (i32, i32),
    pub radius_class: RadiusClass,
    pub player: PlayerId,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    path: Option<Vec<Position>>,
    computed_at: u64,
}

#[derive(Resource, Debug, Default)]
pub struct PathCache {
    entries: HashMap<PathKey, CacheEntry>,
}

impl PathCache {
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    fn get_fresh(&self, key: &PathKey, now: u64) -> Option<Option<Vec<Position>>> {
        self.entries.get(key).and_then(|e| {
            if now.saturating_sub(e.computed_at) <= PATH_CACHE_TTL {
                Some(e.path.clone())
            } else {
                None
            }
        })
    }

    fn insert(&mut self, key: PathKey, path: Option<Vec<Position>>, now: u64) {
        self.entries.insert(key, CacheEntry { path, computed_at: now });
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct OpenEntry {
    f: f32,
    tile: (i32, i32),
}

impl Eq for OpenEntry {}
impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.f.partial_cmp(&self.f).unwrap_or(Ordering::Equal)
    }
}
impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn heuristic(a: (i32, i32), b: (i32, i32)) -> f32 {
    (((a.0 - b.0).pow(2) + (a.1 - b.1).pow(2)) as f32).sqrt()
}

fn neighbors(tile: (i32, i32)) -> [((i32, i32), f32); 8] {
    [
        ((tile.0 + 1, tile.1), 1.0),
        ((tile.0 - 1, tile.1), 1.0),
        ((tile.0, tile.1 + 1), 1.0),
        ((tile.0, tile.1 - 1), 1.0),
        ((tile.0 + 1, tile.1 + 1), std::f32::consts::SQRT_2),
        ((tile.0 - 1, tile.1 - 1), std::f32::consts::SQRT_2),
        ((tile.0 + 1, tile.1 - 1), std::f32::consts::SQRT_2),
        ((tile.0 - 1, tile.1 + 1), std::f32::consts::SQRT_2),
    ]
}

fn is_traversable(collision: &CollisionGrid, tile: (i32, i32), radius_class: RadiusClass) -> bool {
    let r = radius_class.0 as i32;
    for dy in -r..=r {
        for dx in -r..=r {
            if !collision.is_in_bounds(tile.0 + dx, tile.1 + dy) {
                return false;
            }
            if collision.is_blocked(tile.0 + dx, tile.1 + dy) {
                return false;
            }
        }
    }
    true
}

fn raw_astar(
    collision: &CollisionGrid,
    danger: &DangerGrids,
    player: PlayerId,
    start: (i32, i32),
    goal: (i32, i32),
    radius_class: RadiusClass,
) -> Option<Vec<(i32, i32)>> {
    if !collision.is_in_bounds(start.0, start.1) || !collision.is_in_bounds(goal.0, goal.1) {
        return None;
    }
    if !is_traversable(collision, goal, radius_class) {
        return None;
    }

    let mut open = BinaryHeap::new();
    let mut came_from: HashMap<(i32, i32), (i32, i32)> = HashMap::new();
    let mut g_score: HashMap<(i32, i32), f32> = HashMap::new();

    g_score.insert(start, 0.0);
    open.push(OpenEntry { f: heuristic(start, goal), tile: start });

    // Bound the search so a malformed request can't loop forever.
    let max_expansions = (collision.width * collision.height).max(4096);
    let mut expansions = 0usize;

    while let Some(OpenEntry { tile: current, .. }) = open.pop() {
        if current == goal {
            let mut path = vec![current];
            let mut cursor = current;
            while let Some(&prev) = came_from.get(&cursor) {
                path.push(prev);
                cursor = prev;
            }
            path.reverse();
            return Some(path);
        }

        expansions += 1;
        if expansions > max_expansions {
            return None;
        }

        let current_g = *g_score.get(&current).unwrap_or(&f32::INFINITY);

        for (next, step_cost) in neighbors(current) {
            if !collision.is_in_bounds(next.0, next.1) {
                continue;
            }
            if !is_traversable(collision, next, radius_class) {
                continue;
            }
            let danger_penalty = DANGER_WEIGHT * danger.danger_at(player, next.0, next.1);
            let tentative_g = current_g + step_cost + danger_penalty;
            if tentative_g < *g_score.get(&next).unwrap_or(&f32::INFINITY) {
                came_from.insert(next, current);
                g_score.insert(next, tentative_g);
                open.push(OpenEntry {
                    f: tentative_g + heuristic(next, goal),
                    tile: next,
                });
            }
        }
    }
    None
}

fn has_line_of_tile_sight(collision: &CollisionGrid, a: (i32, i32), b: (i32, i32)) -> bool {
    let (mut x0, mut y0) = a;
    let (x1, y1) = b;
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        if collision.is_blocked(x0, y0) {
            return false;
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
    true
}

fn smooth_waypoints(collision: &CollisionGrid, tiles: &[(i32, i32)]) -> Vec<(i32, i32)> {
    if tiles.len() <= 2 {
        return tiles.to_vec();
    }
    let mut smoothed = vec![tiles[0]];
    let mut anchor = 0;
    let mut probe = 2;
    while probe < tiles.len() {
        if has_line_of_tile_sight(collision, tiles[anchor], tiles[probe]) {
            probe += 1;
        } else {
            smoothed.push(tiles[probe - 1]);
            anchor = probe - 1;
            probe += 1;
        }
    }
    smoothed.push(*tiles.last().unwrap());
    smoothed
}

fn tile_to_world(tile: (i32, i32)) -> Position {
    Position::new(tile.0 as f32 * TILE + TILE / 2.0, tile.1 as f32 * TILE + TILE / 2.0)
}

/// Finds a path, consulting (and populating) the cache. Returns `Err` on
/// `NoPath`; callers fall back to direct steering, per §7.
pub fn find_path(
    cache: &mut PathCache,
    collision: &CollisionGrid,
    danger: &DangerGrids,
    player: PlayerId,
    from: Position,
    to: Position,
    unit_radius: f32,
    now: u64,
) -> Result<Vec<Position>, PathError> {
    let start_tile = CollisionGrid::world_to_tile(from.x, from.y);
    let goal_tile = CollisionGrid::world_to_tile(to.x, to.y);
    if !collision.is_in_bounds(start_tile.0, start_tile.1) || !collision.is_in_bounds(goal_tile.0, goal_tile.1) {
        return Err(PathError::OutOfBounds);
    }
    let radius_class = RadiusClass::from_radius(unit_radius);
    let key = PathKey { start_tile, goal_tile, radius_class, player };

    if let Some(cached) = cache.get_fresh(&key, now) {
        return cached.map(waypoints_with_exact_goal(to)).ok_or(PathError::NoPath);
    }

    let raw = raw_astar(collision, danger, player, start_tile, goal_tile, radius_class);
    let path = raw.map(|tiles| {
        smooth_waypoints(collision, &tiles)
            .into_iter()
            .map(tile_to_world)
            .collect::<Vec<_>>()
    });
    cache.insert(key, path.clone(), now);
    path.map(waypoints_with_exact_goal(to)).ok_or(PathError::NoPath)
}

fn waypoints_with_exact_goal(goal: Position) -> impl Fn(Vec<Position>) -> Vec<Position> {
    move |mut waypoints: Vec<Position>| {
        if let Some(last) = waypoints.last_mut() {
            *last = goal;
        }
        waypoints
    }
}

pub const WAYPOINT_ARRIVAL_RADIUS: f32 = WAYPOINT_RADIUS;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CollisionGrid;

    #[test]
    fn straight_line_path_exists_on_open_grid() {
        let collision = CollisionGrid::new(2000.0, 2000.0);
        let danger = DangerGrids::default();
        let mut cache = PathCache::default();
        let path = find_path(
            &mut cache,
            &collision,
            &danger,
            PlayerId(0),
            Position::new(50.0, 50.0),
            Position::new(500.0, 500.0),
            10.0,
            0,
        )
        .expect("path should exist on an open grid");
        assert!(path.first().unwrap().distance(&Position::new(50.0, 50.0)) < TILE * 2.0);
        assert!(path.last().unwrap().distance(&Position::new(500.0, 500.0)) < 1.0);
    }

    #[test]
    fn blocked_goal_tile_returns_no_path() {
        let mut collision = CollisionGrid::new(2000.0, 2000.0);
        let goal_tile = CollisionGrid::world_to_tile(500.0, 500.0);
        collision.stamp(goal_tile.0 - 1, goal_tile.1 - 1, goal_tile.0 + 1, goal_tile.1 + 1);
        let danger = DangerGrids::default();
        let mut cache = PathCache::default();
        let result = find_path(
            &mut cache,
            &collision,
            &danger,
            PlayerId(0),
            Position::new(50.0, 50.0),
            Position::new(500.0, 500.0),
            10.0,
            0,
        );
        assert_eq!(result, Err(PathError::NoPath));
    }
}
