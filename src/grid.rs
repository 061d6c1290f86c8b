//! Spatial partitioning, tile collision, and per-player danger grids.
//!
//! Three related structures live here because they are rebuilt together
//! at the top of every tick (§4.2 of the design): a coarse spatial hash
//! for O(k) neighbor queries, a dense tile-blocked byte grid for
//! pathfinding traversability, and a per-player danger grid that biases
//! pathfinding away from enemy defense coverage.

use crate::ids::{EntityId, PlayerId};
use bevy_ecs::prelude::*;
use std::collections::HashMap;

pub const TILE: f32 = 40.0;

// ---------------------------------------------------------------------
// Spatial hash over live entities, generalized from a two-faction filter
// to an arbitrary per-player owner field.
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct SpatialEntry {
    pub entity: Entity,
    pub id: EntityId,
    pub x: f32,
    pub y: f32,
    pub owner: Option<PlayerId>,
}

#[derive(Resource, Debug)]
pub struct SpatialGrid {
    pub cell_size: f32,
    cells: HashMap<(i32, i32), Vec<SpatialEntry>>,
    entity_cells: HashMap<Entity, (i32, i32)>,
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(200.0)
    }
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
            entity_cells: HashMap::new(),
        }
    }

    #[inline]
    pub fn world_to_cell(&self, x: f32, y: f32) -> (i32, i32) {
        ((x / self.cell_size).floor() as i32, (y / self.cell_size).floor() as i32)
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.entity_cells.clear();
    }

    pub fn insert(&mut self, entry: SpatialEntry) {
        let cell = self.world_to_cell(entry.x, entry.y);
        self.cells.entry(cell).or_default().push(entry);
        self.entity_cells.insert(entry.entity, cell);
    }

    pub fn query_radius(&self, x: f32, y: f32, radius: f32) -> Vec<SpatialEntry> {
        let radius_sq = radius * radius;
        let span = (radius / self.cell_size).ceil() as i32 + 1;
        let center = self.world_to_cell(x, y);
        let mut results = Vec::new();
        for dx in -span..=span {
            for dy in -span..=span {
                let cell = (center.0 + dx, center.1 + dy);
                if let Some(entries) = self.cells.get(&cell) {
                    for entry in entries {
                        let d_sq = (entry.x - x).powi(2) + (entry.y - y).powi(2);
                        if d_sq <= radius_sq {
                            results.push(*entry);
                        }
                    }
                }
            }
        }
        results.sort_by(|a, b| {
            let da = (a.x - x).powi(2) + (a.y - y).powi(2);
            let db = (b.x - x).powi(2) + (b.y - y).powi(2);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });
        results
    }

    pub fn query_enemies(&self, x: f32, y: f32, radius: f32, owner: Option<PlayerId>) -> Vec<SpatialEntry> {
        let mut results = self.query_radius(x, y, radius);
        results.retain(|e| e.owner.is_some() && e.owner != owner);
        results
    }

    pub fn query_friendlies(&self, x: f32, y: f32, radius: f32, owner: Option<PlayerId>) -> Vec<SpatialEntry> {
        let mut results = self.query_radius(x, y, radius);
        results.retain(|e| e.owner == owner);
        results
    }

    pub fn nearest_enemy(&self, x: f32, y: f32, radius: f32, owner: Option<PlayerId>) -> Option<SpatialEntry> {
        self.query_enemies(x, y, radius, owner).into_iter().next()
    }

    pub fn total_count(&self) -> usize {
        self.entity_cells.len()
    }
}

/// Rebuilds the spatial hash from scratch at the top of every tick.
pub fn spatial_grid_update_system(
    mut grid: ResMut<SpatialGrid>,
    query: Query<(
        Entity,
        &crate::components::Id,
        &crate::components::Position,
        &crate::components::Owner,
        &crate::components::Hp,
    )>,
) {
    grid.clear();
    for (entity, id, pos, owner, hp) in query.iter() {
        if !hp.is_alive() {
            continue;
        }
        grid.insert(SpatialEntry {
            entity,
            id: id.0,
            x: pos.x,
            y: pos.y,
            owner: owner.0,
        });
    }
}

// ---------------------------------------------------------------------
// Collision grid: dense tile-blocked byte array.
// ---------------------------------------------------------------------

#[derive(Resource, Debug, Clone)]
pub struct CollisionGrid {
    pub width: usize,
    pub height: usize,
    cells: Vec<u8>,
}

impl CollisionGrid {
    pub fn new(map_width: f32, map_height: f32) -> Self {
        let width = (map_width / TILE).ceil() as usize;
        let height = (map_height / TILE).ceil() as usize;
        Self {
            width,
            height,
            cells: vec![0; width * height],
        }
    }

    #[inline]
    fn idx(&self, tx: i32, ty: i32) -> Option<usize> {
        if tx < 0 || ty < 0 || tx as usize >= self.width || ty as usize >= self.height {
            None
        } else {
            Some(ty as usize * self.width + tx as usize)
        }
    }

    pub fn world_to_tile(x: f32, y: f32) -> (i32, i32) {
        ((x / TILE).floor() as i32, (y / TILE).floor() as i32)
    }

    pub fn is_blocked(&self, tx: i32, ty: i32) -> bool {
        match self.idx(tx, ty) {
            Some(i) => self.cells[i] != 0,
            None => true,
        }
    }

    pub fn is_in_bounds(&self, tx: i32, ty: i32) -> bool {
        self.idx(tx, ty).is_some()
    }

    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = 0);
    }

    /// Stamps a building footprint (world-space AABB, in tiles) as blocked.
    pub fn stamp(&mut self, min_tx: i32, min_ty: i32, max_tx: i32, max_ty: i32) {
        for ty in min_ty..=max_ty {
            for tx in min_tx..=max_tx {
                if let Some(i) = self.idx(tx, ty) {
                    self.cells[i] = 1;
                }
            }
        }
    }

    pub fn footprint_clear(&self, min_tx: i32, min_ty: i32, max_tx: i32, max_ty: i32) -> bool {
        for ty in min_ty..=max_ty {
            for tx in min_tx..=max_tx {
                if self.is_blocked(tx, ty) {
                    return false;
                }
            }
        }
        true
    }
}

/// Rebuilds the collision grid from live buildings, invalidating the path
/// cache (§4.3) whenever the rebuilt blocked-tile set actually differs from
/// the previous tick's -- a plain unconditional invalidate would defeat the
/// TTL cache every single tick, since this system runs every tick whether
/// or not a building was placed, sold, or destroyed.
pub fn collision_grid_update_system(
    mut grid: ResMut<CollisionGrid>,
    mut cache: ResMut<crate::pathfinding::PathCache>,
    buildings: Query<(&crate::components::Position, &crate::components::BoundingBox, &crate::components::Hp)>,
) {
    let previous = grid.cells.clone();
    grid.clear();
    for (pos, bbox, hp) in buildings.iter() {
        if !hp.is_alive() {
            continue;
        }
        let half_w = bbox.width / 2.0;
        let half_h = bbox.height / 2.0;
        let (min_tx, min_ty) = CollisionGrid::world_to_tile(pos.x - half_w, pos.y - half_h);
        let (max_tx, max_ty) = CollisionGrid::world_to_tile(pos.x + half_w, pos.y + half_h);
        grid.stamp(min_tx, min_ty, max_tx, max_ty);
    }
    if grid.cells != previous {
        cache.invalidate_all();
    }
}

// ---------------------------------------------------------------------
// Per-player danger grid: scalar coverage from enemy defense ranges,
// added to A* tile cost.
// ---------------------------------------------------------------------

#[derive(Resource, Debug, Default)]
pub struct DangerGrids {
    pub width: usize,
    pub height: usize,
    per_player: HashMap<PlayerId, Vec<f32>>,
}

impl DangerGrids {
    pub fn ensure_shape(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
    }

    pub fn clear(&mut self) {
        for grid in self.per_player.values_mut() {
            grid.iter_mut().for_each(|v| *v = 0.0);
        }
    }

    pub fn danger_at(&self, player: PlayerId, tx: i32, ty: i32) -> f32 {
        if tx < 0 || ty < 0 {
            return 0.0;
        }
        let (tx, ty) = (tx as usize, ty as usize);
        if tx >= self.width || ty >= self.height {
            return 0.0;
        }
        self.per_player
            .get(&player)
            .map(|g| g[ty * self.width + tx])
            .unwrap_or(0.0)
    }

    fn grid_mut(&mut self, player: PlayerId) -> &mut Vec<f32> {
        let size = self.width * self.height;
        self.per_player.entry(player).or_insert_with(|| vec![0.0; size])
    }

    pub fn add_coverage(&mut self, defender: PlayerId, center_tx: i32, center_ty: i32, radius_tiles: i32, weight: f32) {
        let (width, height) = (self.width, self.height);
        let grid = self.grid_mut(defender);
        for ty in (center_ty - radius_tiles).max(0)..(center_ty + radius_tiles + 1).min(height as i32) {
            for tx in (center_tx - radius_tiles).max(0)..(center_tx + radius_tiles + 1).min(width as i32) {
                let d = (((tx - center_tx).pow(2) + (ty - center_ty).pow(2)) as f32).sqrt();
                if d <= radius_tiles as f32 {
                    grid[ty as usize * width + tx as usize] += weight;
                }
            }
        }
    }
}

/// Rebuilds all players' danger grids from live defense buildings. Danger
/// is stamped for every *other* player than the defender owns it, since
/// it is a hazard for everyone except its owner. Also invalidates the path
/// cache (§4.3) when the rebuilt coverage actually differs from last tick's
/// -- see `collision_grid_update_system` for why this isn't unconditional.
pub fn danger_grid_update_system(
    mut grids: ResMut<DangerGrids>,
    collision: Res<CollisionGrid>,
    ruleset: Res<crate::ruleset::Ruleset>,
    players: Res<crate::systems::production::Players>,
    mut cache: ResMut<crate::pathfinding::PathCache>,
    defenses: Query<(
        &crate::components::Position,
        &crate::components::Owner,
        &crate::components::RuleKey,
        &crate::components::Hp,
    )>,
) {
    let previous = grids.per_player.clone();
    grids.ensure_shape(collision.width, collision.height);
    grids.clear();
    for (pos, owner, rule_key, hp) in defenses.iter() {
        if !hp.is_alive() {
            continue;
        }
        let Some(owner) = owner.0 else { continue };
        let Some(rule) = ruleset.building(&rule_key.0) else { continue };
        if !rule.is_defense {
            continue;
        }
        let Some(weapon) = &rule.weapon else { continue };
        let (ctx, cty) = CollisionGrid::world_to_tile(pos.x, pos.y);
        let radius_tiles = (weapon.range / TILE).ceil() as i32;
        for &other in players.0.keys() {
            if other != owner {
                grids.add_coverage(other, ctx, cty, radius_tiles, 1.0);
            }
        }
    }
    if grids.per_player != previous {
        cache.invalidate_all();
    }
}
