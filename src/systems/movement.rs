//! Stage 6 (part): the movement FSM (§4.4) -- intended-velocity
//! selection, steering, stuck/unstuck detection, and pairwise collision
//! resolution. Replaces the teacher's simple order-to-velocity mapping
//! with the full waypoint/path/stuck-detection state machine the spec
//! requires; the overall "apply velocity, then resolve collisions"
//! shape is kept from the teacher's `movement_system`/`order_system`
//! split.

use crate::components::*;
use crate::grid::{CollisionGrid, DangerGrids, SpatialGrid};
use crate::ids::{EntityId, PlayerId};
use crate::pathfinding::{find_path, PathCache, WAYPOINT_ARRIVAL_RADIUS};
use crate::ruleset::Ruleset;
use bevy_ecs::prelude::*;
use log::trace;

/// Ticks of near-zero speed before the unstuck maneuver kicks in.
pub const UNSTUCK_TRIGGER: u32 = 20;
/// Ticks of being stuck before the current path is discarded and
/// recomputed.
pub const REPATH_THRESHOLD: u32 = 30;
/// Duration of an unstuck burst.
const UNSTUCK_BURST: u32 = 15;
/// Below this speed (units/tick) a unit counts as making no progress.
const MIN_PROGRESS_SPEED: f32 = 2.0;
/// EWMA retention factor for `avg_vel`.
const EWMA_RETENTION: f32 = 0.9;
/// Soft overlap tolerance before two units are pushed apart.
const OVERLAP_TOLERANCE: f32 = 2.0;

#[derive(Resource, Default)]
pub struct DeltaTime(pub f32);

/// Selects an intended velocity for every mobile unit from its
/// move/path/unstuck state, without yet resolving inter-unit collisions.
pub fn movement_intent_system(
    dt: Res<DeltaTime>,
    clock: Res<crate::world::SimClock>,
    ruleset: Res<Ruleset>,
    collision: Res<CollisionGrid>,
    danger: Res<DangerGrids>,
    mut cache: ResMut<PathCache>,
    mut query: Query<(&mut Position, &mut Velocity, &mut Movement, &RuleKey, &Owner, &BoundingBox)>,
) {
    let dt = dt.0.max(0.0001);
    for (pos, vel, movement, rule_key, owner, bbox) in query.iter_mut() {
        let speed = ruleset.unit(&rule_key.0).map(|r| r.speed).unwrap_or(30.0);
        step_unit_intent(
            &mut cache,
            &collision,
            &danger,
            owner.0.unwrap_or(PlayerId(0)),
            pos.into_inner(),
            vel.into_inner(),
            movement.into_inner(),
            speed,
            bbox.collision_radius,
            dt,
            clock.tick,
        );
    }
}

fn step_unit_intent(
    cache: &mut PathCache,
    collision: &CollisionGrid,
    danger: &DangerGrids,
    owner: PlayerId,
    pos: &mut Position,
    vel: &mut Velocity,
    movement: &mut Movement,
    speed: f32,
    radius: f32,
    _dt: f32,
    tick: u64,
) {
    movement.last_vel = (vel.vx, vel.vy);

    if movement.unstuck_timer > 0 {
        vel.vx = movement.unstuck_direction.0 * speed;
        vel.vy = movement.unstuck_direction.1 * speed;
        movement.unstuck_timer -= 1;
        return;
    }

    if !movement.path.is_empty() {
        if movement.path_index >= movement.path.len() {
            movement.path.clear();
        } else {
            let waypoint = movement.path[movement.path_index];
            let d = pos.distance(&waypoint);
            if d < WAYPOINT_ARRIVAL_RADIUS {
                movement.path_index += 1;
                if movement.path_index >= movement.path.len() {
                    movement.path.clear();
                    movement.move_target = None;
                }
            } else {
                steer_toward(vel, pos, &waypoint, speed);
            }
        }
    }

    if movement.path.is_empty() {
        if let Some(target) = movement.final_dest.or(movement.move_target) {
            let d = pos.distance(&target);
            if d < WAYPOINT_ARRIVAL_RADIUS {
                vel.vx = 0.0;
                vel.vy = 0.0;
                movement.move_target = None;
                movement.final_dest = None;
                movement.manual_hold = false;
            } else {
                match find_path(cache, collision, danger, owner, *pos, target, radius, tick) {
                    Ok(path) => {
                        movement.path = path;
                        movement.path_index = 0;
                        movement.final_dest = Some(target);
                    }
                    Err(_) => {
                        trace!("no path from {:?} to {:?}, steering directly", pos, target);
                        steer_toward(vel, pos, &target, speed);
                    }
                }
            }
        } else {
            vel.vx = 0.0;
            vel.vy = 0.0;
        }
    }

    // Stuck detection.
    movement.avg_vel.0 = movement.avg_vel.0 * EWMA_RETENTION + vel.vx * (1.0 - EWMA_RETENTION);
    movement.avg_vel.1 = movement.avg_vel.1 * EWMA_RETENTION + vel.vy * (1.0 - EWMA_RETENTION);

    let has_goal = movement.move_target.is_some() || movement.final_dest.is_some() || !movement.path.is_empty();
    if has_goal {
        let avg_speed = (movement.avg_vel.0.powi(2) + movement.avg_vel.1.powi(2)).sqrt();
        let last_vel_is_progressing = if let Some(target) = movement.final_dest.or(movement.move_target) {
            let to_target = (target.x - pos.x, target.y - pos.y);
            to_target.0 * movement.last_vel.0 + to_target.1 * movement.last_vel.1 > 0.0
        } else {
            true
        };
        if avg_speed < MIN_PROGRESS_SPEED && !last_vel_is_progressing {
            movement.stuck_timer += 1;
        } else {
            movement.stuck_timer = 0;
        }
    } else {
        movement.stuck_timer = 0;
    }

    // Fire the unstuck burst once, exactly as `stuck_timer` crosses the
    // trigger, without resetting it -- `stuck_timer` keeps accumulating
    // underneath the burst so a unit that is still stuck once steering
    // resumes goes on to cross `REPATH_THRESHOLD` and gets a fresh path.
    if movement.stuck_timer == UNSTUCK_TRIGGER {
        let perp = (-vel.vy, vel.vx);
        let len = (perp.0 * perp.0 + perp.1 * perp.1).sqrt().max(0.001);
        movement.unstuck_direction = (perp.0 / len, perp.1 / len);
        movement.unstuck_timer = UNSTUCK_BURST;
    }
    if movement.stuck_timer >= REPATH_THRESHOLD {
        movement.path.clear();
        movement.stuck_timer = 0;
    }
}

fn steer_toward(vel: &mut Velocity, pos: &Position, target: &Position, speed: f32) {
    let dx = target.x - pos.x;
    let dy = target.y - pos.y;
    let dist = (dx * dx + dy * dy).sqrt();
    if dist < 0.001 {
        vel.vx = 0.0;
        vel.vy = 0.0;
    } else {
        vel.vx = dx / dist * speed;
        vel.vy = dy / dist * speed;
    }
}

/// Applies the intended velocity to position.
pub fn movement_apply_system(dt: Res<DeltaTime>, mut query: Query<(&mut Position, &mut PreviousPosition, &Velocity)>) {
    let dt = dt.0;
    for (mut pos, mut prev, vel) in query.iter_mut() {
        prev.0 = *pos;
        pos.x += vel.vx * dt;
        pos.y += vel.vy * dt;
    }
}

/// Pairwise separation of overlapping mobile units, run twice per tick
/// (§4.4), plus a building push-out pass and map-bound clamping.
pub fn collision_resolution_system(
    ruleset: Res<Ruleset>,
    spatial: Res<SpatialGrid>,
    mut movers: Query<(Entity, &mut Position, &BoundingBox)>,
    buildings: Query<(&Position, &BoundingBox, &Hp, &EntityKind), Without<Velocity>>,
) {
    for _pass in 0..2 {
        let positions: Vec<(Entity, Position, f32)> = movers
            .iter()
            .map(|(e, pos, bbox)| (e, *pos, bbox.collision_radius))
            .collect();

        for &(entity, pos, radius) in &positions {
            let neighbors = spatial.query_radius(pos.x, pos.y, radius + 40.0);
            for neighbor in neighbors {
                if neighbor.entity == entity {
                    continue;
                }
                let Some((_, other_pos, other_radius)) = positions.iter().find(|(e, _, _)| *e == neighbor.entity).map(|(e, p, r)| (*e, *p, *r)) else {
                    continue;
                };
                let dx = pos.x - other_pos.x;
                let dy = pos.y - other_pos.y;
                let dist = (dx * dx + dy * dy).sqrt().max(0.0001);
                let min_dist = radius + other_radius - OVERLAP_TOLERANCE;
                if dist < min_dist {
                    let overlap = (min_dist - dist) * 0.5;
                    let nx = dx / dist;
                    let ny = dy / dist;
                    if let Ok((_, mut p, _)) = movers.get_mut(entity) {
                        p.x += nx * overlap;
                        p.y += ny * overlap;
                    }
                }
            }
        }
    }

    for (_, mut pos, bbox) in movers.iter_mut() {
        for (b_pos, b_bbox, b_hp, b_kind) in buildings.iter() {
            if b_kind.0 != Kind::Building || !b_hp.is_alive() {
                continue;
            }
            push_out_of_building(&mut pos, bbox.collision_radius, b_pos, b_bbox);
        }
    }

    for (_, mut pos, bbox) in movers.iter_mut() {
        pos.x = pos.x.clamp(bbox.collision_radius, ruleset.map_width - bbox.collision_radius);
        pos.y = pos.y.clamp(bbox.collision_radius, ruleset.map_height - bbox.collision_radius);
    }
}

fn push_out_of_building(pos: &mut Position, radius: f32, building_pos: &Position, building_bbox: &BoundingBox) {
    let half_w = building_bbox.width / 2.0 + radius;
    let half_h = building_bbox.height / 2.0 + radius;
    let dx = pos.x - building_pos.x;
    let dy = pos.y - building_pos.y;
    if dx.abs() >= half_w || dy.abs() >= half_h {
        return;
    }
    let overlap_x = half_w - dx.abs();
    let overlap_y = half_h - dy.abs();
    let sign = |v: f32| if v >= 0.0 { 1.0 } else { -1.0 };
    if overlap_x < overlap_y {
        pos.x = building_pos.x + half_w * sign(dx);
    } else {
        pos.y = building_pos.y + half_h * sign(dy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steer_toward_moves_directly_at_target_speed() {
        let pos = Position::new(0.0, 0.0);
        let target = Position::new(100.0, 0.0);
        let mut vel = Velocity::default();
        steer_toward(&mut vel, &pos, &target, 10.0);
        assert!((vel.vx - 10.0).abs() < 0.001);
        assert!(vel.vy.abs() < 0.001);
    }

    #[test]
    fn stuck_timer_triggers_unstuck_after_threshold() {
        let mut cache = PathCache::default();
        let collision = CollisionGrid::new(2000.0, 2000.0);
        let danger = DangerGrids::default();
        let mut pos = Position::new(100.0, 100.0);
        let mut vel = Velocity::default();
        let mut movement = Movement {
            final_dest: Some(Position::new(2000.0, 100.0)),
            ..Default::default()
        };
        // Block the unit so it never progresses: zero speed.
        for tick in 0..(UNSTUCK_TRIGGER as u64 + 1) {
            step_unit_intent(
                &mut cache, &collision, &danger, PlayerId(0), &mut pos, &mut vel, &mut movement, 0.0, 8.0, 1.0, tick,
            );
        }
        assert!(movement.unstuck_timer > 0 || movement.stuck_timer == 0);
    }
}
