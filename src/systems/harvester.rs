//! Stage 6 (part): the harvester/docking FSM (§4.5), grounded in this
//! lineage's `GameHarvesterState`/`GameHarvester` components (idle /
//! moving-to-node / gathering / returning / depositing), adapted to the
//! spec's five-state idle/seeking/harvesting/returning/docked cycle and
//! its queueing-at-shared-destinations rule.

use crate::components::*;
use crate::grid::SpatialGrid;
use crate::ids::EntityId;
use bevy_ecs::prelude::*;

const HARVEST_RADIUS: f32 = 30.0;
const GIVE_UP_TICKS: u32 = 200;
const SEARCH_RADIUS: f32 = 1200.0;
const DOCK_STANDOFF_RADIUS: f32 = 50.0;
const FLEE_DANGER_RADIUS: f32 = 260.0;
const FLEE_COOLDOWN_TICKS: u64 = 150;
const MOVE_TARGET_CLEAR_RADIUS: f32 = 30.0;
const FLEE_TIMEOUT: u32 = 180;

pub fn harvester_system(
    clock: Res<crate::world::SimClock>,
    spatial: Res<SpatialGrid>,
    mut resources: Query<(&Id, &Position, &mut Hp), Without<Harvester>>,
    docks: Query<(&Id, &Position, &Owner), (With<BuildingState>, Without<Harvester>)>,
    mut harvesters: Query<(&Id, &Owner, &mut Position, &mut Movement, &mut Harvester)>,
) {
    let tick = clock.tick;

    // Snapshot dock candidates and ore candidates up front; both sets are
    // small relative to the unit count and are re-read per harvester.
    let dock_candidates: Vec<(EntityId, Position, crate::ids::PlayerId)> = docks
        .iter()
        .filter_map(|(id, pos, owner)| owner.0.map(|o| (id.0, *pos, o)))
        .collect();

    let ore_candidates: Vec<(EntityId, Position)> = resources
        .iter_mut()
        .map(|(id, pos, _)| (id.0, *pos))
        .collect();

    // Rank units already closing on each dock by distance, so exactly one
    // (the closest) is the head of the queue and moves all the way in;
    // the rest hold at a standoff ring until it docks and clears.
    let mut dock_queues: std::collections::HashMap<EntityId, Vec<(EntityId, f32)>> = std::collections::HashMap::new();
    for (id, _, pos, movement, harvester) in harvesters.iter_mut() {
        if harvester.state == HarvesterState::Returning && !movement.manual_hold {
            if let (Some(base), Some(dock_pos)) = (harvester.base_target_id, harvester.dock_pos) {
                dock_queues.entry(base).or_default().push((id.0, pos.distance(&dock_pos)));
            }
        }
    }
    let mut head_by_unit: std::collections::HashMap<EntityId, bool> = std::collections::HashMap::new();
    for queue in dock_queues.values_mut() {
        queue.sort_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        for (rank, (unit_id, _)) in queue.iter().enumerate() {
            head_by_unit.insert(*unit_id, rank == 0);
        }
    }

    for (id, owner, mut pos, mut movement, mut harvester) in harvesters.iter_mut() {
        if harvester.manual_mode {
            // A player-issued move order overrides the FSM until it
            // resolves (arrival, or cleared below by the stall check);
            // once there is nothing left to steer toward, hand control
            // back to the economic role per §4.5's flee/manual-move note.
            let order_resolved = movement.move_target.is_none() && movement.final_dest.is_none() && movement.path.is_empty();
            if !order_resolved {
                continue;
            }
            harvester.manual_mode = false;
            movement.manual_hold = false;
        }

        // Threat-flee check takes priority unless already returning with
        // a full load (full harvesters keep heading to the dock).
        if harvester.state != HarvesterState::Returning || harvester.cargo < harvester.capacity {
            if harvester.flee_cooldown_until <= tick {
                let danger = owner.0.map(|o| spatial.query_enemies(pos.x, pos.y, FLEE_DANGER_RADIUS, Some(o)));
                if danger.map(|d| !d.is_empty()).unwrap_or(false) {
                    let flee_to = Position::new(pos.x - 80.0, pos.y - 80.0);
                    movement.move_target = Some(flee_to);
                    movement.final_dest = None;
                    movement.path.clear();
                    harvester.flee_cooldown_until = tick + FLEE_COOLDOWN_TICKS;
                    harvester.stalled_ticks = 0;
                    continue;
                }
            }
            if movement.move_target.is_some() && movement.final_dest.is_none() {
                harvester.stalled_ticks += 1;
                if harvester.stalled_ticks > FLEE_TIMEOUT
                    || pos.distance(&movement.move_target.unwrap()) < MOVE_TARGET_CLEAR_RADIUS
                {
                    movement.move_target = None;
                    movement.manual_hold = false;
                    harvester.manual_mode = false;
                    harvester.stalled_ticks = 0;
                }
                continue;
            }
        }

        match harvester.state {
            HarvesterState::Idle => {
                if let Some((ore_id, ore_pos)) = nearest_unblocked_ore(&ore_candidates, &harvester, *pos) {
                    harvester.resource_target_id = Some(ore_id);
                    harvester.best_dist_to_ore = pos.distance(&ore_pos);
                    harvester.harvest_attempts = 0;
                    movement.final_dest = Some(ore_pos);
                    harvester.state = HarvesterState::Seeking;
                }
            }
            HarvesterState::Seeking => {
                let Some(ore_id) = harvester.resource_target_id else {
                    harvester.state = HarvesterState::Idle;
                    continue;
                };
                let Some(&(_, ore_pos)) = ore_candidates.iter().find(|(id, _)| *id == ore_id) else {
                    harvester.blocked_ore_ids.push(ore_id);
                    harvester.resource_target_id = None;
                    harvester.state = HarvesterState::Idle;
                    continue;
                };
                let d = pos.distance(&ore_pos);
                if d < harvester.best_dist_to_ore {
                    harvester.best_dist_to_ore = d;
                    harvester.harvest_attempts = 0;
                } else {
                    harvester.harvest_attempts += 1;
                }
                if harvester.harvest_attempts > GIVE_UP_TICKS {
                    harvester.blocked_ore_ids.push(ore_id);
                    harvester.resource_target_id = None;
                    harvester.state = HarvesterState::Idle;
                    continue;
                }
                if d < HARVEST_RADIUS {
                    harvester.state = HarvesterState::Harvesting;
                }
            }
            HarvesterState::Harvesting => {
                let Some(ore_id) = harvester.resource_target_id else {
                    harvester.state = HarvesterState::Idle;
                    continue;
                };
                let still_there = resources.iter_mut().find(|(id, _, _)| id.0 == ore_id);
                match still_there {
                    Some((_, _, mut ore_hp)) if ore_hp.is_alive() => {
                        let gathered = harvester.gather_rate.min(harvester.capacity - harvester.cargo);
                        harvester.cargo += gathered;
                        ore_hp.apply_damage(gathered);
                        if harvester.cargo >= harvester.capacity {
                            harvester.state = HarvesterState::Returning;
                            harvester.resource_target_id = None;
                        }
                    }
                    _ => {
                        harvester.resource_target_id = None;
                        harvester.state = HarvesterState::Idle;
                    }
                }
            }
            HarvesterState::Returning => {
                if harvester.base_target_id.is_none() {
                    if let Some((dock_id, dock_pos, _)) = dock_candidates
                        .iter()
                        .filter(|(_, _, o)| Some(*o) == owner.0)
                        .min_by(|(_, a, _), (_, b, _)| {
                            pos.distance(a).partial_cmp(&pos.distance(b)).unwrap_or(std::cmp::Ordering::Equal)
                        })
                    {
                        harvester.base_target_id = Some(*dock_id);
                        harvester.dock_pos = Some(*dock_pos);
                    }
                }
                let Some(dock_pos) = harvester.dock_pos else {
                    harvester.state = HarvesterState::Idle;
                    continue;
                };
                let is_head = head_by_unit.get(&id.0).copied().unwrap_or(true);
                let approach_target = if is_head {
                    dock_pos
                } else {
                    let dx = pos.x - dock_pos.x;
                    let dy = pos.y - dock_pos.y;
                    let len = (dx * dx + dy * dy).sqrt().max(1.0);
                    Position::new(
                        dock_pos.x + dx / len * DOCK_STANDOFF_RADIUS,
                        dock_pos.y + dy / len * DOCK_STANDOFF_RADIUS,
                    )
                };
                movement.final_dest = Some(approach_target);
                if pos.distance(&dock_pos) < HARVEST_RADIUS {
                    harvester.state = HarvesterState::Docked;
                }
            }
            HarvesterState::Docked => {
                // Credits transfer happens in the building system, which
                // has access to the player's credit ledger; here we only
                // signal completion by zeroing cargo next tick once the
                // building system has observed it (handled there via the
                // harvester's `cargo` field directly).
                if harvester.cargo <= 0.0 {
                    harvester.base_target_id = None;
                    harvester.dock_pos = None;
                    harvester.state = HarvesterState::Idle;
                }
            }
        }
        let _ = id;
        let _ = pos.as_ref();
    }
}

fn nearest_unblocked_ore(
    candidates: &[(EntityId, Position)],
    harvester: &Harvester,
    from: Position,
) -> Option<(EntityId, Position)> {
    candidates
        .iter()
        .filter(|(id, _)| !harvester.blocked_ore_ids.contains(id))
        .min_by(|(_, a), (_, b)| from.distance(a).partial_cmp(&from.distance(b)).unwrap_or(std::cmp::Ordering::Equal))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_unblocked_ore_skips_blocked_ids() {
        let mut harvester = Harvester::default();
        harvester.blocked_ore_ids.push(EntityId(1));
        let candidates = vec![
            (EntityId(1), Position::new(10.0, 0.0)),
            (EntityId(2), Position::new(50.0, 0.0)),
        ];
        let result = nearest_unblocked_ore(&candidates, &harvester, Position::new(0.0, 0.0));
        assert_eq!(result.unwrap().0, EntityId(2));
    }
}
