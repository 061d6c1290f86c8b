//! Stage 7: building update -- repair drain, rally-point dispatch on
//! spawn, well ore spawn, induction rig income, and air-base reload
//! (§4.7, §4.8). Turret/defense firing is handled generically by
//! [`crate::systems::combat`] since defense buildings carry the same
//! `Combat` component as units.

use crate::action::SimEvent;
use crate::components::*;
use crate::ids::PlayerId;
use crate::ruleset::Ruleset;
use bevy_ecs::prelude::*;

const REPAIR_CREDIT_FRACTION: f32 = 0.30;
const INDUCTION_RIG_EFFICIENCY: f32 = 0.8;

/// Materializes a unit entity for every `(player, category, key)` the
/// production system finished this tick, spawned near any producing
/// building of that category the player still owns. Stage 8 runs after
/// stage 2's production system so a unit completed this tick appears
/// the same tick it finishes.
pub fn spawn_pending_units_system(
    mut commands: Commands,
    ruleset: Res<Ruleset>,
    mut pending: ResMut<crate::systems::production::PendingSpawns>,
    mut id_alloc: ResMut<crate::ids::EntityIdAllocator>,
    mut id_dir: ResMut<crate::ids::EntityDirectory>,
    producers: Query<(&Owner, &Position, &BuildingState)>,
) {
    for (player_id, category, key) in pending.units_ready.drain(..) {
        let Some(rule) = ruleset.unit(&key) else { continue };
        let spawn_pos = producers
            .iter()
            .find(|(owner, _, state)| owner.0 == Some(player_id) && state.primary_for_category == Some(category))
            .map(|(_, pos, _)| Position::new(pos.x + 60.0, pos.y + 60.0))
            .unwrap_or_default();

        let id = id_alloc.next();
        let header = HeaderBundle {
            id: Id(id),
            owner: Owner(Some(player_id)),
            kind: EntityKind(Kind::Unit),
            rule_key: RuleKey(key.clone()),
            position: spawn_pos,
            previous_position: PreviousPosition(spawn_pos),
            hp: Hp::new(rule.max_hp),
            bbox: BoundingBox { width: rule.collision_radius * 2.0, height: rule.collision_radius * 2.0, collision_radius: rule.collision_radius },
            dead: Dead(false),
        };
        let mobile = MobileUnitBundle { header, velocity: Velocity::default(), movement: Movement::default() };

        let entity = if rule.weapon.is_some() {
            commands.spawn(CombatUnitBundle { mobile, combat: Combat { stance_home: spawn_pos, ..Default::default() } }).id()
        } else {
            commands.spawn(mobile).id()
        };
        id_dir.register(id, entity);

        if rule.is_harvester {
            commands.entity(entity).insert(Harvester {
                capacity: rule.harvester_capacity,
                gather_rate: rule.harvester_gather_rate,
                ..Default::default()
            });
        }
        if rule.is_engineer {
            commands.entity(entity).insert(Engineer::default());
        }
        if rule.is_demo_truck {
            commands.entity(entity).insert(DemoTruck::default());
        }
        if rule.is_air {
            commands.entity(entity).insert(AirUnit {
                ammo: 1,
                max_ammo: 1,
                fsm_state: AirFsmState::Docked,
                home_base_id: None,
                docked_slot: None,
            });
        }
    }
}

pub fn repair_system(
    ruleset: Res<Ruleset>,
    mut players: ResMut<crate::systems::production::Players>,
    mut query: Query<(&Owner, &RuleKey, &mut Hp, &mut BuildingState)>,
) {
    for (owner, rule_key, mut hp, mut state) in query.iter_mut() {
        if !state.is_repairing {
            continue;
        }
        if hp.current >= hp.max {
            state.is_repairing = false;
            continue;
        }
        let Some(owner_id) = owner.0 else {
            state.is_repairing = false;
            continue;
        };
        let Some(player) = players.0.get_mut(&owner_id) else {
            state.is_repairing = false;
            continue;
        };
        let Some(rule) = ruleset.building(&rule_key.0) else { continue };
        let duration = rule.repair_duration_ticks.max(1) as f32;
        let tick_cost = (REPAIR_CREDIT_FRACTION * rule.cost as f32 / duration).ceil() as u32;
        if player.credits < tick_cost || tick_cost == 0 {
            state.is_repairing = false;
            continue;
        }
        player.credits -= tick_cost;
        hp.apply_heal(rule.max_hp / duration);
    }
}

/// Dispatches freshly spawned units to their producing building's rally
/// point, if one is set.
pub fn rally_dispatch_system(mut pending: ResMut<crate::systems::production::PendingSpawns>, rally_points: Query<(&Owner, &BuildingState)>, mut spawned_units: Query<(&Owner, &mut Movement), With<Combat>>) {
    // Units are spawned by `api::SimWorld` directly from `pending`; this
    // system only assigns a move order once a fresh unit with no order
    // yet exists for a player that has a rally point set.
    let rally_by_owner: std::collections::HashMap<PlayerId, Position> = rally_points
        .iter()
        .filter_map(|(owner, state)| owner.0.zip(state.rally_point))
        .collect();

    for (owner, mut movement) in spawned_units.iter_mut() {
        if movement.final_dest.is_some() || movement.move_target.is_some() {
            continue;
        }
        if let Some(owner_id) = owner.0 {
            if let Some(&rally) = rally_by_owner.get(&owner_id) {
                movement.final_dest = Some(rally);
            }
        }
    }
    pending.units_ready.clear();
}

pub fn well_spawn_system(
    clock: Res<crate::world::SimClock>,
    ruleset: Res<Ruleset>,
    spatial: Res<crate::grid::SpatialGrid>,
    mut commands: Commands,
    mut id_alloc: ResMut<crate::ids::EntityIdAllocator>,
    mut wells: Query<(&Position, &mut Well)>,
) {
    for (pos, mut well) in wells.iter_mut() {
        if clock.tick < well.next_spawn_tick {
            continue;
        }
        well.next_spawn_tick = clock.tick + ruleset.well_spawn_period_ticks as u64;
        if well.current_ore_count >= ruleset.well_max_ore {
            continue;
        }
        let offsets = [(-1, -1), (0, -1), (1, -1), (-1, 0), (1, 0), (-1, 1), (0, 1), (1, 1)];
        let spawn_pos = offsets.iter().map(|(dx, dy)| Position::new(pos.x + *dx as f32 * crate::grid::TILE, pos.y + *dy as f32 * crate::grid::TILE)).find(|candidate| spatial.query_radius(candidate.x, candidate.y, 16.0).is_empty());

        match spawn_pos {
            Some(spawn_pos) => {
                let id = id_alloc.next();
                commands.spawn(ResourceBundle {
                    header: HeaderBundle {
                        id: Id(id),
                        owner: Owner(None),
                        kind: EntityKind(Kind::Resource),
                        rule_key: RuleKey("ore".into()),
                        position: spawn_pos,
                        previous_position: PreviousPosition(spawn_pos),
                        hp: Hp::new(150.0),
                        bbox: BoundingBox { width: 16.0, height: 16.0, collision_radius: 8.0 },
                        dead: Dead(false),
                    },
                });
                well.current_ore_count += 1;
                well.total_spawned += 1;
                well.is_blocked = false;
            }
            None => well.is_blocked = true,
        }
    }
}

pub fn induction_rig_system(mut players: ResMut<crate::systems::production::Players>, mut rigs: Query<(&Owner, &mut InductionRig)>) {
    for (owner, mut rig) in rigs.iter_mut() {
        let Some(owner_id) = owner.0 else { continue };
        let Some(player) = players.0.get_mut(&owner_id) else { continue };
        rig.accumulated_fractional_credits += 10.0 * INDUCTION_RIG_EFFICIENCY;
        let whole = rig.accumulated_fractional_credits.floor();
        if whole >= 1.0 {
            player.credits += whole as u32;
            rig.accumulated_fractional_credits -= whole;
        }
    }
}

const CREDITS_PER_CARGO_UNIT: f32 = 1.0;

/// Converts a docked harvester's cargo into credits for its owner, then
/// drains the cargo so [`crate::systems::harvester::harvester_system`]
/// can cycle it back to `Idle` on the next tick.
pub fn refinery_payout_system(mut players: ResMut<crate::systems::production::Players>, mut harvesters: Query<(&Owner, &mut Harvester)>) {
    for (owner, mut harvester) in harvesters.iter_mut() {
        if harvester.state != HarvesterState::Docked || harvester.cargo <= 0.0 {
            continue;
        }
        let Some(owner_id) = owner.0 else { continue };
        let Some(player) = players.0.get_mut(&owner_id) else { continue };
        player.credits += (harvester.cargo * CREDITS_PER_CARGO_UNIT) as u32;
        harvester.cargo = 0.0;
    }
}

pub fn air_base_system(clock: Res<crate::world::SimClock>, mut bases: Query<(Entity, &mut AirBase)>, mut air_units: Query<(&Id, &mut AirUnit)>) {
    for (_entity, mut base) in bases.iter_mut() {
        for slot in 0..6 {
            let Some(unit_id) = base.slots[slot] else { continue };
            let Some((_, mut air_unit)) = air_units.iter_mut().find(|(id, _)| id.0 == unit_id) else { continue };
            if air_unit.fsm_state != AirFsmState::Docked {
                continue;
            }
            if air_unit.ammo >= air_unit.max_ammo {
                continue;
            }
            base.reload_progress[slot] += 1;
            if base.reload_progress[slot] >= 40 {
                air_unit.ammo = air_unit.max_ammo;
                base.reload_progress[slot] = 0;
            }
        }
        let _ = clock.tick;
    }
}

pub fn doomed_player_elimination_system(
    mut players: ResMut<crate::systems::production::Players>,
    mut events: ResMut<crate::action::EventLog>,
    owners: Query<(&Owner, &EntityKind, &RuleKey, &Hp)>,
    mut all_owned: Query<(&Owner, &mut Hp)>,
) {
    let mut has_conyard_or_mcv: std::collections::HashSet<PlayerId> = std::collections::HashSet::new();
    for (owner, kind, rule_key, hp) in owners.iter() {
        if !hp.is_alive() {
            continue;
        }
        let Some(owner_id) = owner.0 else { continue };
        if (kind.0 == Kind::Building && rule_key.0 == "conyard") || (kind.0 == Kind::Unit && rule_key.0 == "mcv") {
            has_conyard_or_mcv.insert(owner_id);
        }
    }

    let mut newly_eliminated: std::collections::HashSet<PlayerId> = std::collections::HashSet::new();
    for (&player_id, player) in players.0.iter_mut() {
        if player.eliminated {
            continue;
        }
        if !has_conyard_or_mcv.contains(&player_id) {
            player.eliminated = true;
            player.building_queue.clear();
            player.infantry_queue.clear();
            player.vehicle_queue.clear();
            player.air_queue.clear();
            newly_eliminated.insert(player_id);
            events.push(SimEvent::PlayerEliminated { player: player_id });
        }
    }

    if newly_eliminated.is_empty() {
        return;
    }
    // A doomed player has no way left to produce or recover; everything
    // still standing under their flag goes down with the base.
    for (owner, mut hp) in all_owned.iter_mut() {
        if owner.0.is_some_and(|p| newly_eliminated.contains(&p)) {
            hp.current = 0.0;
        }
    }
}
