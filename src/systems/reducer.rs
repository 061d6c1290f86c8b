//! The command reducer: turns every non-`Tick` [`crate::action::Action`]
//! into either an intent mutation or a no-op, per §7's error taxonomy.
//! None of these functions are wired into the `Schedule` -- they are
//! called directly from [`crate::api::SimWorld::step`], since each one
//! needs the specific borrow shape of the action it handles.

use crate::action::{Action, SimEvent};
use crate::components::*;
use crate::error::{CommandError, PlacementError, ProductionError};
use crate::grid::CollisionGrid;
use crate::ids::{EntityDirectory, EntityId, EntityIdAllocator};
use crate::player::{cancel_production, queue_production};
use crate::ruleset::Ruleset;
use crate::systems::production::Players;
use crate::world::SimClock;
use bevy_ecs::prelude::*;
use log::warn;

pub fn apply_action(world: &mut World, action: Action) {
    match action {
        Action::Tick => unreachable!("Tick is handled by SimWorld::step before reaching the reducer"),
        Action::StartBuild { player, category, key } => {
            let result = world.resource_scope(|world, mut players: Mut<Players>| {
                let ruleset = world.resource::<Ruleset>();
                let Some(record) = players.0.get_mut(&player) else {
                    return Err(CommandError::UnknownPlayer(player));
                };
                queue_production(record, category, &key, ruleset).map_err(|e| {
                    warn!("start_build rejected: {e}");
                    CommandError::WrongState(EntityId(0))
                })
            });
            if result.is_ok() {
                world.resource_mut::<crate::action::EventLog>().push(SimEvent::ProductionStarted { player, category, key });
            } else {
                record_rejection(world, "start_build rejected");
            }
        }
        Action::CancelBuild { player, category } => {
            let result = world.resource_scope(|_world, mut players: Mut<Players>| {
                let Some(record) = players.0.get_mut(&player) else {
                    return Err(ProductionError::UnknownKey(String::new()));
                };
                cancel_production(record, category)
            });
            match result {
                Ok(refund) => world.resource_mut::<crate::action::EventLog>().push(SimEvent::ProductionCancelled { player, category, refund }),
                Err(_) => record_rejection(world, "cancel_build rejected: nothing queued"),
            }
        }
        Action::PlaceBuilding { player, x, y } => place_building(world, player, x, y),
        Action::SellBuilding { player, building } => sell_building(world, player, building),
        Action::StartRepair { player, building } => set_repair(world, player, building, true),
        Action::StopRepair { player, building } => set_repair(world, player, building, false),
        Action::CommandMove { units, x, y } => command_move(world, &units, x, y),
        Action::CommandAttack { units, target } => command_attack(world, &units, target),
        Action::CommandAttackMove { units, x, y } => command_attack_move(world, &units, x, y),
        Action::SetStance { units, stance } => set_stance(world, &units, stance),
        Action::DeployMcv { unit } => deploy_mcv(world, unit),
        Action::DeployInductionRig { unit, well } => deploy_induction_rig(world, unit, well),
        Action::SetRallyPoint { building, x, y } => set_rally_point(world, building, x, y),
        Action::SetPrimaryBuilding { building } => set_primary_building(world, building),
    }
}

fn record_rejection(world: &mut World, reason: &str) {
    world.resource_mut::<crate::action::EventLog>().push(SimEvent::CommandRejected { reason: reason.to_string() });
}

fn resolve(world: &World, id: EntityId) -> Option<Entity> {
    world.resource::<EntityDirectory>().resolve(id)
}

fn place_building(world: &mut World, player: crate::ids::PlayerId, x: f32, y: f32) {
    let result: Result<(String, Entity), PlacementError> = (|| {
        let has_conyard = {
            let mut query = world.query::<(&Owner, &RuleKey, &EntityKind)>();
            query
                .iter(world)
                .any(|(owner, key, kind)| owner.0 == Some(player) && kind.0 == Kind::Building && key.0 == "conyard")
        };
        if !has_conyard {
            return Err(PlacementError::NoConyard);
        }

        let ready_key = {
            let players = world.resource::<Players>();
            players.0.get(&player).and_then(|p| p.building_queue.ready_to_place.clone())
        }
        .ok_or(PlacementError::NothingReady)?;

        let ruleset = world.resource::<Ruleset>();
        let rule = ruleset.building(&ready_key).ok_or(PlacementError::NothingReady)?.clone();
        let build_radius = ruleset.build_radius;
        let (min_tx, min_ty) = CollisionGrid::world_to_tile(x - rule.width_tiles as f32 * 20.0, y - rule.height_tiles as f32 * 20.0);
        let (max_tx, max_ty) = CollisionGrid::world_to_tile(x + rule.width_tiles as f32 * 20.0, y + rule.height_tiles as f32 * 20.0);

        {
            let collision = world.resource::<CollisionGrid>();
            if !collision.footprint_clear(min_tx, min_ty, max_tx, max_ty) {
                return Err(PlacementError::Blocked);
            }
        }

        let in_range = {
            let mut query = world.query::<(&Owner, &Position, &EntityKind)>();
            query.iter(world).any(|(owner, pos, kind)| {
                owner.0 == Some(player)
                    && kind.0 == Kind::Building
                    && pos.distance(&Position::new(x, y)) <= build_radius
            })
        };
        if !in_range {
            return Err(PlacementError::OutOfRange);
        }

        let tick = world.resource::<SimClock>().tick;
        let id = world.resource_mut::<EntityIdAllocator>().next();
        let pos = Position::new(x, y);
        let entity = world
            .spawn(BuildingBundle {
                header: HeaderBundle {
                    id: Id(id),
                    owner: Owner(Some(player)),
                    kind: EntityKind(Kind::Building),
                    rule_key: RuleKey(ready_key.clone()),
                    position: pos,
                    previous_position: PreviousPosition(pos),
                    hp: Hp::new(rule.max_hp),
                    bbox: BoundingBox {
                        width: rule.width_tiles as f32 * crate::grid::TILE,
                        height: rule.height_tiles as f32 * crate::grid::TILE,
                        collision_radius: 0.0,
                    },
                    dead: Dead(false),
                },
                state: BuildingState {
                    is_repairing: false,
                    placed_tick: tick,
                    rally_point: None,
                    primary_for_category: rule.is_producer_for,
                },
            })
            .id();
        world.resource_mut::<EntityDirectory>().register(id, entity);

        {
            let mut players = world.resource_mut::<Players>();
            if let Some(p) = players.0.get_mut(&player) {
                p.building_queue.ready_to_place = None;
                p.power_capacity += rule.power_capacity;
                p.power_drawn += rule.power_draw;
            }
        }
        Ok((ready_key, entity))
    })();

    match result {
        Ok((key, entity)) => {
            let id = world.get::<Id>(entity).map(|i| i.0).unwrap_or(EntityId(0));
            world.resource_mut::<crate::action::EventLog>().push(SimEvent::BuildingPlaced { player, building: id, key });
        }
        Err(e) => record_rejection(world, &format!("place_building rejected: {e}")),
    }
}

fn sell_building(world: &mut World, player: crate::ids::PlayerId, building: EntityId) {
    let Some(entity) = resolve(world, building) else {
        record_rejection(world, "sell_building: unknown entity");
        return;
    };
    let Some(owner) = world.get::<Owner>(entity).copied() else { return };
    if owner.0 != Some(player) {
        record_rejection(world, "sell_building: not owned by player");
        return;
    }
    let rule_key = world.get::<RuleKey>(entity).map(|k| k.0.clone()).unwrap_or_default();
    let ruleset = world.resource::<Ruleset>();
    let Some(rule) = ruleset.building(&rule_key).cloned() else { return };
    let hp = world.get::<Hp>(entity).copied().unwrap_or(Hp::new(1.0));
    let refund = (rule.sell_refund_fraction * rule.cost as f32 * (hp.current / hp.max)).round() as u32;

    if let Some(mut hp_mut) = world.get_mut::<Hp>(entity) {
        hp_mut.current = 0.0;
    }
    if let Some(mut dead) = world.get_mut::<Dead>(entity) {
        dead.0 = true;
    }
    {
        let mut players = world.resource_mut::<Players>();
        if let Some(p) = players.0.get_mut(&player) {
            p.credits += refund;
            p.power_capacity -= rule.power_capacity;
            p.power_drawn -= rule.power_draw;
        }
    }
    world.resource_mut::<crate::action::EventLog>().push(SimEvent::BuildingSold { player, building, refund });
}

fn set_repair(world: &mut World, player: crate::ids::PlayerId, building: EntityId, on: bool) {
    let Some(entity) = resolve(world, building) else { return };
    let owner = world.get::<Owner>(entity).copied();
    if owner != Some(Owner(Some(player))) {
        record_rejection(world, "repair: not owned by player");
        return;
    }
    if on {
        let hp = world.get::<Hp>(entity).copied();
        let players = world.resource::<Players>();
        let has_credits = players.0.get(&player).map(|p| p.credits > 0).unwrap_or(false);
        if hp.map(|h| h.current >= h.max).unwrap_or(true) || !has_credits {
            record_rejection(world, "repair: full hp or no credits");
            return;
        }
    }
    if let Some(mut state) = world.get_mut::<BuildingState>(entity) {
        state.is_repairing = on;
    }
}

fn command_move(world: &mut World, units: &[EntityId], x: f32, y: f32) {
    let dest = Position::new(x, y);
    for &unit_id in units {
        if let Some(entity) = resolve(world, unit_id) {
            if let Some(mut movement) = world.get_mut::<Movement>(entity) {
                movement.move_target = Some(dest);
                movement.final_dest = None;
                movement.path.clear();
                movement.manual_hold = true;
            }
            if let Some(mut harvester) = world.get_mut::<Harvester>(entity) {
                // A direct move order overrides the harvest FSM until it
                // resolves; harvester.rs clears this once the order is
                // done, handing control back to the economic role.
                harvester.manual_mode = true;
            }
            if let Some(mut combat) = world.get_mut::<Combat>(entity) {
                combat.attack_move_target = None;
            }
        }
    }
}

fn command_attack(world: &mut World, units: &[EntityId], target: EntityId) {
    for &unit_id in units {
        if let Some(entity) = resolve(world, unit_id) {
            if let Some(mut combat) = world.get_mut::<Combat>(entity) {
                combat.target_id = Some(target);
            }
        }
    }
}

fn command_attack_move(world: &mut World, units: &[EntityId], x: f32, y: f32) {
    let dest = Position::new(x, y);
    for &unit_id in units {
        if let Some(entity) = resolve(world, unit_id) {
            if let Some(mut movement) = world.get_mut::<Movement>(entity) {
                movement.move_target = Some(dest);
                movement.final_dest = None;
                movement.path.clear();
            }
            if let Some(mut combat) = world.get_mut::<Combat>(entity) {
                combat.attack_move_target = Some(dest);
                combat.stance = Stance::Aggressive;
            }
        }
    }
}

fn set_stance(world: &mut World, units: &[EntityId], stance: Stance) {
    for &unit_id in units {
        if let Some(entity) = resolve(world, unit_id) {
            if let Some(mut combat) = world.get_mut::<Combat>(entity) {
                combat.stance = stance;
            }
        }
    }
}

fn deploy_mcv(world: &mut World, unit: EntityId) {
    let Some(entity) = resolve(world, unit) else { return };
    let Some(rule_key) = world.get::<RuleKey>(entity).map(|k| k.0.clone()) else { return };
    if rule_key != "mcv" {
        record_rejection(world, "deploy_mcv: unit is not an mcv");
        return;
    }
    let Some(pos) = world.get::<Position>(entity).copied() else { return };
    let Some(owner) = world.get::<Owner>(entity).and_then(|o| o.0) else { return };
    let already_has_conyard = {
        let mut query = world.query::<(&Owner, &RuleKey, &EntityKind)>();
        query.iter(world).any(|(o, k, kind)| o.0 == Some(owner) && kind.0 == Kind::Building && k.0 == "conyard")
    };
    if already_has_conyard {
        record_rejection(world, "deploy_mcv: conyard already exists");
        return;
    }
    world.despawn(entity);
    let tick = world.resource::<SimClock>().tick;
    let id = world.resource_mut::<EntityIdAllocator>().next();
    let entity = world
        .spawn(BuildingBundle {
            header: HeaderBundle {
                id: Id(id),
                owner: Owner(Some(owner)),
                kind: EntityKind(Kind::Building),
                rule_key: RuleKey("conyard".into()),
                position: pos,
                previous_position: PreviousPosition(pos),
                hp: Hp::new(1000.0),
                bbox: BoundingBox { width: 120.0, height: 120.0, collision_radius: 0.0 },
                dead: Dead(false),
            },
            state: BuildingState {
                is_repairing: false,
                placed_tick: tick,
                rally_point: None,
                primary_for_category: Some(crate::ruleset::BuildCategory::Building),
            },
        })
        .id();
    world.resource_mut::<EntityDirectory>().register(id, entity);
}

fn deploy_induction_rig(world: &mut World, unit: EntityId, well: EntityId) {
    let (Some(unit_entity), Some(well_entity)) = (resolve(world, unit), resolve(world, well)) else {
        return;
    };
    let Some(pos) = world.get::<Position>(unit_entity).copied() else { return };
    let Some(owner) = world.get::<Owner>(unit_entity).and_then(|o| o.0) else { return };
    if world.get::<Well>(well_entity).is_none() {
        record_rejection(world, "deploy_induction_rig: target is not a well");
        return;
    }
    world.despawn(unit_entity);
    let tick = world.resource::<SimClock>().tick;
    let id = world.resource_mut::<EntityIdAllocator>().next();
    let entity = world
        .spawn((
            BuildingBundle {
                header: HeaderBundle {
                    id: Id(id),
                    owner: Owner(Some(owner)),
                    kind: EntityKind(Kind::Building),
                    rule_key: RuleKey("induction_rig".into()),
                    position: pos,
                    previous_position: PreviousPosition(pos),
                    hp: Hp::new(300.0),
                    bbox: BoundingBox { width: 60.0, height: 60.0, collision_radius: 0.0 },
                    dead: Dead(false),
                },
                state: BuildingState {
                    is_repairing: false,
                    placed_tick: tick,
                    rally_point: None,
                    primary_for_category: None,
                },
            },
            InductionRig { well_id: well, accumulated_fractional_credits: 0.0 },
        ))
        .id();
    world.resource_mut::<EntityDirectory>().register(id, entity);
}

fn set_rally_point(world: &mut World, building: EntityId, x: f32, y: f32) {
    if let Some(entity) = resolve(world, building) {
        if let Some(mut state) = world.get_mut::<BuildingState>(entity) {
            state.rally_point = Some(Position::new(x, y));
        }
    }
}

fn set_primary_building(world: &mut World, building: EntityId) {
    let Some(entity) = resolve(world, building) else { return };
    let category = world.get::<BuildingState>(entity).and_then(|s| s.primary_for_category);
    let Some(category) = category else { return };
    let owner = world.get::<Owner>(entity).and_then(|o| o.0);
    let mut query = world.query::<(&Owner, &mut BuildingState)>();
    for (owner_comp, mut state) in query.iter_mut(world) {
        if owner_comp.0 == owner && state.primary_for_category == Some(category) {
            state.primary_for_category = None;
        }
    }
    if let Some(mut state) = world.get_mut::<BuildingState>(entity) {
        state.primary_for_category = Some(category);
    }
}
