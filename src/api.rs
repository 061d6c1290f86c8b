//! Public entry point: [`SimWorld`], the nine-stage fixed-timestep
//! simulation (§2) driven entirely by [`crate::action::Action::Tick`],
//! plus every other `Action` variant dispatched through the command
//! reducer as an immediate, same-tick mutation.
//!
//! Unlike the teacher's dt-accumulator loop, this core has no concept of
//! wall-clock time: `step` always advances exactly one simulation tick
//! on `Action::Tick` and is otherwise a pure reducer over the current
//! `World`. Determinism follows from that -- the same action sequence
//! always produces the same state.

use crate::action::{Action, SimEvent};
use crate::grid::{
    collision_grid_update_system, danger_grid_update_system, spatial_grid_update_system, CollisionGrid, DangerGrids,
    SpatialGrid,
};
use crate::ids::{EntityDirectory, EntityId, EntityIdAllocator, PlayerId};
use crate::pathfinding::PathCache;
use crate::player::PlayerRecord;
use crate::ruleset::Ruleset;
use crate::systems::ai::{ai_planner_system, AiRuntime};
use crate::systems::building::{
    air_base_system, doomed_player_elimination_system, induction_rig_system, rally_dispatch_system,
    refinery_payout_system, repair_system, spawn_pending_units_system, well_spawn_system,
};
use crate::systems::combat::{firing_system, target_acquisition_system};
use crate::systems::harvester::harvester_system;
use crate::systems::housekeeping::{death_cleanup_system, death_marking_system, win_condition_system};
use crate::systems::movement::{collision_resolution_system, movement_apply_system, movement_intent_system, DeltaTime};
use crate::systems::production::{production_system, PendingSpawns, Players};
use crate::systems::projectile::{projectile_spawn_system, projectile_update_system, PendingProjectiles};
use crate::systems::reducer::apply_action;
use crate::world::{MatchState, Snapshot, SimClock};
use bevy_ecs::prelude::*;

pub struct SimWorld {
    world: World,
    schedule: Schedule,
}

impl SimWorld {
    pub fn new() -> Self {
        Self::with_ruleset(Ruleset::default())
    }

    pub fn with_ruleset(ruleset: Ruleset) -> Self {
        let mut world = World::new();

        world.insert_resource(CollisionGrid::new(ruleset.map_width, ruleset.map_height));
        world.insert_resource(SpatialGrid::new(200.0));
        world.insert_resource(DangerGrids::default());
        world.insert_resource(PathCache::default());
        world.insert_resource(DeltaTime(1.0));
        world.insert_resource(EntityIdAllocator::default());
        world.insert_resource(EntityDirectory::default());
        world.insert_resource(Players::default());
        world.insert_resource(PendingSpawns::default());
        world.insert_resource(PendingProjectiles::default());
        world.insert_resource(AiRuntime::default());
        world.insert_resource(SimClock::default());
        world.insert_resource(MatchState { running: true, winner: None });
        world.insert_resource(crate::action::EventLog::default());
        world.insert_resource(ruleset);

        let mut schedule = Schedule::default();
        schedule.add_systems(
            (spatial_grid_update_system, collision_grid_update_system, danger_grid_update_system).chain(),
        );
        schedule.add_systems(production_system);
        schedule.add_systems(ai_planner_system);
        schedule.add_systems(spawn_pending_units_system);
        schedule.add_systems((movement_intent_system, movement_apply_system, collision_resolution_system).chain());
        schedule.add_systems((harvester_system, refinery_payout_system).chain());
        schedule.add_systems((target_acquisition_system, firing_system).chain());
        schedule.add_systems((projectile_spawn_system, projectile_update_system).chain());
        schedule.add_systems((
            repair_system,
            rally_dispatch_system,
            well_spawn_system,
            induction_rig_system,
            air_base_system,
            doomed_player_elimination_system,
        ));
        schedule.add_systems((death_marking_system, death_cleanup_system, win_condition_system).chain());

        Self { world, schedule }
    }

    /// Registers a new player slot with a starting conyard placed at
    /// `(x, y)`, returning the player's id and the conyard's entity id.
    pub fn add_player(&mut self, color: impl Into<String>, is_ai: bool, start_x: f32, start_y: f32) -> (PlayerId, EntityId) {
        let player_id = {
            let players = self.world.resource::<Players>();
            PlayerId(players.0.len() as u8)
        };
        self.world.resource_mut::<Players>().0.insert(player_id, PlayerRecord::new(color, is_ai));

        let ruleset = self.world.resource::<Ruleset>();
        let rule = ruleset.building("conyard").expect("default ruleset always has a conyard").clone();
        let tick = self.world.resource::<SimClock>().tick;
        let id = self.world.resource_mut::<EntityIdAllocator>().next();
        let pos = crate::components::Position::new(start_x, start_y);
        let entity = self
            .world
            .spawn(crate::components::BuildingBundle {
                header: crate::components::HeaderBundle {
                    id: crate::components::Id(id),
                    owner: crate::components::Owner(Some(player_id)),
                    kind: crate::components::EntityKind(crate::components::Kind::Building),
                    rule_key: crate::components::RuleKey("conyard".into()),
                    position: pos,
                    previous_position: crate::components::PreviousPosition(pos),
                    hp: crate::components::Hp::new(rule.max_hp),
                    bbox: crate::components::BoundingBox {
                        width: rule.width_tiles as f32 * crate::grid::TILE,
                        height: rule.height_tiles as f32 * crate::grid::TILE,
                        collision_radius: 0.0,
                    },
                    dead: crate::components::Dead(false),
                },
                state: crate::components::BuildingState {
                    is_repairing: false,
                    placed_tick: tick,
                    rally_point: None,
                    primary_for_category: Some(crate::ruleset::BuildCategory::Building),
                },
            })
            .id();
        self.world.resource_mut::<EntityDirectory>().register(id, entity);
        if let Some(player) = self.world.resource_mut::<Players>().0.get_mut(&player_id) {
            player.conyard_id = Some(id);
        }
        (player_id, id)
    }

    /// Spawns a well (ore field generator) at `(x, y)`.
    pub fn spawn_well(&mut self, x: f32, y: f32) -> EntityId {
        let id = self.world.resource_mut::<EntityIdAllocator>().next();
        let pos = crate::components::Position::new(x, y);
        let entity = self
            .world
            .spawn(crate::components::WellBundle {
                header: crate::components::HeaderBundle {
                    id: crate::components::Id(id),
                    owner: crate::components::Owner(None),
                    kind: crate::components::EntityKind(crate::components::Kind::Well),
                    rule_key: crate::components::RuleKey("well".into()),
                    position: pos,
                    previous_position: crate::components::PreviousPosition(pos),
                    hp: crate::components::Hp::new(f32::INFINITY),
                    bbox: crate::components::BoundingBox { width: 80.0, height: 80.0, collision_radius: 40.0 },
                    dead: crate::components::Dead(false),
                },
                well: crate::components::Well { next_spawn_tick: 0, current_ore_count: 0, total_spawned: 0, is_blocked: false },
            })
            .id();
        self.world.resource_mut::<EntityDirectory>().register(id, entity);
        id
    }

    /// Spawns a unit of `key` for `owner` (or neutral if `None`) at
    /// `(x, y)`, bypassing the production queue. Used for scenario setup
    /// and scripted scenery; normal play reaches unit spawning through
    /// [`Action::StartBuild`] and [`crate::systems::building::spawn_pending_units_system`].
    pub fn spawn_unit(&mut self, owner: Option<PlayerId>, key: &str, x: f32, y: f32) -> EntityId {
        let rule = self.world.resource::<Ruleset>().unit(key).expect("unknown unit key").clone();
        let id = self.world.resource_mut::<EntityIdAllocator>().next();
        let pos = crate::components::Position::new(x, y);
        let header = crate::components::HeaderBundle {
            id: crate::components::Id(id),
            owner: crate::components::Owner(owner),
            kind: crate::components::EntityKind(crate::components::Kind::Unit),
            rule_key: crate::components::RuleKey(key.to_string()),
            position: pos,
            previous_position: crate::components::PreviousPosition(pos),
            hp: crate::components::Hp::new(rule.max_hp),
            bbox: crate::components::BoundingBox {
                width: rule.collision_radius * 2.0,
                height: rule.collision_radius * 2.0,
                collision_radius: rule.collision_radius,
            },
            dead: crate::components::Dead(false),
        };
        let mobile = crate::components::MobileUnitBundle {
            header,
            velocity: crate::components::Velocity::default(),
            movement: crate::components::Movement::default(),
        };
        let entity = if rule.weapon.is_some() {
            self.world
                .spawn(crate::components::CombatUnitBundle { mobile, combat: crate::components::Combat { stance_home: pos, ..Default::default() } })
                .id()
        } else {
            self.world.spawn(mobile).id()
        };
        self.world.resource_mut::<EntityDirectory>().register(id, entity);
        if rule.is_harvester {
            self.world.entity_mut(entity).insert(crate::components::Harvester {
                capacity: rule.harvester_capacity,
                gather_rate: rule.harvester_gather_rate,
                ..Default::default()
            });
        }
        id
    }

    /// Spawns a static, unowned obstacle (a wall) with the given
    /// footprint, stamped into the collision grid like any other
    /// building but never producing for, or owned by, a player.
    pub fn spawn_wall(&mut self, x: f32, y: f32, width: f32, height: f32) -> EntityId {
        let id = self.world.resource_mut::<EntityIdAllocator>().next();
        let pos = crate::components::Position::new(x, y);
        let entity = self
            .world
            .spawn(crate::components::HeaderBundle {
                id: crate::components::Id(id),
                owner: crate::components::Owner(None),
                kind: crate::components::EntityKind(crate::components::Kind::Rock),
                rule_key: crate::components::RuleKey("wall".into()),
                position: pos,
                previous_position: crate::components::PreviousPosition(pos),
                hp: crate::components::Hp::new(f32::INFINITY),
                bbox: crate::components::BoundingBox { width, height, collision_radius: 0.0 },
                dead: crate::components::Dead(false),
            })
            .id();
        self.world.resource_mut::<EntityDirectory>().register(id, entity);
        id
    }

    /// Applies one action to the simulation. `Action::Tick` clears the
    /// event buffer, advances the clock, and runs the full pipeline;
    /// every other variant is dispatched immediately by the command
    /// reducer and does not advance the tick. Returns the events
    /// produced (empty for a rejected or no-op command).
    pub fn step(&mut self, action: Action) -> Vec<SimEvent> {
        match action {
            Action::Tick => {
                self.world.insert_resource(crate::action::EventLog::default());
                self.world.resource_mut::<SimClock>().tick += 1;
                self.schedule.run(&mut self.world);
            }
            other => {
                if !self.world.resource::<MatchState>().running {
                    return Vec::new();
                }
                apply_action(&mut self.world, other);
            }
        }
        std::mem::take(&mut *self.world.resource_mut::<crate::action::EventLog>()).0
    }

    pub fn snapshot(&mut self) -> Snapshot {
        Snapshot::from_world(&mut self.world)
    }

    pub fn snapshot_json(&mut self) -> String {
        self.snapshot().to_json().unwrap_or_else(|_| "{}".to_string())
    }

    pub fn current_tick(&self) -> u64 {
        self.world.resource::<SimClock>().tick
    }

    pub fn is_running(&self) -> bool {
        self.world.resource::<MatchState>().running
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_world_starts_at_tick_zero_and_running() {
        let sim = SimWorld::new();
        assert_eq!(sim.current_tick(), 0);
        assert!(sim.is_running());
    }

    #[test]
    fn tick_advances_clock() {
        let mut sim = SimWorld::new();
        sim.step(Action::Tick);
        sim.step(Action::Tick);
        assert_eq!(sim.current_tick(), 2);
    }

    #[test]
    fn start_build_queues_production_for_owning_player() {
        let mut sim = SimWorld::new();
        let (player, _conyard) = sim.add_player("blue", false, 200.0, 200.0);
        sim.step(Action::StartBuild {
            player,
            category: crate::ruleset::BuildCategory::Building,
            key: "power_plant".to_string(),
        });
        sim.step(Action::Tick);
        let snap = sim.snapshot();
        let record = snap.players.iter().find(|p| p.player == player.0).unwrap();
        assert!(record.credits < 3000);
    }

    #[test]
    fn lone_surviving_player_wins() {
        let mut sim = SimWorld::new();
        let (_winner, _) = sim.add_player("blue", false, 200.0, 200.0);
        let (loser, loser_conyard) = sim.add_player("red", false, 3800.0, 3800.0);
        sim.step(Action::SellBuilding { player: loser, building: loser_conyard });
        for _ in 0..3 {
            sim.step(Action::Tick);
        }
        assert!(!sim.is_running());
    }

    #[test]
    fn unowned_well_can_be_spawned_and_tracked() {
        let mut sim = SimWorld::new();
        let well = sim.spawn_well(1000.0, 1000.0);
        assert!(sim.world().resource::<EntityDirectory>().resolve(well).is_some());
    }

    // Scenario tests, named after the seeds they drive (S1-S6).

    #[test]
    fn s1_vibration_swap_corridor() {
        let mut sim = SimWorld::new();
        sim.spawn_wall(500.0, 260.0, 1000.0, 40.0);
        sim.spawn_wall(500.0, 740.0, 1000.0, 40.0);
        let a = sim.spawn_unit(None, "rifleman", 200.0, 500.0);
        let b = sim.spawn_unit(None, "rifleman", 800.0, 500.0);
        sim.step(Action::CommandMove { units: vec![a], x: 800.0, y: 500.0 });
        sim.step(Action::CommandMove { units: vec![b], x: 200.0, y: 500.0 });

        let mut unstuck_fired = false;
        for _ in 0..600 {
            sim.step(Action::Tick);
            let world = sim.world_mut();
            let dir = world.resource::<EntityDirectory>();
            for &unit in &[a, b] {
                if let Some(entity) = dir.resolve(unit) {
                    if let Some(movement) = world.get::<crate::components::Movement>(entity) {
                        if movement.unstuck_timer > 0 {
                            unstuck_fired = true;
                        }
                    }
                }
            }
        }

        let snap = sim.snapshot();
        let pos_of = |id: EntityId| snap.units.iter().find(|u| u.id == id).map(|u| (u.x, u.y));
        let a_reached = pos_of(a).map(|(x, y)| ((x - 800.0).powi(2) + (y - 500.0).powi(2)).sqrt() < 100.0).unwrap_or(false);
        let b_reached = pos_of(b).map(|(x, y)| ((x - 200.0).powi(2) + (y - 500.0).powi(2)).sqrt() < 100.0).unwrap_or(false);

        assert!((a_reached && b_reached) || unstuck_fired, "neither swap completed nor unstuck fired");
    }

    #[test]
    fn s2_narrow_gap_funnel() {
        let mut sim = SimWorld::new();
        sim.spawn_wall(330.0, 500.0, 300.0, 100.0);
        sim.spawn_wall(670.0, 500.0, 300.0, 100.0);

        let mut units = Vec::new();
        for row in 0..4 {
            for col in 0..5 {
                let x = 350.0 + col as f32 * 60.0;
                let y = 150.0 + row as f32 * 60.0;
                units.push(sim.spawn_unit(None, "rifleman", x, y));
            }
        }
        sim.step(Action::CommandMove { units: units.clone(), x: 500.0, y: 800.0 });

        for _ in 0..1000 {
            sim.step(Action::Tick);
        }

        let snap = sim.snapshot();
        let past_gap = snap.units.iter().filter(|u| units.contains(&u.id) && u.y > 600.0).count();
        assert!(past_gap >= 11, "expected >=11 units past the gap, got {past_gap}");
    }

    #[test]
    fn s4_sam_intercepts_rocket_before_it_lands() {
        let mut sim = SimWorld::new();
        let shooter_owner = 0u8;
        let defender_owner = 1u8;
        sim.step(Action::Tick); // establish clock before manual spawns, harmless

        let shooter = sim.spawn_unit(Some(crate::ids::PlayerId(shooter_owner)), "rocket_soldier", 0.0, 0.0);
        let target = sim.spawn_unit(Some(crate::ids::PlayerId(defender_owner)), "rifleman", 240.0, 0.0);

        // Place a SAM site directly, bypassing production/placement, owned
        // by the defending side and covering the whole shot.
        {
            let world = sim.world_mut();
            let ruleset = world.resource::<crate::ruleset::Ruleset>().clone();
            let rule = ruleset.building("sam_site").unwrap().clone();
            let id = world.resource_mut::<crate::ids::EntityIdAllocator>().next();
            let pos = crate::components::Position::new(120.0, 0.0);
            let entity = world
                .spawn(crate::components::BuildingBundle {
                    header: crate::components::HeaderBundle {
                        id: crate::components::Id(id),
                        owner: crate::components::Owner(Some(crate::ids::PlayerId(defender_owner))),
                        kind: crate::components::EntityKind(crate::components::Kind::Building),
                        rule_key: crate::components::RuleKey("sam_site".into()),
                        position: pos,
                        previous_position: crate::components::PreviousPosition(pos),
                        hp: crate::components::Hp::new(rule.max_hp),
                        bbox: crate::components::BoundingBox { width: 40.0, height: 40.0, collision_radius: 0.0 },
                        dead: crate::components::Dead(false),
                    },
                    state: crate::components::BuildingState { is_repairing: false, placed_tick: 0, rally_point: None, primary_for_category: None },
                })
                .id();
            world.resource_mut::<EntityDirectory>().register(id, entity);
        }

        sim.step(Action::CommandAttack { units: vec![shooter], target });

        let initial_hp = sim.snapshot().units.iter().find(|u| u.id == target).unwrap().hp;
        for _ in 0..200 {
            sim.step(Action::Tick);
        }
        let final_hp = sim.snapshot().units.iter().find(|u| u.id == target).map(|u| u.hp).unwrap_or(initial_hp);
        assert!((initial_hp - final_hp).abs() < 1.0, "expected the rifle's hp to be essentially unchanged, dropped by {}", initial_hp - final_hp);
    }

    #[test]
    fn s5_harvesters_unload_at_shared_dock() {
        let mut sim = SimWorld::new();
        let (player, _conyard) = sim.add_player("blue", false, 200.0, 200.0);

        let world = sim.world_mut();
        let ruleset = world.resource::<crate::ruleset::Ruleset>().clone();
        let rule = ruleset.building("refinery").unwrap().clone();
        let id = world.resource_mut::<crate::ids::EntityIdAllocator>().next();
        let dock_pos = crate::components::Position::new(500.0, 460.0);
        let entity = world
            .spawn(crate::components::BuildingBundle {
                header: crate::components::HeaderBundle {
                    id: crate::components::Id(id),
                    owner: crate::components::Owner(Some(player)),
                    kind: crate::components::EntityKind(crate::components::Kind::Building),
                    rule_key: crate::components::RuleKey("refinery".into()),
                    position: dock_pos,
                    previous_position: crate::components::PreviousPosition(dock_pos),
                    hp: crate::components::Hp::new(rule.max_hp),
                    bbox: crate::components::BoundingBox { width: 120.0, height: 120.0, collision_radius: 0.0 },
                    dead: crate::components::Dead(false),
                },
                state: crate::components::BuildingState { is_repairing: false, placed_tick: 0, rally_point: None, primary_for_category: None },
            })
            .id();
        world.resource_mut::<EntityDirectory>().register(id, entity);

        let mut harvesters = Vec::new();
        for i in 0..3 {
            let x = 460.0 + i as f32 * 20.0;
            let y = 380.0;
            let unit = sim.spawn_unit(Some(player), "harvester", x, y);
            let entity = sim.world().resource::<EntityDirectory>().resolve(unit).unwrap();
            let mut harvester = sim.world_mut().get_mut::<crate::components::Harvester>(entity).unwrap();
            harvester.cargo = harvester.capacity;
            harvester.state = crate::components::HarvesterState::Returning;
            harvesters.push(unit);
        }

        let initial_credits = sim.snapshot().players.iter().find(|p| p.player == player.0).unwrap().credits;
        for _ in 0..400 {
            sim.step(Action::Tick);
        }
        let final_credits = sim.snapshot().players.iter().find(|p| p.player == player.0).unwrap().credits;

        let capacity = ruleset.unit("harvester").unwrap().harvester_capacity;
        let unloads = (final_credits.saturating_sub(initial_credits) as f32 / capacity).floor() as u32;
        assert!(unloads >= 2, "expected >=2 completed unloads, got {unloads} (credits {initial_credits} -> {final_credits})");
    }

    #[test]
    fn s6_selling_last_building_eliminates_player_and_kills_units() {
        let mut sim = SimWorld::new();
        let (loser, loser_conyard) = sim.add_player("blue", false, 200.0, 200.0);
        let (_winner, _) = sim.add_player("red", false, 3800.0, 3800.0);
        let straggler = sim.spawn_unit(Some(loser), "rifleman", 250.0, 250.0);

        sim.step(Action::SellBuilding { player: loser, building: loser_conyard });
        sim.step(Action::Tick);

        let snap = sim.snapshot();
        assert!(!snap.running);
        assert_eq!(snap.winner, Some(1));
        assert!(snap.units.iter().find(|u| u.id == straggler).is_none(), "straggler unit should have died with its player");
    }
}
