//! Entity components.
//!
//! Every entity carries the common header components below. Capability
//! components (`Movement`, `Combat`, `Harvester`, ...) are attached only to
//! entities of the relevant [`Kind`] via the bundles at the bottom of this
//! file, so a `RESOURCE` entity never carries a `Combat` component and
//! queries for it simply never see resources.

use crate::ids::{EntityId, PlayerId};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
    Unit,
    Building,
    Resource,
    Well,
    Rock,
    Projectile,
}

// ---------------------------------------------------------------------
// Common header, attached to every entity.
// ---------------------------------------------------------------------

#[derive(Component, Debug, Clone, Copy)]
pub struct Id(pub EntityId);

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner(pub Option<PlayerId>);

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityKind(pub Kind);

#[derive(Component, Debug, Clone)]
pub struct RuleKey(pub String);

#[derive(Component, Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Component, Debug, Clone, Copy, Default)]
pub struct PreviousPosition(pub Position);

#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Velocity {
    pub vx: f32,
    pub vy: f32,
}

impl Velocity {
    pub fn new(vx: f32, vy: f32) -> Self {
        Self { vx, vy }
    }

    pub fn length(&self) -> f32 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }
}

#[derive(Component, Debug, Clone, Copy)]
pub struct Hp {
    pub current: f32,
    pub max: f32,
}

impl Hp {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn is_alive(&self) -> bool {
        self.current > 0.0
    }

    pub fn apply_damage(&mut self, amount: f32) {
        self.current = (self.current - amount).max(0.0);
    }

    pub fn apply_heal(&mut self, amount: f32) {
        self.current = (self.current + amount).min(self.max);
    }
}

#[derive(Component, Debug, Clone, Copy)]
pub struct BoundingBox {
    pub width: f32,
    pub height: f32,
    pub collision_radius: f32,
}

#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Dead(pub bool);

// ---------------------------------------------------------------------
// Capability components.
// ---------------------------------------------------------------------

#[derive(Component, Debug, Clone, Default)]
pub struct Movement {
    pub rotation: f32,
    pub move_target: Option<Position>,
    pub final_dest: Option<Position>,
    pub path: Vec<Position>,
    pub path_index: usize,
    pub stuck_timer: u32,
    pub unstuck_direction: (f32, f32),
    pub unstuck_timer: u32,
    pub avg_vel: (f32, f32),
    pub last_vel: (f32, f32),
    pub flee_until: Option<u64>,
    pub manual_hold: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stance {
    Aggressive,
    Defensive,
    HoldGround,
}

#[derive(Component, Debug, Clone)]
pub struct Combat {
    pub target_id: Option<EntityId>,
    pub last_attacker_id: Option<EntityId>,
    pub cooldown: u32,
    pub turret_angle: f32,
    pub stance: Stance,
    pub attack_move_target: Option<Position>,
    pub stance_home: Position,
}

impl Default for Combat {
    fn default() -> Self {
        Self {
            target_id: None,
            last_attacker_id: None,
            cooldown: 0,
            turret_angle: 0.0,
            stance: Stance::Aggressive,
            attack_move_target: None,
            stance_home: Position::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarvesterState {
    Idle,
    Seeking,
    Harvesting,
    Returning,
    Docked,
}

#[derive(Component, Debug, Clone)]
pub struct Harvester {
    pub state: HarvesterState,
    pub cargo: f32,
    pub capacity: f32,
    pub gather_rate: f32,
    pub resource_target_id: Option<EntityId>,
    pub base_target_id: Option<EntityId>,
    pub dock_pos: Option<Position>,
    pub manual_mode: bool,
    pub harvest_attempts: u32,
    pub best_dist_to_ore: f32,
    pub blocked_ore_ids: Vec<EntityId>,
    pub flee_cooldown_until: u64,
    pub stalled_ticks: u32,
}

impl Default for Harvester {
    fn default() -> Self {
        Self {
            state: HarvesterState::Idle,
            cargo: 0.0,
            capacity: 700.0,
            gather_rate: 15.0,
            resource_target_id: None,
            base_target_id: None,
            dock_pos: None,
            manual_mode: false,
            harvest_attempts: 0,
            best_dist_to_ore: f32::INFINITY,
            blocked_ore_ids: Vec::new(),
            flee_cooldown_until: 0,
            stalled_ticks: 0,
        }
    }
}

#[derive(Component, Debug, Clone, Default)]
pub struct Engineer {
    pub capture_target_id: Option<EntityId>,
    pub repair_target_id: Option<EntityId>,
}

#[derive(Component, Debug, Clone)]
pub struct BuildingState {
    pub is_repairing: bool,
    pub placed_tick: u64,
    pub rally_point: Option<Position>,
    pub primary_for_category: Option<crate::ruleset::BuildCategory>,
}

#[derive(Component, Debug, Clone)]
pub struct Well {
    pub next_spawn_tick: u64,
    pub current_ore_count: u32,
    pub total_spawned: u32,
    pub is_blocked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AirFsmState {
    Docked,
    Flying,
    Attacking,
    Returning,
}

#[derive(Component, Debug, Clone)]
pub struct AirUnit {
    pub ammo: u32,
    pub max_ammo: u32,
    pub fsm_state: AirFsmState,
    pub home_base_id: Option<EntityId>,
    pub docked_slot: Option<u8>,
}

#[derive(Component, Debug, Clone, Default)]
pub struct AirBase {
    pub slots: [Option<EntityId>; 6],
    pub reload_progress: [u32; 6],
    pub last_launch_tick: u64,
}

#[derive(Component, Debug, Clone)]
pub struct InductionRig {
    pub well_id: EntityId,
    pub accumulated_fractional_credits: f32,
}

#[derive(Component, Debug, Clone, Default)]
pub struct DemoTruck {
    pub detonation_target_id: Option<EntityId>,
    pub detonation_target_pos: Option<Position>,
    pub has_detonated: bool,
}

// ---------------------------------------------------------------------
// Projectiles (not part of the persistent entity table proper, but
// represented as ordinary entities with a narrow component set so the
// same spatial queries and collision machinery can see them).
// ---------------------------------------------------------------------

#[derive(Component, Debug, Clone)]
pub struct Projectile {
    pub owner: Option<PlayerId>,
    pub archetype: crate::ruleset::ProjectileArchetype,
    pub weapon_type: crate::ruleset::WeaponType,
    pub damage: f32,
    pub splash_radius: f32,
    pub target_id: Option<EntityId>,
    pub target_pos: Position,
    pub hp: f32,
    pub source_id: EntityId,
}

// ---------------------------------------------------------------------
// Bundles — one per entity kind, grouping exactly the components that
// kind needs.
// ---------------------------------------------------------------------

#[derive(Bundle)]
pub struct HeaderBundle {
    pub id: Id,
    pub owner: Owner,
    pub kind: EntityKind,
    pub rule_key: RuleKey,
    pub position: Position,
    pub previous_position: PreviousPosition,
    pub hp: Hp,
    pub bbox: BoundingBox,
    pub dead: Dead,
}

#[derive(Bundle)]
pub struct MobileUnitBundle {
    pub header: HeaderBundle,
    pub velocity: Velocity,
    pub movement: Movement,
}

#[derive(Bundle)]
pub struct CombatUnitBundle {
    pub mobile: MobileUnitBundle,
    pub combat: Combat,
}

#[derive(Bundle)]
pub struct BuildingBundle {
    pub header: HeaderBundle,
    pub state: BuildingState,
}

#[derive(Bundle)]
pub struct ResourceBundle {
    pub header: HeaderBundle,
}

#[derive(Bundle)]
pub struct WellBundle {
    pub header: HeaderBundle,
    pub well: Well,
}

#[derive(Bundle)]
pub struct ProjectileBundle {
    pub id: Id,
    pub position: Position,
    pub previous_position: PreviousPosition,
    pub velocity: Velocity,
    pub projectile: Projectile,
    pub dead: Dead,
}
