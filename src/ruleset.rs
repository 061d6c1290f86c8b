//! Injected, read-only game configuration.
//!
//! A [`Ruleset`] is built once (typically via [`Ruleset::default`] or by
//! deserializing one with `serde_json`) and handed to
//! [`crate::api::SimWorld::with_ruleset`]. Nothing in the simulation ever
//! mutates it afterward -- see Design Notes on injected immutable
//! configuration.

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArmorClass {
    Infantry,
    Light,
    Medium,
    Heavy,
    Building,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeaponType {
    AntiInfantry,
    Bullet,
    Rocket,
    HeavyCannon,
    Artillery,
    FlameThrower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectileArchetype {
    Hitscan,
    Bullet,
    Rocket,
    Missile,
    Artillery,
}

impl ProjectileArchetype {
    pub fn speed(self) -> f32 {
        match self {
            ProjectileArchetype::Hitscan => f32::INFINITY,
            ProjectileArchetype::Bullet => 900.0,
            ProjectileArchetype::Rocket => 260.0,
            ProjectileArchetype::Missile => 300.0,
            ProjectileArchetype::Artillery => 140.0,
        }
    }

    pub fn max_hp(self) -> f32 {
        match self {
            ProjectileArchetype::Hitscan | ProjectileArchetype::Bullet => 0.0,
            ProjectileArchetype::Rocket => 50.0,
            ProjectileArchetype::Missile => 40.0,
            ProjectileArchetype::Artillery => 150.0,
        }
    }

    pub fn is_interceptable(self) -> bool {
        self.max_hp() > 0.0
    }

    pub fn is_homing(self) -> bool {
        matches!(self, ProjectileArchetype::Rocket | ProjectileArchetype::Missile)
    }

    pub fn is_instant(self) -> bool {
        matches!(self, ProjectileArchetype::Hitscan)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeaponRule {
    pub archetype: ProjectileArchetype,
    pub weapon_type: WeaponType,
    pub base_damage: f32,
    pub range: f32,
    pub reload_ticks: u32,
    pub splash_radius: f32,
    pub aa_dps: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildCategory {
    Building,
    Infantry,
    Vehicle,
    Air,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitRule {
    pub key: String,
    pub category: BuildCategory,
    pub cost: u32,
    pub build_time_ticks: u32,
    pub max_hp: f32,
    pub armor: ArmorClass,
    pub speed: f32,
    pub collision_radius: f32,
    pub weapon: Option<WeaponRule>,
    pub acquire_range: f32,
    pub is_harvester: bool,
    pub harvester_capacity: f32,
    pub harvester_gather_rate: f32,
    pub is_engineer: bool,
    pub is_demo_truck: bool,
    pub is_air: bool,
    pub supply_cost: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingRule {
    pub key: String,
    pub cost: u32,
    pub build_time_ticks: u32,
    pub max_hp: f32,
    pub width_tiles: u32,
    pub height_tiles: u32,
    pub is_producer_for: Option<BuildCategory>,
    pub is_defense: bool,
    pub weapon: Option<WeaponRule>,
    pub power_capacity: i32,
    pub power_draw: i32,
    pub is_well_rig_slot: bool,
    pub is_air_base: bool,
    pub sell_refund_fraction: f32,
    pub repair_duration_ticks: u32,
    /// Per-player cap on how many of this building the AI's economy module
    /// will build as "surplus" production/defense (§4.9); `None` means
    /// uncapped (refineries are instead bounded by `Ruleset::max_refineries`).
    pub max_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiPersonality {
    pub name: String,
    pub harvester_ratio: f32,
    pub credit_buffer: u32,
    pub defense_investment: f32,
    pub build_order_priority: Vec<BuildCategory>,
    pub unit_preferences: HashMap<String, f32>,
    pub aggression: f32,
}

impl AiPersonality {
    pub fn balanced() -> Self {
        AiPersonality {
            name: "balanced".into(),
            harvester_ratio: 0.35,
            credit_buffer: 300,
            defense_investment: 0.2,
            build_order_priority: vec![
                BuildCategory::Building,
                BuildCategory::Infantry,
                BuildCategory::Vehicle,
            ],
            unit_preferences: HashMap::new(),
            aggression: 0.5,
        }
    }

    pub fn turtle() -> Self {
        let mut p = Self::balanced();
        p.name = "turtle".into();
        p.defense_investment = 0.45;
        p.aggression = 0.2;
        p
    }

    pub fn rush() -> Self {
        let mut p = Self::balanced();
        p.name = "rush".into();
        p.harvester_ratio = 0.2;
        p.defense_investment = 0.05;
        p.aggression = 0.9;
        p
    }
}

#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct Ruleset {
    pub buildings: HashMap<String, BuildingRule>,
    pub units: HashMap<String, UnitRule>,
    /// `damage_modifiers[weapon_type][armor_class]`.
    pub damage_modifiers: HashMap<WeaponType, HashMap<ArmorClass, f32>>,
    pub ai_personalities: Vec<AiPersonality>,
    pub map_width: f32,
    pub map_height: f32,
    pub well_spawn_period_ticks: u32,
    pub well_max_ore: u32,
    pub max_refineries: u32,
    pub build_radius: f32,
    pub building_grace_period_ticks: u32,
}

impl Ruleset {
    pub fn damage_modifier(&self, weapon: WeaponType, armor: ArmorClass) -> f32 {
        self.damage_modifiers
            .get(&weapon)
            .and_then(|row| row.get(&armor))
            .copied()
            .unwrap_or(1.0)
    }

    pub fn building(&self, key: &str) -> Option<&BuildingRule> {
        self.buildings.get(key)
    }

    pub fn unit(&self, key: &str) -> Option<&UnitRule> {
        self.units.get(key)
    }
}

impl Default for Ruleset {
    fn default() -> Self {
        let mut damage_modifiers = HashMap::new();
        let mut anti_infantry = HashMap::new();
        anti_infantry.insert(ArmorClass::Infantry, 1.5);
        anti_infantry.insert(ArmorClass::Light, 0.6);
        anti_infantry.insert(ArmorClass::Medium, 0.3);
        anti_infantry.insert(ArmorClass::Heavy, 0.1);
        anti_infantry.insert(ArmorClass::Building, 0.2);
        damage_modifiers.insert(WeaponType::AntiInfantry, anti_infantry);

        let mut bullet = HashMap::new();
        bullet.insert(ArmorClass::Infantry, 1.0);
        bullet.insert(ArmorClass::Light, 0.5);
        bullet.insert(ArmorClass::Medium, 0.25);
        bullet.insert(ArmorClass::Heavy, 0.12);
        bullet.insert(ArmorClass::Building, 0.2);
        damage_modifiers.insert(WeaponType::Bullet, bullet);

        let mut rocket = HashMap::new();
        rocket.insert(ArmorClass::Infantry, 0.8);
        rocket.insert(ArmorClass::Light, 1.2);
        rocket.insert(ArmorClass::Medium, 1.1);
        rocket.insert(ArmorClass::Heavy, 1.0);
        rocket.insert(ArmorClass::Building, 1.0);
        damage_modifiers.insert(WeaponType::Rocket, rocket);

        let mut heavy_cannon = HashMap::new();
        heavy_cannon.insert(ArmorClass::Infantry, 1.0);
        heavy_cannon.insert(ArmorClass::Light, 1.3);
        heavy_cannon.insert(ArmorClass::Medium, 1.2);
        heavy_cannon.insert(ArmorClass::Heavy, 1.1);
        heavy_cannon.insert(ArmorClass::Building, 1.3);
        damage_modifiers.insert(WeaponType::HeavyCannon, heavy_cannon);

        let mut artillery = HashMap::new();
        artillery.insert(ArmorClass::Infantry, 1.3);
        artillery.insert(ArmorClass::Light, 1.1);
        artillery.insert(ArmorClass::Medium, 1.0);
        artillery.insert(ArmorClass::Heavy, 0.9);
        artillery.insert(ArmorClass::Building, 1.2);
        damage_modifiers.insert(WeaponType::Artillery, artillery);

        let mut flame = HashMap::new();
        flame.insert(ArmorClass::Infantry, 1.25);
        flame.insert(ArmorClass::Light, 0.7);
        flame.insert(ArmorClass::Medium, 0.4);
        flame.insert(ArmorClass::Heavy, 0.2);
        flame.insert(ArmorClass::Building, 0.5);
        damage_modifiers.insert(WeaponType::FlameThrower, flame);

        let mut buildings = HashMap::new();
        buildings.insert(
            "conyard".into(),
            BuildingRule {
                key: "conyard".into(),
                cost: 0,
                build_time_ticks: 1,
                max_hp: 1000.0,
                width_tiles: 3,
                height_tiles: 3,
                is_producer_for: Some(BuildCategory::Building),
                is_defense: false,
                weapon: None,
                power_capacity: 0,
                power_draw: 0,
                is_well_rig_slot: false,
                is_air_base: false,
                sell_refund_fraction: 0.5,
                repair_duration_ticks: 400,
                max_count: None,
            },
        );
        buildings.insert(
            "power_plant".into(),
            BuildingRule {
                key: "power_plant".into(),
                cost: 300,
                build_time_ticks: 180,
                max_hp: 400.0,
                width_tiles: 2,
                height_tiles: 2,
                is_producer_for: None,
                is_defense: false,
                weapon: None,
                power_capacity: 100,
                power_draw: 0,
                is_well_rig_slot: false,
                is_air_base: false,
                sell_refund_fraction: 0.5,
                repair_duration_ticks: 200,
                max_count: None,
            },
        );
        buildings.insert(
            "barracks".into(),
            BuildingRule {
                key: "barracks".into(),
                cost: 400,
                build_time_ticks: 240,
                max_hp: 500.0,
                width_tiles: 2,
                height_tiles: 2,
                is_producer_for: Some(BuildCategory::Infantry),
                is_defense: false,
                weapon: None,
                power_capacity: 0,
                power_draw: 20,
                is_well_rig_slot: false,
                is_air_base: false,
                sell_refund_fraction: 0.5,
                repair_duration_ticks: 250,
                max_count: Some(2),
            },
        );
        buildings.insert(
            "factory".into(),
            BuildingRule {
                key: "factory".into(),
                cost: 2000,
                build_time_ticks: 480,
                max_hp: 800.0,
                width_tiles: 3,
                height_tiles: 3,
                is_producer_for: Some(BuildCategory::Vehicle),
                is_defense: false,
                weapon: None,
                power_capacity: 0,
                power_draw: 30,
                is_well_rig_slot: false,
                is_air_base: false,
                sell_refund_fraction: 0.5,
                repair_duration_ticks: 400,
                max_count: Some(2),
            },
        );
        buildings.insert(
            "airforce_command".into(),
            BuildingRule {
                key: "airforce_command".into(),
                cost: 1200,
                build_time_ticks: 360,
                max_hp: 600.0,
                width_tiles: 3,
                height_tiles: 2,
                is_producer_for: Some(BuildCategory::Air),
                is_defense: false,
                weapon: None,
                power_capacity: 0,
                power_draw: 30,
                is_well_rig_slot: false,
                is_air_base: true,
                sell_refund_fraction: 0.5,
                repair_duration_ticks: 350,
                max_count: Some(1),
            },
        );
        buildings.insert(
            "refinery".into(),
            BuildingRule {
                key: "refinery".into(),
                cost: 2000,
                build_time_ticks: 420,
                max_hp: 900.0,
                width_tiles: 3,
                height_tiles: 3,
                is_producer_for: None,
                is_defense: false,
                weapon: None,
                power_capacity: 0,
                power_draw: 10,
                is_well_rig_slot: false,
                is_air_base: false,
                sell_refund_fraction: 0.5,
                repair_duration_ticks: 400,
                max_count: None,
            },
        );
        buildings.insert(
            "turret".into(),
            BuildingRule {
                key: "turret".into(),
                cost: 600,
                build_time_ticks: 200,
                max_hp: 400.0,
                width_tiles: 1,
                height_tiles: 1,
                is_producer_for: None,
                is_defense: true,
                weapon: Some(WeaponRule {
                    archetype: ProjectileArchetype::Bullet,
                    weapon_type: WeaponType::HeavyCannon,
                    base_damage: 25.0,
                    range: 320.0,
                    reload_ticks: 20,
                    splash_radius: 0.0,
                    aa_dps: 0.0,
                }),
                power_capacity: 0,
                power_draw: 10,
                is_well_rig_slot: false,
                is_air_base: false,
                sell_refund_fraction: 0.5,
                repair_duration_ticks: 150,
                max_count: Some(6),
            },
        );
        buildings.insert(
            "sam_site".into(),
            BuildingRule {
                key: "sam_site".into(),
                cost: 750,
                build_time_ticks: 220,
                max_hp: 350.0,
                width_tiles: 1,
                height_tiles: 1,
                is_producer_for: None,
                is_defense: true,
                weapon: Some(WeaponRule {
                    archetype: ProjectileArchetype::Hitscan,
                    weapon_type: WeaponType::AntiInfantry,
                    base_damage: 0.0,
                    range: 380.0,
                    reload_ticks: 1,
                    splash_radius: 0.0,
                    aa_dps: 60.0,
                }),
                power_capacity: 0,
                power_draw: 15,
                is_well_rig_slot: false,
                is_air_base: false,
                sell_refund_fraction: 0.5,
                repair_duration_ticks: 150,
                max_count: Some(4),
            },
        );

        let mut units = HashMap::new();
        units.insert(
            "rifleman".into(),
            UnitRule {
                key: "rifleman".into(),
                category: BuildCategory::Infantry,
                cost: 100,
                build_time_ticks: 60,
                max_hp: 50.0,
                armor: ArmorClass::Infantry,
                speed: 45.0,
                collision_radius: 8.0,
                weapon: Some(WeaponRule {
                    archetype: ProjectileArchetype::Bullet,
                    weapon_type: WeaponType::Bullet,
                    base_damage: 6.0,
                    range: 180.0,
                    reload_ticks: 18,
                    splash_radius: 0.0,
                    aa_dps: 0.0,
                }),
                acquire_range: 220.0,
                is_harvester: false,
                harvester_capacity: 0.0,
                harvester_gather_rate: 0.0,
                is_engineer: false,
                is_demo_truck: false,
                is_air: false,
                supply_cost: 1,
            },
        );
        units.insert(
            "flamer".into(),
            UnitRule {
                key: "flamer".into(),
                category: BuildCategory::Infantry,
                cost: 250,
                build_time_ticks: 120,
                max_hp: 60.0,
                armor: ArmorClass::Infantry,
                speed: 40.0,
                collision_radius: 8.0,
                weapon: Some(WeaponRule {
                    archetype: ProjectileArchetype::Hitscan,
                    weapon_type: WeaponType::FlameThrower,
                    base_damage: 20.0,
                    range: 90.0,
                    reload_ticks: 24,
                    splash_radius: 20.0,
                    aa_dps: 0.0,
                }),
                acquire_range: 100.0,
                is_harvester: false,
                harvester_capacity: 0.0,
                harvester_gather_rate: 0.0,
                is_engineer: false,
                is_demo_truck: false,
                is_air: false,
                supply_cost: 1,
            },
        );
        units.insert(
            "rocket_soldier".into(),
            UnitRule {
                key: "rocket_soldier".into(),
                category: BuildCategory::Infantry,
                cost: 300,
                build_time_ticks: 150,
                max_hp: 55.0,
                armor: ArmorClass::Infantry,
                speed: 38.0,
                collision_radius: 8.0,
                weapon: Some(WeaponRule {
                    archetype: ProjectileArchetype::Rocket,
                    weapon_type: WeaponType::Rocket,
                    base_damage: 40.0,
                    range: 260.0,
                    reload_ticks: 50,
                    splash_radius: 0.0,
                    aa_dps: 0.0,
                }),
                acquire_range: 260.0,
                is_harvester: false,
                harvester_capacity: 0.0,
                harvester_gather_rate: 0.0,
                is_engineer: false,
                is_demo_truck: false,
                is_air: false,
                supply_cost: 1,
            },
        );
        units.insert(
            "engineer".into(),
            UnitRule {
                key: "engineer".into(),
                category: BuildCategory::Infantry,
                cost: 500,
                build_time_ticks: 200,
                max_hp: 25.0,
                armor: ArmorClass::Infantry,
                speed: 42.0,
                collision_radius: 8.0,
                weapon: None,
                acquire_range: 0.0,
                is_harvester: false,
                harvester_capacity: 0.0,
                harvester_gather_rate: 0.0,
                is_engineer: true,
                is_demo_truck: false,
                is_air: false,
                supply_cost: 1,
            },
        );
        units.insert(
            "harvester".into(),
            UnitRule {
                key: "harvester".into(),
                category: BuildCategory::Vehicle,
                cost: 1400,
                build_time_ticks: 360,
                max_hp: 600.0,
                armor: ArmorClass::Medium,
                speed: 30.0,
                collision_radius: 18.0,
                weapon: None,
                acquire_range: 0.0,
                is_harvester: true,
                harvester_capacity: 700.0,
                harvester_gather_rate: 15.0,
                is_engineer: false,
                is_demo_truck: false,
                is_air: false,
                supply_cost: 2,
            },
        );
        units.insert(
            "mcv".into(),
            UnitRule {
                key: "mcv".into(),
                category: BuildCategory::Vehicle,
                cost: 3000,
                build_time_ticks: 600,
                max_hp: 600.0,
                armor: ArmorClass::Heavy,
                speed: 26.0,
                collision_radius: 20.0,
                weapon: None,
                acquire_range: 0.0,
                is_harvester: false,
                harvester_capacity: 0.0,
                harvester_gather_rate: 0.0,
                is_engineer: false,
                is_demo_truck: false,
                is_air: false,
                supply_cost: 0,
            },
        );
        units.insert(
            "light_tank".into(),
            UnitRule {
                key: "light_tank".into(),
                category: BuildCategory::Vehicle,
                cost: 700,
                build_time_ticks: 280,
                max_hp: 300.0,
                armor: ArmorClass::Light,
                speed: 50.0,
                collision_radius: 14.0,
                weapon: Some(WeaponRule {
                    archetype: ProjectileArchetype::Bullet,
                    weapon_type: WeaponType::Bullet,
                    base_damage: 20.0,
                    range: 200.0,
                    reload_ticks: 30,
                    splash_radius: 0.0,
                    aa_dps: 0.0,
                }),
                acquire_range: 230.0,
                is_harvester: false,
                harvester_capacity: 0.0,
                harvester_gather_rate: 0.0,
                is_engineer: false,
                is_demo_truck: false,
                is_air: false,
                supply_cost: 2,
            },
        );
        units.insert(
            "heavy_tank".into(),
            UnitRule {
                key: "heavy_tank".into(),
                category: BuildCategory::Vehicle,
                cost: 1500,
                build_time_ticks: 420,
                max_hp: 700.0,
                armor: ArmorClass::Heavy,
                speed: 32.0,
                collision_radius: 16.0,
                weapon: Some(WeaponRule {
                    archetype: ProjectileArchetype::Bullet,
                    weapon_type: WeaponType::HeavyCannon,
                    base_damage: 45.0,
                    range: 240.0,
                    reload_ticks: 45,
                    splash_radius: 0.0,
                    aa_dps: 0.0,
                }),
                acquire_range: 260.0,
                is_harvester: false,
                harvester_capacity: 0.0,
                harvester_gather_rate: 0.0,
                is_engineer: false,
                is_demo_truck: false,
                is_air: false,
                supply_cost: 3,
            },
        );
        units.insert(
            "mammoth_tank".into(),
            UnitRule {
                key: "mammoth_tank".into(),
                category: BuildCategory::Vehicle,
                cost: 2500,
                build_time_ticks: 600,
                max_hp: 1000.0,
                armor: ArmorClass::Heavy,
                speed: 24.0,
                collision_radius: 20.0,
                weapon: Some(WeaponRule {
                    archetype: ProjectileArchetype::Artillery,
                    weapon_type: WeaponType::HeavyCannon,
                    base_damage: 120.0,
                    range: 280.0,
                    reload_ticks: 60,
                    splash_radius: 40.0,
                    aa_dps: 0.0,
                }),
                acquire_range: 300.0,
                is_harvester: false,
                harvester_capacity: 0.0,
                harvester_gather_rate: 0.0,
                is_engineer: false,
                is_demo_truck: false,
                is_air: false,
                supply_cost: 4,
            },
        );
        units.insert(
            "demo_truck".into(),
            UnitRule {
                key: "demo_truck".into(),
                category: BuildCategory::Vehicle,
                cost: 1200,
                build_time_ticks: 300,
                max_hp: 200.0,
                armor: ArmorClass::Light,
                speed: 36.0,
                collision_radius: 14.0,
                weapon: None,
                acquire_range: 0.0,
                is_harvester: false,
                harvester_capacity: 0.0,
                harvester_gather_rate: 0.0,
                is_engineer: false,
                is_demo_truck: true,
                is_air: false,
                supply_cost: 2,
            },
        );
        units.insert(
            "harrier".into(),
            UnitRule {
                key: "harrier".into(),
                category: BuildCategory::Air,
                cost: 1000,
                build_time_ticks: 320,
                max_hp: 150.0,
                armor: ArmorClass::Light,
                speed: 140.0,
                collision_radius: 12.0,
                weapon: Some(WeaponRule {
                    archetype: ProjectileArchetype::Missile,
                    weapon_type: WeaponType::Rocket,
                    base_damage: 35.0,
                    range: 150.0,
                    reload_ticks: 25,
                    splash_radius: 15.0,
                    aa_dps: 0.0,
                }),
                acquire_range: 260.0,
                is_harvester: false,
                harvester_capacity: 0.0,
                harvester_gather_rate: 0.0,
                is_engineer: false,
                is_demo_truck: false,
                is_air: true,
                supply_cost: 2,
            },
        );

        Ruleset {
            buildings,
            units,
            damage_modifiers,
            ai_personalities: vec![
                AiPersonality::balanced(),
                AiPersonality::turtle(),
                AiPersonality::rush(),
            ],
            map_width: 4000.0,
            map_height: 4000.0,
            well_spawn_period_ticks: 150,
            well_max_ore: 12,
            max_refineries: 4,
            build_radius: 400.0,
            building_grace_period_ticks: 300,
        }
    }
}
