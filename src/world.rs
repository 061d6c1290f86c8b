//! Per-world scratch resource and the serializable state snapshot.
//!
//! Shared mutable state that several stages need (the spatial/collision
//! grids, the danger grids, the path cache, the event buffer) is bundled
//! into resources owned by the `bevy_ecs::World` rather than hidden
//! behind process-wide singletons, per Design Notes §9.

use crate::components::*;
use crate::ids::{EntityId, PlayerId};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Global simulation clock. Only `Action::Tick` advances it.
#[derive(Resource, Debug, Default, Clone, Copy)]
pub struct SimClock {
    pub tick: u64,
}

/// Whether the match has ended, and who won (`None` = draw / ongoing).
#[derive(Resource, Debug, Default, Clone)]
pub struct MatchState {
    pub running: bool,
    pub winner: Option<PlayerId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub id: EntityId,
    pub owner: Option<u8>,
    pub rule_key: String,
    pub x: f32,
    pub y: f32,
    pub hp: f32,
    pub max_hp: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingSnapshot {
    pub id: EntityId,
    pub owner: Option<u8>,
    pub rule_key: String,
    pub x: f32,
    pub y: f32,
    pub hp: f32,
    pub max_hp: f32,
    pub construction_percentage: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub player: u8,
    pub credits: u32,
    pub power_capacity: i32,
    pub power_drawn: i32,
    pub eliminated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub running: bool,
    pub winner: Option<u8>,
    pub units: Vec<UnitSnapshot>,
    pub buildings: Vec<BuildingSnapshot>,
    pub players: Vec<PlayerSnapshot>,
}

impl Snapshot {
    pub fn from_world(world: &mut World) -> Self {
        let clock = *world.resource::<SimClock>();
        let match_state = world.resource::<MatchState>().clone();

        let mut units = Vec::new();
        let mut buildings = Vec::new();
        let mut unit_query = world.query::<(&Id, &Owner, &RuleKey, &Position, &Hp, &EntityKind)>();
        for (id, owner, rule_key, pos, hp, kind) in unit_query.iter(world) {
            match kind.0 {
                Kind::Unit => units.push(UnitSnapshot {
                    id: id.0,
                    owner: owner.0.map(|p| p.0),
                    rule_key: rule_key.0.clone(),
                    x: pos.x,
                    y: pos.y,
                    hp: hp.current,
                    max_hp: hp.max,
                }),
                Kind::Building => buildings.push(BuildingSnapshot {
                    id: id.0,
                    owner: owner.0.map(|p| p.0),
                    rule_key: rule_key.0.clone(),
                    x: pos.x,
                    y: pos.y,
                    hp: hp.current,
                    max_hp: hp.max,
                    construction_percentage: 100.0,
                }),
                _ => {}
            }
        }

        let players = world
            .get_resource::<crate::systems::production::Players>()
            .map(|players| {
                let mut list: Vec<_> = players
                    .0
                    .iter()
                    .map(|(id, record)| PlayerSnapshot {
                        player: id.0,
                        credits: record.credits,
                        power_capacity: record.power_capacity,
                        power_drawn: record.power_drawn,
                        eliminated: record.eliminated,
                    })
                    .collect();
                list.sort_by_key(|p| p.player);
                list
            })
            .unwrap_or_default();

        Snapshot {
            tick: clock.tick,
            running: match_state.running,
            winner: match_state.winner.map(|p| p.0),
            units,
            buildings,
            players,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
