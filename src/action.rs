//! The action surface (§6): everything a caller can feed into
//! [`crate::api::SimWorld::step`].

use crate::components::Stance;
use crate::ids::{EntityId, PlayerId};
use crate::ruleset::BuildCategory;
use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Action {
    Tick,
    StartBuild {
        player: PlayerId,
        category: BuildCategory,
        key: String,
    },
    CancelBuild {
        player: PlayerId,
        category: BuildCategory,
    },
    PlaceBuilding {
        player: PlayerId,
        x: f32,
        y: f32,
    },
    SellBuilding {
        player: PlayerId,
        building: EntityId,
    },
    StartRepair {
        player: PlayerId,
        building: EntityId,
    },
    StopRepair {
        player: PlayerId,
        building: EntityId,
    },
    CommandMove {
        units: Vec<EntityId>,
        x: f32,
        y: f32,
    },
    CommandAttack {
        units: Vec<EntityId>,
        target: EntityId,
    },
    CommandAttackMove {
        units: Vec<EntityId>,
        x: f32,
        y: f32,
    },
    SetStance {
        units: Vec<EntityId>,
        stance: Stance,
    },
    DeployMcv {
        unit: EntityId,
    },
    DeployInductionRig {
        unit: EntityId,
        well: EntityId,
    },
    SetRallyPoint {
        building: EntityId,
        x: f32,
        y: f32,
    },
    SetPrimaryBuilding {
        building: EntityId,
    },
}

/// Append-only per-tick event stream, cleared at the start of the next
/// tick. The simulation core is a pure function of `(state, action) ->
/// (state', events)`; there is no callback or channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SimEvent {
    ProductionStarted {
        player: PlayerId,
        category: BuildCategory,
        key: String,
    },
    ProductionComplete {
        player: PlayerId,
        category: BuildCategory,
        key: String,
    },
    ProductionCancelled {
        player: PlayerId,
        category: BuildCategory,
        refund: u32,
    },
    BuildingPlaced {
        player: PlayerId,
        building: EntityId,
        key: String,
    },
    BuildingSold {
        player: PlayerId,
        building: EntityId,
        refund: u32,
    },
    EntityDied {
        entity: EntityId,
    },
    DamageDealt {
        source: EntityId,
        target: EntityId,
        amount: f32,
    },
    PlayerEliminated {
        player: PlayerId,
    },
    GameOver {
        winner: Option<PlayerId>,
    },
    CommandRejected {
        reason: String,
    },
}

/// `Vec<SimEvent>` itself can't implement `bevy_ecs`'s `Resource` (both are
/// foreign to this crate, so the orphan rules forbid it); this thin newtype
/// is the resource actually stored in the `World`, transparently
/// deref-coercing to `Vec<SimEvent>` everywhere it's read or mutated.
#[derive(Resource, Debug, Default)]
pub struct EventLog(pub Vec<SimEvent>);

impl std::ops::Deref for EventLog {
    type Target = Vec<SimEvent>;
    fn deref(&self) -> &Vec<SimEvent> {
        &self.0
    }
}

impl std::ops::DerefMut for EventLog {
    fn deref_mut(&mut self) -> &mut Vec<SimEvent> {
        &mut self.0
    }
}
