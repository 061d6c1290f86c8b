//! Stable identifiers used throughout the simulation.
//!
//! Entities are never referenced by direct pointer; every cross-entity
//! relationship (target, dock, rally point) is stored as one of these ids
//! and resolved on use, per the "no cyclic references" design note.

use bevy_ecs::prelude::{Entity, Resource};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle to an entity, independent of `bevy_ecs::Entity`'s internal
/// generation/index so that snapshots can round-trip through JSON.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Index of a player slot (0-based). Slot 0..3 are the normal player range;
/// a separate neutral/world owner is represented as `None` on the entity's
/// `Owner` component rather than as a reserved id here.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u8);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Allocates ever-increasing [`EntityId`]s for a world. Kept alongside the
/// `bevy_ecs::World` rather than derived from `Entity` so ids stay stable
/// across serialize/deserialize round-trips.
#[derive(Resource, Debug, Default, Clone, Copy)]
pub struct EntityIdAllocator(u64);

impl EntityIdAllocator {
    pub fn next(&mut self) -> EntityId {
        let id = EntityId(self.0);
        self.0 += 1;
        id
    }
}

/// Maps stable [`EntityId`]s to live `bevy_ecs::Entity` handles for the
/// current tick. Rebuilt is not required every tick -- entities keep the
/// same `Entity` for their whole lifetime -- but lookups always go through
/// this table so components never store raw `Entity` values.
#[derive(Resource, Debug, Default)]
pub struct EntityDirectory {
    forward: std::collections::HashMap<EntityId, Entity>,
    backward: std::collections::HashMap<Entity, EntityId>,
}

impl EntityDirectory {
    pub fn register(&mut self, id: EntityId, entity: Entity) {
        self.forward.insert(id, entity);
        self.backward.insert(entity, id);
    }

    pub fn unregister(&mut self, id: EntityId) {
        if let Some(entity) = self.forward.remove(&id) {
            self.backward.remove(&entity);
        }
    }

    pub fn resolve(&self, id: EntityId) -> Option<Entity> {
        self.forward.get(&id).copied()
    }

    pub fn id_of(&self, entity: Entity) -> Option<EntityId> {
        self.backward.get(&entity).copied()
    }
}
