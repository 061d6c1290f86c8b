//! Frontline Core -- Simulation Core
//!
//! A deterministic, tick-based ECS simulation for a real-time strategy
//! game. Uses `bevy_ecs` for the entity-component-system architecture.
//! The whole simulation is reached through [`SimWorld::step`]; nothing
//! else in the crate is meant to be driven directly by a client.

pub mod action;
pub mod api;
pub mod components;
pub mod error;
pub mod grid;
pub mod ids;
pub mod pathfinding;
pub mod player;
pub mod profiler;
pub mod ruleset;
pub mod systems;
pub mod world;

pub use action::{Action, SimEvent};
pub use api::SimWorld;
pub use components::*;
pub use error::{CommandError, PathError, PlacementError, ProductionError};
pub use grid::{CollisionGrid, DangerGrids, SpatialEntry, SpatialGrid};
pub use ids::{EntityDirectory, EntityId, EntityIdAllocator, PlayerId};
pub use player::{Difficulty, PlayerRecord, ProductionItem, ProductionQueue};
pub use ruleset::Ruleset;
pub use world::Snapshot;
