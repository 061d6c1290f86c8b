//! Internal error taxonomy.
//!
//! Every fallible operation inside the simulation returns one of these
//! enums. None of them escape [`crate::api::SimWorld::step`]: the command
//! reducer matches on the `Err` variant, logs it at `warn!`, and turns it
//! into a no-op. Tests use the concrete variants to assert *which* rule
//! rejected a command; production callers only observe "state unchanged."

use crate::ids::EntityId;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CommandError {
    #[error("entity {0} not found")]
    UnknownEntity(EntityId),
    #[error("entity {0} is not owned by the issuing player")]
    NotOwned(EntityId),
    #[error("entity {0} cannot receive this command in its current state")]
    WrongState(EntityId),
    #[error("player {0:?} not found")]
    UnknownPlayer(crate::ids::PlayerId),
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ProductionError {
    #[error("unknown rule key {0}")]
    UnknownKey(String),
    #[error("production queue is full")]
    QueueFull,
    #[error("insufficient credits: need {needed}, have {have}")]
    InsufficientCredits { needed: u32, have: u32 },
    #[error("no producing building of the required category is available")]
    NoProducer,
    #[error("nothing queued to cancel")]
    NothingQueued,
    #[error("tech prerequisites not met for {0}")]
    PrerequisitesNotMet(String),
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum PlacementError {
    #[error("no conyard owned by the placing player")]
    NoConyard,
    #[error("footprint overlaps a blocked tile")]
    Blocked,
    #[error("placement is outside build radius of an owned building")]
    OutOfRange,
    #[error("no building is ready to be placed")]
    NothingReady,
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum PathError {
    #[error("no path exists between the requested tiles")]
    NoPath,
    #[error("start or goal tile is out of bounds")]
    OutOfBounds,
}
