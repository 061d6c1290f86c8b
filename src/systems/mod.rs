//! The nine-stage TICK pipeline (§2), one module per stage plus the
//! command reducer that handles every non-`Tick` action.
//!
//! Systems are plain `bevy_ecs` systems, composed into a chained
//! `Schedule` by [`crate::api::SimWorld::new`]. The modules are ordered
//! here the same way they run.

pub mod reducer;
pub mod production;
pub mod movement;
pub mod harvester;
pub mod combat;
pub mod projectile;
pub mod building;
pub mod ai;
pub mod housekeeping;

pub use reducer::*;
pub use production::*;
pub use movement::*;
pub use harvester::*;
pub use combat::*;
pub use projectile::*;
pub use building::*;
pub use ai::*;
pub use housekeeping::*;
