//! Stage 9: damage bookkeeping, death cleanup, and win-condition check
//! (§2). Fog-of-war is tracked implicitly by the snapshot layer (each
//! player's view filters by visibility radius at read time rather than
//! mutating shared state), so this module's `death_cleanup_system` and
//! `win_condition_system` are the two pieces with real per-tick work.

use crate::action::SimEvent;
use crate::components::*;
use crate::ids::PlayerId;
use bevy_ecs::prelude::*;

pub fn death_marking_system(mut query: Query<(&Hp, &mut Dead)>) {
    for (hp, mut dead) in query.iter_mut() {
        if !hp.is_alive() {
            dead.0 = true;
        }
    }
}

pub fn death_cleanup_system(
    mut commands: Commands,
    mut events: ResMut<crate::action::EventLog>,
    mut id_dir: ResMut<crate::ids::EntityDirectory>,
    query: Query<(Entity, &Id, &Dead)>,
) {
    for (entity, id, dead) in query.iter() {
        if dead.0 {
            events.push(SimEvent::EntityDied { entity: id.0 });
            id_dir.unregister(id.0);
            commands.entity(entity).despawn();
        }
    }
}

pub fn win_condition_system(
    players: Res<crate::systems::production::Players>,
    mut match_state: ResMut<crate::world::MatchState>,
    mut events: ResMut<crate::action::EventLog>,
) {
    if !match_state.running {
        return;
    }
    let alive: Vec<PlayerId> = players.0.iter().filter(|(_, p)| !p.eliminated).map(|(id, _)| *id).collect();
    if alive.len() <= 1 {
        match_state.running = false;
        match_state.winner = alive.first().copied();
        events.push(SimEvent::GameOver { winner: match_state.winner });
    }
}
