//! Stage 6/7 (part): target acquisition and firing (§4.6), grounded in
//! the teacher's spatial-grid-based `combat_system` target acquisition
//! and this lineage's `ArmorType::damage_modifier` table, generalized
//! from two hardcoded factions to arbitrary per-player ownership and
//! from a single weapon to the ruleset's per-unit `WeaponRule`.

use crate::action::SimEvent;
use crate::components::*;
use crate::grid::SpatialGrid;
use crate::ids::EntityId;
use crate::ruleset::Ruleset;
use bevy_ecs::prelude::*;

/// How far an enemy may stray from a defensive unit's `stance_home` and
/// still count as "threatening" it (§4.6).
const HOME_THREAT_RADIUS: f32 = 300.0;

pub fn target_acquisition_system(
    spatial: Res<SpatialGrid>,
    ruleset: Res<Ruleset>,
    mut query: Query<(&Id, &Position, &Owner, &RuleKey, &mut Combat)>,
    alive: Query<&Hp>,
    id_lookup: Query<(&Id, Entity)>,
) {
    let entity_by_id: std::collections::HashMap<EntityId, Entity> =
        id_lookup.iter().map(|(id, e)| (id.0, e)).collect();

    for (_id, pos, owner, rule_key, mut combat) in query.iter_mut() {
        let Some(weapon) = ruleset.unit(&rule_key.0).and_then(|r| r.weapon.clone()) else {
            continue;
        };

        let target_still_valid = combat
            .target_id
            .and_then(|t| entity_by_id.get(&t))
            .and_then(|&e| alive.get(e).ok())
            .map(|hp| hp.is_alive())
            .unwrap_or(false);

        if !target_still_valid {
            combat.target_id = None;
        }

        if combat.target_id.is_none() {
            combat.target_id = match combat.stance {
                Stance::HoldGround => {
                    let enemies = spatial.query_enemies(pos.x, pos.y, weapon.range, owner.0);
                    enemies.first().map(|e| e.id)
                }
                Stance::Defensive => {
                    let acquire_radius = weapon.range.max(220.0);
                    let enemies = spatial.query_enemies(pos.x, pos.y, acquire_radius, owner.0);
                    pick_defensive_target(&enemies, combat.stance_home, combat.last_attacker_id)
                }
                Stance::Aggressive => {
                    let acquire_radius = weapon.range.max(220.0);
                    let enemies = spatial.query_enemies(pos.x, pos.y, acquire_radius, owner.0);
                    enemies.first().map(|e| e.id)
                }
            };
        }
    }
}

pub fn firing_system(
    mut commands_out: ResMut<crate::systems::projectile::PendingProjectiles>,
    ruleset: Res<Ruleset>,
    mut events: ResMut<crate::action::EventLog>,
    mut shooters: Query<(&Id, &Position, &Owner, &RuleKey, &mut Combat)>,
    targets: Query<&Position>,
    id_lookup: Query<(&Id, Entity)>,
) {
    let entity_by_id: std::collections::HashMap<EntityId, Entity> =
        id_lookup.iter().map(|(id, e)| (id.0, e)).collect();

    for (id, pos, owner, rule_key, mut combat) in shooters.iter_mut() {
        let Some(weapon) = ruleset.unit(&rule_key.0).and_then(|r| r.weapon.clone()) else {
            continue;
        };
        if combat.cooldown > 0 {
            combat.cooldown -= 1;
            continue;
        }
        let Some(target_id) = combat.target_id else { continue };
        let Some(&target_entity) = entity_by_id.get(&target_id) else { continue };
        let Ok(target_pos) = targets.get(target_entity) else { continue };
        let dist = pos.distance(target_pos);
        if dist > weapon.range {
            continue;
        }
        combat.cooldown = weapon.reload_ticks;
        commands_out.0.push(crate::systems::projectile::ProjectileSpawn {
            owner: owner.0,
            source_id: id.0,
            origin: *pos,
            archetype: weapon.archetype,
            weapon_type: weapon.weapon_type,
            damage: weapon.base_damage,
            splash_radius: weapon.splash_radius,
            target_id: Some(target_id),
            target_pos: *target_pos,
        });
        events.push(SimEvent::DamageDealt {
            source: id.0,
            target: target_id,
            amount: 0.0,
        });
    }
}

/// Picks the first enemy (by the spatial grid's nearest-first ordering)
/// that either attacked us most recently or sits within
/// `HOME_THREAT_RADIUS` of `home`, per the `defensive` stance rule of
/// §4.6. Plain enemies passing through acquire radius otherwise are
/// left alone.
fn pick_defensive_target(
    enemies: &[crate::grid::SpatialEntry],
    home: Position,
    last_attacker_id: Option<EntityId>,
) -> Option<EntityId> {
    enemies
        .iter()
        .find(|e| Some(e.id) == last_attacker_id || home.distance(&Position::new(e.x, e.y)) <= HOME_THREAT_RADIUS)
        .map(|e| e.id)
}

/// Final damage after the armor/weapon modifier matrix (§4.6).
pub fn compute_damage(
    ruleset: &Ruleset,
    weapon_type: crate::ruleset::WeaponType,
    base_damage: f32,
    armor: crate::ruleset::ArmorClass,
) -> f32 {
    base_damage * ruleset.damage_modifier(weapon_type, armor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ruleset::{ArmorClass, WeaponType};

    #[test]
    fn flamer_deals_heavy_damage_to_infantry() {
        let ruleset = Ruleset::default();
        let dmg = compute_damage(&ruleset, WeaponType::FlameThrower, 20.0, ArmorClass::Infantry);
        assert!(dmg >= 25.0, "expected >=25 got {dmg}");
    }

    #[test]
    fn rifleman_needs_many_hits_to_kill_heavy_tank() {
        let ruleset = Ruleset::default();
        let dmg = compute_damage(&ruleset, WeaponType::Bullet, 6.0, ArmorClass::Heavy);
        let hits_needed = (700.0 / dmg).ceil() as u32;
        assert!(hits_needed > 100, "expected >100 hits, got {hits_needed}");
    }

    #[test]
    fn mammoth_heavy_cannon_deals_at_least_base_damage_to_heavy() {
        let ruleset = Ruleset::default();
        let dmg = compute_damage(&ruleset, WeaponType::HeavyCannon, 120.0, ArmorClass::Heavy);
        assert!(dmg >= 120.0);
    }

    #[test]
    fn defensive_stance_ignores_enemies_far_from_home_and_not_attacking() {
        let home = Position::new(0.0, 0.0);
        let distant_passerby = crate::grid::SpatialEntry {
            entity: Entity::from_raw(1),
            id: EntityId(1),
            x: 1000.0,
            y: 1000.0,
            owner: Some(crate::ids::PlayerId(1)),
        };
        let target = pick_defensive_target(&[distant_passerby], home, None);
        assert_eq!(target, None);
    }

    #[test]
    fn defensive_stance_engages_enemy_near_home() {
        let home = Position::new(0.0, 0.0);
        let threatening = crate::grid::SpatialEntry {
            entity: Entity::from_raw(1),
            id: EntityId(1),
            x: 100.0,
            y: 0.0,
            owner: Some(crate::ids::PlayerId(1)),
        };
        let target = pick_defensive_target(&[threatening], home, None);
        assert_eq!(target, Some(EntityId(1)));
    }

    #[test]
    fn defensive_stance_engages_recent_attacker_regardless_of_distance() {
        let home = Position::new(0.0, 0.0);
        let attacker = crate::grid::SpatialEntry {
            entity: Entity::from_raw(2),
            id: EntityId(2),
            x: 5000.0,
            y: 5000.0,
            owner: Some(crate::ids::PlayerId(1)),
        };
        let target = pick_defensive_target(&[attacker], home, Some(EntityId(2)));
        assert_eq!(target, Some(EntityId(2)));
    }
}
