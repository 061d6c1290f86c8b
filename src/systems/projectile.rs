//! Stage 8: projectile motion, AA interception, hit resolution, and
//! splash damage (§4.6). Projectiles are spawned by the firing system
//! into a pending queue and materialized as entities at the top of this
//! stage, then advanced and resolved within the same stage.

use crate::action::SimEvent;
use crate::components::*;
use crate::grid::SpatialGrid;
use crate::ids::{EntityId, PlayerId};
use crate::ruleset::{ProjectileArchetype, Ruleset, WeaponType};
use bevy_ecs::prelude::*;

#[derive(Debug, Clone)]
pub struct ProjectileSpawn {
    pub owner: Option<PlayerId>,
    pub source_id: EntityId,
    pub origin: Position,
    pub archetype: ProjectileArchetype,
    pub weapon_type: WeaponType,
    pub damage: f32,
    pub splash_radius: f32,
    pub target_id: Option<EntityId>,
    pub target_pos: Position,
}

#[derive(Resource, Default)]
pub struct PendingProjectiles(pub Vec<ProjectileSpawn>);

pub fn projectile_spawn_system(mut commands: Commands, mut pending: ResMut<PendingProjectiles>, mut id_alloc: ResMut<crate::ids::EntityIdAllocator>) {
    for spawn in pending.0.drain(..) {
        let id = id_alloc.next();
        commands.spawn(ProjectileBundle {
            id: Id(id),
            position: spawn.origin,
            previous_position: PreviousPosition(spawn.origin),
            velocity: Velocity::default(),
            projectile: Projectile {
                owner: spawn.owner,
                archetype: spawn.archetype,
                weapon_type: spawn.weapon_type,
                damage: spawn.damage,
                splash_radius: spawn.splash_radius,
                target_id: spawn.target_id,
                target_pos: spawn.target_pos,
                hp: spawn.archetype.max_hp(),
                source_id: spawn.source_id,
            },
            dead: Dead(false),
        });
    }
}

pub fn projectile_update_system(
    ruleset: Res<Ruleset>,
    spatial: Res<SpatialGrid>,
    mut events: ResMut<crate::action::EventLog>,
    mut projectiles: Query<(Entity, &mut Position, &mut Velocity, &mut Projectile, &mut Dead)>,
    mut targets: Query<(&Id, &Position, &Owner, &RuleKey, &mut Hp, Option<&mut Combat>), Without<Projectile>>,
    aa_sources: Query<(&Position, &Owner, &RuleKey), Without<Projectile>>,
    id_lookup: Query<(&Id, Entity), Without<Projectile>>,
) {
    let entity_by_id: std::collections::HashMap<EntityId, Entity> =
        id_lookup.iter().map(|(id, e)| (id.0, e)).collect();

    for (_entity, mut pos, mut vel, mut proj, mut dead) in projectiles.iter_mut() {
        if dead.0 {
            continue;
        }

        // Interception: enemy AA sources drain hp from interceptable
        // projectiles. Friendly AA never touches a friendly projectile.
        if proj.archetype.is_interceptable() && proj.hp > 0.0 {
            for (aa_pos, aa_owner, aa_key) in aa_sources.iter() {
                if aa_owner.0 == proj.owner {
                    continue;
                }
                let Some(rule) = ruleset.building(&aa_key.0) else { continue };
                let Some(weapon) = &rule.weapon else { continue };
                if weapon.aa_dps <= 0.0 {
                    continue;
                }
                if pos.distance(aa_pos) <= weapon.range {
                    proj.hp -= weapon.aa_dps;
                }
            }
            if proj.hp <= 0.0 {
                dead.0 = true;
                continue;
            }
        }

        if proj.archetype.is_instant() {
            resolve_hit(&ruleset, &spatial, &mut events, &proj, &mut targets, &entity_by_id);
            dead.0 = true;
            continue;
        }

        // Re-aim homing projectiles at the target's current position.
        if proj.archetype.is_homing() {
            if let Some(target_id) = proj.target_id {
                if let Some(&entity) = entity_by_id.get(&target_id) {
                    if let Ok((_, target_pos, _, _, hp, _)) = targets.get(entity) {
                        if hp.is_alive() {
                            proj.target_pos = *target_pos;
                        }
                    }
                }
            }
        }

        let dx = proj.target_pos.x - pos.x;
        let dy = proj.target_pos.y - pos.y;
        let dist = (dx * dx + dy * dy).sqrt();
        let speed = proj.archetype.speed();
        if dist < speed.max(1.0) {
            pos.x = proj.target_pos.x;
            pos.y = proj.target_pos.y;
            resolve_hit(&ruleset, &spatial, &mut events, &proj, &mut targets, &entity_by_id);
            dead.0 = true;
        } else {
            vel.vx = dx / dist * speed;
            vel.vy = dy / dist * speed;
            pos.x += vel.vx;
            pos.y += vel.vy;
        }
    }
}

fn resolve_hit(
    ruleset: &Ruleset,
    spatial: &SpatialGrid,
    events: &mut Vec<SimEvent>,
    proj: &Projectile,
    targets: &mut Query<(&Id, &Position, &Owner, &RuleKey, &mut Hp, Option<&mut Combat>), Without<Projectile>>,
    entity_by_id: &std::collections::HashMap<EntityId, Entity>,
) {
    if let Some(target_id) = proj.target_id {
        if let Some(&entity) = entity_by_id.get(&target_id) {
            if let Ok((id, _, _, rule_key, mut hp, combat)) = targets.get_mut(entity) {
                if hp.is_alive() {
                    let armor = unit_armor(ruleset, &rule_key.0);
                    let damage = proj.damage * ruleset.damage_modifier(proj.weapon_type, armor);
                    hp.apply_damage(damage);
                    if let Some(mut combat) = combat {
                        combat.last_attacker_id = Some(proj.source_id);
                    }
                    events.push(SimEvent::DamageDealt {
                        source: proj.source_id,
                        target: id.0,
                        amount: damage,
                    });
                }
            }
        }
    }

    if proj.splash_radius > 0.0 {
        let victims = spatial.query_radius(proj.target_pos.x, proj.target_pos.y, proj.splash_radius);
        for victim in victims {
            if Some(victim.id) == proj.target_id {
                continue;
            }
            if victim.owner == proj.owner {
                continue;
            }
            if let Some(&entity) = entity_by_id.get(&victim.id) {
                if let Ok((id, pos, _, rule_key, mut hp, combat)) = targets.get_mut(entity) {
                    if !hp.is_alive() {
                        continue;
                    }
                    let d = pos.distance(&proj.target_pos);
                    let falloff = (1.0 - d / proj.splash_radius).max(0.0);
                    let armor = unit_armor(ruleset, &rule_key.0);
                    let damage = proj.damage * ruleset.damage_modifier(proj.weapon_type, armor) * falloff;
                    hp.apply_damage(damage);
                    if let Some(mut combat) = combat {
                        combat.last_attacker_id = Some(proj.source_id);
                    }
                    events.push(SimEvent::DamageDealt {
                        source: proj.source_id,
                        target: id.0,
                        amount: damage,
                    });
                }
            }
        }
    }
}

fn unit_armor(ruleset: &Ruleset, rule_key: &str) -> crate::ruleset::ArmorClass {
    ruleset
        .unit(rule_key)
        .map(|r| r.armor)
        .unwrap_or_else(|| {
            if ruleset.building(rule_key).is_some() {
                crate::ruleset::ArmorClass::Building
            } else {
                crate::ruleset::ArmorClass::Medium
            }
        })
}
