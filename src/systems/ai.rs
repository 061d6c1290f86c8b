//! Stage 3: the AI planner (§4.9), grounded in this lineage's
//! `Strategy`/`StrategyExecutor` scripted-build-order model, adapted
//! from a linear build order into the reactive per-tick
//! economy/strategy/investment-priority state machine the spec calls
//! for. Staggered by `tick mod N` so not every AI player plans on the
//! same tick.

use crate::action::SimEvent;
use crate::components::*;
use crate::grid::SpatialGrid;
use crate::ids::PlayerId;
use crate::player::queue_production;
use crate::ruleset::{AiPersonality, BuildCategory, Ruleset};
use bevy_ecs::prelude::*;
use log::debug;
use std::collections::HashMap;

pub const AI_STAGGER_N: u64 = 3;
const STRATEGY_COOLDOWN_TICKS: u64 = 300;
const PANIC_THREAT_THRESHOLD: u32 = 70;
/// Threat level past which a player is treated as near-elimination and
/// the last-resort sell module may fire outside its normal cadence.
const LAST_RESORT_THREAT_THRESHOLD: u32 = 90;
const EMERGENCY_SELL_COOLDOWN_TICKS: u64 = 120;
const LAST_RESORT_SELL_COOLDOWN_TICKS: u64 = 30;
const ALL_IN_SELL_COOLDOWN_TICKS: u64 = 60;
/// Credits beyond this multiple of the personality's buffer, combined
/// with a sizeable army and high aggression, trigger an all-in push.
const ALL_IN_CREDIT_MULTIPLE: u32 = 8;
const MAX_CAPTURE_ENGINEERS: u32 = 2;
const MCV_ARRIVAL_RADIUS: f32 = 80.0;
/// An ore patch closer than this to an existing base isn't worth a
/// second expansion; farther than the scan radius isn't reachable.
const DISTANT_ORE_MIN_RADIUS: f32 = 900.0;
const EXPANSION_SCAN_RADIUS: f32 = 2200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvestmentPriority {
    Economy,
    Defense,
    Balanced,
    Warfare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Expand,
    Defend,
    Attack,
    AllIn,
}

#[derive(Debug, Clone)]
pub struct AiRuntimeState {
    pub investment: InvestmentPriority,
    pub strategy: Strategy,
    pub last_strategy_change: u64,
    pub threat_level: u32,
    pub last_emergency_sell: u64,
    pub last_last_resort_sell: u64,
    pub last_all_in_sell: u64,
}

impl Default for AiRuntimeState {
    fn default() -> Self {
        Self {
            investment: InvestmentPriority::Economy,
            strategy: Strategy::Expand,
            last_strategy_change: 0,
            threat_level: 0,
            last_emergency_sell: 0,
            last_last_resort_sell: 0,
            last_all_in_sell: 0,
        }
    }
}

#[derive(Resource, Default)]
pub struct AiRuntime(pub HashMap<PlayerId, AiRuntimeState>);

#[allow(clippy::too_many_arguments)]
pub fn ai_planner_system(
    clock: Res<crate::world::SimClock>,
    ruleset: Res<Ruleset>,
    spatial: Res<SpatialGrid>,
    mut runtime: ResMut<AiRuntime>,
    mut players: ResMut<crate::systems::production::Players>,
    mut events: ResMut<crate::action::EventLog>,
    mut commands: Commands,
    mut id_alloc: ResMut<crate::ids::EntityIdAllocator>,
    mut id_dir: ResMut<crate::ids::EntityDirectory>,
    keyed: Query<(Entity, &Owner, &Position, &RuleKey, &EntityKind)>,
    mut sellable: Query<(&Id, &Owner, &RuleKey, &mut Hp, &mut Dead), With<BuildingState>>,
    harvesters: Query<&Owner, With<Harvester>>,
    combatants: Query<&Owner, With<Combat>>,
    engineers: Query<&Owner, With<Engineer>>,
    mut movers: Query<(Entity, &Owner, &RuleKey, &mut Movement, &Position)>,
    wells: Query<(&Position, &Well)>,
) {
    let tick = clock.tick;

    let ai_player_ids: Vec<PlayerId> = players
        .0
        .iter()
        .filter(|(_, p)| p.is_ai && !p.eliminated)
        .map(|(id, _)| *id)
        .collect();

    for player_id in ai_player_ids {
        if (player_id.0 as u64 + tick) % AI_STAGGER_N != 0 {
            continue;
        }

        let personality = players
            .0
            .get(&player_id)
            .and_then(|p| p.ai_personality.clone())
            .and_then(|name| ruleset.ai_personalities.iter().find(|p| p.name == name).cloned())
            .unwrap_or_else(AiPersonality::balanced);

        let state = runtime.0.entry(player_id).or_default();

        let our_buildings: Vec<(Entity, Position, String)> = keyed
            .iter()
            .filter(|(_, owner, _, _, kind)| owner.0 == Some(player_id) && kind.0 == Kind::Building)
            .map(|(e, _, pos, key, _)| (e, *pos, key.0.clone()))
            .collect();

        let mut threat = 0u32;
        for (_, pos, _) in &our_buildings {
            threat += spatial.query_enemies(pos.x, pos.y, 500.0, Some(player_id)).len() as u32;
        }
        state.threat_level = (threat * 10).min(100);

        let mut building_counts: HashMap<String, u32> = HashMap::new();
        for (_, _, key) in &our_buildings {
            *building_counts.entry(key.clone()).or_default() += 1;
        }
        let refinery_count = *building_counts.get("refinery").unwrap_or(&0);
        let harvester_count = harvesters.iter().filter(|o| o.0 == Some(player_id)).count() as u32;
        let army_strength = combatants.iter().filter(|o| o.0 == Some(player_id)).count() as u32;
        let engineer_count = engineers.iter().filter(|o| o.0 == Some(player_id)).count() as u32;
        let mcv_count = keyed
            .iter()
            .filter(|(_, owner, _, key, kind)| owner.0 == Some(player_id) && kind.0 == Kind::Unit && key.0 == "mcv")
            .count() as u32;

        let Some(player) = players.0.get_mut(&player_id) else { continue };

        state.investment = decide_investment(state.threat_level, player.credits, &personality, refinery_count, harvester_count);

        let can_switch = tick.saturating_sub(state.last_strategy_change) >= STRATEGY_COOLDOWN_TICKS;
        let desired_strategy = decide_strategy(state.threat_level, player.credits, army_strength, &personality);
        if desired_strategy != state.strategy && (can_switch || state.threat_level >= PANIC_THREAT_THRESHOLD) {
            debug!(
                "ai player {:?} switching strategy {:?} -> {:?}",
                player_id, state.strategy, desired_strategy
            );
            state.strategy = desired_strategy;
            state.last_strategy_change = tick;
        }

        // Sell modules: at most one sale per tick, highest-urgency tier
        // wins. Each tier has its own cooldown so a player on the edge
        // of a threshold doesn't liquidate its base one building per
        // tick.
        if state.strategy == Strategy::AllIn && tick.saturating_sub(state.last_all_in_sell) >= ALL_IN_SELL_COOLDOWN_TICKS {
            let candidates = surplus_candidates(&our_buildings, &building_counts, &["power_plant", "refinery", "factory", "barracks", "airforce_command"]);
            if sell_one(&ruleset, player_id, player, &candidates, &mut sellable, &mut events, "all-in") {
                state.last_all_in_sell = tick;
            }
        } else if state.threat_level >= LAST_RESORT_THREAT_THRESHOLD
            && tick.saturating_sub(state.last_last_resort_sell) >= LAST_RESORT_SELL_COOLDOWN_TICKS
        {
            let candidates = surplus_candidates(&our_buildings, &building_counts, &["turret", "sam_site", "airforce_command", "factory", "barracks"]);
            if sell_one(&ruleset, player_id, player, &candidates, &mut sellable, &mut events, "last-resort") {
                state.last_last_resort_sell = tick;
            }
        } else if player.credits < personality.credit_buffer / 4
            && tick.saturating_sub(state.last_emergency_sell) >= EMERGENCY_SELL_COOLDOWN_TICKS
        {
            let candidates = surplus_candidates(&our_buildings, &building_counts, &["turret", "sam_site"]);
            if sell_one(&ruleset, player_id, player, &candidates, &mut sellable, &mut events, "emergency") {
                state.last_emergency_sell = tick;
            }
        }

        // Economy module: one START_BUILD per category per planning
        // tick, barracks before factory, surplus respecting maxCount.
        for &category in &personality.build_order_priority {
            if !player.queue_for(category).is_empty() {
                continue;
            }
            let Some(key) = pick_build_target(&ruleset, category, refinery_count, &building_counts, mcv_count, state.strategy, &personality) else {
                continue;
            };
            match queue_production(player, category, &key, &ruleset) {
                Ok(()) => {
                    events.push(SimEvent::ProductionStarted {
                        player: player_id,
                        category,
                        key,
                    });
                }
                Err(_err) => {
                    // Insufficient credits or no producer this tick; try
                    // again on the next staggered planning tick.
                }
            }
        }

        // Capture opportunities: train engineers, up to a cap, while a
        // valuable and undefended enemy building is in reach.
        if engineer_count < MAX_CAPTURE_ENGINEERS
            && player.infantry_queue.is_empty()
            && has_undefended_enemy_building(&keyed, &spatial, player_id)
        {
            if queue_production(player, BuildCategory::Infantry, "engineer", &ruleset).is_ok() {
                events.push(SimEvent::ProductionStarted {
                    player: player_id,
                    category: BuildCategory::Infantry,
                    key: "engineer".to_string(),
                });
            }
        }

        // MCV operations: an idle MCV heads for a distant, lightly
        // defended ore patch and deploys into a conyard on arrival.
        let mut ready_to_deploy: Vec<(Entity, Position)> = Vec::new();
        for (entity, owner, rule_key, mut movement, pos) in movers.iter_mut() {
            if owner.0 != Some(player_id) || rule_key.0 != "mcv" {
                continue;
            }
            match movement.final_dest.or(movement.move_target) {
                Some(target) if pos.distance(&target) <= MCV_ARRIVAL_RADIUS => {
                    ready_to_deploy.push((entity, *pos));
                }
                Some(_) => {}
                None => {
                    if let Some(site) = find_expansion_site(*pos, &wells, &spatial, player_id) {
                        movement.move_target = Some(site);
                        movement.final_dest = None;
                        movement.path.clear();
                    }
                }
            }
        }
        for (entity, pos) in ready_to_deploy {
            deploy_mcv_into_conyard(&mut commands, &mut id_alloc, &mut id_dir, &ruleset, tick, player_id, pos);
            commands.entity(entity).despawn();
        }
    }
}

fn decide_investment(
    threat_level: u32,
    credits: u32,
    personality: &AiPersonality,
    refinery_count: u32,
    harvester_count: u32,
) -> InvestmentPriority {
    if threat_level >= PANIC_THREAT_THRESHOLD {
        InvestmentPriority::Defense
    } else if credits < personality.credit_buffer || refinery_count == 0 || harvester_count < 2 {
        InvestmentPriority::Economy
    } else if credits > personality.credit_buffer.saturating_mul(6) && personality.aggression > 0.5 {
        InvestmentPriority::Warfare
    } else {
        InvestmentPriority::Balanced
    }
}

fn decide_strategy(threat_level: u32, credits: u32, army_strength: u32, personality: &AiPersonality) -> Strategy {
    if threat_level >= PANIC_THREAT_THRESHOLD {
        return Strategy::Defend;
    }
    if credits > personality.credit_buffer.saturating_mul(ALL_IN_CREDIT_MULTIPLE) && army_strength >= 10 && personality.aggression > 0.7 {
        return Strategy::AllIn;
    }
    if credits > personality.credit_buffer * 4 && personality.aggression > 0.6 {
        return Strategy::Attack;
    }
    Strategy::Expand
}

#[allow(clippy::too_many_arguments)]
fn pick_build_target(
    ruleset: &Ruleset,
    category: BuildCategory,
    refinery_count: u32,
    building_counts: &HashMap<String, u32>,
    mcv_count: u32,
    strategy: Strategy,
    personality: &AiPersonality,
) -> Option<String> {
    match category {
        BuildCategory::Building => {
            if refinery_count < ruleset.max_refineries {
                return Some("refinery".to_string());
            }
            if *building_counts.get("barracks").unwrap_or(&0) == 0 {
                return Some("barracks".to_string());
            }
            if *building_counts.get("factory").unwrap_or(&0) == 0 {
                return Some("factory".to_string());
            }
            for key in ["factory", "barracks", "airforce_command"] {
                let count = *building_counts.get(key).unwrap_or(&0);
                if under_max(ruleset, key, count) {
                    return Some(key.to_string());
                }
            }
            if personality.defense_investment > 0.3 {
                let turret_count = *building_counts.get("turret").unwrap_or(&0);
                if under_max(ruleset, "turret", turret_count) {
                    return Some("turret".to_string());
                }
            }
            Some("power_plant".to_string())
        }
        BuildCategory::Infantry => Some("rifleman".to_string()),
        BuildCategory::Vehicle => {
            if strategy == Strategy::Expand && mcv_count == 0 && refinery_count >= ruleset.max_refineries {
                Some("mcv".to_string())
            } else if personality.harvester_ratio > 0.3 {
                Some("harvester".to_string())
            } else {
                Some("light_tank".to_string())
            }
        }
        BuildCategory::Air => Some("harrier".to_string()),
    }
}

fn under_max(ruleset: &Ruleset, key: &str, count: u32) -> bool {
    match ruleset.building(key).and_then(|r| r.max_count) {
        Some(max) => count < max,
        None => true,
    }
}

/// Sellable surplus buildings in priority order: "essential" single
/// instances (the lone power plant, refinery, barracks, or factory) are
/// never offered, everything else matching `priority` is, in that
/// order.
fn surplus_candidates(buildings: &[(Entity, Position, String)], counts: &HashMap<String, u32>, priority: &[&str]) -> Vec<(Entity, String)> {
    let essential = |key: &str| matches!(key, "conyard" | "power_plant" | "refinery" | "barracks" | "factory");
    let mut out = Vec::new();
    for &key in priority {
        for (entity, _, k) in buildings {
            if k != key {
                continue;
            }
            if essential(key) && *counts.get(key).unwrap_or(&0) <= 1 {
                continue;
            }
            out.push((*entity, key.to_string()));
        }
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn sell_one(
    ruleset: &Ruleset,
    player_id: PlayerId,
    player: &mut crate::player::PlayerRecord,
    candidates: &[(Entity, String)],
    sellable: &mut Query<(&Id, &Owner, &RuleKey, &mut Hp, &mut Dead), With<BuildingState>>,
    events: &mut Vec<SimEvent>,
    reason: &str,
) -> bool {
    for (entity, rule_key) in candidates {
        let Some(rule) = ruleset.building(rule_key) else { continue };
        let Ok((id, owner, key, mut hp, mut dead)) = sellable.get_mut(*entity) else { continue };
        if dead.0 || owner.0 != Some(player_id) || key.0 != *rule_key {
            continue;
        }
        let refund = (rule.sell_refund_fraction * rule.cost as f32 * (hp.current / hp.max)).round() as u32;
        hp.current = 0.0;
        dead.0 = true;
        player.credits += refund;
        player.power_capacity -= rule.power_capacity;
        player.power_drawn -= rule.power_draw;
        debug!("ai player {:?} {} sale: {}", player_id, reason, rule_key);
        events.push(SimEvent::BuildingSold {
            player: player_id,
            building: id.0,
            refund,
        });
        return true;
    }
    false
}

fn has_undefended_enemy_building(keyed: &Query<(Entity, &Owner, &Position, &RuleKey, &EntityKind)>, spatial: &SpatialGrid, player_id: PlayerId) -> bool {
    const VALUABLE: [&str; 4] = ["factory", "barracks", "refinery", "airforce_command"];
    keyed.iter().any(|(_, owner, pos, key, kind)| {
        kind.0 == Kind::Building
            && owner.0.is_some()
            && owner.0 != Some(player_id)
            && VALUABLE.contains(&key.0.as_str())
            && spatial.query_friendlies(pos.x, pos.y, 250.0, owner.0).len() <= 1
    })
}

fn find_expansion_site(from: Position, wells: &Query<(&Position, &Well)>, spatial: &SpatialGrid, player_id: PlayerId) -> Option<Position> {
    wells
        .iter()
        .map(|(pos, _)| *pos)
        .filter(|pos| {
            let d = from.distance(pos);
            d >= DISTANT_ORE_MIN_RADIUS && d <= EXPANSION_SCAN_RADIUS
        })
        .min_by(|a, b| {
            let threat_a = spatial.query_enemies(a.x, a.y, 400.0, Some(player_id)).len();
            let threat_b = spatial.query_enemies(b.x, b.y, 400.0, Some(player_id)).len();
            threat_a
                .cmp(&threat_b)
                .then_with(|| from.distance(a).partial_cmp(&from.distance(b)).unwrap_or(std::cmp::Ordering::Equal))
        })
}

#[allow(clippy::too_many_arguments)]
fn deploy_mcv_into_conyard(
    commands: &mut Commands,
    id_alloc: &mut crate::ids::EntityIdAllocator,
    id_dir: &mut crate::ids::EntityDirectory,
    ruleset: &Ruleset,
    tick: u64,
    owner: PlayerId,
    pos: Position,
) {
    let rule = ruleset.building("conyard");
    let max_hp = rule.map(|r| r.max_hp).unwrap_or(1000.0);
    let (width, height) = rule
        .map(|r| (r.width_tiles as f32 * crate::grid::TILE, r.height_tiles as f32 * crate::grid::TILE))
        .unwrap_or((120.0, 120.0));

    let id = id_alloc.next();
    let entity = commands
        .spawn(BuildingBundle {
            header: HeaderBundle {
                id: Id(id),
                owner: Owner(Some(owner)),
                kind: EntityKind(Kind::Building),
                rule_key: RuleKey("conyard".into()),
                position: pos,
                previous_position: PreviousPosition(pos),
                hp: Hp::new(max_hp),
                bbox: BoundingBox { width, height, collision_radius: 0.0 },
                dead: Dead(false),
            },
            state: BuildingState {
                is_repairing: false,
                placed_tick: tick,
                rally_point: None,
                primary_for_category: Some(BuildCategory::Building),
            },
        })
        .id();
    id_dir.register(id, entity);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn personality() -> AiPersonality {
        AiPersonality::balanced()
    }

    #[test]
    fn investment_goes_defensive_under_panic_threat() {
        let p = personality();
        assert_eq!(decide_investment(80, 5000, &p, 2, 4), InvestmentPriority::Defense);
    }

    #[test]
    fn investment_stays_economy_with_too_few_harvesters() {
        let p = personality();
        assert_eq!(decide_investment(0, 5000, &p, 2, 1), InvestmentPriority::Economy);
    }

    #[test]
    fn investment_reaches_warfare_once_stockpiled_and_aggressive() {
        let mut p = personality();
        p.aggression = 0.8;
        assert_eq!(decide_investment(0, p.credit_buffer * 7, &p, 3, 4), InvestmentPriority::Warfare);
    }

    #[test]
    fn strategy_defends_under_panic_threat_regardless_of_credits() {
        let p = personality();
        assert_eq!(decide_strategy(75, 100_000, 20, &p), Strategy::Defend);
    }

    #[test]
    fn strategy_reaches_all_in_with_big_stockpile_army_and_aggression() {
        let mut p = personality();
        p.aggression = 0.9;
        let strategy = decide_strategy(0, p.credit_buffer * (ALL_IN_CREDIT_MULTIPLE + 1), 12, &p);
        assert_eq!(strategy, Strategy::AllIn);
    }

    #[test]
    fn strategy_attacks_with_moderate_stockpile_and_aggression() {
        let mut p = personality();
        p.aggression = 0.65;
        let strategy = decide_strategy(0, p.credit_buffer * 5, 3, &p);
        assert_eq!(strategy, Strategy::Attack);
    }

    #[test]
    fn strategy_defaults_to_expand() {
        let p = personality();
        assert_eq!(decide_strategy(0, p.credit_buffer, 0, &p), Strategy::Expand);
    }

    #[test]
    fn under_max_is_uncapped_when_ruleset_has_no_limit() {
        let ruleset = Ruleset::default();
        assert!(under_max(&ruleset, "power_plant", 50));
    }

    #[test]
    fn under_max_respects_building_cap() {
        let ruleset = Ruleset::default();
        assert!(under_max(&ruleset, "barracks", 1));
        assert!(!under_max(&ruleset, "barracks", 2));
    }

    #[test]
    fn pick_build_target_prefers_refinery_until_cap() {
        let ruleset = Ruleset::default();
        let counts = HashMap::new();
        let target = pick_build_target(&ruleset, BuildCategory::Building, 0, &counts, 0, Strategy::Expand, &personality());
        assert_eq!(target.as_deref(), Some("refinery"));
    }

    #[test]
    fn pick_build_target_wants_barracks_before_factory() {
        let ruleset = Ruleset::default();
        let counts = HashMap::new();
        let target = pick_build_target(&ruleset, BuildCategory::Building, ruleset.max_refineries, &counts, 0, Strategy::Expand, &personality());
        assert_eq!(target.as_deref(), Some("barracks"));
    }

    #[test]
    fn pick_build_target_moves_to_factory_once_barracks_exists() {
        let ruleset = Ruleset::default();
        let mut counts = HashMap::new();
        counts.insert("barracks".to_string(), 1);
        let target = pick_build_target(&ruleset, BuildCategory::Building, ruleset.max_refineries, &counts, 0, Strategy::Expand, &personality());
        assert_eq!(target.as_deref(), Some("factory"));
    }

    #[test]
    fn pick_build_target_stops_offering_capped_surplus() {
        let ruleset = Ruleset::default();
        let mut counts = HashMap::new();
        counts.insert("barracks".to_string(), 2);
        counts.insert("factory".to_string(), 2);
        let target = pick_build_target(&ruleset, BuildCategory::Building, ruleset.max_refineries, &counts, 0, Strategy::Expand, &personality());
        assert_ne!(target.as_deref(), Some("factory"));
        assert_ne!(target.as_deref(), Some("barracks"));
    }

    #[test]
    fn pick_build_target_queues_mcv_once_expanding_and_refineries_capped() {
        let ruleset = Ruleset::default();
        let mut counts = HashMap::new();
        counts.insert("barracks".to_string(), 1);
        counts.insert("factory".to_string(), 1);
        let target = pick_build_target(&ruleset, BuildCategory::Vehicle, ruleset.max_refineries, &counts, 0, Strategy::Expand, &personality());
        assert_eq!(target.as_deref(), Some("mcv"));
    }

    #[test]
    fn surplus_candidates_skip_the_lone_essential_instance() {
        let e = Entity::from_raw(1);
        let buildings = vec![(e, Position::new(0.0, 0.0), "barracks".to_string())];
        let mut counts = HashMap::new();
        counts.insert("barracks".to_string(), 1);
        let candidates = surplus_candidates(&buildings, &counts, &["barracks"]);
        assert!(candidates.is_empty());
    }

    #[test]
    fn surplus_candidates_offer_extras_beyond_the_first() {
        let e1 = Entity::from_raw(1);
        let e2 = Entity::from_raw(2);
        let buildings = vec![
            (e1, Position::new(0.0, 0.0), "barracks".to_string()),
            (e2, Position::new(10.0, 0.0), "barracks".to_string()),
        ];
        let mut counts = HashMap::new();
        counts.insert("barracks".to_string(), 2);
        let candidates = surplus_candidates(&buildings, &counts, &["barracks"]);
        assert_eq!(candidates.len(), 2);
    }
}
