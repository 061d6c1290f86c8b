//! Per-player record: economy, power, and the four production queues.

use crate::error::ProductionError;
use crate::ids::EntityId;
use crate::ruleset::{BuildCategory, Ruleset};
use serde::{Deserialize, Serialize};

const DEFAULT_MAX_QUEUE_SIZE: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionItem {
    pub rule_key: String,
    pub progress_ticks: u32,
    pub total_ticks: u32,
    pub invested_credits: u32,
    pub total_cost: u32,
}

impl ProductionItem {
    pub fn new(rule_key: String, total_ticks: u32, total_cost: u32) -> Self {
        Self {
            rule_key,
            progress_ticks: 0,
            total_ticks: total_ticks.max(1),
            invested_credits: 0,
            total_cost,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.progress_ticks >= self.total_ticks
    }

    pub fn percentage(&self) -> f32 {
        (self.progress_ticks as f32 / self.total_ticks as f32 * 100.0).min(100.0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductionQueue {
    pub current: Option<ProductionItem>,
    pub queued: std::collections::VecDeque<String>,
    pub ready_to_place: Option<String>,
}

impl ProductionQueue {
    pub fn is_full(&self) -> bool {
        self.queued.len() >= DEFAULT_MAX_QUEUE_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.queued.is_empty()
    }

    pub fn enqueue(&mut self, rule_key: String, total_ticks: u32, total_cost: u32) -> Result<(), ProductionError> {
        if self.current.is_none() {
            self.current = Some(ProductionItem::new(rule_key, total_ticks, total_cost));
        } else {
            if self.is_full() {
                return Err(ProductionError::QueueFull);
            }
            self.queued.push_back(rule_key);
        }
        Ok(())
    }

    /// Cancels the currently-building item, returning its progress-scaled
    /// refund (see `cancel_refund`), and pulls the next queued item in.
    pub fn cancel_current(&mut self) -> Option<(ProductionItem, u32)> {
        let item = self.current.take()?;
        let refund = cancel_refund(&item);
        if let Some(next_key) = self.queued.pop_front() {
            // Total ticks/cost for the next item are re-derived by the
            // caller (production system) from the ruleset; here we only
            // know the key, so leave current empty and let the system
            // re-enqueue it on the next tick.
            self.queued.push_front(next_key);
        }
        Some((item, refund))
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.queued.clear();
        self.ready_to_place = None;
    }
}

/// Progress-scaled refund: the later an item is canceled, the more of its
/// invested credits are lost (mirrors production.rs's
/// `base_refund * progress_factor / 100`).
pub fn cancel_refund(item: &ProductionItem) -> u32 {
    let progress_factor = 100u32.saturating_sub(item.progress_ticks.saturating_mul(100) / item.total_ticks);
    (item.invested_credits * progress_factor) / 100
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub credits: u32,
    pub power_capacity: i32,
    pub power_drawn: i32,
    pub building_queue: ProductionQueue,
    pub infantry_queue: ProductionQueue,
    pub vehicle_queue: ProductionQueue,
    pub air_queue: ProductionQueue,
    pub color: String,
    pub difficulty: Difficulty,
    pub is_ai: bool,
    pub ai_personality: Option<String>,
    pub eliminated: bool,
    pub conyard_id: Option<EntityId>,
}

impl PlayerRecord {
    pub fn new(color: impl Into<String>, is_ai: bool) -> Self {
        Self {
            credits: 3000,
            power_capacity: 0,
            power_drawn: 0,
            building_queue: ProductionQueue::default(),
            infantry_queue: ProductionQueue::default(),
            vehicle_queue: ProductionQueue::default(),
            air_queue: ProductionQueue::default(),
            color: color.into(),
            difficulty: Difficulty::Normal,
            is_ai,
            ai_personality: None,
            eliminated: false,
            conyard_id: None,
        }
    }

    pub fn queue_for(&self, category: BuildCategory) -> &ProductionQueue {
        match category {
            BuildCategory::Building => &self.building_queue,
            BuildCategory::Infantry => &self.infantry_queue,
            BuildCategory::Vehicle => &self.vehicle_queue,
            BuildCategory::Air => &self.air_queue,
        }
    }

    pub fn queue_for_mut(&mut self, category: BuildCategory) -> &mut ProductionQueue {
        match category {
            BuildCategory::Building => &mut self.building_queue,
            BuildCategory::Infantry => &mut self.infantry_queue,
            BuildCategory::Vehicle => &mut self.vehicle_queue,
            BuildCategory::Air => &mut self.air_queue,
        }
    }

    pub fn power_factor(&self) -> f32 {
        if self.power_drawn <= self.power_capacity {
            1.0
        } else {
            0.25
        }
    }

    pub fn has_power_deficit(&self) -> bool {
        self.power_drawn > self.power_capacity
    }
}

pub fn queue_production(
    player: &mut PlayerRecord,
    category: BuildCategory,
    rule_key: &str,
    ruleset: &Ruleset,
) -> Result<(), ProductionError> {
    let (build_time, cost) = match category {
        BuildCategory::Building => {
            let rule = ruleset
                .building(rule_key)
                .ok_or_else(|| ProductionError::UnknownKey(rule_key.to_string()))?;
            (rule.build_time_ticks, rule.cost)
        }
        _ => {
            let rule = ruleset
                .unit(rule_key)
                .ok_or_else(|| ProductionError::UnknownKey(rule_key.to_string()))?;
            if rule.category != category {
                return Err(ProductionError::UnknownKey(rule_key.to_string()));
            }
            (rule.build_time_ticks, rule.cost)
        }
    };

    if player.credits < cost.min(1) {
        return Err(ProductionError::InsufficientCredits {
            needed: cost,
            have: player.credits,
        });
    }

    player.queue_for_mut(category).enqueue(rule_key.to_string(), build_time, cost)
}

pub fn cancel_production(player: &mut PlayerRecord, category: BuildCategory) -> Result<u32, ProductionError> {
    let queue = player.queue_for_mut(category);
    let (_item, refund) = queue.cancel_current().ok_or(ProductionError::NothingQueued)?;
    player.credits += refund;
    Ok(refund)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_refund_scales_with_progress() {
        let mut item = ProductionItem::new("barracks".into(), 100, 400);
        item.invested_credits = 200;
        item.progress_ticks = 50;
        // Halfway through: progress_factor = 50, refund = 200*50/100 = 100.
        assert_eq!(cancel_refund(&item), 100);

        item.progress_ticks = 0;
        assert_eq!(cancel_refund(&item), 200);

        item.progress_ticks = 100;
        assert_eq!(cancel_refund(&item), 0);
    }

    #[test]
    fn queue_rejects_when_full() {
        let mut q = ProductionQueue::default();
        q.enqueue("a".into(), 10, 100).unwrap();
        for i in 0..DEFAULT_MAX_QUEUE_SIZE {
            let r = q.enqueue(format!("b{i}"), 10, 100);
            if i == DEFAULT_MAX_QUEUE_SIZE - 1 {
                assert!(matches!(r, Err(ProductionError::QueueFull)));
            } else {
                assert!(r.is_ok());
            }
        }
    }
}
