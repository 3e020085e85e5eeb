use std::collections::VecDeque;

use marchlands_protocol::{CivId, TilePos, UnitTypeId};
use serde::{Deserialize, Serialize};

use crate::rules::CompiledRules;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub owner: CivId,
    pub position: TilePos,
    pub hp: i32,
    /// Unit types to build, front first.
    pub production_queue: VecDeque<UnitTypeId>,
    pub production_points: i32,
}

impl City {
    pub fn new(name: impl Into<String>, owner: CivId, position: TilePos, rules: &CompiledRules) -> Self {
        Self {
            name: name.into(),
            owner,
            position,
            hp: rules.tuning.city_max_hp,
            production_queue: VecDeque::new(),
            production_points: 0,
        }
    }

    pub fn current_item(&self) -> Option<UnitTypeId> {
        self.production_queue.front().copied()
    }

    pub fn is_producing(&self) -> bool {
        !self.production_queue.is_empty()
    }

    /// Points only accrue while something is queued.
    pub fn add_production(&mut self, points: i32) {
        if self.is_producing() {
            self.production_points = self.production_points.saturating_add(points.max(0));
        }
    }

    /// The front item, if enough points have accrued to finish it.
    pub fn ready_item(&self, rules: &CompiledRules) -> Option<UnitTypeId> {
        let item = self.current_item()?;
        (self.production_points >= rules.unit_type(item).cost).then_some(item)
    }

    /// Pops the finished front item and pays its cost. Call only once the
    /// produced unit has been placed.
    pub fn complete_item(&mut self, rules: &CompiledRules) -> Option<UnitTypeId> {
        let item = self.ready_item(rules)?;
        self.production_queue.pop_front();
        self.production_points -= rules.unit_type(item).cost;
        Some(item)
    }

    pub fn production_remaining(&self, rules: &CompiledRules) -> i32 {
        self.current_item()
            .map(|item| (rules.unit_type(item).cost - self.production_points).max(0))
            .unwrap_or(0)
    }

    pub fn take_damage(&mut self, amount: i32) {
        self.hp = (self.hp - amount.max(0)).max(0);
    }

    pub fn heal(&mut self, amount: i32, max_hp: i32) {
        self.hp = (self.hp + amount.max(0)).min(max_hp);
    }

    pub fn is_destroyed(&self) -> bool {
        self.hp <= 0
    }
}
