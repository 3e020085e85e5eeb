use marchlands_protocol::{CivId, TilePos, UnitTypeId};
use serde::{Deserialize, Serialize};

use crate::rules::{CompiledRules, UnitType};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub type_id: UnitTypeId,
    pub owner: CivId,
    pub position: TilePos,
    pub hp: i32,
    pub moves_left: i32,
    pub fortified: bool,
    pub has_attacked: bool,
}

impl Unit {
    pub fn new(type_id: UnitTypeId, owner: CivId, position: TilePos, rules: &CompiledRules) -> Self {
        let unit_type = rules.unit_type(type_id);
        Self {
            type_id,
            owner,
            position,
            hp: unit_type.max_hp,
            moves_left: unit_type.moves,
            fortified: false,
            has_attacked: false,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn can_attack(&self) -> bool {
        self.is_alive() && !self.has_attacked
    }

    pub fn take_damage(&mut self, amount: i32) {
        self.hp = (self.hp - amount.max(0)).max(0);
    }

    /// Percentage of max HP left, 0..=100.
    pub fn health_pct(&self, unit_type: &UnitType) -> i32 {
        self.hp.max(0) * 100 / unit_type.max_hp.max(1)
    }

    /// Start-of-turn refresh: full movement, attack available, heal.
    pub fn refresh(&mut self, unit_type: &UnitType, heal: i32) {
        self.moves_left = unit_type.moves;
        self.has_attacked = false;
        if self.hp < unit_type.max_hp {
            self.hp = (self.hp + heal.max(0)).min(unit_type.max_hp);
        }
    }

    /// Attacking spends the rest of the turn and breaks fortification, even
    /// if the attacker dies from the counter.
    pub fn spend_attack(&mut self) {
        self.has_attacked = true;
        self.moves_left = 0;
        self.fortified = false;
    }
}
