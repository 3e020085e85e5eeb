use serde::{Deserialize, Serialize};

use crate::{CityId, CivId, UnitId};

/// Behaviour profile of a civilization. `Human` civilizations never run AI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Personality {
    Human,
    Aggressive,
    Balanced,
}

impl Personality {
    pub fn is_ai(self) -> bool {
        !matches!(self, Personality::Human)
    }
}

/// Per-civilization knowledge of a tile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FogState {
    #[default]
    Unseen,
    Seen,
    Visible,
}

impl FogState {
    pub fn is_known(self) -> bool {
        !matches!(self, FogState::Unseen)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Food,
    Wood,
    Stone,
    Gold,
}

/// A bundle of the four stockpiled resources.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceStock {
    pub food: i32,
    pub wood: i32,
    pub stone: i32,
    pub gold: i32,
}

impl ResourceStock {
    pub fn get(&self, kind: ResourceKind) -> i32 {
        match kind {
            ResourceKind::Food => self.food,
            ResourceKind::Wood => self.wood,
            ResourceKind::Stone => self.stone,
            ResourceKind::Gold => self.gold,
        }
    }

    pub fn add(&mut self, kind: ResourceKind, amount: i32) {
        let slot = match kind {
            ResourceKind::Food => &mut self.food,
            ResourceKind::Wood => &mut self.wood,
            ResourceKind::Stone => &mut self.stone,
            ResourceKind::Gold => &mut self.gold,
        };
        *slot = slot.saturating_add(amount).max(0);
    }

    pub fn total(&self) -> i32 {
        self.food + self.wood + self.stone + self.gold
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatKind {
    Melee,
    Ranged,
}

/// Something a unit can attack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AttackTarget {
    Unit(UnitId),
    City(CityId),
}

/// Result of one attack. Damage values are what was actually applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatOutcome {
    pub defender_damage: i32,
    /// Zero unless the defender survived and could strike back.
    pub counter_damage: i32,
    pub defender_died: bool,
    pub attacker_died: bool,
}

/// Turn controller states.
///
/// `HumanInput -> Ai { .. } (per living AI civ, in list order) -> EndOfTurn ->
/// HumanInput`, until `GameOver`, which is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum TurnPhase {
    HumanInput,
    Ai { civ: CivId },
    EndOfTurn,
    GameOver { winner: Option<CivId> },
}

impl TurnPhase {
    pub fn is_game_over(self) -> bool {
        matches!(self, TurnPhase::GameOver { .. })
    }
}
