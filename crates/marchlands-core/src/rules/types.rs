use std::collections::HashMap;

use marchlands_protocol::{
    CombatKind, DataId, Personality, ResourceKind, ResourceStock, TechId, TerrainId, UnitTypeId,
};
use serde::Deserialize;

use crate::rules::RulesError;

#[derive(Debug, Clone)]
pub struct CompiledRules {
    pub terrains: Vec<TerrainType>,
    pub unit_types: Vec<UnitType>,
    pub techs: Vec<Technology>,
    pub tuning: Tuning,

    pub terrain_ids: HashMap<DataId, TerrainId>,
    pub unit_type_ids: HashMap<DataId, UnitTypeId>,
    pub tech_ids: HashMap<DataId, TechId>,
}

impl CompiledRules {
    pub fn terrain(&self, id: TerrainId) -> &TerrainType {
        &self.terrains[id.index()]
    }

    pub fn unit_type(&self, id: UnitTypeId) -> &UnitType {
        &self.unit_types[id.index()]
    }

    pub fn tech(&self, id: TechId) -> Option<&Technology> {
        self.techs.get(id.index())
    }

    pub fn terrain_id(&self, data_id: &str) -> Option<TerrainId> {
        self.terrain_ids.get(data_id).copied()
    }

    pub fn unit_type_id(&self, data_id: &str) -> Option<UnitTypeId> {
        self.unit_type_ids.get(data_id).copied()
    }

    pub fn tech_id(&self, data_id: &str) -> Option<TechId> {
        self.tech_ids.get(data_id).copied()
    }

    pub fn unit_type_ids_ordered(&self) -> impl Iterator<Item = UnitTypeId> + '_ {
        (0..self.unit_types.len()).map(|i| UnitTypeId::new(i as u16))
    }

    pub fn tech_ids_ordered(&self) -> impl Iterator<Item = TechId> + '_ {
        (0..self.techs.len()).map(|i| TechId::new(i as u16))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawResourceChance {
    pub resource: ResourceKind,
    pub chance: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTerrainType {
    pub name: String,
    #[serde(default = "default_move_cost")]
    pub move_cost: i32,
    pub defense_bonus: i32,
    #[serde(default)]
    pub impassable: bool,
    #[serde(default)]
    pub water: bool,
    #[serde(default)]
    pub resources: Vec<RawResourceChance>,
}

fn default_move_cost() -> i32 {
    1
}

impl RawTerrainType {
    pub fn compile(self) -> TerrainType {
        TerrainType {
            name: self.name,
            move_cost: self.move_cost.max(1),
            defense_bonus: self.defense_bonus,
            impassable: self.impassable,
            water: self.water,
            resources: self
                .resources
                .into_iter()
                .map(|r| (r.resource, r.chance))
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TerrainType {
    pub name: String,
    /// Cost to enter; never below 1.
    pub move_cost: i32,
    /// Percentage added to a defender's defense.
    pub defense_bonus: i32,
    pub impassable: bool,
    pub water: bool,
    /// Spawn rolls in order; the first hit wins.
    pub resources: Vec<(ResourceKind, f32)>,
}

impl TerrainType {
    pub fn enter_cost(&self) -> Option<i32> {
        (!self.impassable).then_some(self.move_cost)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawUnitType {
    pub name: String,
    pub combat: CombatKind,
    pub max_hp: i32,
    pub attack: i32,
    pub defense: i32,
    #[serde(default = "default_range")]
    pub range: i32,
    pub moves: i32,
    #[serde(default)]
    pub vision: Option<i32>,
    pub cost: i32,
}

fn default_range() -> i32 {
    1
}

impl RawUnitType {
    pub fn compile(self, tuning: &Tuning) -> UnitType {
        let range = match self.combat {
            CombatKind::Melee => 1,
            CombatKind::Ranged => self.range.max(1),
        };
        UnitType {
            name: self.name,
            combat: self.combat,
            max_hp: self.max_hp.max(1),
            attack: self.attack.max(0),
            defense: self.defense.max(0),
            range,
            moves: self.moves.max(0),
            vision: self.vision.unwrap_or(tuning.unit_vision).max(0),
            cost: self.cost.max(1),
            unlocked_by: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnitType {
    pub name: String,
    pub combat: CombatKind,
    pub max_hp: i32,
    pub attack: i32,
    pub defense: i32,
    /// Attack distance; melee units always have 1.
    pub range: i32,
    pub moves: i32,
    pub vision: i32,
    /// Production points required.
    pub cost: i32,
    /// `None` means available from the start.
    pub unlocked_by: Option<TechId>,
}

impl UnitType {
    pub fn is_ranged(&self) -> bool {
        self.combat == CombatKind::Ranged
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawTechEffect {
    UnlockUnit { unit: String },
    CityYield { resource: ResourceKind, amount: i32 },
    ResearchBonus { pct: i32 },
    ProductionBonus { pct: i32 },
    CityDefense { pct: i32 },
    RangedRange { amount: i32 },
}

impl RawTechEffect {
    fn compile(self, unit_ids: &HashMap<DataId, UnitTypeId>) -> Result<TechEffect, RulesError> {
        Ok(match self {
            RawTechEffect::UnlockUnit { unit } => TechEffect::UnlockUnit(
                unit_ids
                    .get(&unit)
                    .copied()
                    .ok_or(RulesError::MissingId(unit))?,
            ),
            RawTechEffect::CityYield { resource, amount } => {
                TechEffect::CityYield { resource, amount }
            }
            RawTechEffect::ResearchBonus { pct } => TechEffect::ResearchBonus(pct),
            RawTechEffect::ProductionBonus { pct } => TechEffect::ProductionBonus(pct),
            RawTechEffect::CityDefense { pct } => TechEffect::CityDefense(pct),
            RawTechEffect::RangedRange { amount } => TechEffect::RangedRange(amount),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TechEffect {
    UnlockUnit(UnitTypeId),
    CityYield { resource: ResourceKind, amount: i32 },
    ResearchBonus(i32),
    ProductionBonus(i32),
    CityDefense(i32),
    RangedRange(i32),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTechnology {
    pub name: String,
    pub cost: i32,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub effects: Vec<RawTechEffect>,
}

impl RawTechnology {
    pub fn compile(
        self,
        tech_ids: &HashMap<DataId, TechId>,
        unit_ids: &HashMap<DataId, UnitTypeId>,
    ) -> Result<Technology, RulesError> {
        let prerequisites = self
            .prerequisites
            .into_iter()
            .map(|p| tech_ids.get(&p).copied().ok_or(RulesError::MissingId(p)))
            .collect::<Result<Vec<_>, _>>()?;
        let effects = self
            .effects
            .into_iter()
            .map(|e| e.compile(unit_ids))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Technology {
            name: self.name,
            cost: self.cost.max(1),
            prerequisites,
            effects,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Technology {
    pub name: String,
    pub cost: i32,
    pub prerequisites: Vec<TechId>,
    pub effects: Vec<TechEffect>,
}

/// AI weights, all in percent.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PersonalityWeights {
    pub military: i32,
    pub economy: i32,
    pub research: i32,
    pub defense: i32,
    /// Units below this share of max HP fall back toward a friendly city.
    pub retreat_below_pct: i32,
    /// Attacks that would leave the attacker below this share of max HP are
    /// withheld while a retreat is still possible.
    pub safety_floor_pct: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonalityTable {
    pub aggressive: PersonalityWeights,
    pub balanced: PersonalityWeights,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tuning {
    pub research_per_turn: i32,
    pub production_per_turn: i32,
    pub fortify_bonus_pct: i32,
    pub unit_heal_per_turn: i32,
    pub unit_vision: i32,
    pub city_max_hp: i32,
    pub city_heal_per_turn: i32,
    pub city_defense: i32,
    pub city_vision: i32,
    pub worked_radius: i32,
    pub free_units: i32,
    pub upkeep_gold_per_unit: i32,
    pub path_node_limit: usize,
    pub starting_resources: ResourceStock,
    pub city_income: ResourceStock,
    pub resource_yields: ResourceStock,
    pub personalities: PersonalityTable,
}

impl Tuning {
    /// Human civilizations never consult these; they map to the balanced
    /// table so previews stay well-defined.
    pub fn weights(&self, personality: Personality) -> &PersonalityWeights {
        match personality {
            Personality::Aggressive => &self.personalities.aggressive,
            Personality::Balanced | Personality::Human => &self.personalities.balanced,
        }
    }
}
