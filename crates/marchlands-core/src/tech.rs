//! Technology progress for one civilization.
//!
//! Completing a tech is all-or-nothing: it enters the researched set and every
//! one of its effects lands in the same call, or nothing changes.

use marchlands_protocol::{ResourceStock, TechId, UnitTypeId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rules::{CompiledRules, TechEffect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TechError {
    #[error("unknown technology")]
    UnknownTech,
    #[error("technology already researched")]
    AlreadyResearched,
    #[error("technology prerequisites not met")]
    PrerequisiteNotMet,
}

/// Numeric bonuses accumulated from researched techs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechBonuses {
    pub research_pct: i32,
    pub production_pct: i32,
    pub city_defense_pct: i32,
    pub ranged_range: i32,
    /// Extra income per city.
    pub city_yield: ResourceStock,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechProgress {
    researched: Vec<bool>,
    unit_available: Vec<bool>,
    pub researching: Option<TechId>,
    pub points: i32,
    pub bonuses: TechBonuses,
}

impl TechProgress {
    /// Fresh progress: nothing researched, only units without an unlocking
    /// tech available.
    pub fn new(rules: &CompiledRules) -> Self {
        Self {
            researched: vec![false; rules.techs.len()],
            unit_available: rules
                .unit_types
                .iter()
                .map(|u| u.unlocked_by.is_none())
                .collect(),
            researching: None,
            points: 0,
            bonuses: TechBonuses::default(),
        }
    }

    /// Whether this progress was built for `rules`: one slot per tech and per
    /// unit type, and no out-of-range selection.
    pub fn fits(&self, rules: &CompiledRules) -> bool {
        self.researched.len() == rules.techs.len()
            && self.unit_available.len() == rules.unit_types.len()
            && self.researching.map_or(true, |t| rules.tech(t).is_some())
    }

    pub fn is_researched(&self, tech: TechId) -> bool {
        self.researched.get(tech.index()).copied().unwrap_or(false)
    }

    pub fn researched_count(&self) -> usize {
        self.researched.iter().filter(|r| **r).count()
    }

    pub fn researched_ids(&self) -> impl Iterator<Item = TechId> + '_ {
        self.researched
            .iter()
            .enumerate()
            .filter(|(_, r)| **r)
            .map(|(i, _)| TechId::new(i as u16))
    }

    pub fn can_build(&self, unit_type: UnitTypeId) -> bool {
        self.unit_available
            .get(unit_type.index())
            .copied()
            .unwrap_or(false)
    }

    /// True iff every prerequisite is researched. Says nothing about whether
    /// `tech` itself is already done.
    pub fn can_research(&self, rules: &CompiledRules, tech: TechId) -> bool {
        rules
            .tech(tech)
            .is_some_and(|t| t.prerequisites.iter().all(|p| self.is_researched(*p)))
    }

    /// Techs that are not yet researched and whose prerequisites are met.
    pub fn available(&self, rules: &CompiledRules) -> Vec<TechId> {
        rules
            .tech_ids_ordered()
            .filter(|t| !self.is_researched(*t) && self.can_research(rules, *t))
            .collect()
    }

    /// Points per turn after bonuses.
    pub fn research_rate(&self, rules: &CompiledRules) -> i32 {
        rules.tuning.research_per_turn * (100 + self.bonuses.research_pct) / 100
    }

    /// Selects `tech`. Re-selecting the current tech keeps its progress and
    /// returns `Ok(false)`; switching keeps banked points for the new target.
    pub fn select(&mut self, rules: &CompiledRules, tech: TechId) -> Result<bool, TechError> {
        if rules.tech(tech).is_none() {
            return Err(TechError::UnknownTech);
        }
        if self.is_researched(tech) {
            return Err(TechError::AlreadyResearched);
        }
        if !self.can_research(rules, tech) {
            return Err(TechError::PrerequisiteNotMet);
        }
        if self.researching == Some(tech) {
            return Ok(false);
        }
        self.researching = Some(tech);
        Ok(true)
    }

    /// Adds `points` toward the current tech and completes it once its cost
    /// is reached. Overflow stays banked for the next selection.
    pub fn advance(&mut self, rules: &CompiledRules, points: i32) -> Option<TechId> {
        let tech_id = self.researching?;
        let tech = rules.tech(tech_id)?;
        self.points = self.points.saturating_add(points.max(0));
        if self.points < tech.cost {
            return None;
        }
        self.points -= tech.cost;
        self.researching = None;
        self.complete(rules, tech_id);
        Some(tech_id)
    }

    fn complete(&mut self, rules: &CompiledRules, tech_id: TechId) {
        let Some(tech) = rules.tech(tech_id) else {
            return;
        };
        if let Some(slot) = self.researched.get_mut(tech_id.index()) {
            *slot = true;
        }
        for effect in &tech.effects {
            match *effect {
                TechEffect::UnlockUnit(unit) => {
                    if let Some(slot) = self.unit_available.get_mut(unit.index()) {
                        *slot = true;
                    }
                }
                TechEffect::CityYield { resource, amount } => {
                    self.bonuses.city_yield.add(resource, amount);
                }
                TechEffect::ResearchBonus(pct) => self.bonuses.research_pct += pct,
                TechEffect::ProductionBonus(pct) => self.bonuses.production_pct += pct,
                TechEffect::CityDefense(pct) => self.bonuses.city_defense_pct += pct,
                TechEffect::RangedRange(amount) => self.bonuses.ranged_range += amount,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{load_rules, RulesSource};

    #[test]
    fn prerequisites_gate_selection() {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let mut progress = TechProgress::new(&rules);
        let bronze = rules.tech_id("bronze_working").unwrap();
        let mining = rules.tech_id("mining").unwrap();

        assert!(!progress.can_research(&rules, bronze));
        assert_eq!(
            progress.select(&rules, bronze),
            Err(TechError::PrerequisiteNotMet)
        );
        assert_eq!(progress.select(&rules, mining), Ok(true));
        assert_eq!(progress.select(&rules, mining), Ok(false));
    }

    #[test]
    fn effects_apply_exactly_at_cost() {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let mut progress = TechProgress::new(&rules);
        let archery = rules.tech_id("archery").unwrap();
        let archer = rules.unit_type_id("archer").unwrap();
        progress.select(&rules, archery).unwrap();

        assert_eq!(progress.advance(&rules, 29), None);
        assert!(!progress.can_build(archer));
        assert!(!progress.is_researched(archery));

        assert_eq!(progress.advance(&rules, 5), Some(archery));
        assert!(progress.can_build(archer));
        assert!(progress.is_researched(archery));
        assert_eq!(progress.points, 4);
        assert_eq!(progress.researching, None);

        assert_eq!(
            progress.select(&rules, archery),
            Err(TechError::AlreadyResearched)
        );
    }

    #[test]
    fn bonuses_accumulate() {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let mut progress = TechProgress::new(&rules);
        assert_eq!(progress.research_rate(&rules), 5);

        let writing = rules.tech_id("writing").unwrap();
        progress.select(&rules, writing).unwrap();
        progress.advance(&rules, 35);
        assert_eq!(progress.bonuses.research_pct, 50);
        assert_eq!(progress.research_rate(&rules), 7);

        let agriculture = rules.tech_id("agriculture").unwrap();
        progress.select(&rules, agriculture).unwrap();
        progress.advance(&rules, 20);
        assert_eq!(progress.bonuses.city_yield.food, 2);
        assert_eq!(progress.researched_count(), 2);
    }

    #[test]
    fn idle_research_banks_nothing() {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let mut progress = TechProgress::new(&rules);
        assert_eq!(progress.advance(&rules, 50), None);
        assert_eq!(progress.points, 0);
    }
}
