//! Turn cycle: `HumanInput -> Ai[0..n] -> EndOfTurn -> HumanInput`, until a
//! single civilization is left standing and the game parks in `GameOver`.

use std::collections::BTreeSet;

use marchlands_protocol::{CivId, Event, ResourceKind, ResourceStock, TurnPhase};
use tracing::{debug, info};

use crate::ai::run_ai_turn;
use crate::game::{GameEngine, GameError};

const RESOURCE_KINDS: [ResourceKind; 4] = [
    ResourceKind::Food,
    ResourceKind::Wood,
    ResourceKind::Stone,
    ResourceKind::Gold,
];

impl GameEngine {
    /// Ends the human phase, runs every living AI civilization in list
    /// order, then resolves the end of the turn.
    pub fn end_turn(&mut self) -> Result<Vec<Event>, GameError> {
        match self.state.phase {
            TurnPhase::HumanInput => {}
            TurnPhase::GameOver { .. } => return Err(GameError::GameOver),
            TurnPhase::Ai { .. } | TurnPhase::EndOfTurn => return Err(GameError::NotYourTurn),
        }

        let mut events = Vec::new();
        let ai_civs: Vec<CivId> = self
            .state
            .living_civs()
            .filter(|c| c.is_ai())
            .map(|c| c.id)
            .collect();
        for civ in ai_civs {
            self.enter_phase(TurnPhase::Ai { civ }, &mut events);
            events.extend(run_ai_turn(self, civ));
        }

        self.enter_phase(TurnPhase::EndOfTurn, &mut events);
        self.resolve_end_of_turn(&mut events);

        let living: Vec<CivId> = self.state.living_civs().map(|c| c.id).collect();
        if living.len() <= 1 {
            let winner = living.first().copied();
            info!(turn = self.state.turn, ?winner, "game over");
            self.enter_phase(TurnPhase::GameOver { winner }, &mut events);
            events.push(Event::GameOver { winner });
            return Ok(events);
        }

        events.push(Event::TurnEnded {
            turn: self.state.turn,
        });
        self.state.turn += 1;
        self.enter_phase(TurnPhase::HumanInput, &mut events);
        info!(
            turn = self.state.turn,
            units = self.state.units.len(),
            cities = self.state.cities.len(),
            "turn started"
        );
        Ok(events)
    }

    fn enter_phase(&mut self, phase: TurnPhase, events: &mut Vec<Event>) {
        self.state.phase = phase;
        events.push(Event::PhaseChanged {
            turn: self.state.turn,
            phase,
        });
    }

    fn resolve_end_of_turn(&mut self, events: &mut Vec<Event>) {
        self.resolve_production(events);
        self.resolve_research(events);
        self.resolve_economy();
        self.refresh_units_and_cities();

        let civ_ids: Vec<CivId> = self.state.living_civs().map(|c| c.id).collect();
        for civ in &civ_ids {
            events.extend(self.state.refresh_visibility(&self.rules, *civ));
        }

        for civ in civ_ids {
            let has_units = self.state.units_of(civ).next().is_some();
            let has_cities = self.state.cities_of(civ).next().is_some();
            if has_units || has_cities {
                continue;
            }
            if let Some(c) = self.state.civ_mut(civ) {
                c.eliminated = true;
                info!(civ = %civ, name = %c.name, "civilization eliminated");
            }
            events.push(Event::CivEliminated { civ });
        }
    }

    /// At most one item finishes per city per turn. A finished unit with no
    /// free tile to stand on waits, keeping its points.
    fn resolve_production(&mut self, events: &mut Vec<Event>) {
        for city_id in self.state.cities.ids_ordered() {
            let Some(city) = self.state.cities.get(city_id) else {
                continue;
            };
            let owner = city.owner;
            let Some(civ) = self.state.civ(owner) else {
                continue;
            };
            let points = self.rules.tuning.production_per_turn
                * (100 + civ.tech.bonuses.production_pct)
                / 100;

            let Some(city) = self.state.cities.get_mut(city_id) else {
                continue;
            };
            city.add_production(points);
            if city.ready_item(&self.rules).is_none() {
                continue;
            }

            let Some(city) = self.state.cities.get(city_id) else {
                continue;
            };
            let Some(at) = self.state.spawn_tile(&self.rules, city) else {
                debug!(city = %city_id, "no free tile for finished unit");
                continue;
            };
            let Some(unit_type) = self
                .state
                .cities
                .get_mut(city_id)
                .and_then(|c| c.complete_item(&self.rules))
            else {
                continue;
            };
            match self.state.spawn_unit(&self.rules, unit_type, owner, at) {
                Ok(unit) => {
                    info!(
                        city = %city_id,
                        unit = %unit,
                        kind = %self.rules.unit_type(unit_type).name,
                        "unit produced"
                    );
                    events.push(Event::UnitProduced {
                        city: city_id,
                        unit,
                        unit_type,
                        at,
                    });
                }
                Err(err) => debug!(city = %city_id, %err, "unit placement failed"),
            }
        }
    }

    fn resolve_research(&mut self, events: &mut Vec<Event>) {
        for civ in self.state.civs.iter_mut().filter(|c| c.is_alive()) {
            let rate = civ.tech.research_rate(&self.rules);
            if let Some(tech) = civ.tech.advance(&self.rules, rate) {
                let name = self
                    .rules
                    .tech(tech)
                    .map(|t| t.name.as_str())
                    .unwrap_or("?");
                info!(civ = %civ.id, tech = name, "technology researched");
                events.push(Event::TechResearched { civ: civ.id, tech });
            }
        }
    }

    /// Income per city plus tech yields plus resource tiles near cities,
    /// minus unit upkeep. A tile worked by two cities of one civilization
    /// pays once.
    fn resolve_economy(&mut self) {
        let tuning = &self.rules.tuning;
        for i in 0..self.state.civs.len() {
            let civ_id = self.state.civs[i].id;
            if self.state.civs[i].eliminated {
                continue;
            }

            let mut worked = BTreeSet::new();
            let mut city_count = 0;
            for (_, city) in self.state.cities_of(civ_id) {
                city_count += 1;
                worked.extend(
                    self.state
                        .map
                        .indices_in_radius(city.position, tuning.worked_radius),
                );
            }

            let mut income = ResourceStock::default();
            let per_city = self.state.civs[i].tech.bonuses.city_yield;
            for kind in RESOURCE_KINDS {
                income.add(
                    kind,
                    (tuning.city_income.get(kind) + per_city.get(kind)) * city_count,
                );
            }
            for index in worked {
                if let Some(kind) = self.state.map.tile_at_index(index).and_then(|t| t.resource) {
                    income.add(kind, tuning.resource_yields.get(kind));
                }
            }

            let units = self.state.units_of(civ_id).count() as i32;
            let upkeep = (units - tuning.free_units).max(0) * tuning.upkeep_gold_per_unit;

            let civ = &mut self.state.civs[i];
            for kind in RESOURCE_KINDS {
                civ.resources.add(kind, income.get(kind));
            }
            civ.resources.add(ResourceKind::Gold, -upkeep);
        }
    }

    fn refresh_units_and_cities(&mut self) {
        let heal = self.rules.tuning.unit_heal_per_turn;
        for (_, unit) in self.state.units.iter_ordered_mut() {
            unit.refresh(self.rules.unit_type(unit.type_id), heal);
        }
        let (city_heal, city_max) = (
            self.rules.tuning.city_heal_per_turn,
            self.rules.tuning.city_max_hp,
        );
        for (_, city) in self.state.cities.iter_ordered_mut() {
            city.heal(city_heal, city_max);
        }
    }
}
