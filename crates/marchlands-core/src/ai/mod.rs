//! Computer players. Everything an AI does goes through
//! `GameEngine::apply_command`, so it is held to the same rules as a human.

mod strategic;
mod tactical;

pub use strategic::{update_objectives, StrategicGoal, StrategicPlan};
pub use tactical::{attack_intents, plan_and_execute, plan_unit, step_toward, Intent};

use marchlands_protocol::{CivId, Command, Event, UnitId};
use tracing::debug;

use crate::game::GameEngine;
use tactical::issue;

/// Plays one AI phase for `civ`: research and production first, then each
/// unit that existed when the phase began, in id order.
pub fn run_ai_turn(engine: &mut GameEngine, civ: CivId) -> Vec<Event> {
    let plan = update_objectives(engine.state(), engine.rules(), civ);
    debug!(
        civ = %civ,
        goal = ?plan.goal,
        objective = ?plan.objective,
        "ai plan"
    );

    let mut events = Vec::new();
    if let Some(tech) = plan.research {
        issue(engine, Command::SetResearch { civ, tech }, &mut events);
    }
    for &(city, unit_type) in &plan.production {
        issue(
            engine,
            Command::QueueProduction { city, unit_type },
            &mut events,
        );
    }

    let unit_ids: Vec<UnitId> = engine.state().units_of(civ).map(|(id, _)| id).collect();
    for unit_id in unit_ids {
        // Earlier fights this phase may have removed it.
        if !engine.state().units.contains(unit_id) {
            continue;
        }
        let issued = plan_and_execute(engine, unit_id, &plan, &mut events);
        if issued.is_empty() {
            debug!(unit = %unit_id, "unit skipped");
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CivConfig;
    use crate::game::GameState;
    use crate::map::GameMap;
    use crate::rules::{load_rules, RulesSource};
    use marchlands_protocol::{Personality, TilePos, TurnPhase};

    fn engine() -> GameEngine {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let grass = rules.terrain_id("grass").unwrap();
        let map = GameMap::new(12, 8, grass);
        let civs = [
            CivConfig::new("Raiders", Personality::Aggressive),
            CivConfig::new("Settlers", Personality::Balanced),
        ];
        let mut state = GameState::new(map, &civs, &rules);
        let warrior = rules.unit_type_id("warrior").unwrap();
        state
            .found_city(&rules, "Raid Camp", CivId(0), TilePos::new(1, 1))
            .unwrap();
        state
            .spawn_unit(&rules, warrior, CivId(0), TilePos::new(5, 4))
            .unwrap();
        state
            .found_city(&rules, "Farmstead", CivId(1), TilePos::new(10, 6))
            .unwrap();
        state
            .spawn_unit(&rules, warrior, CivId(1), TilePos::new(6, 4))
            .unwrap();
        for civ in [CivId(0), CivId(1)] {
            state.refresh_visibility(&rules, civ);
        }
        state.phase = TurnPhase::Ai { civ: CivId(0) };
        GameEngine::from_state(rules, state)
    }

    #[test]
    fn ai_turn_sets_research_and_production() {
        let mut engine = engine();
        run_ai_turn(&mut engine, CivId(0));

        let civ = engine.state().civ(CivId(0)).unwrap();
        assert_eq!(civ.tech.researching, engine.rules().tech_id("archery"));
        let (_, city) = engine.state().cities_of(CivId(0)).next().unwrap();
        assert!(city.is_producing());
    }

    #[test]
    fn ai_turn_attacks_an_adjacent_enemy() {
        let mut engine = engine();
        let events = run_ai_turn(&mut engine, CivId(0));
        assert!(events.iter().any(|e| matches!(e, Event::Combat { .. })));
        let (_, enemy) = engine.state().units_of(CivId(1)).next().unwrap();
        assert!(enemy.hp < 100);
    }

    #[test]
    fn ai_turn_only_touches_its_own_civ() {
        let mut engine = engine();
        run_ai_turn(&mut engine, CivId(0));
        let other = engine.state().civ(CivId(1)).unwrap();
        assert_eq!(other.tech.researching, None);
        let (_, city) = engine.state().cities_of(CivId(1)).next().unwrap();
        assert!(!city.is_producing());
    }
}
