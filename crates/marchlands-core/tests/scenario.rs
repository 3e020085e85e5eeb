use std::collections::BTreeSet;

use marchlands_core::{
    load_rules, CivConfig, CompiledRules, GameConfig, GameEngine, GameMap, GameState,
    RulesSource, EMBEDDED_TECHS, EMBEDDED_TERRAIN, EMBEDDED_TUNING, EMBEDDED_UNITS,
};
use marchlands_protocol::{CivId, CombatOutcome, Personality, TilePos, TurnPhase};

/// Points sunk into research so far, finished techs included.
fn research_invested(engine: &GameEngine, civ: CivId) -> i32 {
    let civ = engine.state().civ(civ).expect("civ");
    let finished: i32 = civ
        .tech
        .researched_ids()
        .filter_map(|t| engine.rules().tech(t))
        .map(|t| t.cost)
        .sum();
    finished + civ.tech.points
}

fn assert_no_shared_tiles(state: &GameState) {
    let mut occupied = BTreeSet::new();
    for (id, unit) in state.units.iter_ordered() {
        assert!(
            occupied.insert(unit.position),
            "unit {id} shares {:?}",
            unit.position
        );
    }
}

#[test]
fn seed_42_first_turn_without_human_commands() {
    let config = GameConfig::default();
    assert_eq!(config.seed, 42);
    assert_eq!((config.map.width, config.map.height), (40, 30));
    assert_eq!(config.civs.len(), 3);

    let mut engine = GameEngine::from_config(&config).expect("setup");
    assert_eq!(engine.state().map.width(), 40);
    assert_eq!(engine.state().map.height(), 30);
    assert_no_shared_tiles(engine.state());

    let ai_civs: Vec<CivId> = engine
        .state()
        .civs
        .iter()
        .filter(|c| c.is_ai())
        .map(|c| c.id)
        .collect();
    assert_eq!(ai_civs.len(), 2);
    let before: Vec<i32> = ai_civs
        .iter()
        .map(|c| research_invested(&engine, *c))
        .collect();

    engine.end_turn().expect("end turn");

    assert_eq!(engine.turn(), 2);
    assert_eq!(engine.phase(), TurnPhase::HumanInput);
    for (civ, before) in ai_civs.iter().zip(before) {
        assert!(research_invested(&engine, *civ) >= before);
        assert!(engine.state().civ(*civ).unwrap().tech.researching.is_some()
            || engine.state().civ(*civ).unwrap().tech.researched_count() > 0);
    }
    assert_no_shared_tiles(engine.state());
}

const DUEL_UNIT: &str = "
raider:
  name: Raider
  combat: melee
  max_hp: 100
  attack: 8
  defense: 4
  range: 1
  moves: 2
  cost: 40
";

fn duel_rules() -> CompiledRules {
    let units = format!("{EMBEDDED_UNITS}\n{DUEL_UNIT}");
    load_rules(RulesSource::Bytes {
        terrain: EMBEDDED_TERRAIN.as_bytes(),
        units: units.as_bytes(),
        techs: EMBEDDED_TECHS.as_bytes(),
        tuning: EMBEDDED_TUNING.as_bytes(),
    })
    .expect("rules load")
}

fn duel() -> (CombatOutcome, u64) {
    let rules = duel_rules();
    let grass = rules.terrain_id("grass").unwrap();
    let raider = rules.unit_type_id("raider").unwrap();
    let civs = [
        CivConfig::new("Player", Personality::Human),
        CivConfig::new("Rival", Personality::Balanced),
    ];
    let mut state = GameState::new(GameMap::new(6, 4, grass), &civs, &rules);
    let attacker = state
        .spawn_unit(&rules, raider, CivId(0), TilePos::new(2, 1))
        .unwrap();
    let defender = state
        .spawn_unit(&rules, raider, CivId(1), TilePos::new(3, 1))
        .unwrap();
    for civ in [CivId(0), CivId(1)] {
        state.refresh_visibility(&rules, civ);
    }

    let mut engine = GameEngine::from_state(rules, state);
    let outcome = engine.attack(attacker, defender).expect("attack");
    (outcome, engine.state_hash().expect("hash"))
}

#[test]
fn forced_duel_is_deterministic() {
    let (first, first_hash) = duel();
    let (second, second_hash) = duel();

    // 8 attack at full health into 4 defense on open grass.
    assert_eq!(first.defender_damage, 5);
    assert_eq!(first.counter_damage, 4);
    assert!(!first.defender_died);
    assert!(!first.attacker_died);
    assert_eq!(first, second);
    assert_eq!(first_hash, second_hash);
}
