//! Whole-state snapshots. The encoding is MessagePack with named fields, so a
//! snapshot survives field reordering and hashes identically for identical
//! states.

use marchlands_protocol::{hash_bytes_fnv1a64, UnitTypeId};
use rmp_serde::{decode, encode};
use thiserror::Error;

use crate::game::{GameEngine, GameState};
use crate::rules::CompiledRules;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("encode error: {0}")]
    Encode(#[from] encode::Error),
    #[error("decode error: {0}")]
    Decode(#[from] decode::Error),
    #[error("snapshot does not match the loaded rules: {0}")]
    RulesMismatch(String),
}

pub fn encode_state(state: &GameState) -> Result<Vec<u8>, SnapshotError> {
    Ok(encode::to_vec_named(state)?)
}

pub fn decode_state(bytes: &[u8]) -> Result<GameState, SnapshotError> {
    Ok(decode::from_slice(bytes)?)
}

/// Stable 64-bit fingerprint of a state (FNV-1a over its encoding).
pub fn state_hash(state: &GameState) -> Result<u64, SnapshotError> {
    let bytes = encode_state(state)?;
    Ok(hash_bytes_fnv1a64(&bytes))
}

impl GameEngine {
    pub fn snapshot(&self) -> Result<Vec<u8>, SnapshotError> {
        encode_state(&self.state)
    }

    pub fn state_hash(&self) -> Result<u64, SnapshotError> {
        state_hash(&self.state)
    }

    /// Replaces the current state. The rules are kept, so a snapshot must
    /// come from a game played under the same rules; one that refers to
    /// terrain, units or techs the rules lack is rejected and the current
    /// state is left alone.
    pub fn restore(&mut self, bytes: &[u8]) -> Result<(), SnapshotError> {
        let state = decode_state(bytes)?;
        check_against_rules(&state, &self.rules)?;
        self.state = state;
        Ok(())
    }
}

fn check_against_rules(state: &GameState, rules: &CompiledRules) -> Result<(), SnapshotError> {
    let mismatch = |what: String| Err(SnapshotError::RulesMismatch(what));
    let known_unit = |id: UnitTypeId| id.index() < rules.unit_types.len();

    if let Some(tile) = state
        .map
        .tiles()
        .iter()
        .find(|t| t.terrain.index() >= rules.terrains.len())
    {
        return mismatch(format!("unknown terrain {:?}", tile.terrain));
    }
    for (id, unit) in state.units.iter_ordered() {
        if !known_unit(unit.type_id) {
            return mismatch(format!("unit {id} has unknown type {:?}", unit.type_id));
        }
        if !state.map.in_bounds(unit.position) {
            return mismatch(format!("unit {id} is off the map"));
        }
    }
    for (id, city) in state.cities.iter_ordered() {
        if !state.map.in_bounds(city.position) {
            return mismatch(format!("city {id} is off the map"));
        }
        if let Some(bad) = city.production_queue.iter().find(|t| !known_unit(**t)) {
            return mismatch(format!("city {id} queues unknown type {bad:?}"));
        }
    }
    for civ in &state.civs {
        if civ.fog.tiles().len() != state.map.len() {
            return mismatch(format!("fog of {} does not cover the map", civ.id));
        }
        if !civ.tech.fits(rules) {
            return mismatch(format!("research of {} does not fit the tech tree", civ.id));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::rules::{load_rules, RulesSource};

    fn engine() -> GameEngine {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let config = GameConfig {
            seed: 7,
            ..GameConfig::default()
        }
        .all_ai();
        GameEngine::new(&config, rules).expect("setup")
    }

    #[test]
    fn snapshot_restores_an_identical_state() {
        let engine = engine();
        let bytes = engine.snapshot().expect("encode");
        let decoded = decode_state(&bytes).expect("decode");

        assert_eq!(state_hash(&decoded).unwrap(), engine.state_hash().unwrap());
        assert_eq!(decoded.turn, engine.turn());
        assert_eq!(decoded.phase, engine.phase());
        assert_eq!(decoded.units.len(), engine.state().units.len());
        assert_eq!(decoded.civs, engine.state().civs);
    }

    #[test]
    fn restored_game_continues_like_the_original() {
        let mut original = engine();
        let mut copy = engine();
        let bytes = original.snapshot().unwrap();
        copy.restore(&bytes).unwrap();

        original.end_turn().unwrap();
        copy.end_turn().unwrap();
        assert_eq!(original.state_hash().unwrap(), copy.state_hash().unwrap());
    }

    #[test]
    fn hash_tracks_state_changes() {
        let mut engine = engine();
        let before = engine.state_hash().unwrap();
        engine.end_turn().unwrap();
        assert_ne!(engine.state_hash().unwrap(), before);
    }

    #[test]
    fn snapshot_with_unknown_unit_type_is_refused() {
        let mut engine = engine();
        let mut foreign = engine.state().clone();
        let (id, _) = foreign.units.iter_ordered().next().expect("a unit");
        foreign.units.get_mut(id).unwrap().type_id = UnitTypeId::new(999);
        let bytes = encode_state(&foreign).unwrap();

        let before = engine.state_hash().unwrap();
        assert!(matches!(
            engine.restore(&bytes),
            Err(SnapshotError::RulesMismatch(_))
        ));
        assert_eq!(engine.state_hash().unwrap(), before);
        engine.end_turn().expect("current state still plays");
    }

    #[test]
    fn snapshot_with_unknown_queued_type_is_refused() {
        let mut engine = engine();
        let mut foreign = engine.state().clone();
        let (id, _) = foreign.cities.iter_ordered().next().expect("a city");
        foreign
            .cities
            .get_mut(id)
            .unwrap()
            .production_queue
            .push_back(UnitTypeId::new(999));
        let bytes = encode_state(&foreign).unwrap();

        assert!(matches!(
            engine.restore(&bytes),
            Err(SnapshotError::RulesMismatch(_))
        ));
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(matches!(
            decode_state(&[0xc1, 0x00, 0x13]),
            Err(SnapshotError::Decode(_))
        ));
    }
}
