//! Per-civilization fog of war.
//!
//! Each turn the visible set is rebuilt from scratch: every tile that was
//! `Visible` drops to `Seen`, then tiles inside a vision source's Manhattan
//! radius become `Visible`. Nothing ever returns to `Unseen`.

use marchlands_protocol::{CivId, FogState, TilePos};
use serde::{Deserialize, Serialize};

use crate::city::City;
use crate::entities::EntityStore;
use crate::map::GameMap;
use crate::rules::CompiledRules;
use crate::unit::Unit;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FogOfWar {
    tiles: Vec<FogState>,
}

impl FogOfWar {
    pub fn new(map_len: usize) -> Self {
        Self {
            tiles: vec![FogState::Unseen; map_len],
        }
    }

    pub fn state(&self, index: usize) -> FogState {
        self.tiles.get(index).copied().unwrap_or_default()
    }

    pub fn is_visible(&self, index: usize) -> bool {
        self.state(index) == FogState::Visible
    }

    pub fn is_known(&self, index: usize) -> bool {
        self.state(index).is_known()
    }

    pub fn tiles(&self) -> &[FogState] {
        &self.tiles
    }

    pub fn visible_indices(&self) -> Vec<usize> {
        self.tiles
            .iter()
            .enumerate()
            .filter_map(|(i, s)| (*s == FogState::Visible).then_some(i))
            .collect()
    }

    /// Rebuilds the visible set from `(center, radius)` sources and returns
    /// how many tiles were seen for the first time.
    pub fn recompute(&mut self, map: &GameMap, sources: &[(TilePos, i32)]) -> usize {
        if self.tiles.len() != map.len() {
            self.tiles.resize(map.len(), FogState::Unseen);
        }
        for state in &mut self.tiles {
            if *state == FogState::Visible {
                *state = FogState::Seen;
            }
        }

        let mut revealed = 0;
        for &(center, radius) in sources {
            for index in map.indices_in_radius(center, radius) {
                if self.tiles[index] == FogState::Unseen {
                    revealed += 1;
                }
                self.tiles[index] = FogState::Visible;
            }
        }
        revealed
    }
}

/// Vision sources for `civ`: every living unit at its type's vision radius and
/// every city at the city radius.
pub fn vision_sources(
    units: &EntityStore<Unit>,
    cities: &EntityStore<City>,
    rules: &CompiledRules,
    civ: CivId,
) -> Vec<(TilePos, i32)> {
    let unit_sources = units
        .iter_ordered()
        .filter(|(_, u)| u.owner == civ && u.is_alive())
        .map(|(_, u)| (u.position, rules.unit_type(u.type_id).vision));
    let city_sources = cities
        .iter_ordered()
        .filter(|(_, c)| c.owner == civ)
        .map(|(_, c)| (c.position, rules.tuning.city_vision));
    unit_sources.chain(city_sources).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{load_rules, RulesSource};

    fn open_map() -> (CompiledRules, GameMap) {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let grass = rules.terrain_id("grass").unwrap();
        let map = GameMap::new(10, 10, grass);
        (rules, map)
    }

    #[test]
    fn radius_is_a_manhattan_diamond() {
        let (_rules, map) = open_map();
        let mut fog = FogOfWar::new(map.len());
        let revealed = fog.recompute(&map, &[(TilePos::new(5, 5), 2)]);
        assert_eq!(revealed, 13);
        assert!(fog.is_visible(map.index_of(TilePos::new(5, 3)).unwrap()));
        assert!(!fog.is_visible(map.index_of(TilePos::new(6, 3)).unwrap()));
    }

    #[test]
    fn seen_tiles_never_revert_to_unseen() {
        let (_rules, map) = open_map();
        let mut fog = FogOfWar::new(map.len());
        fog.recompute(&map, &[(TilePos::new(1, 1), 1)]);
        let corner = map.index_of(TilePos::new(1, 0)).unwrap();
        assert_eq!(fog.state(corner), FogState::Visible);

        let revealed = fog.recompute(&map, &[(TilePos::new(8, 8), 1)]);
        assert_eq!(revealed, 5);
        assert_eq!(fog.state(corner), FogState::Seen);

        fog.recompute(&map, &[]);
        assert!(fog.tiles().iter().all(|s| *s != FogState::Visible));
        assert_eq!(fog.state(corner), FogState::Seen);
    }

    #[test]
    fn sources_cover_units_and_cities() {
        let (rules, map) = open_map();
        let warrior = rules.unit_type_id("warrior").unwrap();
        let mut units = EntityStore::default();
        let mut cities = EntityStore::default();
        units.insert(Unit::new(warrior, CivId(0), TilePos::new(0, 0), &rules));
        units.insert(Unit::new(warrior, CivId(1), TilePos::new(9, 9), &rules));
        cities.insert(City::new("A", CivId(0), TilePos::new(4, 4), &rules));

        let sources = vision_sources(&units, &cities, &rules, CivId(0));
        assert_eq!(
            sources,
            vec![(TilePos::new(0, 0), 2), (TilePos::new(4, 4), 3)]
        );

        let mut fog = FogOfWar::new(map.len());
        fog.recompute(&map, &sources);
        assert!(!fog.is_known(map.index_of(TilePos::new(9, 9)).unwrap()));
    }
}
