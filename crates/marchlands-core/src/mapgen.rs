//! Seeded square-grid map generation.
//!
//! Elevation and moisture start as white noise from [`GameRng`], get
//! box-smoothed, and are stretched back to `[0, 1]` before terrain
//! thresholds apply. A map is rerolled (seed + attempt) until it is mostly
//! land and has room for every civilization's start.

use marchlands_protocol::{ResourceKind, TerrainId, TilePos};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::map::{GameMap, Tile};
use crate::rng::GameRng;
use crate::rules::CompiledRules;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapGenError {
    #[error("map dimensions must be non-zero (got {width}x{height})")]
    EmptyMap { width: u32, height: u32 },
    #[error("map has {passable} passable tiles but {needed} civilizations")]
    NotEnoughLand { passable: usize, needed: usize },
}

/// Configuration for map generation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapGenConfig {
    pub width: u32,
    pub height: u32,
    pub num_civs: u32,
    /// Minimum Manhattan distance between starts.
    pub min_start_distance: i32,
    pub max_attempts: u32,
    /// Fraction of tiles that must be passable for a map to be accepted.
    pub min_land_ratio: f32,
    pub smoothing_passes: u32,
}

impl Default for MapGenConfig {
    fn default() -> Self {
        Self {
            width: 40,
            height: 30,
            num_civs: 3,
            min_start_distance: 8,
            max_attempts: 10,
            min_land_ratio: 0.3,
            smoothing_passes: 3,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct TerrainPalette {
    grass: TerrainId,
    forest: TerrainId,
    hills: TerrainId,
    desert: TerrainId,
    mountain: TerrainId,
    water: TerrainId,
}

impl TerrainPalette {
    fn from_rules(rules: &CompiledRules) -> Self {
        let grass = rules
            .terrain_id("grass")
            .unwrap_or_else(|| TerrainId::new(0));
        let forest = rules.terrain_id("forest").unwrap_or(grass);
        let hills = rules.terrain_id("hills").unwrap_or(grass);
        let desert = rules.terrain_id("desert").unwrap_or(grass);
        let mountain = rules.terrain_id("mountain").unwrap_or(hills);
        let water = rules.terrain_id("water").unwrap_or(mountain);

        Self {
            grass,
            forest,
            hills,
            desert,
            mountain,
            water,
        }
    }

    fn terrain_for(self, elevation: f32, moisture: f32) -> TerrainId {
        if elevation < 0.25 {
            self.water
        } else if elevation < 0.35 {
            self.desert
        } else if elevation < 0.60 {
            if moisture > 0.55 {
                self.forest
            } else {
                self.grass
            }
        } else if elevation < 0.75 {
            if moisture > 0.5 {
                self.forest
            } else {
                self.hills
            }
        } else {
            self.mountain
        }
    }
}

/// Result of map generation.
#[derive(Clone, Debug)]
pub struct GeneratedMap {
    pub map: GameMap,
    /// One per civilization, in civilization order.
    pub start_positions: Vec<TilePos>,
    /// Seed of the accepted attempt.
    pub seed: u64,
}

/// Generate a map with the given configuration and seed.
pub fn generate_map(
    rules: &CompiledRules,
    config: &MapGenConfig,
    seed: u64,
) -> Result<GeneratedMap, MapGenError> {
    if config.width == 0 || config.height == 0 {
        return Err(MapGenError::EmptyMap {
            width: config.width,
            height: config.height,
        });
    }
    let palette = TerrainPalette::from_rules(rules);
    let needed = config.num_civs as usize;
    let attempts = config.max_attempts.max(1);

    for attempt in 0..attempts {
        let attempt_seed = seed.wrapping_add(u64::from(attempt));
        let mut rng = GameRng::seed_from_u64(attempt_seed);
        let map = generate_terrain(rules, palette, config, &mut rng);

        let passable = count_passable(&map, rules);
        let land_ratio = passable as f32 / map.len() as f32;
        let is_last = attempt + 1 == attempts;

        if land_ratio >= config.min_land_ratio {
            if let Some(starts) = find_start_positions(&map, rules, palette, config, &mut rng) {
                debug!(seed = attempt_seed, attempt, land_ratio, "map accepted");
                return Ok(GeneratedMap {
                    map,
                    start_positions: starts,
                    seed: attempt_seed,
                });
            }
        }

        if is_last {
            if passable < needed {
                return Err(MapGenError::NotEnoughLand { passable, needed });
            }
            warn!(
                seed = attempt_seed,
                land_ratio, "no map met start criteria, using relaxed starts"
            );
            let starts = relaxed_start_positions(&map, rules, config, &mut rng);
            return Ok(GeneratedMap {
                map,
                start_positions: starts,
                seed: attempt_seed,
            });
        }
    }

    // `attempts >= 1` and the last attempt always returns.
    Err(MapGenError::NotEnoughLand {
        passable: 0,
        needed,
    })
}

fn generate_terrain(
    rules: &CompiledRules,
    palette: TerrainPalette,
    config: &MapGenConfig,
    rng: &mut GameRng,
) -> GameMap {
    let (width, height) = (config.width, config.height);
    let size = (width as usize) * (height as usize);

    let mut elevation = noise_layer(size, rng);
    let mut moisture = noise_layer(size, rng);
    let mut variation = noise_layer(size, rng);
    for _ in 0..config.smoothing_passes {
        elevation = smooth(&elevation, width, height);
        moisture = smooth(&moisture, width, height);
    }
    for _ in 0..2 {
        variation = smooth(&variation, width, height);
    }
    for (e, v) in elevation.iter_mut().zip(&variation) {
        *e = 0.7 * *e + 0.3 * v;
    }
    normalize(&mut elevation);
    normalize(&mut moisture);

    let tiles = elevation
        .iter()
        .zip(&moisture)
        .map(|(&e, &m)| {
            let terrain = palette.terrain_for(e, m);
            Tile {
                terrain,
                resource: roll_resource(rules, terrain, rng),
            }
        })
        .collect();

    GameMap::from_tiles(width, height, tiles)
        .unwrap_or_else(|| GameMap::new(width, height, palette.grass))
}

fn noise_layer(size: usize, rng: &mut GameRng) -> Vec<f32> {
    (0..size).map(|_| rng.next_f32()).collect()
}

/// One 3x3 box-filter pass with the centre weighted double. Edge tiles
/// average over their in-bounds neighbours only.
fn smooth(values: &[f32], width: u32, height: u32) -> Vec<f32> {
    let (w, h) = (width as i32, height as i32);
    let mut out = vec![0.0f32; values.len()];
    for y in 0..h {
        for x in 0..w {
            let mut sum = 0.0f32;
            let mut weight = 0.0f32;
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx >= w || ny >= h {
                        continue;
                    }
                    let k = if dx == 0 && dy == 0 { 2.0 } else { 1.0 };
                    sum += values[(ny * w + nx) as usize] * k;
                    weight += k;
                }
            }
            out[(y * w + x) as usize] = sum / weight;
        }
    }
    out
}

/// Stretches values onto `[0, 1]`. A flat layer becomes all 0.5.
fn normalize(values: &mut [f32]) {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let span = max - min;
    for v in values.iter_mut() {
        *v = if span > f32::EPSILON {
            (*v - min) / span
        } else {
            0.5
        };
    }
}

fn roll_resource(
    rules: &CompiledRules,
    terrain: TerrainId,
    rng: &mut GameRng,
) -> Option<ResourceKind> {
    rules
        .terrain(terrain)
        .resources
        .iter()
        .find(|(_, chance)| rng.next_f32() < *chance)
        .map(|(kind, _)| *kind)
}

fn count_passable(map: &GameMap, rules: &CompiledRules) -> usize {
    map.tiles()
        .iter()
        .filter(|t| !rules.terrain(t.terrain).impassable)
        .count()
}

fn is_good_start(
    map: &GameMap,
    rules: &CompiledRules,
    palette: TerrainPalette,
    index: usize,
) -> bool {
    let Some(tile) = map.tile_at_index(index) else {
        return false;
    };
    if tile.terrain != palette.grass {
        return false;
    }
    let water_neighbors = map
        .neighbors_indices(index)
        .into_iter()
        .flatten()
        .filter_map(|n| map.tile_at_index(n))
        .filter(|t| rules.terrain(t.terrain).water)
        .count();
    if water_neighbors > 2 {
        return false;
    }
    let Some(pos) = map.pos_at_index(index) else {
        return false;
    };
    let resources = map
        .indices_in_radius(pos, 3)
        .into_iter()
        .filter_map(|i| map.tile_at_index(i))
        .filter(|t| t.resource.is_some())
        .count();
    resources >= 2
}

fn pick_spread(candidates: &[TilePos], count: usize, min_distance: i32) -> Option<Vec<TilePos>> {
    let mut picked: Vec<TilePos> = Vec::with_capacity(count);
    for &pos in candidates {
        if picked.iter().all(|p| p.distance(pos) >= min_distance) {
            picked.push(pos);
            if picked.len() == count {
                return Some(picked);
            }
        }
    }
    (count == 0).then(Vec::new)
}

fn find_start_positions(
    map: &GameMap,
    rules: &CompiledRules,
    palette: TerrainPalette,
    config: &MapGenConfig,
    rng: &mut GameRng,
) -> Option<Vec<TilePos>> {
    let mut candidates: Vec<TilePos> = (0..map.len())
        .filter(|&i| is_good_start(map, rules, palette, i))
        .filter_map(|i| map.pos_at_index(i))
        .collect();
    rng.shuffle(&mut candidates);
    pick_spread(&candidates, config.num_civs as usize, config.min_start_distance)
}

/// Any passable tile, halving the spacing until everyone fits. Caller has
/// checked there are at least `num_civs` passable tiles.
fn relaxed_start_positions(
    map: &GameMap,
    rules: &CompiledRules,
    config: &MapGenConfig,
    rng: &mut GameRng,
) -> Vec<TilePos> {
    let mut candidates: Vec<TilePos> = map
        .tiles()
        .iter()
        .enumerate()
        .filter(|(_, t)| !rules.terrain(t.terrain).impassable)
        .filter_map(|(i, _)| map.pos_at_index(i))
        .collect();
    rng.shuffle(&mut candidates);

    let count = config.num_civs as usize;
    let mut distance = config.min_start_distance.max(1);
    loop {
        if let Some(starts) = pick_spread(&candidates, count, distance) {
            return starts;
        }
        if distance <= 1 {
            // Distinct tiles always fit since candidates.len() >= count.
            return candidates.into_iter().take(count).collect();
        }
        distance /= 2;
    }
}
