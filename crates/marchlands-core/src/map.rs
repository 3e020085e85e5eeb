use marchlands_protocol::{ResourceKind, TerrainId, TilePos};
use serde::{Deserialize, Serialize};

use crate::rules::CompiledRules;

/// Terrain is fixed after generation; the resource marker is the only other
/// per-tile datum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub terrain: TerrainId,
    pub resource: Option<ResourceKind>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameMap {
    width: u32,
    height: u32,
    tiles: Vec<Tile>,
}

impl GameMap {
    pub fn new(width: u32, height: u32, default_terrain: TerrainId) -> Self {
        let tiles = vec![
            Tile {
                terrain: default_terrain,
                resource: None,
            };
            (width as usize) * (height as usize)
        ];
        Self {
            width,
            height,
            tiles,
        }
    }

    /// `tiles` is row-major and must hold exactly `width * height` entries.
    pub fn from_tiles(width: u32, height: u32, tiles: Vec<Tile>) -> Option<Self> {
        if tiles.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(Self {
            width,
            height,
            tiles,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn in_bounds(&self, pos: TilePos) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width as i32 && pos.y < self.height as i32
    }

    pub fn index_of(&self, pos: TilePos) -> Option<usize> {
        if !self.in_bounds(pos) {
            return None;
        }
        Some(pos.y as usize * self.width as usize + pos.x as usize)
    }

    pub fn pos_at_index(&self, index: usize) -> Option<TilePos> {
        if index >= self.tiles.len() {
            return None;
        }
        let x = (index % self.width as usize) as i32;
        let y = (index / self.width as usize) as i32;
        Some(TilePos::new(x, y))
    }

    /// In-bounds neighbours in N, E, S, W order.
    pub fn neighbors_indices(&self, index: usize) -> [Option<usize>; 4] {
        let Some(pos) = self.pos_at_index(index) else {
            return [None; 4];
        };
        pos.neighbors().map(|n| self.index_of(n))
    }

    /// Indices within Manhattan `radius` of `center` (inclusive), ascending.
    pub fn indices_in_radius(&self, center: TilePos, radius: i32) -> Vec<usize> {
        if !self.in_bounds(center) {
            return Vec::new();
        }
        let radius = radius.max(0);
        let mut out = Vec::new();
        for y in (center.y - radius)..=(center.y + radius) {
            let span = radius - (y - center.y).abs();
            for x in (center.x - span)..=(center.x + span) {
                if let Some(index) = self.index_of(TilePos::new(x, y)) {
                    out.push(index);
                }
            }
        }
        out
    }

    pub fn get(&self, pos: TilePos) -> Option<&Tile> {
        self.index_of(pos).map(|i| &self.tiles[i])
    }

    pub fn get_mut(&mut self, pos: TilePos) -> Option<&mut Tile> {
        self.index_of(pos).map(move |i| &mut self.tiles[i])
    }

    pub fn tile_at_index(&self, index: usize) -> Option<&Tile> {
        self.tiles.get(index)
    }
}

/// Cost to step onto the tile at `index`, or `None` if it cannot be entered.
pub fn movement_cost_to_enter(map: &GameMap, rules: &CompiledRules, index: usize) -> Option<i32> {
    let tile = map.tile_at_index(index)?;
    rules.terrain(tile.terrain).enter_cost()
}

pub fn is_passable(map: &GameMap, rules: &CompiledRules, pos: TilePos) -> bool {
    map.index_of(pos)
        .and_then(|i| movement_cost_to_enter(map, rules, i))
        .is_some()
}

/// Terrain defense bonus in percent; out-of-bounds tiles give none.
pub fn terrain_defense_bonus(map: &GameMap, rules: &CompiledRules, pos: TilePos) -> i32 {
    map.get(pos)
        .map(|t| rules.terrain(t.terrain).defense_bonus)
        .unwrap_or(0)
}
