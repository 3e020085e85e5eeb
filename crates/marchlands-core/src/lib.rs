pub mod ai;
mod city;
mod civilization;
mod combat;
mod config;
mod entities;
mod game;
mod map;
pub mod mapgen;
mod pathfinding;
mod rng;
mod rules;
mod snapshot;
mod tech;
mod turn;
mod unit;
mod visibility;

pub use crate::city::*;
pub use crate::civilization::*;
pub use crate::combat::*;
pub use crate::config::*;
pub use crate::entities::*;
pub use crate::game::*;
pub use crate::map::*;
pub use crate::mapgen::{generate_map, GeneratedMap, MapGenConfig, MapGenError};
pub use crate::pathfinding::*;
pub use crate::rng::*;
pub use crate::rules::*;
pub use crate::snapshot::*;
pub use crate::tech::*;
pub use crate::unit::*;
pub use crate::visibility::*;
