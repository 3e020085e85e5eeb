//! Shared vocabulary of the Marchlands simulation: ids, coordinates,
//! commands, events, and their wire encodings.

mod command;
mod coord;
mod event;
mod ids;
mod types;
mod wire;

pub use crate::command::*;
pub use crate::coord::*;
pub use crate::event::*;
pub use crate::ids::*;
pub use crate::types::*;
pub use crate::wire::*;
