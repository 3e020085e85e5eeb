use serde::{Deserialize, Serialize};

use crate::{
    AttackTarget, CityId, CivId, CombatOutcome, TechId, TilePos, TurnPhase, UnitId, UnitTypeId,
};

/// Facts emitted by the simulation. Front ends replay these to animate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    UnitMoved {
        unit: UnitId,
        path: Vec<TilePos>,
        moves_left: i32,
    },
    UnitFortified {
        unit: UnitId,
    },
    Combat {
        attacker: UnitId,
        target: AttackTarget,
        outcome: CombatOutcome,
    },
    UnitDied {
        unit: UnitId,
        owner: CivId,
    },
    CityDestroyed {
        city: CityId,
        owner: CivId,
    },
    ProductionQueued {
        city: CityId,
        unit_type: UnitTypeId,
    },
    UnitProduced {
        city: CityId,
        unit: UnitId,
        unit_type: UnitTypeId,
        at: TilePos,
    },
    ResearchStarted {
        civ: CivId,
        tech: TechId,
    },
    TechResearched {
        civ: CivId,
        tech: TechId,
    },
    TilesRevealed {
        civ: CivId,
        count: u32,
    },
    CivEliminated {
        civ: CivId,
    },
    PhaseChanged {
        turn: u32,
        phase: TurnPhase,
    },
    TurnEnded {
        turn: u32,
    },
    GameOver {
        winner: Option<CivId>,
    },
}
