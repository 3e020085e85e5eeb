use serde::{Deserialize, Serialize};

use crate::{CityId, CivId, TechId, TilePos, UnitId, UnitTypeId};

/// Every state change goes through one of these, whether it comes from a
/// human front end or from the AI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    MoveUnit { unit: UnitId, to: TilePos },
    Attack { unit: UnitId, target: UnitId },
    AttackCity { unit: UnitId, city: CityId },
    Fortify { unit: UnitId },
    QueueProduction { city: CityId, unit_type: UnitTypeId },
    SetResearch { civ: CivId, tech: TechId },
    EndTurn,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntityId;

    #[test]
    fn command_json_is_tagged() {
        let cmd = Command::MoveUnit {
            unit: EntityId::new(0, 0),
            to: TilePos::new(4, 5),
        };
        let json = serde_json::to_value(&cmd).expect("serialize");
        assert_eq!(json["type"], "MoveUnit");
        assert_eq!(json["to"]["x"], 4);

        let back: Command = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, cmd);
    }
}
