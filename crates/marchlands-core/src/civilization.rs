use marchlands_protocol::{CivId, Personality, ResourceStock};
use serde::{Deserialize, Serialize};

use crate::rules::CompiledRules;
use crate::tech::TechProgress;
use crate::visibility::FogOfWar;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Civilization {
    pub id: CivId,
    pub name: String,
    pub personality: Personality,
    pub tech: TechProgress,
    pub fog: FogOfWar,
    pub resources: ResourceStock,
    /// Eliminated civilizations keep their slot so ids stay stable.
    pub eliminated: bool,
}

impl Civilization {
    pub fn new(
        id: CivId,
        name: impl Into<String>,
        personality: Personality,
        rules: &CompiledRules,
        map_len: usize,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            personality,
            tech: TechProgress::new(rules),
            fog: FogOfWar::new(map_len),
            resources: rules.tuning.starting_resources,
            eliminated: false,
        }
    }

    pub fn is_ai(&self) -> bool {
        self.personality.is_ai()
    }

    pub fn is_alive(&self) -> bool {
        !self.eliminated
    }
}
