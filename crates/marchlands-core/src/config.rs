//! Game setup configuration

use std::path::{Path, PathBuf};

use marchlands_protocol::Personality;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mapgen::MapGenConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("at least one civilization is required")]
    NoCivilizations,
}

/// One seat at the table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CivConfig {
    pub name: String,
    pub personality: Personality,
}

impl CivConfig {
    pub fn new(name: impl Into<String>, personality: Personality) -> Self {
        Self {
            name: name.into(),
            personality,
        }
    }
}

/// Game configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Map generation seed
    pub seed: u64,
    /// Turn order is list order
    pub civs: Vec<CivConfig>,
    /// Map size and generation knobs; `num_civs` is overridden by `civs`
    pub map: MapGenConfig,
    /// Rules directory; embedded rules when unset
    pub rules_dir: Option<PathBuf>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            civs: vec![
                CivConfig::new("Player", Personality::Human),
                CivConfig::new("Aggressive Empire", Personality::Aggressive),
                CivConfig::new("Balanced Kingdom", Personality::Balanced),
            ],
            map: MapGenConfig::default(),
            rules_dir: None,
        }
    }
}

impl GameConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.civs.is_empty() {
            return Err(ConfigError::NoCivilizations);
        }
        Ok(())
    }

    /// Map generation settings with the civilization count filled in.
    pub fn map_config(&self) -> MapGenConfig {
        MapGenConfig {
            num_civs: self.civs.len() as u32,
            ..self.map.clone()
        }
    }

    /// Self-play roster: every human seat handed to the balanced AI.
    pub fn all_ai(mut self) -> Self {
        for civ in &mut self.civs {
            if civ.personality == Personality::Human {
                civ.personality = Personality::Balanced;
            }
        }
        self
    }
}
