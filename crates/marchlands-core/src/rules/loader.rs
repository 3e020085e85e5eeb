use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use marchlands_protocol::{TechId, TerrainId, UnitTypeId};
use thiserror::Error;
use tracing::debug;

use crate::rules::{
    CompiledRules, RawTechnology, RawTerrainType, RawUnitType, Technology, Tuning,
};

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("missing referenced id: {0}")]
    MissingId(String),
    #[error("technology prerequisites form a cycle through: {0}")]
    PrerequisiteCycle(String),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub enum RulesSource<'a> {
    Embedded,
    /// Directory containing `terrain.yaml`, `units.yaml`, `techs.yaml`, and
    /// `tuning.yaml`.
    Path(PathBuf),
    Bytes {
        terrain: &'a [u8],
        units: &'a [u8],
        techs: &'a [u8],
        tuning: &'a [u8],
    },
}

#[derive(Debug)]
struct RawRules {
    terrains: BTreeMap<String, RawTerrainType>,
    units: BTreeMap<String, RawUnitType>,
    techs: BTreeMap<String, RawTechnology>,
    tuning: Tuning,
}

pub const EMBEDDED_TERRAIN: &str = include_str!("../../data/base/terrain.yaml");
pub const EMBEDDED_UNITS: &str = include_str!("../../data/base/units.yaml");
pub const EMBEDDED_TECHS: &str = include_str!("../../data/base/techs.yaml");
pub const EMBEDDED_TUNING: &str = include_str!("../../data/base/tuning.yaml");

pub fn load_rules(source: RulesSource<'_>) -> Result<CompiledRules, RulesError> {
    let raw = match source {
        RulesSource::Embedded => parse_raw_rules(
            EMBEDDED_TERRAIN,
            EMBEDDED_UNITS,
            EMBEDDED_TECHS,
            EMBEDDED_TUNING,
        )?,
        RulesSource::Path(dir) => {
            let terrain = read_file(&dir, "terrain.yaml")?;
            let units = read_file(&dir, "units.yaml")?;
            let techs = read_file(&dir, "techs.yaml")?;
            let tuning = read_file(&dir, "tuning.yaml")?;
            parse_raw_rules(&terrain, &units, &techs, &tuning)?
        }
        RulesSource::Bytes {
            terrain,
            units,
            techs,
            tuning,
        } => parse_raw_rules(
            std::str::from_utf8(terrain)?,
            std::str::from_utf8(units)?,
            std::str::from_utf8(techs)?,
            std::str::from_utf8(tuning)?,
        )?,
    };

    compile_rules(raw)
}

fn read_file(dir: &Path, name: &str) -> Result<String, RulesError> {
    let path = dir.join(name);
    std::fs::read_to_string(&path).map_err(|source| RulesError::Io { path, source })
}

fn parse_raw_rules(
    terrain_yaml: &str,
    units_yaml: &str,
    techs_yaml: &str,
    tuning_yaml: &str,
) -> Result<RawRules, RulesError> {
    Ok(RawRules {
        terrains: serde_yaml::from_str(terrain_yaml)?,
        units: serde_yaml::from_str(units_yaml)?,
        techs: serde_yaml::from_str(techs_yaml)?,
        tuning: serde_yaml::from_str(tuning_yaml)?,
    })
}

fn id_table<T, K>(map: &BTreeMap<String, T>, make: impl Fn(u16) -> K) -> HashMap<String, K> {
    map.keys()
        .enumerate()
        .map(|(i, k)| (k.clone(), make(i as u16)))
        .collect()
}

fn compile_rules(raw: RawRules) -> Result<CompiledRules, RulesError> {
    let terrain_ids = id_table(&raw.terrains, TerrainId::new);
    let unit_ids = id_table(&raw.units, UnitTypeId::new);
    let tech_ids = id_table(&raw.techs, TechId::new);

    let tuning = raw.tuning;
    let terrains = raw
        .terrains
        .into_values()
        .map(RawTerrainType::compile)
        .collect::<Vec<_>>();
    let mut unit_types = raw
        .units
        .into_values()
        .map(|u| u.compile(&tuning))
        .collect::<Vec<_>>();
    let tech_names = raw.techs.keys().cloned().collect::<Vec<_>>();
    let techs = raw
        .techs
        .into_values()
        .map(|t| t.compile(&tech_ids, &unit_ids))
        .collect::<Result<Vec<_>, _>>()?;

    check_prerequisites_acyclic(&techs, &tech_names)?;

    for (index, tech) in techs.iter().enumerate() {
        for effect in &tech.effects {
            if let crate::rules::TechEffect::UnlockUnit(unit) = effect {
                let slot = &mut unit_types[unit.index()].unlocked_by;
                if slot.is_none() {
                    *slot = Some(TechId::new(index as u16));
                }
            }
        }
    }

    debug!(
        terrains = terrains.len(),
        units = unit_types.len(),
        techs = techs.len(),
        "rules compiled"
    );

    Ok(CompiledRules {
        terrains,
        unit_types,
        techs,
        tuning,
        terrain_ids,
        unit_type_ids: unit_ids,
        tech_ids,
    })
}

fn check_prerequisites_acyclic(techs: &[Technology], names: &[String]) -> Result<(), RulesError> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Fresh,
        Open,
        Done,
    }

    fn visit(
        index: usize,
        techs: &[Technology],
        marks: &mut [Mark],
        names: &[String],
    ) -> Result<(), RulesError> {
        match marks[index] {
            Mark::Done => return Ok(()),
            Mark::Open => return Err(RulesError::PrerequisiteCycle(names[index].clone())),
            Mark::Fresh => {}
        }
        marks[index] = Mark::Open;
        for prereq in &techs[index].prerequisites {
            visit(prereq.index(), techs, marks, names)?;
        }
        marks[index] = Mark::Done;
        Ok(())
    }

    let mut marks = vec![Mark::Fresh; techs.len()];
    for index in 0..techs.len() {
        visit(index, techs, &mut marks, names)?;
    }
    Ok(())
}
