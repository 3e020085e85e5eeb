use marchlands_protocol::{
    AttackTarget, CityId, CivId, Command, CombatOutcome, Event, FogState, TechId, TilePos,
    TurnPhase, UnitId, UnitTypeId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::city::City;
use crate::civilization::Civilization;
use crate::combat::{resolve_combat, Combatant};
use crate::config::{CivConfig, ConfigError, GameConfig};
use crate::entities::EntityStore;
use crate::map::{is_passable, terrain_defense_bonus, GameMap};
use crate::mapgen::{generate_map, MapGenError};
use crate::pathfinding::{find_path, path_cost, reachable_tiles, PathError, PathQuery};
use crate::rules::{load_rules, CompiledRules, RulesError, RulesSource};
use crate::tech::TechError;
use crate::unit::Unit;
use crate::visibility::vision_sources;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("invalid target")]
    InvalidTarget,
    #[error("out of range")]
    OutOfRange,
    #[error("no path to destination")]
    Unreachable,
    #[error("technology prerequisites not met")]
    PrerequisiteNotMet,
    #[error("technology already researched")]
    AlreadyResearched,
    #[error("not your turn")]
    NotYourTurn,
    #[error("unknown unit")]
    UnitNotFound,
    #[error("unknown city")]
    CityNotFound,
    #[error("unknown civilization")]
    CivilizationNotFound,
    #[error("game is over")]
    GameOver,
}

impl From<PathError> for GameError {
    fn from(err: PathError) -> Self {
        match err {
            PathError::OutOfBounds => GameError::InvalidTarget,
            PathError::Unreachable => GameError::Unreachable,
        }
    }
}

impl From<TechError> for GameError {
    fn from(err: TechError) -> Self {
        match err {
            TechError::UnknownTech => GameError::InvalidTarget,
            TechError::AlreadyResearched => GameError::AlreadyResearched,
            TechError::PrerequisiteNotMet => GameError::PrerequisiteNotMet,
        }
    }
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Rules(#[from] RulesError),
    #[error(transparent)]
    MapGen(#[from] MapGenError),
    #[error("cannot place starting entity: {0}")]
    Placement(#[from] GameError),
    #[error("no free tile near the start of {0}")]
    NoRoom(CivId),
}

/// The single mutable root of a game. Everything is plain data so the whole
/// value can be snapshotted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameState {
    pub turn: u32,
    pub phase: TurnPhase,
    pub map: GameMap,
    pub units: EntityStore<Unit>,
    pub cities: EntityStore<City>,
    /// Turn order; never reordered or shrunk.
    pub civs: Vec<Civilization>,
}

impl GameState {
    pub fn new(map: GameMap, civs: &[CivConfig], rules: &CompiledRules) -> Self {
        let civs = civs
            .iter()
            .enumerate()
            .map(|(i, c)| {
                Civilization::new(CivId(i as u8), c.name.clone(), c.personality, rules, map.len())
            })
            .collect();
        Self {
            turn: 1,
            phase: TurnPhase::HumanInput,
            map,
            units: EntityStore::default(),
            cities: EntityStore::default(),
            civs,
        }
    }

    pub fn civ(&self, id: CivId) -> Option<&Civilization> {
        self.civs.get(id.index())
    }

    pub fn civ_mut(&mut self, id: CivId) -> Option<&mut Civilization> {
        self.civs.get_mut(id.index())
    }

    pub fn living_civs(&self) -> impl Iterator<Item = &Civilization> {
        self.civs.iter().filter(|c| c.is_alive())
    }

    /// During `HumanInput` every living human seat may act; during an AI
    /// phase only that civilization may.
    pub fn is_active(&self, civ: CivId) -> bool {
        let Some(c) = self.civ(civ) else {
            return false;
        };
        if !c.is_alive() {
            return false;
        }
        match self.phase {
            TurnPhase::HumanInput => !c.is_ai(),
            TurnPhase::Ai { civ: active } => active == civ,
            TurnPhase::EndOfTurn | TurnPhase::GameOver { .. } => false,
        }
    }

    pub fn active_civ(&self) -> Option<CivId> {
        match self.phase {
            TurnPhase::HumanInput => self
                .living_civs()
                .find(|c| !c.is_ai())
                .map(|c| c.id),
            TurnPhase::Ai { civ } => Some(civ),
            TurnPhase::EndOfTurn | TurnPhase::GameOver { .. } => None,
        }
    }

    pub fn unit_at(&self, pos: TilePos) -> Option<(UnitId, &Unit)> {
        self.units.iter_ordered().find(|(_, u)| u.position == pos)
    }

    pub fn city_at(&self, pos: TilePos) -> Option<(CityId, &City)> {
        self.cities.iter_ordered().find(|(_, c)| c.position == pos)
    }

    pub fn units_of(&self, civ: CivId) -> impl Iterator<Item = (UnitId, &Unit)> {
        self.units.iter_ordered().filter(move |(_, u)| u.owner == civ)
    }

    pub fn cities_of(&self, civ: CivId) -> impl Iterator<Item = (CityId, &City)> {
        self.cities.iter_ordered().filter(move |(_, c)| c.owner == civ)
    }

    pub fn fog_state(&self, civ: CivId, pos: TilePos) -> FogState {
        match (self.civ(civ), self.map.index_of(pos)) {
            (Some(c), Some(index)) => c.fog.state(index),
            _ => FogState::Unseen,
        }
    }

    pub fn is_visible_to(&self, civ: CivId, pos: TilePos) -> bool {
        self.fog_state(civ, pos) == FogState::Visible
    }

    /// Whether `pos` can take a new unit of `owner`: on the map, passable,
    /// empty, and not a foreign city.
    pub fn is_free_for(&self, rules: &CompiledRules, owner: CivId, pos: TilePos) -> bool {
        is_passable(&self.map, rules, pos)
            && self.unit_at(pos).is_none()
            && self.city_at(pos).is_none_or(|(_, c)| c.owner == owner)
    }

    /// Per-tile pathing blockers for `mover`: every other unit and every
    /// foreign city.
    pub fn movement_blockers(&self, mover: UnitId, owner: CivId) -> Vec<bool> {
        let mut blocked = vec![false; self.map.len()];
        for (id, unit) in self.units.iter_ordered() {
            if id == mover {
                continue;
            }
            if let Some(index) = self.map.index_of(unit.position) {
                blocked[index] = true;
            }
        }
        for (_, city) in self.cities.iter_ordered() {
            if city.owner == owner {
                continue;
            }
            if let Some(index) = self.map.index_of(city.position) {
                blocked[index] = true;
            }
        }
        blocked
    }

    /// Places a new unit. Fails with `InvalidTarget` unless the tile is free.
    pub fn spawn_unit(
        &mut self,
        rules: &CompiledRules,
        type_id: UnitTypeId,
        owner: CivId,
        pos: TilePos,
    ) -> Result<UnitId, GameError> {
        if self.civ(owner).is_none() {
            return Err(GameError::CivilizationNotFound);
        }
        if type_id.index() >= rules.unit_types.len() || !self.is_free_for(rules, owner, pos) {
            return Err(GameError::InvalidTarget);
        }
        Ok(self.units.insert(Unit::new(type_id, owner, pos, rules)))
    }

    pub fn found_city(
        &mut self,
        rules: &CompiledRules,
        name: impl Into<String>,
        owner: CivId,
        pos: TilePos,
    ) -> Result<CityId, GameError> {
        if self.civ(owner).is_none() {
            return Err(GameError::CivilizationNotFound);
        }
        if !is_passable(&self.map, rules, pos) || self.city_at(pos).is_some() {
            return Err(GameError::InvalidTarget);
        }
        if self.unit_at(pos).is_some_and(|(_, u)| u.owner != owner) {
            return Err(GameError::InvalidTarget);
        }
        Ok(self.cities.insert(City::new(name, owner, pos, rules)))
    }

    /// Closest free tile to `center` by distance, then tile index.
    pub fn nearest_free_tile(
        &self,
        rules: &CompiledRules,
        owner: CivId,
        center: TilePos,
    ) -> Option<TilePos> {
        (0..self.map.len())
            .filter_map(|i| self.map.pos_at_index(i))
            .filter(|p| self.is_free_for(rules, owner, *p))
            .min_by_key(|p| (p.distance(center), p.y, p.x))
    }

    /// Where a finished unit appears: the city tile, else the first free
    /// neighbour in N, E, S, W order.
    pub fn spawn_tile(&self, rules: &CompiledRules, city: &City) -> Option<TilePos> {
        std::iter::once(city.position)
            .chain(city.position.neighbors())
            .find(|p| self.is_free_for(rules, city.owner, *p))
    }

    /// Rebuilds `civ`'s fog from its current units and cities.
    pub fn refresh_visibility(&mut self, rules: &CompiledRules, civ: CivId) -> Option<Event> {
        let sources = vision_sources(&self.units, &self.cities, rules, civ);
        let civ_state = self.civs.get_mut(civ.index())?;
        let revealed = civ_state.fog.recompute(&self.map, &sources);
        (revealed > 0).then_some(Event::TilesRevealed {
            civ,
            count: revealed as u32,
        })
    }

    pub fn unit_attack_range(&self, rules: &CompiledRules, unit: &Unit) -> i32 {
        let unit_type = rules.unit_type(unit.type_id);
        if !unit_type.is_ranged() {
            return 1;
        }
        let bonus = self
            .civ(unit.owner)
            .map(|c| c.tech.bonuses.ranged_range)
            .unwrap_or(0);
        unit_type.range + bonus.max(0)
    }

    pub fn unit_combatant(&self, rules: &CompiledRules, unit: &Unit) -> Combatant {
        let ranged_bonus = self
            .civ(unit.owner)
            .map(|c| c.tech.bonuses.ranged_range)
            .unwrap_or(0);
        Combatant::for_unit(
            unit,
            rules.unit_type(unit.type_id),
            terrain_defense_bonus(&self.map, rules, unit.position),
            rules.tuning.fortify_bonus_pct,
            ranged_bonus,
        )
    }

    pub fn city_combatant(&self, rules: &CompiledRules, city: &City) -> Combatant {
        let walls = self
            .civ(city.owner)
            .map(|c| c.tech.bonuses.city_defense_pct)
            .unwrap_or(0);
        Combatant::for_city(
            city,
            rules,
            terrain_defense_bonus(&self.map, rules, city.position),
            walls,
        )
    }

    /// Enemies `unit_id` could strike right now: on tiles its civilization
    /// sees, within range. Nearest first, then by id.
    pub fn attack_targets(&self, rules: &CompiledRules, unit_id: UnitId) -> Vec<AttackTarget> {
        let Some(unit) = self.units.get(unit_id) else {
            return Vec::new();
        };
        if !unit.can_attack() {
            return Vec::new();
        }
        let range = self.unit_attack_range(rules, unit);
        let in_reach = |pos: TilePos| {
            let d = unit.position.distance(pos);
            d >= 1 && d <= range && self.is_visible_to(unit.owner, pos)
        };

        let mut targets: Vec<(i32, AttackTarget)> = self
            .units
            .iter_ordered()
            .filter(|(_, u)| u.owner != unit.owner && in_reach(u.position))
            .map(|(id, u)| (unit.position.distance(u.position), AttackTarget::Unit(id)))
            .collect();
        targets.extend(
            self.cities
                .iter_ordered()
                .filter(|(_, c)| c.owner != unit.owner && in_reach(c.position))
                .map(|(id, c)| (unit.position.distance(c.position), AttackTarget::City(id))),
        );
        targets.sort();
        targets.into_iter().map(|(_, t)| t).collect()
    }

    /// Tiles `unit_id` can end a move on this turn, with their cost.
    pub fn reachable_moves(&self, rules: &CompiledRules, unit_id: UnitId) -> Vec<(TilePos, i32)> {
        let Some(unit) = self.units.get(unit_id) else {
            return Vec::new();
        };
        let blocked = self.movement_blockers(unit_id, unit.owner);
        let query = PathQuery::new(&self.map, rules, &blocked);
        reachable_tiles(&query, unit.position, unit.moves_left)
    }

    pub fn target_position(&self, target: AttackTarget) -> Option<TilePos> {
        match target {
            AttackTarget::Unit(id) => self.units.get(id).map(|u| u.position),
            AttackTarget::City(id) => self.cities.get(id).map(|c| c.position),
        }
    }
}

/// Owns the rules and the state, and is the only way commands reach the
/// state. Every command validates fully before it mutates anything.
#[derive(Clone, Debug)]
pub struct GameEngine {
    pub(crate) rules: CompiledRules,
    pub(crate) state: GameState,
}

impl GameEngine {
    /// Generates the map, founds one capital per civilization with a
    /// warrior and an archer beside it, and computes initial visibility.
    pub fn new(config: &GameConfig, rules: CompiledRules) -> Result<Self, SetupError> {
        config.validate()?;
        let generated = generate_map(&rules, &config.map_config(), config.seed)?;
        let mut state = GameState::new(generated.map, &config.civs, &rules);

        let starting_units: Vec<UnitTypeId> = ["warrior", "archer"]
            .into_iter()
            .filter_map(|id| rules.unit_type_id(id))
            .collect();

        for (i, (start, civ_config)) in generated
            .start_positions
            .iter()
            .zip(&config.civs)
            .enumerate()
        {
            let civ = CivId(i as u8);
            state.found_city(&rules, format!("{} Capital", civ_config.name), civ, *start)?;
            for &unit_type in &starting_units {
                let pos = state
                    .nearest_free_tile(&rules, civ, *start)
                    .ok_or(SetupError::NoRoom(civ))?;
                state.spawn_unit(&rules, unit_type, civ, pos)?;
            }
        }

        for i in 0..state.civs.len() {
            state.refresh_visibility(&rules, CivId(i as u8));
        }

        info!(
            seed = config.seed,
            map_seed = generated.seed,
            civs = state.civs.len(),
            "game created"
        );
        Ok(Self { rules, state })
    }

    /// Like [`GameEngine::new`], loading rules from `config.rules_dir` or the
    /// embedded set.
    pub fn from_config(config: &GameConfig) -> Result<Self, SetupError> {
        let source = match &config.rules_dir {
            Some(dir) => RulesSource::Path(dir.clone()),
            None => RulesSource::Embedded,
        };
        let rules = load_rules(source)?;
        Self::new(config, rules)
    }

    pub fn from_state(rules: CompiledRules, state: GameState) -> Self {
        Self { rules, state }
    }

    pub fn rules(&self) -> &CompiledRules {
        &self.rules
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Direct access for scenario setup; bypasses command validation.
    pub fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }

    pub fn turn(&self) -> u32 {
        self.state.turn
    }

    pub fn phase(&self) -> TurnPhase {
        self.state.phase
    }

    pub fn active_civ(&self) -> Option<CivId> {
        self.state.active_civ()
    }

    pub fn apply_command(&mut self, command: Command) -> Result<Vec<Event>, GameError> {
        match command {
            Command::MoveUnit { unit, to } => self.move_unit(unit, to),
            Command::Attack { unit, target } => self
                .strike(unit, AttackTarget::Unit(target))
                .map(|(_, events)| events),
            Command::AttackCity { unit, city } => self
                .strike(unit, AttackTarget::City(city))
                .map(|(_, events)| events),
            Command::Fortify { unit } => self.fortify(unit),
            Command::QueueProduction { city, unit_type } => self.queue_production(city, unit_type),
            Command::SetResearch { civ, tech } => self.set_research(civ, tech),
            Command::EndTurn => self.end_turn(),
        }
    }

    fn ensure_running(&self) -> Result<(), GameError> {
        if self.state.phase.is_game_over() {
            return Err(GameError::GameOver);
        }
        Ok(())
    }

    fn ensure_active(&self, civ: CivId) -> Result<(), GameError> {
        if self.state.is_active(civ) {
            Ok(())
        } else {
            Err(GameError::NotYourTurn)
        }
    }

    pub fn move_unit(&mut self, unit_id: UnitId, to: TilePos) -> Result<Vec<Event>, GameError> {
        self.ensure_running()?;
        let unit = self
            .state
            .units
            .get(unit_id)
            .ok_or(GameError::UnitNotFound)?;
        let (owner, from, budget) = (unit.owner, unit.position, unit.moves_left);
        self.ensure_active(owner)?;

        if to == from {
            return Ok(Vec::new());
        }
        if !is_passable(&self.state.map, &self.rules, to) {
            return Err(GameError::InvalidTarget);
        }
        if !self.state.is_free_for(&self.rules, owner, to) {
            return Err(GameError::InvalidTarget);
        }

        let blocked = self.state.movement_blockers(unit_id, owner);
        let query = PathQuery::new(&self.state.map, &self.rules, &blocked);
        let path = find_path(&query, from, to)?;
        let cost = path_cost(&self.state.map, &self.rules, &path).ok_or(GameError::Unreachable)?;
        if cost > budget {
            return Err(GameError::OutOfRange);
        }

        let unit = self
            .state
            .units
            .get_mut(unit_id)
            .ok_or(GameError::UnitNotFound)?;
        unit.position = to;
        unit.moves_left -= cost;
        unit.fortified = false;
        let moves_left = unit.moves_left;

        let mut events = vec![Event::UnitMoved {
            unit: unit_id,
            path: path.into_iter().skip(1).collect(),
            moves_left,
        }];
        events.extend(self.state.refresh_visibility(&self.rules, owner));
        Ok(events)
    }

    /// Attacks an enemy unit and returns the exchange.
    pub fn attack(&mut self, unit: UnitId, target: UnitId) -> Result<CombatOutcome, GameError> {
        self.strike(unit, AttackTarget::Unit(target))
            .map(|(outcome, _)| outcome)
    }

    pub fn attack_city(&mut self, unit: UnitId, city: CityId) -> Result<CombatOutcome, GameError> {
        self.strike(unit, AttackTarget::City(city))
            .map(|(outcome, _)| outcome)
    }

    fn strike(
        &mut self,
        unit_id: UnitId,
        target: AttackTarget,
    ) -> Result<(CombatOutcome, Vec<Event>), GameError> {
        self.ensure_running()?;
        let attacker = self
            .state
            .units
            .get(unit_id)
            .ok_or(GameError::UnitNotFound)?
            .clone();
        self.ensure_active(attacker.owner)?;
        if !attacker.can_attack() {
            return Err(GameError::OutOfRange);
        }

        let (target_pos, target_owner) = match target {
            AttackTarget::Unit(id) => {
                let t = self.state.units.get(id).ok_or(GameError::UnitNotFound)?;
                (t.position, t.owner)
            }
            AttackTarget::City(id) => {
                let c = self.state.cities.get(id).ok_or(GameError::CityNotFound)?;
                (c.position, c.owner)
            }
        };
        if target_owner == attacker.owner || !self.state.is_visible_to(attacker.owner, target_pos)
        {
            return Err(GameError::InvalidTarget);
        }
        let distance = attacker.position.distance(target_pos);
        if distance < 1 || distance > self.state.unit_attack_range(&self.rules, &attacker) {
            return Err(GameError::OutOfRange);
        }

        // Striking gives up any fortification before the counter lands.
        let striker = Unit {
            fortified: false,
            ..attacker.clone()
        };
        let attacker_side = self.state.unit_combatant(&self.rules, &striker);
        let defender_side = match target {
            AttackTarget::Unit(id) => {
                let t = self.state.units.get(id).ok_or(GameError::UnitNotFound)?;
                self.state.unit_combatant(&self.rules, t)
            }
            AttackTarget::City(id) => {
                let c = self.state.cities.get(id).ok_or(GameError::CityNotFound)?;
                self.state.city_combatant(&self.rules, c)
            }
        };
        let outcome = resolve_combat(&attacker_side, &defender_side);
        debug!(
            attacker = %unit_id,
            ?target,
            defender_damage = outcome.defender_damage,
            counter_damage = outcome.counter_damage,
            "combat resolved"
        );

        let mut events = vec![Event::Combat {
            attacker: unit_id,
            target,
            outcome,
        }];

        if let Some(unit) = self.state.units.get_mut(unit_id) {
            unit.take_damage(outcome.counter_damage);
            unit.spend_attack();
        }

        match target {
            AttackTarget::Unit(id) => {
                if let Some(defender) = self.state.units.get_mut(id) {
                    defender.take_damage(outcome.defender_damage);
                }
                if outcome.defender_died {
                    self.state.units.remove(id);
                    events.push(Event::UnitDied {
                        unit: id,
                        owner: target_owner,
                    });
                }
            }
            AttackTarget::City(id) => {
                let destroyed = match self.state.cities.get_mut(id) {
                    Some(city) => {
                        city.take_damage(outcome.defender_damage);
                        city.is_destroyed()
                    }
                    None => false,
                };
                if destroyed {
                    self.state.cities.remove(id);
                    info!(city = %id, owner = %target_owner, "city destroyed");
                    events.push(Event::CityDestroyed {
                        city: id,
                        owner: target_owner,
                    });
                }
            }
        }

        if outcome.attacker_died {
            self.state.units.remove(unit_id);
            events.push(Event::UnitDied {
                unit: unit_id,
                owner: attacker.owner,
            });
        }

        events.extend(self.state.refresh_visibility(&self.rules, attacker.owner));
        Ok((outcome, events))
    }

    /// Digs in: no more movement or attacks this turn, and the fortify bonus
    /// holds until the unit next moves or attacks.
    pub fn fortify(&mut self, unit_id: UnitId) -> Result<Vec<Event>, GameError> {
        self.ensure_running()?;
        let owner = self
            .state
            .units
            .get(unit_id)
            .ok_or(GameError::UnitNotFound)?
            .owner;
        self.ensure_active(owner)?;

        let unit = self
            .state
            .units
            .get_mut(unit_id)
            .ok_or(GameError::UnitNotFound)?;
        unit.fortified = true;
        unit.moves_left = 0;
        unit.has_attacked = true;
        Ok(vec![Event::UnitFortified { unit: unit_id }])
    }

    pub fn queue_production(
        &mut self,
        city_id: CityId,
        unit_type: UnitTypeId,
    ) -> Result<Vec<Event>, GameError> {
        self.ensure_running()?;
        let owner = self
            .state
            .cities
            .get(city_id)
            .ok_or(GameError::CityNotFound)?
            .owner;
        self.ensure_active(owner)?;

        if unit_type.index() >= self.rules.unit_types.len() {
            return Err(GameError::InvalidTarget);
        }
        let civ = self
            .state
            .civ(owner)
            .ok_or(GameError::CivilizationNotFound)?;
        if !civ.tech.can_build(unit_type) {
            return Err(GameError::PrerequisiteNotMet);
        }

        let city = self
            .state
            .cities
            .get_mut(city_id)
            .ok_or(GameError::CityNotFound)?;
        city.production_queue.push_back(unit_type);
        Ok(vec![Event::ProductionQueued {
            city: city_id,
            unit_type,
        }])
    }

    pub fn set_research(&mut self, civ: CivId, tech: TechId) -> Result<Vec<Event>, GameError> {
        self.ensure_running()?;
        if self.state.civ(civ).is_none() {
            return Err(GameError::CivilizationNotFound);
        }
        self.ensure_active(civ)?;

        let civ_state = self
            .state
            .civ_mut(civ)
            .ok_or(GameError::CivilizationNotFound)?;
        let changed = civ_state.tech.select(&self.rules, tech)?;
        if !changed {
            return Ok(Vec::new());
        }
        Ok(vec![Event::ResearchStarted { civ, tech }])
    }

    /// Tiles `civ` currently sees, in tile-index order.
    pub fn tiles_in_view(&self, civ: CivId) -> Result<Vec<TilePos>, GameError> {
        let civ = self
            .state
            .civ(civ)
            .ok_or(GameError::CivilizationNotFound)?;
        Ok(civ
            .fog
            .visible_indices()
            .into_iter()
            .filter_map(|i| self.state.map.pos_at_index(i))
            .collect())
    }

    pub fn valid_moves(&self, unit: UnitId) -> Result<Vec<TilePos>, GameError> {
        if !self.state.units.contains(unit) {
            return Err(GameError::UnitNotFound);
        }
        Ok(self
            .state
            .reachable_moves(&self.rules, unit)
            .into_iter()
            .map(|(pos, _)| pos)
            .collect())
    }

    pub fn valid_targets(&self, unit: UnitId) -> Result<Vec<AttackTarget>, GameError> {
        if !self.state.units.contains(unit) {
            return Err(GameError::UnitNotFound);
        }
        Ok(self.state.attack_targets(&self.rules, unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::Tile;
    use crate::rules::{load_rules, RulesSource};
    use marchlands_protocol::Personality;

    const HUMAN: CivId = CivId(0);
    const AI: CivId = CivId(1);

    fn grid(rules: &CompiledRules, rows: &[&str]) -> GameMap {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        let tiles = rows
            .iter()
            .flat_map(|row| row.chars())
            .map(|c| {
                let id = match c {
                    'f' => "forest",
                    'h' => "hills",
                    'm' => "mountain",
                    'w' => "water",
                    'd' => "desert",
                    _ => "grass",
                };
                Tile {
                    terrain: rules.terrain_id(id).unwrap(),
                    resource: None,
                }
            })
            .collect();
        GameMap::from_tiles(width, height, tiles).unwrap()
    }

    fn engine(rows: &[&str]) -> GameEngine {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let map = grid(&rules, rows);
        let civs = [
            CivConfig::new("Human", Personality::Human),
            CivConfig::new("Rival", Personality::Aggressive),
        ];
        let state = GameState::new(map, &civs, &rules);
        GameEngine::from_state(rules, state)
    }

    fn spawn(engine: &mut GameEngine, unit: &str, owner: CivId, x: i32, y: i32) -> UnitId {
        let type_id = engine.rules.unit_type_id(unit).unwrap();
        let id = engine
            .state
            .spawn_unit(&engine.rules, type_id, owner, TilePos::new(x, y))
            .expect("spawn");
        refresh_all(engine);
        id
    }

    fn refresh_all(engine: &mut GameEngine) {
        for i in 0..engine.state.civs.len() {
            engine.state.refresh_visibility(&engine.rules, CivId(i as u8));
        }
    }

    const OPEN: [&str; 6] = [
        "gggggggg",
        "gggggggg",
        "gggfgggg",
        "gggggggg",
        "gggggggg",
        "gggggggg",
    ];

    #[test]
    fn move_spends_path_cost() {
        let mut engine = engine(&OPEN);
        let unit = spawn(&mut engine, "warrior", HUMAN, 3, 1);

        let events = engine.move_unit(unit, TilePos::new(3, 2)).expect("move");
        assert!(matches!(
            events[0],
            Event::UnitMoved { moves_left: 0, .. }
        ));
        let moved = engine.state.units.get(unit).unwrap();
        assert_eq!(moved.position, TilePos::new(3, 2));

        assert_eq!(
            engine.move_unit(unit, TilePos::new(3, 3)),
            Err(GameError::OutOfRange)
        );
    }

    #[test]
    fn move_rejects_bad_destinations() {
        let mut engine = engine(&["ggwgg", "gmmmg", "gmgmg", "gmmmg"]);
        let unit = spawn(&mut engine, "warrior", HUMAN, 0, 0);
        let other = spawn(&mut engine, "warrior", HUMAN, 1, 0);

        assert_eq!(
            engine.move_unit(unit, TilePos::new(2, 0)),
            Err(GameError::InvalidTarget),
            "water"
        );
        assert_eq!(
            engine.move_unit(unit, TilePos::new(1, 0)),
            Err(GameError::InvalidTarget),
            "occupied"
        );
        assert_eq!(
            engine.move_unit(unit, TilePos::new(-1, 0)),
            Err(GameError::InvalidTarget),
            "off map"
        );
        assert_eq!(
            engine.move_unit(other, TilePos::new(2, 2)),
            Err(GameError::Unreachable),
            "walled in"
        );
        assert_eq!(engine.state.units.get(unit).unwrap().moves_left, 2);
    }

    #[test]
    fn foreign_units_are_not_yours() {
        let mut engine = engine(&OPEN);
        let rival = spawn(&mut engine, "warrior", AI, 6, 4);
        assert_eq!(
            engine.move_unit(rival, TilePos::new(6, 3)),
            Err(GameError::NotYourTurn)
        );
        assert_eq!(engine.fortify(rival), Err(GameError::NotYourTurn));
    }

    #[test]
    fn melee_attack_takes_counter_and_spends_turn() {
        let mut engine = engine(&OPEN);
        let attacker = spawn(&mut engine, "warrior", HUMAN, 1, 1);
        let defender = spawn(&mut engine, "warrior", AI, 2, 1);

        let outcome = engine.attack(attacker, defender).expect("attack");
        assert_eq!(outcome.defender_damage, 9);
        assert_eq!(outcome.counter_damage, 7);
        assert!(!outcome.defender_died && !outcome.attacker_died);

        let a = engine.state.units.get(attacker).unwrap();
        assert_eq!(a.hp, 93);
        assert_eq!(a.moves_left, 0);
        assert!(a.has_attacked);
        assert_eq!(engine.state.units.get(defender).unwrap().hp, 91);

        assert_eq!(
            engine.attack(attacker, defender),
            Err(GameError::OutOfRange)
        );
    }

    #[test]
    fn ranged_attack_from_two_tiles_is_not_answered() {
        let mut engine = engine(&OPEN);
        let archer = spawn(&mut engine, "archer", HUMAN, 1, 1);
        let target = spawn(&mut engine, "archer", AI, 3, 1);

        let outcome = engine.attack(archer, target).expect("attack");
        assert_eq!(outcome.counter_damage, 0);
        assert_eq!(engine.state.units.get(archer).unwrap().hp, 60);
    }

    #[test]
    fn targets_must_be_visible_and_in_range() {
        let mut engine = engine(&OPEN);
        let warrior = spawn(&mut engine, "warrior", HUMAN, 0, 0);
        let far = spawn(&mut engine, "warrior", AI, 7, 5);
        let near = spawn(&mut engine, "warrior", AI, 2, 0);

        assert_eq!(engine.attack(warrior, far), Err(GameError::InvalidTarget));
        assert_eq!(engine.attack(warrior, near), Err(GameError::OutOfRange));
        assert_eq!(engine.valid_targets(warrior), Ok(Vec::new()));

        engine.move_unit(warrior, TilePos::new(1, 0)).expect("move");
        assert_eq!(
            engine.valid_targets(warrior),
            Ok(vec![AttackTarget::Unit(near)])
        );
    }

    #[test]
    fn killing_a_unit_removes_it() {
        let mut engine = engine(&OPEN);
        let attacker = spawn(&mut engine, "warrior", HUMAN, 1, 1);
        let defender = spawn(&mut engine, "archer", AI, 1, 2);
        engine.state.units.get_mut(defender).unwrap().hp = 3;

        let outcome = engine.attack(attacker, defender).expect("attack");
        assert!(outcome.defender_died);
        assert_eq!(outcome.counter_damage, 0);
        assert!(!engine.state.units.contains(defender));
        assert_eq!(
            engine.attack(attacker, defender),
            Err(GameError::UnitNotFound)
        );
    }

    #[test]
    fn attacker_dying_to_counter_is_removed() {
        let mut engine = engine(&OPEN);
        let attacker = spawn(&mut engine, "warrior", HUMAN, 1, 1);
        let defender = spawn(&mut engine, "warrior", AI, 2, 1);
        engine.state.units.get_mut(attacker).unwrap().hp = 1;

        let events = engine
            .apply_command(Command::Attack {
                unit: attacker,
                target: defender,
            })
            .expect("attack");
        assert!(!engine.state.units.contains(attacker));
        assert!(events.iter().any(|e| matches!(
            e,
            Event::UnitDied { unit, owner } if *unit == attacker && *owner == HUMAN
        )));
    }

    #[test]
    fn cities_fall_at_zero_hp() {
        let mut engine = engine(&OPEN);
        let warrior = spawn(&mut engine, "warrior", HUMAN, 4, 3);
        let city = engine
            .state
            .found_city(&engine.rules, "Rival Capital", AI, TilePos::new(5, 3))
            .expect("found");
        refresh_all(&mut engine);

        engine.state.cities.get_mut(city).unwrap().hp = 2;
        let outcome = engine.attack_city(warrior, city).expect("attack city");
        assert!(outcome.defender_died);
        assert_eq!(outcome.counter_damage, 0);
        assert!(!engine.state.cities.contains(city));
    }

    #[test]
    fn fortify_holds_until_move() {
        let mut engine = engine(&OPEN);
        let unit = spawn(&mut engine, "warrior", HUMAN, 3, 3);
        let enemy = spawn(&mut engine, "warrior", AI, 3, 4);

        engine.fortify(unit).expect("fortify");
        let fortified = engine.state.units.get(unit).unwrap().clone();
        assert!(fortified.fortified);
        assert_eq!(fortified.moves_left, 0);
        assert_eq!(engine.attack(unit, enemy), Err(GameError::OutOfRange));

        let unit_type = engine.rules.unit_type(fortified.type_id).clone();
        engine.state.units.get_mut(unit).unwrap().refresh(&unit_type, 0);
        engine.move_unit(unit, TilePos::new(2, 3)).expect("move");
        assert!(!engine.state.units.get(unit).unwrap().fortified);
    }

    #[test]
    fn production_requires_unlock() {
        let mut engine = engine(&OPEN);
        let city = engine
            .state
            .found_city(&engine.rules, "Home", HUMAN, TilePos::new(1, 1))
            .expect("found");
        let archer = engine.rules.unit_type_id("archer").unwrap();
        let warrior = engine.rules.unit_type_id("warrior").unwrap();

        assert_eq!(
            engine.queue_production(city, archer),
            Err(GameError::PrerequisiteNotMet)
        );
        engine.queue_production(city, warrior).expect("queue");
        assert_eq!(
            engine.state.cities.get(city).unwrap().current_item(),
            Some(warrior)
        );
    }

    #[test]
    fn research_selection_rules() {
        let mut engine = engine(&OPEN);
        let bronze = engine.rules.tech_id("bronze_working").unwrap();
        let mining = engine.rules.tech_id("mining").unwrap();

        assert_eq!(
            engine.set_research(HUMAN, bronze),
            Err(GameError::PrerequisiteNotMet)
        );
        assert_eq!(
            engine.set_research(HUMAN, mining),
            Ok(vec![Event::ResearchStarted {
                civ: HUMAN,
                tech: mining
            }])
        );
        assert_eq!(engine.set_research(HUMAN, mining), Ok(Vec::new()));
        assert_eq!(engine.set_research(AI, mining), Err(GameError::NotYourTurn));
        assert_eq!(
            engine.set_research(CivId(9), mining),
            Err(GameError::CivilizationNotFound)
        );
    }

    #[test]
    fn valid_moves_respect_terrain_and_blockers() {
        let mut engine = engine(&OPEN);
        let unit = spawn(&mut engine, "warrior", HUMAN, 3, 3);
        spawn(&mut engine, "warrior", HUMAN, 3, 4);

        let moves = engine.valid_moves(unit).expect("moves");
        assert!(moves.contains(&TilePos::new(3, 2)), "forest costs 2");
        assert!(!moves.contains(&TilePos::new(3, 1)), "beyond forest");
        assert!(!moves.contains(&TilePos::new(3, 4)), "occupied");
        assert!(!moves.contains(&TilePos::new(3, 5)), "behind blocker");
        assert!(moves.contains(&TilePos::new(5, 3)));
    }

    #[test]
    fn tiles_in_view_follow_units() {
        let mut engine = engine(&OPEN);
        spawn(&mut engine, "warrior", HUMAN, 0, 0);
        let view = engine.tiles_in_view(HUMAN).expect("view");
        assert_eq!(view.len(), 6);
        assert!(view.contains(&TilePos::new(2, 0)));
        assert!(view.contains(&TilePos::new(1, 1)));
    }
}
