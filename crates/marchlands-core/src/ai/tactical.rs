//! Per-unit decisions. `plan_unit` only ranks; `plan_and_execute` tries the
//! intents in order until the engine accepts one.

use marchlands_protocol::{AttackTarget, Command, Event, TilePos, UnitId};
use tracing::debug;

use crate::combat::resolve_combat;
use crate::game::{GameEngine, GameState};
use crate::map::movement_cost_to_enter;
use crate::pathfinding::{find_path, PathQuery};
use crate::rules::{CompiledRules, PersonalityWeights};

use super::strategic::StrategicPlan;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    Attack(AttackTarget),
    Move(TilePos),
    Fortify,
}

impl Intent {
    pub fn into_command(self, unit: UnitId) -> Command {
        match self {
            Intent::Attack(AttackTarget::Unit(target)) => Command::Attack { unit, target },
            Intent::Attack(AttackTarget::City(city)) => Command::AttackCity { unit, city },
            Intent::Move(to) => Command::MoveUnit { unit, to },
            Intent::Fortify => Command::Fortify { unit },
        }
    }
}

/// Plays one unit's turn and returns the commands the engine accepted, in
/// order. Empty means the unit skipped.
///
/// A successful move is followed by one more look for an attack from the new
/// tile.
pub fn plan_and_execute(
    engine: &mut GameEngine,
    unit_id: UnitId,
    plan: &StrategicPlan,
    events: &mut Vec<Event>,
) -> Vec<Command> {
    let mut issued = Vec::new();
    for intent in plan_unit(engine.state(), engine.rules(), unit_id, plan) {
        let command = intent.into_command(unit_id);
        if !issue(engine, command.clone(), events) {
            continue;
        }
        issued.push(command);
        if matches!(intent, Intent::Move(_)) {
            issued.extend(follow_up_attack(engine, unit_id, events));
        }
        break;
    }
    issued
}

fn follow_up_attack(
    engine: &mut GameEngine,
    unit_id: UnitId,
    events: &mut Vec<Event>,
) -> Option<Command> {
    let owner = engine.state().units.get(unit_id)?.owner;
    let personality = engine.state().civ(owner)?.personality;
    let weights = *engine.rules().tuning.weights(personality);
    let can_retreat = retreat_step(engine.state(), engine.rules(), unit_id).is_some();
    let intents = attack_intents(engine.state(), engine.rules(), unit_id, &weights, can_retreat);
    intents
        .into_iter()
        .map(|intent| intent.into_command(unit_id))
        .find(|command| issue(engine, command.clone(), events))
}

/// Applies `command`, collecting its events. Plans are built from a snapshot
/// of the state, so rejections are expected and only logged.
pub(super) fn issue(engine: &mut GameEngine, command: Command, events: &mut Vec<Event>) -> bool {
    match engine.apply_command(command.clone()) {
        Ok(produced) => {
            events.extend(produced);
            true
        }
        Err(err) => {
            debug!(?command, error = %err, "ai command rejected");
            false
        }
    }
}

/// Ranked intents for one unit, best first. Always ends with `Fortify`.
pub fn plan_unit(
    state: &GameState,
    rules: &CompiledRules,
    unit_id: UnitId,
    plan: &StrategicPlan,
) -> Vec<Intent> {
    let Some(unit) = state.units.get(unit_id) else {
        return Vec::new();
    };
    let Some(civ) = state.civ(unit.owner) else {
        return Vec::new();
    };
    let weights = rules.tuning.weights(civ.personality);
    let unit_type = rules.unit_type(unit.type_id);

    let retreat = retreat_step(state, rules, unit_id);
    let mut intents = attack_intents(state, rules, unit_id, weights, retreat.is_some());

    if unit.health_pct(unit_type) < weights.retreat_below_pct {
        intents.extend(retreat.map(Intent::Move));
        intents.push(Intent::Fortify);
        return intents;
    }

    intents.extend(approach_enemy(state, rules, unit_id).map(Intent::Move));
    if let Some(objective) = plan.objective {
        intents.extend(step_toward(state, rules, unit_id, objective, 0).map(Intent::Move));
    }
    intents.push(Intent::Fortify);
    intents
}

/// Attacks worth taking now, weakest target first. Weakness is remaining
/// health as a share of the target's maximum, then distance.
///
/// An attack the attacker would not survive is never proposed. One that
/// would leave it under the personality's safety floor is proposed only
/// when it has nowhere to fall back to.
pub fn attack_intents(
    state: &GameState,
    rules: &CompiledRules,
    unit_id: UnitId,
    weights: &PersonalityWeights,
    can_retreat: bool,
) -> Vec<Intent> {
    let Some(unit) = state.units.get(unit_id) else {
        return Vec::new();
    };
    let max_hp = rules.unit_type(unit.type_id).max_hp.max(1);

    // Attacking drops fortification, so judge the exchange without it.
    let mut striker = unit.clone();
    striker.fortified = false;
    let attacker = state.unit_combatant(rules, &striker);

    let mut scored = Vec::new();
    for target in state.attack_targets(rules, unit_id) {
        let (defender, target_pct) = match target {
            AttackTarget::Unit(id) => match state.units.get(id) {
                Some(u) => (
                    state.unit_combatant(rules, u),
                    u.health_pct(rules.unit_type(u.type_id)),
                ),
                None => continue,
            },
            AttackTarget::City(id) => match state.cities.get(id) {
                Some(c) => (
                    state.city_combatant(rules, c),
                    c.hp.max(0) * 100 / rules.tuning.city_max_hp.max(1),
                ),
                None => continue,
            },
        };
        let outcome = resolve_combat(&attacker, &defender);
        if outcome.attacker_died {
            continue;
        }
        let hp_after_pct = (unit.hp - outcome.counter_damage) * 100 / max_hp;
        if hp_after_pct < weights.safety_floor_pct && can_retreat {
            continue;
        }
        let distance = unit.position.distance(defender.position);
        scored.push(((target_pct, distance, target), target));
    }

    scored.sort_by_key(|(key, _)| *key);
    scored
        .into_iter()
        .map(|(_, target)| Intent::Attack(target))
        .collect()
}

/// Furthest tile along the path to `goal` that the unit can reach this turn,
/// stopping early once within `stop_range` of the goal. `None` when the unit
/// cannot make progress.
pub fn step_toward(
    state: &GameState,
    rules: &CompiledRules,
    unit_id: UnitId,
    goal: TilePos,
    stop_range: i32,
) -> Option<TilePos> {
    let unit = state.units.get(unit_id)?;
    if unit.moves_left <= 0 || unit.position.distance(goal) <= stop_range {
        return None;
    }

    let blocked = state.movement_blockers(unit_id, unit.owner);
    let query = PathQuery::new(&state.map, rules, &blocked);
    let path = find_path(&query, unit.position, goal).ok()?;

    let mut spent = 0;
    let mut best = None;
    for pos in path.into_iter().skip(1) {
        let index = state.map.index_of(pos)?;
        // Only the goal itself can be occupied.
        if blocked[index] {
            break;
        }
        spent += movement_cost_to_enter(&state.map, rules, index)?;
        if spent > unit.moves_left {
            break;
        }
        best = Some(pos);
        if pos.distance(goal) <= stop_range {
            break;
        }
    }
    best
}

/// Step toward the closest friendly city, if any is reachable.
fn retreat_step(state: &GameState, rules: &CompiledRules, unit_id: UnitId) -> Option<TilePos> {
    let unit = state.units.get(unit_id)?;
    let (_, city) = state
        .cities_of(unit.owner)
        .min_by_key(|(id, c)| (unit.position.distance(c.position), *id))?;
    if city.position == unit.position {
        return None;
    }
    step_toward(state, rules, unit_id, city.position, 0)
}

/// Step toward the nearest known enemy, stopping at attack range.
///
/// Candidates are enemy units the owner currently sees and enemy cities it
/// has ever seen, nearest first with cities ahead of units on ties. Every
/// candidate is tried until one yields a step; each search is bounded by the
/// pathfinder's node limit.
fn approach_enemy(state: &GameState, rules: &CompiledRules, unit_id: UnitId) -> Option<TilePos> {
    let unit = state.units.get(unit_id)?;
    let owner = unit.owner;
    let range = state.unit_attack_range(rules, unit);

    let mut candidates: Vec<((i32, u8, u64), TilePos)> = state
        .cities
        .iter_ordered()
        .filter(|(_, c)| c.owner != owner && state.fog_state(owner, c.position).is_known())
        .map(|(id, c)| ((unit.position.distance(c.position), 0, id.to_raw()), c.position))
        .collect();
    candidates.extend(
        state
            .units
            .iter_ordered()
            .filter(|(_, u)| u.owner != owner && state.is_visible_to(owner, u.position))
            .map(|(id, u)| ((unit.position.distance(u.position), 1, id.to_raw()), u.position)),
    );
    candidates.sort_by_key(|(key, _)| *key);

    candidates
        .into_iter()
        .find_map(|(_, pos)| step_toward(state, rules, unit_id, pos, range))
}
