//! Civilization-level planning: goal posture, research, production and a
//! rally tile. Reads the state only; the caller turns the plan into commands.

use marchlands_protocol::{CityId, CivId, FogState, Personality, TechId, TilePos, UnitTypeId};

use crate::game::GameState;
use crate::map::is_passable;
use crate::rules::{CompiledRules, PersonalityWeights, TechEffect};
use crate::unit::Unit;

/// Enemies this close to a friendly city count as a threat.
const THREAT_RADIUS: i32 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategicGoal {
    Defend,
    Attack,
    Develop,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrategicPlan {
    pub goal: StrategicGoal,
    /// Only set while nothing is being researched.
    pub research: Option<TechId>,
    /// One pick per idle city.
    pub production: Vec<(CityId, UnitTypeId)>,
    /// Where units with no enemy in sight should head.
    pub objective: Option<TilePos>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Assessment {
    own_strength: i32,
    /// Visible enemy units only.
    enemy_strength: i32,
    /// Visible enemy strength near our cities.
    threat: i32,
    /// Stockpile below what the civilization started with.
    short_on_resources: bool,
}

#[derive(Clone, Copy, Debug, Default)]
struct UnlockScore {
    military: i32,
    economy: i32,
    research: i32,
    defense: i32,
}

/// Goal-adjusted weights, percent.
#[derive(Clone, Copy, Debug)]
struct Priorities {
    military: i32,
    economy: i32,
    research: i32,
    defense: i32,
}

pub fn update_objectives(state: &GameState, rules: &CompiledRules, civ: CivId) -> StrategicPlan {
    let Some(civ_state) = state.civ(civ) else {
        return StrategicPlan {
            goal: StrategicGoal::Develop,
            research: None,
            production: Vec::new(),
            objective: None,
        };
    };
    let weights = rules.tuning.weights(civ_state.personality);
    let assessment = assess(state, rules, civ);
    let goal = choose_goal(civ_state.personality, &assessment);
    let priorities = priorities(weights, goal, &assessment);

    StrategicPlan {
        goal,
        research: choose_research(state, rules, civ, priorities),
        production: choose_production(state, rules, civ, priorities),
        objective: choose_objective(state, rules, civ, goal),
    }
}

pub(crate) fn unit_strength(rules: &CompiledRules, unit: &Unit) -> i32 {
    let unit_type = rules.unit_type(unit.type_id);
    (unit_type.attack + unit_type.defense) * unit.hp.max(0) / unit_type.max_hp.max(1)
}

fn assess(state: &GameState, rules: &CompiledRules, civ: CivId) -> Assessment {
    let mut assessment = Assessment::default();
    let city_positions: Vec<TilePos> = state.cities_of(civ).map(|(_, c)| c.position).collect();

    for (_, unit) in state.units.iter_ordered() {
        let strength = unit_strength(rules, unit);
        if unit.owner == civ {
            assessment.own_strength += strength;
            continue;
        }
        if !state.is_visible_to(civ, unit.position) {
            continue;
        }
        assessment.enemy_strength += strength;
        if city_positions
            .iter()
            .any(|c| c.distance(unit.position) <= THREAT_RADIUS)
        {
            assessment.threat += strength;
        }
    }

    if let Some(c) = state.civ(civ) {
        assessment.short_on_resources =
            c.resources.total() < rules.tuning.starting_resources.total();
    }
    assessment
}

fn choose_goal(personality: Personality, assessment: &Assessment) -> StrategicGoal {
    let aggressive = personality == Personality::Aggressive;
    if assessment.threat > 0 {
        if aggressive && assessment.own_strength >= assessment.threat * 2 {
            return StrategicGoal::Attack;
        }
        return StrategicGoal::Defend;
    }
    if aggressive {
        return StrategicGoal::Attack;
    }
    if assessment.enemy_strength > 0
        && assessment.own_strength * 100 >= assessment.enemy_strength * 150
    {
        return StrategicGoal::Attack;
    }
    StrategicGoal::Develop
}

fn priorities(weights: &PersonalityWeights, goal: StrategicGoal, assessment: &Assessment) -> Priorities {
    let mut p = Priorities {
        military: weights.military,
        economy: weights.economy,
        research: weights.research,
        defense: weights.defense,
    };
    match goal {
        StrategicGoal::Attack => p.military *= 2,
        StrategicGoal::Defend => p.defense *= 2,
        StrategicGoal::Develop => p.economy += p.economy / 2,
    }
    if assessment.short_on_resources {
        p.economy += 25;
    }
    p
}

fn tech_unlock_scores(rules: &CompiledRules, tech: TechId) -> UnlockScore {
    let mut score = UnlockScore::default();
    let Some(tech) = rules.tech(tech) else {
        return score;
    };
    for effect in &tech.effects {
        match *effect {
            TechEffect::UnlockUnit(unit) => {
                let unit_type = rules.unit_type(unit);
                score.military += unit_type.attack + unit_type.defense;
            }
            TechEffect::RangedRange(amount) => score.military += amount * 10,
            TechEffect::CityYield { amount, .. } => score.economy += amount * 5,
            TechEffect::ProductionBonus(pct) => score.economy += pct / 2,
            TechEffect::ResearchBonus(pct) => score.research += pct / 2,
            TechEffect::CityDefense(pct) => score.defense += pct / 2,
        }
    }
    if tech.effects.is_empty() {
        // Stepping stones still lead somewhere.
        score.research += 2;
    }
    score
}

/// Highest weighted unlock value minus a cost bias; ties go to the cheaper
/// tech, then the lower id.
fn choose_research(
    state: &GameState,
    rules: &CompiledRules,
    civ: CivId,
    p: Priorities,
) -> Option<TechId> {
    let civ_state = state.civ(civ)?;
    if civ_state.tech.researching.is_some() {
        return None;
    }

    let mut best: Option<(i32, i32, TechId)> = None;
    for tech in civ_state.tech.available(rules) {
        let Some(cost) = rules.tech(tech).map(|t| t.cost) else {
            continue;
        };
        let unlock = tech_unlock_scores(rules, tech);
        let value = (unlock.military * p.military
            + unlock.economy * p.economy
            + unlock.research * p.research
            + unlock.defense * p.defense)
            / 100;
        let score = value - cost / 5;

        let replace = best
            .map(|(best_score, best_cost, _)| {
                score > best_score || (score == best_score && cost < best_cost)
            })
            .unwrap_or(true);
        if replace {
            best = Some((score, cost, tech));
        }
    }
    best.map(|(_, _, id)| id)
}

fn choose_production(
    state: &GameState,
    rules: &CompiledRules,
    civ: CivId,
    p: Priorities,
) -> Vec<(CityId, UnitTypeId)> {
    let Some(civ_state) = state.civ(civ) else {
        return Vec::new();
    };

    // Out of gold with paid units already on the books: stop adding upkeep.
    let units = state.units_of(civ).count() as i32;
    if civ_state.resources.gold == 0 && units > rules.tuning.free_units {
        return Vec::new();
    }

    let mut best: Option<(i32, i32, UnitTypeId)> = None;
    for unit_type_id in rules.unit_type_ids_ordered() {
        if !civ_state.tech.can_build(unit_type_id) {
            continue;
        }
        let unit_type = rules.unit_type(unit_type_id);
        let score = (unit_type.attack * p.military + unit_type.defense * p.defense) * 100
            / unit_type.cost.max(1);
        let replace = best
            .map(|(best_score, best_cost, _)| {
                score > best_score || (score == best_score && unit_type.cost < best_cost)
            })
            .unwrap_or(true);
        if replace {
            best = Some((score, unit_type.cost, unit_type_id));
        }
    }
    let Some((_, _, pick)) = best else {
        return Vec::new();
    };

    state
        .cities_of(civ)
        .filter(|(_, c)| !c.is_producing())
        .map(|(id, _)| (id, pick))
        .collect()
}

/// Where the civilization measures distances from: its first city, else its
/// first unit.
fn home_tile(state: &GameState, civ: CivId) -> Option<TilePos> {
    state
        .cities_of(civ)
        .map(|(_, c)| c.position)
        .next()
        .or_else(|| state.units_of(civ).map(|(_, u)| u.position).next())
}

fn choose_objective(
    state: &GameState,
    rules: &CompiledRules,
    civ: CivId,
    goal: StrategicGoal,
) -> Option<TilePos> {
    let home = home_tile(state, civ)?;
    let picked = match goal {
        StrategicGoal::Defend => most_threatened_city(state, rules, civ),
        StrategicGoal::Attack => weakest_known_enemy_city(state, civ, home),
        StrategicGoal::Develop => nearest_unclaimed_resource(state, rules, civ, home),
    };
    picked.or_else(|| nearest_frontier(state, rules, civ, home))
}

fn most_threatened_city(state: &GameState, rules: &CompiledRules, civ: CivId) -> Option<TilePos> {
    let mut best: Option<(i32, TilePos)> = None;
    for (_, city) in state.cities_of(civ) {
        let threat: i32 = state
            .units
            .iter_ordered()
            .filter(|(_, u)| {
                u.owner != civ
                    && state.is_visible_to(civ, u.position)
                    && u.position.distance(city.position) <= THREAT_RADIUS
            })
            .map(|(_, u)| unit_strength(rules, u))
            .sum();
        if threat > 0 && best.is_none_or(|(b, _)| threat > b) {
            best = Some((threat, city.position));
        }
    }
    best.map(|(_, pos)| pos)
}

/// Known enemy city with the fewest visible defenders nearby, then nearest.
fn weakest_known_enemy_city(state: &GameState, civ: CivId, home: TilePos) -> Option<TilePos> {
    state
        .cities
        .iter_ordered()
        .filter(|(_, c)| c.owner != civ && state.fog_state(civ, c.position).is_known())
        .map(|(id, c)| {
            let defenders = state
                .units
                .iter_ordered()
                .filter(|(_, u)| {
                    u.owner == c.owner
                        && state.is_visible_to(civ, u.position)
                        && u.position.distance(c.position) <= 2
                })
                .count();
            ((defenders, home.distance(c.position), id.to_raw()), c.position)
        })
        .min_by_key(|(key, _)| *key)
        .map(|(_, pos)| pos)
}

/// Known, empty resource tile outside every city's worked radius.
fn nearest_unclaimed_resource(
    state: &GameState,
    rules: &CompiledRules,
    civ: CivId,
    home: TilePos,
) -> Option<TilePos> {
    let radius = rules.tuning.worked_radius;
    (0..state.map.len())
        .filter_map(|i| {
            let tile = state.map.tile_at_index(i)?;
            tile.resource?;
            let pos = state.map.pos_at_index(i)?;
            Some((i, pos))
        })
        .filter(|(_, pos)| {
            state.fog_state(civ, *pos).is_known()
                && is_passable(&state.map, rules, *pos)
                && state.unit_at(*pos).is_none()
                && state
                    .cities
                    .iter_ordered()
                    .all(|(_, c)| c.position.distance(*pos) > radius)
        })
        .min_by_key(|(i, pos)| (home.distance(*pos), *i))
        .map(|(_, pos)| pos)
}

/// Known passable tile bordering unexplored ground.
fn nearest_frontier(
    state: &GameState,
    rules: &CompiledRules,
    civ: CivId,
    home: TilePos,
) -> Option<TilePos> {
    let civ_state = state.civ(civ)?;
    (0..state.map.len())
        .filter(|&i| civ_state.fog.is_known(i))
        .filter(|&i| {
            state
                .map
                .neighbors_indices(i)
                .into_iter()
                .flatten()
                .any(|n| civ_state.fog.state(n) == FogState::Unseen)
        })
        .filter_map(|i| Some((i, state.map.pos_at_index(i)?)))
        .filter(|(_, pos)| is_passable(&state.map, rules, *pos) && state.unit_at(*pos).is_none())
        .min_by_key(|(i, pos)| (home.distance(*pos), *i))
        .map(|(_, pos)| pos)
}
