//! Deterministic combat math.
//!
//! Strengths are carried in hundredths so integer division stays monotonic:
//!
//! - base = attack * hp / max_hp
//! - effective defense = defense * (100 + terrain%) / 100 * (100 + bonus%) / 100
//! - damage = max(1, base^2 / (base + effective defense))
//!
//! The last form rises with base and falls with defense, and never exceeds
//! base.

use marchlands_protocol::{CombatKind, CombatOutcome, TilePos};

use crate::city::City;
use crate::rules::{CompiledRules, UnitType};
use crate::unit::Unit;

/// One side of a fight, flattened from unit/city + tile + civ bonuses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Combatant {
    pub attack: i32,
    pub defense: i32,
    pub hp: i32,
    pub max_hp: i32,
    pub combat: CombatKind,
    /// Distance at which this side can strike.
    pub range: i32,
    pub position: TilePos,
    /// Defense bonus of the occupied tile, percent.
    pub terrain_bonus_pct: i32,
    /// Fortification or walls, percent.
    pub defense_bonus_pct: i32,
    /// Cities never strike back.
    pub can_counter: bool,
}

impl Combatant {
    pub fn for_unit(
        unit: &Unit,
        unit_type: &UnitType,
        terrain_bonus_pct: i32,
        fortify_bonus_pct: i32,
        ranged_range_bonus: i32,
    ) -> Self {
        let range = if unit_type.is_ranged() {
            unit_type.range + ranged_range_bonus.max(0)
        } else {
            1
        };
        Self {
            attack: unit_type.attack,
            defense: unit_type.defense,
            hp: unit.hp,
            max_hp: unit_type.max_hp,
            combat: unit_type.combat,
            range,
            position: unit.position,
            terrain_bonus_pct,
            defense_bonus_pct: if unit.fortified { fortify_bonus_pct } else { 0 },
            can_counter: true,
        }
    }

    pub fn for_city(
        city: &City,
        rules: &CompiledRules,
        terrain_bonus_pct: i32,
        walls_pct: i32,
    ) -> Self {
        Self {
            attack: 0,
            defense: rules.tuning.city_defense,
            hp: city.hp,
            max_hp: rules.tuning.city_max_hp.max(1),
            combat: CombatKind::Melee,
            range: 0,
            position: city.position,
            terrain_bonus_pct,
            defense_bonus_pct: walls_pct,
            can_counter: false,
        }
    }

    pub fn is_ranged(&self) -> bool {
        self.combat == CombatKind::Ranged
    }

    /// Whether a strike at `distance` is possible at all.
    pub fn reaches(&self, distance: i32) -> bool {
        distance >= 1 && distance <= self.range
    }

    fn base_strength_x100(&self) -> i64 {
        if self.max_hp <= 0 || self.hp <= 0 {
            return 0;
        }
        self.attack.max(0) as i64 * 100 * self.hp as i64 / self.max_hp as i64
    }

    fn effective_defense_x100(&self) -> i64 {
        let terrain = (100 + self.terrain_bonus_pct).max(0) as i64;
        let bonus = (100 + self.defense_bonus_pct).max(0) as i64;
        self.defense.max(0) as i64 * 100 * terrain / 100 * bonus / 100
    }
}

/// Damage `attacker` deals to `defender` in one strike.
pub fn compute_damage(attacker: &Combatant, defender: &Combatant) -> i32 {
    let base = attacker.base_strength_x100();
    if base <= 0 {
        return 0;
    }
    let defense = defender.effective_defense_x100();
    let scaled = base * base / (base + defense) / 100;
    scaled.clamp(1, i32::MAX as i64) as i32
}

/// Counter rule: the defender must survive, be able to reach the attacker,
/// and ranged attackers firing from two or more tiles away are never
/// answered.
pub fn can_counterattack(attacker: &Combatant, defender: &Combatant, distance: i32) -> bool {
    if !defender.can_counter || defender.hp <= 0 {
        return false;
    }
    if attacker.is_ranged() && distance >= 2 {
        return false;
    }
    defender.reaches(distance)
}

/// Resolve a single exchange. Pure: the same inputs always give the same
/// outcome. HP is not mutated here; callers apply the damage.
pub fn resolve_combat(attacker: &Combatant, defender: &Combatant) -> CombatOutcome {
    let distance = attacker.position.distance(defender.position);

    let defender_damage = compute_damage(attacker, defender);
    let defender_after = Combatant {
        hp: defender.hp - defender_damage,
        ..*defender
    };
    let defender_died = defender_after.hp <= 0;

    let counter_damage = if can_counterattack(attacker, &defender_after, distance) {
        compute_damage(&defender_after, attacker)
    } else {
        0
    };
    let attacker_died = attacker.hp - counter_damage <= 0;

    CombatOutcome {
        defender_damage,
        counter_damage,
        defender_died,
        attacker_died,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fighter(attack: i32, defense: i32, combat: CombatKind, range: i32, at: TilePos) -> Combatant {
        Combatant {
            attack,
            defense,
            hp: 100,
            max_hp: 100,
            combat,
            range,
            position: at,
            terrain_bonus_pct: 0,
            defense_bonus_pct: 0,
            can_counter: true,
        }
    }

    fn melee(attack: i32, defense: i32, at: TilePos) -> Combatant {
        fighter(attack, defense, CombatKind::Melee, 1, at)
    }

    #[test]
    fn attack_eight_against_defense_four_on_grass() {
        let attacker = melee(8, 4, TilePos::new(0, 0));
        let defender = melee(8, 4, TilePos::new(1, 0));
        // 8^2 / (8 + 4) = 5.33
        assert_eq!(compute_damage(&attacker, &defender), 5);

        let first = resolve_combat(&attacker, &defender);
        let second = resolve_combat(&attacker, &defender);
        assert_eq!(first, second);
        assert_eq!(first.defender_damage, 5);
        assert!(first.counter_damage > 0);
    }

    #[test]
    fn damage_never_decreases_with_attack() {
        let defender = melee(10, 12, TilePos::new(1, 0));
        let mut last = 0;
        for attack in 1..60 {
            let dmg = compute_damage(&melee(attack, 0, TilePos::new(0, 0)), &defender);
            assert!(dmg >= last, "attack {attack}: {dmg} < {last}");
            assert!(dmg >= 1);
            last = dmg;
        }
    }

    #[test]
    fn damage_never_increases_with_defense_or_terrain() {
        let attacker = melee(20, 0, TilePos::new(0, 0));
        let mut last = i32::MAX;
        for defense in 0..60 {
            let dmg = compute_damage(&attacker, &melee(0, defense, TilePos::new(1, 0)));
            assert!(dmg <= last);
            last = dmg;
        }

        let mut last = i32::MAX;
        for terrain in [0, 25, 50, 100] {
            let mut defender = melee(0, 10, TilePos::new(1, 0));
            defender.terrain_bonus_pct = terrain;
            let dmg = compute_damage(&attacker, &defender);
            assert!(dmg <= last);
            last = dmg;
        }
    }

    #[test]
    fn wounded_attackers_hit_softer() {
        let defender = melee(10, 10, TilePos::new(1, 0));
        let mut attacker = melee(30, 10, TilePos::new(0, 0));
        let full = compute_damage(&attacker, &defender);
        attacker.hp = 50;
        let half = compute_damage(&attacker, &defender);
        assert!(half < full);
        assert!(half >= 1);
    }

    #[test]
    fn fortification_reduces_damage() {
        let attacker = melee(20, 5, TilePos::new(0, 0));
        let mut defender = melee(10, 10, TilePos::new(1, 0));
        let open = compute_damage(&attacker, &defender);
        defender.defense_bonus_pct = 25;
        assert!(compute_damage(&attacker, &defender) <= open);
    }

    #[test]
    fn melee_exchange_always_counters_when_defender_survives() {
        let attacker = melee(10, 10, TilePos::new(0, 0));
        let defender = melee(10, 10, TilePos::new(0, 1));
        let outcome = resolve_combat(&attacker, &defender);
        assert!(!outcome.defender_died);
        assert!(outcome.counter_damage >= 1);

        let archer = fighter(10, 5, CombatKind::Ranged, 2, TilePos::new(0, 1));
        let outcome = resolve_combat(&attacker, &archer);
        assert!(outcome.counter_damage >= 1);
    }

    #[test]
    fn ranged_fire_from_two_tiles_is_never_answered() {
        let archer = fighter(12, 5, CombatKind::Ranged, 2, TilePos::new(0, 0));
        let enemy_archer = fighter(12, 5, CombatKind::Ranged, 2, TilePos::new(2, 0));
        let warrior = melee(15, 10, TilePos::new(0, 2));

        assert_eq!(resolve_combat(&archer, &enemy_archer).counter_damage, 0);
        assert_eq!(resolve_combat(&archer, &warrior).counter_damage, 0);
    }

    #[test]
    fn dead_defenders_do_not_counter() {
        let attacker = melee(100, 10, TilePos::new(0, 0));
        let mut defender = melee(50, 1, TilePos::new(1, 0));
        defender.hp = 3;
        let outcome = resolve_combat(&attacker, &defender);
        assert!(outcome.defender_died);
        assert_eq!(outcome.counter_damage, 0);
        assert!(!outcome.attacker_died);
    }

    #[test]
    fn cities_never_counter() {
        let attacker = melee(15, 10, TilePos::new(0, 0));
        let mut city = melee(0, 10, TilePos::new(1, 0));
        city.can_counter = false;
        city.range = 0;
        let outcome = resolve_combat(&attacker, &city);
        assert!(outcome.defender_damage >= 1);
        assert_eq!(outcome.counter_damage, 0);
    }
}
