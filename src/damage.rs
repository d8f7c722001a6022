//! Damage formulas.
//!
//! Every damage quantity is a 3x3 grid: crit outcome (lower, expected,
//! higher) by trigger outcome (none, expected, triggered). Formula member
//! access (`伤害.暴击`, `伤害.不触发`, ...) picks a cell; plain access reads
//! the expected/expected cell.

use crate::ast::Variant;
use crate::attr::{Attr, AttrSet, WeaponAttr};
use crate::enemy::Enemy;
use serde::{Deserialize, Serialize};

const LOWER: usize = 0;
const EXPECTED: usize = 1;
const HIGHER: usize = 2;

/// Damage outcomes by `[crit][trigger]`.
///
/// # Examples
///
/// ```rust
/// use buildscore::damage::DamageDistribution;
/// use buildscore::ast::Variant;
///
/// let flat = DamageDistribution::flat(120.0);
/// assert_eq!(flat.get(Variant::Crit), 120.0);
/// assert_eq!(flat.expected(), 120.0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DamageDistribution {
    pub cells: [[f64; 3]; 3],
}

impl DamageDistribution {
    /// The same value in every cell.
    pub fn flat(value: f64) -> Self {
        Self {
            cells: [[value; 3]; 3],
        }
    }

    pub fn get(&self, variant: Variant) -> f64 {
        let (crit, trigger) = match variant {
            Variant::Expected => (EXPECTED, EXPECTED),
            Variant::Crit => (HIGHER, EXPECTED),
            Variant::NoCrit => (LOWER, EXPECTED),
            Variant::Trigger => (EXPECTED, HIGHER),
            Variant::NoTrigger => (EXPECTED, LOWER),
            Variant::CritTrigger => (HIGHER, HIGHER),
            Variant::CritNoTrigger => (HIGHER, LOWER),
            Variant::TriggerNoCrit => (LOWER, HIGHER),
            Variant::NoCritNoTrigger => (LOWER, LOWER),
        };
        self.cells[crit][trigger]
    }

    pub fn expected(&self) -> f64 {
        self.cells[EXPECTED][EXPECTED]
    }

    /// Every cell multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        let mut cells = self.cells;
        for row in cells.iter_mut() {
            for cell in row.iter_mut() {
                *cell *= factor;
            }
        }
        Self { cells }
    }
}

/// Crit multipliers `[lower, expected, higher]`.
///
/// Crit rates above 100% guarantee `floor(rate)` crits and possibly one more.
pub fn crit_factors(rate: f64, crit_damage: f64) -> [f64; 3] {
    let rate = rate.max(0.0);
    let extra = crit_damage - 1.0;
    [
        1.0 + rate.floor() * extra,
        1.0 + rate * extra,
        1.0 + rate.ceil().max(1.0) * extra,
    ]
}

/// `1 + boost * hp`, hp clamped into `[0, 1]`.
pub fn boost_multiplier(boost: f64, hp_percent: f64) -> f64 {
    1.0 + boost * hp_percent.clamp(0.0, 1.0)
}

/// `1 + 4d(1 - h)(1.5 - h)`, h clamped into `[0.25, 1]`.
///
/// ```rust
/// use buildscore::damage::desperate_multiplier;
///
/// assert_eq!(desperate_multiplier(0.5, 1.0), 1.0);
/// // floors at 25% health
/// assert_eq!(desperate_multiplier(0.5, 0.0), desperate_multiplier(0.5, 0.25));
/// ```
pub fn desperate_multiplier(desperate: f64, hp_percent: f64) -> f64 {
    let h = hp_percent.clamp(0.25, 1.0);
    if desperate == 0.0 || h == 1.0 {
        return 1.0;
    }
    1.0 + 4.0 * desperate * (1.0 - h) * (1.5 - h)
}

/// Everything damage depends on besides the hit itself.
#[derive(Debug, Clone)]
pub struct DamageContext<'a> {
    pub attrs: &'a AttrSet,
    pub enemy: &'a Enemy,
    pub hp_percent: f64,
    /// Defense multiplier, already resolved for the pool being hit.
    pub defense: f64,
}

impl<'a> DamageContext<'a> {
    pub fn new(attrs: &'a AttrSet, enemy: &'a Enemy, char_level: u32, hp_percent: f64) -> Self {
        Self {
            defense: enemy.defense_multiplier(char_level, attrs.get(Attr::IgnoreDefense)),
            attrs,
            enemy,
            hp_percent,
        }
    }

    /// Same context with defense mitigation replaced.
    pub fn with_defense(mut self, defense: f64) -> Self {
        self.defense = defense;
        self
    }

    /// Multipliers shared by weapon and skill damage.
    fn common(&self) -> f64 {
        let a = self.attrs;
        let imbalance = if self.enemy.staggered {
            1.0 + a.get(Attr::ImbalanceBonus)
        } else {
            1.0
        };
        self.enemy.resistance_multiplier(a.get(Attr::Penetration))
            * boost_multiplier(a.get(Attr::Boost), self.hp_percent)
            * desperate_multiplier(a.get(Attr::Desperate), self.hp_percent)
            * imbalance
            * self.defense
    }

    /// Damage of one weapon hit at `multiplier` times weapon attack.
    pub fn weapon_damage(
        &self,
        weapon: &WeaponAttr,
        damage_type: &str,
        multiplier: f64,
    ) -> DamageDistribution {
        let a = self.attrs;
        let physical = multiplier * weapon.attack;
        let elemental = multiplier * a.get(Attr::Attack);

        let triggers = if self.enemy.accepts_trigger(damage_type) {
            [0.0, weapon.trigger_rate, 1.0]
        } else {
            [0.0; 3]
        };
        let crits = crit_factors(weapon.crit_rate, weapon.crit_damage);

        let factor = self.common()
            * (1.0 + a.get(Attr::DamageIncrease) + a.get(Attr::WeaponDamage) + weapon.damage_increase)
            * (1.0 + a.get(Attr::IndependentDamageIncrease))
            * (1.0 + weapon.independent_damage_increase)
            * (1.0 + weapon.bonus_damage);

        let mut cells = [[0.0; 3]; 3];
        for (ci, crit) in crits.iter().enumerate() {
            for (ti, t) in triggers.iter().enumerate() {
                let base = physical * (1.0 + weapon.trigger_multiplier * t) + elemental;
                cells[ci][ti] = base * crit * factor;
            }
        }
        DamageDistribution { cells }
    }

    /// Damage of a skill hit with `base` pre-mitigation damage.
    ///
    /// Skills neither crit nor trigger, so every cell is equal.
    pub fn skill_damage(&self, base: f64) -> DamageDistribution {
        let a = self.attrs;
        let value = base
            * self.common()
            * (1.0 + a.get(Attr::DamageIncrease) + a.get(Attr::SkillDamage))
            * (1.0 + a.get(Attr::IndependentDamageIncrease));
        DamageDistribution::flat(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weapon() -> WeaponAttr {
        WeaponAttr {
            attack: 100.0,
            crit_rate: 0.5,
            crit_damage: 2.0,
            trigger_rate: 0.4,
            attack_speed: 1.0,
            multi_shot: 1.0,
            trigger_multiplier: 1.0,
            multiplier: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_crit_factors_grid() {
        assert_eq!(crit_factors(0.5, 2.0), [1.0, 1.5, 2.0]);
        // above 100%: one guaranteed crit, maybe a second
        assert_eq!(crit_factors(1.5, 2.0), [2.0, 2.5, 3.0]);
        assert_eq!(crit_factors(0.0, 2.0), [1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_desperate_zero_is_identity() {
        assert_eq!(desperate_multiplier(0.0, 0.3), 1.0);
        assert!(desperate_multiplier(0.5, 0.5) > 1.0);
    }

    #[test]
    fn test_boost_clamps_hp() {
        assert_eq!(boost_multiplier(0.5, 2.0), 1.5);
        assert_eq!(boost_multiplier(0.5, -1.0), 1.0);
    }

    #[test]
    fn test_weapon_damage_expected_cell() {
        let attrs = AttrSet::with_base_values();
        let enemy = Enemy::training_dummy(80);
        let ctx = DamageContext::new(&attrs, &enemy, 80, 1.0);
        let dist = ctx.weapon_damage(&weapon(), "切割", 1.0);
        // 100 * (1 + 0.4) * (1 + 0.5)
        assert!((dist.expected() - 210.0).abs() < 1e-9);
        assert!((dist.get(Variant::NoCritNoTrigger) - 100.0).abs() < 1e-9);
        assert!((dist.get(Variant::CritTrigger) - 400.0).abs() < 1e-9);
    }

    #[test]
    fn test_trigger_gated_by_vulnerability() {
        let attrs = AttrSet::with_base_values();
        let mut enemy = Enemy::training_dummy(80);
        enemy.vulnerable = Some("贯穿".into());
        let ctx = DamageContext::new(&attrs, &enemy, 80, 1.0);
        let dist = ctx.weapon_damage(&weapon(), "切割", 1.0);
        assert_eq!(dist.get(Variant::Trigger), dist.get(Variant::NoTrigger));
    }

    #[test]
    fn test_imbalance_only_when_staggered() {
        let mut attrs = AttrSet::with_base_values();
        attrs.set(Attr::ImbalanceBonus, 0.5);
        let mut enemy = Enemy::training_dummy(80);
        let calm = DamageContext::new(&attrs, &enemy, 80, 1.0).skill_damage(100.0);
        enemy.staggered = true;
        let staggered = DamageContext::new(&attrs, &enemy, 80, 1.0).skill_damage(100.0);
        assert_eq!(calm.expected(), 100.0);
        assert_eq!(staggered.expected(), 150.0);
    }

    #[test]
    fn test_skill_damage_multipliers() {
        let mut attrs = AttrSet::with_base_values();
        attrs.set(Attr::DamageIncrease, 0.2);
        attrs.set(Attr::SkillDamage, 0.3);
        attrs.set(Attr::IndependentDamageIncrease, 0.1);
        let enemy = Enemy::training_dummy(80);
        let dist = DamageContext::new(&attrs, &enemy, 80, 1.0).skill_damage(100.0);
        assert!((dist.get(Variant::Crit) - 165.0).abs() < 1e-9);
    }
}
