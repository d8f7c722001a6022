//! Target-function identifier resolution.
//!
//! Binds formula identifiers to a build's numbers, in three tiers:
//!
//! 1. quantities of the selected action: `伤害`, `段数` and the action's
//!    skill fields (damage fields resolve to damage times hit count);
//! 2. character attributes (canonical names, aliases, extras);
//! 3. weapon stats of the action's weapon, or of the weapon a type prefix
//!    names (`近战暴击`).
//!
//! A namespace (`近战::伤害`, `技能名::段数`) re-targets tier 1 and 3 at a
//! character skill, weapon, weapon skill or weapon type prefix.

use crate::aggregate::Aggregation;
use crate::ast::Variant;
use crate::attr::{Attr, AttrSet, StatKey, WeaponAttr, WeaponType};
use crate::build::Build;
use crate::damage::{DamageContext, DamageDistribution};
use crate::eval::Resolver;
use crate::leveled::{Leveled, LeveledSkill, LeveledWeapon, SkillField};

/// What a formula scores.
#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    /// A weapon's basic attack.
    Weapon(&'a LeveledWeapon),
    /// A skill owned by a weapon; damage fields multiply weapon attack.
    WeaponSkill(&'a LeveledWeapon, &'a LeveledSkill),
    /// A character skill; damage fields multiply a character stat.
    Skill(&'a LeveledSkill),
}

impl<'a> Action<'a> {
    pub fn weapon(&self) -> Option<&'a LeveledWeapon> {
        match *self {
            Action::Weapon(w) | Action::WeaponSkill(w, _) => Some(w),
            Action::Skill(_) => None,
        }
    }

    pub fn skill(&self) -> Option<&'a LeveledSkill> {
        match *self {
            Action::WeaponSkill(_, s) | Action::Skill(s) => Some(s),
            Action::Weapon(_) => None,
        }
    }

    pub fn name(&self) -> &'a str {
        match *self {
            Action::Weapon(w) => w.name(),
            Action::WeaponSkill(_, s) | Action::Skill(s) => s.name(),
        }
    }
}

/// Names that always resolve, to 0 when the action has no such field.
const ACTION_QUANTITIES: &[&str] = &["神智消耗", "每秒神智消耗"];

/// Resolution scope for one scoring call.
pub struct TargetContext<'a> {
    build: &'a Build,
    attrs: AttrSet,
    weapons: Vec<(&'a LeveledWeapon, WeaponAttr)>,
    action: Action<'a>,
    defense: Option<f64>,
}

impl<'a> TargetContext<'a> {
    pub fn new(build: &'a Build, aggregation: &Aggregation) -> Self {
        Self::with_attrs(build, aggregation, aggregation.attrs.clone())
    }

    /// Resolve against `attrs` instead of the aggregated attributes.
    ///
    /// Weapon stats still come from `aggregation`.
    pub fn with_attrs(build: &'a Build, aggregation: &Aggregation, attrs: AttrSet) -> Self {
        let aggregator = build.aggregator();
        let weapons = build
            .weapons()
            .into_iter()
            .map(|w| (w, aggregator.weapon_attrs(aggregation, w)))
            .collect();
        Self {
            build,
            attrs,
            weapons,
            action: build.action(build.base_name()),
            defense: None,
        }
    }

    /// Replace the defense multiplier (1 for raw damage).
    pub fn with_defense(mut self, defense: f64) -> Self {
        self.defense = Some(defense);
        self
    }

    pub fn action(&self) -> Action<'a> {
        self.action
    }

    pub fn attrs(&self) -> &AttrSet {
        &self.attrs
    }

    pub fn weapon_attr(&self, weapon: &LeveledWeapon) -> WeaponAttr {
        self.weapons
            .iter()
            .find(|(w, _)| std::ptr::eq(*w, weapon))
            .map(|(_, attr)| *attr)
            .unwrap_or_default()
    }

    fn damage_context(&self) -> DamageContext<'_> {
        let ctx = DamageContext::new(
            &self.attrs,
            self.build.enemy(),
            self.build.character().level(),
            self.build.hp_percent(),
        );
        match self.defense {
            Some(defense) => ctx.with_defense(defense),
            None => ctx,
        }
    }

    /// Per-hit damage and hit count of `field` (the primary damage field
    /// when `None`) of `action`.
    pub fn damage(&self, action: Action<'_>, field: Option<&SkillField>) -> (DamageDistribution, f64) {
        let ctx = self.damage_context();
        match action {
            Action::Weapon(w) => {
                let attr = self.weapon_attr(w);
                (ctx.weapon_damage(&attr, &w.record().damage_type, attr.multiplier), 1.0)
            }
            Action::WeaponSkill(w, s) => {
                let attr = self.weapon_attr(w);
                match field.or_else(|| s.primary_damage()) {
                    Some(f) => (
                        ctx.weapon_damage(&attr, &w.record().damage_type, f.scaled(&self.attrs)),
                        f.hit_count,
                    ),
                    None => (
                        ctx.weapon_damage(&attr, &w.record().damage_type, attr.multiplier),
                        1.0,
                    ),
                }
            }
            Action::Skill(s) => match field.or_else(|| s.primary_damage()) {
                Some(f) => {
                    let base = f.scaled(&self.attrs) * self.attrs.get(f.base.unwrap_or(Attr::Attack));
                    (ctx.skill_damage(base), f.hit_count)
                }
                None => (DamageDistribution::default(), 0.0),
            },
        }
    }

    /// Damage of the whole primary field (per hit times hit count).
    pub fn action_total(&self, variant: Variant) -> f64 {
        let (dist, hits) = self.damage(self.action, None);
        dist.get(variant) * hits.max(1.0)
    }

    fn weapon_of_type(&self, weapon_type: WeaponType) -> Option<&'a LeveledWeapon> {
        self.weapons
            .iter()
            .map(|(w, _)| *w)
            .find(|w| w.record().weapon_type == weapon_type)
            .or_else(|| {
                self.weapons
                    .iter()
                    .map(|(w, _)| *w)
                    .find(|w| w.record().weapon_type.accepts(weapon_type))
            })
    }

    fn resolve_in(&self, action: Action<'_>, name: &str, variant: Variant) -> Option<f64> {
        match name {
            "伤害" => return Some(self.damage(action, None).0.get(variant)),
            "段数" => return Some(self.damage(action, None).1),
            _ => {}
        }
        if let Some(field) = action.skill().and_then(|s| s.field(name)) {
            if field.is_damage() {
                let (dist, hits) = self.damage(action, Some(field));
                return Some(dist.get(variant) * hits);
            }
            return Some(field.scaled(&self.attrs));
        }
        if ACTION_QUANTITIES.contains(&name) {
            return Some(0.0);
        }
        if let Some(value) = self.attrs.get_by_name(name) {
            return Some(value);
        }
        match StatKey::parse(name)? {
            StatKey::Weapon { scope: None, stat } => Some(
                action
                    .weapon()
                    .map(|w| self.weapon_attr(w).get(stat))
                    .unwrap_or(0.0),
            ),
            StatKey::Weapon {
                scope: Some(weapon_type),
                stat,
            } => Some(
                self.weapon_of_type(weapon_type)
                    .map(|w| self.weapon_attr(w).get(stat))
                    .unwrap_or(0.0),
            ),
            StatKey::Char(attr) => Some(self.attrs.get(attr)),
        }
    }
}

impl Resolver for TargetContext<'_> {
    fn resolve(&self, namespace: Option<&str>, name: &str, variant: Variant) -> Option<f64> {
        let action = match namespace {
            None => self.action,
            Some(ns) => self.build.lookup_action(ns)?,
        };
        self.resolve_in(action, name, variant)
    }
}
