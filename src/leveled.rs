//! Leveled entities.
//!
//! Each entity wraps one static record plus a level-like parameter and
//! keeps a derived snapshot of the scaled numbers. Snapshots come from a
//! pure `recompute` and are swapped in whole by the clamping setter, so a
//! half-updated entity is never observable.

use crate::attr::{Attr, AttrSet, Bonuses, StatKey};
use crate::data::{
    BaseMultiplier, BuffRecord, CharacterRecord, CompareOp, ModCategory, ModRecord, SkillRecord,
    WeaponRecord,
};
use crate::error::BuildError;
use crate::numeric::{level_scale, linear_ramp, round_to, MAX_LEVEL, MIN_LEVEL};
use crate::transform::TransformScript;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Extra fields that only take whole values after scaling.
const INTEGRAL_EXTRAS: &[&str] = &["最大耐受"];

/// Common contract of every leveled entity.
///
/// Implementors provide the valid range and a pure `recompute`; the
/// provided `set_level` clamps, recomputes and stores.
pub trait Leveled {
    type Snapshot;

    fn level(&self) -> u32;

    fn level_range(&self) -> RangeInclusive<u32>;

    /// Derived values at `level`, without touching `self`.
    fn recompute(&self, level: u32) -> Self::Snapshot;

    fn store(&mut self, level: u32, snapshot: Self::Snapshot);

    /// Clamp `level` into range and refresh the snapshot.
    fn set_level(&mut self, level: u32) {
        let range = self.level_range();
        let level = level.clamp(*range.start(), *range.end());
        let snapshot = self.recompute(level);
        self.store(level, snapshot);
    }
}

// ============================================================================
// Character
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CharSnapshot {
    pub attack: f64,
    pub health: f64,
    pub shield: f64,
    pub defense: f64,
    pub sanity: f64,
}

#[derive(Debug, Clone)]
pub struct LeveledChar {
    record: Arc<CharacterRecord>,
    level: u32,
    snapshot: CharSnapshot,
}

impl LeveledChar {
    pub fn new(record: Arc<CharacterRecord>, level: Option<u32>) -> Self {
        let mut entity = Self {
            snapshot: CharSnapshot {
                attack: record.attack,
                health: record.health,
                shield: record.shield,
                defense: record.defense,
                sanity: record.sanity,
            },
            record,
            level: MAX_LEVEL,
        };
        entity.set_level(level.unwrap_or(MAX_LEVEL));
        entity
    }

    pub fn record(&self) -> &CharacterRecord {
        &self.record
    }

    pub fn snapshot(&self) -> &CharSnapshot {
        &self.snapshot
    }

    pub fn bonuses(&self) -> &Bonuses {
        &self.record.bonuses
    }
}

impl Leveled for LeveledChar {
    type Snapshot = CharSnapshot;

    fn level(&self) -> u32 {
        self.level
    }

    fn level_range(&self) -> RangeInclusive<u32> {
        MIN_LEVEL..=MAX_LEVEL
    }

    fn recompute(&self, level: u32) -> CharSnapshot {
        let scale = level_scale(level);
        CharSnapshot {
            attack: round_to(self.record.attack * scale, 2),
            health: (self.record.health * scale).round(),
            shield: (self.record.shield * scale).round(),
            defense: self.record.defense,
            sanity: self.record.sanity,
        }
    }

    fn store(&mut self, level: u32, snapshot: CharSnapshot) {
        self.level = level;
        self.snapshot = snapshot;
    }
}

// ============================================================================
// Weapon
// ============================================================================

pub const MAX_REFINE: u32 = 5;
pub const MIN_SKILL_LEVEL: u32 = 1;
pub const MAX_SKILL_LEVEL: u32 = 12;
const DEFAULT_SKILL_LEVEL: u32 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct WeaponSnapshot {
    pub attack: f64,
    pub crit_rate: f64,
    pub crit_damage: f64,
    pub trigger_rate: f64,
    pub multiplier: f64,
    pub fire_rate: Option<f64>,
    pub magazine: Option<f64>,
    pub reload: Option<f64>,
    /// Passive and effect bonuses at the current refinement.
    pub bonuses: Bonuses,
}

/// A weapon at a level (1-80), refinement (0-5) and, for resonance
/// weapons, a skill rank (1-12) driving its attack multiplier.
#[derive(Debug, Clone)]
pub struct LeveledWeapon {
    record: Arc<WeaponRecord>,
    effect: Option<Arc<BuffRecord>>,
    base_multiplier: Option<BaseMultiplier>,
    level: u32,
    refine: u32,
    skill_level: u32,
    skills: Vec<LeveledSkill>,
    snapshot: WeaponSnapshot,
}

impl LeveledWeapon {
    pub fn new(
        record: Arc<WeaponRecord>,
        effect: Option<Arc<BuffRecord>>,
        base_multiplier: Option<BaseMultiplier>,
        refine: Option<u32>,
        level: Option<u32>,
    ) -> Self {
        let skill_level = DEFAULT_SKILL_LEVEL;
        let skills = record
            .skills
            .iter()
            .map(|s| LeveledSkill::new(s.clone(), Some(skill_level), Some(record.name.clone())))
            .collect();
        let mut entity = Self {
            snapshot: WeaponSnapshot {
                attack: record.attack,
                crit_rate: record.crit_rate,
                crit_damage: record.crit_damage,
                trigger_rate: record.trigger_rate,
                multiplier: record.multiplier,
                fire_rate: record.fire_rate,
                magazine: record.magazine,
                reload: record.reload,
                bonuses: record.bonuses.clone(),
            },
            record,
            effect,
            base_multiplier,
            level: MAX_LEVEL,
            refine: refine.unwrap_or(MAX_REFINE).min(MAX_REFINE),
            skill_level,
            skills,
        };
        entity.set_level(level.unwrap_or(MAX_LEVEL));
        entity
    }

    pub fn record(&self) -> &WeaponRecord {
        &self.record
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn snapshot(&self) -> &WeaponSnapshot {
        &self.snapshot
    }

    pub fn refine(&self) -> u32 {
        self.refine
    }

    pub fn skill_level(&self) -> u32 {
        self.skill_level
    }

    pub fn skills(&self) -> &[LeveledSkill] {
        &self.skills
    }

    pub fn set_refine(&mut self, refine: u32) {
        self.refine = refine.min(MAX_REFINE);
        self.set_level(self.level);
    }

    /// Set the skill rank of a resonance weapon (clamped to 1-12).
    pub fn set_skill_level(&mut self, skill_level: u32) {
        self.skill_level = skill_level.clamp(MIN_SKILL_LEVEL, MAX_SKILL_LEVEL);
        for skill in &mut self.skills {
            skill.set_level(self.skill_level);
        }
        self.set_level(self.level);
    }

    fn refine_factor(&self) -> f64 {
        (self.refine as f64 + 5.0) / 10.0
    }
}

impl Leveled for LeveledWeapon {
    type Snapshot = WeaponSnapshot;

    fn level(&self) -> u32 {
        self.level
    }

    fn level_range(&self) -> RangeInclusive<u32> {
        MIN_LEVEL..=MAX_LEVEL
    }

    fn recompute(&self, level: u32) -> WeaponSnapshot {
        let factor = self.refine_factor();
        let mut bonuses = self.record.bonuses.scaled(factor, INTEGRAL_EXTRAS);
        if let Some(effect) = &self.effect {
            bonuses.merge(&effect.bonuses.scaled(factor, INTEGRAL_EXTRAS));
        }
        let multiplier = match &self.base_multiplier {
            Some(table) => table.at_rank(self.skill_level),
            None => self.record.multiplier,
        };
        WeaponSnapshot {
            attack: round_to(self.record.attack * level_scale(level), 2),
            crit_rate: self.record.crit_rate,
            crit_damage: self.record.crit_damage,
            trigger_rate: self.record.trigger_rate,
            multiplier,
            fire_rate: self.record.fire_rate,
            magazine: self.record.magazine,
            reload: self.record.reload,
            bonuses,
        }
    }

    fn store(&mut self, level: u32, snapshot: WeaponSnapshot) {
        self.level = level;
        self.snapshot = snapshot;
    }
}

// ============================================================================
// Mod
// ============================================================================

/// What a condition term compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionSubject {
    Attr(Attr),
    /// Number of equipped mods in the same category with this polarity.
    Polarity(char),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditionTerm {
    pub subject: ConditionSubject,
    pub op: CompareOp,
    pub value: f64,
}

impl ConditionTerm {
    pub fn holds(&self, attrs: &AttrSet, polarity_count: impl Fn(char) -> usize) -> bool {
        let lhs = match self.subject {
            ConditionSubject::Attr(attr) => attrs.get(attr),
            ConditionSubject::Polarity(p) => polarity_count(p) as f64,
        };
        self.op.holds(lhs, self.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModSnapshot {
    pub bonuses: Bonuses,
    /// Bonuses granted while every condition holds.
    pub conditional: Bonuses,
    pub tolerance: i32,
}

#[derive(Debug, Clone)]
pub struct LeveledMod {
    record: Arc<ModRecord>,
    effect: Option<Arc<BuffRecord>>,
    conditions: Vec<ConditionTerm>,
    rank: u32,
    snapshot: ModSnapshot,
}

impl LeveledMod {
    /// Wrap a mod record at `rank` (default: max rank for its quality).
    ///
    /// Fails when a condition subject is neither an attribute nor a
    /// polarity letter.
    pub fn new(
        record: Arc<ModRecord>,
        effect: Option<Arc<BuffRecord>>,
        rank: Option<u32>,
    ) -> Result<Self, BuildError> {
        let conditions = match &record.conditional {
            Some(cond) => cond
                .conditions
                .iter()
                .map(|c| parse_condition(&record.name, &c.0, c.1, c.2))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        let max = record.quality.max_rank();
        let mut entity = Self {
            snapshot: ModSnapshot {
                bonuses: record.bonuses.clone(),
                conditional: Bonuses::new(),
                tolerance: record.tolerance,
            },
            record,
            effect,
            conditions,
            rank: max,
        };
        entity.set_level(rank.unwrap_or(max));
        Ok(entity)
    }

    pub fn record(&self) -> &ModRecord {
        &self.record
    }

    pub fn id(&self) -> u32 {
        self.record.id
    }

    pub fn category(&self) -> ModCategory {
        self.record.category
    }

    pub fn max_rank(&self) -> u32 {
        self.record.quality.max_rank()
    }

    pub fn snapshot(&self) -> &ModSnapshot {
        &self.snapshot
    }

    pub fn conditions(&self) -> &[ConditionTerm] {
        &self.conditions
    }

    pub fn is_conditional(&self) -> bool {
        !self.conditions.is_empty()
    }

    pub fn polarity(&self) -> Option<char> {
        self.record.polarity.as_deref().and_then(|p| p.chars().next())
    }
}

fn parse_condition(
    mod_name: &str,
    subject: &str,
    op: CompareOp,
    value: f64,
) -> Result<ConditionTerm, BuildError> {
    let subject = match Attr::from_name(subject) {
        Some(attr) => ConditionSubject::Attr(attr),
        None => match subject.chars().next() {
            Some(c) if c.is_ascii_uppercase() => ConditionSubject::Polarity(c),
            _ => {
                return Err(BuildError::InvalidData(format!(
                    "mod \"{}\" has unknown condition subject \"{}\"",
                    mod_name, subject
                )))
            }
        },
    };
    Ok(ConditionTerm { subject, op, value })
}

fn scale_mod_bonuses(bonuses: &Bonuses, factor: f64) -> Bonuses {
    let mut scaled = bonuses.scaled(factor, INTEGRAL_EXTRAS);
    scaled.map_entry(StatKey::Char(Attr::SanityRegen), f64::round);
    scaled
}

impl Leveled for LeveledMod {
    type Snapshot = ModSnapshot;

    fn level(&self) -> u32 {
        self.rank
    }

    fn level_range(&self) -> RangeInclusive<u32> {
        0..=self.max_rank()
    }

    fn recompute(&self, rank: u32) -> ModSnapshot {
        let max = self.max_rank();
        let factor = linear_ramp(rank, max);
        let mut bonuses = scale_mod_bonuses(&self.record.bonuses, factor);
        if let Some(effect) = &self.effect {
            bonuses.merge(&scale_mod_bonuses(&effect.bonuses, linear_ramp(rank, 10)));
        }
        let conditional = self
            .record
            .conditional
            .as_ref()
            .map(|c| scale_mod_bonuses(&c.bonuses, factor))
            .unwrap_or_default();
        ModSnapshot {
            bonuses,
            conditional,
            tolerance: self.record.tolerance - max as i32 + rank as i32,
        }
    }

    fn store(&mut self, rank: u32, snapshot: ModSnapshot) {
        self.rank = rank;
        self.snapshot = snapshot;
    }
}

// ============================================================================
// Buff
// ============================================================================

/// A buff at a level. Dynamic buffs also carry a compiled transform script.
#[derive(Debug, Clone)]
pub struct LeveledBuff {
    record: Arc<BuffRecord>,
    script: Option<TransformScript>,
    level: u32,
    bonuses: Bonuses,
}

impl LeveledBuff {
    pub fn new(record: Arc<BuffRecord>, level: Option<u32>) -> Result<Self, BuildError> {
        let script = match &record.script {
            Some(steps) => Some(TransformScript::compile(steps)?),
            None => None,
        };
        let default_level = record
            .default_level
            .or(record.max_level)
            .or(record.min_level)
            .unwrap_or(1);
        let mut entity = Self {
            bonuses: record.bonuses.clone(),
            record,
            script,
            level: default_level,
        };
        entity.set_level(level.unwrap_or(default_level));
        Ok(entity)
    }

    pub fn record(&self) -> &BuffRecord {
        &self.record
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn bonuses(&self) -> &Bonuses {
        &self.bonuses
    }

    pub fn script(&self) -> Option<&TransformScript> {
        self.script.as_ref()
    }

    pub fn is_dynamic(&self) -> bool {
        self.script.is_some()
    }

    fn has_coefficients(&self) -> bool {
        self.record.a.is_some() || self.record.b.is_some()
    }

    /// Scale factor applied to the record's bonuses at `level`.
    pub fn factor_at(&self, level: u32) -> f64 {
        if self.has_coefficients() {
            let a = self.record.a.unwrap_or(1.0);
            let b = self.record.b.unwrap_or(1.0);
            let min = self.record.min_level.unwrap_or(1) as f64;
            (1.0 + (level as f64 - min) / b) / a
        } else if let Some(max) = self.record.max_level {
            linear_ramp(level, max)
        } else {
            1.0
        }
    }
}

impl Leveled for LeveledBuff {
    type Snapshot = Bonuses;

    fn level(&self) -> u32 {
        self.level
    }

    fn level_range(&self) -> RangeInclusive<u32> {
        let min = self
            .record
            .min_level
            .unwrap_or(if self.has_coefficients() { 1 } else { 0 });
        let max = self.record.max_level.unwrap_or(min.max(1)).max(min);
        min..=max
    }

    fn recompute(&self, level: u32) -> Bonuses {
        self.record
            .bonuses
            .scaled(self.factor_at(level), INTEGRAL_EXTRAS)
    }

    fn store(&mut self, level: u32, snapshot: Bonuses) {
        self.level = level;
        self.bonuses = snapshot;
    }
}

// ============================================================================
// Skill
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SkillField {
    pub name: String,
    pub value: f64,
    pub hit_count: f64,
    pub affected_by: Vec<Attr>,
    pub base: Option<Attr>,
}

impl SkillField {
    pub fn is_damage(&self) -> bool {
        self.name.contains("伤害")
    }

    pub fn is_cost(&self) -> bool {
        self.name.contains("神智消耗")
    }

    pub fn is_sustained_cost(&self) -> bool {
        self.name.contains("每秒神智消耗")
    }

    /// Field value after attribute scaling.
    ///
    /// Damage fields gain `技能倍率加数`; efficiency overrides the other
    /// scalings on cost fields, floored at 25% when durability also applies.
    pub fn scaled(&self, attrs: &AttrSet) -> f64 {
        let has = |a: Attr| self.affected_by.contains(&a);
        let mut value = self.value;
        if self.is_damage() {
            value += attrs.get(Attr::SkillMultiplierAdd);
        }
        if has(Attr::Range) {
            value *= attrs.get(Attr::Range);
        }
        if has(Attr::Power) {
            value *= attrs.get(Attr::Power);
        }
        let durability = attrs.get(Attr::Durability);
        if has(Attr::Durability) && durability > 0.0 {
            if self.is_sustained_cost() {
                value /= durability;
            } else {
                value *= durability;
            }
        }
        if has(Attr::Efficiency) {
            let saving = 2.0 - attrs.get(Attr::Efficiency);
            value = if has(Attr::Durability) && durability > 0.0 {
                self.value * (saving / durability).max(0.25)
            } else {
                self.value * saving
            };
        }
        if self.is_cost() {
            value = value.ceil();
        }
        value
    }
}

/// A character or weapon skill at a level (1-12).
#[derive(Debug, Clone)]
pub struct LeveledSkill {
    record: Arc<SkillRecord>,
    /// Owning weapon name, for weapon skills.
    weapon: Option<String>,
    level: u32,
    fields: Vec<SkillField>,
}

impl LeveledSkill {
    pub fn new(record: Arc<SkillRecord>, level: Option<u32>, weapon: Option<String>) -> Self {
        let mut entity = Self {
            record,
            weapon,
            level: DEFAULT_SKILL_LEVEL,
            fields: Vec::new(),
        };
        entity.set_level(level.unwrap_or(DEFAULT_SKILL_LEVEL));
        entity
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn weapon(&self) -> Option<&str> {
        self.weapon.as_deref()
    }

    pub fn fields(&self) -> &[SkillField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&SkillField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// First damage-labelled field.
    pub fn primary_damage(&self) -> Option<&SkillField> {
        self.fields.iter().find(|f| f.is_damage())
    }
}

impl Leveled for LeveledSkill {
    type Snapshot = Vec<SkillField>;

    fn level(&self) -> u32 {
        self.level
    }

    fn level_range(&self) -> RangeInclusive<u32> {
        MIN_SKILL_LEVEL..=MAX_SKILL_LEVEL
    }

    fn recompute(&self, level: u32) -> Vec<SkillField> {
        self.record
            .fields
            .iter()
            .map(|f| SkillField {
                name: f.name.clone(),
                value: f.value.at(level),
                hit_count: f.hit_count.as_ref().map(|h| h.at(level)).unwrap_or(1.0),
                affected_by: f.affected_by.clone(),
                base: f.base,
            })
            .collect()
    }

    fn store(&mut self, level: u32, snapshot: Vec<SkillField>) {
        self.level = level;
        self.fields = snapshot;
    }
}
