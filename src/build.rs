//! The `Build` aggregate root.
//!
//! A build owns one character, the melee and ranged weapons (plus the
//! character's resonance weapon when it has one), up to 8+8+8+4 mods, an
//! optional aura mod, static and dynamic buffs, the enemy, the target
//! function and an optional timeline. Scoring is a pure read:
//!
//! ```text
//! Build -> Aggregator (attributes, conditional fixed point)
//!       -> TargetContext (damage model + identifier tiers)
//!       -> evaluate(target function)
//! ```
//!
//! What-if comparisons clone the build and mutate the clone. Clones share
//! the static data, the engine configuration and the parsed-formula cache.

use crate::aggregate::{AggregateInput, Aggregation, Aggregator, ModGroup, Scope};
use crate::ast::Expr;
use crate::attr::{AttrSet, WeaponAttr, WeaponType};
use crate::config::EngineConfig;
use crate::data::{GameData, ModCategory, ModRecord};
use crate::enemy::{Enemy, HpType};
use crate::error::{BuildError, FormulaError};
use crate::eval::{evaluate, identifier_names, validate};
use crate::leveled::{Leveled, LeveledBuff, LeveledChar, LeveledMod, LeveledSkill, LeveledWeapon};
use crate::optimizer::SelectionState;
use crate::parser::parse;
use crate::target::{Action, TargetContext};
use crate::timeline::{simulate, Timeline, TimelineReport};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

type AstCache = Arc<Mutex<HashMap<String, Result<Arc<Expr>, FormulaError>>>>;

/// One mod in an option bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModSpec {
    pub id: u32,
    /// Max rank for the mod's quality when absent.
    #[serde(default)]
    pub rank: Option<u32>,
}

impl ModSpec {
    pub fn new(id: u32) -> Self {
        Self { id, rank: None }
    }
}

/// One buff in an option bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuffSpec {
    pub name: String,
    #[serde(default)]
    pub level: Option<u32>,
}

/// Mod lists per category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModLists {
    pub character: Vec<ModSpec>,
    pub melee: Vec<ModSpec>,
    pub ranged: Vec<ModSpec>,
    pub resonance: Vec<ModSpec>,
}

impl ModLists {
    pub fn get(&self, category: ModCategory) -> &[ModSpec] {
        match category {
            ModCategory::Character => &self.character,
            ModCategory::Melee => &self.melee,
            ModCategory::Ranged => &self.ranged,
            ModCategory::Resonance => &self.resonance,
        }
    }

    pub fn get_mut(&mut self, category: ModCategory) -> &mut Vec<ModSpec> {
        match category {
            ModCategory::Character => &mut self.character,
            ModCategory::Melee => &mut self.melee,
            ModCategory::Ranged => &mut self.ranged,
            ModCategory::Resonance => &mut self.resonance,
        }
    }
}

/// Enemy selection. Without a monster name the enemy is a training dummy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnemySpec {
    pub monster: Option<String>,
    pub level: u32,
    /// Overrides the monster's resistance.
    pub resistance: Option<f64>,
    pub hp_type: HpType,
    pub staggered: bool,
    /// Overrides the monster's vulnerable damage type.
    pub vulnerable: Option<String>,
}

impl Default for EnemySpec {
    fn default() -> Self {
        Self {
            monster: None,
            level: 80,
            resistance: None,
            hp_type: HpType::Health,
            staggered: false,
            vulnerable: None,
        }
    }
}

/// Everything needed to construct a [`Build`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    pub character: String,
    pub character_level: Option<u32>,
    pub melee: String,
    pub melee_refine: Option<u32>,
    pub melee_level: Option<u32>,
    pub ranged: String,
    pub ranged_refine: Option<u32>,
    pub ranged_level: Option<u32>,
    /// Level of character skills and rank of the resonance weapon.
    pub skill_level: Option<u32>,
    pub mods: ModLists,
    pub aura_mod: Option<ModSpec>,
    pub buffs: Vec<BuffSpec>,
    pub dynamic_buffs: Vec<BuffSpec>,
    pub enemy: EnemySpec,
    /// Current health fraction, for boost and desperate.
    pub hp_percent: f64,
    /// Flat gain added to attack/health/shield/defense multipliers.
    pub resonance_gain: f64,
    /// Selected action: weapon name, weapon skill or character skill.
    pub base_name: String,
    /// Falls back to the configured default when absent.
    pub target_function: Option<String>,
    pub timeline: Option<Timeline>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            character: String::new(),
            character_level: None,
            melee: String::new(),
            melee_refine: None,
            melee_level: None,
            ranged: String::new(),
            ranged_refine: None,
            ranged_level: None,
            skill_level: None,
            mods: ModLists::default(),
            aura_mod: None,
            buffs: Vec::new(),
            dynamic_buffs: Vec::new(),
            enemy: EnemySpec::default(),
            hp_percent: 1.0,
            resonance_gain: 0.0,
            base_name: String::new(),
            target_function: None,
            timeline: None,
        }
    }
}

impl BuildOptions {
    pub fn from_json(json: &str) -> Result<Self, BuildError> {
        serde_json::from_str(json).map_err(|e| BuildError::InvalidData(e.to_string()))
    }
}

/// Weapon slots of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeaponSlot {
    Melee,
    Ranged,
    Resonance,
}

/// A mod or buff whose marginal value `calc_income` measures.
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate {
    Mod { id: u32, rank: Option<u32> },
    Buff { name: String, level: Option<u32> },
}

/// Character attributes together with one weapon's stats.
#[derive(Debug, Clone, PartialEq)]
pub struct WeaponAttributes {
    pub attrs: AttrSet,
    pub weapon: WeaponAttr,
}

/// A scored loadout.
///
/// # Examples
///
/// ```rust
/// use buildscore::build::{Build, BuildOptions};
/// use buildscore::data::GameData;
/// use std::sync::Arc;
///
/// let data = GameData::from_json(r#"{
///     "characters": [{ "id": 1, "name": "测试", "element": "光",
///                      "attack": 300, "health": 1000, "shield": 100,
///                      "defense": 50, "sanity": 200 }],
///     "weapons": [
///         { "id": 2, "name": "刀", "weapon_type": "近战", "attack": 100,
///           "crit_rate": 0.2, "crit_damage": 2.0 },
///         { "id": 3, "name": "枪", "weapon_type": "远程", "attack": 80 }
///     ]
/// }"#).unwrap();
///
/// let build = Build::new(Arc::new(data), BuildOptions {
///     character: "测试".into(),
///     melee: "刀".into(),
///     ranged: "枪".into(),
///     base_name: "刀".into(),
///     target_function: Some("攻击".into()),
///     ..Default::default()
/// }).unwrap();
///
/// assert_eq!(build.calculate(), 300.0);
/// assert!(build.validate_ast("攻击 +").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct Build {
    data: Arc<GameData>,
    config: Arc<EngineConfig>,
    character: LeveledChar,
    skills: Vec<LeveledSkill>,
    melee: LeveledWeapon,
    ranged: LeveledWeapon,
    resonance: Option<LeveledWeapon>,
    mods: [Vec<LeveledMod>; 4],
    aura: Option<LeveledMod>,
    buffs: Vec<LeveledBuff>,
    dynamic_buffs: Vec<LeveledBuff>,
    enemy: Enemy,
    hp_percent: f64,
    resonance_gain: f64,
    base_name: String,
    target_function: String,
    timeline: Option<Timeline>,
    ast_cache: AstCache,
}

fn load_weapon(
    data: &GameData,
    name: &str,
    refine: Option<u32>,
    level: Option<u32>,
) -> Result<LeveledWeapon, BuildError> {
    let record = data.weapon(name)?;
    let effect = data.effect(name);
    let base_multiplier = record
        .base_multiplier
        .as_deref()
        .and_then(|variant| data.base_multiplier(record.weapon_type.name(), variant));
    Ok(LeveledWeapon::new(record, effect, base_multiplier, refine, level))
}

fn load_enemy(data: &GameData, spec: &EnemySpec) -> Result<Enemy, BuildError> {
    let mut enemy = match &spec.monster {
        Some(name) => Enemy::from_record(&*data.monster(name)?, spec.level),
        None => Enemy::training_dummy(spec.level),
    };
    if let Some(resistance) = spec.resistance {
        enemy.resistance = resistance;
    }
    if spec.vulnerable.is_some() {
        enemy.vulnerable = spec.vulnerable.clone();
    }
    enemy.hp_type = spec.hp_type;
    enemy.staggered = spec.staggered;
    Ok(enemy)
}

impl Build {
    /// Construct with the default engine configuration.
    pub fn new(data: Arc<GameData>, options: BuildOptions) -> Result<Self, BuildError> {
        Self::with_config(data, Arc::new(EngineConfig::default()), options)
    }

    /// Construct from an option bag.
    ///
    /// Unknown characters, weapons, mods, buffs or monsters fail with
    /// [`BuildError::DataNotFound`]; mods beyond a category's cap or
    /// breaking exclusivity fail with [`BuildError::InvalidData`].
    pub fn with_config(
        data: Arc<GameData>,
        config: Arc<EngineConfig>,
        options: BuildOptions,
    ) -> Result<Self, BuildError> {
        let record = data.character(&options.character)?;
        let character = LeveledChar::new(record.clone(), options.character_level);
        let skills = record
            .skills
            .iter()
            .map(|s| LeveledSkill::new(s.clone(), options.skill_level, None))
            .collect();
        let melee = load_weapon(&data, &options.melee, options.melee_refine, options.melee_level)?;
        let ranged = load_weapon(
            &data,
            &options.ranged,
            options.ranged_refine,
            options.ranged_level,
        )?;
        let resonance = match &record.resonance_weapon {
            Some(name) => {
                let mut weapon = load_weapon(&data, name, None, options.character_level)?;
                if let Some(level) = options.skill_level {
                    weapon.set_skill_level(level);
                }
                Some(weapon)
            }
            None => None,
        };
        let enemy = load_enemy(&data, &options.enemy)?;
        if let Some(timeline) = &options.timeline {
            timeline.validate(&data)?;
        }

        let mut build = Self {
            target_function: options
                .target_function
                .clone()
                .unwrap_or_else(|| config.default_target_function.clone()),
            data,
            config,
            character,
            skills,
            melee,
            ranged,
            resonance,
            mods: Default::default(),
            aura: None,
            buffs: Vec::new(),
            dynamic_buffs: Vec::new(),
            enemy,
            hp_percent: options.hp_percent.clamp(0.0, 1.0),
            resonance_gain: options.resonance_gain,
            base_name: options.base_name.clone(),
            timeline: options.timeline.clone(),
            ast_cache: Arc::default(),
        };

        for category in ModCategory::ALL {
            for spec in options.mods.get(category) {
                build.equip_mod(spec.id, spec.rank)?;
            }
        }
        if let Some(spec) = options.aura_mod {
            build.set_aura_mod(Some(spec))?;
        }
        for spec in options.buffs.iter().chain(&options.dynamic_buffs) {
            build.add_buff(&spec.name, spec.level)?;
        }
        Ok(build)
    }

    /// Option bag reproducing this build.
    pub fn to_options(&self) -> BuildOptions {
        let mut mods = ModLists::default();
        for category in ModCategory::ALL {
            *mods.get_mut(category) = self.mods[category.index()]
                .iter()
                .map(|m| ModSpec {
                    id: m.id(),
                    rank: Some(m.level()),
                })
                .collect();
        }
        let buff_spec = |b: &LeveledBuff| BuffSpec {
            name: b.name().to_string(),
            level: Some(b.level()),
        };
        BuildOptions {
            character: self.character.record().name.clone(),
            character_level: Some(self.character.level()),
            melee: self.melee.name().to_string(),
            melee_refine: Some(self.melee.refine()),
            melee_level: Some(self.melee.level()),
            ranged: self.ranged.name().to_string(),
            ranged_refine: Some(self.ranged.refine()),
            ranged_level: Some(self.ranged.level()),
            skill_level: self.skills.first().map(|s| s.level()),
            mods,
            aura_mod: self.aura.as_ref().map(|m| ModSpec {
                id: m.id(),
                rank: Some(m.level()),
            }),
            buffs: self.buffs.iter().map(buff_spec).collect(),
            dynamic_buffs: self.dynamic_buffs.iter().map(buff_spec).collect(),
            enemy: EnemySpec {
                monster: (!self.enemy.name.is_empty()).then(|| self.enemy.name.clone()),
                level: self.enemy.level,
                resistance: Some(self.enemy.resistance),
                hp_type: self.enemy.hp_type,
                staggered: self.enemy.staggered,
                vulnerable: self.enemy.vulnerable.clone(),
            },
            hp_percent: self.hp_percent,
            resonance_gain: self.resonance_gain,
            base_name: self.base_name.clone(),
            target_function: Some(self.target_function.clone()),
            timeline: self.timeline.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn data(&self) -> &Arc<GameData> {
        &self.data
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn character(&self) -> &LeveledChar {
        &self.character
    }

    pub fn skills(&self) -> &[LeveledSkill] {
        &self.skills
    }

    pub fn melee(&self) -> &LeveledWeapon {
        &self.melee
    }

    pub fn ranged(&self) -> &LeveledWeapon {
        &self.ranged
    }

    pub fn resonance(&self) -> Option<&LeveledWeapon> {
        self.resonance.as_ref()
    }

    pub fn weapon(&self, slot: WeaponSlot) -> Option<&LeveledWeapon> {
        match slot {
            WeaponSlot::Melee => Some(&self.melee),
            WeaponSlot::Ranged => Some(&self.ranged),
            WeaponSlot::Resonance => self.resonance.as_ref(),
        }
    }

    /// Melee, ranged, then the resonance weapon if any.
    pub fn weapons(&self) -> Vec<&LeveledWeapon> {
        let mut weapons = vec![&self.melee, &self.ranged];
        weapons.extend(self.resonance.as_ref());
        weapons
    }

    pub fn mods(&self, category: ModCategory) -> &[LeveledMod] {
        &self.mods[category.index()]
    }

    pub fn aura_mod(&self) -> Option<&LeveledMod> {
        self.aura.as_ref()
    }

    pub fn buffs(&self) -> &[LeveledBuff] {
        &self.buffs
    }

    pub fn dynamic_buffs(&self) -> &[LeveledBuff] {
        &self.dynamic_buffs
    }

    pub fn enemy(&self) -> &Enemy {
        &self.enemy
    }

    pub fn hp_percent(&self) -> f64 {
        self.hp_percent
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn target_function(&self) -> &str {
        &self.target_function
    }

    pub fn timeline(&self) -> Option<&Timeline> {
        self.timeline.as_ref()
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Equip a mod into its category.
    pub fn equip_mod(&mut self, id: u32, rank: Option<u32>) -> Result<(), BuildError> {
        let record = self.data.mod_by_id(id)?;
        let category = record.category;
        let slot = &self.mods[category.index()];
        if slot.len() >= category.cap() {
            return Err(BuildError::InvalidData(format!(
                "{} mods are full ({})",
                category,
                category.cap()
            )));
        }
        if !SelectionState::from_mods(slot).admits(&record) {
            return Err(BuildError::InvalidData(format!(
                "mod \"{}\" conflicts with an equipped mod",
                record.full_name()
            )));
        }
        if !self.fits(&record) {
            return Err(BuildError::InvalidData(format!(
                "mod \"{}\" does not fit {} with these weapons",
                record.full_name(),
                self.character.record().name
            )));
        }
        let effect = self.data.effect(&record.name);
        let leveled = LeveledMod::new(record, effect, rank)?;
        self.mods[category.index()].push(leveled);
        Ok(())
    }

    /// Whether the element and weapon restrictions of `record` hold.
    ///
    /// A weapon restriction is checked against the weapon of the mod's slot;
    /// character mods accept any equipped weapon.
    pub fn fits(&self, record: &ModRecord) -> bool {
        if let Some(element) = record.element.as_deref().filter(|e| !e.is_empty()) {
            if element != self.character.record().element {
                return false;
            }
        }
        let Some(restriction) = record.restriction.as_deref().filter(|r| !r.is_empty()) else {
            return true;
        };
        let slot_weapons = match record.category {
            ModCategory::Character => self.weapons(),
            ModCategory::Melee => vec![&self.melee],
            ModCategory::Ranged => vec![&self.ranged],
            ModCategory::Resonance => self.resonance.iter().collect(),
        };
        slot_weapons
            .iter()
            .any(|w| w.record().category == restriction)
    }

    /// Unequip every mod whose restrictions no longer hold; returns their
    /// full names.
    pub fn unequip_unfit(&mut self) -> Vec<String> {
        let mut dropped = Vec::new();
        for category in ModCategory::ALL {
            let equipped = std::mem::take(&mut self.mods[category.index()]);
            let (kept, unfit): (Vec<_>, Vec<_>) =
                equipped.into_iter().partition(|m| self.fits(m.record()));
            dropped.extend(unfit.iter().map(|m| m.record().full_name()));
            self.mods[category.index()] = kept;
        }
        if !dropped.is_empty() {
            debug!(mods = ?dropped, "unequipped mods that no longer fit");
        }
        dropped
    }

    /// Remove the first equipped mod with `id`; returns whether one was removed.
    pub fn unequip_mod(&mut self, id: u32) -> bool {
        for slot in self.mods.iter_mut() {
            if let Some(pos) = slot.iter().position(|m| m.id() == id) {
                slot.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn clear_mods(&mut self, category: ModCategory) {
        self.mods[category.index()].clear();
    }

    pub fn set_aura_mod(&mut self, spec: Option<ModSpec>) -> Result<(), BuildError> {
        self.aura = match spec {
            Some(spec) => {
                let record = self.data.mod_by_id(spec.id)?;
                let effect = self.data.effect(&record.name);
                Some(LeveledMod::new(record, effect, spec.rank)?)
            }
            None => None,
        };
        Ok(())
    }

    /// Add a buff; buffs with a transform script go to the dynamic list.
    pub fn add_buff(&mut self, name: &str, level: Option<u32>) -> Result<(), BuildError> {
        let buff = LeveledBuff::new(self.data.buff(name)?, level)?;
        if buff.is_dynamic() {
            self.dynamic_buffs.push(buff);
        } else {
            self.buffs.push(buff);
        }
        Ok(())
    }

    pub fn has_buff(&self, name: &str) -> bool {
        self.buffs
            .iter()
            .chain(&self.dynamic_buffs)
            .any(|b| b.name() == name)
    }

    pub fn remove_buff(&mut self, name: &str) -> bool {
        let before = self.buffs.len() + self.dynamic_buffs.len();
        self.buffs.retain(|b| b.name() != name);
        self.dynamic_buffs.retain(|b| b.name() != name);
        before != self.buffs.len() + self.dynamic_buffs.len()
    }

    /// Replace the melee or ranged weapon.
    ///
    /// Mods whose weapon restriction the new weapon breaks are unequipped;
    /// their full names are returned.
    pub fn set_weapon(
        &mut self,
        slot: WeaponSlot,
        name: &str,
        refine: Option<u32>,
        level: Option<u32>,
    ) -> Result<Vec<String>, BuildError> {
        let weapon = load_weapon(&self.data, name, refine, level)?;
        match slot {
            WeaponSlot::Melee => self.melee = weapon,
            WeaponSlot::Ranged => self.ranged = weapon,
            WeaponSlot::Resonance => {
                return Err(BuildError::InvalidData(
                    "the resonance weapon is bound by the character".into(),
                ))
            }
        }
        Ok(self.unequip_unfit())
    }

    pub fn set_character_level(&mut self, level: u32) {
        self.character.set_level(level);
    }

    pub fn set_enemy(&mut self, enemy: Enemy) {
        self.enemy = enemy;
    }

    pub fn set_hp_percent(&mut self, hp_percent: f64) {
        self.hp_percent = hp_percent.clamp(0.0, 1.0);
    }

    pub fn set_base_name(&mut self, base_name: &str) {
        self.base_name = base_name.to_string();
    }

    pub fn set_target_function(&mut self, formula: &str) {
        self.target_function = formula.to_string();
    }

    pub fn set_timeline(&mut self, timeline: Option<Timeline>) {
        self.timeline = timeline;
    }

    // ------------------------------------------------------------------
    // Scoring
    // ------------------------------------------------------------------

    fn scope_of(&self, category: ModCategory) -> Scope {
        match category {
            ModCategory::Character => Scope::Character,
            ModCategory::Melee => Scope::Weapon(self.melee.record().weapon_type),
            ModCategory::Ranged => Scope::Weapon(self.ranged.record().weapon_type),
            ModCategory::Resonance => Scope::Weapon(
                self.resonance
                    .as_ref()
                    .map(|w| w.record().weapon_type)
                    .unwrap_or(WeaponType::ResonanceMelee),
            ),
        }
    }

    pub(crate) fn aggregator(&self) -> Aggregator<'_> {
        let groups = ModCategory::ALL
            .iter()
            .map(|&category| ModGroup {
                mods: &self.mods[category.index()],
                scope: self.scope_of(category),
            })
            .collect();
        Aggregator::new(AggregateInput {
            character: self.character.snapshot(),
            character_bonuses: self.character.bonuses(),
            weapons: self.weapons(),
            groups,
            aura: self.aura.as_ref(),
            buffs: &self.buffs,
            dynamic_buffs: &self.dynamic_buffs,
            resonance_gain: self.resonance_gain,
            config: &self.config,
        })
    }

    /// Full aggregation, including which conditional mods are active.
    pub fn aggregate(&self) -> Aggregation {
        self.aggregator().resolve()
    }

    pub fn calculate_attributes(&self) -> AttrSet {
        self.aggregate().attrs
    }

    /// Attributes plus one weapon's stats; the selected action's weapon
    /// (or melee) when `weapon` is `None`.
    pub fn calculate_weapon_attributes(&self, weapon: Option<&LeveledWeapon>) -> WeaponAttributes {
        let weapon = weapon
            .or_else(|| self.action(&self.base_name).weapon())
            .unwrap_or(&self.melee);
        let aggregator = self.aggregator();
        let aggregation = aggregator.resolve();
        WeaponAttributes {
            weapon: aggregator.weapon_attrs(&aggregation, weapon),
            attrs: aggregation.attrs,
        }
    }

    /// The action a name selects: character skill, weapon, weapon skill,
    /// or a weapon type prefix. Unknown names yield `None`.
    pub(crate) fn lookup_action(&self, name: &str) -> Option<Action<'_>> {
        if let Some(skill) = self.skills.iter().find(|s| s.name() == name) {
            return Some(Action::Skill(skill));
        }
        let weapons = self.weapons();
        if let Some(weapon) = weapons.iter().copied().find(|w| w.name() == name) {
            return Some(Action::Weapon(weapon));
        }
        for &weapon in &weapons {
            if let Some(skill) = weapon.skills().iter().find(|s| s.name() == name) {
                return Some(Action::WeaponSkill(weapon, skill));
            }
        }
        if name == "同律" {
            return self.resonance.as_ref().map(Action::Weapon);
        }
        match WeaponType::from_name(name)? {
            WeaponType::Melee => Some(Action::Weapon(&self.melee)),
            WeaponType::Ranged => Some(Action::Weapon(&self.ranged)),
            WeaponType::ResonanceMelee | WeaponType::ResonanceRanged => {
                self.resonance.as_ref().map(Action::Weapon)
            }
        }
    }

    /// The selected action; the first character skill (or the melee weapon)
    /// when `name` is empty or unknown.
    pub(crate) fn action(&self, name: &str) -> Action<'_> {
        if !name.is_empty() {
            if let Some(action) = self.lookup_action(name) {
                return action;
            }
            debug!(name, "unknown action name; using the default action");
        }
        match self.skills.first() {
            Some(skill) => Action::Skill(skill),
            None => Action::Weapon(&self.melee),
        }
    }

    fn parse_cached(&self, formula: &str) -> Result<Arc<Expr>, FormulaError> {
        if let Ok(cache) = self.ast_cache.lock() {
            if let Some(hit) = cache.get(formula) {
                return hit.clone();
            }
        }
        let parsed = parse(formula, &self.config.macros).map(Arc::new);
        if let Ok(mut cache) = self.ast_cache.lock() {
            cache.insert(formula.to_string(), parsed.clone());
        }
        parsed
    }

    /// The target function, or the configured default when it does not
    /// parse or validate.
    fn target_expr(&self, ctx: &TargetContext<'_>) -> Arc<Expr> {
        let checked = self
            .parse_cached(&self.target_function)
            .and_then(|expr| validate(&expr, ctx).map(|_| expr));
        match checked {
            Ok(expr) => expr,
            Err(err) => {
                warn!(
                    formula = %self.target_function,
                    error = %err,
                    "invalid target function; using the default"
                );
                self.parse_cached(&self.config.default_target_function)
                    .unwrap_or_else(|_| Arc::new(Expr::Number(0.0)))
            }
        }
    }

    /// Score of the build: the timeline total when a timeline is set,
    /// otherwise the target function.
    pub fn calculate(&self) -> f64 {
        if let Some(timeline) = &self.timeline {
            return match simulate(self, timeline) {
                Ok(report) => report.total,
                Err(err) => {
                    warn!(error = %err, "timeline replay failed");
                    0.0
                }
            };
        }
        let aggregation = self.aggregate();
        let ctx = TargetContext::new(self, &aggregation);
        let expr = self.target_expr(&ctx);
        evaluate(&expr, &ctx)
    }

    /// Replay the timeline, if any.
    pub fn simulate_timeline(&self) -> Option<Result<TimelineReport, BuildError>> {
        self.timeline.as_ref().map(|t| simulate(self, t))
    }

    /// Check a formula against this build's vocabulary.
    pub fn validate_ast(&self, formula: &str) -> Result<(), FormulaError> {
        let expr = self.parse_cached(formula)?;
        let aggregation = self.aggregate();
        validate(&expr, &TargetContext::new(self, &aggregation))
    }

    /// Evaluate a formula with `attrs` standing in for the aggregated attributes.
    pub fn evaluate_ast(&self, formula: &str, attrs: &AttrSet) -> Result<f64, FormulaError> {
        let expr = self.parse_cached(formula)?;
        let aggregation = self.aggregate();
        let ctx = TargetContext::with_attrs(self, &aggregation, attrs.clone());
        Ok(evaluate(&expr, &ctx))
    }

    pub fn identifier_names(&self, formula: &str) -> Result<Vec<String>, FormulaError> {
        Ok(identifier_names(&*self.parse_cached(formula)?))
    }

    fn apply_candidate(&mut self, candidate: &Candidate) -> Result<(), BuildError> {
        match candidate {
            Candidate::Mod { id, rank } => self.equip_mod(*id, *rank),
            Candidate::Buff { name, level } => self.add_buff(name, *level),
        }
    }

    fn remove_candidate(&mut self, candidate: &Candidate) -> bool {
        match candidate {
            Candidate::Mod { id, .. } => self.unequip_mod(*id),
            Candidate::Buff { name, .. } => self.remove_buff(name),
        }
    }

    /// Relative score change from adding (or, with `subtract`, removing)
    /// a candidate.
    ///
    /// Adding: `with / base - 1`, or `with - base` when the base score is
    /// 0. Removing: `base / without - 1`, or `base - without` when the
    /// reduced score is 0. A candidate that cannot be applied yields 0.
    pub fn calc_income(&self, candidate: &Candidate, subtract: bool) -> f64 {
        let base = self.calculate();
        let mut other = self.clone();
        if subtract {
            if !other.remove_candidate(candidate) {
                return 0.0;
            }
            relative_gain(other.calculate(), base)
        } else {
            if let Err(err) = other.apply_candidate(candidate) {
                debug!(error = %err, "candidate cannot be applied");
                return 0.0;
            }
            relative_gain(base, other.calculate())
        }
    }
}

/// `to / from - 1`, or the plain difference when `from` is 0.
pub(crate) fn relative_gain(from: f64, to: f64) -> f64 {
    if from == 0.0 {
        to - from
    } else {
        to / from - 1.0
    }
}
