//! Static game records and the read-only lookup store.
//!
//! Records are stored at their reference level (level 80, refine 5, max
//! rank); the `leveled` module scales them. Everything here is immutable
//! after loading and shared behind `Arc`.

use crate::attr::{Attr, Bonuses, WeaponType};
use crate::error::BuildError;
use crate::transform::TransformStep;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

fn default_one() -> f64 {
    1.0
}

/// A skill field value, either constant or tabulated per skill level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(f64),
    PerLevel(Vec<f64>),
}

impl FieldValue {
    /// Value at a 1-based level; tables shorter than the level use their last entry.
    pub fn at(&self, level: u32) -> f64 {
        match self {
            FieldValue::Scalar(v) => *v,
            FieldValue::PerLevel(values) => {
                let idx = (level.max(1) as usize - 1).min(values.len().saturating_sub(1));
                values.get(idx).copied().unwrap_or(0.0)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillFieldRecord {
    pub name: String,
    pub value: FieldValue,
    #[serde(default)]
    pub hit_count: Option<FieldValue>,
    /// Attributes that scale this field (`威力`, `耐久`, `效益`, `范围`).
    #[serde(default)]
    pub affected_by: Vec<Attr>,
    /// Stat a damage field multiplies; attack when absent.
    #[serde(default)]
    pub base: Option<Attr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillRecord {
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub fields: Vec<SkillFieldRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub id: u32,
    pub name: String,
    pub element: String,
    pub attack: f64,
    pub health: f64,
    pub shield: f64,
    pub defense: f64,
    pub sanity: f64,
    #[serde(default)]
    pub bonuses: Bonuses,
    #[serde(default)]
    pub skills: Vec<Arc<SkillRecord>>,
    /// Name of the weapon record bound as this character's resonance weapon.
    #[serde(default)]
    pub resonance_weapon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponRecord {
    pub id: u32,
    pub name: String,
    pub weapon_type: WeaponType,
    /// Sub-category (`长柄`, `手枪`...), used by mod restrictions.
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub damage_type: String,
    #[serde(default)]
    pub attack: f64,
    #[serde(default)]
    pub crit_rate: f64,
    #[serde(default)]
    pub crit_damage: f64,
    #[serde(default)]
    pub trigger_rate: f64,
    #[serde(default = "default_one")]
    pub multiplier: f64,
    /// Attacks per second for weapons with a fire rate.
    #[serde(default)]
    pub fire_rate: Option<f64>,
    #[serde(default)]
    pub magazine: Option<f64>,
    #[serde(default)]
    pub reload: Option<f64>,
    /// Passive bonuses at refine 5.
    #[serde(default)]
    pub bonuses: Bonuses,
    #[serde(default)]
    pub skills: Vec<Arc<SkillRecord>>,
    /// Variant name in the base-multiplier table (resonance weapons).
    #[serde(default)]
    pub base_multiplier: Option<String>,
}

/// Mod quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "金")]
    Gold,
    #[serde(rename = "紫")]
    Purple,
    #[serde(rename = "蓝")]
    Blue,
    #[serde(rename = "绿")]
    Green,
    #[serde(rename = "白")]
    White,
}

impl Quality {
    /// Highest rank a mod of this quality reaches.
    pub fn max_rank(self) -> u32 {
        match self {
            Quality::Gold => 10,
            Quality::Purple | Quality::Blue => 5,
            Quality::Green | Quality::White => 3,
        }
    }
}

/// Mod slot category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModCategory {
    #[serde(rename = "角色")]
    Character,
    #[serde(rename = "近战")]
    Melee,
    #[serde(rename = "远程")]
    Ranged,
    #[serde(rename = "同律")]
    Resonance,
}

impl ModCategory {
    pub const ALL: [ModCategory; 4] = [
        ModCategory::Character,
        ModCategory::Melee,
        ModCategory::Ranged,
        ModCategory::Resonance,
    ];

    /// Number of slots in this category.
    pub fn cap(self) -> usize {
        match self {
            ModCategory::Resonance => 4,
            _ => 8,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            ModCategory::Character => "角色",
            ModCategory::Melee => "近战",
            ModCategory::Ranged => "远程",
            ModCategory::Resonance => "同律",
        }
    }
}

impl std::fmt::Display for ModCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Comparison operator of a mod condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
}

impl CompareOp {
    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Eq => (lhs - rhs).abs() <= 1e-9,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
        }
    }
}

/// One `[subject, op, value]` condition term as stored in data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionRecord(pub String, pub CompareOp, pub f64);

/// Bonuses that apply only while every condition holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalRecord {
    pub conditions: Vec<ConditionRecord>,
    pub bonuses: Bonuses,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModRecord {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub series: String,
    pub quality: Quality,
    #[serde(default)]
    pub tolerance: i32,
    pub category: ModCategory,
    #[serde(default)]
    pub polarity: Option<String>,
    /// Element the mod is restricted to.
    #[serde(default)]
    pub element: Option<String>,
    /// Weapon category the mod is restricted to.
    #[serde(default)]
    pub restriction: Option<String>,
    /// At most one mod of an exclusive series may be equipped per category.
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub bonuses: Bonuses,
    #[serde(default)]
    pub conditional: Option<ConditionalRecord>,
}

impl ModRecord {
    /// `series之name`, unique across the mod table and used for name exclusion.
    pub fn full_name(&self) -> String {
        if self.series.is_empty() {
            self.name.clone()
        } else {
            format!("{}之{}", self.series, self.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuffRecord {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub bonuses: Bonuses,
    #[serde(default)]
    pub a: Option<f64>,
    #[serde(default)]
    pub b: Option<f64>,
    #[serde(default)]
    pub default_level: Option<u32>,
    #[serde(default)]
    pub min_level: Option<u32>,
    #[serde(default)]
    pub max_level: Option<u32>,
    /// Attribute-transform script; present on dynamic buffs only.
    #[serde(default)]
    pub script: Option<Vec<TransformStep>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonsterRecord {
    pub id: u32,
    pub name: String,
    pub defense: f64,
    pub health: f64,
    #[serde(default)]
    pub shield: f64,
    #[serde(default)]
    pub resistance: f64,
    /// Damage type whose trigger effect this monster is vulnerable to.
    #[serde(default)]
    pub vulnerable: Option<String>,
}

/// Rank-1 and rank-10 breakpoints of a resonance weapon multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseMultiplier {
    pub rank1: f64,
    pub rank10: f64,
}

impl BaseMultiplier {
    /// Linear interpolation between the breakpoints, extrapolated past rank 10.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use buildscore::data::BaseMultiplier;
    ///
    /// let m = BaseMultiplier { rank1: 1.0, rank10: 1.9 };
    /// assert!((m.at_rank(10) - 1.9).abs() < 1e-12);
    /// assert!((m.at_rank(12) - 2.1).abs() < 1e-12);
    /// ```
    pub fn at_rank(&self, rank: u32) -> f64 {
        let step = (self.rank10 - self.rank1) / 9.0;
        self.rank1 + step * (rank.max(1) as f64 - 1.0)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawGameData {
    #[serde(default)]
    characters: Vec<CharacterRecord>,
    #[serde(default)]
    weapons: Vec<WeaponRecord>,
    #[serde(default)]
    mods: Vec<ModRecord>,
    #[serde(default)]
    buffs: Vec<BuffRecord>,
    #[serde(default)]
    monsters: Vec<MonsterRecord>,
    #[serde(default)]
    effects: Vec<BuffRecord>,
    #[serde(default)]
    base_multipliers: BTreeMap<String, BTreeMap<String, BaseMultiplier>>,
}

/// Keyed, read-only store of every static record.
#[derive(Debug, Default)]
pub struct GameData {
    characters: HashMap<String, Arc<CharacterRecord>>,
    characters_by_id: HashMap<u32, Arc<CharacterRecord>>,
    weapons: HashMap<String, Arc<WeaponRecord>>,
    weapons_by_id: HashMap<u32, Arc<WeaponRecord>>,
    mods: HashMap<u32, Arc<ModRecord>>,
    buffs: HashMap<String, Arc<BuffRecord>>,
    monsters: HashMap<String, Arc<MonsterRecord>>,
    effects: HashMap<String, Arc<BuffRecord>>,
    base_multipliers: BTreeMap<String, BTreeMap<String, BaseMultiplier>>,
}

impl GameData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every table from one JSON document.
    pub fn from_json(json: &str) -> Result<Self, BuildError> {
        let raw: RawGameData =
            serde_json::from_str(json).map_err(|e| BuildError::InvalidData(e.to_string()))?;
        let mut data = GameData::new();
        raw.characters.into_iter().for_each(|r| data.insert_character(r));
        raw.weapons.into_iter().for_each(|r| data.insert_weapon(r));
        raw.mods.into_iter().for_each(|r| data.insert_mod(r));
        raw.buffs.into_iter().for_each(|r| data.insert_buff(r));
        raw.monsters.into_iter().for_each(|r| data.insert_monster(r));
        raw.effects.into_iter().for_each(|r| data.insert_effect(r));
        data.base_multipliers = raw.base_multipliers;
        Ok(data)
    }

    pub fn insert_character(&mut self, record: CharacterRecord) {
        let record = Arc::new(record);
        self.characters_by_id.insert(record.id, record.clone());
        self.characters.insert(record.name.clone(), record);
    }

    pub fn insert_weapon(&mut self, record: WeaponRecord) {
        let record = Arc::new(record);
        self.weapons_by_id.insert(record.id, record.clone());
        self.weapons.insert(record.name.clone(), record);
    }

    pub fn insert_mod(&mut self, record: ModRecord) {
        self.mods.insert(record.id, Arc::new(record));
    }

    pub fn insert_buff(&mut self, record: BuffRecord) {
        self.buffs.insert(record.name.clone(), Arc::new(record));
    }

    pub fn insert_monster(&mut self, record: MonsterRecord) {
        self.monsters.insert(record.name.clone(), Arc::new(record));
    }

    /// Effect records attach to a mod or weapon with the same name.
    pub fn insert_effect(&mut self, record: BuffRecord) {
        self.effects.insert(record.name.clone(), Arc::new(record));
    }

    pub fn character(&self, name: &str) -> Result<Arc<CharacterRecord>, BuildError> {
        self.characters
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("character", name))
    }

    pub fn character_by_id(&self, id: u32) -> Result<Arc<CharacterRecord>, BuildError> {
        self.characters_by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("character", &id.to_string()))
    }

    pub fn weapon(&self, name: &str) -> Result<Arc<WeaponRecord>, BuildError> {
        self.weapons
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("weapon", name))
    }

    pub fn weapon_by_id(&self, id: u32) -> Result<Arc<WeaponRecord>, BuildError> {
        self.weapons_by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("weapon", &id.to_string()))
    }

    pub fn mod_by_id(&self, id: u32) -> Result<Arc<ModRecord>, BuildError> {
        self.mods
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("mod", &id.to_string()))
    }

    pub fn buff(&self, name: &str) -> Result<Arc<BuffRecord>, BuildError> {
        self.buffs
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("buff", name))
    }

    pub fn monster(&self, name: &str) -> Result<Arc<MonsterRecord>, BuildError> {
        self.monsters
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("monster", name))
    }

    pub fn effect(&self, name: &str) -> Option<Arc<BuffRecord>> {
        self.effects.get(name).cloned()
    }

    pub fn base_multiplier(&self, category: &str, variant: &str) -> Option<BaseMultiplier> {
        self.base_multipliers
            .get(category)
            .and_then(|table| table.get(variant))
            .copied()
    }

    /// Every mod record, sorted by id.
    pub fn mods(&self) -> Vec<Arc<ModRecord>> {
        let mut mods: Vec<_> = self.mods.values().cloned().collect();
        mods.sort_by_key(|m| m.id);
        mods
    }

    /// Every weapon record of one type, sorted by id.
    pub fn weapons_of_type(&self, weapon_type: WeaponType) -> Vec<Arc<WeaponRecord>> {
        let mut weapons: Vec<_> = self
            .weapons
            .values()
            .filter(|w| w.weapon_type == weapon_type)
            .cloned()
            .collect();
        weapons.sort_by_key(|w| w.id);
        weapons
    }
}

fn not_found(kind: &'static str, key: &str) -> BuildError {
    BuildError::DataNotFound {
        kind,
        key: key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_per_level() {
        let v = FieldValue::PerLevel(vec![1.0, 2.0, 3.0]);
        assert_eq!(v.at(1), 1.0);
        assert_eq!(v.at(3), 3.0);
        assert_eq!(v.at(12), 3.0);
        assert_eq!(FieldValue::Scalar(0.5).at(7), 0.5);
    }

    #[test]
    fn test_quality_max_rank() {
        assert_eq!(Quality::Gold.max_rank(), 10);
        assert_eq!(Quality::Blue.max_rank(), 5);
        assert_eq!(Quality::White.max_rank(), 3);
    }

    #[test]
    fn test_mod_record_from_json() {
        let json = r#"{
            "id": 7, "name": "决断", "series": "换生灵", "quality": "金",
            "category": "角色", "exclusive": true,
            "bonuses": {"攻击": 0.3},
            "conditional": {"conditions": [["效益", ">=", 1.2]], "bonuses": {"增伤": 0.2}}
        }"#;
        let record: ModRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.full_name(), "换生灵之决断");
        assert_eq!(record.category, ModCategory::Character);
        assert_eq!(record.bonuses.get_char(Attr::Attack), 0.3);
        let cond = record.conditional.unwrap();
        assert_eq!(cond.conditions[0].1, CompareOp::Ge);
    }

    #[test]
    fn test_lookup_missing_is_error() {
        let data = GameData::new();
        assert!(matches!(
            data.weapon("nothing"),
            Err(BuildError::DataNotFound { kind: "weapon", .. })
        ));
        assert!(data.mod_by_id(1).is_err());
    }

    #[test]
    fn test_compare_op() {
        assert!(CompareOp::Ge.holds(1.0, 1.0));
        assert!(!CompareOp::Gt.holds(1.0, 1.0));
        assert!(CompareOp::Eq.holds(0.1 + 0.2, 0.3));
    }
}
