//! Attribute vocabulary.
//!
//! Character attributes (`Attr`) and weapon stats (`WeaponStat`) are closed
//! enumerations so that lookups by name are resolved once, when static data
//! is loaded, rather than on every calculation. Bonus tables keep a narrow
//! string-keyed `extra` map for the free-form fields the data defines
//! (sanity regeneration, tolerance, slide speed and so on).

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// How multiple contributions to the same attribute combine.
///
/// Every rule has identity `0.0`, so totals start from zero and fold
/// contributions one at a time.
///
/// # Examples
///
/// ```rust
/// use buildscore::attr::StackRule;
///
/// assert_eq!(StackRule::Additive.total([0.5, 0.5]), 1.0);
/// // (1 + 0.5) * (1 + 0.5) - 1
/// assert_eq!(StackRule::Compounding.total([0.5, 0.5]), 1.25);
/// // 1 - (1 - 0.5) * (1 - 0.5)
/// assert_eq!(StackRule::Diminishing.total([0.5, 0.5]), 0.75);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackRule {
    /// Contributions are summed.
    Additive,
    /// `∏(1 + x) - 1`.
    Compounding,
    /// `1 - ∏(1 - x)`.
    Diminishing,
}

impl StackRule {
    /// Fold one more contribution into an accumulated total.
    pub fn combine(self, acc: f64, value: f64) -> f64 {
        match self {
            StackRule::Additive => acc + value,
            StackRule::Compounding => acc + value + acc * value,
            StackRule::Diminishing => acc + value - acc * value,
        }
    }

    /// Total of a sequence of contributions.
    pub fn total<I: IntoIterator<Item = f64>>(self, values: I) -> f64 {
        values.into_iter().fold(0.0, |acc, v| self.combine(acc, v))
    }
}

macro_rules! named_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident => $cn:literal, $en:literal;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant,)*
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];

            /// Canonical (data-facing) name.
            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $cn,)*
                }
            }

            /// ASCII alias accepted in formulas and configuration.
            pub fn alias(self) -> &'static str {
                match self {
                    $($name::$variant => $en,)*
                }
            }

            /// Look up a variant by canonical name or ASCII alias.
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($cn | $en => Some($name::$variant),)*
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.name())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let name = String::deserialize(deserializer)?;
                $name::from_name(&name).ok_or_else(|| {
                    de::Error::custom(format!("unknown {} '{}'", stringify!($name), name))
                })
            }
        }
    };
}

named_enum! {
    /// Character-level attribute.
    pub enum Attr {
        Attack => "攻击", "attack";
        Health => "生命", "health";
        Shield => "护盾", "shield";
        Defense => "防御", "defense";
        Sanity => "神智", "sanity";
        Power => "威力", "power";
        Durability => "耐久", "durability";
        Efficiency => "效益", "efficiency";
        Range => "范围", "range";
        Boost => "昂扬", "boost";
        Desperate => "背水", "desperate";
        DamageIncrease => "增伤", "damage_increase";
        WeaponDamage => "武器伤害", "weapon_damage";
        SkillDamage => "技能伤害", "skill_damage";
        IndependentDamageIncrease => "独立增伤", "independent_damage_increase";
        Penetration => "属性穿透", "penetration";
        IgnoreDefense => "无视防御", "ignore_defense";
        DamageReduction => "减伤", "damage_reduction";
        ElementDamage => "属性伤", "element_damage";
        ModAttribute => "MOD属性", "mod_attribute";
        SkillSpeed => "技能速度", "skill_speed";
        ImbalanceBonus => "失衡易伤", "imbalance_bonus";
        FlatAttack => "固定攻击", "flat_attack";
        SkillMultiplierAdd => "技能倍率加数", "skill_multiplier_add";
        SanityRegen => "神智回复", "sanity_regen";
    }
}

impl Attr {
    /// Number of character attributes.
    pub const COUNT: usize = 25;

    /// Stacking rule used when several sources grant this attribute.
    pub fn stack_rule(self) -> StackRule {
        match self {
            Attr::IndependentDamageIncrease | Attr::IgnoreDefense => StackRule::Compounding,
            Attr::DamageReduction => StackRule::Diminishing,
            _ => StackRule::Additive,
        }
    }

    /// Attributes that start from 1 (100%) instead of 0.
    pub fn base_value(self) -> f64 {
        match self {
            Attr::Power | Attr::Durability | Attr::Efficiency | Attr::Range => 1.0,
            _ => 0.0,
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

named_enum! {
    /// Per-weapon stat.
    pub enum WeaponStat {
        Attack => "攻击", "attack";
        CritRate => "暴击", "crit_rate";
        CritDamage => "暴伤", "crit_damage";
        TriggerRate => "触发", "trigger_rate";
        AttackSpeed => "攻速", "attack_speed";
        MultiShot => "多重", "multi_shot";
        Physical => "物理", "physical";
        TriggerMultiplier => "触发倍率", "trigger_multiplier";
        Reload => "装填", "reload";
        Magazine => "弹匣", "magazine";
        BonusDamage => "追加伤害", "bonus_damage";
        DamageIncrease => "增伤", "damage_increase";
        IndependentDamageIncrease => "独立增伤", "independent_damage_increase";
        Multiplier => "倍率", "multiplier";
    }
}

named_enum! {
    /// Weapon slot type. Resonance types are bound to the character's kit
    /// and also inherit bonuses scoped to their base type.
    pub enum WeaponType {
        ResonanceMelee => "同律近战", "resonance_melee";
        ResonanceRanged => "同律远程", "resonance_ranged";
        Melee => "近战", "melee";
        Ranged => "远程", "ranged";
    }
}

impl WeaponType {
    /// The plain melee/ranged type a resonance type inherits from.
    pub fn base(self) -> Option<WeaponType> {
        match self {
            WeaponType::ResonanceMelee => Some(WeaponType::Melee),
            WeaponType::ResonanceRanged => Some(WeaponType::Ranged),
            _ => None,
        }
    }

    /// Whether bonuses scoped to `scope` apply to a weapon of this type.
    pub fn accepts(self, scope: WeaponType) -> bool {
        self == scope || self.base() == Some(scope)
    }

    pub fn is_resonance(self) -> bool {
        self.base().is_some()
    }
}

/// A typed bonus key: either a character attribute or a weapon stat,
/// optionally scoped to one weapon type by a name prefix (`近战暴击`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatKey {
    Char(Attr),
    Weapon {
        scope: Option<WeaponType>,
        stat: WeaponStat,
    },
}

impl StatKey {
    /// Parse a data-facing key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use buildscore::attr::{Attr, StatKey, WeaponStat, WeaponType};
    ///
    /// assert_eq!(StatKey::parse("攻击"), Some(StatKey::Char(Attr::Attack)));
    /// assert_eq!(
    ///     StatKey::parse("近战攻击"),
    ///     Some(StatKey::Weapon { scope: Some(WeaponType::Melee), stat: WeaponStat::Attack })
    /// );
    /// assert_eq!(StatKey::parse("滑行速度"), None);
    /// ```
    pub fn parse(key: &str) -> Option<StatKey> {
        if let Some(attr) = Attr::from_name(key) {
            return Some(StatKey::Char(attr));
        }
        if let Some(stat) = WeaponStat::from_name(key) {
            return Some(StatKey::Weapon { scope: None, stat });
        }
        // Longest prefixes first: 同律近战 before 近战.
        for &ty in WeaponType::ALL {
            if let Some(rest) = key.strip_prefix(ty.name()) {
                if let Some(stat) = WeaponStat::from_name(rest) {
                    return Some(StatKey::Weapon {
                        scope: Some(ty),
                        stat,
                    });
                }
            }
        }
        None
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatKey::Char(attr) => f.write_str(attr.name()),
            StatKey::Weapon { scope: None, stat } => f.write_str(stat.name()),
            StatKey::Weapon {
                scope: Some(ty),
                stat,
            } => write!(f, "{}{}", ty.name(), stat.name()),
        }
    }
}

/// A bonus table: typed entries plus free-form extras.
///
/// Deserializes from a plain `{ "key": value }` JSON object; keys that are
/// not part of the attribute vocabulary land in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct Bonuses {
    entries: BTreeMap<StatKey, f64>,
    extra: BTreeMap<String, f64>,
}

impl From<BTreeMap<String, f64>> for Bonuses {
    fn from(map: BTreeMap<String, f64>) -> Self {
        let mut bonuses = Bonuses::default();
        for (key, value) in map {
            bonuses.add_raw(&key, value);
        }
        bonuses
    }
}

impl From<Bonuses> for BTreeMap<String, f64> {
    fn from(bonuses: Bonuses) -> Self {
        let mut map: BTreeMap<String, f64> = bonuses.extra;
        for (key, value) in bonuses.entries {
            map.insert(key.to_string(), value);
        }
        map
    }
}

impl Bonuses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value under a data-facing key, routing unknown keys to `extra`.
    pub fn add_raw(&mut self, key: &str, value: f64) {
        match StatKey::parse(key) {
            Some(k) => self.add(k, value),
            None => *self.extra.entry(key.to_string()).or_insert(0.0) += value,
        }
    }

    pub fn add(&mut self, key: StatKey, value: f64) {
        *self.entries.entry(key).or_insert(0.0) += value;
    }

    /// Builder-style insert, mostly for fixtures.
    pub fn with(mut self, key: &str, value: f64) -> Self {
        self.add_raw(key, value);
        self
    }

    pub fn get(&self, key: StatKey) -> f64 {
        self.entries.get(&key).copied().unwrap_or(0.0)
    }

    pub fn get_char(&self, attr: Attr) -> f64 {
        self.get(StatKey::Char(attr))
    }

    pub fn extra(&self, key: &str) -> f64 {
        self.extra.get(key).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StatKey, f64)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, *v))
    }

    pub fn extras(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.extra.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.extra.is_empty()
    }

    /// Character attributes written by this table.
    pub fn char_attrs(&self) -> impl Iterator<Item = Attr> + '_ {
        self.entries.keys().filter_map(|k| match k {
            StatKey::Char(a) => Some(*a),
            _ => None,
        })
    }

    /// Copy with every value multiplied by `factor`.
    ///
    /// Extras listed in `integral` are rounded after scaling.
    pub fn scaled(&self, factor: f64, integral: &[&str]) -> Bonuses {
        Bonuses {
            entries: self.entries.iter().map(|(k, v)| (*k, v * factor)).collect(),
            extra: self
                .extra
                .iter()
                .map(|(k, v)| {
                    let scaled = v * factor;
                    let value = if integral.contains(&k.as_str()) {
                        scaled.round()
                    } else {
                        scaled
                    };
                    (k.clone(), value)
                })
                .collect(),
        }
    }

    /// Rewrite one entry in place, if present.
    pub fn map_entry<F: Fn(f64) -> f64>(&mut self, key: StatKey, f: F) {
        if let Some(v) = self.entries.get_mut(&key) {
            *v = f(*v);
        }
    }

    /// Sum another table into this one.
    pub fn merge(&mut self, other: &Bonuses) {
        for (k, v) in other.iter() {
            self.add(k, v);
        }
        for (k, v) in other.extras() {
            *self.extra.entry(k.to_string()).or_insert(0.0) += v;
        }
    }
}

/// Aggregated character attributes.
///
/// A fixed array indexed by `Attr` plus the free-form extras.
///
/// # Examples
///
/// ```rust
/// use buildscore::attr::{Attr, AttrSet};
///
/// let mut attrs = AttrSet::with_base_values();
/// assert_eq!(attrs.get(Attr::Power), 1.0);
/// attrs.add(Attr::Attack, 100.0);
/// assert_eq!(attrs[Attr::Attack], 100.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrSet {
    values: [f64; Attr::COUNT],
    #[serde(default)]
    pub extra: BTreeMap<String, f64>,
}

impl Default for AttrSet {
    fn default() -> Self {
        Self {
            values: [0.0; Attr::COUNT],
            extra: BTreeMap::new(),
        }
    }
}

impl AttrSet {
    /// An attribute set with every attribute at its base value.
    pub fn with_base_values() -> Self {
        let mut set = Self::default();
        for &attr in Attr::ALL {
            set.values[attr.index()] = attr.base_value();
        }
        set
    }

    pub fn get(&self, attr: Attr) -> f64 {
        self.values[attr.index()]
    }

    pub fn set(&mut self, attr: Attr, value: f64) {
        self.values[attr.index()] = value;
    }

    pub fn add(&mut self, attr: Attr, value: f64) {
        self.values[attr.index()] += value;
    }

    pub fn extra(&self, key: &str) -> f64 {
        self.extra.get(key).copied().unwrap_or(0.0)
    }

    /// Look up by canonical name, alias or extra key.
    pub fn get_by_name(&self, name: &str) -> Option<f64> {
        Attr::from_name(name)
            .map(|a| self.get(a))
            .or_else(|| self.extra.get(name).copied())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Attr, f64)> + '_ {
        Attr::ALL.iter().map(move |a| (*a, self.get(*a)))
    }
}

impl std::ops::Index<Attr> for AttrSet {
    type Output = f64;

    fn index(&self, attr: Attr) -> &f64 {
        &self.values[attr.index()]
    }
}

/// Per-weapon derived stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeaponAttr {
    pub attack: f64,
    pub crit_rate: f64,
    pub crit_damage: f64,
    pub trigger_rate: f64,
    pub attack_speed: f64,
    pub multi_shot: f64,
    pub reload: f64,
    pub magazine: f64,
    pub independent_damage_increase: f64,
    pub bonus_damage: f64,
    pub damage_increase: f64,
    pub trigger_multiplier: f64,
    /// Attack multiplier of the weapon's base hit.
    pub multiplier: f64,
}

impl WeaponAttr {
    pub fn get(&self, stat: WeaponStat) -> f64 {
        match stat {
            WeaponStat::Attack => self.attack,
            WeaponStat::CritRate => self.crit_rate,
            WeaponStat::CritDamage => self.crit_damage,
            WeaponStat::TriggerRate => self.trigger_rate,
            WeaponStat::AttackSpeed => self.attack_speed,
            WeaponStat::MultiShot => self.multi_shot,
            WeaponStat::Physical => 0.0,
            WeaponStat::TriggerMultiplier => self.trigger_multiplier,
            WeaponStat::Reload => self.reload,
            WeaponStat::Magazine => self.magazine,
            WeaponStat::BonusDamage => self.bonus_damage,
            WeaponStat::DamageIncrease => self.damage_increase,
            WeaponStat::IndependentDamageIncrease => self.independent_damage_increase,
            WeaponStat::Multiplier => self.multiplier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_count_matches_variants() {
        assert_eq!(Attr::ALL.len(), Attr::COUNT);
    }

    #[test]
    fn test_attr_names_round_trip() {
        for &attr in Attr::ALL {
            assert_eq!(Attr::from_name(attr.name()), Some(attr));
            assert_eq!(Attr::from_name(attr.alias()), Some(attr));
        }
    }

    #[test]
    fn test_stat_key_scoped() {
        assert_eq!(
            StatKey::parse("同律近战暴击"),
            Some(StatKey::Weapon {
                scope: Some(WeaponType::ResonanceMelee),
                stat: WeaponStat::CritRate
            })
        );
        assert_eq!(
            StatKey::parse("暴击"),
            Some(StatKey::Weapon {
                scope: None,
                stat: WeaponStat::CritRate
            })
        );
    }

    #[test]
    fn test_resonance_accepts_base_scope() {
        assert!(WeaponType::ResonanceMelee.accepts(WeaponType::Melee));
        assert!(!WeaponType::ResonanceMelee.accepts(WeaponType::Ranged));
        assert!(!WeaponType::Melee.accepts(WeaponType::ResonanceMelee));
    }

    #[test]
    fn test_bonuses_from_json_routes_extras() {
        let bonuses: Bonuses =
            serde_json::from_str(r#"{"攻击": 0.5, "近战暴击": 1.0, "滑行速度": 0.2}"#).unwrap();
        assert_eq!(bonuses.get_char(Attr::Attack), 0.5);
        assert_eq!(
            bonuses.get(StatKey::Weapon {
                scope: Some(WeaponType::Melee),
                stat: WeaponStat::CritRate
            }),
            1.0
        );
        assert_eq!(bonuses.extra("滑行速度"), 0.2);
    }

    #[test]
    fn test_bonuses_scaled_rounds_integral_extras() {
        let bonuses = Bonuses::new().with("耐受", 5.0).with("攻击", 1.0);
        let half = bonuses.scaled(0.5, &["耐受"]);
        assert_eq!(half.extra("耐受"), 3.0);
        assert_eq!(half.get_char(Attr::Attack), 0.5);
    }

    #[test]
    fn test_stack_rules() {
        assert_eq!(StackRule::Additive.total([]), 0.0);
        assert!((StackRule::Compounding.total([0.2, 0.3]) - 0.56).abs() < 1e-12);
        assert!((StackRule::Diminishing.total([0.2, 0.3]) - 0.44).abs() < 1e-12);
    }
}
