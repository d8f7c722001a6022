//! Enemy state and mitigation.

use crate::data::MonsterRecord;
use crate::numeric::level_scale;
use serde::{Deserialize, Serialize};

/// Which pool incoming damage is currently hitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HpType {
    #[default]
    #[serde(rename = "生命")]
    Health,
    #[serde(rename = "护盾")]
    Shield,
}

/// Defense mitigation: `1 - def / (300 + def - diff * 10)`.
///
/// `def` is first reduced by the ignore-defense fraction and the level
/// difference is clamped into `[0, 20]`. The result is clamped into `[0, 1]`.
///
/// # Examples
///
/// ```rust
/// use buildscore::enemy::defense_multiplier;
///
/// assert_eq!(defense_multiplier(0.0, 0.0, 0), 1.0);
/// assert_eq!(defense_multiplier(300.0, 0.0, 0), 0.5);
/// // fully ignored defense
/// assert_eq!(defense_multiplier(300.0, 1.0, 0), 1.0);
/// ```
pub fn defense_multiplier(defense: f64, ignore_defense: f64, level_diff: i64) -> f64 {
    let diff = level_diff.clamp(0, 20) as f64;
    let def = (defense * (1.0 - ignore_defense)).max(0.0);
    let denominator = 300.0 + def - diff * 10.0;
    if denominator <= 0.0 {
        return 0.0;
    }
    (1.0 - def / denominator).clamp(0.0, 1.0)
}

/// Damage dealt to each pool by one hit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolHit {
    pub shield: f64,
    pub health: f64,
}

impl PoolHit {
    pub fn total(&self) -> f64 {
        self.shield + self.health
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enemy {
    pub name: String,
    pub level: u32,
    pub defense: f64,
    pub resistance: f64,
    pub max_health: f64,
    pub max_shield: f64,
    pub health: f64,
    pub shield: f64,
    pub hp_type: HpType,
    /// Staggered enemies take the imbalance bonus.
    pub staggered: bool,
    /// Damage type whose trigger effect applies; any type when `None`.
    pub vulnerable: Option<String>,
}

impl Enemy {
    /// Scale a monster record (stored at level 80) to `level`.
    pub fn from_record(record: &MonsterRecord, level: u32) -> Self {
        let scale = level_scale(level);
        let health = (record.health * scale).round();
        let shield = (record.shield * scale).round();
        Self {
            name: record.name.clone(),
            level,
            defense: (record.defense * scale).round(),
            resistance: record.resistance,
            max_health: health,
            max_shield: shield,
            health,
            shield,
            hp_type: HpType::Health,
            staggered: false,
            vulnerable: record.vulnerable.clone(),
        }
    }

    /// A dummy with no defense or resistance and unbounded health.
    pub fn training_dummy(level: u32) -> Self {
        Self {
            name: String::new(),
            level,
            defense: 0.0,
            resistance: 0.0,
            max_health: f64::INFINITY,
            max_shield: 0.0,
            health: f64::INFINITY,
            shield: 0.0,
            hp_type: HpType::Health,
            staggered: false,
            vulnerable: None,
        }
    }

    /// Defense mitigation for the configured pool; shields bypass defense.
    pub fn defense_multiplier(&self, char_level: u32, ignore_defense: f64) -> f64 {
        match self.hp_type {
            HpType::Shield => 1.0,
            HpType::Health => self.health_mitigation(char_level, ignore_defense),
        }
    }

    pub fn health_mitigation(&self, char_level: u32, ignore_defense: f64) -> f64 {
        let diff = self.level as i64 - char_level as i64;
        defense_multiplier(self.defense, ignore_defense, diff)
    }

    /// `max(0, 1 - resistance + penetration)`.
    pub fn resistance_multiplier(&self, penetration: f64) -> f64 {
        (1.0 - self.resistance + penetration).max(0.0)
    }

    /// Whether trigger effects of `damage_type` apply.
    pub fn accepts_trigger(&self, damage_type: &str) -> bool {
        match &self.vulnerable {
            Some(v) => v == damage_type,
            None => true,
        }
    }

    /// Apply unmitigated damage: the shield absorbs first at full value,
    /// the remainder hits health scaled by `health_mitigation`.
    pub fn apply_damage(&mut self, raw: f64, health_mitigation: f64) -> PoolHit {
        let raw = raw.max(0.0);
        let to_shield = raw.min(self.shield);
        self.shield -= to_shield;
        let remainder = raw - to_shield;
        let to_health = (remainder * health_mitigation).min(self.health);
        self.health -= to_health;
        self.hp_type = if self.shield > 0.0 {
            HpType::Shield
        } else {
            HpType::Health
        };
        PoolHit {
            shield: to_shield,
            health: to_health,
        }
    }

    pub fn reset_pools(&mut self) {
        self.health = self.max_health;
        self.shield = self.max_shield;
    }

    pub fn is_dead(&self) -> bool {
        self.health <= 0.0 && self.shield <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monster() -> MonsterRecord {
        MonsterRecord {
            id: 1,
            name: "木桩".into(),
            defense: 300.0,
            health: 10_000.0,
            shield: 1_000.0,
            resistance: 0.2,
            vulnerable: Some("切割".into()),
        }
    }

    #[test]
    fn test_defense_in_open_interval() {
        let m = defense_multiplier(130.0, 0.0, 0);
        assert!(m > 0.0 && m < 1.0);
    }

    #[test]
    fn test_level_diff_clamped() {
        assert_eq!(
            defense_multiplier(300.0, 0.0, 50),
            defense_multiplier(300.0, 0.0, 20)
        );
        assert_eq!(
            defense_multiplier(300.0, 0.0, -5),
            defense_multiplier(300.0, 0.0, 0)
        );
        assert!(defense_multiplier(300.0, 0.0, 20) < defense_multiplier(300.0, 0.0, 0));
    }

    #[test]
    fn test_shield_bypasses_defense() {
        let mut enemy = Enemy::from_record(&monster(), 80);
        enemy.hp_type = HpType::Shield;
        assert_eq!(enemy.defense_multiplier(80, 0.0), 1.0);
    }

    #[test]
    fn test_shield_absorbs_first() {
        let mut enemy = Enemy::from_record(&monster(), 80);
        let hit = enemy.apply_damage(1_500.0, 0.5);
        assert_eq!(hit.shield, 1_000.0);
        assert_eq!(hit.health, 250.0);
        assert_eq!(enemy.shield, 0.0);
        assert_eq!(enemy.health, 9_750.0);
        assert_eq!(enemy.hp_type, HpType::Health);
    }

    #[test]
    fn test_health_hit_capped_by_pool() {
        let mut enemy = Enemy::from_record(&monster(), 80);
        enemy.shield = 0.0;
        enemy.health = 100.0;
        let hit = enemy.apply_damage(1_000.0, 1.0);
        assert_eq!(hit.health, 100.0);
        assert!(enemy.is_dead());
    }

    #[test]
    fn test_resistance_floor() {
        let enemy = Enemy::from_record(&monster(), 80);
        assert!((enemy.resistance_multiplier(0.1) - 0.9).abs() < 1e-12);
        let mut tough = enemy.clone();
        tough.resistance = 2.0;
        assert_eq!(tough.resistance_multiplier(0.0), 0.0);
    }

    #[test]
    fn test_trigger_gate() {
        let enemy = Enemy::from_record(&monster(), 80);
        assert!(enemy.accepts_trigger("切割"));
        assert!(!enemy.accepts_trigger("贯穿"));
    }
}
