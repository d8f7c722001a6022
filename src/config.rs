//! Engine configuration.

use crate::error::BuildError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tunables shared by every `Build` created from the same configuration.
///
/// Every field has a default, so a partial JSON object is enough:
///
/// ```rust
/// use buildscore::EngineConfig;
///
/// let config = EngineConfig::from_json(r#"{"max_condition_passes": 5}"#).unwrap();
/// assert_eq!(config.max_condition_passes, 5);
/// assert_eq!(config.default_target_function, "伤害");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cap on aggregation passes while resolving conditional mods.
    pub max_condition_passes: usize,
    /// Formula used when the build's own formula does not parse.
    pub default_target_function: String,
    /// Identifier macros expanded by the tokenizer.
    pub macros: BTreeMap<String, String>,
    /// Mod series scaled by the `MOD属性` bonus.
    pub elemental_series: Vec<String>,
    pub efficiency_cap: f64,
    pub range_cap: f64,
    pub trigger_cap: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_condition_passes: 3,
            default_target_function: "伤害".to_string(),
            macros: default_macros(),
            elemental_series: ["狮鹫", "百首", "蝮蛇", "不死鸟"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            efficiency_cap: 1.75,
            range_cap: 2.8,
            trigger_cap: 1.0,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, BuildError> {
        serde_json::from_str(json).map_err(|e| BuildError::InvalidData(e.to_string()))
    }
}

/// Built-in target-function shorthands.
pub fn default_macros() -> BTreeMap<String, String> {
    let table = [
        ("DPA", "伤害"),
        ("总伤", "伤害 * max(1, 段数)"),
        ("每秒伤害", "伤害 * or(攻速, 1) * or(多重, 1)"),
        ("DPS", "每秒伤害"),
        ("每神智伤害", "伤害 / max(1, 神智消耗)"),
        ("DPAPM", "每神智伤害"),
        ("每持续神智伤害", "伤害 / max(1, 每秒神智消耗)"),
        ("DPAPSM", "每持续神智伤害"),
        ("每神智每秒伤害", "每秒伤害 / max(1, 神智消耗)"),
        ("DPSPM", "每神智每秒伤害"),
        ("每持续神智每秒伤害", "每秒伤害 / max(1, 每秒神智消耗)"),
        ("DPSPSM", "每持续神智每秒伤害"),
    ];
    table
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_condition_passes, 3);
        assert_eq!(config.efficiency_cap, 1.75);
        assert!(config.macros.contains_key("DPS"));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            EngineConfig::from_json("not json"),
            Err(BuildError::InvalidData(_))
        ));
    }
}
