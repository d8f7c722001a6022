//! # buildscore - Loadout Scoring Engine
//!
//! Scores character loadouts (character, melee and ranged weapon, up to 28
//! mods, buffs) against an enemy and searches for better ones:
//! - **Formula-driven** scoring through a small target-function language
//! - **Typed** attribute vocabulary, resolved once when data loads
//! - **Bounded** fixed point for mods whose bonuses depend on attributes
//! - **Seedable** greedy optimizer over mods and weapons
//!
//! ## Core Concepts
//!
//! ### Scoring Pipeline
//!
//! ```text
//! [GameData] -> [Leveled entities] -> [Aggregator] -> [DamageContext]
//!                                                        |
//!                       [target function] -> [TargetContext] -> score
//! ```
//!
//! 1. **Static data** is loaded once and shared behind `Arc`
//! 2. **Leveled entities** scale records by level, refinement or rank
//! 3. **Aggregation** folds every bonus with its stacking rule
//! 4. **Damage** is a 3x3 grid of crit by trigger outcomes
//! 5. **Target functions** combine damage and attributes into one score
//!
//! ## Example
//!
//! ```rust
//! use buildscore::*;
//! use std::sync::Arc;
//!
//! let data = GameData::from_json(r#"{
//!     "characters": [{ "id": 1, "name": "测试", "element": "光",
//!                      "attack": 200, "health": 1000, "shield": 100,
//!                      "defense": 50, "sanity": 200 }],
//!     "weapons": [
//!         { "id": 2, "name": "刀", "weapon_type": "近战", "attack": 100 },
//!         { "id": 3, "name": "枪", "weapon_type": "远程", "attack": 80 }
//!     ],
//!     "mods": [{ "id": 4, "name": "炽灼", "quality": "金",
//!                "category": "角色", "bonuses": { "攻击": 0.5 } }]
//! }"#).unwrap();
//!
//! let mut build = Build::new(Arc::new(data), BuildOptions {
//!     character: "测试".into(),
//!     melee: "刀".into(),
//!     ranged: "枪".into(),
//!     target_function: Some("攻击".into()),
//!     ..Default::default()
//! }).unwrap();
//!
//! assert_eq!(build.calculate(), 200.0);
//! build.equip_mod(4, None).unwrap();
//! assert_eq!(build.calculate(), 300.0);
//! ```
//!
//! ## Modules
//!
//! - [`attr`] - Attribute vocabulary and bonus tables
//! - [`data`] - Static records and the lookup store
//! - [`leveled`] - Level-scaled entities
//! - [`aggregate`] - Attribute aggregation and conditional mods
//! - [`damage`] - Damage formulas
//! - [`enemy`] - Enemy mitigation and health pools
//! - [`token`], [`parser`], [`ast`], [`eval`] - Target-function language
//! - [`target`] - Identifier resolution for target functions
//! - [`transform`] - Attribute-transform scripts of dynamic buffs
//! - [`build`] - The scored loadout
//! - [`timeline`] - Scripted timeline replay
//! - [`optimizer`] - Greedy build search
//! - [`code`] - Compact loadout codes
//! - [`error`] - Error types

pub mod aggregate;
pub mod ast;
pub mod attr;
pub mod build;
pub mod code;
pub mod config;
pub mod damage;
pub mod data;
pub mod enemy;
pub mod error;
pub mod eval;
pub mod graph;
pub mod leveled;
pub mod numeric;
pub mod optimizer;
pub mod parser;
pub mod target;
pub mod timeline;
pub mod token;
pub mod transform;

#[cfg(test)]
mod testutil;

// Re-export main types for convenience
pub use build::{Build, BuildOptions};
pub use config::EngineConfig;
pub use data::GameData;
pub use error::{BuildError, FormulaError};
pub use optimizer::AutoBuildOptions;
