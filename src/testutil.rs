//! Shared fixtures for unit tests.

use crate::build::{Build, BuildOptions};
use crate::data::GameData;
use std::sync::Arc;

pub(crate) const GAMEDATA: &str = include_str!("../tests/fixtures/gamedata.json");

pub(crate) fn sample_data() -> Arc<GameData> {
    Arc::new(GameData::from_json(GAMEDATA).unwrap())
}

/// 丽蓓卡 with 铸铁者 and 烈焰孤沙 against a training dummy.
pub(crate) fn sample_options() -> BuildOptions {
    BuildOptions {
        character: "丽蓓卡".into(),
        melee: "铸铁者".into(),
        ranged: "烈焰孤沙".into(),
        target_function: Some("伤害".into()),
        ..Default::default()
    }
}

pub(crate) fn sample_build() -> Build {
    Build::new(sample_data(), sample_options()).unwrap()
}
