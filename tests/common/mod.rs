#![allow(dead_code)]

use buildscore::{Build, BuildOptions, GameData};
use std::sync::Arc;

pub const GAMEDATA: &str = include_str!("../fixtures/gamedata.json");

pub fn data() -> Arc<GameData> {
    Arc::new(GameData::from_json(GAMEDATA).unwrap())
}

/// 丽蓓卡 with 铸铁者 and 烈焰孤沙 against a training dummy, scoring `伤害`.
pub fn options() -> BuildOptions {
    BuildOptions {
        character: "丽蓓卡".into(),
        melee: "铸铁者".into(),
        ranged: "烈焰孤沙".into(),
        target_function: Some("伤害".into()),
        ..Default::default()
    }
}

pub fn build() -> Build {
    Build::new(data(), options()).unwrap()
}

/// 赛琪, whose first skill 圣咏 is the default action.
pub fn caster() -> Build {
    Build::new(
        data(),
        BuildOptions {
            character: "赛琪".into(),
            ..options()
        },
    )
    .unwrap()
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * b.abs().max(1.0)
}
