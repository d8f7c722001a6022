mod common;

use buildscore::attr::Attr;
use buildscore::build::{Candidate, EnemySpec, ModSpec, WeaponSlot};
use buildscore::code::LoadoutCode;
use buildscore::data::ModCategory;
use buildscore::enemy::HpType;
use buildscore::timeline::{Timeline, TimelineItem};
use buildscore::{Build, BuildError, BuildOptions, EngineConfig};
use common::{approx, build, caster, data, options};

// ============================================================================
// Weapon Scoping
// ============================================================================

/// A melee mod's attack bonus belongs to the melee weapon only.
#[test]
fn test_melee_mod_scaled_to_melee_only() {
    let mut build = build();
    let before = build.calculate();
    build.equip_mod(2001, None).unwrap();

    let melee = build.calculate_weapon_attributes(Some(build.melee()));
    let ranged = build.calculate_weapon_attributes(Some(build.ranged()));
    assert_eq!(melee.weapon.attack, 1000.0);
    assert_eq!(ranged.weapon.attack, 300.0);
    assert_eq!(melee.attrs.get(Attr::Attack), 150.0);

    // (1000 + 150) * 1.2 against (400 + 150) * 1.2
    assert!(approx(build.calculate(), 1380.0));
    assert!(approx(build.calculate() / before, 1150.0 / 550.0));
}

#[test]
fn test_weapon_stat_bonus_scoped() {
    let mut build = build();
    build.equip_mod(2002, None).unwrap();
    let melee = build.calculate_weapon_attributes(Some(build.melee()));
    let ranged = build.calculate_weapon_attributes(Some(build.ranged()));
    assert_eq!(melee.weapon.crit_rate, 0.4);
    assert_eq!(ranged.weapon.crit_rate, 0.1);
}

#[test]
fn test_resonance_weapon() {
    let mut build = Build::new(
        data(),
        BuildOptions {
            character: "妮弗尔".into(),
            ..options()
        },
    )
    .unwrap();
    assert_eq!(build.weapons().len(), 3);
    let resonance = build.resonance().unwrap();
    assert!(approx(resonance.snapshot().multiplier, 1.9));

    build.equip_mod(4001, None).unwrap();
    let resonance = build.resonance().unwrap();
    let attrs = build.calculate_weapon_attributes(Some(resonance));
    assert_eq!(attrs.weapon.attack, 390.0);
    let melee = build.calculate_weapon_attributes(Some(build.melee()));
    assert_eq!(melee.weapon.attack, 400.0);

    // 1.9 * (390 + 180) * (1 + 0.1 * 0.5)
    let damage = build
        .evaluate_ast("同律::伤害", &build.calculate_attributes())
        .unwrap();
    assert!(approx(damage, 1.9 * 570.0 * 1.05));
}

// ============================================================================
// Aggregation
// ============================================================================

#[test]
fn test_elemental_series_scaled_by_mod_attribute() {
    let mut build = build();
    build.equip_mod(1001, None).unwrap();
    assert_eq!(build.calculate_attributes().get(Attr::Attack), 225.0);

    build.add_buff("元素共鸣", None).unwrap();
    // 0.5 * (1 + 0.5)
    assert_eq!(build.calculate_attributes().get(Attr::Attack), 262.5);
}

#[test]
fn test_efficiency_capped() {
    let mut build = build();
    build.equip_mod(1003, None).unwrap();
    build.equip_mod(1002, None).unwrap();
    let attrs = build.calculate_attributes();
    assert!(approx(attrs.get(Attr::Efficiency), 1.3));
    assert!(approx(attrs.get(Attr::Power), 1.3));

    let mut options = options();
    options.mods.character = vec![ModSpec::new(1003)];
    let config = EngineConfig {
        efficiency_cap: 1.1,
        ..Default::default()
    };
    let capped = Build::with_config(data(), std::sync::Arc::new(config), options).unwrap();
    assert_eq!(capped.calculate_attributes().get(Attr::Efficiency), 1.1);
}

// ============================================================================
// Conditional Mods
// ============================================================================

/// 连锁 reads 增伤, which 决断 grants once 效益 reaches 1.2.
#[test]
fn test_conditional_chain_settles() {
    let mut build = build();
    for id in [1003, 1004, 1010] {
        build.equip_mod(id, None).unwrap();
    }
    let aggregation = build.aggregate();
    assert!(aggregation.converged);
    assert!(aggregation.passes >= 1 && aggregation.passes <= 3);
    assert!(aggregation.active.contains(&"换生灵之决断".to_string()));
    assert!(aggregation.active.contains(&"连锁".to_string()));
    assert!(approx(aggregation.attrs.get(Attr::DamageIncrease), 0.2));
    // 150 * (1 + 0.1 + 0.3)
    assert!(approx(aggregation.attrs.get(Attr::Attack), 210.0));
}

#[test]
fn test_conditional_chain_inactive() {
    let mut build = build();
    for id in [1004, 1010] {
        build.equip_mod(id, None).unwrap();
    }
    let aggregation = build.aggregate();
    assert!(aggregation.active.is_empty());
    assert!(approx(aggregation.attrs.get(Attr::Attack), 165.0));
}

#[test]
fn test_conditional_independent_of_equip_order() {
    let mut forward = build();
    let mut backward = build();
    for id in [1003, 1004, 1010] {
        forward.equip_mod(id, None).unwrap();
    }
    for id in [1010, 1004, 1003] {
        backward.equip_mod(id, None).unwrap();
    }
    assert_eq!(forward.calculate_attributes(), backward.calculate_attributes());
    assert_eq!(forward.aggregate().active, backward.aggregate().active);
}

#[test]
fn test_polarity_condition() {
    let mut build = build();
    build.equip_mod(1009, None).unwrap();
    assert!(build.aggregate().active.is_empty());

    build.equip_mod(1001, None).unwrap();
    let aggregation = build.aggregate();
    assert_eq!(aggregation.active, vec!["共振".to_string()]);
    assert!(approx(aggregation.attrs.get(Attr::DamageIncrease), 0.15));
}

// ============================================================================
// Damage And Mitigation
// ============================================================================

#[test]
fn test_regression_melee_hit() {
    assert!(approx(build().calculate(), 660.0));
}

#[test]
fn test_shield_ignores_defense() {
    let on = |hp_type| {
        Build::new(
            data(),
            BuildOptions {
                enemy: EnemySpec {
                    monster: Some("海德拉".into()),
                    hp_type,
                    ..Default::default()
                },
                ..options()
            },
        )
        .unwrap()
        .calculate()
    };
    let shield = on(HpType::Shield);
    let health = on(HpType::Health);
    // resistance 0.1
    assert!(approx(shield, 660.0 * 0.9));
    // defense 300 at equal level halves damage
    assert!(approx(health / shield, 0.5));
}

#[test]
fn test_hp_percent_clamped() {
    let mut build = build();
    build.set_hp_percent(3.0);
    assert_eq!(build.hp_percent(), 1.0);
    build.set_hp_percent(-1.0);
    assert_eq!(build.hp_percent(), 0.0);
}

// ============================================================================
// Cost Ratios
// ============================================================================

#[test]
fn test_damage_per_sanity() {
    let mut build = caster();
    let eval = |b: &Build, f: &str| b.evaluate_ast(f, &b.calculate_attributes()).unwrap();

    assert!(approx(eval(&build, "每神智伤害"), 300.0 / 20.0));
    build.equip_mod(1003, None).unwrap();
    let cost = eval(&build, "神智消耗");
    assert!(cost < 20.0 && cost >= 14.0);
    assert_eq!(cost, cost.ceil());
    assert!(approx(eval(&build, "DPAPM"), eval(&build, "伤害") / cost));
}

#[test]
fn test_total_damage_uses_hit_count() {
    let build = caster();
    let eval = |f: &str| build.evaluate_ast(f, &build.calculate_attributes()).unwrap();
    assert!(approx(eval("总伤"), eval("伤害") * eval("段数")));
    assert!(approx(eval("每秒伤害"), eval("伤害")));
}

#[test]
fn test_calc_income_mod() {
    let build = build();
    let income = build.calc_income(
        &Candidate::Mod {
            id: 2001,
            rank: None,
        },
        false,
    );
    assert!(approx(income, 1150.0 / 550.0 - 1.0));
}

// ============================================================================
// Timeline
// ============================================================================

#[test]
fn test_timeline_full_magazine_cycle() {
    let mut build = build();
    build.set_timeline(Some(Timeline::new(vec![TimelineItem::Action {
        name: "烈焰孤沙".into(),
        start: 0.0,
        duration: 7.0,
        layer: 0,
    }])));
    let report = build.simulate_timeline().unwrap().unwrap();
    assert_eq!(report.actions.len(), 1);
    assert_eq!(report.actions[0].attacks, 10.0);
    // (300 + 150) * 1.1 per round
    assert!(approx(report.actions[0].raw, 4950.0));
    assert!(approx(report.total, 4950.0));
    assert!(approx(build.calculate(), report.total));
}

#[test]
fn test_timeline_buff_window() {
    let timeline: Timeline = serde_json::from_str(
        r#"[
            {"kind": "buff", "name": "战意", "start": 0, "duration": 10},
            {"kind": "action", "name": "铸铁者", "start": 12},
            {"kind": "action", "name": "铸铁者", "start": 0}
        ]"#,
    )
    .unwrap();
    let mut build = build();
    build.set_timeline(Some(timeline));
    let report = build.simulate_timeline().unwrap().unwrap();

    assert_eq!(report.actions[0].start, 0.0);
    assert_eq!(report.actions[0].buffs, vec!["战意".to_string()]);
    assert!(approx(report.actions[0].raw, 990.0));
    assert!(report.actions[1].buffs.is_empty());
    assert!(approx(report.actions[1].raw, 660.0));
    assert!(approx(report.total, 1650.0));
}

#[test]
fn test_timeline_shield_absorbs_first() {
    let mut build = Build::new(
        data(),
        BuildOptions {
            enemy: EnemySpec {
                monster: Some("海德拉".into()),
                ..Default::default()
            },
            ..options()
        },
    )
    .unwrap();
    build.set_timeline(Some(Timeline::new(vec![TimelineItem::Action {
        name: "烈焰孤沙".into(),
        start: 0.0,
        duration: 7.0,
        layer: 0,
    }])));
    let report = build.simulate_timeline().unwrap().unwrap();
    let hit = report.actions[0].dealt;
    // raw damage before defense is (300 + 150) * 1.1 * 0.9 resistance per round
    assert!(approx(report.actions[0].raw, 4950.0 * 0.9));
    assert!(approx(hit.shield, 4455.0));
    assert_eq!(hit.health, 0.0);
    assert!(approx(report.enemy.shield, 5000.0 - 4455.0));
}

// ============================================================================
// Loadout Codes
// ============================================================================

#[test]
fn test_loadout_code_round_trip() {
    let mut build = build();
    for id in [1001, 1003] {
        build.equip_mod(id, None).unwrap();
    }
    build.equip_mod(2001, None).unwrap();
    build.equip_mod(3002, None).unwrap();

    let code = build.to_code().unwrap();
    assert_eq!(code.len(), 124);
    let rebuilt = Build::from_code(data(), &code).unwrap();
    assert_eq!(rebuilt.to_code().unwrap(), code);
    assert_eq!(rebuilt.character().record().name, "丽蓓卡");
    assert_eq!(rebuilt.mods(ModCategory::Melee)[0].id(), 2001);
    assert!(approx(rebuilt.calculate(), build.calculate()));
}

#[test]
fn test_loadout_code_unknown_ids() {
    let code = LoadoutCode {
        character: 99,
        melee: 101,
        ranged: 201,
        ..Default::default()
    }
    .encode()
    .unwrap();
    assert!(matches!(
        Build::from_code(data(), &code),
        Err(BuildError::DataNotFound {
            kind: "character",
            ..
        })
    ));
    assert!(matches!(
        Build::from_code(data(), "not a code"),
        Err(BuildError::InvalidCode(_))
    ));
}

#[test]
fn test_set_weapon_slot() {
    let mut build = build();
    build
        .set_weapon(WeaponSlot::Ranged, "剥离者", None, None)
        .unwrap();
    assert_eq!(build.ranged().name(), "剥离者");
    assert!(build
        .set_weapon(WeaponSlot::Ranged, "不存在", None, None)
        .is_err());
}
