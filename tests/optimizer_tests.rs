mod common;

use buildscore::data::ModCategory;
use buildscore::optimizer::{auto_build, ModCandidate, SelectionState};
use buildscore::AutoBuildOptions;
use common::build;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn candidates(ids: &[u32]) -> Vec<ModCandidate> {
    ids.iter().map(|&id| ModCandidate::new(id)).collect()
}

fn ids(build: &buildscore::Build, category: ModCategory) -> Vec<u32> {
    let mut ids: Vec<u32> = build.mods(category).iter().map(|m| m.id()).collect();
    ids.sort_unstable();
    ids
}

fn mod_search() -> AutoBuildOptions {
    AutoBuildOptions {
        mods: candidates(&[1001, 1002, 1004, 1005, 1006, 1007, 1008, 2001, 2002, 2003, 3001]),
        fixed_melee: true,
        fixed_ranged: true,
        seed: Some(7),
        ..Default::default()
    }
}

// ============================================================================
// Mod Search
// ============================================================================

#[test]
fn test_search_picks_useful_mods() {
    let result = build().auto_build(&mod_search());

    // 1004 shares the exclusive series with the stronger 1005; 1007 needs 光
    assert_eq!(ids(&result.build, ModCategory::Character), vec![1001, 1005, 1008]);
    assert_eq!(ids(&result.build, ModCategory::Melee), vec![2001, 2002, 2003]);
    // ranged mods do not move a melee score
    assert!(result.build.mods(ModCategory::Ranged).is_empty());
    assert!(result.build.calculate() > build().calculate());
}

#[test]
fn test_search_respects_caps_and_exclusivity() {
    let result = build().auto_build(&mod_search());
    for category in ModCategory::ALL {
        let mods = result.build.mods(category);
        assert!(mods.len() <= category.cap());
        let mut state = SelectionState::default();
        for m in mods {
            assert!(state.admits(m.record()), "{}", m.record().full_name());
            state.insert(m.record());
        }
    }
}

#[test]
fn test_search_terminates() {
    let result = build().auto_build(&mod_search());
    assert!(result.iterations <= 10);
    let last = result.log.last().unwrap();
    assert!(last.starts_with("no improvement"), "{last}");
    // one line per change plus the stop reason
    assert_eq!(result.log.len(), 7);
}

#[test]
fn test_iteration_limit() {
    let options = AutoBuildOptions {
        max_iterations: 1,
        ..mod_search()
    };
    let result = build().auto_build(&options);
    assert_eq!(result.iterations, 1);
    assert_eq!(result.build.mods(ModCategory::Character).len(), 1);
    assert_eq!(result.build.mods(ModCategory::Melee).len(), 1);
    assert!(result.log.last().unwrap().starts_with("stopped after"));
}

#[test]
fn test_seeded_runs_agree() {
    let options = mod_search();
    let a = build().auto_build(&options);
    let b = build().auto_build(&options);
    assert_eq!(a.build.to_code().unwrap(), b.build.to_code().unwrap());
    assert_eq!(a.log, b.log);
}

#[test]
fn test_injected_rng() {
    let options = AutoBuildOptions {
        seed: None,
        ..mod_search()
    };
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let result = auto_build(&build(), &options, &mut rng);
    assert_eq!(ids(&result.build, ModCategory::Character), vec![1001, 1005, 1008]);
}

#[test]
fn test_preserved_category_untouched() {
    let mut start = build();
    start.equip_mod(1006, None).unwrap();
    let options = AutoBuildOptions {
        preserved: vec![ModCategory::Character],
        ..mod_search()
    };
    let result = start.auto_build(&options);
    assert_eq!(ids(&result.build, ModCategory::Character), vec![1006]);
    assert_eq!(ids(&result.build, ModCategory::Melee), vec![2001, 2002, 2003]);
}

#[test]
fn test_searched_categories_only() {
    let options = AutoBuildOptions {
        categories: vec![ModCategory::Melee],
        ..mod_search()
    };
    let result = build().auto_build(&options);
    assert!(result.build.mods(ModCategory::Character).is_empty());
    assert_eq!(result.build.mods(ModCategory::Melee).len(), 3);
}

// ============================================================================
// Full Categories
// ============================================================================

fn filled(ids: &[u32]) -> buildscore::Build {
    let mut build = build();
    for &id in ids {
        build.equip_mod(id, None).unwrap();
    }
    assert_eq!(build.mods(ModCategory::Character).len(), ModCategory::Character.cap());
    build
}

fn character_search(mods: &[u32]) -> AutoBuildOptions {
    AutoBuildOptions {
        mods: candidates(mods),
        categories: vec![ModCategory::Character],
        fixed_melee: true,
        fixed_ranged: true,
        seed: Some(7),
        ..Default::default()
    }
}

#[test]
fn test_full_category_swaps_worst_mod() {
    // 迅捷 (威力) adds nothing to a weapon hit and is equipped before 坚韧
    let start = filled(&[1001, 1002, 1003, 1004, 1006, 1009, 1010, 1011]);
    let result = start.auto_build(&character_search(&[1008]));

    let equipped = ids(&result.build, ModCategory::Character);
    assert_eq!(equipped.len(), 8);
    assert!(equipped.contains(&1008));
    assert!(!equipped.contains(&1002));
    assert!(result.log[0].starts_with("swap 角色 mod 迅捷"), "{}", result.log[0]);
    assert!(result.build.calculate() > start.calculate());
}

#[test]
fn test_full_category_keeps_mods_on_equal_gain() {
    // 坚韧 is worth exactly as little as the worst equipped mod
    let start = filled(&[1001, 1002, 1003, 1004, 1008, 1009, 1010, 1011]);
    let result = start.auto_build(&character_search(&[1006]));

    assert_eq!(
        ids(&result.build, ModCategory::Character),
        ids(&start, ModCategory::Character)
    );
    assert_eq!(result.log, vec!["no improvement after 1 iterations".to_string()]);
}

// ============================================================================
// Weapon Search
// ============================================================================

#[test]
fn test_weapon_switch() {
    let options = AutoBuildOptions {
        melee_weapons: vec!["铸铁者".into(), "冥狱".into(), "不存在".into()],
        fixed_ranged: true,
        seed: Some(1),
        ..Default::default()
    };
    let result = build().auto_build(&options);
    // (500 + 150) * (1 + 0.3 * 0.8) beats (400 + 150) * 1.2
    assert_eq!(result.build.melee().name(), "冥狱");
    assert!(result.log.iter().any(|line| line.starts_with("switch")));
}

#[test]
fn test_fixed_weapon_kept() {
    let options = AutoBuildOptions {
        melee_weapons: vec!["冥狱".into()],
        fixed_melee: true,
        fixed_ranged: true,
        ..Default::default()
    };
    let result = build().auto_build(&options);
    assert_eq!(result.build.melee().name(), "铸铁者");
}

#[test]
fn test_weapon_switch_drops_unfit_mods() {
    let mut start = build();
    start.equip_mod(2003, None).unwrap();
    let options = AutoBuildOptions {
        melee_weapons: vec!["冥狱".into()],
        fixed_ranged: true,
        seed: Some(1),
        ..Default::default()
    };
    let result = start.auto_build(&options);

    // 长柄专精 needs a 长柄; 冥狱 still wins without it (806 against 770)
    assert_eq!(result.build.melee().name(), "冥狱");
    assert!(result.build.mods(ModCategory::Melee).is_empty());
    for category in ModCategory::ALL {
        for m in result.build.mods(category) {
            assert!(result.build.fits(m.record()), "{}", m.record().full_name());
        }
    }
    assert!(result.log[0].contains("unequipped 长柄专精"), "{}", result.log[0]);
}

#[test]
fn test_search_skips_unfit_candidates() {
    let options = AutoBuildOptions {
        mods: candidates(&[1007, 2003]),
        melee_weapons: vec!["冥狱".into()],
        fixed_ranged: true,
        seed: Some(3),
        ..Default::default()
    };
    let result = build().auto_build(&options);
    for category in ModCategory::ALL {
        for m in result.build.mods(category) {
            assert!(result.build.fits(m.record()), "{}", m.record().full_name());
        }
    }
    assert!(!ids(&result.build, ModCategory::Character).contains(&1007));
}
