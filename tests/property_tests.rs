mod common;

use buildscore::attr::Attr;
use buildscore::damage::{boost_multiplier, crit_factors};
use buildscore::leveled::{Leveled, LeveledChar, LeveledMod};
use buildscore::numeric::{MAX_LEVEL, MIN_LEVEL};
use common::{approx, build, data};
use proptest::prelude::*;

const LOADOUT: [u32; 8] = [1001, 1002, 1003, 1004, 1006, 1009, 1010, 1011];

proptest! {
    #[test]
    fn prop_character_level_clamps(level in 0u32..500) {
        let record = data().character("丽蓓卡").unwrap();
        let character = LeveledChar::new(record, Some(level));
        prop_assert!((MIN_LEVEL..=MAX_LEVEL).contains(&character.level()));
        prop_assert!(character.snapshot().attack > 0.0);
    }

    #[test]
    fn prop_mod_rank_clamps(rank in 0u32..100) {
        let record = data().mod_by_id(1001).unwrap();
        let max = record.quality.max_rank();
        let leveled = LeveledMod::new(record, None, Some(rank)).unwrap();
        prop_assert!(leveled.level() <= max);
        prop_assert_eq!(leveled.level(), rank.min(max));
    }

    #[test]
    fn prop_hp_percent_clamps(hp in -5.0f64..5.0) {
        let mut build = build();
        build.set_hp_percent(hp);
        prop_assert!((0.0..=1.0).contains(&build.hp_percent()));
    }

    #[test]
    fn prop_boost_multiplier_bounded(boost in 0.0f64..3.0, hp in -2.0f64..2.0) {
        let multiplier = boost_multiplier(boost, hp);
        prop_assert!(multiplier >= 1.0);
        prop_assert!(multiplier <= 1.0 + boost + 1e-12);
    }

    #[test]
    fn prop_crit_grid_ordered(rate in 0.0f64..3.0, crit_damage in 1.0f64..3.0) {
        let [low, mid, high] = crit_factors(rate, crit_damage);
        prop_assert!(low <= mid + 1e-12);
        prop_assert!(mid <= high + 1e-12);
    }

    #[test]
    fn prop_equip_order_irrelevant(order in Just(LOADOUT.to_vec()).prop_shuffle()) {
        let mut reference = build();
        for id in LOADOUT {
            reference.equip_mod(id, None).unwrap();
        }
        let mut shuffled = build();
        for &id in &order {
            shuffled.equip_mod(id, None).unwrap();
        }
        prop_assert!(approx(shuffled.calculate(), reference.calculate()));
        let attack = shuffled.calculate_attributes().get(Attr::Attack);
        prop_assert!(approx(attack, reference.calculate_attributes().get(Attr::Attack)));
    }
}
