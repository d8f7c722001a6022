//! Greedy auto-build search.
//!
//! Each iteration makes one pass over the searched mod categories and the
//! unfixed weapon slots:
//!
//! - a category with a free slot gains its best candidate when that
//!   candidate's income is strictly positive;
//! - a full category swaps its worst equipped mod for the best candidate
//!   when the candidate is strictly better;
//! - a weapon slot switches to the best candidate weapon when it improves
//!   the score.
//!
//! The search stops after a pass without changes or at `max_iterations`.
//! Ties within `1e-9` are broken uniformly at random with an injectable
//! rng, so seeded runs are reproducible.

use crate::build::{relative_gain, Build, Candidate, WeaponSlot};
use crate::data::{ModCategory, ModRecord};
use crate::leveled::{Leveled, LeveledMod};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

const EPSILON: f64 = 1e-9;

fn default_max_iterations() -> usize {
    200
}

/// A mod the search may equip, at `rank` or its max rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModCandidate {
    pub id: u32,
    #[serde(default)]
    pub rank: Option<u32>,
}

impl ModCandidate {
    pub fn new(id: u32) -> Self {
        Self { id, rank: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoBuildOptions {
    pub mods: Vec<ModCandidate>,
    pub melee_weapons: Vec<String>,
    pub ranged_weapons: Vec<String>,
    /// Categories to search; every category when empty.
    pub categories: Vec<ModCategory>,
    /// Categories left as they are. Their mods still count against caps.
    pub preserved: Vec<ModCategory>,
    pub fixed_melee: bool,
    pub fixed_ranged: bool,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Seeds a `ChaCha8Rng` for tie-breaking instead of the caller's rng.
    pub seed: Option<u64>,
}

impl Default for AutoBuildOptions {
    fn default() -> Self {
        Self {
            mods: Vec::new(),
            melee_weapons: Vec::new(),
            ranged_weapons: Vec::new(),
            categories: Vec::new(),
            preserved: Vec::new(),
            fixed_melee: false,
            fixed_ranged: false,
            max_iterations: default_max_iterations(),
            seed: None,
        }
    }
}

impl AutoBuildOptions {
    fn searched_categories(&self) -> Vec<ModCategory> {
        let included: &[ModCategory] = if self.categories.is_empty() {
            &ModCategory::ALL
        } else {
            &self.categories
        };
        included
            .iter()
            .copied()
            .filter(|c| !self.preserved.contains(c))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct AutoBuildResult {
    pub build: Build,
    /// One human-readable line per change, plus the stop reason.
    pub log: Vec<String>,
    pub iterations: usize,
}

/// Exclusion state of one mod category.
///
/// Holds the series of equipped exclusive mods, the full names of every
/// equipped mod and how many copies of each id are equipped.
///
/// # Examples
///
/// ```rust
/// use buildscore::optimizer::SelectionState;
/// use buildscore::data::{ModCategory, ModRecord, Quality};
///
/// let record = ModRecord {
///     id: 1, name: "锋利".into(), series: "狮鹫".into(),
///     quality: Quality::Gold, tolerance: 10,
///     category: ModCategory::Character, polarity: None, element: None,
///     restriction: None, exclusive: true,
///     bonuses: Default::default(), conditional: None,
/// };
/// let mut state = SelectionState::default();
/// assert!(state.admits(&record));
/// state.insert(&record);
/// assert!(!state.admits(&record));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionState {
    series: HashSet<String>,
    names: HashSet<String>,
    counts: HashMap<u32, u32>,
}

impl SelectionState {
    pub fn from_mods(mods: &[LeveledMod]) -> Self {
        let mut state = Self::default();
        for m in mods {
            state.insert(m.record());
        }
        state
    }

    /// Whether `record` can join the category without breaking exclusivity.
    ///
    /// A mod id is equipped at most once, and so is a full name.
    pub fn admits(&self, record: &ModRecord) -> bool {
        if self.count(record.id) > 0 || self.names.contains(&record.full_name()) {
            return false;
        }
        !(record.exclusive && self.series.contains(&record.series))
    }

    pub fn insert(&mut self, record: &ModRecord) {
        if record.exclusive {
            self.series.insert(record.series.clone());
        }
        self.names.insert(record.full_name());
        *self.counts.entry(record.id).or_insert(0) += 1;
    }

    pub fn remove(&mut self, record: &ModRecord) {
        if record.exclusive {
            self.series.remove(&record.series);
        }
        self.names.remove(&record.full_name());
        if let Some(count) = self.counts.get_mut(&record.id) {
            *count = count.saturating_sub(1);
        }
    }

    pub fn count(&self, id: u32) -> u32 {
        self.counts.get(&id).copied().unwrap_or(0)
    }
}

/// Highest-scoring entry; equal scores pick uniformly at random.
fn pick_best<T: Clone, R: Rng + ?Sized>(scored: &[(T, f64)], rng: &mut R) -> Option<(T, f64)> {
    let best = scored
        .iter()
        .map(|(_, v)| *v)
        .fold(f64::NEG_INFINITY, f64::max);
    let ties: Vec<&(T, f64)> = scored
        .iter()
        .filter(|(_, v)| (v - best).abs() <= EPSILON)
        .collect();
    ties.choose(rng).map(|&(item, value)| (item.clone(), *value))
}

struct Search<'o, R: Rng + ?Sized> {
    records: Vec<(Arc<ModRecord>, &'o ModCandidate)>,
    rng: &'o mut R,
    log: Vec<String>,
}

impl<'o, R: Rng + ?Sized> Search<'o, R> {
    /// Candidates of `category` the build can still take.
    fn candidates(&self, build: &Build, category: ModCategory, skip: Option<u32>) -> Vec<(Arc<ModRecord>, Option<u32>)> {
        let state = SelectionState::from_mods(build.mods(category));
        self.records
            .iter()
            .filter(|(record, _)| {
                record.category == category
                    && Some(record.id) != skip
                    && state.admits(record)
                    && build.fits(record)
            })
            .map(|(record, candidate)| (record.clone(), candidate.rank))
            .collect()
    }

    fn score_candidates(
        &self,
        build: &Build,
        candidates: Vec<(Arc<ModRecord>, Option<u32>)>,
    ) -> Vec<((Arc<ModRecord>, Option<u32>), f64)> {
        let base = build.calculate();
        candidates
            .into_iter()
            .filter_map(|(record, rank)| {
                let mut trial = build.clone();
                trial.equip_mod(record.id, rank).ok()?;
                let gain = relative_gain(base, trial.calculate());
                Some(((record, rank), gain))
            })
            .collect()
    }

    /// One add or swap in `category`; returns whether the build changed.
    fn step_category(&mut self, build: &mut Build, category: ModCategory) -> bool {
        let equipped = build.mods(category).len();
        if equipped < category.cap() {
            let candidates = self.candidates(build, category, None);
            let scored = self.score_candidates(build, candidates);
            let Some(((record, rank), gain)) = pick_best(&scored, &mut *self.rng) else {
                return false;
            };
            if gain <= 0.0 {
                return false;
            }
            if build.equip_mod(record.id, rank).is_err() {
                return false;
            }
            self.log.push(format!(
                "add {} mod {} ({:+.2}%)",
                category,
                record.full_name(),
                gain * 100.0
            ));
            return true;
        }

        let worst = build
            .mods(category)
            .iter()
            .map(|m| {
                let candidate = Candidate::Mod {
                    id: m.id(),
                    rank: Some(m.level()),
                };
                (m.record().clone(), build.calc_income(&candidate, true))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));
        let Some((worst, worst_value)) = worst else {
            return false;
        };

        let mut trial = build.clone();
        trial.unequip_mod(worst.id);
        let candidates = self.candidates(&trial, category, Some(worst.id));
        let scored = self.score_candidates(&trial, candidates);
        let Some(((record, rank), gain)) = pick_best(&scored, &mut *self.rng) else {
            return false;
        };
        if gain <= worst_value + EPSILON {
            return false;
        }
        if trial.equip_mod(record.id, rank).is_err() {
            return false;
        }
        self.log.push(format!(
            "swap {} mod {} ({:+.2}%) for {} ({:+.2}%)",
            category,
            worst.full_name(),
            worst_value * 100.0,
            record.full_name(),
            gain * 100.0
        ));
        *build = trial;
        true
    }

    fn step_weapon(&mut self, build: &mut Build, slot: WeaponSlot, names: &[String]) -> bool {
        let Some(current) = build.weapon(slot) else {
            return false;
        };
        let current_name = current.name().to_string();
        let (refine, level) = (current.refine(), current.level());
        let base = build.calculate();

        // the trial drops mods the new weapon no longer fits before scoring
        let scored: Vec<((Build, Vec<String>), f64)> = names
            .iter()
            .filter(|name| **name != current_name)
            .filter_map(|name| {
                let mut trial = build.clone();
                let dropped = match trial.set_weapon(slot, name, Some(refine), Some(level)) {
                    Ok(dropped) => dropped,
                    Err(err) => {
                        debug!(weapon = %name, error = %err, "skipping weapon candidate");
                        return None;
                    }
                };
                let gain = relative_gain(base, trial.calculate());
                Some(((trial, dropped), gain))
            })
            .collect();
        let Some(((trial, dropped), gain)) = pick_best(&scored, &mut *self.rng) else {
            return false;
        };
        if gain <= EPSILON {
            return false;
        }
        let mut line = format!(
            "switch {:?} weapon {} -> {} ({:+.2}%)",
            slot,
            current_name,
            trial.weapon(slot).map(|w| w.name()).unwrap_or_default(),
            gain * 100.0
        );
        if !dropped.is_empty() {
            line.push_str(&format!(", unequipped {}", dropped.join(", ")));
        }
        self.log.push(line);
        *build = trial;
        true
    }
}

/// Search for a better loadout starting from `build`.
///
/// Uses a `ChaCha8Rng` seeded from `options.seed` when set, `rng` otherwise.
pub fn auto_build<R: Rng + ?Sized>(build: &Build, options: &AutoBuildOptions, rng: &mut R) -> AutoBuildResult {
    match options.seed {
        Some(seed) => run(build, options, &mut ChaCha8Rng::seed_from_u64(seed)),
        None => run(build, options, rng),
    }
}

fn run<R: Rng + ?Sized>(build: &Build, options: &AutoBuildOptions, rng: &mut R) -> AutoBuildResult {
    let records = options
        .mods
        .iter()
        .filter_map(|candidate| match build.data().mod_by_id(candidate.id) {
            Ok(record) => Some((record, candidate)),
            Err(err) => {
                debug!(error = %err, "skipping mod candidate");
                None
            }
        })
        .collect();
    let mut search = Search {
        records,
        rng,
        log: Vec::new(),
    };
    let categories = options.searched_categories();
    let mut current = build.clone();
    let mut iterations = 0;

    loop {
        if iterations >= options.max_iterations {
            search
                .log
                .push(format!("stopped after {} iterations", iterations));
            break;
        }
        iterations += 1;

        let mut changed = false;
        for &category in &categories {
            changed |= search.step_category(&mut current, category);
        }
        if !options.fixed_melee {
            changed |= search.step_weapon(&mut current, WeaponSlot::Melee, &options.melee_weapons);
        }
        if !options.fixed_ranged {
            changed |= search.step_weapon(&mut current, WeaponSlot::Ranged, &options.ranged_weapons);
        }
        debug!(iteration = iterations, changed, "auto-build pass");

        if !changed {
            search
                .log
                .push(format!("no improvement after {} iterations", iterations));
            break;
        }
    }

    AutoBuildResult {
        build: current,
        log: search.log,
        iterations,
    }
}

impl Build {
    /// [`auto_build`] with the thread-local rng.
    pub fn auto_build(&self, options: &AutoBuildOptions) -> AutoBuildResult {
        auto_build(self, options, &mut rand::thread_rng())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::Bonuses;
    use crate::data::Quality;

    fn record(id: u32, name: &str, series: &str, exclusive: bool) -> ModRecord {
        ModRecord {
            id,
            name: name.into(),
            series: series.into(),
            quality: Quality::Gold,
            tolerance: 10,
            category: ModCategory::Character,
            polarity: None,
            element: None,
            restriction: None,
            exclusive,
            bonuses: Bonuses::new(),
            conditional: None,
        }
    }

    #[test]
    fn test_selection_exclusive_series() {
        let mut state = SelectionState::default();
        state.insert(&record(1, "甲", "狮鹫", true));
        assert!(!state.admits(&record(2, "乙", "狮鹫", true)));
        // non-exclusive members of the series are unaffected
        assert!(state.admits(&record(3, "丙", "狮鹫", false)));
    }

    #[test]
    fn test_selection_name_exclusion() {
        let mut state = SelectionState::default();
        state.insert(&record(1, "甲", "", false));
        assert!(!state.admits(&record(9, "甲", "", false)));
        assert!(state.admits(&record(2, "乙", "", false)));
    }

    #[test]
    fn test_selection_id_exclusion() {
        let mut state = SelectionState::default();
        state.insert(&record(1, "甲", "", false));
        // a renamed record with the same id is still the same mod
        assert!(!state.admits(&record(1, "乙", "", false)));
    }

    #[test]
    fn test_candidate_json_defaults() {
        let candidate: ModCandidate = serde_json::from_str(r#"{ "id": 1001 }"#).unwrap();
        assert_eq!(candidate, ModCandidate::new(1001));
    }

    #[test]
    fn test_selection_remove() {
        let first = record(1, "甲", "狮鹫", true);
        let mut state = SelectionState::default();
        state.insert(&first);
        assert_eq!(state.count(1), 1);
        state.remove(&first);
        assert_eq!(state.count(1), 0);
        assert!(state.admits(&first));
    }

    #[test]
    fn test_pick_best_is_seeded() {
        let scored = vec![("a", 1.0), ("b", 1.0), ("c", 0.5)];
        let mut first = ChaCha8Rng::seed_from_u64(7);
        let mut second = ChaCha8Rng::seed_from_u64(7);
        let a = pick_best(&scored, &mut first);
        let b = pick_best(&scored, &mut second);
        assert_eq!(a, b);
        assert!(matches!(a, Some(("a", _)) | Some(("b", _))));
    }

    #[test]
    fn test_pick_best_empty() {
        let scored: Vec<(u32, f64)> = Vec::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(pick_best(&scored, &mut rng), None);
    }

    #[test]
    fn test_searched_categories_skip_preserved() {
        let options = AutoBuildOptions {
            preserved: vec![ModCategory::Melee],
            ..Default::default()
        };
        let categories = options.searched_categories();
        assert_eq!(categories.len(), 3);
        assert!(!categories.contains(&ModCategory::Melee));
    }
}
