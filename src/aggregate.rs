//! Attribute aggregation.
//!
//! Bonuses are collected from every source of a loadout, combined per
//! attribute with the attribute's stacking rule, and finalized against the
//! character's base stats. Dynamic buff scripts then rewrite the result,
//! and conditional mods are settled by a bounded fixed point:
//!
//! ```text
//! base pass -> dynamic scripts -> condition sweep (dependency order)
//!           -> verification passes (up to max_condition_passes)
//! ```
//!
//! Each pass rebuilds attributes from scratch with the current set of
//! active conditionals, so nothing leaks from one pass into the next.

use crate::attr::{Attr, AttrSet, Bonuses, StackRule, StatKey, WeaponAttr, WeaponStat, WeaponType};
use crate::config::EngineConfig;
use crate::graph::ConditionGraph;
use crate::leveled::{CharSnapshot, ConditionSubject, Leveled, LeveledBuff, LeveledMod, LeveledWeapon};
use crate::numeric::round_to;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Where a source's bonuses apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Character-wide: character record, weapon passives, character mods,
    /// aura mod, buffs.
    Character,
    /// One weapon slot: mods equipped in that weapon's category.
    Weapon(WeaponType),
}

/// A group of equipped mods sharing a category (and so a scope).
#[derive(Debug, Clone, Copy)]
pub struct ModGroup<'a> {
    pub mods: &'a [LeveledMod],
    pub scope: Scope,
}

/// Everything the aggregator reads, borrowed from a build.
pub struct AggregateInput<'a> {
    pub character: &'a CharSnapshot,
    pub character_bonuses: &'a Bonuses,
    pub weapons: Vec<&'a LeveledWeapon>,
    pub groups: Vec<ModGroup<'a>>,
    pub aura: Option<&'a LeveledMod>,
    pub buffs: &'a [LeveledBuff],
    pub dynamic_buffs: &'a [LeveledBuff],
    pub resonance_gain: f64,
    pub config: &'a EngineConfig,
}

struct Source {
    scope: Scope,
    bonuses: Bonuses,
}

struct Conditional<'a> {
    label: String,
    module: &'a LeveledMod,
    scope: Scope,
    /// Mods counted for polarity conditions.
    siblings: &'a [LeveledMod],
    bonuses: Bonuses,
}

/// Result of a full aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub attrs: AttrSet,
    /// Labels of conditional mods active in the last pass.
    ///
    /// When `converged` is false this is the state the pass cap stopped at,
    /// and a listed condition may no longer hold against `attrs`.
    pub active: Vec<String>,
    /// Aggregation passes spent on conditions.
    pub passes: usize,
    /// Whether every condition agrees with `attrs`.
    pub converged: bool,
    active_flags: Vec<bool>,
}

pub struct Aggregator<'a> {
    character: &'a CharSnapshot,
    sources: Vec<Source>,
    conditionals: Vec<Conditional<'a>>,
    dynamic_buffs: &'a [LeveledBuff],
    resonance_gain: f64,
    config: &'a EngineConfig,
}

/// Attack and independent damage from a weapon-scoped source belong to
/// that weapon rather than to the character.
fn weapon_owned(attr: Attr) -> bool {
    matches!(attr, Attr::Attack | Attr::IndependentDamageIncrease)
}

impl<'a> Aggregator<'a> {
    pub fn new(input: AggregateInput<'a>) -> Self {
        let mut sources = vec![Source {
            scope: Scope::Character,
            bonuses: input.character_bonuses.clone(),
        }];
        for weapon in &input.weapons {
            sources.push(Source {
                scope: Scope::Character,
                bonuses: weapon.snapshot().bonuses.clone(),
            });
        }
        for buff in input.buffs.iter().chain(input.dynamic_buffs) {
            sources.push(Source {
                scope: Scope::Character,
                bonuses: buff.bonuses().clone(),
            });
        }

        // MOD属性 is summed before any mod is counted, then scales elemental series.
        let mod_attribute: f64 = sources
            .iter()
            .map(|s| s.bonuses.get_char(Attr::ModAttribute))
            .sum();
        let elemental_factor = |m: &LeveledMod| {
            if input
                .config
                .elemental_series
                .iter()
                .any(|s| *s == m.record().series)
            {
                1.0 + mod_attribute
            } else {
                1.0
            }
        };

        let mut conditionals = Vec::new();
        let character_group = input
            .groups
            .iter()
            .find(|g| g.scope == Scope::Character)
            .map(|g| g.mods)
            .unwrap_or(&[]);
        let mut equipped: Vec<(&'a LeveledMod, Scope, &'a [LeveledMod])> = Vec::new();
        for group in &input.groups {
            for m in group.mods {
                equipped.push((m, group.scope, group.mods));
            }
        }
        if let Some(aura) = input.aura {
            equipped.push((aura, Scope::Character, character_group));
        }

        for (m, scope, siblings) in equipped {
            let factor = elemental_factor(m);
            sources.push(Source {
                scope,
                bonuses: m.snapshot().bonuses.scaled(factor, &[]),
            });
            if m.is_conditional() {
                conditionals.push(Conditional {
                    label: m.record().full_name(),
                    module: m,
                    scope,
                    siblings,
                    bonuses: m.snapshot().conditional.scaled(factor, &[]),
                });
            }
        }
        // Stable order independent of equip order.
        conditionals.sort_by(|a, b| {
            a.module
                .id()
                .cmp(&b.module.id())
                .then_with(|| a.label.cmp(&b.label))
        });

        Self {
            character: input.character,
            sources,
            conditionals,
            dynamic_buffs: input.dynamic_buffs,
            resonance_gain: input.resonance_gain,
            config: input.config,
        }
    }

    fn active_sources<'s>(&'s self, active: &'s [bool]) -> impl Iterator<Item = (Scope, &'s Bonuses)> + 's {
        self.sources
            .iter()
            .map(|s| (s.scope, &s.bonuses))
            .chain(
                self.conditionals
                    .iter()
                    .zip(active)
                    .filter(|(_, on)| **on)
                    .map(|(c, _)| (c.scope, &c.bonuses)),
            )
    }

    /// One aggregation pass for a fixed set of active conditionals.
    fn pass(&self, active: &[bool]) -> AttrSet {
        let mut totals = [0.0; Attr::COUNT];
        let mut extra: BTreeMap<String, f64> = BTreeMap::new();

        for (scope, bonuses) in self.active_sources(active) {
            for (key, value) in bonuses.iter() {
                if let StatKey::Char(attr) = key {
                    if matches!(scope, Scope::Weapon(_)) && weapon_owned(attr) {
                        continue;
                    }
                    let idx = attr.index();
                    totals[idx] = attr.stack_rule().combine(totals[idx], value);
                }
            }
            for (key, value) in bonuses.extras() {
                *extra.entry(key.to_string()).or_insert(0.0) += value;
            }
        }

        let total = |attr: Attr| totals[attr.index()];
        let mut attrs = self.finalize(&total);
        attrs.extra = extra;

        for buff in self.dynamic_buffs {
            if let Some(script) = buff.script() {
                script.apply(&mut attrs, buff.level());
            }
        }
        attrs
    }

    fn finalize(&self, total: &dyn Fn(Attr) -> f64) -> AttrSet {
        let c = self.character;
        let rg = self.resonance_gain;
        let mut attrs = AttrSet::default();
        for &attr in Attr::ALL {
            attrs.set(attr, attr.base_value() + total(attr));
        }

        let attack = c.attack * (1.0 + total(Attr::Attack) + rg) * (1.0 + total(Attr::ElementDamage))
            + total(Attr::FlatAttack);
        attrs.set(Attr::Attack, round_to(attack, 2));
        attrs.set(
            Attr::Health,
            (c.health * (1.0 + total(Attr::Health) + rg)).floor(),
        );
        attrs.set(
            Attr::Shield,
            (c.shield * (1.0 + total(Attr::Shield) + rg)).floor(),
        );
        attrs.set(
            Attr::Defense,
            (c.defense * (1.0 + total(Attr::Defense) + rg)).floor(),
        );
        attrs.set(Attr::Sanity, (c.sanity * (1.0 + total(Attr::Sanity))).floor());
        attrs.set(
            Attr::Efficiency,
            attrs.get(Attr::Efficiency).min(self.config.efficiency_cap),
        );
        attrs.set(Attr::Range, attrs.get(Attr::Range).min(self.config.range_cap));
        attrs
    }

    fn holds(&self, idx: usize, attrs: &AttrSet) -> bool {
        let cond = &self.conditionals[idx];
        let count = |p: char| {
            cond.siblings
                .iter()
                .filter(|m| m.polarity() == Some(p))
                .count()
        };
        cond.module.conditions().iter().all(|t| t.holds(attrs, count))
    }

    fn is_stable(&self, active: &[bool], attrs: &AttrSet) -> bool {
        (0..self.conditionals.len()).all(|i| self.holds(i, attrs) == active[i])
    }

    /// Graph over conditionals: B depends on A when B's condition reads an
    /// attribute that A's conditional bonuses write.
    pub fn condition_graph(&self) -> ConditionGraph {
        let mut graph = ConditionGraph::new();
        for (i, c) in self.conditionals.iter().enumerate() {
            graph.add_node(i, &c.label);
        }
        for (reader, rc) in self.conditionals.iter().enumerate() {
            let reads: Vec<Attr> = rc
                .module
                .conditions()
                .iter()
                .filter_map(|t| match t.subject {
                    ConditionSubject::Attr(a) => Some(a),
                    ConditionSubject::Polarity(_) => None,
                })
                .collect();
            for (writer, wc) in self.conditionals.iter().enumerate() {
                if wc.bonuses.char_attrs().any(|a| reads.contains(&a)) {
                    graph.add_edge(reader, writer);
                }
            }
        }
        graph
    }

    /// Aggregate with conditional mods settled.
    pub fn resolve(&self) -> Aggregation {
        let n = self.conditionals.len();
        let mut active = vec![false; n];
        let mut attrs = self.pass(&active);
        if n == 0 {
            return Aggregation {
                attrs,
                active: Vec::new(),
                passes: 0,
                converged: true,
                active_flags: active,
            };
        }

        let (order, cycle) = self.condition_graph().check_order();
        if let Some(err) = cycle {
            warn!(error = %err, "conditional mods form a dependency loop");
        }

        let max_passes = self.config.max_condition_passes.max(1);
        let mut passes = 0;
        let mut converged = false;
        for pass in 1..=max_passes {
            passes = pass;
            if pass == 1 {
                for &i in &order {
                    let holds = self.holds(i, &attrs);
                    if holds != active[i] {
                        active[i] = holds;
                        attrs = self.pass(&active);
                    }
                }
            } else {
                let flips: Vec<usize> = (0..n).filter(|&i| self.holds(i, &attrs) != active[i]).collect();
                for i in flips {
                    active[i] = !active[i];
                }
                attrs = self.pass(&active);
            }
            debug!(
                pass,
                active = active.iter().filter(|a| **a).count(),
                "condition pass"
            );
            if self.is_stable(&active, &attrs) {
                converged = true;
                break;
            }
        }
        if !converged {
            warn!(
                passes,
                "conditional mods did not settle; keeping the last pass"
            );
        }

        Aggregation {
            attrs,
            active: self
                .conditionals
                .iter()
                .zip(&active)
                .filter(|(_, on)| **on)
                .map(|(c, _)| c.label.clone())
                .collect(),
            passes,
            converged,
            active_flags: active,
        }
    }

    /// Per-weapon stats, using the conditionals active in `aggregation`.
    pub fn weapon_attrs(&self, aggregation: &Aggregation, weapon: &LeveledWeapon) -> WeaponAttr {
        let ty = weapon.record().weapon_type;
        let mut sums: BTreeMap<WeaponStat, f64> = BTreeMap::new();
        let mut add = |stat: WeaponStat, value: f64| {
            let rule = if stat == WeaponStat::IndependentDamageIncrease {
                StackRule::Compounding
            } else {
                StackRule::Additive
            };
            let entry = sums.entry(stat).or_insert(0.0);
            *entry = rule.combine(*entry, value);
        };

        for (scope, bonuses) in self.active_sources(&aggregation.active_flags) {
            let own_slot = scope == Scope::Weapon(ty);
            for (key, value) in bonuses.iter() {
                match key {
                    StatKey::Weapon {
                        scope: Some(t),
                        stat,
                    } if ty.accepts(t) => add(stat, value),
                    StatKey::Weapon { scope: None, stat }
                        if scope == Scope::Character || own_slot =>
                    {
                        add(stat, value)
                    }
                    StatKey::Char(Attr::Attack) if own_slot => add(WeaponStat::Attack, value),
                    StatKey::Char(Attr::IndependentDamageIncrease) if own_slot => {
                        add(WeaponStat::IndependentDamageIncrease, value)
                    }
                    _ => {}
                }
            }
        }

        let bonus = |stat: WeaponStat| sums.get(&stat).copied().unwrap_or(0.0);
        let snap = weapon.snapshot();
        let attack = snap.attack * (1.0 + bonus(WeaponStat::Attack)) * (1.0 + bonus(WeaponStat::Physical));
        let trigger = (snap.trigger_rate * (1.0 + bonus(WeaponStat::TriggerRate))).min(self.config.trigger_cap);
        WeaponAttr {
            attack: round_to(attack, 2),
            crit_rate: round_to(snap.crit_rate * (1.0 + bonus(WeaponStat::CritRate)), 2),
            crit_damage: round_to(snap.crit_damage * (1.0 + bonus(WeaponStat::CritDamage)), 2),
            trigger_rate: round_to(trigger, 2),
            attack_speed: round_to(1.0 + bonus(WeaponStat::AttackSpeed), 2),
            multi_shot: round_to(1.0 + bonus(WeaponStat::MultiShot), 2),
            reload: snap
                .reload
                .map(|r| r / (1.0 + bonus(WeaponStat::Reload)).max(0.01))
                .unwrap_or(0.0),
            magazine: snap
                .magazine
                .map(|m| (m * (1.0 + bonus(WeaponStat::Magazine))).floor())
                .unwrap_or(0.0),
            independent_damage_increase: round_to(bonus(WeaponStat::IndependentDamageIncrease), 3),
            bonus_damage: bonus(WeaponStat::BonusDamage),
            damage_increase: bonus(WeaponStat::DamageIncrease),
            trigger_multiplier: bonus(WeaponStat::TriggerMultiplier),
            multiplier: snap.multiplier,
        }
    }
}
