//! Scripted timeline replay.
//!
//! A timeline is a list of actions and buff windows on numbered layers:
//!
//! ```json
//! [
//!   { "kind": "buff",   "name": "战意", "start": 0, "duration": 10, "layer": 1 },
//!   { "kind": "action", "name": "刀",   "start": 0, "duration": 4 },
//!   { "kind": "action", "name": "技能", "start": 6 }
//! ]
//! ```
//!
//! Actions are replayed in start order against one enemy. Each is scored
//! on a clone of the build carrying the buffs active at its start; the raw
//! damage then goes through the enemy's shield and health pools.

use crate::ast::Variant;
use crate::attr::Attr;
use crate::build::Build;
use crate::data::GameData;
use crate::enemy::{Enemy, PoolHit};
use crate::error::BuildError;
use crate::leveled::Leveled;
use crate::target::{Action, TargetContext};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelineItem {
    /// Use a weapon, weapon skill or character skill.
    Action {
        name: String,
        start: f64,
        #[serde(default)]
        duration: f64,
        #[serde(default)]
        layer: u32,
    },
    /// A buff active over `[start, start + duration)` for actions on this
    /// layer or below.
    Buff {
        name: String,
        #[serde(default)]
        level: Option<u32>,
        start: f64,
        duration: f64,
        #[serde(default)]
        layer: u32,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeline {
    pub items: Vec<TimelineItem>,
}

struct ActionItem<'t> {
    name: &'t str,
    start: f64,
    duration: f64,
    layer: u32,
}

impl Timeline {
    pub fn new(items: Vec<TimelineItem>) -> Self {
        Self { items }
    }

    /// Every buff item must name a known buff.
    pub fn validate(&self, data: &GameData) -> Result<(), BuildError> {
        for item in &self.items {
            if let TimelineItem::Buff { name, .. } = item {
                data.buff(name)?;
            }
        }
        Ok(())
    }

    fn actions(&self) -> Vec<ActionItem<'_>> {
        let mut actions: Vec<ActionItem<'_>> = self
            .items
            .iter()
            .filter_map(|item| match item {
                TimelineItem::Action {
                    name,
                    start,
                    duration,
                    layer,
                } => Some(ActionItem {
                    name,
                    start: *start,
                    duration: *duration,
                    layer: *layer,
                }),
                TimelineItem::Buff { .. } => None,
            })
            .collect();
        actions.sort_by(|a, b| a.start.total_cmp(&b.start));
        actions
    }

    /// Buffs applying to an action on `layer` starting at `time`.
    ///
    /// Buffs on `layer` or a higher layer apply. A buff's window runs from
    /// its start to its own end or to the start of the next buff item on the
    /// same layer, whichever comes first. Windows are sampled once, at the
    /// action's start: a buff starting while an action is already running
    /// does not reach that action, and one ending mid-action stays on it.
    pub fn active_buffs(&self, layer: u32, time: f64) -> Vec<(&str, Option<u32>)> {
        let buffs: Vec<(&str, Option<u32>, f64, f64, u32)> = self
            .items
            .iter()
            .filter_map(|item| match item {
                TimelineItem::Buff {
                    name,
                    level,
                    start,
                    duration,
                    layer,
                } => Some((name.as_str(), *level, *start, *duration, *layer)),
                TimelineItem::Action { .. } => None,
            })
            .collect();

        buffs
            .iter()
            .filter(|(_, _, start, duration, buff_layer)| {
                if *buff_layer < layer {
                    return false;
                }
                let next = buffs
                    .iter()
                    .filter(|(_, _, s, _, l)| l == buff_layer && s > start)
                    .map(|(_, _, s, _, _)| *s)
                    .fold(f64::INFINITY, f64::min);
                let end = (start + duration).min(next);
                time >= *start && time < end
            })
            .map(|(name, level, ..)| (*name, *level))
            .collect()
    }
}

/// Attacks a fire-rate weapon gets off in `duration` seconds.
///
/// One cycle empties the magazine at `rate` then reloads. At least one
/// attack is always counted.
///
/// # Examples
///
/// ```rust
/// use buildscore::timeline::attack_count;
///
/// // 10 rounds at 5/s take 2s, plus 1s reload: 3s cycles
/// assert_eq!(attack_count(7.0, 5.0, 10.0, 1.0), 25.0);
/// assert_eq!(attack_count(0.0, 5.0, 10.0, 1.0), 1.0);
/// ```
pub fn attack_count(duration: f64, rate: f64, magazine: f64, reload: f64) -> f64 {
    if duration <= 0.0 || rate <= 0.0 {
        return 1.0;
    }
    if magazine <= 0.0 {
        return (duration * rate).floor().max(1.0);
    }
    let cycle = magazine / rate + reload.max(0.0);
    let full = (duration / cycle).floor();
    let remaining = duration - full * cycle;
    let attacks = full * magazine + magazine.min((remaining * rate).floor());
    attacks.max(1.0)
}

/// Outcome of one replayed action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionReport {
    pub name: String,
    pub start: f64,
    pub buffs: Vec<String>,
    pub attacks: f64,
    /// Unmitigated damage of the whole action.
    pub raw: f64,
    pub dealt: PoolHit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineReport {
    pub actions: Vec<ActionReport>,
    /// Damage dealt to both pools over the whole timeline.
    pub total: f64,
    /// Enemy state after the last action.
    pub enemy: Enemy,
}

/// Replay `timeline` against `build`'s enemy.
pub fn simulate(build: &Build, timeline: &Timeline) -> Result<TimelineReport, BuildError> {
    let mut enemy = build.enemy().clone();
    let mut reports = Vec::new();
    let mut total = 0.0;

    for item in timeline.actions() {
        let mut scenario = build.clone();
        scenario.set_timeline(None);
        scenario.set_base_name(item.name);
        let mut applied = Vec::new();
        for (name, level) in timeline.active_buffs(item.layer, item.start) {
            if !scenario.has_buff(name) {
                scenario.add_buff(name, level)?;
                applied.push(name.to_string());
            }
        }

        let aggregation = scenario.aggregate();
        let ctx = TargetContext::new(&scenario, &aggregation).with_defense(1.0);
        let per_attack = ctx.action_total(Variant::Expected);
        let attacks = match ctx.action() {
            Action::Weapon(weapon) => match weapon.snapshot().fire_rate {
                Some(rate) => {
                    let attr = ctx.weapon_attr(weapon);
                    attack_count(item.duration, rate * attr.attack_speed, attr.magazine, attr.reload)
                        * attr.multi_shot
                }
                None => 1.0,
            },
            _ => 1.0,
        };
        let raw = per_attack * attacks;
        let mitigation = enemy.health_mitigation(
            scenario.character().level(),
            aggregation.attrs.get(Attr::IgnoreDefense),
        );
        let dealt = enemy.apply_damage(raw, mitigation);
        total += dealt.total();
        debug!(
            action = item.name,
            start = item.start,
            raw,
            dealt = dealt.total(),
            "timeline action"
        );

        reports.push(ActionReport {
            name: item.name.to_string(),
            start: item.start,
            buffs: applied,
            attacks,
            raw,
            dealt,
        });
    }

    Ok(TimelineReport {
        actions: reports,
        total,
        enemy,
    })
}
