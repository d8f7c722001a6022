//! Attribute-transform scripts for dynamic buffs.
//!
//! A script is an ordered list of declarative steps, each writing one
//! attribute with a formula evaluated against the current attribute set.
//! Formulas use the regular formula grammar, so a script can read any
//! attribute and the buff's own level (`等级` / `level`) but cannot do
//! anything else.
//!
//! ```json
//! [
//!   { "target": "攻击", "op": "add", "expr": "防御 * 0.1 * 等级" },
//!   { "target": "效益", "op": "clamp_max", "expr": "1.5" }
//! ]
//! ```

use crate::ast::{Expr, Variant};
use crate::attr::{Attr, AttrSet};
use crate::error::FormulaError;
use crate::eval::{evaluate, validate, Resolver};
use crate::parser::parse;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Operation of one script step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformOp {
    /// `target += value`
    Add,
    /// `target *= value`
    Multiply,
    /// `target = value`
    Set,
    /// `target = max(target, value)`
    ClampMin,
    /// `target = min(target, value)`
    ClampMax,
}

impl TransformOp {
    pub fn apply(self, current: f64, value: f64) -> f64 {
        match self {
            TransformOp::Add => current + value,
            TransformOp::Multiply => current * value,
            TransformOp::Set => value,
            TransformOp::ClampMin => current.max(value),
            TransformOp::ClampMax => current.min(value),
        }
    }
}

/// One step as stored in static data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStep {
    pub target: Attr,
    pub op: TransformOp,
    pub expr: String,
}

#[derive(Debug, Clone, PartialEq)]
struct CompiledStep {
    target: Attr,
    op: TransformOp,
    expr: Expr,
}

/// A parsed and validated script.
///
/// # Examples
///
/// ```rust
/// use buildscore::transform::{TransformOp, TransformScript, TransformStep};
/// use buildscore::attr::{Attr, AttrSet};
///
/// let script = TransformScript::compile(&[TransformStep {
///     target: Attr::Attack,
///     op: TransformOp::Add,
///     expr: "防御 * 0.5".into(),
/// }])
/// .unwrap();
///
/// let mut attrs = AttrSet::with_base_values();
/// attrs.set(Attr::Attack, 100.0);
/// attrs.set(Attr::Defense, 40.0);
/// script.apply(&mut attrs, 1);
/// assert_eq!(attrs.get(Attr::Attack), 120.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TransformScript {
    steps: Vec<CompiledStep>,
}

struct ScriptScope<'a> {
    attrs: &'a AttrSet,
    level: u32,
}

impl Resolver for ScriptScope<'_> {
    fn resolve(&self, namespace: Option<&str>, name: &str, _variant: Variant) -> Option<f64> {
        if namespace.is_some() {
            return None;
        }
        match name {
            "等级" | "level" => Some(self.level as f64),
            _ => Attr::from_name(name).map(|a| self.attrs.get(a)),
        }
    }
}

impl TransformScript {
    /// Parse every step and check that it only reads attributes and the level.
    pub fn compile(steps: &[TransformStep]) -> Result<Self, FormulaError> {
        let no_macros = BTreeMap::new();
        let sample = AttrSet::with_base_values();
        let scope = ScriptScope {
            attrs: &sample,
            level: 1,
        };
        let steps = steps
            .iter()
            .map(|step| {
                let expr = parse(&step.expr, &no_macros)?;
                validate(&expr, &scope)?;
                Ok(CompiledStep {
                    target: step.target,
                    op: step.op,
                    expr,
                })
            })
            .collect::<Result<Vec<_>, FormulaError>>()?;
        Ok(Self { steps })
    }

    /// Run every step in order; later steps see earlier writes.
    pub fn apply(&self, attrs: &mut AttrSet, level: u32) {
        for step in &self.steps {
            let value = evaluate(
                &step.expr,
                &ScriptScope {
                    attrs: &*attrs,
                    level,
                },
            );
            let current = attrs.get(step.target);
            attrs.set(step.target, step.op.apply(current, value));
        }
    }

    /// Attributes this script writes.
    pub fn targets(&self) -> impl Iterator<Item = Attr> + '_ {
        self.steps.iter().map(|s| s.target)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
