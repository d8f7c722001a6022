//! Formula evaluation and validation.
//!
//! Evaluation never fails: unknown identifiers and functions evaluate to
//! 0 and division by zero yields 0. `validate` walks the same tree and
//! reports the first problem instead.

use crate::ast::{Expr, UnaryOp, Variant};
use crate::attr::AttrSet;
use crate::error::FormulaError;

/// Resolves property names to numbers.
///
/// `variant` selects a cell of the damage grid for damage-like quantities;
/// other quantities ignore it. `None` means the name is unknown.
pub trait Resolver {
    fn resolve(&self, namespace: Option<&str>, name: &str, variant: Variant) -> Option<f64>;
}

/// Bare attribute lookup, by canonical name, alias or extra key.
impl Resolver for AttrSet {
    fn resolve(&self, namespace: Option<&str>, name: &str, _variant: Variant) -> Option<f64> {
        match namespace {
            Some(_) => None,
            None => self.get_by_name(name),
        }
    }
}

const BUILTINS: &[&str] = &["min", "max", "floor", "ceil", "or", "log", "power"];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

fn call_builtin(name: &str, args: &[f64]) -> Option<f64> {
    let first = args.first().copied().unwrap_or(0.0);
    let value = match name {
        "min" => args.iter().copied().reduce(f64::min).unwrap_or(0.0),
        "max" => args.iter().copied().reduce(f64::max).unwrap_or(0.0),
        "floor" => first.floor(),
        "ceil" => first.ceil(),
        "or" => args
            .iter()
            .copied()
            .find(|v| *v != 0.0)
            .or_else(|| args.last().copied())
            .unwrap_or(0.0),
        "log" => {
            if first <= 0.0 {
                0.0
            } else {
                match args.get(1) {
                    Some(&base) if base > 0.0 && base != 1.0 => first.ln() / base.ln(),
                    Some(_) => 0.0,
                    None => first.ln(),
                }
            }
        }
        "power" => first.powf(args.get(1).copied().unwrap_or(1.0)),
        _ => return None,
    };
    Some(if value.is_finite() { value } else { 0.0 })
}

/// Evaluate `expr` against `resolver`.
///
/// # Examples
///
/// ```rust
/// use buildscore::eval::evaluate;
/// use buildscore::parser::parse;
/// use buildscore::attr::{Attr, AttrSet};
/// use std::collections::BTreeMap;
///
/// let mut attrs = AttrSet::with_base_values();
/// attrs.set(Attr::Attack, 250.0);
/// let expr = parse("攻击 * 2 + 10 / 0", &BTreeMap::new()).unwrap();
/// assert_eq!(evaluate(&expr, &attrs), 500.0);
/// ```
pub fn evaluate(expr: &Expr, resolver: &dyn Resolver) -> f64 {
    eval_in(expr, resolver, None)
}

fn eval_in(expr: &Expr, resolver: &dyn Resolver, default_ns: Option<&str>) -> f64 {
    match expr {
        Expr::Number(n) => *n,
        Expr::Binary { op, lhs, rhs } => op.apply(
            eval_in(lhs, resolver, default_ns),
            eval_in(rhs, resolver, default_ns),
        ),
        Expr::Unary { op, operand } => {
            let v = eval_in(operand, resolver, default_ns);
            match op {
                UnaryOp::Neg => -v,
                UnaryOp::Plus => v,
            }
        }
        Expr::Property { namespace, name } => resolver
            .resolve(namespace.as_deref().or(default_ns), name, Variant::Expected)
            .unwrap_or(0.0),
        Expr::Member { object, member } => match object.as_ref() {
            Expr::Property { namespace, name } => {
                let variant = Variant::from_name(member).unwrap_or_default();
                resolver
                    .resolve(namespace.as_deref().or(default_ns), name, variant)
                    .unwrap_or(0.0)
            }
            other => eval_in(other, resolver, default_ns),
        },
        Expr::Call {
            namespace,
            name,
            args,
        } => {
            let ns = namespace.as_deref().or(default_ns);
            let values: Vec<f64> = args.iter().map(|a| eval_in(a, resolver, ns)).collect();
            call_builtin(name, &values).unwrap_or(0.0)
        }
    }
}

/// Report the first unresolvable identifier or unknown function.
pub fn validate(expr: &Expr, resolver: &dyn Resolver) -> Result<(), FormulaError> {
    validate_in(expr, resolver, None)
}

fn validate_in(
    expr: &Expr,
    resolver: &dyn Resolver,
    default_ns: Option<&str>,
) -> Result<(), FormulaError> {
    match expr {
        Expr::Number(_) => Ok(()),
        Expr::Binary { lhs, rhs, .. } => {
            validate_in(lhs, resolver, default_ns)?;
            validate_in(rhs, resolver, default_ns)
        }
        Expr::Unary { operand, .. } => validate_in(operand, resolver, default_ns),
        Expr::Property { namespace, name } => {
            let ns = namespace.as_deref().or(default_ns);
            match resolver.resolve(ns, name, Variant::Expected) {
                Some(_) => Ok(()),
                None => Err(FormulaError::UnknownIdentifier {
                    namespace: ns.map(str::to_string),
                    name: name.clone(),
                }),
            }
        }
        Expr::Member { object, .. } => validate_in(object, resolver, default_ns),
        Expr::Call {
            namespace,
            name,
            args,
        } => {
            if !is_builtin(name) {
                return Err(FormulaError::UnknownFunction {
                    namespace: namespace.clone(),
                    name: name.clone(),
                });
            }
            let ns = namespace.as_deref().or(default_ns);
            args.iter().try_for_each(|a| validate_in(a, resolver, ns))
        }
    }
}

/// Every property name referenced by `expr`, `ns::name` when namespaced,
/// deduplicated in first-appearance order.
pub fn identifier_names(expr: &Expr) -> Vec<String> {
    let mut names = Vec::new();
    collect_names(expr, &mut names);
    names
}

fn collect_names(expr: &Expr, names: &mut Vec<String>) {
    match expr {
        Expr::Number(_) => {}
        Expr::Binary { lhs, rhs, .. } => {
            collect_names(lhs, names);
            collect_names(rhs, names);
        }
        Expr::Unary { operand, .. } => collect_names(operand, names),
        Expr::Property { namespace, name } => {
            let full = match namespace {
                Some(ns) => format!("{}::{}", ns, name),
                None => name.clone(),
            };
            if !names.contains(&full) {
                names.push(full);
            }
        }
        Expr::Member { object, .. } => collect_names(object, names),
        Expr::Call { args, .. } => args.iter().for_each(|a| collect_names(a, names)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::Attr;
    use crate::parser::parse;
    use std::collections::BTreeMap;

    fn eval_str(input: &str) -> f64 {
        let attrs = AttrSet::with_base_values();
        evaluate(&parse(input, &BTreeMap::new()).unwrap(), &attrs)
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval_str("(2+3)*4"), 20.0);
        assert_eq!(eval_str("17 // 5"), 3.0);
        assert_eq!(eval_str("17 % 5"), 2.0);
        assert_eq!(eval_str("10/0"), 0.0);
        assert_eq!(eval_str("10 // 0"), 0.0);
        assert_eq!(eval_str("10 % 0"), 0.0);
        assert_eq!(eval_str("-2 * -3"), 6.0);
    }

    #[test]
    fn test_builtins() {
        assert_eq!(eval_str("min(3, 1, 2)"), 1.0);
        assert_eq!(eval_str("max(3, 1, 2)"), 3.0);
        assert_eq!(eval_str("floor(2.7) + ceil(2.1)"), 5.0);
        assert_eq!(eval_str("or(0, 0, 5)"), 5.0);
        assert_eq!(eval_str("or(0, 0)"), 0.0);
        assert_eq!(eval_str("power(2, 10)"), 1024.0);
        assert!((eval_str("log(100, 10)") - 2.0).abs() < 1e-12);
        assert_eq!(eval_str("log(0)"), 0.0);
    }

    #[test]
    fn test_unknown_identifier_is_zero() {
        assert_eq!(eval_str("不存在 + 1"), 1.0);
    }

    #[test]
    fn test_member_on_non_property_is_ignored() {
        assert_eq!(eval_str("(1 + 2).暴击"), 3.0);
    }

    #[test]
    fn test_validate_reports_identifier_with_namespace() {
        let attrs = AttrSet::with_base_values();
        let expr = parse("攻击 + 近战::未知", &BTreeMap::new()).unwrap();
        assert_eq!(
            validate(&expr, &attrs),
            Err(FormulaError::UnknownIdentifier {
                namespace: Some("近战".into()),
                name: "未知".into()
            })
        );
    }

    #[test]
    fn test_validate_unknown_function() {
        let attrs = AttrSet::with_base_values();
        let expr = parse("sqrt(4)", &BTreeMap::new()).unwrap();
        assert!(matches!(
            validate(&expr, &attrs),
            Err(FormulaError::UnknownFunction { .. })
        ));
    }

    #[test]
    fn test_validate_accepts_known_names() {
        let mut attrs = AttrSet::with_base_values();
        attrs.set(Attr::Attack, 1.0);
        let expr = parse("max(攻击, attack) * 威力 % 3", &BTreeMap::new()).unwrap();
        assert_eq!(validate(&expr, &attrs), Ok(()));
    }

    #[test]
    fn test_identifier_names_dedup() {
        let expr = parse("攻击 + 攻击 * 近战::暴击 + max(防御, 1)", &BTreeMap::new()).unwrap();
        assert_eq!(identifier_names(&expr), vec!["攻击", "近战::暴击", "防御"]);
    }
}
