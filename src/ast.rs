//! Formula syntax tree.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
}

impl BinaryOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "//" => BinaryOp::FloorDiv,
            "%" => BinaryOp::Rem,
            _ => return None,
        })
    }

    /// Apply the operator. Division and modulo by zero yield 0.
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::Mul => lhs * rhs,
            BinaryOp::Div if rhs == 0.0 => 0.0,
            BinaryOp::Div => lhs / rhs,
            BinaryOp::FloorDiv if rhs == 0.0 => 0.0,
            BinaryOp::FloorDiv => (lhs / rhs).floor(),
            BinaryOp::Rem if rhs == 0.0 => 0.0,
            BinaryOp::Rem => lhs % rhs,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Rem => "%",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
}

/// Parsed formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Property {
        namespace: Option<String>,
        name: String,
    },
    Call {
        namespace: Option<String>,
        name: String,
        args: Vec<Expr>,
    },
    /// Postfix `.member`, selecting a damage variant of a property.
    Member {
        object: Box<Expr>,
        member: String,
    },
}

/// One cell of the crit x trigger damage grid.
///
/// # Examples
///
/// ```rust
/// use buildscore::ast::Variant;
///
/// assert_eq!(Variant::from_name("暴击触发"), Some(Variant::CritTrigger));
/// assert_eq!(Variant::from_name("no_crit"), Some(Variant::NoCrit));
/// assert_eq!(Variant::from_name("whatever"), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Variant {
    /// Expected value over crit and trigger outcomes.
    #[default]
    Expected,
    Crit,
    NoCrit,
    Trigger,
    NoTrigger,
    CritTrigger,
    CritNoTrigger,
    TriggerNoCrit,
    NoCritNoTrigger,
}

impl Variant {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "暴击" | "crit" => Variant::Crit,
            "未暴击" | "no_crit" => Variant::NoCrit,
            "触发" | "trigger" => Variant::Trigger,
            "未触发" | "no_trigger" => Variant::NoTrigger,
            "暴击触发" | "crit_trigger" => Variant::CritTrigger,
            "暴击未触发" | "crit_no_trigger" => Variant::CritNoTrigger,
            "触发未暴击" | "trigger_no_crit" => Variant::TriggerNoCrit,
            "未暴击未触发" | "no_crit_no_trigger" => Variant::NoCritNoTrigger,
            "期望" | "expected" => Variant::Expected,
            _ => return None,
        })
    }
}
