//! Error types for build scoring.
//!
//! Construction-time failures (unknown ids, malformed static data) are
//! reported through `BuildError`. Formula problems are reported through
//! `FormulaError`, which the validation pass returns as a value instead of
//! letting scoring fail.

use thiserror::Error;

/// Format a cycle path as a readable string.
fn format_cycle_path(path: &[String]) -> String {
    if path.is_empty() {
        return String::from("(empty cycle)");
    }
    path.join(" -> ")
}

/// Format an identifier with its optional namespace.
fn format_ident(namespace: &Option<String>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{}::{}", ns, name),
        None => name.to_string(),
    }
}

/// Errors raised while building or scoring a loadout.
///
/// # Examples
///
/// ```rust
/// use buildscore::BuildError;
///
/// let err = BuildError::DataNotFound { kind: "weapon", key: "Nope".into() };
/// assert_eq!(err.to_string(), "weapon \"Nope\" not found in static data");
/// ```
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    /// A static record was requested by an id or name that does not exist.
    ///
    /// Callers are expected to validate ids before constructing entities.
    #[error("{kind} \"{key}\" not found in static data")]
    DataNotFound { kind: &'static str, key: String },

    /// A formula could not be parsed or resolved.
    #[error(transparent)]
    Formula(#[from] FormulaError),

    /// A static record is present but cannot be interpreted.
    #[error("Invalid static data: {0}")]
    InvalidData(String),

    /// Conditional modifiers depend on each other in a loop.
    ///
    /// Contains the modifier names involved, first name repeated at the end.
    #[error("Condition cycle detected: {}", format_cycle_path(.path))]
    ConditionCycle { path: Vec<String> },

    /// A loadout code could not be decoded.
    #[error("Invalid loadout code: {0}")]
    InvalidCode(String),
}

/// Errors produced by the tokenizer, parser or validation pass.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormulaError {
    #[error("Formula is empty")]
    Empty,

    #[error("Unexpected character '{ch}' at position {position}")]
    UnexpectedChar { ch: char, position: usize },

    /// A single `:` was found; namespaces use `::`.
    #[error("Single ':' at position {position} is not supported, use '::' for namespaces")]
    SingleColon { position: usize },

    #[error("Unexpected token '{token}'")]
    UnexpectedToken { token: String },

    /// A binary operator has nothing on its right-hand side.
    #[error("Missing operand after operator '{operator}'")]
    MissingOperand { operator: String },

    /// A group, argument list or member access was left open.
    #[error("Expected {expected}")]
    Unterminated { expected: &'static str },

    #[error("Unexpected trailing token '{token}'")]
    TrailingToken { token: String },

    #[error("Unknown identifier '{}'", format_ident(.namespace, .name))]
    UnknownIdentifier {
        namespace: Option<String>,
        name: String,
    },

    #[error("Unknown function '{}'", format_ident(.namespace, .name))]
    UnknownFunction {
        namespace: Option<String>,
        name: String,
    },

    /// Macro expansion nested deeper than the tokenizer allows.
    #[error("Macro '{name}' expands too deeply")]
    MacroDepth { name: String },
}
