//! Formula tokenizer.
//!
//! Identifiers accept letters of any script, digits after the first
//! character, `_`, and the bracket characters used by tagged names such as
//! `[幻象]伤害`. Identifiers found in the macro table are replaced by their
//! expansion, wrapped in parentheses, at tokenization time.

use crate::error::FormulaError;
use std::collections::BTreeMap;

/// Nested macro expansions beyond this depth are rejected.
const MAX_MACRO_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Ident(String),
    /// `+ - * / // %`
    Op(&'static str),
    Dot,
    DoubleColon,
    LParen,
    RParen,
    Comma,
}

impl Token {
    /// Source text of the token, for error messages.
    pub fn text(&self) -> String {
        match self {
            Token::Number(n) => n.to_string(),
            Token::Ident(s) => s.clone(),
            Token::Op(op) => op.to_string(),
            Token::Dot => ".".into(),
            Token::DoubleColon => "::".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Comma => ",".into(),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '['
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '[' || c == ']'
}

/// Tokenize `input`, expanding macros.
///
/// A macro is not expanded again inside its own expansion, so a macro that
/// mentions its own name yields that name as a plain identifier.
///
/// # Examples
///
/// ```rust
/// use buildscore::token::{tokenize, Token};
/// use std::collections::BTreeMap;
///
/// let mut macros = BTreeMap::new();
/// macros.insert("DPA".to_string(), "伤害".to_string());
/// let tokens = tokenize("DPA * 2", &macros).unwrap();
/// assert_eq!(tokens[1], Token::Ident("伤害".into()));
/// assert_eq!(tokens.len(), 5);
/// ```
pub fn tokenize(input: &str, macros: &BTreeMap<String, String>) -> Result<Vec<Token>, FormulaError> {
    let mut out = Vec::new();
    let mut active = Vec::new();
    tokenize_into(input, macros, &mut active, &mut out)?;
    Ok(out)
}

fn tokenize_into(
    input: &str,
    macros: &BTreeMap<String, String>,
    active: &mut Vec<String>,
    out: &mut Vec<Token>,
) -> Result<(), FormulaError> {
    let chars: Vec<char> = input.chars().collect();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
                pos += 1;
            }
            let text: String = chars[start..pos].iter().collect();
            let value = parse_number(&text).ok_or(FormulaError::UnexpectedToken { token: text })?;
            out.push(Token::Number(value));
            continue;
        }

        if is_ident_start(c) {
            let start = pos;
            while pos < chars.len() && is_ident_char(chars[pos]) {
                pos += 1;
            }
            let name: String = chars[start..pos].iter().collect();
            match macros.get(&name) {
                Some(expansion) if !active.contains(&name) => {
                    if active.len() >= MAX_MACRO_DEPTH {
                        return Err(FormulaError::MacroDepth { name });
                    }
                    active.push(name);
                    out.push(Token::LParen);
                    tokenize_into(expansion, macros, active, out)?;
                    out.push(Token::RParen);
                    active.pop();
                }
                _ => out.push(Token::Ident(name)),
            }
            continue;
        }

        let next = chars.get(pos + 1).copied();
        let (token, width) = match c {
            '/' if next == Some('/') => (Token::Op("//"), 2),
            '/' => (Token::Op("/"), 1),
            '%' => (Token::Op("%"), 1),
            '+' => (Token::Op("+"), 1),
            '-' => (Token::Op("-"), 1),
            '*' => (Token::Op("*"), 1),
            '.' => (Token::Dot, 1),
            ':' if next == Some(':') => (Token::DoubleColon, 2),
            ':' => return Err(FormulaError::SingleColon { position: pos }),
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            ',' => (Token::Comma, 1),
            other => {
                return Err(FormulaError::UnexpectedChar {
                    ch: other,
                    position: pos,
                })
            }
        };
        out.push(token);
        pos += width;
    }
    Ok(())
}

/// Parse a numeric literal; trailing garbage after a second `.` is ignored
/// the way a lenient float reader would.
fn parse_number(text: &str) -> Option<f64> {
    if let Ok(v) = text.parse::<f64>() {
        return Some(v);
    }
    let mut seen_dot = false;
    let prefix: String = text
        .chars()
        .take_while(|c| {
            if *c == '.' {
                if seen_dot {
                    return false;
                }
                seen_dot = true;
            }
            true
        })
        .collect();
    prefix.trim_end_matches('.').parse::<f64>().ok()
}
