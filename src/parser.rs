//! Recursive-descent formula parser.
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := unary (('*' | '/' | '//' | '%') unary)*
//! unary  := ('+' | '-') unary | factor
//! factor := (NUMBER | ident ('(' args ')')? | '(' expr ')') ('.' IDENT)*
//! ident  := IDENT ('::' IDENT)?
//! ```

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::FormulaError;
use crate::token::{tokenize, Token};
use std::collections::BTreeMap;

/// Parse a formula, expanding `macros` during tokenization.
///
/// # Examples
///
/// ```rust
/// use buildscore::parser::parse;
/// use buildscore::ast::Expr;
/// use std::collections::BTreeMap;
///
/// let expr = parse("近战::暴击", &BTreeMap::new()).unwrap();
/// assert_eq!(
///     expr,
///     Expr::Property { namespace: Some("近战".into()), name: "暴击".into() }
/// );
/// assert!(parse("(10+20", &BTreeMap::new()).is_err());
/// ```
pub fn parse(input: &str, macros: &BTreeMap<String, String>) -> Result<Expr, FormulaError> {
    let tokens = tokenize(input, macros)?;
    if tokens.is_empty() {
        return Err(FormulaError::Empty);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expression()?;
    if let Some(token) = parser.peek() {
        return Err(FormulaError::TrailingToken {
            token: token.text(),
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    /// After a binary operator, the next token must be able to start an operand.
    fn require_operand(&self, operator: &str) -> Result<(), FormulaError> {
        match self.peek() {
            None | Some(Token::RParen) | Some(Token::Comma) => Err(FormulaError::MissingOperand {
                operator: operator.to_string(),
            }),
            Some(Token::Op(op)) if *op != "+" && *op != "-" => {
                Err(FormulaError::MissingOperand {
                    operator: operator.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn expression(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            self.require_operand(op)?;
            let rhs = self.term()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "//", "%"]) {
            self.require_operand(op)?;
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        if let Some(op) = self.eat_op(&["+", "-"]) {
            if self.peek().is_none() {
                return Err(FormulaError::MissingOperand {
                    operator: op.to_string(),
                });
            }
            let operand = self.unary()?;
            let op = if op == "-" { UnaryOp::Neg } else { UnaryOp::Plus };
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.factor()
    }

    fn factor(&mut self) -> Result<Expr, FormulaError> {
        let mut node = match self.advance() {
            Some(Token::Number(n)) => Expr::Number(n),
            Some(Token::Ident(first)) => self.identifier(first)?,
            Some(Token::LParen) => {
                let inner = self.expression()?;
                if !self.eat(&Token::RParen) {
                    return Err(FormulaError::Unterminated { expected: "')'" });
                }
                inner
            }
            Some(other) => {
                return Err(FormulaError::UnexpectedToken {
                    token: other.text(),
                })
            }
            None => return Err(FormulaError::Unterminated { expected: "operand" }),
        };

        while self.eat(&Token::Dot) {
            match self.advance() {
                Some(Token::Ident(member)) => {
                    node = Expr::Member {
                        object: Box::new(node),
                        member,
                    };
                }
                _ => {
                    return Err(FormulaError::Unterminated {
                        expected: "member name after '.'",
                    })
                }
            }
        }
        Ok(node)
    }

    fn identifier(&mut self, first: String) -> Result<Expr, FormulaError> {
        let (namespace, name) = if self.eat(&Token::DoubleColon) {
            match self.advance() {
                Some(Token::Ident(name)) => (Some(first), name),
                _ => {
                    return Err(FormulaError::Unterminated {
                        expected: "identifier after '::'",
                    })
                }
            }
        } else {
            (None, first)
        };

        if !self.eat(&Token::LParen) {
            return Ok(Expr::Property { namespace, name });
        }

        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.expression()?);
                if self.eat(&Token::Comma) {
                    continue;
                }
                if self.eat(&Token::RParen) {
                    break;
                }
                return Err(FormulaError::Unterminated {
                    expected: "')' after function arguments",
                });
            }
        }
        Ok(Expr::Call {
            namespace,
            name,
            args,
        })
    }
}

fn binary(symbol: &str, lhs: Expr, rhs: Expr) -> Expr {
    // The tokenizer only produces symbols BinaryOp knows.
    let op = BinaryOp::from_symbol(symbol).unwrap_or(BinaryOp::Add);
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(input: &str) -> Result<Expr, FormulaError> {
        parse(input, &BTreeMap::new())
    }

    #[test]
    fn test_precedence() {
        let expr = p("1 + 2 * 3").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Add, rhs, .. } => {
                assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty() {
        assert_eq!(p("   "), Err(FormulaError::Empty));
    }

    #[test]
    fn test_trailing_operator() {
        assert_eq!(
            p("attack +"),
            Err(FormulaError::MissingOperand {
                operator: "+".into()
            })
        );
        assert!(matches!(p("2 * / 3"), Err(FormulaError::MissingOperand { .. })));
    }

    #[test]
    fn test_unary_after_operator_is_allowed() {
        assert!(p("2 * -3").is_ok());
        assert!(p("--3").is_ok());
    }

    #[test]
    fn test_unterminated_group() {
        assert!(matches!(p("(10+20"), Err(FormulaError::Unterminated { .. })));
        assert!(matches!(p("max(1, 2"), Err(FormulaError::Unterminated { .. })));
    }

    #[test]
    fn test_trailing_token() {
        assert!(matches!(p("1 2"), Err(FormulaError::TrailingToken { .. })));
        assert!(matches!(p("(1))"), Err(FormulaError::TrailingToken { .. })));
    }

    #[test]
    fn test_namespaced_call_and_member_chain() {
        let expr = p("远程::max(伤害.暴击, 1)").unwrap();
        match expr {
            Expr::Call { namespace, name, args } => {
                assert_eq!(namespace.as_deref(), Some("远程"));
                assert_eq!(name, "max");
                assert!(matches!(&args[0], Expr::Member { member, .. } if member == "暴击"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_member_requires_name() {
        assert!(matches!(p("伤害."), Err(FormulaError::Unterminated { .. })));
    }
}
