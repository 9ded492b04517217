//! Sandboxed boolean expression evaluation for transition gates, validators,
//! and conditional actions.
//!
//! Expressions are parsed into a small AST (literals, variable references,
//! comparisons, logical and/or/not) by a hand-written lexer and recursive
//! descent parser, then interpreted directly against the run's variable map.
//! No host-language code is ever executed.
//!
//! An unresolved variable evaluates to the `undefined` token rather than
//! raising an error, so gate conditions fail closed.

use std::collections::HashMap;

use serde_json::Value;

use super::context::interpolate_expression;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while parsing an expression.
#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    #[error("empty expression")]
    Empty,

    #[error("parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },
}

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

/// A parsed boolean expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// Bare identifier resolved from the variable map at evaluation time.
    Variable(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare {
        op: CompareOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

/// Literal expression values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Undefined,
    Bool(bool),
    Number(f64),
    String(String),
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

// ---------------------------------------------------------------------------
// Evaluated values
// ---------------------------------------------------------------------------

/// Result of evaluating an expression node.
///
/// `Undefined` is a first-class value: it is what an unresolved variable
/// evaluates to, and the only thing it compares equal to is itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluated {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Arrays and objects pulled from the variable map.
    Json(Value),
}

impl Evaluated {
    fn from_variable(value: &Value) -> Self {
        match value {
            Value::Null => Evaluated::Null,
            Value::Bool(b) => Evaluated::Bool(*b),
            Value::Number(n) => Evaluated::Number(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => Evaluated::String(s.clone()),
            other => Evaluated::Json(other.clone()),
        }
    }

    /// JavaScript-like truthiness: false/null/undefined/0/"" are falsy,
    /// arrays and objects are truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Evaluated::Undefined | Evaluated::Null => false,
            Evaluated::Bool(b) => *b,
            Evaluated::Number(n) => *n != 0.0,
            Evaluated::String(s) => !s.is_empty(),
            Evaluated::Json(_) => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    String(String),
    Ident(String),
    True,
    False,
    Null,
    Undefined,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ExpressionError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                tokens.push((i, Token::LParen));
                i += 1;
            }
            ')' => {
                tokens.push((i, Token::RParen));
                i += 1;
            }
            '&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    tokens.push((i, Token::And));
                    i += 2;
                } else {
                    return Err(ExpressionError::Parse {
                        offset: i,
                        message: "expected '&&'".to_string(),
                    });
                }
            }
            '|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    tokens.push((i, Token::Or));
                    i += 2;
                } else {
                    return Err(ExpressionError::Parse {
                        offset: i,
                        message: "expected '||'".to_string(),
                    });
                }
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push((i, Token::Eq));
                    i += 2;
                } else {
                    return Err(ExpressionError::Parse {
                        offset: i,
                        message: "expected '==' (assignment is not supported)".to_string(),
                    });
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push((i, Token::Ne));
                    i += 2;
                } else {
                    tokens.push((i, Token::Not));
                    i += 1;
                }
            }
            '<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push((i, Token::Le));
                    i += 2;
                } else {
                    tokens.push((i, Token::Lt));
                    i += 1;
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push((i, Token::Ge));
                    i += 2;
                } else {
                    tokens.push((i, Token::Gt));
                    i += 1;
                }
            }
            '\'' | '"' => {
                let (string, next) = lex_string(input, i, c)?;
                tokens.push((i, Token::String(string)));
                i = next;
            }
            '-' => {
                if bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit()) {
                    let (number, next) = lex_number(input, i)?;
                    tokens.push((i, Token::Number(number)));
                    i = next;
                } else {
                    return Err(ExpressionError::Parse {
                        offset: i,
                        message: "unexpected '-'".to_string(),
                    });
                }
            }
            _ if c.is_ascii_digit() => {
                let (number, next) = lex_number(input, i)?;
                tokens.push((i, Token::Number(number)));
                i = next;
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len()
                    && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
                let word = &input[start..i];
                let token = match word {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "undefined" => Token::Undefined,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Ident(word.to_string()),
                };
                tokens.push((start, token));
            }
            other => {
                return Err(ExpressionError::Parse {
                    offset: i,
                    message: format!("unexpected character '{other}'"),
                });
            }
        }
    }

    Ok(tokens)
}

fn lex_string(input: &str, start: usize, quote: char) -> Result<(String, usize), ExpressionError> {
    let mut out = String::new();
    let mut chars = input[start + 1..].char_indices();

    while let Some((offset, c)) = chars.next() {
        if c == quote {
            return Ok((out, start + 1 + offset + quote.len_utf8()));
        }
        if c == '\\' {
            match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, escaped)) => out.push(escaped),
                None => break,
            }
        } else {
            out.push(c);
        }
    }

    Err(ExpressionError::Parse {
        offset: start,
        message: "unterminated string literal".to_string(),
    })
}

fn lex_number(input: &str, start: usize) -> Result<(f64, usize), ExpressionError> {
    let bytes = input.as_bytes();
    let mut i = start;
    if bytes[i] == b'-' {
        i += 1;
    }
    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
        i += 1;
    }
    input[start..i]
        .parse::<f64>()
        .map(|n| (n, i))
        .map_err(|_| ExpressionError::Parse {
            offset: start,
            message: format!("invalid number literal '{}'", &input[start..i]),
        })
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(o, _)| *o).unwrap_or(self.len)
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_comparison()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let rhs = self.parse_comparison()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let lhs = self.parse_unary()?;
        let op = match self.peek() {
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::Ne) => CompareOp::Ne,
            Some(Token::Lt) => CompareOp::Lt,
            Some(Token::Le) => CompareOp::Le,
            Some(Token::Gt) => CompareOp::Gt,
            Some(Token::Ge) => CompareOp::Ge,
            _ => return Ok(lhs),
        };
        self.next();
        let rhs = self.parse_unary()?;
        Ok(Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            let operand = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        let offset = self.offset();
        match self.next() {
            Some((_, Token::True)) => Ok(Expr::Literal(Literal::Bool(true))),
            Some((_, Token::False)) => Ok(Expr::Literal(Literal::Bool(false))),
            Some((_, Token::Null)) => Ok(Expr::Literal(Literal::Null)),
            Some((_, Token::Undefined)) => Ok(Expr::Literal(Literal::Undefined)),
            Some((_, Token::Number(n))) => Ok(Expr::Literal(Literal::Number(n))),
            Some((_, Token::String(s))) => Ok(Expr::Literal(Literal::String(s))),
            Some((_, Token::Ident(name))) => Ok(Expr::Variable(name)),
            Some((_, Token::LParen)) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some((_, Token::RParen)) => Ok(inner),
                    _ => Err(ExpressionError::Parse {
                        offset,
                        message: "expected ')'".to_string(),
                    }),
                }
            }
            Some((o, token)) => Err(ExpressionError::Parse {
                offset: o,
                message: format!("unexpected token {token:?}"),
            }),
            None => Err(ExpressionError::Parse {
                offset,
                message: "unexpected end of expression".to_string(),
            }),
        }
    }
}

/// Parse an expression string into an AST.
pub fn parse_expression(input: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ExpressionError::Empty);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        len: input.len(),
    };
    let expr = parser.parse_or()?;
    if let Some((offset, token)) = parser.next() {
        return Err(ExpressionError::Parse {
            offset,
            message: format!("trailing input after expression: {token:?}"),
        });
    }
    Ok(expr)
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Interpret an expression against the variable map.
pub fn evaluate(expr: &Expr, variables: &HashMap<String, Value>) -> Evaluated {
    match expr {
        Expr::Literal(literal) => match literal {
            Literal::Null => Evaluated::Null,
            Literal::Undefined => Evaluated::Undefined,
            Literal::Bool(b) => Evaluated::Bool(*b),
            Literal::Number(n) => Evaluated::Number(*n),
            Literal::String(s) => Evaluated::String(s.clone()),
        },
        Expr::Variable(name) => variables
            .get(name)
            .map(Evaluated::from_variable)
            .unwrap_or(Evaluated::Undefined),
        Expr::Not(operand) => Evaluated::Bool(!evaluate(operand, variables).is_truthy()),
        Expr::And(lhs, rhs) => {
            let left = evaluate(lhs, variables).is_truthy();
            Evaluated::Bool(left && evaluate(rhs, variables).is_truthy())
        }
        Expr::Or(lhs, rhs) => {
            let left = evaluate(lhs, variables).is_truthy();
            Evaluated::Bool(left || evaluate(rhs, variables).is_truthy())
        }
        Expr::Compare { op, lhs, rhs } => {
            let left = evaluate(lhs, variables);
            let right = evaluate(rhs, variables);
            Evaluated::Bool(compare(*op, &left, &right))
        }
    }
}

fn compare(op: CompareOp, left: &Evaluated, right: &Evaluated) -> bool {
    match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::Ne => !values_equal(left, right),
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
            ordered_compare(op, left, right)
        }
    }
}

fn values_equal(left: &Evaluated, right: &Evaluated) -> bool {
    match (left, right) {
        (Evaluated::Undefined, Evaluated::Undefined) => true,
        (Evaluated::Null, Evaluated::Null) => true,
        (Evaluated::Bool(a), Evaluated::Bool(b)) => a == b,
        (Evaluated::Number(a), Evaluated::Number(b)) => a == b,
        (Evaluated::String(a), Evaluated::String(b)) => a == b,
        (Evaluated::Json(a), Evaluated::Json(b)) => a == b,
        // Cross-type comparison is never equal.
        _ => false,
    }
}

/// Ordering is defined for number/number and string/string pairs only;
/// anything else (including `undefined`) compares false.
fn ordered_compare(op: CompareOp, left: &Evaluated, right: &Evaluated) -> bool {
    let ordering = match (left, right) {
        (Evaluated::Number(a), Evaluated::Number(b)) => a.partial_cmp(b),
        (Evaluated::String(a), Evaluated::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        CompareOp::Lt => ordering.is_lt(),
        CompareOp::Le => ordering.is_le(),
        CompareOp::Gt => ordering.is_gt(),
        CompareOp::Ge => ordering.is_ge(),
        CompareOp::Eq | CompareOp::Ne => unreachable!("handled in compare"),
    }
}

/// Parse and evaluate an expression, coercing the result to a boolean.
pub fn evaluate_bool(
    expression: &str,
    variables: &HashMap<String, Value>,
) -> Result<bool, ExpressionError> {
    let expr = parse_expression(expression)?;
    Ok(evaluate(&expr, variables).is_truthy())
}

/// Evaluate a gate condition as authored in a draft.
///
/// `{{identifier}}` placeholders are substituted with the JSON encoding of
/// the variable's value (unresolved placeholders become the `undefined`
/// token) before the result is parsed and evaluated.
pub fn evaluate_condition(
    expression: &str,
    variables: &HashMap<String, Value>,
) -> Result<bool, ExpressionError> {
    let interpolated = interpolate_expression(expression, variables);
    evaluate_bool(&interpolated, variables)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
