//! Parameter expressions and the fragment emission seam
//!
//! Item coordinates and parameter values are either plain numbers or short
//! arithmetic expressions that reference graph parameters as `$name` (or
//! `$scope.name` for parameters owned by a composite). Expressions are
//! tokenized rather than pattern-matched, so a reference is always read with
//! maximal munch: `$len` never matches inside `$length`.

use crate::item::ItemId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A numeric value or a textual expression over graph parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expr {
    Number(f64),
    Text(String),
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Number(value)
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Expr::Number(value as f64)
    }
}

impl From<&str> for Expr {
    fn from(text: &str) -> Self {
        Expr::Text(text.to_string())
    }
}

impl From<String> for Expr {
    fn from(text: String) -> Self {
        Expr::Text(text)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(value) => write!(f, "{}", value),
            Expr::Text(text) => f.write_str(text),
        }
    }
}

/// Builds a coordinate triple from anything convertible to an expression
pub fn vec3(x: impl Into<Expr>, y: impl Into<Expr>, z: impl Into<Expr>) -> [Expr; 3] {
    [x.into(), y.into(), z.into()]
}

/// Errors raised while turning an item or parameter into program text
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FragmentError {
    #[error("unknown parameter ${0}")]
    UnknownParameter(String),

    #[error("unknown sub-geometry {0}")]
    UnknownItem(String),

    #[error("invalid expression `{expr}`: {reason}")]
    InvalidExpression { expr: String, reason: String },

    #[error("cyclic dependency through {0}")]
    Cycle(String),
}

impl FragmentError {
    fn invalid(expr: &str, reason: impl Into<String>) -> Self {
        FragmentError::InvalidExpression {
            expr: expr.to_string(),
            reason: reason.into(),
        }
    }
}

/// Naming context handed to items while they emit their fragment.
///
/// The program generator implements this with its symbol tables; the graph
/// model only ever asks for names, it never invents them.
pub trait FragmentContext {
    /// Program identifier bound to a `$` parameter reference
    fn parameter(&self, name: &str) -> Result<String, FragmentError>;

    /// Program identifier holding the shape built for an item
    fn variable(&self, item: &ItemId) -> Result<String, FragmentError>;
}

/// Math functions an expression may call. Anything else, including the
/// program's own callbacks, is rejected before it reaches the sandbox.
pub const FUNCTIONS: &[&str] = &[
    "abs", "sqrt", "exp", "ln", "log", "floor", "ceiling", "round", "sin", "cos", "tan", "asin", "acos", "atan",
    "sinh", "cosh", "tanh", "hypot", "min", "max", "PI", "E",
];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Reference(String),
    Function(String),
    Operator(char),
    Open,
    Close,
    Comma,
}

impl Expr {
    /// Emits the expression as program text, resolving parameter references
    pub fn emit(&self, ctx: &dyn FragmentContext) -> Result<String, FragmentError> {
        match self {
            Expr::Number(value) => format_number(*value)
                .ok_or_else(|| FragmentError::invalid(&value.to_string(), "not a finite number")),
            Expr::Text(text) => {
                let tokens = tokenize(text)?;
                validate(text, &tokens)?;
                render(&tokens, ctx)
            }
        }
    }

    /// Whether evaluating the expression calls a function. Function calls can
    /// fail at run time (wrong arity); plain arithmetic on numbers cannot.
    pub fn calls_functions(&self) -> bool {
        match self {
            Expr::Number(_) => false,
            Expr::Text(text) => tokenize(text)
                .map(|tokens| tokens.iter().any(|token| matches!(token, Token::Function(_))))
                .unwrap_or(false),
        }
    }

    /// Names of every parameter the expression references, in order
    pub fn references(&self) -> Vec<String> {
        match self {
            Expr::Number(_) => Vec::new(),
            Expr::Text(text) => tokenize(text)
                .map(|tokens| {
                    tokens
                        .into_iter()
                        .filter_map(|token| match token {
                            Token::Reference(name) => Some(name),
                            _ => None,
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// Emits `[x, y, z]`
pub fn emit_vector(vector: &[Expr; 3], ctx: &dyn FragmentContext) -> Result<String, FragmentError> {
    Ok(format!(
        "[{}, {}, {}]",
        vector[0].emit(ctx)?,
        vector[1].emit(ctx)?,
        vector[2].emit(ctx)?
    ))
}

/// Formats a number as a float literal (`10` becomes `10.0`)
pub fn format_number(value: f64) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    let text = value.to_string();
    if text.contains('.') {
        Some(text)
    } else {
        Some(format!("{}.0", text))
    }
}

/// Quotes a string as a program string literal
pub fn quote_literal(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

fn tokenize(text: &str) -> Result<Vec<Token>, FragmentError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '$' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_reference_char(chars[end]) {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                if name.is_empty() || name.starts_with('.') || name.ends_with('.') {
                    return Err(FragmentError::invalid(text, "malformed parameter reference"));
                }
                tokens.push(Token::Reference(name));
                i = end;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent: e/E, optional sign, at least one digit
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        while j < chars.len() && chars[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| FragmentError::invalid(text, format!("bad number `{}`", literal)))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Function(chars[start..i].iter().collect()));
            }
            '+' | '-' | '*' | '/' | '%' => {
                tokens.push(Token::Operator(c));
                i += 1;
            }
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            c if c.is_whitespace() => i += 1,
            other => {
                return Err(FragmentError::invalid(text, format!("unexpected character `{}`", other)));
            }
        }
    }

    Ok(tokens)
}

fn is_reference_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Checks operand/operator alternation and parenthesis balance so a bad
/// expression fails its own item instead of the whole program.
fn validate(text: &str, tokens: &[Token]) -> Result<(), FragmentError> {
    if tokens.is_empty() {
        return Err(FragmentError::invalid(text, "empty expression"));
    }

    let mut expect_operand = true;
    let mut depth = 0usize;

    for (index, token) in tokens.iter().enumerate() {
        match (expect_operand, token) {
            (true, Token::Number(_)) | (true, Token::Reference(_)) => expect_operand = false,
            (true, Token::Function(name)) => {
                if tokens.get(index + 1) != Some(&Token::Open) {
                    return Err(FragmentError::invalid(text, format!("bare identifier `{}`", name)));
                }
                if !FUNCTIONS.contains(&name.as_str()) {
                    return Err(FragmentError::invalid(text, format!("unknown function `{}`", name)));
                }
            }
            (true, Token::Open) => depth += 1,
            (true, Token::Operator('+')) | (true, Token::Operator('-')) => {}
            (false, Token::Operator(_)) => expect_operand = true,
            (false, Token::Close) => {
                if depth == 0 {
                    return Err(FragmentError::invalid(text, "unbalanced `)`"));
                }
                depth -= 1;
            }
            (false, Token::Comma) if depth > 0 => expect_operand = true,
            _ => return Err(FragmentError::invalid(text, "unexpected token")),
        }
    }

    if expect_operand {
        return Err(FragmentError::invalid(text, "expression ends with an operator"));
    }
    if depth != 0 {
        return Err(FragmentError::invalid(text, "unbalanced `(`"));
    }
    Ok(())
}

fn render(tokens: &[Token], ctx: &dyn FragmentContext) -> Result<String, FragmentError> {
    let mut out = String::new();
    let mut previous: Option<&Token> = None;

    for token in tokens {
        let glued = matches!(previous, None | Some(Token::Function(_)) | Some(Token::Open))
            || matches!(token, Token::Close | Token::Comma);
        if !glued {
            out.push(' ');
        }
        match token {
            Token::Number(value) => match format_number(*value) {
                Some(literal) => out.push_str(&literal),
                None => return Err(FragmentError::invalid(&value.to_string(), "not a finite number")),
            },
            Token::Reference(name) => out.push_str(&ctx.parameter(name)?),
            Token::Function(name) => out.push_str(name),
            Token::Operator(op) => out.push(*op),
            Token::Open => out.push('('),
            Token::Close => out.push(')'),
            Token::Comma => out.push(','),
        }
        previous = Some(token);
    }

    Ok(out)
}
