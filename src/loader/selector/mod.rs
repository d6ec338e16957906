//! Path-selection expressions over JSON documents
//!
//! A small subset of the jq filter language, enough to pull record objects
//! out of nested datasets:
//!
//! - `.`, `.name`, `."quoted name"`, `.["name"]`, `.[0]`, `.[]` and chains of them
//! - `..` recursive descent
//! - `objects`, `arrays`, `strings`, `numbers`, `booleans`, `nulls`, `values`
//! - `select(cond)` with optional `==` / `!=` comparisons
//! - `a | b` and `a, b`, with parentheses for grouping
//!
//! ```
//! use triage_rag::loader::selector::Selector;
//!
//! let selector = Selector::parse(".[] | .Emergency[], .Urgent[]").unwrap();
//! let data = serde_json::json!({"Calgary": {"Emergency": [{"name": "Rockyview"}]}});
//! assert_eq!(selector.evaluate(&data).unwrap().len(), 1);
//! ```


use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("Empty selector expression")]
    Empty,
    #[error("Unexpected character '{found}' at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },
    #[error("Unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },
    #[error("Invalid number '{literal}' at offset {offset}")]
    InvalidNumber { literal: String, offset: usize },
    #[error("Expected {expected} at offset {offset}")]
    Expected {
        expected: &'static str,
        offset: usize,
    },
    #[error("Unexpected end of expression, expected {expected}")]
    UnexpectedEnd { expected: &'static str },
    #[error("Unknown function '{name}' at offset {offset}")]
    UnknownFunction { name: String, offset: usize },
    #[error("Cannot iterate over {kind}")]
    CannotIterate { kind: &'static str },
    #[error("Cannot index {kind} with {key}")]
    CannotIndex { kind: &'static str, key: String },
}

/// A parsed selector expression
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    source: String,
    filter: Filter,
}

impl Selector {
    #[inline]
    pub fn parse(expression: &str) -> Result<Self, SelectorError> {
        let tokens = lex(expression)?;
        if tokens.is_empty() {
            return Err(SelectorError::Empty);
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            input_len: expression.len(),
        };
        let filter = parser.parse_pipe()?;

        if let Some(token) = parser.tokens.get(parser.pos) {
            return Err(SelectorError::Expected {
                expected: "'|', ',' or end of expression",
                offset: token.offset,
            });
        }

        Ok(Self {
            source: expression.trim().to_string(),
            filter,
        })
    }

    /// Run the selector against `input`, returning every output value in order
    #[inline]
    pub fn evaluate(&self, input: &Value) -> Result<Vec<Value>, SelectorError> {
        let mut outputs = Vec::new();
        self.filter.eval(input, &mut outputs)?;
        Ok(outputs)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Objects,
    Arrays,
    Strings,
    Numbers,
    Booleans,
    Nulls,
    Values,
}

impl ValueKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "objects" => Some(Self::Objects),
            "arrays" => Some(Self::Arrays),
            "strings" => Some(Self::Strings),
            "numbers" => Some(Self::Numbers),
            "booleans" => Some(Self::Booleans),
            "nulls" => Some(Self::Nulls),
            "values" => Some(Self::Values),
            _ => None,
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            Self::Objects => value.is_object(),
            Self::Arrays => value.is_array(),
            Self::Strings => value.is_string(),
            Self::Numbers => value.is_number(),
            Self::Booleans => value.is_boolean(),
            Self::Nulls => value.is_null(),
            Self::Values => !value.is_null(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, PartialEq)]
enum Filter {
    Identity,
    Recurse,
    Literal(Value),
    Field(Box<Filter>, String),
    Index(Box<Filter>, i64),
    Iterate(Box<Filter>),
    Pipe(Box<Filter>, Box<Filter>),
    Comma(Box<Filter>, Box<Filter>),
    Select(Box<Filter>),
    Kind(ValueKind),
    Compare(Box<Filter>, Comparison, Box<Filter>),
}

impl Filter {
    fn eval(&self, input: &Value, out: &mut Vec<Value>) -> Result<(), SelectorError> {
        match self {
            Self::Identity => out.push(input.clone()),
            Self::Recurse => recurse(input, out),
            Self::Literal(value) => out.push(value.clone()),
            Self::Field(base, name) => {
                for value in base.outputs(input)? {
                    out.push(field(&value, name)?);
                }
            }
            Self::Index(base, index) => {
                for value in base.outputs(input)? {
                    out.push(index_value(&value, *index)?);
                }
            }
            Self::Iterate(base) => {
                for value in base.outputs(input)? {
                    iterate(value, out)?;
                }
            }
            Self::Pipe(lhs, rhs) => {
                for value in lhs.outputs(input)? {
                    rhs.eval(&value, out)?;
                }
            }
            Self::Comma(lhs, rhs) => {
                lhs.eval(input, out)?;
                rhs.eval(input, out)?;
            }
            Self::Select(condition) => {
                for value in condition.outputs(input)? {
                    if is_truthy(&value) {
                        out.push(input.clone());
                    }
                }
            }
            Self::Kind(kind) => {
                if kind.matches(input) {
                    out.push(input.clone());
                }
            }
            Self::Compare(lhs, comparison, rhs) => {
                let rights = rhs.outputs(input)?;
                for left in lhs.outputs(input)? {
                    for right in &rights {
                        let equal = values_equal(&left, right);
                        out.push(Value::Bool(match comparison {
                            Comparison::Equal => equal,
                            Comparison::NotEqual => !equal,
                        }));
                    }
                }
            }
        }
        Ok(())
    }

    fn outputs(&self, input: &Value) -> Result<Vec<Value>, SelectorError> {
        let mut out = Vec::new();
        self.eval(input, &mut out)?;
        Ok(out)
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn recurse(value: &Value, out: &mut Vec<Value>) {
    out.push(value.clone());
    match value {
        Value::Array(items) => items.iter().for_each(|item| recurse(item, out)),
        Value::Object(map) => map.values().for_each(|item| recurse(item, out)),
        _ => {}
    }
}

fn field(value: &Value, name: &str) -> Result<Value, SelectorError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
        other => Err(SelectorError::CannotIndex {
            kind: kind_name(other),
            key: format!("\"{}\"", name),
        }),
    }
}

fn index_value(value: &Value, index: i64) -> Result<Value, SelectorError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Array(items) => {
            let resolved = if index < 0 {
                i64::try_from(items.len())
                    .ok()
                    .and_then(|len| usize::try_from(len + index).ok())
            } else {
                usize::try_from(index).ok()
            };
            Ok(resolved
                .and_then(|i| items.get(i))
                .cloned()
                .unwrap_or(Value::Null))
        }
        other => Err(SelectorError::CannotIndex {
            kind: kind_name(other),
            key: index.to_string(),
        }),
    }
}

fn iterate(value: Value, out: &mut Vec<Value>) -> Result<(), SelectorError> {
    match value {
        Value::Null => Ok(()),
        Value::Array(items) => {
            out.extend(items);
            Ok(())
        }
        Value::Object(map) => {
            out.extend(map.into_iter().map(|(_, v)| v));
            Ok(())
        }
        other => Err(SelectorError::CannotIterate {
            kind: kind_name(&other),
        }),
    }
}

fn number_literal(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
            _ => x == y,
        },
        _ => a == b,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Dot,
    DotDot,
    Ident(String),
    Str(String),
    Number(f64),
    LBracket,
    RBracket,
    LParen,
    RParen,
    Pipe,
    Comma,
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
struct Spanned {
    token: Token,
    offset: usize,
}

fn lex(input: &str) -> Result<Vec<Spanned>, SelectorError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while let Some(&(offset, c)) = chars.get(i) {
        let next = chars.get(i + 1).map(|&(_, c)| c);
        let single = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '.' if next == Some('.') => {
                i += 2;
                tokens.push(Spanned {
                    token: Token::DotDot,
                    offset,
                });
                continue;
            }
            '.' => Some(Token::Dot),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '|' => Some(Token::Pipe),
            ',' => Some(Token::Comma),
            '=' | '!' => {
                if next != Some('=') {
                    return Err(SelectorError::UnexpectedChar { found: c, offset });
                }
                i += 2;
                tokens.push(Spanned {
                    token: if c == '=' { Token::Eq } else { Token::Ne },
                    offset,
                });
                continue;
            }
            _ => None,
        };

        if let Some(token) = single {
            tokens.push(Spanned { token, offset });
            i += 1;
            continue;
        }

        if c == '"' {
            let (value, consumed) = lex_string(&chars[i..], offset)?;
            tokens.push(Spanned {
                token: Token::Str(value),
                offset,
            });
            i += consumed;
        } else if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) {
            let mut literal = String::from(c);
            i += 1;
            let mut seen_point = false;
            while let Some(&(_, d)) = chars.get(i) {
                let after = chars.get(i + 1).map(|&(_, c)| c);
                if d.is_ascii_digit() {
                    literal.push(d);
                } else if d == '.' && !seen_point && after.is_some_and(|a| a.is_ascii_digit()) {
                    seen_point = true;
                    literal.push(d);
                } else {
                    break;
                }
                i += 1;
            }
            let number = literal
                .parse::<f64>()
                .map_err(|_| SelectorError::InvalidNumber {
                    literal: literal.clone(),
                    offset,
                })?;
            tokens.push(Spanned {
                token: Token::Number(number),
                offset,
            });
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&(_, d)) = chars.get(i) {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    i += 1;
                } else {
                    break;
                }
            }
            tokens.push(Spanned {
                token: Token::Ident(ident),
                offset,
            });
        } else {
            return Err(SelectorError::UnexpectedChar { found: c, offset });
        }
    }

    Ok(tokens)
}

/// Lex a double-quoted string; `chars` starts at the opening quote
fn lex_string(chars: &[(usize, char)], offset: usize) -> Result<(String, usize), SelectorError> {
    let mut value = String::new();
    let mut i = 1;

    while let Some(&(_, c)) = chars.get(i) {
        match c {
            '"' => return Ok((value, i + 1)),
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .map(|&(_, e)| e)
                    .ok_or(SelectorError::UnterminatedString { offset })?;
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                i += 2;
            }
            other => {
                value.push(other);
                i += 1;
            }
        }
    }

    Err(SelectorError::UnterminatedString { offset })
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    input_len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.input_len, |s| s.offset)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, expected: &'static str) -> SelectorError {
        if self.pos >= self.tokens.len() {
            SelectorError::UnexpectedEnd { expected }
        } else {
            SelectorError::Expected {
                expected,
                offset: self.offset(),
            }
        }
    }

    fn expect(&mut self, token: &Token, expected: &'static str) -> Result<(), SelectorError> {
        if self.peek() == Some(token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(expected))
        }
    }

    fn parse_pipe(&mut self) -> Result<Filter, SelectorError> {
        let mut filter = self.parse_comma()?;
        while self.peek() == Some(&Token::Pipe) {
            self.pos += 1;
            let rhs = self.parse_comma()?;
            filter = Filter::Pipe(Box::new(filter), Box::new(rhs));
        }
        Ok(filter)
    }

    fn parse_comma(&mut self) -> Result<Filter, SelectorError> {
        let mut filter = self.parse_compare()?;
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            let rhs = self.parse_compare()?;
            filter = Filter::Comma(Box::new(filter), Box::new(rhs));
        }
        Ok(filter)
    }

    fn parse_compare(&mut self) -> Result<Filter, SelectorError> {
        let lhs = self.parse_postfix()?;
        let comparison = match self.peek() {
            Some(Token::Eq) => Comparison::Equal,
            Some(Token::Ne) => Comparison::NotEqual,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_postfix()?;
        Ok(Filter::Compare(Box::new(lhs), comparison, Box::new(rhs)))
    }

    fn parse_postfix(&mut self) -> Result<Filter, SelectorError> {
        let mut filter = self.parse_primary()?;

        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let Some(Token::Ident(name) | Token::Str(name)) = self.peek().cloned() else {
                        return Err(self.error("field name after '.'"));
                    };
                    self.pos += 1;
                    filter = Filter::Field(Box::new(filter), name);
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    filter = self.parse_bracket(filter)?;
                }
                _ => return Ok(filter),
            }
        }
    }

    /// Parse the inside of `[...]` after the opening bracket
    fn parse_bracket(&mut self, base: Filter) -> Result<Filter, SelectorError> {
        let base = Box::new(base);
        let filter = match self.peek().cloned() {
            Some(Token::RBracket) => {
                self.pos += 1;
                return Ok(Filter::Iterate(base));
            }
            Some(Token::Number(n)) => {
                if n.fract() != 0.0 {
                    return Err(SelectorError::InvalidNumber {
                        literal: n.to_string(),
                        offset: self.offset(),
                    });
                }
                self.pos += 1;
                Filter::Index(base, n as i64)
            }
            Some(Token::Str(name)) => {
                self.pos += 1;
                Filter::Field(base, name)
            }
            _ => return Err(self.error("']', an index or a quoted field name")),
        };
        self.expect(&Token::RBracket, "']'")?;
        Ok(filter)
    }

    fn parse_primary(&mut self) -> Result<Filter, SelectorError> {
        let Some(spanned) = self.advance() else {
            return Err(SelectorError::UnexpectedEnd {
                expected: "a filter",
            });
        };

        match spanned.token {
            Token::Dot => match self.peek().cloned() {
                Some(Token::Ident(name) | Token::Str(name)) => {
                    self.pos += 1;
                    Ok(Filter::Field(Box::new(Filter::Identity), name))
                }
                _ => Ok(Filter::Identity),
            },
            Token::DotDot => Ok(Filter::Recurse),
            Token::Str(value) => Ok(Filter::Literal(Value::String(value))),
            Token::Number(n) => Ok(Filter::Literal(number_literal(n))),
            Token::LParen => {
                let inner = self.parse_pipe()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Ident(name) => self.parse_builtin(&name, spanned.offset),
            _ => {
                self.pos -= 1;
                Err(self.error("a filter"))
            }
        }
    }

    fn parse_builtin(&mut self, name: &str, offset: usize) -> Result<Filter, SelectorError> {
        match name {
            "null" => Ok(Filter::Literal(Value::Null)),
            "true" => Ok(Filter::Literal(Value::Bool(true))),
            "false" => Ok(Filter::Literal(Value::Bool(false))),
            "select" => {
                self.expect(&Token::LParen, "'(' after select")?;
                let condition = self.parse_pipe()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(Filter::Select(Box::new(condition)))
            }
            other => ValueKind::from_name(other).map(Filter::Kind).ok_or_else(|| {
                SelectorError::UnknownFunction {
                    name: other.to_string(),
                    offset,
                }
            }),
        }
    }
}
