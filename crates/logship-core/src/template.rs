//! Description templates with `#{ ... }` placeholders.
//!
//! A placeholder holds a small expression over named bindings:
//!
//! - `#name` references a binding (`#order_id`, `#result`, `#args`)
//! - `.field` and `?.field` access object members, the latter yielding
//!   null instead of failing on a null receiver
//! - `[0]` and `['key']` index arrays and objects
//! - string, number, `true`, `false` and `null` literals
//! - `+` adds two numbers or concatenates anything else
//!
//! Resolution never fails: on any error the template comes back as-is.

use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::error::{Error, Result};
use crate::logging;

/// Marker opening a placeholder.
pub const PLACEHOLDER_START: &str = "#{";

/// Binding holding every argument as an array.
pub const ARGS: &str = "args";
/// Binding holding the return value.
pub const RESULT: &str = "result";
/// Binding holding the error as `{ "message": ... }`.
pub const EXCEPTION: &str = "exception";
/// Binding holding the error message text.
pub const EXCEPTION_MESSAGE: &str = "exceptionMessage";
pub const METHOD_NAME: &str = "methodName";
pub const CLASS_NAME: &str = "className";
/// Epoch milliseconds captured when the bindings were built.
pub const CURRENT_TIME: &str = "currentTime";
/// `YYYY-MM-DD HH:MM:SS` captured when the bindings were built.
pub const CURRENT_TIME_STR: &str = "currentTimeStr";

#[derive(Debug, Error, PartialEq)]
enum TemplateError {
    #[error("unterminated placeholder at byte {0}")]
    Unterminated(usize),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unknown variable: #{0}")]
    UnknownVariable(String),
    #[error("no member '{0}'")]
    UnknownMember(String),
    #[error("null receiver for '{0}'")]
    NullAccess(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
}

/// Named values visible to placeholder expressions.
#[derive(Debug, Clone)]
pub struct Bindings {
    values: HashMap<String, Value>,
}

impl Default for Bindings {
    fn default() -> Self {
        Self::new()
    }
}

impl Bindings {
    /// Bindings holding only the time helpers, captured now.
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Bindings whose time helpers are captured at `now`.
    pub fn at(now: DateTime<Utc>) -> Self {
        let mut values = HashMap::new();
        values.insert(CURRENT_TIME.to_string(), Value::from(now.timestamp_millis()));
        values.insert(
            CURRENT_TIME_STR.to_string(),
            Value::String(now.format("%Y-%m-%d %H:%M:%S").to_string()),
        );
        Self { values }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    /// Bind each argument by name plus all of them as `args`.
    pub fn with_arguments(mut self, arguments: &[(String, Value)]) -> Self {
        let all = arguments.iter().map(|(_, v)| v.clone()).collect();
        for (name, value) in arguments {
            self.values.insert(name.clone(), value.clone());
        }
        self.values.insert(ARGS.to_string(), Value::Array(all));
        self
    }

    pub fn with_result(self, result: Value) -> Self {
        self.with(RESULT, result)
    }

    pub fn with_error(mut self, message: &str) -> Self {
        let mut exception = Map::new();
        exception.insert("message".to_string(), Value::String(message.to_string()));
        self.values
            .insert(EXCEPTION.to_string(), Value::Object(exception));
        self.values.insert(
            EXCEPTION_MESSAGE.to_string(),
            Value::String(message.to_string()),
        );
        self
    }

    pub fn with_method(self, class_name: &str, method_name: &str) -> Self {
        self.with(CLASS_NAME, Value::String(class_name.to_string()))
            .with(METHOD_NAME, Value::String(method_name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

/// Resolve every placeholder, returning `template` unchanged on any failure.
pub fn resolve(template: &str, bindings: &Bindings) -> String {
    if !template.contains(PLACEHOLDER_START) {
        return template.to_string();
    }
    match render(template, bindings) {
        Ok(resolved) => resolved,
        Err(e) => {
            debug!(
                subsystem = logging::SUBSYSTEM_TEMPLATE,
                template,
                error = %e,
                "Template resolution failed, using raw template"
            );
            template.to_string()
        }
    }
}

/// Like [`resolve`] but reports the failure.
pub fn try_resolve(template: &str, bindings: &Bindings) -> Result<String> {
    if !template.contains(PLACEHOLDER_START) {
        return Ok(template.to_string());
    }
    render(template, bindings).map_err(|e| Error::TemplateResolution(e.to_string()))
}

fn render(template: &str, bindings: &Bindings) -> std::result::Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;

    while let Some(start) = rest.find(PLACEHOLDER_START) {
        out.push_str(&rest[..start]);
        let body_start = start + PLACEHOLDER_START.len();
        let body_len = closing_brace(&rest[body_start..])
            .ok_or(TemplateError::Unterminated(offset + start))?;
        let body = &rest[body_start..body_start + body_len];

        let expr = Parser::new(body).parse()?;
        let value = expr.eval(bindings)?;
        out.push_str(&display(&value));

        let consumed = body_start + body_len + 1;
        offset += consumed;
        rest = &rest[consumed..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Byte offset of the first `}` outside a quoted string.
fn closing_brace(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '}') => return Some(i),
            (None, _) => {}
        }
    }
    None
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Var(String),
    Literal(Value),
    Member {
        target: Box<Expr>,
        name: String,
        null_safe: bool,
    },
    Index(Box<Expr>, Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self, bindings: &Bindings) -> std::result::Result<Value, TemplateError> {
        match self {
            Expr::Var(name) => bindings
                .get(name)
                .cloned()
                .ok_or_else(|| TemplateError::UnknownVariable(name.clone())),
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Member {
                target,
                name,
                null_safe,
            } => match target.eval(bindings)? {
                Value::Null if *null_safe => Ok(Value::Null),
                Value::Null => Err(TemplateError::NullAccess(name.clone())),
                Value::Object(map) => map
                    .get(name)
                    .cloned()
                    .ok_or_else(|| TemplateError::UnknownMember(name.clone())),
                Value::Array(items) if name == "length" || name == "size" => {
                    Ok(Value::from(items.len()))
                }
                Value::String(s) if name == "length" => Ok(Value::from(s.chars().count())),
                other => Err(TemplateError::TypeMismatch(format!(
                    "cannot read '{}' of {}",
                    name, other
                ))),
            },
            Expr::Index(target, index) => {
                let target = target.eval(bindings)?;
                let index = index.eval(bindings)?;
                match (&target, &index) {
                    (Value::Array(items), Value::Number(n)) => n
                        .as_u64()
                        .and_then(|i| items.get(i as usize))
                        .cloned()
                        .ok_or_else(|| {
                            TemplateError::TypeMismatch(format!("index {} out of bounds", n))
                        }),
                    (Value::Object(map), Value::String(key)) => map
                        .get(key)
                        .cloned()
                        .ok_or_else(|| TemplateError::UnknownMember(key.clone())),
                    (Value::Null, _) => Err(TemplateError::NullAccess(display(&index))),
                    _ => Err(TemplateError::TypeMismatch(format!(
                        "cannot index {} with {}",
                        target, index
                    ))),
                }
            }
            Expr::Add(left, right) => {
                let left = left.eval(bindings)?;
                let right = right.eval(bindings)?;
                Ok(add(&left, &right))
            }
        }
    }
}

fn add(left: &Value, right: &Value) -> Value {
    if let (Value::Number(a), Value::Number(b)) = (left, right) {
        if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
            if let Some(sum) = x.checked_add(y) {
                return Value::from(sum);
            }
        }
        if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
            if let Some(n) = serde_json::Number::from_f64(x + y) {
                return Value::Number(n);
            }
        }
    }
    Value::String(format!("{}{}", display(left), display(right)))
}

struct Parser<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn parse(mut self) -> std::result::Result<Expr, TemplateError> {
        let expr = self.expr()?;
        self.skip_ws();
        match self.chars.next() {
            None => Ok(expr),
            Some(c) => Err(TemplateError::Parse(format!("unexpected '{}'", c))),
        }
    }

    fn skip_ws(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn expr(&mut self) -> std::result::Result<Expr, TemplateError> {
        let mut left = self.postfix()?;
        loop {
            self.skip_ws();
            if self.chars.peek() == Some(&'+') {
                self.chars.next();
                let right = self.postfix()?;
                left = Expr::Add(Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn postfix(&mut self) -> std::result::Result<Expr, TemplateError> {
        let mut expr = self.primary()?;
        loop {
            match self.chars.peek() {
                Some('.') => {
                    self.chars.next();
                    let name = self.ident()?;
                    expr = Expr::Member {
                        target: Box::new(expr),
                        name,
                        null_safe: false,
                    };
                }
                Some('?') => {
                    self.chars.next();
                    if self.chars.next() != Some('.') {
                        return Err(TemplateError::Parse("expected '.' after '?'".into()));
                    }
                    let name = self.ident()?;
                    expr = Expr::Member {
                        target: Box::new(expr),
                        name,
                        null_safe: true,
                    };
                }
                Some('[') => {
                    self.chars.next();
                    let index = self.expr()?;
                    self.skip_ws();
                    if self.chars.next() != Some(']') {
                        return Err(TemplateError::Parse("expected ']'".into()));
                    }
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> std::result::Result<Expr, TemplateError> {
        self.skip_ws();
        match self.chars.peek().copied() {
            Some('#') => {
                self.chars.next();
                Ok(Expr::Var(self.ident()?))
            }
            Some(q @ ('\'' | '"')) => {
                self.chars.next();
                let mut s = String::new();
                loop {
                    match self.chars.next() {
                        Some(c) if c == q => return Ok(Expr::Literal(Value::String(s))),
                        Some(c) => s.push(c),
                        None => return Err(TemplateError::Parse("unterminated string".into())),
                    }
                }
            }
            Some(c) if c.is_ascii_digit() => self.number(),
            Some('(') => {
                self.chars.next();
                let inner = self.expr()?;
                self.skip_ws();
                if self.chars.next() != Some(')') {
                    return Err(TemplateError::Parse("expected ')'".into()));
                }
                Ok(inner)
            }
            Some(c) if c.is_alphabetic() => match self.ident()?.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                other => Err(TemplateError::Parse(format!(
                    "bare identifier '{}', variables need '#'",
                    other
                ))),
            },
            Some(c) => Err(TemplateError::Parse(format!("unexpected '{}'", c))),
            None => Err(TemplateError::Parse("empty expression".into())),
        }
    }

    fn ident(&mut self) -> std::result::Result<String, TemplateError> {
        let mut name = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                name.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        if name.is_empty() {
            Err(TemplateError::Parse("expected identifier".into()))
        } else {
            Ok(name)
        }
    }

    fn number(&mut self) -> std::result::Result<Expr, TemplateError> {
        let mut text = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                text.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        text.parse::<serde_json::Number>()
            .map(|n| Expr::Literal(Value::Number(n)))
            .map_err(|_| TemplateError::Parse(format!("bad number '{}'", text)))
    }
}
