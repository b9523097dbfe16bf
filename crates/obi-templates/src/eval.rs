//! The expression-evaluation seam
//!
//! Directive expressions are opaque text to the scanner and compiler;
//! evaluation is pluggable through [`ExpressionEvaluator`]. The shipped
//! [`PathEvaluator`] covers literals, paths and simple comparisons, which
//! is enough for most templates; anything richer (function calls, user
//! helpers defined in `{{#code}}` blocks, arithmetic) belongs to a
//! caller-supplied evaluator.

use serde_json::{Map, Value};

use crate::error::RenderError;
use crate::render::is_truthy;
use crate::scanner::is_identifier_byte;
use crate::scope::{Bindings, Scope};

/// Everything an evaluator may consult while evaluating one expression
pub struct EvalContext<'a> {
    /// The render model
    pub model: &'a Value,
    /// The caller-supplied context value
    pub context: &'a Value,
    /// The innermost iteration scope, if any
    pub scope: Option<&'a Scope<'a>>,
    /// Hoisted `{{#code}}` sources of the template being rendered
    pub preamble: &'a [String],
    pub(crate) bindings: Option<&'a Bindings<'a>>,
}

impl<'a> EvalContext<'a> {
    /// Looks up a name bound by an enclosing `#each` or `#with`
    pub fn binding(&self, name: &str) -> Option<&'a Value> {
        self.bindings.and_then(|b| b.lookup(name))
    }
}

/// Evaluates directive expression text against the render state
///
/// `eval` powers every expression position; `assign` is used only by
/// `{{#capture}}` to write the captured text back.
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluates `expr` to a value
    fn eval(&self, expr: &str, ctx: &EvalContext<'_>) -> Result<Value, RenderError>;

    /// Assigns `value` to the target expression, mutating the model
    fn assign(&self, target: &str, value: Value, model: &mut Value) -> Result<(), RenderError>;
}

/// The reference evaluator
///
/// Supports `null`/`true`/`false`, numbers, quoted strings, array
/// literals, parentheses, prefix `!`, `==`/`!=`, and paths of the form
/// `ident(.ident | [expr])*`. Path roots resolve in order: bound names
/// (innermost first), `model`, `context`, `scope` (with `index`, `first`,
/// `last`, `item`, `items` and `outer` chaining), and finally bare names
/// as model fields. Unresolved lookups yield null rather than erroring,
/// so missing fields render as empty output.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathEvaluator;

impl PathEvaluator {
    /// Creates the reference evaluator
    pub fn new() -> Self {
        PathEvaluator
    }
}

impl ExpressionEvaluator for PathEvaluator {
    fn eval(&self, expr: &str, ctx: &EvalContext<'_>) -> Result<Value, RenderError> {
        let mut parser = Parser {
            src: expr,
            pos: 0,
            ctx,
        };
        let result = (|| {
            let value = parser.parse_expression()?;
            parser.skip_ws();
            if parser.pos != parser.src.len() {
                return Err(format!("unexpected trailing input at offset {}", parser.pos));
            }
            Ok(value)
        })();
        result.map_err(|message| RenderError::Eval {
            expr: expr.to_string(),
            message,
        })
    }

    fn assign(&self, target: &str, value: Value, model: &mut Value) -> Result<(), RenderError> {
        let err = |message: String| RenderError::Assign {
            target: target.to_string(),
            message,
        };

        let mut segments = parse_target(target).map_err(&err)?;
        if segments.first() == Some(&Seg::Key("model".to_string())) {
            segments.remove(0);
        }
        let Some((last, init)) = segments.split_last() else {
            return Err(err("cannot assign to the model root".to_string()));
        };

        let mut cur = model;
        for seg in init {
            cur = match seg {
                Seg::Key(key) => {
                    if cur.is_null() {
                        *cur = Value::Object(Map::new());
                    }
                    cur.as_object_mut()
                        .ok_or_else(|| err("cannot assign through a non-object value".to_string()))?
                        .entry(key.clone())
                        .or_insert(Value::Null)
                }
                Seg::Index(i) => cur
                    .as_array_mut()
                    .ok_or_else(|| err("cannot index into a non-array value".to_string()))?
                    .get_mut(*i)
                    .ok_or_else(|| err(format!("index {i} is out of bounds")))?,
            };
        }
        match last {
            Seg::Key(key) => {
                if cur.is_null() {
                    *cur = Value::Object(Map::new());
                }
                cur.as_object_mut()
                    .ok_or_else(|| err("cannot assign through a non-object value".to_string()))?
                    .insert(key.clone(), value);
            }
            Seg::Index(i) => {
                let items = cur
                    .as_array_mut()
                    .ok_or_else(|| err("cannot index into a non-array value".to_string()))?;
                if *i < items.len() {
                    items[*i] = value;
                } else if *i == items.len() {
                    items.push(value);
                } else {
                    return Err(err(format!("index {i} is out of bounds")));
                }
            }
        }
        Ok(())
    }
}

/// One step of an assignment target path
#[derive(Debug, PartialEq, Eq)]
enum Seg {
    Key(String),
    Index(usize),
}

/// Parses `ident(.ident | [digits] | ['key'])*` assignment targets
fn parse_target(target: &str) -> Result<Vec<Seg>, String> {
    let s = target.trim();
    let b = s.as_bytes();
    let head = crate::scanner::read_identifier(s, 0);
    if head.is_empty() {
        return Err("assignment targets must start with an identifier".to_string());
    }
    let mut segments = vec![Seg::Key(head.to_string())];
    let mut p = head.len();
    while p < b.len() {
        match b[p] {
            b'.' => {
                p += 1;
                let name = crate::scanner::read_identifier(s, p);
                if name.is_empty() {
                    return Err(format!("expected a field name at offset {p}"));
                }
                segments.push(Seg::Key(name.to_string()));
                p += name.len();
            }
            b'[' => {
                p += 1;
                match b.get(p) {
                    Some(&quote @ (b'\'' | b'"')) => {
                        p += 1;
                        let start = p;
                        while p < b.len() && b[p] != quote {
                            p += 1;
                        }
                        if p >= b.len() {
                            return Err("unterminated string in assignment target".to_string());
                        }
                        segments.push(Seg::Key(s[start..p].to_string()));
                        p += 1;
                    }
                    _ => {
                        let start = p;
                        while p < b.len() && b[p].is_ascii_digit() {
                            p += 1;
                        }
                        let index: usize = s[start..p]
                            .parse()
                            .map_err(|_| format!("expected an index at offset {start}"))?;
                        segments.push(Seg::Index(index));
                    }
                }
                if b.get(p) != Some(&b']') {
                    return Err(format!("expected `]` at offset {p}"));
                }
                p += 1;
            }
            other => return Err(format!("unexpected `{}` at offset {p}", other as char)),
        }
    }
    Ok(segments)
}

/// Where a partially-walked path currently points
enum Cur<'a> {
    Borrowed(&'a Value),
    Owned(Value),
    Scope(&'a Scope<'a>),
}

struct Parser<'e> {
    src: &'e str,
    pos: usize,
    ctx: &'e EvalContext<'e>,
}

impl<'e> Parser<'e> {
    fn skip_ws(&mut self) {
        let b = self.src.as_bytes();
        while self.pos < b.len() && b[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn eat(&mut self, text: &str) -> bool {
        if self.src[self.pos..].starts_with(text) {
            self.pos += text.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), String> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(format!("expected `{}` at offset {}", byte as char, self.pos))
        }
    }

    fn parse_expression(&mut self) -> Result<Value, String> {
        let lhs = self.parse_unary()?;
        self.skip_ws();
        if self.eat("==") {
            let rhs = self.parse_unary()?;
            return Ok(Value::Bool(loose_eq(&lhs, &rhs)));
        }
        if self.eat("!=") {
            let rhs = self.parse_unary()?;
            return Ok(Value::Bool(!loose_eq(&lhs, &rhs)));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Value, String> {
        self.skip_ws();
        if self.peek() == Some(b'!') && self.src.as_bytes().get(self.pos + 1) != Some(&b'=') {
            self.pos += 1;
            let value = self.parse_unary()?;
            return Ok(Value::Bool(!is_truthy(&value)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Value, String> {
        self.skip_ws();
        match self.peek() {
            None => Err("empty expression".to_string()),
            Some(b'(') => {
                self.pos += 1;
                let value = self.parse_expression()?;
                self.skip_ws();
                self.expect(b')')?;
                Ok(value)
            }
            Some(b'[') => self.parse_array(),
            Some(b'\'') | Some(b'"') => self.parse_string(),
            Some(c) if c.is_ascii_digit() || c == b'-' => self.parse_number(),
            Some(c) if is_identifier_byte(c) => {
                let name = crate::scanner::read_identifier(self.src, self.pos);
                self.pos += name.len();
                match name {
                    "null" | "undefined" => Ok(Value::Null),
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    _ => {
                        let root = self.resolve_root(name);
                        self.parse_path(root)
                    }
                }
            }
            Some(c) => Err(format!("unexpected `{}` at offset {}", c as char, self.pos)),
        }
    }

    fn parse_array(&mut self) -> Result<Value, String> {
        self.pos += 1;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(Value::Array(items));
        }
        loop {
            items.push(self.parse_expression()?);
            self.skip_ws();
            if self.peek() == Some(b',') {
                self.pos += 1;
                continue;
            }
            self.expect(b']')?;
            return Ok(Value::Array(items));
        }
    }

    fn parse_string(&mut self) -> Result<Value, String> {
        let b = self.src.as_bytes();
        let quote = b[self.pos];
        self.pos += 1;
        let mut text = String::new();
        loop {
            match b.get(self.pos) {
                None => return Err("unterminated string literal".to_string()),
                Some(&c) if c == quote => {
                    self.pos += 1;
                    return Ok(Value::String(text));
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match b.get(self.pos) {
                        None => return Err("unterminated string literal".to_string()),
                        Some(b'n') => text.push('\n'),
                        Some(b't') => text.push('\t'),
                        Some(b'r') => text.push('\r'),
                        Some(&c) => text.push(c as char),
                    }
                    self.pos += 1;
                }
                Some(&c) if c.is_ascii() => {
                    text.push(c as char);
                    self.pos += 1;
                }
                Some(_) => {
                    // multi-byte character: copy it whole
                    let ch = self.src[self.pos..]
                        .chars()
                        .next()
                        .ok_or("invalid character")?;
                    text.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
    }

    fn parse_number(&mut self) -> Result<Value, String> {
        let b = self.src.as_bytes();
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let mut seen_dot = false;
        while let Some(&c) = b.get(self.pos) {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else if c == b'.' && !seen_dot {
                seen_dot = true;
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        if seen_dot {
            let f: f64 = text.parse().map_err(|_| format!("invalid number `{text}`"))?;
            serde_json::Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| format!("invalid number `{text}`"))
        } else {
            let i: i64 = text.parse().map_err(|_| format!("invalid number `{text}`"))?;
            Ok(Value::Number(i.into()))
        }
    }

    fn resolve_root(&self, name: &'e str) -> Cur<'e> {
        if let Some(value) = self.ctx.binding(name) {
            return Cur::Borrowed(value);
        }
        match name {
            "model" => Cur::Borrowed(self.ctx.model),
            "context" => Cur::Borrowed(self.ctx.context),
            "scope" => self
                .ctx
                .scope
                .map(Cur::Scope)
                .unwrap_or(Cur::Owned(Value::Null)),
            _ => self
                .ctx
                .model
                .get(name)
                .map(Cur::Borrowed)
                .unwrap_or(Cur::Owned(Value::Null)),
        }
    }

    fn parse_path(&mut self, root: Cur<'e>) -> Result<Value, String> {
        let mut cur = root;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'.') => {
                    self.pos += 1;
                    self.skip_ws();
                    let field = crate::scanner::read_identifier(self.src, self.pos);
                    if field.is_empty() {
                        return Err(format!("expected field name at offset {}", self.pos));
                    }
                    self.pos += field.len();
                    cur = step_field(cur, field);
                }
                Some(b'[') => {
                    self.pos += 1;
                    let index = self.parse_expression()?;
                    self.skip_ws();
                    self.expect(b']')?;
                    cur = step_index(cur, &index);
                }
                _ => break,
            }
        }
        Ok(materialize(cur))
    }
}

fn step_field<'a>(cur: Cur<'a>, field: &str) -> Cur<'a> {
    match cur {
        Cur::Scope(s) => match field {
            "index" => Cur::Owned(Value::from(s.index)),
            "first" => Cur::Owned(Value::Bool(s.first)),
            "last" => Cur::Owned(Value::Bool(s.last)),
            "item" => Cur::Borrowed(&s.item),
            "items" => Cur::Owned(Value::Array(s.items.to_vec())),
            "outer" => s.outer.map(Cur::Scope).unwrap_or(Cur::Owned(Value::Null)),
            _ => Cur::Owned(Value::Null),
        },
        Cur::Borrowed(v) => v
            .get(field)
            .map(Cur::Borrowed)
            .unwrap_or(Cur::Owned(Value::Null)),
        Cur::Owned(v) => Cur::Owned(v.get(field).cloned().unwrap_or(Value::Null)),
    }
}

fn step_index<'a>(cur: Cur<'a>, index: &Value) -> Cur<'a> {
    match cur {
        Cur::Scope(_) => Cur::Owned(Value::Null),
        Cur::Borrowed(v) => {
            let got = match index {
                Value::Number(n) => n.as_u64().and_then(|i| v.get(i as usize)),
                Value::String(s) => v.get(s.as_str()),
                _ => None,
            };
            got.map(Cur::Borrowed).unwrap_or(Cur::Owned(Value::Null))
        }
        Cur::Owned(v) => {
            let got = match index {
                Value::Number(n) => n.as_u64().and_then(|i| v.get(i as usize)).cloned(),
                Value::String(s) => v.get(s.as_str()).cloned(),
                _ => None,
            };
            Cur::Owned(got.unwrap_or(Value::Null))
        }
    }
}

fn materialize(cur: Cur<'_>) -> Value {
    match cur {
        Cur::Borrowed(v) => v.clone(),
        Cur::Owned(v) => v,
        Cur::Scope(s) => serde_json::json!({
            "index": s.index,
            "first": s.first,
            "last": s.last,
            "item": s.item,
        }),
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}
