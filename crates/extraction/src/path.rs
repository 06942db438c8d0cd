//! Path expressions over decoded message trees
//!
//! Supported grammar (a JSONPath subset):
//!
//! | form                 | meaning                                       |
//! |----------------------|-----------------------------------------------|
//! | `$`                  | root (optional prefix)                        |
//! | `.name`              | object member                                 |
//! | `['name']`           | object member, any characters                 |
//! | `[3]` / `[-1]`       | array element, negative counts from end       |
//! | `[*]` / `.*`         | every element of an array or object           |
//! | `[0,2]`              | several array elements                        |
//! | `[1:3]` / `[::-1]`   | array slice `start:end:step`                  |
//! | `[?(@.a > 1)]`       | children passing a filter                     |
//!
//! A bare dotted path (`a.b[0]`) is accepted as if prefixed by `$.`.
//!
//! Paths made only of members and indexes select one value. As soon as a
//! wildcard, union, slice or filter appears, the result is an array of every
//! selected value, and later segments apply to each of them, skipping the
//! ones they do not match.
//!
//! Filters compare a singular `@` path with a JSON literal, a single-quoted
//! string, or a singular `$` path: `==`, `!=`, `<`, `<=`, `>`, `>=`. A filter
//! without an operator tests that the `@` path exists.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{ExtractionError, Result};

/// One step of a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Object member
    Field(String),
    /// Array index (negative counts from the end)
    Index(i64),
    /// Every child of an array or object
    Wildcard,
    /// Listed array indexes, in listed order
    Union(Vec<i64>),
    Slice {
        start: Option<i64>,
        end: Option<i64>,
        step: Option<i64>,
    },
    Filter(Filter),
}

impl PathSegment {
    /// Selects at most one value
    pub fn is_singular(&self) -> bool {
        matches!(self, Self::Field(_) | Self::Index(_))
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, "['{name}']"),
            Self::Index(idx) => write!(f, "[{idx}]"),
            Self::Wildcard => f.write_str("[*]"),
            Self::Union(indexes) => {
                let parts: Vec<String> = indexes.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(","))
            }
            Self::Slice { start, end, step } => {
                let bound = |b: &Option<i64>| b.map(|v| v.to_string()).unwrap_or_default();
                match step {
                    Some(step) => write!(f, "[{}:{}:{step}]", bound(start), bound(end)),
                    None => write!(f, "[{}:{}]", bound(start), bound(end)),
                }
            }
            Self::Filter(filter) => write!(f, "[?({})]", filter.raw),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    // Two-character operators first so `<=` is not read as `<`.
    const TOKENS: [(&'static str, CompareOp); 6] = [
        ("==", CompareOp::Eq),
        ("!=", CompareOp::Ne),
        ("<=", CompareOp::Le),
        (">=", CompareOp::Ge),
        ("<", CompareOp::Lt),
        (">", CompareOp::Gt),
    ];

    fn apply(self, left: &Value, right: &Value) -> bool {
        match self {
            Self::Eq => loosely_equal(left, right),
            Self::Ne => !loosely_equal(left, right),
            Self::Lt => order(left, right).is_some_and(Ordering::is_lt),
            Self::Le => order(left, right).is_some_and(Ordering::is_le),
            Self::Gt => order(left, right).is_some_and(Ordering::is_gt),
            Self::Ge => order(left, right).is_some_and(Ordering::is_ge),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Literal(Value),
    /// Singular path evaluated against the whole message
    Root(JsonPath),
}

/// `?(...)` predicate applied to each child of the current node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    raw: String,
    /// Path relative to the child, stored with a `$` root
    target: JsonPath,
    comparison: Option<(CompareOp, Operand)>,
}

impl Filter {
    fn parse(body: &str) -> std::result::Result<Self, String> {
        let raw = body.trim();
        let chars: Vec<char> = raw.chars().collect();

        let (target_text, comparison) = match find_operator(&chars) {
            Some((at, op, width)) => {
                let lhs: String = chars[..at].iter().collect();
                let rhs: String = chars[at + width..].iter().collect();
                (lhs, Some((op, parse_operand(rhs.trim())?)))
            }
            None => (raw.to_string(), None),
        };

        let target_text = target_text.trim();
        let relative = target_text
            .strip_prefix('@')
            .ok_or_else(|| format!("filter must start with '@', found '{target_text}'"))?;
        let target = singular_path(&format!("${relative}"))?;

        Ok(Self {
            raw: raw.to_string(),
            target,
            comparison,
        })
    }

    fn matches(&self, child: &Value, root: &Value) -> bool {
        let Ok(left) = self.target.lookup(child) else {
            return false;
        };
        let Some((op, operand)) = &self.comparison else {
            return true;
        };
        let right = match operand {
            Operand::Literal(value) => Cow::Borrowed(value),
            Operand::Root(path) => match path.lookup(root) {
                Ok(value) => value,
                Err(_) => return false,
            },
        };
        op.apply(&left, &right)
    }
}

/// Parsed path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    raw: String,
    segments: Vec<PathSegment>,
}

impl JsonPath {
    /// Parse a path expression
    ///
    /// # Errors
    /// `PathSyntax` on empty input, `..`, unclosed brackets, bad indexes,
    /// malformed filters or stray characters.
    pub fn parse(expr: &str) -> Result<Self> {
        let raw = expr.trim();
        let chars: Vec<char> = raw.chars().collect();
        let syntax = |message: String| ExtractionError::path_syntax(raw, message);

        let Some(&first) = chars.first() else {
            return Err(syntax("empty expression".into()));
        };

        let mut pos = 0;
        let mut segments = Vec::new();

        match first {
            '$' => pos = 1,
            '.' | '[' => {}
            _ => segments.push(PathSegment::Field(read_ident(&chars, &mut pos).map_err(syntax)?)),
        }

        while pos < chars.len() {
            match chars[pos] {
                '.' => {
                    pos += 1;
                    match chars.get(pos) {
                        None => return Err(syntax("expression ends with '.'".into())),
                        Some('.') => {
                            return Err(syntax("recursive descent '..' is not supported".into()))
                        }
                        Some('[') => return Err(syntax("unexpected '[' after '.'".into())),
                        Some('*') => {
                            pos += 1;
                            segments.push(PathSegment::Wildcard);
                        }
                        Some(_) => segments
                            .push(PathSegment::Field(read_ident(&chars, &mut pos).map_err(syntax)?)),
                    }
                }
                '[' => {
                    pos += 1;
                    segments.push(read_bracket(&chars, &mut pos).map_err(syntax)?);
                }
                c => {
                    return Err(syntax(format!(
                        "unexpected character '{c}' at position {pos}"
                    )))
                }
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Whether the path selects the whole tree
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether the path selects at most one value
    pub fn is_singular(&self) -> bool {
        self.segments.iter().all(PathSegment::is_singular)
    }

    /// Evaluate against a tree
    ///
    /// Singular paths borrow the selected value and fail when a step does
    /// not resolve. Other paths never fail: they return an array, possibly
    /// empty, of everything selected.
    pub fn lookup<'a>(&self, tree: &'a Value) -> Result<Cow<'a, Value>> {
        let mut selection = Selection::One(tree);

        for segment in &self.segments {
            selection = match selection {
                Selection::One(node) if segment.is_singular() => {
                    Selection::One(step(node, segment)?)
                }
                Selection::One(node) => Selection::Many(select(node, segment, tree)),
                Selection::Many(nodes) => Selection::Many(
                    nodes
                        .into_iter()
                        .flat_map(|node| select(node, segment, tree))
                        .collect(),
                ),
            };
        }

        Ok(match selection {
            Selection::One(node) => Cow::Borrowed(node),
            Selection::Many(nodes) => {
                Cow::Owned(Value::Array(nodes.into_iter().cloned().collect()))
            }
        })
    }
}

impl FromStr for JsonPath {
    type Err = ExtractionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Parse `expr` and evaluate it against `tree`
pub fn lookup<'a>(tree: &'a Value, expr: &str) -> Result<Cow<'a, Value>> {
    JsonPath::parse(expr)?.lookup(tree)
}

enum Selection<'a> {
    One(&'a Value),
    Many(Vec<&'a Value>),
}

fn read_ident(chars: &[char], pos: &mut usize) -> std::result::Result<String, String> {
    let start = *pos;
    while *pos < chars.len() && !matches!(chars[*pos], '.' | '[' | ']') && !chars[*pos].is_whitespace()
    {
        *pos += 1;
    }
    if *pos == start {
        return Err(format!("empty member name at position {start}"));
    }
    Ok(chars[start..*pos].iter().collect())
}

fn skip_spaces(chars: &[char], pos: &mut usize) {
    while *pos < chars.len() && chars[*pos].is_whitespace() {
        *pos += 1;
    }
}

fn expect_close(chars: &[char], pos: &mut usize) -> std::result::Result<(), String> {
    skip_spaces(chars, pos);
    match chars.get(*pos) {
        Some(']') => {
            *pos += 1;
            Ok(())
        }
        Some(c) => Err(format!("expected ']' at position {}, found '{c}'", *pos)),
        None => Err("unclosed '['".into()),
    }
}

fn read_bracket(chars: &[char], pos: &mut usize) -> std::result::Result<PathSegment, String> {
    skip_spaces(chars, pos);

    match chars.get(*pos) {
        None => Err("unclosed '['".into()),
        Some('*') => {
            *pos += 1;
            expect_close(chars, pos)?;
            Ok(PathSegment::Wildcard)
        }
        Some('?') => {
            *pos += 1;
            let body = read_filter_body(chars, pos)?;
            expect_close(chars, pos)?;
            Ok(PathSegment::Filter(Filter::parse(&body)?))
        }
        Some(&quote @ ('\'' | '"')) => {
            *pos += 1;
            let name = read_quoted(chars, pos, quote)?;
            expect_close(chars, pos)?;
            Ok(PathSegment::Field(name))
        }
        Some(_) => {
            let start = *pos;
            while *pos < chars.len() && chars[*pos] != ']' {
                *pos += 1;
            }
            if *pos >= chars.len() {
                return Err("unclosed '['".into());
            }
            let text: String = chars[start..*pos].iter().collect();
            *pos += 1;
            index_selector(text.trim())
        }
    }
}

/// Read up to the closing quote; `pos` is just past the opening one
fn read_quoted(chars: &[char], pos: &mut usize, quote: char) -> std::result::Result<String, String> {
    let mut text = String::new();
    loop {
        match chars.get(*pos) {
            None => return Err("unterminated quoted member".into()),
            Some('\\') => {
                let escaped = chars
                    .get(*pos + 1)
                    .ok_or_else(|| "unterminated escape".to_string())?;
                text.push(*escaped);
                *pos += 2;
            }
            Some(&c) if c == quote => {
                *pos += 1;
                return Ok(text);
            }
            Some(&c) => {
                text.push(c);
                *pos += 1;
            }
        }
    }
}

/// Read `( ... )` after `?`, honouring nested parentheses and quotes
fn read_filter_body(chars: &[char], pos: &mut usize) -> std::result::Result<String, String> {
    skip_spaces(chars, pos);
    if chars.get(*pos) != Some(&'(') {
        return Err("expected '(' after '?'".into());
    }
    *pos += 1;

    let start = *pos;
    let mut depth = 1;
    let mut quote: Option<char> = None;
    while let Some(&c) = chars.get(*pos) {
        match quote {
            Some(_) if c == '\\' => *pos += 1,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let body = chars[start..*pos].iter().collect();
                        *pos += 1;
                        return Ok(body);
                    }
                }
                _ => {}
            },
        }
        *pos += 1;
    }
    Err("unclosed filter '?('".into())
}

fn index_selector(text: &str) -> std::result::Result<PathSegment, String> {
    let int = |part: &str| {
        part.trim()
            .parse::<i64>()
            .map_err(|_| format!("invalid array index '{}'", part.trim()))
    };
    let bound = |part: &str| {
        if part.trim().is_empty() {
            Ok(None)
        } else {
            int(part).map(Some)
        }
    };

    if text.contains(':') {
        let parts: Vec<&str> = text.split(':').collect();
        if parts.len() > 3 {
            return Err(format!("invalid slice '{text}'"));
        }
        let step = match parts.get(2) {
            Some(part) => bound(part)?,
            None => None,
        };
        if step == Some(0) {
            return Err("slice step cannot be 0".into());
        }
        return Ok(PathSegment::Slice {
            start: bound(parts[0])?,
            end: bound(parts[1])?,
            step,
        });
    }

    if text.contains(',') {
        return text
            .split(',')
            .map(int)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(PathSegment::Union);
    }

    int(text).map(PathSegment::Index)
}

/// First comparison operator outside quotes: (char offset, op, width)
fn find_operator(chars: &[char]) -> Option<(usize, CompareOp, usize)> {
    let mut quote: Option<char> = None;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(_) if c == '\\' => i += 1,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None => {
                for (token, op) in CompareOp::TOKENS {
                    let width = token.len();
                    if chars[i..].iter().take(width).copied().eq(token.chars()) {
                        return Some((i, op, width));
                    }
                }
            }
        }
        i += 1;
    }
    None
}

fn parse_operand(text: &str) -> std::result::Result<Operand, String> {
    if text.starts_with('$') {
        return singular_path(text).map(Operand::Root);
    }
    if let Some(inner) = text
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return Ok(Operand::Literal(Value::String(inner.replace("\\'", "'"))));
    }
    serde_json::from_str::<Value>(text)
        .map(Operand::Literal)
        .map_err(|_| format!("invalid filter literal '{text}'"))
}

fn singular_path(text: &str) -> std::result::Result<JsonPath, String> {
    let path = JsonPath::parse(text).map_err(|e| e.to_string())?;
    if !path.is_singular() {
        return Err(format!("filter path '{text}' must select a single value"));
    }
    Ok(path)
}

fn step<'a>(node: &'a Value, segment: &PathSegment) -> Result<&'a Value> {
    match segment {
        PathSegment::Field(key) => match node {
            Value::Object(map) => map
                .get(key)
                .ok_or_else(|| ExtractionError::MissingKey { key: key.clone() }),
            other => Err(mismatch(segment, "object", other)),
        },
        PathSegment::Index(index) => match node {
            Value::Array(items) => resolve_index(*index, items.len())
                .map(|i| &items[i])
                .ok_or(ExtractionError::IndexOutOfRange {
                    index: *index,
                    len: items.len(),
                }),
            other => Err(mismatch(segment, "array", other)),
        },
        other => Err(mismatch(other, "a singular segment", node)),
    }
}

/// Values selected by one segment from one node; misses select nothing
fn select<'a>(node: &'a Value, segment: &PathSegment, root: &'a Value) -> Vec<&'a Value> {
    match (segment, node) {
        (PathSegment::Field(_) | PathSegment::Index(_), _) => {
            step(node, segment).into_iter().collect()
        }
        (PathSegment::Wildcard, Value::Array(items)) => items.iter().collect(),
        (PathSegment::Wildcard, Value::Object(map)) => map.values().collect(),
        (PathSegment::Union(indexes), Value::Array(items)) => indexes
            .iter()
            .filter_map(|i| resolve_index(*i, items.len()))
            .map(|i| &items[i])
            .collect(),
        (PathSegment::Slice { start, end, step }, Value::Array(items)) => {
            slice_indices(items.len(), *start, *end, step.unwrap_or(1))
                .into_iter()
                .map(|i| &items[i])
                .collect()
        }
        (PathSegment::Filter(filter), Value::Array(items)) => items
            .iter()
            .filter(|child| filter.matches(child, root))
            .collect(),
        (PathSegment::Filter(filter), Value::Object(map)) => map
            .values()
            .filter(|child| filter.matches(child, root))
            .collect(),
        _ => Vec::new(),
    }
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let resolved = if index < 0 { len as i64 + index } else { index };
    (0..len as i64).contains(&resolved).then_some(resolved as usize)
}

fn slice_indices(len: usize, start: Option<i64>, end: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let norm = |i: i64| if i < 0 { len + i } else { i };
    let mut out = Vec::new();

    if step > 0 {
        let from = start.map(norm).unwrap_or(0).clamp(0, len);
        let to = end.map(norm).unwrap_or(len).clamp(0, len);
        let mut i = from;
        while i < to {
            out.push(i as usize);
            i += step;
        }
    } else {
        let from = start.map(norm).unwrap_or(len - 1).clamp(-1, len - 1);
        let to = end.map(norm).unwrap_or(-1).clamp(-1, len - 1);
        let mut i = from;
        while i > to {
            out.push(i as usize);
            i += step;
        }
    }
    out
}

/// Numbers compare by value, everything else structurally
fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn mismatch(segment: &PathSegment, expected: &'static str, found: &Value) -> ExtractionError {
    ExtractionError::TypeMismatch {
        segment: segment.to_string(),
        expected,
        found: kind(found),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
