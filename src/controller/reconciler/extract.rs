//! # Field-Path Extraction
//!
//! Evaluates a JSONPath-like field path against an object tree and renders
//! the selected value as a string.
//!
//! Supported syntax, optionally wrapped in `{...}` and prefixed with `$`:
//!
//! - `.name` field access (a literal dot inside a name is written `\.`)
//! - `['name']` / `["name"]` quoted field access
//! - `[n]` array index, negative indices count from the end
//!
//! Wildcards, recursive descent, slices, unions and filters are rejected at
//! parse time. Missing fields are always an error, and a value that renders
//! to the empty string is rejected as well.
//!
//! Extraction never mutates the source object.

use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("fieldPath: {0}")]
    Parse(String),
    #[error("fieldPath: {0} is not found")]
    MissingKey(String),
    #[error("fieldPath: value is empty")]
    EmptyValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Field(String),
    Index(i64),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) => write!(f, "{name}"),
            Segment::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// A parsed field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    /// Parse a field-path expression.
    ///
    /// # Errors
    ///
    /// Returns `ExtractError::Parse` for malformed or unsupported expressions.
    pub fn parse(expression: &str) -> Result<Self, ExtractError> {
        let trimmed = expression.trim();
        let inner = match trimmed.strip_prefix('{') {
            Some(rest) => rest
                .strip_suffix('}')
                .ok_or_else(|| ExtractError::Parse(format!("unclosed action in {trimmed:?}")))?,
            None => trimmed,
        };
        if inner.contains('{') || inner.contains('}') {
            return Err(ExtractError::Parse(format!(
                "templates with text outside an action are not supported: {trimmed:?}"
            )));
        }
        let body = inner.trim();
        let body = body.strip_prefix('$').unwrap_or(body);
        if body.is_empty() {
            return Err(ExtractError::Parse("field path is empty".to_string()));
        }

        let chars: Vec<char> = body.chars().collect();
        let mut segments = Vec::new();
        let mut pos = 0;
        while pos < chars.len() {
            match chars[pos] {
                '.' => {
                    if chars.get(pos + 1) == Some(&'.') {
                        return Err(ExtractError::Parse(
                            "recursive descent is not supported".to_string(),
                        ));
                    }
                    if chars.get(pos + 1) == Some(&'[') {
                        pos += 1;
                        continue;
                    }
                    let (name, next) = read_name(&chars, pos + 1)?;
                    segments.push(Segment::Field(name));
                    pos = next;
                }
                '[' => {
                    let (segment, next) = read_bracket(&chars, pos)?;
                    segments.push(segment);
                    pos = next;
                }
                _ if pos == 0 => {
                    let (name, next) = read_name(&chars, 0)?;
                    segments.push(Segment::Field(name));
                    pos = next;
                }
                other => {
                    return Err(ExtractError::Parse(format!(
                        "unexpected character {other:?} at position {pos}"
                    )));
                }
            }
        }
        if segments.is_empty() {
            return Err(ExtractError::Parse("field path is empty".to_string()));
        }
        Ok(Self { segments })
    }

    /// Evaluate against `object` and render the result.
    ///
    /// Strings are returned verbatim, numbers and booleans in their JSON
    /// form, objects and arrays as compact JSON. `null` renders empty.
    ///
    /// # Errors
    ///
    /// `MissingKey` if a segment does not resolve, `EmptyValue` if the
    /// rendered value is empty.
    pub fn extract(&self, object: &Value) -> Result<String, ExtractError> {
        let mut current = object;
        let mut walked = String::new();
        for segment in &self.segments {
            if matches!(segment, Segment::Field(_)) && !walked.is_empty() {
                walked.push('.');
            }
            walked.push_str(&segment.to_string());

            current = match (segment, current) {
                (Segment::Field(name), Value::Object(map)) => map.get(name),
                (Segment::Index(index), Value::Array(items)) => resolve_index(items, *index),
                _ => None,
            }
            .ok_or_else(|| ExtractError::MissingKey(walked.clone()))?;
        }

        let rendered = match current {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        };
        if rendered.is_empty() {
            return Err(ExtractError::EmptyValue);
        }
        Ok(rendered)
    }
}

/// Parse `path` and extract it from `object` in one step.
///
/// # Errors
///
/// See [`FieldPath::parse`] and [`FieldPath::extract`].
pub fn extract(object: &Value, path: &str) -> Result<String, ExtractError> {
    FieldPath::parse(path)?.extract(object)
}

fn resolve_index(items: &[Value], index: i64) -> Option<&Value> {
    let len = i64::try_from(items.len()).ok()?;
    let resolved = if index < 0 { len + index } else { index };
    usize::try_from(resolved).ok().and_then(|i| items.get(i))
}

fn read_name(chars: &[char], start: usize) -> Result<(String, usize), ExtractError> {
    let mut name = String::new();
    let mut pos = start;
    while pos < chars.len() {
        match chars[pos] {
            '\\' if chars.get(pos + 1) == Some(&'.') => {
                name.push('.');
                pos += 2;
            }
            '.' | '[' => break,
            ']' | '\'' | '"' | '(' | ')' | '?' | '@' | ',' => {
                return Err(ExtractError::Parse(format!(
                    "unexpected character {:?} at position {pos}",
                    chars[pos]
                )));
            }
            c => {
                name.push(c);
                pos += 1;
            }
        }
    }
    if name.is_empty() {
        return Err(ExtractError::Parse(format!(
            "missing field name at position {start}"
        )));
    }
    if name == "*" {
        return Err(ExtractError::Parse("wildcards are not supported".to_string()));
    }
    Ok((name, pos))
}

fn read_bracket(chars: &[char], open: usize) -> Result<(Segment, usize), ExtractError> {
    let quote = chars.get(open + 1).copied().filter(|c| *c == '\'' || *c == '"');
    if let Some(quote) = quote {
        let start = open + 2;
        let end = chars[start..]
            .iter()
            .position(|c| *c == quote)
            .map(|offset| start + offset)
            .ok_or_else(|| ExtractError::Parse(format!("unterminated quote at position {open}")))?;
        if chars.get(end + 1) != Some(&']') {
            return Err(ExtractError::Parse(format!(
                "expected ']' at position {}",
                end + 1
            )));
        }
        let name: String = chars[start..end].iter().collect();
        if name.is_empty() {
            return Err(ExtractError::Parse(format!(
                "missing field name at position {open}"
            )));
        }
        return Ok((Segment::Field(name), end + 2));
    }

    let close = chars[open..]
        .iter()
        .position(|c| *c == ']')
        .map(|offset| open + offset)
        .ok_or_else(|| ExtractError::Parse(format!("unclosed '[' at position {open}")))?;
    let content: String = chars[open + 1..close].iter().collect();
    let content = content.trim();
    if content.contains(['*', ':', '?', ',']) {
        return Err(ExtractError::Parse(format!(
            "unsupported subscript [{content}]"
        )));
    }
    let index = content
        .parse::<i64>()
        .map_err(|e| ExtractError::Parse(format!("invalid array index [{content}]: {e}")))?;
    Ok((Segment::Index(index), close + 1))
}
