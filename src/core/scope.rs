//! VL-005: Variable resolution and value classification.
//!
//! A [`LoopScope`] tracks the loop variables active at the current point of
//! compilation. Identifiers bound by an enclosing loop (or nested below one) read
//! from loop-local scope; everything else reads from page data.

use super::types::{Operand, Partition, Value, ValueKind, VarPath, DEFAULT_HOST_MARKER};
use indexmap::IndexMap;

/// Separator for nested-field access in identifiers (`USER->name`).
pub const FIELD_SEPARATOR: &str = "->";

/// Loop variables active at the current compile position, outermost first.
/// The same path may appear more than once when loops shadow each other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopScope {
    active: Vec<Vec<String>>,
}

impl LoopScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: Vec<String>) {
        self.active.push(path);
    }

    /// Deactivate the innermost binding of `path`, or the innermost loop of all
    /// when `path` is `None`. Returns the deactivated path.
    pub fn pop(&mut self, path: Option<&[String]>) -> Option<Vec<String>> {
        let idx = match path {
            Some(p) => self.active.iter().rposition(|a| a.as_slice() == p)?,
            None => self.active.len().checked_sub(1)?,
        };
        Some(self.active.remove(idx))
    }

    pub fn innermost(&self) -> Option<&[String]> {
        self.active.last().map(Vec::as_slice)
    }

    pub fn is_active(&self, path: &[String]) -> bool {
        self.active.iter().any(|a| a.as_slice() == path)
    }

    pub fn depth(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

/// Compile-time named constants.
#[derive(Debug, Clone, Default)]
pub struct ConstantTable(IndexMap<String, Value>);

impl ConstantTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in constants plus the configured ones (configured entries win).
    pub fn with_builtins(host_marker: &str, configured: &IndexMap<String, Value>) -> Self {
        let mut table = Self::new();
        table.insert("VELLUM_VERSION", Value::from(env!("CARGO_PKG_VERSION")));
        let marker = if host_marker.is_empty() {
            DEFAULT_HOST_MARKER
        } else {
            host_marker
        };
        table.insert(marker, Value::from(true));
        for (name, value) in configured {
            table.insert(name, value.clone());
        }
        table
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Split an identifier into nested-field segments.
pub fn parse_path(ident: &str) -> Vec<String> {
    ident
        .split(FIELD_SEPARATOR)
        .map(|s| s.trim().to_string())
        .collect()
}

/// Decide whether a path binds to loop-local scope or page data.
/// Checks the full path first, then each shorter prefix.
pub fn resolve_scope(scope: &LoopScope, segments: &[String]) -> Partition {
    if scope.is_empty() {
        return Partition::Data;
    }
    for len in (1..=segments.len()).rev() {
        if scope.is_active(&segments[..len]) {
            return Partition::Loop;
        }
    }
    Partition::Data
}

/// Variable reference with its partition resolved against the loop scope.
pub fn variable(scope: &LoopScope, ident: &str) -> VarPath {
    let segments = parse_path(ident);
    VarPath {
        partition: resolve_scope(scope, &segments),
        segments,
    }
}

/// Variable reference in a fixed partition (`var` and `define` targets).
pub fn variable_in(partition: Partition, ident: &str) -> VarPath {
    VarPath {
        partition,
        segments: parse_path(ident),
    }
}

/// Classify a raw value token: number, quoted string, constant, or variable.
pub fn classify_value(scope: &LoopScope, constants: &ConstantTable, raw: &str) -> (Operand, ValueKind) {
    let operand = if let Some(value) = parse_numeric(raw) {
        Operand::Integer { value }
    } else if let Some(s) = unquote(raw) {
        Operand::String {
            value: s.to_string(),
        }
    } else if let Some(value) = constants.get(raw) {
        Operand::Constant {
            name: raw.to_string(),
            value: value.clone(),
        }
    } else {
        Operand::Variable {
            path: variable(scope, raw),
        }
    };
    let kind = operand.kind();
    (operand, kind)
}

/// Numeric literal: optional sign, digits, optional fraction and exponent.
pub fn parse_numeric(raw: &str) -> Option<Value> {
    let s = raw.trim();
    if s.is_empty()
        || !s.bytes().any(|b| b.is_ascii_digit())
        || !s
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
    {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    let f = s.parse::<f64>().ok()?;
    serde_json::Number::from_f64(f).map(Value::Number)
}

/// Contents of a `"..."` or `'...'` token.
fn unquote(raw: &str) -> Option<&str> {
    if raw.len() < 2 {
        return None;
    }
    raw.strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')))
}
