//! VL-008: Value semantics for rendering: emptiness, output text, loose
//! comparison, and nested-field access.

use crate::core::types::Value;
use serde_json::Map;

/// Unset-like or empty: null, false, 0, "", "0", and empty collections.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Text a value renders as. Collections render as compact JSON.
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                t.parse::<f64>().ok().filter(|f| f.is_finite())
            }
        }
        _ => None,
    }
}

/// Loose equality: numeric when both sides read as numbers, truthiness when
/// either side is a boolean, otherwise rendered text.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Bool(x), other) | (other, Value::Bool(x)) => *x == !is_empty(other),
        (Value::Null, other) | (other, Value::Null) => is_empty(other),
        (Value::Array(_), _) | (Value::Object(_), _) | (_, Value::Array(_)) | (_, Value::Object(_)) => {
            a == b
        }
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => render(a) == render(b),
        },
    }
}

/// Collection elements in order (map values for objects). `None` for scalars.
pub fn elements(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items.clone()),
        Value::Object(map) => Some(map.values().cloned().collect()),
        _ => None,
    }
}

fn child<'v>(value: &'v Value, key: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Look up a nested path in a map.
pub fn get_path<'v>(root: &'v Map<String, Value>, segments: &[String]) -> Option<&'v Value> {
    let (first, rest) = segments.split_first()?;
    rest.iter()
        .try_fold(root.get(first.as_str())?, |value, seg| child(value, seg))
}

/// Set a nested path, creating or replacing intermediate objects as needed.
pub fn set_path(root: &mut Map<String, Value>, segments: &[String], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    set_in(root.entry(first.clone()).or_insert(Value::Null), rest, value);
}

fn set_in(slot: &mut Value, segments: &[String], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *slot = value;
        return;
    };
    if let Value::Array(items) = slot {
        if let Some(item) = first.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
            set_in(item, rest, value);
            return;
        }
    }
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(map) = slot {
        set_in(map.entry(first.clone()).or_insert(Value::Null), rest, value);
    }
}

/// Remove a nested path. Returns the removed value.
pub fn remove_path(root: &mut Map<String, Value>, segments: &[String]) -> Option<Value> {
    let (first, rest) = segments.split_first()?;
    let Some((last, middle)) = rest.split_last() else {
        return root.remove(first.as_str());
    };
    let mut current = root.get_mut(first.as_str())?;
    for seg in middle {
        current = match current {
            Value::Object(map) => map.get_mut(seg.as_str())?,
            Value::Array(items) => items.get_mut(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    match current {
        Value::Object(map) => map.remove(last.as_str()),
        _ => None,
    }
}
