//! Conversions between [`Node`] trees and generic values
//!
//! Plain scalars resolve with the YAML 1.2 core schema; quoted and block
//! scalars are always strings.

use super::{Node, NodeKind, ScalarStyle};
use serde_yaml::{Mapping, Number, Value};

pub(super) fn is_null_literal(value: &str) -> bool {
    matches!(value, "" | "~" | "null" | "Null" | "NULL")
}

pub(super) fn resolve_plain(value: &str) -> Value {
    if is_null_literal(value) {
        return Value::Null;
    }
    match value {
        "true" | "True" | "TRUE" => return Value::Bool(true),
        "false" | "False" | "FALSE" => return Value::Bool(false),
        ".inf" | ".Inf" | ".INF" | "+.inf" | "+.Inf" | "+.INF" => {
            return Value::Number(Number::from(f64::INFINITY))
        }
        "-.inf" | "-.Inf" | "-.INF" => return Value::Number(Number::from(f64::NEG_INFINITY)),
        ".nan" | ".NaN" | ".NAN" => return Value::Number(Number::from(f64::NAN)),
        _ => {}
    }

    if let Some(number) = resolve_integer(value) {
        return Value::Number(number);
    }
    if looks_like_float(value) {
        if let Ok(float) = value.parse::<f64>() {
            return Value::Number(Number::from(float));
        }
    }
    Value::String(value.to_string())
}

fn resolve_integer(value: &str) -> Option<Number> {
    if let Some(hex) = value.strip_prefix("0x") {
        return i64::from_str_radix(hex, 16).ok().map(Number::from);
    }
    if let Some(octal) = value.strip_prefix("0o") {
        return i64::from_str_radix(octal, 8).ok().map(Number::from);
    }

    let digits = value.strip_prefix(['-', '+']).unwrap_or(value);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if let Ok(int) = value.parse::<i64>() {
        return Some(Number::from(int));
    }
    value.parse::<u64>().ok().map(Number::from)
}

fn looks_like_float(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_digit())
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'))
}

fn scalar_value(node: &Node, value: &str, style: ScalarStyle) -> Value {
    match node.tag() {
        Some("!!str") => return Value::String(value.to_string()),
        Some("!!int") | Some("!!float") | Some("!!bool") | Some("!!null") => {
            return resolve_plain(value)
        }
        _ => {}
    }
    match style {
        ScalarStyle::Plain => resolve_plain(value),
        _ => Value::String(value.to_string()),
    }
}

pub(super) fn to_yaml_value(node: &Node) -> Value {
    match node.kind() {
        NodeKind::Scalar { value, style } => scalar_value(node, value, *style),
        NodeKind::Mapping(entries) => {
            let mut mapping = Mapping::new();
            for (key, value) in entries {
                mapping.insert(to_yaml_value(key), to_yaml_value(value));
            }
            Value::Mapping(mapping)
        }
        NodeKind::Sequence { items, .. } => Value::Sequence(items.iter().map(to_yaml_value).collect()),
    }
}

pub(super) fn to_json_value(node: &Node) -> serde_json::Value {
    yaml_to_json(&to_yaml_value(node))
}

fn yaml_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                serde_json::Value::from(i)
            } else if let Some(u) = n.as_u64() {
                serde_json::Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null)
            }
        }
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Sequence(items) => serde_json::Value::Array(items.iter().map(yaml_to_json).collect()),
        Value::Mapping(mapping) => {
            let mut object = serde_json::Map::new();
            for (key, value) in mapping {
                object.insert(key_string(key), yaml_to_json(value));
            }
            serde_json::Value::Object(object)
        }
        Value::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}

fn key_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Format a number the way it should appear in a manifest.
///
/// Integral floats print without a fractional part, so a JSON `2` that was
/// normalized to `2.0` is still written as `2`.
pub fn format_number(number: &Number) -> String {
    if let Some(int) = number.as_i64() {
        return int.to_string();
    }
    if let Some(uint) = number.as_u64() {
        return uint.to_string();
    }
    let float = number.as_f64().unwrap_or_default();
    if float.is_nan() {
        ".nan".to_string()
    } else if float.is_infinite() {
        if float > 0.0 { ".inf" } else { "-.inf" }.to_string()
    } else if float.fract() == 0.0 && float.abs() < 1e15 {
        format!("{}", float as i64)
    } else {
        format!("{}", float)
    }
}

impl Node {
    /// Build a subtree from a generic value, stamping every node with the
    /// given position
    pub fn from_value(value: &Value, line: usize, column: usize) -> Node {
        match value {
            Value::Null => Node::scalar("null", ScalarStyle::Plain, line, column),
            Value::Bool(b) => Node::scalar(b.to_string(), ScalarStyle::Plain, line, column),
            Value::Number(n) => Node::scalar(format_number(n), ScalarStyle::Plain, line, column),
            Value::String(s) if s.contains('\n') => {
                Node::scalar(s.clone(), ScalarStyle::Literal, line, column)
            }
            Value::String(s) => Node::string(s, line, column),
            Value::Sequence(items) => Node::sequence(
                items
                    .iter()
                    .map(|item| Node::from_value(item, line, column + 2))
                    .collect(),
                line,
                column,
            ),
            Value::Mapping(mapping) => Node::mapping(
                mapping
                    .iter()
                    .map(|(k, v)| {
                        (
                            Node::from_value(k, line, column),
                            Node::from_value(v, line, column + 2),
                        )
                    })
                    .collect(),
                line,
                column,
            ),
            Value::Tagged(tagged) => Node::from_value(&tagged.value, line, column)
                .with_tag(Some(tagged.tag.to_string())),
        }
    }
}
