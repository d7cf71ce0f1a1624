/// Response field projection

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectError {
    #[error("{path} doesn't exist in the result")]
    UnknownKey { path: String },

    #[error("Invalid field selector: {0}")]
    InvalidSelector(String),
}

/// Caller-supplied shape of the response
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSelector {
    /// `true` or `"$all"`: return data unprojected
    All,
    Keys(Map<String, Value>),
}

impl FieldSelector {
    pub fn from_value(value: Option<&Value>) -> Result<Self, SelectError> {
        match value {
            None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(FieldSelector::Keys(Map::new())),
            Some(Value::Bool(true)) => Ok(FieldSelector::All),
            Some(Value::String(s)) if s == "$all" => Ok(FieldSelector::All),
            Some(Value::Object(keys)) => Ok(FieldSelector::Keys(keys.clone())),
            Some(other) => Err(SelectError::InvalidSelector(format!(
                "expected object, boolean or \"$all\", got {}",
                other
            ))),
        }
    }

    /// True when the caller asked for nothing
    pub fn is_empty(&self) -> bool {
        matches!(self, FieldSelector::Keys(keys) if keys.is_empty())
    }

    /// Projects handler output: maps directly, sequences element-wise
    pub fn apply(&self, data: &Value) -> Result<Value, SelectError> {
        match self {
            FieldSelector::All => Ok(data.clone()),
            FieldSelector::Keys(keys) => project(data, keys, ""),
        }
    }
}

/// Keeps only the keys named with a truthy selector, recursing into nested selectors
pub fn select(data: &Map<String, Value>, selector: &Map<String, Value>) -> Result<Map<String, Value>, SelectError> {
    select_at(data, selector, "")
}

fn select_at(data: &Map<String, Value>, selector: &Map<String, Value>, parent: &str) -> Result<Map<String, Value>, SelectError> {
    let mut out = Map::new();
    for (key, wanted) in selector {
        if !is_truthy(wanted) {
            continue;
        }
        let path = if parent.is_empty() { key.clone() } else { format!("{}.{}", parent, key) };
        let value = data
            .get(key)
            .ok_or_else(|| SelectError::UnknownKey { path: path.clone() })?;

        let projected = match wanted {
            Value::Object(nested) => project(value, nested, &path)?,
            _ => value.clone(),
        };
        out.insert(key.clone(), projected);
    }
    Ok(out)
}

fn project(value: &Value, selector: &Map<String, Value>, path: &str) -> Result<Value, SelectError> {
    match value {
        Value::Object(obj) => Ok(Value::Object(select_at(obj, selector, path)?)),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(obj) => select_at(obj, selector, path).map(Value::Object),
                other => Ok(other.clone()),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        // Unresolved links (null or raw pk) pass through a nested selector
        other => Ok(other.clone()),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(obj) => !obj.is_empty(),
    }
}
