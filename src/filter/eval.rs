use std::cmp::Ordering;

use serde_json::Value;

use super::types::{Comparison, FieldPath, Predicate};

/// Supplies the values reachable at a field path from the row under test.
/// An empty result means the path is absent.
pub trait FieldResolver {
    fn resolve(&self, path: &FieldPath) -> Vec<Value>;

    /// True when a row reached through `link` satisfies `predicate`
    fn any_related(&self, link: &str, predicate: &Predicate) -> bool;
}

impl FieldResolver for Value {
    fn resolve(&self, path: &FieldPath) -> Vec<Value> {
        json_values(self, path.segments())
    }

    fn any_related(&self, link: &str, predicate: &Predicate) -> bool {
        let related: Vec<&Value> = match self.get(link) {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(item @ Value::Object(_)) => vec![item],
            _ => vec![],
        };
        related.into_iter().any(|row| row.is_object() && predicate.evaluate(row))
    }
}

/// Walks plain JSON, fanning out across arrays of objects
pub fn json_values(value: &Value, segments: &[String]) -> Vec<Value> {
    let Some((head, rest)) = segments.split_first() else {
        return vec![value.clone()];
    };
    match value {
        Value::Object(obj) => match obj.get(head) {
            Some(next) => json_values(next, rest),
            None => vec![],
        },
        Value::Array(items) => items
            .iter()
            .filter(|item| item.is_object())
            .flat_map(|item| json_values(item, segments))
            .collect(),
        _ => vec![],
    }
}

impl Predicate {
    /// Evaluates against a plain JSON row
    pub fn matches(&self, row: &Value) -> bool {
        self.evaluate(row)
    }

    pub fn evaluate<R: FieldResolver + ?Sized>(&self, resolver: &R) -> bool {
        match self {
            Predicate::All => true,
            Predicate::And(parts) => parts.iter().all(|p| p.evaluate(resolver)),
            Predicate::Or(parts) => parts.iter().any(|p| p.evaluate(resolver)),
            Predicate::Not(inner) => !inner.evaluate(resolver),
            Predicate::Related { link, predicate } => resolver.any_related(link, predicate),
            Predicate::Compare { path, op, value } => {
                let found = resolver.resolve(path);
                compare_any(&found, *op, value)
            }
        }
    }
}

/// Existential semantics: any reachable value satisfying the comparison wins
fn compare_any(found: &[Value], op: Comparison, operand: &Value) -> bool {
    if op == Comparison::IsNull {
        let want_null = operand.as_bool().unwrap_or(true);
        let is_null = found.is_empty() || found.iter().all(Value::is_null);
        return is_null == want_null;
    }
    if found.is_empty() {
        return op == Comparison::Eq && operand.is_null();
    }
    found.iter().any(|candidate| compare_value(candidate, op, operand))
}

fn compare_value(candidate: &Value, op: Comparison, operand: &Value) -> bool {
    // Array-valued fields (to-many links) match when any element does, except
    // for containment which tests membership directly
    if let Value::Array(items) = candidate {
        if op == Comparison::Contains {
            return items.iter().any(|item| loosely_equal(item, operand));
        }
        if !operand.is_array() {
            return items.iter().any(|item| compare_value(item, op, operand));
        }
    }

    match op {
        Comparison::Eq => loosely_equal(candidate, operand),
        Comparison::Gt => ordering(candidate, operand) == Some(Ordering::Greater),
        Comparison::Gte => matches!(ordering(candidate, operand), Some(Ordering::Greater | Ordering::Equal)),
        Comparison::Lt => ordering(candidate, operand) == Some(Ordering::Less),
        Comparison::Lte => matches!(ordering(candidate, operand), Some(Ordering::Less | Ordering::Equal)),
        Comparison::In => operand
            .as_array()
            .map(|options| options.iter().any(|option| loosely_equal(candidate, option)))
            .unwrap_or(false),
        Comparison::Contains => match (candidate, operand) {
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
            _ => false,
        },
        Comparison::IContains => match (candidate, operand) {
            (Value::String(haystack), Value::String(needle)) => {
                haystack.to_lowercase().contains(&needle.to_lowercase())
            }
            _ => false,
        },
        Comparison::Regex => match (candidate, operand) {
            (Value::String(text), Value::String(pattern)) => regex::Regex::new(pattern)
                .map(|re| re.is_match(text))
                .unwrap_or(false),
            _ => false,
        },
        Comparison::IsNull => candidate.is_null() == operand.as_bool().unwrap_or(true),
    }
}

/// JSON equality with numbers compared by value (`1` == `1.0`)
pub fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

fn ordering(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
