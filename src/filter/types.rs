use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Separator between segments of a relational field path (`author__email`)
pub const PATH_SEPARATOR: &str = "__";

/// Relational operators accepted under a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "_eq")] Eq,
    #[serde(rename = "_neq")] Neq,
    #[serde(rename = "_gt")] Gt,
    #[serde(rename = "_gte")] Gte,
    #[serde(rename = "_lt")] Lt,
    #[serde(rename = "_lte")] Lte,
    #[serde(rename = "_in")] In,
    #[serde(rename = "_nin")] Nin,
    #[serde(rename = "_contains")] Contains,
    #[serde(rename = "_icontains")] IContains,
    #[serde(rename = "_regex")] Regex,
    #[serde(rename = "_null")] Null,
}

impl FilterOp {
    pub fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "_eq" => FilterOp::Eq,
            "_neq" => FilterOp::Neq,
            "_gt" => FilterOp::Gt,
            "_gte" => FilterOp::Gte,
            "_lt" => FilterOp::Lt,
            "_lte" => FilterOp::Lte,
            "_in" => FilterOp::In,
            "_nin" => FilterOp::Nin,
            "_contains" => FilterOp::Contains,
            "_icontains" => FilterOp::IContains,
            "_regex" => FilterOp::Regex,
            "_null" => FilterOp::Null,
            _ => return None,
        })
    }

    pub fn key(&self) -> &'static str {
        match self {
            FilterOp::Eq => "_eq",
            FilterOp::Neq => "_neq",
            FilterOp::Gt => "_gt",
            FilterOp::Gte => "_gte",
            FilterOp::Lt => "_lt",
            FilterOp::Lte => "_lte",
            FilterOp::In => "_in",
            FilterOp::Nin => "_nin",
            FilterOp::Contains => "_contains",
            FilterOp::IContains => "_icontains",
            FilterOp::Regex => "_regex",
            FilterOp::Null => "_null",
        }
    }

    /// Positive comparison and whether the leaf is negated
    pub fn comparison(&self) -> (Comparison, bool) {
        match self {
            FilterOp::Eq => (Comparison::Eq, false),
            FilterOp::Neq => (Comparison::Eq, true),
            FilterOp::Gt => (Comparison::Gt, false),
            FilterOp::Gte => (Comparison::Gte, false),
            FilterOp::Lt => (Comparison::Lt, false),
            FilterOp::Lte => (Comparison::Lte, false),
            FilterOp::In => (Comparison::In, false),
            FilterOp::Nin => (Comparison::In, true),
            FilterOp::Contains => (Comparison::Contains, false),
            FilterOp::IContains => (Comparison::IContains, false),
            FilterOp::Regex => (Comparison::Regex, false),
            FilterOp::Null => (Comparison::IsNull, false),
        }
    }
}

/// Conjunction operators combining sub-expressions at the same path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    And,
    Or,
    Not,
}

impl Conjunction {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "_and" => Some(Conjunction::And),
            "_or" => Some(Conjunction::Or),
            "_not" => Some(Conjunction::Not),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Conjunction::And => "_and",
            Conjunction::Or => "_or",
            Conjunction::Not => "_not",
        }
    }
}

/// Leaf comparison kinds; negation lives in the tree, not here
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Contains,
    IContains,
    Regex,
    /// Operand is a boolean: `true` matches null/absent, `false` matches present
    IsNull,
}

/// Field path from the queried entity, following relationships segment by segment
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn root() -> Self {
        Self(vec![])
    }

    pub fn from_segments(segments: &[String]) -> Self {
        Self(segments.to_vec())
    }

    /// Parses `a__b__c` into three segments
    pub fn parse(path: &str) -> Self {
        Self::root().join(path)
    }

    /// Extends the path; the segment itself may already be `__`-joined
    pub fn join(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.extend(
            segment
                .split(PATH_SEPARATOR)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(PATH_SEPARATOR))
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        FieldPath::parse(path)
    }
}

/// Compiled boolean predicate over a row
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Identity: matches every row
    All,
    Compare {
        path: FieldPath,
        op: Comparison,
        value: Value,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// Some row reached through the `link` relationship satisfies `predicate`,
    /// which is evaluated against the related table
    Related {
        link: String,
        predicate: Box<Predicate>,
    },
}

impl Predicate {
    pub fn compare(path: impl Into<FieldPath>, op: Comparison, value: impl Into<Value>) -> Self {
        Predicate::Compare { path: path.into(), op, value: value.into() }
    }

    pub fn eq(path: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self::compare(path, Comparison::Eq, value)
    }

    pub fn related(link: impl Into<String>, predicate: Predicate) -> Self {
        Predicate::Related { link: link.into(), predicate: Box::new(predicate) }
    }

    pub fn one_of(path: impl Into<FieldPath>, values: Vec<Value>) -> Self {
        Self::compare(path, Comparison::In, Value::Array(values))
    }

    /// Intersection; `All` members vanish and nested intersections flatten
    pub fn all_of(predicates: Vec<Predicate>) -> Self {
        let mut parts = Vec::with_capacity(predicates.len());
        for predicate in predicates {
            match predicate {
                Predicate::All => {}
                Predicate::And(inner) => parts.extend(inner),
                other => parts.push(other),
            }
        }
        match parts.len() {
            0 => Predicate::All,
            1 => parts.remove(0),
            _ => Predicate::And(parts),
        }
    }

    /// Union; a single member stands for itself
    pub fn any_of(predicates: Vec<Predicate>) -> Self {
        if predicates.iter().any(Predicate::is_all) {
            return Predicate::All;
        }
        let mut parts = Vec::with_capacity(predicates.len());
        for predicate in predicates {
            match predicate {
                Predicate::Or(inner) => parts.extend(inner),
                other => parts.push(other),
            }
        }
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Predicate::Or(parts)
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        Self::all_of(vec![self, other])
    }

    pub fn negate(self) -> Self {
        match self {
            Predicate::Not(inner) => *inner,
            other => Predicate::Not(Box::new(other)),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Predicate::All)
    }

    /// First segment of every compared path
    pub fn root_fields(&self) -> BTreeSet<String> {
        let mut roots = BTreeSet::new();
        self.collect_roots(&mut roots);
        roots
    }

    fn collect_roots(&self, roots: &mut BTreeSet<String>) {
        match self {
            Predicate::All => {}
            Predicate::Compare { path, .. } => {
                if let Some(first) = path.first() {
                    roots.insert(first.to_string());
                }
            }
            Predicate::And(parts) | Predicate::Or(parts) => parts.iter().for_each(|p| p.collect_roots(roots)),
            Predicate::Not(inner) => inner.collect_roots(roots),
            Predicate::Related { link, .. } => {
                roots.insert(link.clone());
            }
        }
    }
}
