use serde_json::{Map, Value};

use super::error::FilterError;
use super::types::{Comparison, Conjunction, FieldPath, FilterOp, Predicate};

/// Compiles JSON filter expressions into predicate trees
#[derive(Debug, Clone)]
pub struct FilterCompiler {
    max_depth: u32,
    debug_logging: bool,
}

impl Default for FilterCompiler {
    fn default() -> Self {
        Self { max_depth: 32, debug_logging: false }
    }
}

impl FilterCompiler {
    pub fn new(max_depth: u32) -> Self {
        Self { max_depth, ..Self::default() }
    }

    pub fn with_debug_logging(mut self, enabled: bool) -> Self {
        self.debug_logging = enabled;
        self
    }

    pub fn from_config(config: &crate::config::FilterConfig) -> Self {
        Self::new(config.max_nested_depth).with_debug_logging(config.debug_logging)
    }

    pub fn compile(&self, expr: &Value) -> Result<Predicate, FilterError> {
        self.compile_at(expr, &FieldPath::root())
    }

    pub fn compile_at(&self, expr: &Value, base: &FieldPath) -> Result<Predicate, FilterError> {
        let predicate = match expr {
            Value::Null => Predicate::All,
            Value::Object(obj) => self.compile_object(obj, base, 0)?,
            _ => {
                return Err(FilterError::InvalidExpression(
                    "filter must be an object".to_string(),
                ))
            }
        };
        if self.debug_logging {
            tracing::debug!("Compiled filter {} into {:?}", expr, predicate);
        }
        Ok(predicate)
    }

    fn compile_object(&self, obj: &Map<String, Value>, base: &FieldPath, depth: u32) -> Result<Predicate, FilterError> {
        if depth > self.max_depth {
            return Err(FilterError::DepthExceeded(self.max_depth));
        }

        let mut parts = Vec::with_capacity(obj.len());
        for (key, value) in obj {
            if let Some(conjunction) = Conjunction::from_key(key) {
                parts.push(self.compile_conjunction(conjunction, value, base, depth)?);
            } else if let Some(op) = FilterOp::from_key(key) {
                parts.push(Self::compile_relation(op, value, base)?);
            } else if key.starts_with('_') {
                return Err(FilterError::UnsupportedOperator(key.clone()));
            } else {
                parts.push(self.compile_field(key, value, base, depth)?);
            }
        }
        Ok(Predicate::all_of(parts))
    }

    fn compile_field(&self, key: &str, value: &Value, base: &FieldPath, depth: u32) -> Result<Predicate, FilterError> {
        let path = base.join(key);
        if path.len() == base.len() {
            return Err(FilterError::InvalidExpression(format!("empty field name '{}'", key)));
        }
        match value {
            Value::Object(inner) => self.compile_object(inner, &path, depth + 1),
            // Implicit equality: { field: value }
            literal => Ok(Predicate::compare(path, Comparison::Eq, literal.clone())),
        }
    }

    fn compile_conjunction(&self, conjunction: Conjunction, value: &Value, base: &FieldPath, depth: u32) -> Result<Predicate, FilterError> {
        let items = value.as_array().ok_or_else(|| FilterError::InvalidOperand {
            operator: conjunction.key().to_string(),
            reason: "requires an array of filter objects".to_string(),
        })?;
        if items.is_empty() {
            return Err(FilterError::InvalidOperand {
                operator: conjunction.key().to_string(),
                reason: "requires at least one filter object".to_string(),
            });
        }

        let mut compiled = Vec::with_capacity(items.len());
        for item in items {
            let obj = item.as_object().ok_or_else(|| FilterError::InvalidOperand {
                operator: conjunction.key().to_string(),
                reason: format!("expected filter object, got {}", item),
            })?;
            compiled.push(self.compile_object(obj, base, depth + 1)?);
        }

        Ok(match conjunction {
            Conjunction::And => Predicate::all_of(compiled),
            Conjunction::Or => Predicate::any_of(compiled),
            Conjunction::Not => Predicate::all_of(compiled).negate(),
        })
    }

    fn compile_relation(op: FilterOp, value: &Value, base: &FieldPath) -> Result<Predicate, FilterError> {
        if base.is_root() {
            return Err(FilterError::MissingField(op.key().to_string()));
        }

        let invalid = |reason: &str| FilterError::InvalidOperand {
            operator: op.key().to_string(),
            reason: reason.to_string(),
        };
        match op {
            FilterOp::In | FilterOp::Nin if !value.is_array() => return Err(invalid("requires an array")),
            FilterOp::IContains if !value.is_string() => return Err(invalid("requires a string")),
            FilterOp::Null if !value.is_boolean() => return Err(invalid("requires a boolean")),
            FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte if value.is_null() => {
                return Err(invalid("cannot compare against null"))
            }
            FilterOp::Regex => {
                let pattern = value.as_str().ok_or_else(|| invalid("requires a string pattern"))?;
                regex::Regex::new(pattern).map_err(|e| FilterError::InvalidRegex(e.to_string()))?;
            }
            _ => {}
        }

        let (comparison, negated) = op.comparison();
        let leaf = Predicate::compare(base.clone(), comparison, value.clone());
        Ok(if negated { leaf.negate() } else { leaf })
    }
}

/// Compiles with default limits
pub fn compile(expr: &Value) -> Result<Predicate, FilterError> {
    FilterCompiler::default().compile(expr)
}
