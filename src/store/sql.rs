use serde_json::Value;

use super::schema::{Link, LinkKind, Schema};
use super::{quote_identifier, StoreError};
use crate::filter::{Comparison, Predicate};

#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<Value>,
}

/// Renders a predicate tree as a parameterized Postgres WHERE clause.
/// The queried table is aliased `t0`; each followed link opens a sub-select
/// on the next alias.
pub struct FilterWhere<'a> {
    schema: &'a Schema,
    param_values: Vec<Value>,
    param_index: usize,
    alias_index: usize,
}

impl<'a> FilterWhere<'a> {
    pub fn new(schema: &'a Schema, starting_param_index: usize) -> Self {
        Self {
            schema,
            param_values: vec![],
            param_index: starting_param_index,
            alias_index: 0,
        }
    }

    pub fn generate(
        schema: &Schema,
        table: &str,
        predicate: &Predicate,
        starting_param_index: usize,
    ) -> Result<SqlResult, StoreError> {
        let mut filter_where = FilterWhere::new(schema, starting_param_index);
        let query = filter_where.build(table, "t0", predicate)?;
        Ok(SqlResult { query, params: filter_where.param_values })
    }

    fn build(&mut self, table: &str, alias: &str, predicate: &Predicate) -> Result<String, StoreError> {
        match predicate {
            Predicate::All => Ok("1=1".to_string()),
            Predicate::And(parts) => self.build_group(table, alias, parts, " AND ", "1=1"),
            Predicate::Or(parts) => self.build_group(table, alias, parts, " OR ", "1=0"),
            Predicate::Not(inner) => Ok(format!("NOT ({})", self.build(table, alias, inner)?)),
            Predicate::Compare { path, op, value } => self.build_compare(table, alias, path.segments(), *op, value),
            Predicate::Related { link: field, predicate } => {
                let link = self.schema.link(table, field).cloned().ok_or_else(|| {
                    StoreError::Unsupported(format!("{} is not a relationship of {}", field, table))
                })?;
                let column = format!("{}.{}", alias, quote_identifier(field)?);
                let sub_alias = self.next_alias();
                let inner = self.build(&link.target_table, &sub_alias, predicate)?;
                self.link_subquery(table, alias, &column, &link, &sub_alias, &inner)
            }
        }
    }

    fn build_group(&mut self, table: &str, alias: &str, parts: &[Predicate], joiner: &str, empty: &str) -> Result<String, StoreError> {
        if parts.is_empty() {
            return Ok(empty.to_string());
        }
        let mut sql_parts = Vec::with_capacity(parts.len());
        for part in parts {
            sql_parts.push(self.build(table, alias, part)?);
        }
        Ok(format!("({})", sql_parts.join(joiner)))
    }

    fn build_compare(
        &mut self,
        table: &str,
        alias: &str,
        segments: &[String],
        op: Comparison,
        value: &Value,
    ) -> Result<String, StoreError> {
        let Some((head, rest)) = segments.split_first() else {
            return Err(StoreError::Unsupported("comparison without a field".to_string()));
        };
        let column = format!("{}.{}", alias, quote_identifier(head)?);

        match self.schema.link(table, head).cloned() {
            Some(link) if !rest.is_empty() => {
                let sub_alias = self.next_alias();
                let inner = self.build_compare(&link.target_table, &sub_alias, rest, op, value)?;
                self.link_subquery(table, alias, &column, &link, &sub_alias, &inner)
            }
            Some(link) if matches!(link.kind, LinkKind::Reverse { .. }) => {
                // A bare reverse link compares against the related keys
                let sub_alias = self.next_alias();
                let key = [link.target_key.clone()];
                let inner = self.build_compare(&link.target_table, &sub_alias, &key, op, value)?;
                self.link_subquery(table, alias, &column, &link, &sub_alias, &inner)
            }
            Some(link) if link.kind == LinkKind::ColumnArray => self.array_condition(&column, op, value),
            _ if !rest.is_empty() => Err(StoreError::Unsupported(format!(
                "{} is not a relationship of {}",
                head, table
            ))),
            _ => self.condition(&column, op, value),
        }
    }

    fn link_subquery(
        &mut self,
        table: &str,
        alias: &str,
        column: &str,
        link: &Link,
        sub_alias: &str,
        inner: &str,
    ) -> Result<String, StoreError> {
        let target = quote_identifier(&link.target_table)?;
        let target_key = quote_identifier(&link.target_key)?;
        Ok(match &link.kind {
            LinkKind::Column => format!(
                "{} IN (SELECT {}.{} FROM {} AS {} WHERE {})",
                column, sub_alias, target_key, target, sub_alias, inner
            ),
            LinkKind::ColumnArray => format!(
                "{} && ARRAY(SELECT {}.{} FROM {} AS {} WHERE {})",
                column, sub_alias, target_key, target, sub_alias, inner
            ),
            LinkKind::Reverse { column: remote } => {
                let primary_key = self
                    .schema
                    .table(table)
                    .map(|t| t.primary_key.clone())
                    .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
                format!(
                    "{}.{} IN (SELECT {}.{} FROM {} AS {} WHERE {})",
                    alias,
                    quote_identifier(&primary_key)?,
                    sub_alias,
                    quote_identifier(remote)?,
                    target,
                    sub_alias,
                    inner
                )
            }
        })
    }

    fn condition(&mut self, column: &str, op: Comparison, value: &Value) -> Result<String, StoreError> {
        Ok(match op {
            Comparison::Eq => {
                if value.is_null() { format!("{} IS NULL", column) }
                else { format!("{} = {}", column, self.param(value.clone())) }
            }
            Comparison::Gt => format!("{} > {}", column, self.param(value.clone())),
            Comparison::Gte => format!("{} >= {}", column, self.param(value.clone())),
            Comparison::Lt => format!("{} < {}", column, self.param(value.clone())),
            Comparison::Lte => format!("{} <= {}", column, self.param(value.clone())),
            Comparison::In => {
                let values = value.as_array().cloned().unwrap_or_default();
                if values.is_empty() { return Ok("1=0".to_string()); }
                let params: Vec<String> = values.into_iter().map(|v| self.param(v)).collect();
                format!("{} IN ({})", column, params.join(", "))
            }
            Comparison::Contains => match value {
                Value::String(_) => format!("strpos({}::text, {}) > 0", column, self.param(value.clone())),
                _ => return Err(StoreError::Unsupported("_contains on a scalar column requires a string".to_string())),
            },
            Comparison::IContains => format!("strpos(lower({}::text), lower({})) > 0", column, self.param(value.clone())),
            Comparison::Regex => format!("{}::text ~ {}", column, self.param(value.clone())),
            Comparison::IsNull => {
                if value.as_bool().unwrap_or(true) { format!("{} IS NULL", column) }
                else { format!("{} IS NOT NULL", column) }
            }
        })
    }

    fn array_condition(&mut self, column: &str, op: Comparison, value: &Value) -> Result<String, StoreError> {
        Ok(match op {
            Comparison::Eq | Comparison::Contains if !value.is_null() => {
                format!("{} = ANY({})", self.param(value.clone()), column)
            }
            Comparison::In => {
                let values = value.as_array().cloned().unwrap_or_default();
                if values.is_empty() { return Ok("1=0".to_string()); }
                let params: Vec<String> = values.into_iter().map(|v| self.param(v)).collect();
                format!("{} && ARRAY[{}]", column, params.join(", "))
            }
            Comparison::IsNull => self.condition(column, Comparison::IsNull, value)?,
            Comparison::Eq => self.condition(column, Comparison::IsNull, &Value::Bool(true))?,
            other => return Err(StoreError::Unsupported(format!("{:?} on an array column", other))),
        })
    }

    fn next_alias(&mut self) -> String {
        self.alias_index += 1;
        format!("t{}", self.alias_index)
    }

    fn param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::compile;
    use crate::store::schema::TableSchema;
    use serde_json::json;

    fn schema() -> Schema {
        let mut users = TableSchema::new("users", "id");
        users.links.insert(
            "projects".to_string(),
            Link {
                target_table: "projects".to_string(),
                target_key: "id".to_string(),
                kind: LinkKind::Reverse { column: "author".to_string() },
            },
        );
        let mut projects = TableSchema::new("projects", "id");
        projects.links.insert(
            "author".to_string(),
            Link { target_table: "users".to_string(), target_key: "id".to_string(), kind: LinkKind::Column },
        );
        Schema::new().with_table(users).with_table(projects)
    }

    fn render(table: &str, expr: Value, start: usize) -> SqlResult {
        FilterWhere::generate(&schema(), table, &compile(&expr).unwrap(), start).unwrap()
    }

    #[test]
    fn test_leaf_conditions() {
        let sql = render("users", json!({"email": {"_eq": "a@b.com"}}), 0);
        assert_eq!(sql.query, "t0.\"email\" = $1");
        assert_eq!(sql.params, vec![json!("a@b.com")]);

        let sql = render("users", json!({"id": {"_in": []}}), 0);
        assert_eq!(sql.query, "1=0");

        let sql = render("users", json!({"role": {"_null": true}}), 0);
        assert_eq!(sql.query, "t0.\"role\" IS NULL");
    }

    #[test]
    fn test_conjunctions_and_param_offset() {
        let sql = render("users", json!({"_or": [{"id": {"_eq": 1}}, {"id": {"_nin": [2, 3]}}]}), 1);
        assert_eq!(sql.query, "(t0.\"id\" = $2 OR NOT (t0.\"id\" IN ($3, $4)))");
        assert_eq!(sql.params.len(), 3);
    }

    #[test]
    fn test_links_render_as_subqueries() {
        let sql = render("projects", json!({"author": {"email": {"_eq": "a@b.com"}}}), 0);
        assert_eq!(
            sql.query,
            "t0.\"author\" IN (SELECT t1.\"id\" FROM \"users\" AS t1 WHERE t1.\"email\" = $1)"
        );

        let sql = render("users", json!({"projects__name": {"_eq": "p1"}}), 0);
        assert_eq!(
            sql.query,
            "t0.\"id\" IN (SELECT t1.\"author\" FROM \"projects\" AS t1 WHERE t1.\"name\" = $1)"
        );
    }

    #[test]
    fn test_related_rows_carry_their_own_conditions() {
        use crate::filter::Predicate;

        let predicate = Predicate::related(
            "author",
            Predicate::eq("is_active", true).and(Predicate::eq("email", "a@b.com")),
        );
        let sql = FilterWhere::generate(&schema(), "projects", &predicate, 0).unwrap();
        assert_eq!(
            sql.query,
            "t0.\"author\" IN (SELECT t1.\"id\" FROM \"users\" AS t1 WHERE (t1.\"is_active\" = $1 AND t1.\"email\" = $2))"
        );
        assert_eq!(sql.params, vec![json!(true), json!("a@b.com")]);

        let missing = Predicate::related("editor", Predicate::All);
        assert!(FilterWhere::generate(&schema(), "projects", &missing, 0).is_err());
    }

    #[test]
    fn test_rejects_unsafe_identifiers() {
        let predicate = crate::filter::Predicate::eq("name\"; DROP TABLE users; --", 1);
        assert!(FilterWhere::generate(&schema(), "users", &predicate, 0).is_err());
    }
}
