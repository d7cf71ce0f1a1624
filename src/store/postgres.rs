use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::error::ErrorKind;
use sqlx::postgres::{PgArguments, PgConnection, PgPoolOptions};
use sqlx::query::QueryScalar;
use sqlx::{PgPool, Postgres};
use tracing::info;

use super::schema::{Schema, TableSchema};
use super::sql::{FilterWhere, SqlResult};
use super::{quote_identifier, Mutation, Row, RowStore, StoreError};
use crate::config::DatabaseConfig;
use crate::filter::Predicate;

/// Row store over a Postgres pool. Rows travel as `to_jsonb` documents so
/// the store needs no compile-time knowledge of table shapes.
pub struct PgStore {
    pool: PgPool,
    schema: Schema,
    log_queries: bool,
}

impl PgStore {
    pub fn new(pool: PgPool, schema: Schema) -> Self {
        Self { pool, schema, log_queries: false }
    }

    pub async fn connect(url: &str, config: &DatabaseConfig, schema: Schema) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(url)
            .await?;
        info!("Created database pool with {} max connections", config.max_connections);
        Ok(Self::new(pool, schema).with_query_logging(config.enable_query_logging))
    }

    pub fn with_query_logging(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }

    fn table_schema(&self, table: &str) -> Result<&TableSchema, StoreError> {
        self.schema
            .table(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }

    fn select_sql(&self, table: &str, predicate: &Predicate) -> Result<SqlResult, StoreError> {
        let schema = self.table_schema(table)?;
        let where_result = FilterWhere::generate(&self.schema, table, predicate, 0)?;
        Ok(SqlResult {
            query: format!(
                "SELECT to_jsonb(t0) FROM {} AS t0 WHERE {} ORDER BY t0.{}",
                quote_identifier(table)?,
                where_result.query,
                quote_identifier(&schema.primary_key)?
            ),
            params: where_result.params,
        })
    }

    fn insert_sql(&self, table: &str, row: Row) -> Result<SqlResult, StoreError> {
        self.table_schema(table)?;
        let quoted_table = quote_identifier(table)?;
        if row.is_empty() {
            return Ok(SqlResult {
                query: format!("INSERT INTO {} AS t0 DEFAULT VALUES RETURNING to_jsonb(t0)", quoted_table),
                params: vec![],
            });
        }

        let columns = row.keys().map(|c| quote_identifier(c)).collect::<Result<Vec<_>, _>>()?;
        let sources: Vec<String> = columns.iter().map(|c| format!("r.{}", c)).collect();
        Ok(SqlResult {
            query: format!(
                "INSERT INTO {} AS t0 ({}) SELECT {} FROM jsonb_populate_record(NULL::{}, $1) AS r RETURNING to_jsonb(t0)",
                quoted_table,
                columns.join(", "),
                sources.join(", "),
                quoted_table
            ),
            params: vec![Value::Object(row)],
        })
    }

    fn update_sql(&self, table: &str, predicate: &Predicate, values: Row) -> Result<SqlResult, StoreError> {
        self.table_schema(table)?;
        let quoted_table = quote_identifier(table)?;
        let assignments = values
            .keys()
            .map(|c| quote_identifier(c).map(|q| format!("{} = r.{}", q, q)))
            .collect::<Result<Vec<_>, _>>()?;
        let where_result = FilterWhere::generate(&self.schema, table, predicate, 1)?;

        let mut params = vec![Value::Object(values)];
        params.extend(where_result.params);
        Ok(SqlResult {
            query: format!(
                "UPDATE {} AS t0 SET {} FROM jsonb_populate_record(NULL::{}, $1) AS r WHERE {} RETURNING to_jsonb(t0)",
                quoted_table,
                assignments.join(", "),
                quoted_table,
                where_result.query
            ),
            params,
        })
    }

    fn delete_sql(&self, table: &str, predicate: &Predicate) -> Result<SqlResult, StoreError> {
        self.table_schema(table)?;
        let where_result = FilterWhere::generate(&self.schema, table, predicate, 0)?;
        Ok(SqlResult {
            query: format!(
                "DELETE FROM {} AS t0 WHERE {} RETURNING to_jsonb(t0)",
                quote_identifier(table)?,
                where_result.query
            ),
            params: where_result.params,
        })
    }

    /// Statement for one mutation, plus the not-found error raised when an expectation matches nothing
    fn mutation_sql(&self, mutation: Mutation) -> Result<(SqlResult, Option<StoreError>), StoreError> {
        Ok(match mutation {
            Mutation::Insert { table, row } => (self.insert_sql(&table, row)?, None),
            Mutation::Update { table, predicate, values } if values.is_empty() => (self.select_sql(&table, &predicate)?, None),
            Mutation::Update { table, predicate, values } => (self.update_sql(&table, &predicate, values)?, None),
            Mutation::Delete { table, predicate } => (self.delete_sql(&table, &predicate)?, None),
            Mutation::Expect { table, predicate, pk } => {
                let sql = self.select_sql(&table, &predicate)?;
                (sql, Some(StoreError::NotFound { table, pk }))
            }
        })
    }

    async fn fetch_rows(&self, conn: &mut PgConnection, sql: &SqlResult) -> Result<Vec<Row>, StoreError> {
        if self.log_queries {
            tracing::debug!("SQL: {} ({} params)", sql.query, sql.params.len());
        }
        let mut query = sqlx::query_scalar::<_, Value>(&sql.query);
        for param in &sql.params {
            query = bind_param(query, param);
        }
        let values = query.fetch_all(&mut *conn).await.map_err(map_sqlx_error)?;
        Ok(values
            .into_iter()
            .filter_map(|value| match value {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect())
    }
}

#[async_trait]
impl RowStore for PgStore {
    async fn fetch_many(&self, table: &str, predicate: &Predicate) -> Result<Vec<Row>, StoreError> {
        let sql = self.select_sql(table, predicate)?;
        let mut conn = self.pool.acquire().await?;
        self.fetch_rows(&mut conn, &sql).await
    }

    async fn batch(&self, mutations: Vec<Mutation>) -> Result<Vec<Vec<Row>>, StoreError> {
        let statements = mutations
            .into_iter()
            .map(|m| self.mutation_sql(m))
            .collect::<Result<Vec<_>, _>>()?;

        // Dropping the transaction on error rolls it back
        let mut tx = self.pool.begin().await?;
        let mut affected = Vec::with_capacity(statements.len());
        for (sql, not_found) in statements {
            let rows = self.fetch_rows(&mut tx, &sql).await?;
            if let (true, Some(err)) = (rows.is_empty(), not_found) {
                return Err(err);
            }
            affected.push(rows);
        }
        tx.commit().await?;
        Ok(affected)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn bind_param<'q>(
    q: QueryScalar<'q, Postgres, Value, PgArguments>,
    v: &Value,
) -> QueryScalar<'q, Postgres, Value, PgArguments> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s.clone()),
        // Composite values travel as JSONB
        Value::Array(_) | Value::Object(_) => q.bind(v.clone()),
    }
}

/// Constraint violations keep their native kind; everything else stays a driver error
fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        let kind = match db.kind() {
            ErrorKind::UniqueViolation => Some("UniqueViolation"),
            ErrorKind::ForeignKeyViolation => Some("ForeignKeyViolation"),
            ErrorKind::NotNullViolation => Some("NotNullViolation"),
            ErrorKind::CheckViolation => Some("CheckViolation"),
            _ => None,
        };
        if let Some(kind) = kind {
            return StoreError::integrity(kind, db.message());
        }
    }
    StoreError::Sqlx(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::TableSchema;
    use serde_json::json;

    fn store() -> PgStore {
        // connect_lazy never touches the network until a query runs
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/uql_test")
            .unwrap();
        PgStore::new(pool, Schema::new().with_table(TableSchema::new("users", "id")))
    }

    #[tokio::test]
    async fn test_select_sql_orders_by_primary_key() {
        let sql = store().select_sql("users", &Predicate::eq("email", "a@b.com")).unwrap();
        assert_eq!(
            sql.query,
            "SELECT to_jsonb(t0) FROM \"users\" AS t0 WHERE t0.\"email\" = $1 ORDER BY t0.\"id\""
        );
    }

    #[tokio::test]
    async fn test_update_sql_offsets_where_params() {
        let values = json!({"email": "x@y.com"}).as_object().cloned().unwrap();
        let sql = store().update_sql("users", &Predicate::eq("id", 4), values).unwrap();
        assert_eq!(
            sql.query,
            "UPDATE \"users\" AS t0 SET \"email\" = r.\"email\" FROM jsonb_populate_record(NULL::\"users\", $1) AS r WHERE t0.\"id\" = $2 RETURNING to_jsonb(t0)"
        );
        assert_eq!(sql.params, vec![json!({"email": "x@y.com"}), json!(4)]);
    }

    #[tokio::test]
    async fn test_unknown_table_is_rejected() {
        assert!(matches!(
            store().delete_sql("ghosts", &Predicate::All),
            Err(StoreError::UnknownTable(_))
        ));
    }
}
