pub mod fixtures;
pub mod memory;
pub mod postgres;
pub mod schema;
pub mod sql;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::filter::Predicate;
pub use crate::types::Row;

pub use fixtures::Fixtures;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use schema::{Link, LinkKind, Schema, TableSchema};

/// Errors from row stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{table} with primary key {pk} not found")]
    NotFound { table: String, pk: Value },

    /// Constraint violations, carrying the store's native kind (e.g. `UniqueViolation`)
    #[error("{kind}: {message}")]
    Integrity { kind: String, message: String },

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Unsupported query: {0}")]
    Unsupported(String),

    #[error("Fixture error: {0}")]
    Fixture(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl StoreError {
    pub fn integrity(kind: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Integrity { kind: kind.into(), message: message.into() }
    }
}

/// One write inside an atomic batch
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Insert { table: String, row: Row },
    Update { table: String, predicate: Predicate, values: Row },
    Delete { table: String, predicate: Predicate },
    /// Fails the whole batch with `NotFound { pk }` unless some row matches
    Expect { table: String, predicate: Predicate, pk: Value },
}

impl Mutation {
    pub fn table(&self) -> &str {
        match self {
            Mutation::Insert { table, .. }
            | Mutation::Update { table, .. }
            | Mutation::Delete { table, .. }
            | Mutation::Expect { table, .. } => table,
        }
    }
}

/// Narrow storage interface consumed by the gateway.
/// `batch` must be all-or-nothing: on error no mutation in it persists.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn fetch_many(&self, table: &str, predicate: &Predicate) -> Result<Vec<Row>, StoreError>;

    /// Applies every mutation atomically, returning the affected rows per mutation
    async fn batch(&self, mutations: Vec<Mutation>) -> Result<Vec<Vec<Row>>, StoreError>;

    async fn fetch_one(&self, table: &str, predicate: &Predicate) -> Result<Option<Row>, StoreError> {
        Ok(self.fetch_many(table, predicate).await?.into_iter().next())
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        let affected = self
            .batch(vec![Mutation::Insert { table: table.to_string(), row }])
            .await?;
        affected
            .into_iter()
            .next()
            .and_then(|rows| rows.into_iter().next())
            .ok_or_else(|| StoreError::Unsupported(format!("insert into {} returned no row", table)))
    }

    async fn update(&self, table: &str, predicate: &Predicate, values: Row) -> Result<Vec<Row>, StoreError> {
        let affected = self
            .batch(vec![Mutation::Update { table: table.to_string(), predicate: predicate.clone(), values }])
            .await?;
        Ok(affected.into_iter().next().unwrap_or_default())
    }

    async fn delete(&self, table: &str, predicate: &Predicate) -> Result<Vec<Row>, StoreError> {
        let affected = self
            .batch(vec![Mutation::Delete { table: table.to_string(), predicate: predicate.clone() }])
            .await?;
        Ok(affected.into_iter().next().unwrap_or_default())
    }

    /// Connectivity check for `/health`
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Identifier check shared by the SQL renderer and the Postgres store
pub fn validate_identifier(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let valid_start = chars.next().map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StoreError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

pub fn quote_identifier(name: &str) -> Result<String, StoreError> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name))
}
