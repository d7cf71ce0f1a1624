use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use super::schema::{Link, LinkKind, Schema, TableSchema};
use super::{Mutation, Row, RowStore, StoreError};
use crate::filter::eval::json_values;
use crate::filter::{loosely_equal, FieldPath, FieldResolver, Predicate};

#[derive(Debug, Clone)]
struct Table {
    rows: Vec<Row>,
    next_id: i64,
}

impl Default for Table {
    fn default() -> Self {
        Self { rows: vec![], next_id: 1 }
    }
}

type Tables = HashMap<String, Table>;

/// In-process row store. Batches run against a copy of the tables which
/// replaces the live set only when every mutation succeeded.
pub struct MemoryStore {
    schema: Schema,
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new(schema: Schema) -> Self {
        let tables = schema
            .tables()
            .map(|t| (t.name.clone(), Table::default()))
            .collect();
        Self { schema, tables: RwLock::new(tables) }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub async fn count(&self, table: &str) -> usize {
        self.tables.read().await.get(table).map_or(0, |t| t.rows.len())
    }

    fn table_schema(&self, table: &str) -> Result<&TableSchema, StoreError> {
        self.schema
            .table(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }

    fn apply(&self, tables: &mut Tables, mutation: Mutation) -> Result<Vec<Row>, StoreError> {
        match mutation {
            Mutation::Insert { table, row } => self.apply_insert(tables, &table, row).map(|row| vec![row]),
            Mutation::Update { table, predicate, values } => self.apply_update(tables, &table, &predicate, &values),
            Mutation::Delete { table, predicate } => self.apply_delete(tables, &table, &predicate),
            Mutation::Expect { table, predicate, pk } => {
                self.table_schema(&table)?;
                let scope = Scope { schema: &self.schema, tables: &*tables };
                let rows = scope.rows(&table);
                let matched: Vec<Row> = scope
                    .matching(&table, &predicate)
                    .into_iter()
                    .filter_map(|i| rows.get(i).cloned())
                    .collect();
                if matched.is_empty() {
                    return Err(StoreError::NotFound { table, pk });
                }
                Ok(matched)
            }
        }
    }

    fn apply_insert(&self, tables: &mut Tables, table: &str, row: Row) -> Result<Row, StoreError> {
        let schema = self.table_schema(table)?;
        let mut record = schema.defaults.clone();
        record.extend(row);

        let next_id = tables.get(table).map_or(1, |t| t.next_id);
        if record.get(&schema.primary_key).map_or(true, Value::is_null) {
            record.insert(schema.primary_key.clone(), json!(next_id));
        }

        let scope = Scope { schema: &self.schema, tables: &*tables };
        scope.check_unique(schema, &record, None)?;
        scope.check_links(schema, &record)?;

        let entry = tables.entry(table.to_string()).or_default();
        if let Some(id) = record.get(&schema.primary_key).and_then(Value::as_i64) {
            entry.next_id = entry.next_id.max(id + 1);
        }
        entry.rows.push(record.clone());
        Ok(record)
    }

    fn apply_update(&self, tables: &mut Tables, table: &str, predicate: &Predicate, values: &Row) -> Result<Vec<Row>, StoreError> {
        let schema = self.table_schema(table)?;
        let indexes = Scope { schema: &self.schema, tables: &*tables }.matching(table, predicate);

        let mut updated = Vec::with_capacity(indexes.len());
        for index in indexes {
            let Some(mut record) = tables.get(table).and_then(|t| t.rows.get(index)).cloned() else {
                continue;
            };
            for (key, value) in values {
                record.insert(key.clone(), value.clone());
            }

            let scope = Scope { schema: &self.schema, tables: &*tables };
            scope.check_unique(schema, &record, Some(index))?;
            scope.check_links(schema, &record)?;

            if let Some(slot) = tables.get_mut(table).and_then(|t| t.rows.get_mut(index)) {
                *slot = record.clone();
            }
            updated.push(record);
        }
        Ok(updated)
    }

    fn apply_delete(&self, tables: &mut Tables, table: &str, predicate: &Predicate) -> Result<Vec<Row>, StoreError> {
        self.table_schema(table)?;
        let indexes = Scope { schema: &self.schema, tables: &*tables }.matching(table, predicate);

        let Some(entry) = tables.get_mut(table) else {
            return Ok(vec![]);
        };
        let mut removed: Vec<Row> = indexes.iter().rev().map(|&i| entry.rows.remove(i)).collect();
        removed.reverse();
        Ok(removed)
    }
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn fetch_many(&self, table: &str, predicate: &Predicate) -> Result<Vec<Row>, StoreError> {
        self.table_schema(table)?;
        let tables = self.tables.read().await;
        let scope = Scope { schema: &self.schema, tables: &tables };
        let rows = scope.rows(table);
        Ok(scope
            .matching(table, predicate)
            .into_iter()
            .filter_map(|i| rows.get(i).cloned())
            .collect())
    }

    async fn batch(&self, mutations: Vec<Mutation>) -> Result<Vec<Vec<Row>>, StoreError> {
        let mut live = self.tables.write().await;
        let mut working = live.clone();

        let mut affected = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            affected.push(self.apply(&mut working, mutation)?);
        }

        *live = working;
        Ok(affected)
    }
}

/// Read view over a consistent set of tables
struct Scope<'a> {
    schema: &'a Schema,
    tables: &'a Tables,
}

impl<'a> Scope<'a> {
    fn rows(&self, table: &str) -> &'a [Row] {
        self.tables.get(table).map(|t| t.rows.as_slice()).unwrap_or(&[])
    }

    fn matching(&self, table: &str, predicate: &Predicate) -> Vec<usize> {
        self.rows(table)
            .iter()
            .enumerate()
            .filter(|(_, row)| predicate.evaluate(&RowContext { scope: self, table, row }))
            .map(|(index, _)| index)
            .collect()
    }

    /// Values reachable from `row` along `segments`, following links through other tables
    fn values_at(&self, table: &str, row: &Row, segments: &[String]) -> Vec<Value> {
        let Some((head, rest)) = segments.split_first() else {
            return vec![Value::Object(row.clone())];
        };
        match self.schema.link(table, head) {
            Some(link) if rest.is_empty() => match link.kind {
                LinkKind::Reverse { .. } => {
                    let keys = self
                        .linked_rows(table, row, head, link)
                        .into_iter()
                        .filter_map(|r| r.get(&link.target_key).cloned())
                        .collect();
                    vec![Value::Array(keys)]
                }
                _ => row.get(head).cloned().into_iter().collect(),
            },
            Some(link) => self
                .linked_rows(table, row, head, link)
                .into_iter()
                .flat_map(|target| self.values_at(&link.target_table, target, rest))
                .collect(),
            None => match row.get(head) {
                Some(value) => json_values(value, rest),
                None => vec![],
            },
        }
    }

    fn linked_rows(&self, table: &str, row: &Row, field: &str, link: &Link) -> Vec<&'a Row> {
        let targets = self.rows(&link.target_table);
        let key_of = |target: &Row| target.get(&link.target_key).cloned().unwrap_or(Value::Null);

        match &link.kind {
            LinkKind::Column => match row.get(field) {
                Some(key) if !key.is_null() => targets.iter().filter(|t| loosely_equal(&key_of(*t), key)).collect(),
                _ => vec![],
            },
            LinkKind::ColumnArray => {
                let keys = row.get(field).and_then(Value::as_array).cloned().unwrap_or_default();
                targets
                    .iter()
                    .filter(|t| keys.iter().any(|k| loosely_equal(&key_of(*t), k)))
                    .collect()
            }
            LinkKind::Reverse { column } => {
                let Some(own_key) = self.schema.table(table).and_then(|t| row.get(&t.primary_key)) else {
                    return vec![];
                };
                targets
                    .iter()
                    .filter(|t| t.get(column).map_or(false, |v| loosely_equal(v, own_key)))
                    .collect()
            }
        }
    }

    fn check_unique(&self, schema: &TableSchema, record: &Row, skip: Option<usize>) -> Result<(), StoreError> {
        let rows = self.rows(&schema.name);
        for column in schema.unique_columns() {
            let Some(value) = record.get(column).filter(|v| !v.is_null()) else {
                continue;
            };
            let clash = rows
                .iter()
                .enumerate()
                .any(|(i, r)| Some(i) != skip && r.get(column).map_or(false, |v| loosely_equal(v, value)));
            if clash {
                return Err(StoreError::integrity(
                    "UniqueViolation",
                    format!("duplicate value {} for {}.{}", value, schema.name, column),
                ));
            }
        }
        Ok(())
    }

    fn check_links(&self, schema: &TableSchema, record: &Row) -> Result<(), StoreError> {
        for (field, link) in &schema.links {
            let Some(value) = record.get(field) else {
                continue;
            };
            let keys: Vec<&Value> = match link.kind {
                LinkKind::Column if value.is_null() => vec![],
                LinkKind::Column => vec![value],
                LinkKind::ColumnArray => value.as_array().map(|a| a.iter().collect()).unwrap_or_default(),
                LinkKind::Reverse { .. } => continue,
            };
            let targets = self.rows(&link.target_table);
            for key in keys {
                let exists = targets
                    .iter()
                    .any(|t| t.get(&link.target_key).map_or(false, |k| loosely_equal(k, key)));
                if !exists {
                    return Err(StoreError::integrity(
                        "ForeignKeyViolation",
                        format!("{}.{} references missing {} {}", schema.name, field, link.target_table, key),
                    ));
                }
            }
        }
        Ok(())
    }
}

struct RowContext<'s, 'a> {
    scope: &'s Scope<'a>,
    table: &'s str,
    row: &'s Row,
}

impl FieldResolver for RowContext<'_, '_> {
    fn resolve(&self, path: &FieldPath) -> Vec<Value> {
        self.scope.values_at(self.table, self.row, path.segments())
    }

    fn any_related(&self, field: &str, predicate: &Predicate) -> bool {
        let Some(link) = self.scope.schema.link(self.table, field) else {
            return Value::Object(self.row.clone()).any_related(field, predicate);
        };
        self.scope
            .linked_rows(self.table, self.row, field, link)
            .into_iter()
            .any(|row| predicate.evaluate(&RowContext { scope: self.scope, table: &link.target_table, row }))
    }
}
