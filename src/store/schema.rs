use std::collections::BTreeMap;

use crate::types::Row;

/// How a link field reaches its target rows
#[derive(Debug, Clone, PartialEq)]
pub enum LinkKind {
    /// Column holds the target primary key
    Column,
    /// Column holds an array of target primary keys
    ColumnArray,
    /// Target rows hold our primary key in `column`
    Reverse { column: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub target_table: String,
    pub target_key: String,
    pub kind: LinkKind,
}

/// Storage-level description of one table
#[derive(Debug, Clone, Default)]
pub struct TableSchema {
    pub name: String,
    pub primary_key: String,
    pub columns: Vec<String>,
    pub unique: Vec<String>,
    pub defaults: Row,
    pub links: BTreeMap<String, Link>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            ..Self::default()
        }
    }

    pub fn link(&self, field: &str) -> Option<&Link> {
        self.links.get(field)
    }

    /// Columns whose values must be distinct across rows
    pub fn unique_columns(&self) -> impl Iterator<Item = &String> {
        std::iter::once(&self.primary_key).chain(self.unique.iter().filter(move |c| **c != self.primary_key))
    }
}

/// Tables and links the row stores need to follow relational field paths
#[derive(Debug, Clone, Default)]
pub struct Schema {
    tables: BTreeMap<String, TableSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: TableSchema) -> Self {
        self.insert(table);
        self
    }

    pub fn insert(&mut self, table: TableSchema) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    pub fn link(&self, table: &str, field: &str) -> Option<&Link> {
        self.tables.get(table).and_then(|t| t.link(field))
    }
}
