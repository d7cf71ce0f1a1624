use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::policy::{PolicyResolver, RolePolicies};
use crate::types::{ModelOperation, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Cardinality {
    One,
    Many,
}

/// Directional edge from an entity field to another entity
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub field: String,
    pub target: String,
    pub cardinality: Cardinality,
    /// Set when the link is stored on the target (reverse foreign key)
    pub remote_field: Option<String>,
}

impl Relationship {
    /// Foreign key column holding the target's primary key
    pub fn one(field: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            target: target.into(),
            cardinality: Cardinality::One,
            remote_field: None,
        }
    }

    /// Column holding an array of target primary keys
    pub fn many(field: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            target: target.into(),
            cardinality: Cardinality::Many,
            remote_field: None,
        }
    }

    /// Target rows whose `remote_field` points back at this entity
    pub fn reverse(field: impl Into<String>, target: impl Into<String>, remote_field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            target: target.into(),
            cardinality: Cardinality::Many,
            remote_field: Some(remote_field.into()),
        }
    }

    pub fn is_local(&self) -> bool {
        self.remote_field.is_none()
    }
}

/// A registered record kind
#[derive(Clone)]
pub struct Entity {
    pub name: String,
    pub table: String,
    pub primary_key: String,
    pub fields: Vec<String>,
    pub relationships: Vec<Relationship>,
    pub unique: Vec<String>,
    pub defaults: Row,
    pub permissions: Arc<dyn PolicyResolver>,
    pub allowed_operations: Vec<ModelOperation>,
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            table: name.clone(),
            name,
            primary_key: "id".to_string(),
            fields: vec![],
            relationships: vec![],
            unique: vec![],
            defaults: Row::new(),
            permissions: Arc::new(RolePolicies::new()),
            allowed_operations: ModelOperation::all(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn unique(mut self, field: impl Into<String>) -> Self {
        self.unique.push(field.into());
        self
    }

    pub fn default_value(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(field.into(), value.into());
        self
    }

    pub fn permissions(mut self, resolver: impl PolicyResolver + 'static) -> Self {
        self.permissions = Arc::new(resolver);
        self
    }

    pub fn operations(mut self, operations: Vec<ModelOperation>) -> Self {
        self.allowed_operations = operations;
        self
    }

    /// Declared fields followed by relationship names
    pub fn columns(&self) -> Vec<String> {
        let mut columns = self.fields.clone();
        for relationship in &self.relationships {
            if !columns.contains(&relationship.field) {
                columns.push(relationship.field.clone());
            }
        }
        columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.fields.iter().any(|f| f == column) || self.relationship_for(column).is_some()
    }

    pub fn relationship_for(&self, field: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.field == field)
    }

    pub fn allows(&self, operation: ModelOperation) -> bool {
        self.allowed_operations.contains(&operation)
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("fields", &self.fields)
            .field("relationships", &self.relationships)
            .field("allowed_operations", &self.allowed_operations)
            .finish()
    }
}
