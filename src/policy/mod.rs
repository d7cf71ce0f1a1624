pub mod engine;
pub mod resolver;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::auth::Caller;
use crate::filter::{FilterCompiler, FilterError, Predicate};
use crate::registry::Entity;
use crate::types::{Operation, Pk, Row};

pub use engine::PolicyEngine;
pub use resolver::{PolicyResolver, RolePolicies, RolePolicy};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    #[error("role '{role}' is not permitted to {operation} {entity}")]
    Denied {
        entity: String,
        role: String,
        operation: Operation,
    },

    #[error("policy misconfigured for {entity}: {reason}")]
    Configuration { entity: String, reason: String },
}

/// Column half of a permission
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnSet {
    All,
    Only(Vec<String>),
}

impl ColumnSet {
    pub fn only<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ColumnSet::Only(columns.into_iter().map(Into::into).collect())
    }

    /// `All` means every declared field plus every relationship name
    pub fn expand(&self, entity: &Entity) -> Vec<String> {
        match self {
            ColumnSet::All => entity.columns(),
            ColumnSet::Only(columns) => columns.clone(),
        }
    }

    pub fn permits(&self, entity: &Entity, column: &str) -> bool {
        match self {
            ColumnSet::All => entity.has_column(column),
            ColumnSet::Only(columns) => columns.iter().any(|c| c == column),
        }
    }
}

/// Row half of a permission
#[derive(Debug, Clone, PartialEq)]
pub enum RowScope {
    All,
    Scoped(Predicate),
}

impl RowScope {
    pub fn scoped(predicate: Predicate) -> Self {
        if predicate.is_all() {
            RowScope::All
        } else {
            RowScope::Scoped(predicate)
        }
    }

    /// Builds a scope from a JSON filter expression
    pub fn filter(expr: &Value) -> Result<Self, FilterError> {
        FilterCompiler::default().compile(expr).map(Self::scoped)
    }

    pub fn predicate(&self) -> Predicate {
        match self {
            RowScope::All => Predicate::All,
            RowScope::Scoped(predicate) => predicate.clone(),
        }
    }

    /// Intersects the scope with a caller-supplied constraint
    pub fn restrict(&self, constraint: Predicate) -> Predicate {
        self.predicate().and(constraint)
    }
}

/// Candidate update handed to update checks
#[derive(Debug, Clone, PartialEq)]
pub struct PartialUpdate {
    pub pk: Pk,
    pub partial: Row,
}

pub type InsertCheck = Arc<dyn Fn(&Caller, &Row) -> bool + Send + Sync>;
pub type UpdateCheck = Arc<dyn Fn(&Caller, &PartialUpdate) -> bool + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SelectPermission {
    pub columns: ColumnSet,
    pub rows: RowScope,
}

impl SelectPermission {
    pub fn new(columns: ColumnSet, rows: RowScope) -> Self {
        Self { columns, rows }
    }

    pub fn all() -> Self {
        Self::new(ColumnSet::All, RowScope::All)
    }
}

#[derive(Clone)]
pub struct InsertPermission {
    pub columns: ColumnSet,
    pub required_fields: Vec<String>,
    pub check: Option<InsertCheck>,
}

impl InsertPermission {
    pub fn new(columns: ColumnSet) -> Self {
        Self { columns, required_fields: vec![], check: None }
    }

    pub fn all() -> Self {
        Self::new(ColumnSet::All)
    }

    pub fn required<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn check<F>(mut self, check: F) -> Self
    where
        F: Fn(&Caller, &Row) -> bool + Send + Sync + 'static,
    {
        self.check = Some(Arc::new(check));
        self
    }

    pub fn passes(&self, caller: &Caller, candidate: &Row) -> bool {
        self.check.as_ref().map_or(true, |check| check(caller, candidate))
    }
}

impl std::fmt::Debug for InsertPermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsertPermission")
            .field("columns", &self.columns)
            .field("required_fields", &self.required_fields)
            .field("check", &self.check.is_some())
            .finish()
    }
}

#[derive(Clone)]
pub struct UpdatePermission {
    pub columns: ColumnSet,
    pub rows: RowScope,
    pub check: Option<UpdateCheck>,
}

impl UpdatePermission {
    pub fn new(columns: ColumnSet, rows: RowScope) -> Self {
        Self { columns, rows, check: None }
    }

    pub fn all() -> Self {
        Self::new(ColumnSet::All, RowScope::All)
    }

    pub fn check<F>(mut self, check: F) -> Self
    where
        F: Fn(&Caller, &PartialUpdate) -> bool + Send + Sync + 'static,
    {
        self.check = Some(Arc::new(check));
        self
    }

    pub fn passes(&self, caller: &Caller, candidate: &PartialUpdate) -> bool {
        self.check.as_ref().map_or(true, |check| check(caller, candidate))
    }
}

impl std::fmt::Debug for UpdatePermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdatePermission")
            .field("columns", &self.columns)
            .field("rows", &self.rows)
            .field("check", &self.check.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct DeletePermission {
    pub rows: RowScope,
}

impl DeletePermission {
    pub fn new(rows: RowScope) -> Self {
        Self { rows }
    }

    pub fn all() -> Self {
        Self::new(RowScope::All)
    }
}

/// Everything one role may do on one entity; `None` forbids the operation
#[derive(Debug, Clone, Default)]
pub struct ModelPermissions {
    pub select: Option<SelectPermission>,
    pub insert: Option<InsertPermission>,
    pub update: Option<UpdatePermission>,
    pub delete: Option<DeletePermission>,
}

impl ModelPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn full_access() -> Self {
        Self {
            select: Some(SelectPermission::all()),
            insert: Some(InsertPermission::all()),
            update: Some(UpdatePermission::all()),
            delete: Some(DeletePermission::all()),
        }
    }

    pub fn with_select(mut self, permission: SelectPermission) -> Self {
        self.select = Some(permission);
        self
    }

    pub fn with_insert(mut self, permission: InsertPermission) -> Self {
        self.insert = Some(permission);
        self
    }

    pub fn with_update(mut self, permission: UpdatePermission) -> Self {
        self.update = Some(permission);
        self
    }

    pub fn with_delete(mut self, permission: DeletePermission) -> Self {
        self.delete = Some(permission);
        self
    }
}

/// Resolved rule for one role and one operation
#[derive(Debug, Clone)]
pub enum PermissionUnit {
    Select(SelectPermission),
    Insert(InsertPermission),
    Update(UpdatePermission),
    Delete(DeletePermission),
}

impl PermissionUnit {
    pub fn operation(&self) -> Operation {
        match self {
            PermissionUnit::Select(_) => Operation::Select,
            PermissionUnit::Insert(_) => Operation::Insert,
            PermissionUnit::Update(_) => Operation::Update,
            PermissionUnit::Delete(_) => Operation::Delete,
        }
    }
}
