use super::{
    ColumnSet, DeletePermission, InsertPermission, ModelPermissions, PermissionUnit, PolicyError, RowScope,
    SelectPermission, UpdatePermission,
};
use crate::registry::Entity;
use crate::types::{Operation, Pk};

/// Resolves (role, operation) to a permission unit for an entity.
/// Nothing is cached: policies are re-run with the caller id on every call.
pub struct PolicyEngine;

impl PolicyEngine {
    pub fn resolve(
        entity: &Entity,
        role: &str,
        operation: Operation,
        caller_id: Option<&Pk>,
    ) -> Result<PermissionUnit, PolicyError> {
        Ok(match operation {
            Operation::Select => PermissionUnit::Select(Self::select(entity, role, caller_id)?),
            Operation::Insert => PermissionUnit::Insert(Self::insert(entity, role, caller_id)?),
            Operation::Update => PermissionUnit::Update(Self::update(entity, role, caller_id)?),
            Operation::Delete => PermissionUnit::Delete(Self::delete(entity, role, caller_id)?),
        })
    }

    pub fn select(entity: &Entity, role: &str, caller_id: Option<&Pk>) -> Result<SelectPermission, PolicyError> {
        Self::permissions(entity, role, caller_id, Operation::Select)?
            .select
            .ok_or_else(|| Self::denied(entity, role, Operation::Select))
    }

    pub fn insert(entity: &Entity, role: &str, caller_id: Option<&Pk>) -> Result<InsertPermission, PolicyError> {
        Self::permissions(entity, role, caller_id, Operation::Insert)?
            .insert
            .ok_or_else(|| Self::denied(entity, role, Operation::Insert))
    }

    pub fn update(entity: &Entity, role: &str, caller_id: Option<&Pk>) -> Result<UpdatePermission, PolicyError> {
        Self::permissions(entity, role, caller_id, Operation::Update)?
            .update
            .ok_or_else(|| Self::denied(entity, role, Operation::Update))
    }

    pub fn delete(entity: &Entity, role: &str, caller_id: Option<&Pk>) -> Result<DeletePermission, PolicyError> {
        Self::permissions(entity, role, caller_id, Operation::Delete)?
            .delete
            .ok_or_else(|| Self::denied(entity, role, Operation::Delete))
    }

    /// Insertable columns, after checking `required_fields ⊆ columns`
    pub fn insertable_columns(entity: &Entity, permission: &InsertPermission) -> Result<Vec<String>, PolicyError> {
        let columns = permission.columns.expand(entity);
        let missing: Vec<&str> = permission
            .required_fields
            .iter()
            .filter(|field| !columns.contains(field))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(PolicyError::Configuration {
                entity: entity.name.clone(),
                reason: format!("required fields ({}) are not insertable columns", missing.join(", ")),
            });
        }
        Ok(columns)
    }

    /// Probes every known role with an anonymous caller id and rejects
    /// permissions that name unknown columns or non-insertable required fields
    pub fn validate(entity: &Entity) -> Result<(), PolicyError> {
        for role in entity.permissions.roles() {
            let Some(permissions) = entity.permissions.resolve_policy(&role, None) else {
                continue;
            };
            Self::validate_permissions(entity, &role, &permissions)?;
            tracing::debug!("Validated policy for role '{}' on {}", role, entity.name);
        }
        Ok(())
    }

    fn validate_permissions(entity: &Entity, role: &str, permissions: &ModelPermissions) -> Result<(), PolicyError> {
        let misconfigured = |reason: String| PolicyError::Configuration {
            entity: entity.name.clone(),
            reason: format!("role '{}': {}", role, reason),
        };

        let mut column_sets: Vec<&ColumnSet> = vec![];
        let mut scopes: Vec<&RowScope> = vec![];
        if let Some(select) = &permissions.select {
            column_sets.push(&select.columns);
            scopes.push(&select.rows);
        }
        if let Some(insert) = &permissions.insert {
            column_sets.push(&insert.columns);
            Self::insertable_columns(entity, insert).map_err(|e| match e {
                PolicyError::Configuration { reason, .. } => misconfigured(reason),
                other => other,
            })?;
        }
        if let Some(update) = &permissions.update {
            column_sets.push(&update.columns);
            scopes.push(&update.rows);
        }
        if let Some(delete) = &permissions.delete {
            scopes.push(&delete.rows);
        }

        for set in column_sets {
            if let ColumnSet::Only(columns) = set {
                if let Some(unknown) = columns.iter().find(|c| !entity.has_column(c)) {
                    return Err(misconfigured(format!("unknown column '{}'", unknown)));
                }
            }
        }

        for scope in scopes {
            let roots = scope.predicate().root_fields();
            if let Some(unknown) = roots.iter().find(|c| !entity.has_column(c)) {
                return Err(misconfigured(format!("row scope references unknown column '{}'", unknown)));
            }
        }
        Ok(())
    }

    fn permissions(
        entity: &Entity,
        role: &str,
        caller_id: Option<&Pk>,
        operation: Operation,
    ) -> Result<ModelPermissions, PolicyError> {
        entity
            .permissions
            .resolve_policy(role, caller_id)
            .ok_or_else(|| Self::denied(entity, role, operation))
    }

    fn denied(entity: &Entity, role: &str, operation: Operation) -> PolicyError {
        PolicyError::Denied {
            entity: entity.name.clone(),
            role: role.to_string(),
            operation,
        }
    }
}
