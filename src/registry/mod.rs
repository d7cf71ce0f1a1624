pub mod entity;
pub mod view;

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::policy::{PolicyEngine, PolicyError};
use crate::store::{Link, LinkKind, Schema, TableSchema};
use crate::types::Pk;

pub use entity::{Cardinality, Entity, Relationship};
pub use view::{HiddenField, View, ViewLink, ViewNode};

static ENTITY_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+$").expect("valid entity name pattern"));

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("entity '{0}' is already registered")]
    Duplicate(String),

    #[error("entity '{0}' is not registered")]
    UnknownEntity(String),

    #[error("entity '{entity}' is invalid: {reason}")]
    InvalidEntity { entity: String, reason: String },

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Entities by name. Built once during bootstrap and shared read-only afterwards.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<String, Arc<Entity>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity; a second registration under the same name fails
    pub fn register(&mut self, entity: Entity) -> Result<Arc<Entity>, RegistryError> {
        if self.entities.contains_key(&entity.name) {
            return Err(RegistryError::Duplicate(entity.name));
        }
        validate_entity(&entity)?;
        PolicyEngine::validate(&entity)?;

        tracing::debug!(
            "Registered entity {} (table {}, {} relationships)",
            entity.name,
            entity.table,
            entity.relationships.len()
        );
        let entity = Arc::new(entity);
        self.entities.insert(entity.name.clone(), entity.clone());
        Ok(entity)
    }

    pub fn with(mut self, entity: Entity) -> Result<Self, RegistryError> {
        self.register(entity)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Entity>> {
        self.entities.get(name).cloned()
    }

    pub fn require(&self, name: &str) -> Result<Arc<Entity>, RegistryError> {
        self.get(name).ok_or_else(|| RegistryError::UnknownEntity(name.to_string()))
    }

    pub fn entities(&self) -> impl Iterator<Item = &Arc<Entity>> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Selection view of `name` under `role`, skipping nested rendering of any
    /// entity listed in `exclude_ancestors`
    pub fn create_view(
        &self,
        name: &str,
        role: &str,
        caller_id: Option<&Pk>,
        exclude_ancestors: &[String],
    ) -> Result<View, RegistryError> {
        let entity = self.require(name)?;
        Ok(View::build(self, &entity, role, caller_id, exclude_ancestors)?)
    }

    /// Storage layout of every registered entity, with links resolved to tables
    pub fn schema(&self) -> Schema {
        let mut schema = Schema::new();
        for entity in self.entities.values() {
            let mut table = TableSchema::new(entity.table.clone(), entity.primary_key.clone());
            table.columns = entity
                .columns()
                .into_iter()
                .filter(|c| entity.relationship_for(c).map_or(true, Relationship::is_local))
                .collect();
            table.unique = entity.unique.clone();
            table.defaults = entity.defaults.clone();

            for relationship in &entity.relationships {
                let Some(target) = self.entities.get(&relationship.target) else {
                    continue;
                };
                let kind = match (&relationship.remote_field, relationship.cardinality) {
                    (Some(remote), _) => LinkKind::Reverse { column: remote.clone() },
                    (None, Cardinality::One) => LinkKind::Column,
                    (None, Cardinality::Many) => LinkKind::ColumnArray,
                };
                table.links.insert(
                    relationship.field.clone(),
                    Link {
                        target_table: target.table.clone(),
                        target_key: target.primary_key.clone(),
                        kind,
                    },
                );
            }
            schema.insert(table);
        }
        schema
    }
}

fn validate_entity(entity: &Entity) -> Result<(), RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidEntity {
        entity: entity.name.clone(),
        reason,
    };

    if !ENTITY_NAME.is_match(&entity.name) {
        return Err(invalid("names may only contain word characters".to_string()));
    }
    if !entity.fields.contains(&entity.primary_key) {
        return Err(invalid(format!("primary key '{}' is not a declared field", entity.primary_key)));
    }
    if entity.allowed_operations.is_empty() {
        return Err(invalid("no operations allowed".to_string()));
    }

    let mut seen = Vec::with_capacity(entity.relationships.len());
    for relationship in &entity.relationships {
        if seen.contains(&relationship.field.as_str()) {
            return Err(invalid(format!("relationship '{}' declared twice", relationship.field)));
        }
        if relationship.field == entity.primary_key {
            return Err(invalid("the primary key cannot be a relationship".to_string()));
        }
        if !relationship.is_local() && entity.fields.contains(&relationship.field) {
            return Err(invalid(format!(
                "reverse relationship '{}' shadows a stored field",
                relationship.field
            )));
        }
        seen.push(relationship.field.as_str());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{ModelPermissions, RolePolicies};

    fn user() -> Entity {
        Entity::new("user")
            .table("users")
            .fields(["id", "email"])
            .unique("email")
            .relationship(Relationship::reverse("projects", "project", "author"))
    }

    fn project() -> Entity {
        Entity::new("project")
            .table("projects")
            .fields(["id", "name"])
            .relationship(Relationship::one("author", "user"))
            .relationship(Relationship::many("members", "user"))
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = EntityRegistry::new();
        registry.register(user()).unwrap();
        assert_eq!(
            registry.register(user()).unwrap_err(),
            RegistryError::Duplicate("user".to_string())
        );
    }

    #[test]
    fn test_invalid_entities_are_rejected() {
        let mut registry = EntityRegistry::new();
        assert!(registry.register(Entity::new("no pk").fields(["id"])).is_err());
        assert!(registry.register(Entity::new("nopk").fields(["name"])).is_err());
        assert!(registry
            .register(
                Entity::new("twice")
                    .fields(["id"])
                    .relationship(Relationship::one("owner", "user"))
                    .relationship(Relationship::one("owner", "user"))
            )
            .is_err());
    }

    #[test]
    fn test_policy_misconfiguration_fails_registration() {
        let entity = user().permissions(RolePolicies::new().fixed(
            "user",
            ModelPermissions::new().with_select(crate::policy::SelectPermission::new(
                crate::policy::ColumnSet::only(["password"]),
                crate::policy::RowScope::All,
            )),
        ));
        assert!(matches!(
            EntityRegistry::new().register(entity),
            Err(RegistryError::Policy(PolicyError::Configuration { .. }))
        ));
    }

    #[test]
    fn test_schema_resolves_links_to_tables() {
        let registry = EntityRegistry::new().with(user()).unwrap().with(project()).unwrap();
        let schema = registry.schema();

        let projects = schema.table("projects").unwrap();
        assert_eq!(projects.columns, vec!["id", "name", "author", "members"]);
        assert_eq!(projects.link("author").unwrap().kind, LinkKind::Column);
        assert_eq!(projects.link("members").unwrap().kind, LinkKind::ColumnArray);

        let users = schema.table("users").unwrap();
        assert_eq!(users.columns, vec!["id", "email"]);
        assert_eq!(users.unique, vec!["email"]);
        assert_eq!(
            users.link("projects").unwrap(),
            &Link {
                target_table: "projects".to_string(),
                target_key: "id".to_string(),
                kind: LinkKind::Reverse { column: "author".to_string() },
            }
        );
    }
}
