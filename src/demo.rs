//! Demo schema served by the `uql-gateway` binary: users, their projects and their notes,
//! with `admin`, `user` and `anonymous` roles.

use std::sync::Arc;

use anyhow::Context;
use serde_json::{json, Value};

use crate::auth::{Caller, ClaimsAuthenticator};
use crate::config::AppConfig;
use crate::error::GatewayError;
use crate::filter::{FilterCompiler, Predicate};
use crate::intent::{DispatchOptions, Dispatcher, GatewayContext, Intent, IntentCall, IntentRegistry};
use crate::policy::{
    ColumnSet, InsertPermission, ModelPermissions, RolePolicies, RowScope, SelectPermission,
    UpdatePermission,
};
use crate::registry::{Entity, EntityRegistry, Relationship};
use crate::store::{Fixtures, RowStore};
use crate::types::{ModelOperation, Pk, Row};

pub const FIXTURES: &str = include_str!("../fixtures/demo.yaml");

fn owner(caller_id: Option<&Pk>) -> Value {
    caller_id.cloned().unwrap_or(Value::Null)
}

fn is_owner(caller: &Caller, row: &Row) -> bool {
    caller.id.as_ref().map_or(false, |id| row.get("author") == Some(id))
}

fn user() -> Entity {
    let visible = ["id", "email", "role", "projects"];
    let active = || RowScope::scoped(Predicate::eq("is_active", true));

    Entity::new("user")
        .table("users")
        .fields(["id", "email", "role", "is_active"])
        .unique("email")
        .default_value("role", "user")
        .default_value("is_active", true)
        .relationship(Relationship::reverse("projects", "project", "author"))
        .relationship(Relationship::reverse("notes", "note", "author"))
        .permissions(
            RolePolicies::new()
                .fixed("admin", ModelPermissions::full_access())
                .fixed(
                    "user",
                    ModelPermissions::new().with_select(SelectPermission::new(
                        ColumnSet::only(visible.iter().copied().chain(["notes"])),
                        active(),
                    )),
                )
                .fixed(
                    "anonymous",
                    ModelPermissions::new()
                        .with_select(SelectPermission::new(ColumnSet::only(visible), active()))
                        .with_insert(
                            InsertPermission::new(ColumnSet::only(["email"]))
                                .required(["email"])
                                .check(|_, row| row.get("email").and_then(Value::as_str).map_or(false, |e| e.len() > 7)),
                        ),
                ),
        )
}

fn project() -> Entity {
    let visible = ["id", "name", "description", "author", "is_archived"];
    let live = || RowScope::scoped(Predicate::eq("is_deleted", false));

    Entity::new("project")
        .table("projects")
        .fields(["id", "name", "description", "author", "is_archived", "is_deleted"])
        .default_value("description", "")
        .default_value("is_archived", false)
        .default_value("is_deleted", false)
        .relationship(Relationship::one("author", "user"))
        .permissions(
            RolePolicies::new()
                .fixed("admin", ModelPermissions::full_access())
                .role("user", move |caller_id: Option<&Pk>| {
                    ModelPermissions::new()
                        .with_select(SelectPermission::new(ColumnSet::only(visible), live()))
                        .with_insert(
                            InsertPermission::new(ColumnSet::only(["name", "description", "author"]))
                                .required(["name", "author"])
                                .check(is_owner),
                        )
                        .with_update(UpdatePermission::new(
                            ColumnSet::only(["name", "description", "is_archived"]),
                            RowScope::scoped(Predicate::eq("author", owner(caller_id))),
                        ))
                })
                .fixed(
                    "anonymous",
                    ModelPermissions::new().with_select(SelectPermission::new(ColumnSet::only(visible), live())),
                ),
        )
}

fn note() -> Entity {
    Entity::new("note")
        .table("notes")
        .fields(["id", "name", "content", "starred", "author", "is_archived", "is_deleted"])
        .default_value("content", "")
        .default_value("starred", false)
        .default_value("is_archived", false)
        .default_value("is_deleted", false)
        .relationship(Relationship::one("author", "user"))
        .operations(vec![
            ModelOperation::Insert,
            ModelOperation::SelectMany,
            ModelOperation::Find,
            ModelOperation::Update,
        ])
        .permissions(
            RolePolicies::new()
                .fixed("admin", ModelPermissions::full_access())
                .role("user", |caller_id: Option<&Pk>| {
                    let own_live = RowScope::scoped(Predicate::all_of(vec![
                        Predicate::eq("author", owner(caller_id)),
                        Predicate::eq("is_deleted", false),
                    ]));
                    ModelPermissions::new()
                        .with_select(SelectPermission::new(
                            ColumnSet::only(["id", "name", "content", "starred", "author", "is_archived"]),
                            own_live.clone(),
                        ))
                        .with_insert(
                            InsertPermission::new(ColumnSet::only(["name", "content", "author"]))
                                .required(["name", "author"])
                                .check(|caller, row| {
                                    is_owner(caller, row)
                                        && row.get("name").and_then(Value::as_str).map_or(false, |n| !n.is_empty())
                                }),
                        )
                        .with_update(UpdatePermission::new(
                            ColumnSet::only(["name", "content", "starred", "is_archived"]),
                            own_live,
                        ))
                }),
        )
}

/// Users, projects and notes
pub fn entities() -> anyhow::Result<EntityRegistry> {
    let registry = EntityRegistry::new().with(user())?.with(project())?.with(note())?;
    Ok(registry)
}

/// Plain function intents published next to the model intents
pub fn functions(intents: &mut IntentRegistry) -> anyhow::Result<()> {
    intents.function(
        Intent::from_fn("getCurrentDateTime", |_: IntentCall| async {
            Ok::<_, GatewayError>(json!({ "iso": chrono::Utc::now().to_rfc3339() }))
        })
        .description("current server time in ISO 8601"),
    )?;
    intents.function(
        Intent::from_fn("whoami", |call: IntentCall| async move {
            Ok::<_, GatewayError>(json!({
                "id": call.caller.id,
                "role": call.role(),
                "anonymous": call.caller.is_anonymous(),
            }))
        })
        .description("identity and role the request is evaluated under"),
    )?;
    intents.function(Intent::from_fn("task", |_: IntentCall| async { Ok::<_, GatewayError>(json!({"message": "hello"})) }))?;
    intents.function(Intent::from_fn("task_two", |_: IntentCall| async { Ok::<_, GatewayError>(json!({"message": "hi"})) }))?;

    intents.module(
        "math",
        vec![Intent::from_fn("add", |call: IntentCall| async move {
            let term = |key: &str| call.arg(key).and_then(Value::as_f64);
            match (term("a"), term("b")) {
                (Some(a), Some(b)) => Ok(json!({ "sum": a + b })),
                _ => Err(GatewayError::invalid_argument("a and b must be numbers")),
            }
        })
        .description("adds `a` and `b`")
        .required(["a"])
        .optional(["b"])
        .default_value("b", json!(0))],
    )?;
    Ok(())
}

pub fn fixtures() -> anyhow::Result<Fixtures> {
    Fixtures::from_yaml(FIXTURES).context("demo fixtures")
}

/// Wires the demo schema over `store` according to `config`
pub fn dispatcher(config: &AppConfig, store: Arc<dyn RowStore>) -> anyhow::Result<Dispatcher> {
    let entities = entities()?;

    let mut intents = IntentRegistry::new();
    intents.models(&entities)?;
    functions(&mut intents)?;
    tracing::info!("Published {} intents over {} entities", intents.len(), entities.len());

    let context = GatewayContext::new(Arc::new(entities), store)
        .with_authenticator(ClaimsAuthenticator::new(config.gateway.anonymous_role.clone()))
        .with_filter_compiler(FilterCompiler::from_config(&config.filter))
        .with_audit_logging(config.security.enable_audit_logging);

    Ok(Dispatcher::new(intents, Arc::new(context)).with_options(DispatchOptions::from_config(&config.gateway)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_fixtures_seed_demo_schema() {
        let entities = entities().unwrap();
        let store = MemoryStore::new(entities.schema());
        let seeded = fixtures().unwrap().seed(&store).await.unwrap();
        assert_eq!(seeded, 10);
        assert_eq!(store.count("notes").await, 3);
    }

    #[test]
    fn test_demo_publishes_expected_intents() {
        let entities = entities().unwrap();
        let mut intents = IntentRegistry::new();
        intents.models(&entities).unwrap();
        functions(&mut intents).unwrap();

        assert!(intents.get("models.user.find").is_some());
        assert!(intents.get("models.note.update").is_some());
        assert!(intents.get("models.note.delete").is_none());
        assert!(intents.get("functions.math.add").is_some());
        assert!(intents.get("functions.whoami").is_some());
    }
}
