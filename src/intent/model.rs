use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{Intent, IntentCall, IntentHandler};
use crate::error::GatewayError;
use crate::filter::Predicate;
use crate::policy::{InsertPermission, PartialUpdate, PolicyEngine, RowScope};
use crate::registry::{Cardinality, Entity, View};
use crate::store::{Mutation, StoreError};
use crate::types::{ModelOperation, Row};

/// Handler behind one `models.<entity>.<op>` intent
pub struct ModelIntent {
    entity: Arc<Entity>,
    operation: ModelOperation,
}

impl ModelIntent {
    pub fn new(entity: Arc<Entity>, operation: ModelOperation) -> Self {
        Self { entity, operation }
    }

    /// Intent carrying the operation's argument contract
    pub fn intent(entity: Arc<Entity>, operation: ModelOperation) -> Intent {
        Intent::new(operation.intent_suffix(), Self::new(entity.clone(), operation))
            .description(operation.describe(&entity.name))
            .required(operation.required_args().iter().copied())
            .optional(operation.optional_args().iter().copied())
    }

    async fn find(&self, call: &IntentCall, role: &str) -> Result<Value, GatewayError> {
        let view = self.view(call, role)?;
        let predicate = self.where_arg(call, &view)?;
        let store = call.context.store.as_ref();

        let mut rows = store.fetch_many(&self.entity.table, &view.rows().restrict(predicate)).await?;
        if rows.len() > 1 {
            return Err(GatewayError::MultipleObjectsReturned { entity: self.entity.name.clone(), count: rows.len() });
        }
        let row = rows.pop().ok_or_else(|| GatewayError::not_found(&self.entity.name, None))?;
        Ok(view.render(store, row).await?)
    }

    async fn select_many(&self, call: &IntentCall, role: &str) -> Result<Value, GatewayError> {
        let view = self.view(call, role)?;
        let predicate = self.where_arg(call, &view)?;
        let store = call.context.store.as_ref();

        let rows = store.fetch_many(&self.entity.table, &view.rows().restrict(predicate)).await?;
        Ok(Value::Array(view.render_all(store, rows).await?))
    }

    async fn insert(&self, call: &IntentCall, role: &str) -> Result<Value, GatewayError> {
        let permission = PolicyEngine::insert(&self.entity, role, call.caller.id.as_ref())?;
        let view = self.view(call, role)?;
        let object = row_arg(call, "object")?;
        if !permission.passes(&call.caller, object) {
            return Err(unauthorized_mutation());
        }

        let columns = PolicyEngine::insertable_columns(&self.entity, &permission)?;
        self.check_insert(call, &permission, &columns, object).await?;

        let affected = self
            .run(call, vec![Mutation::Insert { table: self.entity.table.clone(), row: object.clone() }])
            .await?;
        let row = affected
            .into_iter()
            .flatten()
            .next()
            .ok_or_else(|| GatewayError::internal("insert returned no row"))?;
        self.audit(call, role, 1);
        Ok(view.render(call.context.store.as_ref(), row).await?)
    }

    async fn insert_many(&self, call: &IntentCall, role: &str) -> Result<Value, GatewayError> {
        let permission = PolicyEngine::insert(&self.entity, role, call.caller.id.as_ref())?;
        let view = self.view(call, role)?;
        let objects = rows_arg(call, "objects")?;
        if !objects.iter().all(|object| permission.passes(&call.caller, object)) {
            return Err(unauthorized_mutation());
        }

        let columns = PolicyEngine::insertable_columns(&self.entity, &permission)?;
        let mut mutations = Vec::with_capacity(objects.len());
        for object in objects {
            self.check_insert(call, &permission, &columns, object).await?;
            mutations.push(Mutation::Insert { table: self.entity.table.clone(), row: object.clone() });
        }

        let rows: Vec<Row> = self.run(call, mutations).await?.into_iter().flatten().collect();
        self.audit(call, role, rows.len());
        Ok(Value::Array(view.render_all(call.context.store.as_ref(), rows).await?))
    }

    async fn update(&self, call: &IntentCall, role: &str) -> Result<Value, GatewayError> {
        let candidate = PartialUpdate {
            pk: pk_arg(call.arg("pk"))?,
            partial: row_arg(call, "partial")?.clone(),
        };
        let rows = self.apply_updates(call, role, vec![candidate]).await?;
        let view = self.view(call, role)?;
        match rows.into_iter().next() {
            Some(row) => Ok(view.render(call.context.store.as_ref(), row).await?),
            None => Ok(Value::Null),
        }
    }

    async fn update_many(&self, call: &IntentCall, role: &str) -> Result<Value, GatewayError> {
        let candidates = rows_arg(call, "objects")?
            .into_iter()
            .map(|object| {
                let partial = match object.get("partial") {
                    Some(Value::Object(partial)) => partial.clone(),
                    _ => return Err(GatewayError::invalid_argument("each object needs a \"partial\" map")),
                };
                Ok(PartialUpdate { pk: pk_arg(object.get("pk"))?, partial })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let rows = self.apply_updates(call, role, candidates).await?;
        let view = self.view(call, role)?;
        Ok(Value::Array(view.render_all(call.context.store.as_ref(), rows).await?))
    }

    /// Checks and applies updates as one batch; a pk outside the update scope aborts all of them
    async fn apply_updates(&self, call: &IntentCall, role: &str, candidates: Vec<PartialUpdate>) -> Result<Vec<Row>, GatewayError> {
        let permission = PolicyEngine::update(&self.entity, role, call.caller.id.as_ref())?;
        // Rendering needs select access; fail before anything is written
        self.view(call, role)?;
        if !candidates.iter().all(|candidate| permission.passes(&call.caller, candidate)) {
            return Err(unauthorized_mutation());
        }

        let columns = permission.columns.expand(&self.entity);
        let mut mutations = Vec::with_capacity(candidates.len() * 2);
        for candidate in candidates {
            self.check_columns(&candidate.partial, &columns)?;
            self.check_references(call, &candidate.partial).await?;

            let predicate = self.by_pk(&permission.rows, &candidate.pk);
            mutations.push(Mutation::Expect {
                table: self.entity.table.clone(),
                predicate: predicate.clone(),
                pk: candidate.pk,
            });
            mutations.push(Mutation::Update {
                table: self.entity.table.clone(),
                predicate,
                values: candidate.partial,
            });
        }

        let rows = self.guarded_rows(self.run(call, mutations).await?);
        self.audit(call, role, rows.len());
        Ok(rows)
    }

    async fn delete(&self, call: &IntentCall, role: &str) -> Result<Value, GatewayError> {
        let pk = pk_arg(call.arg("pk"))?;
        let (view, rows) = self.apply_deletes(call, role, vec![pk]).await?;
        match rows.into_iter().next() {
            Some(row) => Ok(view.render(call.context.store.as_ref(), row).await?),
            None => Ok(Value::Null),
        }
    }

    async fn delete_many(&self, call: &IntentCall, role: &str) -> Result<Value, GatewayError> {
        let pks = match call.arg("pks") {
            Some(Value::Array(pks)) if !pks.is_empty() => pks
                .iter()
                .map(|pk| pk_arg(Some(pk)))
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(GatewayError::invalid_argument("\"pks\" must be a non-empty array")),
        };
        let (view, rows) = self.apply_deletes(call, role, pks).await?;
        Ok(Value::Array(view.render_all(call.context.store.as_ref(), rows).await?))
    }

    async fn apply_deletes(&self, call: &IntentCall, role: &str, pks: Vec<Value>) -> Result<(View, Vec<Row>), GatewayError> {
        let permission = PolicyEngine::delete(&self.entity, role, call.caller.id.as_ref())?;
        let view = self.view(call, role)?;

        let mut mutations = Vec::with_capacity(pks.len() * 2);
        for pk in pks {
            let predicate = self.by_pk(&permission.rows, &pk);
            mutations.push(Mutation::Expect {
                table: self.entity.table.clone(),
                predicate: predicate.clone(),
                pk,
            });
            mutations.push(Mutation::Delete { table: self.entity.table.clone(), predicate });
        }

        let rows = self.guarded_rows(self.run(call, mutations).await?);
        self.audit(call, role, rows.len());
        Ok((view, rows))
    }

    fn view(&self, call: &IntentCall, role: &str) -> Result<View, GatewayError> {
        Ok(View::build(&call.context.entities, &self.entity, role, call.caller.id.as_ref(), &[])?)
    }

    /// Compiles the optional `where` argument and confines it to the caller's view
    fn where_arg(&self, call: &IntentCall, view: &View) -> Result<Predicate, GatewayError> {
        let expr = call.arg("where").unwrap_or(&Value::Null);
        let predicate = call.context.filters.compile(expr)?;
        Ok(view.confine(predicate)?)
    }

    async fn check_insert(
        &self,
        call: &IntentCall,
        permission: &InsertPermission,
        columns: &[String],
        object: &Row,
    ) -> Result<(), GatewayError> {
        let missing: Vec<String> = permission
            .required_fields
            .iter()
            .filter(|field| !object.contains_key(*field))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(GatewayError::MissingRequiredField { entity: self.entity.name.clone(), fields: missing });
        }
        self.check_columns(object, columns)?;
        self.check_references(call, object).await
    }

    fn check_columns(&self, values: &Row, columns: &[String]) -> Result<(), GatewayError> {
        match values.keys().find(|key| !columns.contains(key)) {
            Some(key) => Err(GatewayError::unknown_column(&self.entity.name, key.clone())),
            None => Ok(()),
        }
    }

    /// Every key supplied under a relationship field must name an existing target row
    async fn check_references(&self, call: &IntentCall, values: &Row) -> Result<(), GatewayError> {
        for (field, value) in values {
            let Some(relationship) = self.entity.relationship_for(field) else {
                continue;
            };
            if !relationship.is_local() {
                return Err(GatewayError::invalid_argument(format!(
                    "\"{}\" is stored on {} and cannot be written through {}",
                    field, relationship.target, self.entity.name
                )));
            }
            let Some(target) = call.context.entities.get(&relationship.target) else {
                continue;
            };

            let keys = match (relationship.cardinality, value) {
                (_, Value::Null) => vec![],
                (Cardinality::Many, Value::Array(keys)) => keys.clone(),
                (Cardinality::One, key) if !key.is_array() && !key.is_object() => vec![key.clone()],
                _ => {
                    return Err(GatewayError::invalid_argument(format!(
                        "\"{}\" expects {} of {}",
                        field,
                        match relationship.cardinality {
                            Cardinality::One => "a primary key",
                            Cardinality::Many => "an array of primary keys",
                        },
                        target.name
                    )))
                }
            };
            for key in keys {
                let found = call
                    .context
                    .store
                    .fetch_one(&target.table, &Predicate::eq(target.primary_key.as_str(), key.clone()))
                    .await?;
                if found.is_none() {
                    return Err(GatewayError::not_found(&target.name, Some(key)));
                }
            }
        }
        Ok(())
    }

    fn by_pk(&self, scope: &RowScope, pk: &Value) -> Predicate {
        scope.restrict(Predicate::eq(self.entity.primary_key.as_str(), pk.clone()))
    }

    /// Rows affected by the guarded half of `[Expect, write]` pairs
    fn guarded_rows(&self, affected: Vec<Vec<Row>>) -> Vec<Row> {
        affected.into_iter().skip(1).step_by(2).flatten().collect()
    }

    async fn run(&self, call: &IntentCall, mutations: Vec<Mutation>) -> Result<Vec<Vec<Row>>, GatewayError> {
        call.context.store.batch(mutations).await.map_err(|err| match err {
            StoreError::NotFound { pk, .. } => GatewayError::not_found(&self.entity.name, Some(pk)),
            other => other.into(),
        })
    }

    fn audit(&self, call: &IntentCall, role: &str, rows: usize) {
        if call.context.audit_logging {
            tracing::info!(
                "audit: {} on {} by role '{}' (caller {:?}) affected {} rows",
                self.operation,
                self.entity.name,
                role,
                call.caller.id,
                rows
            );
        }
    }
}

#[async_trait]
impl IntentHandler for ModelIntent {
    async fn handle(&self, call: IntentCall) -> Result<Value, GatewayError> {
        let role = call.role();
        tracing::debug!("Running {} on {} as role '{}'", self.operation, self.entity.name, role);
        match self.operation {
            ModelOperation::Find => self.find(&call, &role).await,
            ModelOperation::SelectMany => self.select_many(&call, &role).await,
            ModelOperation::Insert => self.insert(&call, &role).await,
            ModelOperation::InsertMany => self.insert_many(&call, &role).await,
            ModelOperation::Update => self.update(&call, &role).await,
            ModelOperation::UpdateMany => self.update_many(&call, &role).await,
            ModelOperation::Delete => self.delete(&call, &role).await,
            ModelOperation::DeleteMany => self.delete_many(&call, &role).await,
        }
    }
}

fn unauthorized_mutation() -> GatewayError {
    GatewayError::permission_denied("Unauthorized mutation")
}

fn row_arg<'a>(call: &'a IntentCall, key: &str) -> Result<&'a Row, GatewayError> {
    match call.arg(key) {
        Some(Value::Object(row)) => Ok(row),
        _ => Err(GatewayError::invalid_argument(format!("\"{}\" must be an object", key))),
    }
}

fn rows_arg<'a>(call: &'a IntentCall, key: &str) -> Result<Vec<&'a Row>, GatewayError> {
    let invalid = || GatewayError::invalid_argument(format!("\"{}\" must be a non-empty array of objects", key));
    match call.arg(key) {
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .map(|item| item.as_object().ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}

fn pk_arg(value: Option<&Value>) -> Result<Value, GatewayError> {
    match value {
        Some(pk @ (Value::String(_) | Value::Number(_))) => Ok(pk.clone()),
        _ => Err(GatewayError::invalid_argument("primary keys must be strings or numbers")),
    }
}
