use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use super::{Cardinality, Entity, EntityRegistry, Relationship};
use crate::filter::{Comparison, FieldPath, Predicate};
use crate::policy::{PolicyEngine, PolicyError, RowScope, SelectPermission};
use crate::store::{RowStore, StoreError};
use crate::types::{Pk, Row};

/// How one relationship column of a node is rendered
#[derive(Debug, Clone)]
pub enum ViewLink {
    /// Related rows rendered through another node of the arena
    Nested(usize),
    /// Target is an ancestor of this node: rendered as primary keys only
    Keys { target: Arc<Entity>, rows: RowScope },
    /// Target is unregistered or not selectable by the role: stored value as-is
    Opaque,
}

/// Filter field that the view does not expose
#[derive(Debug, Clone, PartialEq)]
pub struct HiddenField {
    pub entity: String,
    pub field: String,
}

#[derive(Debug, Clone)]
pub struct ViewNode {
    pub entity: Arc<Entity>,
    pub columns: Vec<String>,
    pub rows: RowScope,
    pub links: BTreeMap<String, ViewLink>,
}

/// Policy-scoped rendering plan for one entity under one role.
///
/// Nodes live in a flat arena; node 0 is the root. Nested nodes are built
/// depth first, and an entity already on the path from the root is never
/// expanded again, so every branch ends after at most one visit per entity.
#[derive(Debug, Clone)]
pub struct View {
    nodes: Vec<ViewNode>,
}

impl View {
    pub fn build(
        registry: &EntityRegistry,
        entity: &Arc<Entity>,
        role: &str,
        caller_id: Option<&Pk>,
        exclude_ancestors: &[String],
    ) -> Result<Self, PolicyError> {
        let select = PolicyEngine::select(entity, role, caller_id)?;
        let mut builder = ViewBuilder {
            registry,
            role,
            caller_id,
            nodes: vec![],
            ancestors: exclude_ancestors.to_vec(),
        };
        builder.visit(entity.clone(), select);
        Ok(Self { nodes: builder.nodes })
    }

    pub fn root(&self) -> &ViewNode {
        &self.nodes[0]
    }

    pub fn node(&self, index: usize) -> Option<&ViewNode> {
        self.nodes.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Visible columns of the root entity
    pub fn columns(&self) -> &[String] {
        &self.root().columns
    }

    /// Row scope of the root entity
    pub fn rows(&self) -> &RowScope {
        &self.root().rows
    }

    /// Rewrites a caller filter so it reaches only what this view renders.
    ///
    /// Each path segment must be a visible column of its node. Relationship
    /// segments continue only into nested nodes, and the rows they reach are
    /// limited to that node's row scope. Bare reverse relationships compare
    /// against the keys of the related rows the view would show.
    pub fn confine(&self, predicate: Predicate) -> Result<Predicate, HiddenField> {
        self.confine_at(0, predicate)
    }

    fn confine_at(&self, index: usize, predicate: Predicate) -> Result<Predicate, HiddenField> {
        let node = &self.nodes[index];
        match predicate {
            Predicate::All => Ok(Predicate::All),
            Predicate::And(parts) => Ok(Predicate::And(self.confine_each(index, parts)?)),
            Predicate::Or(parts) => Ok(Predicate::Or(self.confine_each(index, parts)?)),
            Predicate::Not(inner) => Ok(Predicate::Not(Box::new(self.confine_at(index, *inner)?))),
            Predicate::Related { link, predicate } => {
                let target = self.nested(node, &link)?;
                let inner = self.confine_at(target, *predicate)?;
                Ok(Predicate::related(link, self.nodes[target].rows.restrict(inner)))
            }
            Predicate::Compare { path, op, value } => {
                let segments = path.segments().to_vec();
                let Some((head, rest)) = segments.split_first() else {
                    return Ok(Predicate::Compare { path, op, value });
                };
                if !node.columns.contains(head) {
                    return Err(hidden(node, head));
                }

                match node.entity.relationship_for(head) {
                    None => Ok(Predicate::Compare { path, op, value }),
                    Some(relationship) if rest.is_empty() && relationship.is_local() => {
                        Ok(Predicate::Compare { path, op, value })
                    }
                    Some(_) if rest.is_empty() => self.confine_keys(node, head, op, value),
                    Some(_) => {
                        let target = self.nested(node, head)?;
                        let inner = Predicate::Compare { path: FieldPath::from_segments(rest), op, value };
                        let inner = self.confine_at(target, inner)?;
                        Ok(Predicate::related(head.as_str(), self.nodes[target].rows.restrict(inner)))
                    }
                }
            }
        }
    }

    fn confine_each(&self, index: usize, parts: Vec<Predicate>) -> Result<Vec<Predicate>, HiddenField> {
        parts.into_iter().map(|part| self.confine_at(index, part)).collect()
    }

    fn nested(&self, node: &ViewNode, field: &str) -> Result<usize, HiddenField> {
        match node.links.get(field) {
            Some(ViewLink::Nested(index)) => Ok(*index),
            _ => Err(hidden(node, field)),
        }
    }

    fn confine_keys(&self, node: &ViewNode, field: &str, op: Comparison, value: Value) -> Result<Predicate, HiddenField> {
        let (target, rows) = match node.links.get(field) {
            Some(ViewLink::Nested(index)) => (&self.nodes[*index].entity, &self.nodes[*index].rows),
            Some(ViewLink::Keys { target, rows }) => (target, rows),
            _ => return Err(hidden(node, field)),
        };
        let key = target.primary_key.as_str();
        let exists = |predicate: Predicate| Predicate::related(field, rows.restrict(predicate));

        Ok(match op {
            Comparison::IsNull if value.as_bool().unwrap_or(true) => exists(Predicate::All).negate(),
            Comparison::IsNull => exists(Predicate::All),
            Comparison::Contains => exists(Predicate::eq(key, value)),
            op => exists(Predicate::compare(key, op, value)),
        })
    }

    pub async fn render(&self, store: &dyn RowStore, row: Row) -> Result<Value, StoreError> {
        self.render_row(0, store, row).await
    }

    pub async fn render_all(&self, store: &dyn RowStore, rows: Vec<Row>) -> Result<Vec<Value>, StoreError> {
        let mut rendered = Vec::with_capacity(rows.len());
        for row in rows {
            rendered.push(self.render_row(0, store, row).await?);
        }
        Ok(rendered)
    }

    fn render_row<'a>(&'a self, index: usize, store: &'a dyn RowStore, row: Row) -> BoxFuture<'a, Result<Value, StoreError>> {
        Box::pin(async move {
            let Some(node) = self.nodes.get(index) else {
                return Ok(Value::Null);
            };
            let mut out = Row::new();
            for column in &node.columns {
                let value = match node.links.get(column) {
                    Some(link) => self.render_link(node, column, link, store, &row).await?,
                    None => row.get(column).cloned().unwrap_or(Value::Null),
                };
                out.insert(column.clone(), value);
            }
            Ok(Value::Object(out))
        })
    }

    async fn render_link(
        &self,
        node: &ViewNode,
        column: &str,
        link: &ViewLink,
        store: &dyn RowStore,
        row: &Row,
    ) -> Result<Value, StoreError> {
        let stored = row.get(column).cloned().unwrap_or(Value::Null);
        let Some(relationship) = node.entity.relationship_for(column) else {
            return Ok(stored);
        };

        match link {
            ViewLink::Opaque if relationship.is_local() => Ok(stored),
            ViewLink::Opaque => Ok(Value::Null),
            ViewLink::Keys { .. } if relationship.is_local() => Ok(stored),
            ViewLink::Keys { target, rows } => {
                let related = fetch_related(store, &node.entity, relationship, target, rows, row).await?;
                Ok(Value::Array(
                    related
                        .into_iter()
                        .map(|r| r.get(&target.primary_key).cloned().unwrap_or(Value::Null))
                        .collect(),
                ))
            }
            ViewLink::Nested(index) => {
                let Some(target) = self.nodes.get(*index) else {
                    return Ok(stored);
                };
                let related = fetch_related(store, &node.entity, relationship, &target.entity, &target.rows, row).await?;
                match relationship.cardinality {
                    Cardinality::One => match related.into_iter().next() {
                        Some(related) => self.render_row(*index, store, related).await,
                        None => Ok(Value::Null),
                    },
                    Cardinality::Many => {
                        let mut items = Vec::with_capacity(related.len());
                        for related in related {
                            items.push(self.render_row(*index, store, related).await?);
                        }
                        Ok(Value::Array(items))
                    }
                }
            }
        }
    }
}

fn hidden(node: &ViewNode, field: &str) -> HiddenField {
    HiddenField { entity: node.entity.name.clone(), field: field.to_string() }
}

/// Rows of `target` reachable from `row` through `relationship`, inside `scope`
async fn fetch_related(
    store: &dyn RowStore,
    source: &Entity,
    relationship: &Relationship,
    target: &Entity,
    scope: &RowScope,
    row: &Row,
) -> Result<Vec<Row>, StoreError> {
    let link = match &relationship.remote_field {
        Some(remote) => match row.get(&source.primary_key) {
            Some(pk) if !pk.is_null() => Predicate::eq(remote.as_str(), pk.clone()),
            _ => return Ok(vec![]),
        },
        None => match row.get(&relationship.field) {
            None | Some(Value::Null) => return Ok(vec![]),
            Some(Value::Array(keys)) => Predicate::one_of(target.primary_key.as_str(), keys.clone()),
            Some(key) => Predicate::eq(target.primary_key.as_str(), key.clone()),
        },
    };
    store.fetch_many(&target.table, &scope.restrict(link)).await
}

struct ViewBuilder<'a> {
    registry: &'a EntityRegistry,
    role: &'a str,
    caller_id: Option<&'a Pk>,
    nodes: Vec<ViewNode>,
    ancestors: Vec<String>,
}

impl ViewBuilder<'_> {
    fn visit(&mut self, entity: Arc<Entity>, select: SelectPermission) -> usize {
        let index = self.nodes.len();
        let columns = select.columns.expand(&entity);
        self.nodes.push(ViewNode {
            entity: entity.clone(),
            columns: columns.clone(),
            rows: select.rows,
            links: BTreeMap::new(),
        });

        self.ancestors.push(entity.name.clone());
        for column in columns {
            let Some(relationship) = entity.relationship_for(&column) else {
                continue;
            };
            let link = self.link(&relationship.target);
            self.nodes[index].links.insert(column, link);
        }
        self.ancestors.pop();
        index
    }

    fn link(&mut self, target: &str) -> ViewLink {
        let Some(target) = self.registry.get(target) else {
            return ViewLink::Opaque;
        };
        let Ok(select) = PolicyEngine::select(&target, self.role, self.caller_id) else {
            return ViewLink::Opaque;
        };
        if self.ancestors.contains(&target.name) {
            ViewLink::Keys { target, rows: select.rows }
        } else {
            ViewLink::Nested(self.visit(target, select))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::compile;
    use crate::policy::{ColumnSet, ModelPermissions, RolePolicies};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn readable(select: SelectPermission) -> RolePolicies {
        RolePolicies::new().fixed("user", ModelPermissions::new().with_select(select))
    }

    fn registry() -> EntityRegistry {
        EntityRegistry::new()
            .with(
                Entity::new("user")
                    .table("users")
                    .fields(["id", "email"])
                    .relationship(Relationship::reverse("projects", "project", "author"))
                    .permissions(readable(SelectPermission::all())),
            )
            .unwrap()
            .with(
                Entity::new("project")
                    .table("projects")
                    .fields(["id", "name", "is_archived"])
                    .relationship(Relationship::one("author", "user"))
                    .relationship(Relationship::reverse("notes", "note", "project"))
                    .permissions(readable(SelectPermission::new(
                        ColumnSet::only(["id", "name", "author", "notes"]),
                        RowScope::filter(&json!({"is_archived": false})).unwrap(),
                    ))),
            )
            .unwrap()
            .with(
                Entity::new("note")
                    .table("notes")
                    .fields(["id", "content"])
                    .relationship(Relationship::one("project", "project")),
            )
            .unwrap()
    }

    async fn store(registry: &EntityRegistry) -> MemoryStore {
        let store = MemoryStore::new(registry.schema());
        let rows = |v: Value| v.as_object().cloned().unwrap();
        store.insert("users", rows(json!({"id": 1, "email": "a@b.com"}))).await.unwrap();
        store.insert("projects", rows(json!({"id": 1, "name": "p1", "author": 1, "is_archived": false}))).await.unwrap();
        store.insert("projects", rows(json!({"id": 2, "name": "p2", "author": 1, "is_archived": true}))).await.unwrap();
        store.insert("notes", rows(json!({"id": 1, "content": "n1", "project": 1}))).await.unwrap();
        store
    }

    #[test]
    fn test_ancestors_are_not_expanded() {
        let registry = registry();
        let view = registry.create_view("user", "user", None, &[]).unwrap();

        // user -> projects -> (author: keys only, notes: opaque)
        assert_eq!(view.len(), 2);
        let projects = match view.root().links.get("projects") {
            Some(ViewLink::Nested(index)) => view.node(*index).unwrap(),
            other => panic!("expected nested projects, got {:?}", other),
        };
        assert!(matches!(projects.links.get("author"), Some(ViewLink::Keys { .. })));
        assert!(matches!(projects.links.get("notes"), Some(ViewLink::Opaque)));
    }

    #[test]
    fn test_excluded_ancestors_are_honored() {
        let registry = registry();
        let view = registry.create_view("user", "user", None, &["project".to_string()]).unwrap();
        assert_eq!(view.len(), 1);
        assert!(matches!(view.root().links.get("projects"), Some(ViewLink::Keys { .. })));
    }

    #[test]
    fn test_view_requires_select_permission() {
        let registry = registry();
        assert!(matches!(
            registry.create_view("note", "user", None, &[]),
            Err(crate::registry::RegistryError::Policy(PolicyError::Denied { .. }))
        ));
    }

    #[tokio::test]
    async fn test_render_nests_related_rows_within_scope() {
        let registry = registry();
        let store = store(&registry).await;
        let view = registry.create_view("user", "user", None, &[]).unwrap();

        let user = store.fetch_one("users", &compile(&json!({"id": 1})).unwrap()).await.unwrap().unwrap();
        let rendered = view.render(&store, user).await.unwrap();
        assert_eq!(
            rendered,
            json!({
                "id": 1,
                "email": "a@b.com",
                "projects": [{"id": 1, "name": "p1", "author": 1, "notes": null}]
            })
        );
    }

    #[tokio::test]
    async fn test_confined_filters_stay_inside_the_view() {
        let registry = registry();
        let store = store(&registry).await;
        let view = registry.create_view("user", "user", None, &[]).unwrap();
        let matching = |expr: Value| {
            let filter = view.confine(compile(&expr).unwrap()).unwrap();
            let store = &store;
            async move { store.fetch_many("users", &filter).await.unwrap().len() }
        };

        // p2 is archived, so `projects` never reaches it
        assert_eq!(matching(json!({"projects": {"name": "p1"}})).await, 1);
        assert_eq!(matching(json!({"projects": {"name": "p2"}})).await, 0);
        assert_eq!(matching(json!({"projects": {"_in": [1]}})).await, 1);
        assert_eq!(matching(json!({"projects": {"_in": [2]}})).await, 0);
        assert_eq!(matching(json!({"projects": {"_null": false}})).await, 1);

        let hidden = |expr: Value| view.confine(compile(&expr).unwrap()).unwrap_err();
        assert_eq!(
            hidden(json!({"projects": {"is_archived": true}})),
            HiddenField { entity: "project".to_string(), field: "is_archived".to_string() }
        );
        assert_eq!(hidden(json!({"projects": {"notes": {"content": "n1"}}})).field, "notes");
        assert_eq!(hidden(json!({"projects": {"author": {"email": "a@b.com"}}})).field, "author");
        assert_eq!(hidden(json!({"password": "x"})).entity, "user");
    }

    #[tokio::test]
    async fn test_render_cycle_back_to_root_as_keys() {
        let registry = registry();
        let store = store(&registry).await;
        let view = registry.create_view("project", "user", None, &[]).unwrap();

        let rows = store.fetch_many("projects", &view.rows().predicate()).await.unwrap();
        let rendered = view.render_all(&store, rows).await.unwrap();
        assert_eq!(
            rendered,
            vec![json!({
                "id": 1,
                "name": "p1",
                "author": {"id": 1, "email": "a@b.com", "projects": [1]},
                "notes": null
            })]
        );
    }
}
