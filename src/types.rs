/// Shared types used across the codebase

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Primary key values travel as raw JSON (integers, uuids, strings)
pub type Pk = Value;

/// A single stored record, keyed by column name
pub type Row = Map<String, Value>;

/// Access-controlled operations a policy can grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Select => "select",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Model-derived intents published for an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelOperation {
    Find,
    SelectMany,
    Insert,
    InsertMany,
    Update,
    UpdateMany,
    Delete,
    DeleteMany,
}

impl ModelOperation {
    pub fn all() -> Vec<Self> {
        use ModelOperation::*;
        vec![Find, SelectMany, Insert, InsertMany, Update, UpdateMany, Delete, DeleteMany]
    }

    pub fn readonly() -> Vec<Self> {
        vec![ModelOperation::Find, ModelOperation::SelectMany]
    }

    pub fn readonly_and_single_write() -> Vec<Self> {
        use ModelOperation::*;
        vec![Find, SelectMany, Insert, Update, Delete]
    }

    /// Last segment of the published intent name, e.g. `models.user.selectmany`
    pub fn intent_suffix(&self) -> &'static str {
        match self {
            ModelOperation::Find => "find",
            ModelOperation::SelectMany => "selectmany",
            ModelOperation::Insert => "insert",
            ModelOperation::InsertMany => "insertmany",
            ModelOperation::Update => "update",
            ModelOperation::UpdateMany => "updatemany",
            ModelOperation::Delete => "delete",
            ModelOperation::DeleteMany => "deletemany",
        }
    }

    /// Policy operation consulted before the handler runs
    pub fn operation(&self) -> Operation {
        match self {
            ModelOperation::Find | ModelOperation::SelectMany => Operation::Select,
            ModelOperation::Insert | ModelOperation::InsertMany => Operation::Insert,
            ModelOperation::Update | ModelOperation::UpdateMany => Operation::Update,
            ModelOperation::Delete | ModelOperation::DeleteMany => Operation::Delete,
        }
    }

    pub fn required_args(&self) -> &'static [&'static str] {
        match self {
            ModelOperation::Find => &["where"],
            ModelOperation::SelectMany => &[],
            ModelOperation::Insert => &["object"],
            ModelOperation::InsertMany => &["objects"],
            ModelOperation::Update => &["pk", "partial"],
            ModelOperation::UpdateMany => &["objects"],
            ModelOperation::Delete => &["pk"],
            ModelOperation::DeleteMany => &["pks"],
        }
    }

    pub fn optional_args(&self) -> &'static [&'static str] {
        match self {
            ModelOperation::SelectMany => &["where"],
            _ => &[],
        }
    }

    pub fn describe(&self, entity: &str) -> String {
        match self {
            ModelOperation::Find => format!("fetch a single {} matching `where`", entity),
            ModelOperation::SelectMany => format!("fetch every visible {} matching `where`", entity),
            ModelOperation::Insert => format!("create one {} from `object`", entity),
            ModelOperation::InsertMany => format!("create many {} records from `objects` atomically", entity),
            ModelOperation::Update => format!("apply `partial` to the {} identified by `pk`", entity),
            ModelOperation::UpdateMany => format!("apply each {{pk, partial}} in `objects` to {} atomically", entity),
            ModelOperation::Delete => format!("delete the {} identified by `pk`", entity),
            ModelOperation::DeleteMany => format!("delete every {} listed in `pks` atomically", entity),
        }
    }
}

impl fmt::Display for ModelOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.intent_suffix())
    }
}
