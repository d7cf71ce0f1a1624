use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use super::model::ModelIntent;
use super::{Intent, IntentError};
use crate::registry::{Entity, EntityRegistry};

static FUNCTION_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+$").expect("valid function name pattern"));
static MODULE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+(\.\w+)?$").expect("valid module name pattern"));

/// Dispatch table of published intents, keyed by full name
#[derive(Debug, Default, Clone)]
pub struct IntentRegistry {
    intents: BTreeMap<String, Arc<Intent>>,
}

impl IntentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a standalone function as `functions.<name>`
    pub fn function(&mut self, intent: Intent) -> Result<(), IntentError> {
        validate_function_name(&intent.name)?;
        let name = format!("functions.{}", intent.name);
        self.insert(name, intent)
    }

    /// Publishes a group of functions as `functions.<module>.<name>`
    pub fn module(&mut self, module: &str, intents: Vec<Intent>) -> Result<(), IntentError> {
        if !MODULE_NAME.is_match(module) {
            return Err(IntentError::InvalidModule(module.to_string()));
        }
        for intent in intents {
            validate_function_name(&intent.name)?;
            let name = format!("functions.{}.{}", module, intent.name);
            self.insert(name, intent)?;
        }
        Ok(())
    }

    /// Publishes `models.<entity>.<op>` for each operation the entity allows
    pub fn model(&mut self, entity: &Arc<Entity>) -> Result<(), IntentError> {
        for operation in &entity.allowed_operations {
            let name = format!("models.{}.{}", entity.name, operation.intent_suffix());
            self.insert(name, ModelIntent::intent(entity.clone(), *operation))?;
        }
        Ok(())
    }

    pub fn models(&mut self, entities: &EntityRegistry) -> Result<(), IntentError> {
        for entity in entities.entities() {
            self.model(entity)?;
        }
        Ok(())
    }

    fn insert(&mut self, name: String, mut intent: Intent) -> Result<(), IntentError> {
        if self.intents.contains_key(&name) {
            return Err(IntentError::Duplicate(name));
        }
        tracing::debug!("Published intent {}", name);
        intent.name = name.clone();
        self.intents.insert(name, Arc::new(intent));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Intent>> {
        self.intents.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.intents.keys()
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    /// `{ <intent name>: <directory entry> }` for every published intent
    pub fn directory(&self) -> Value {
        let entries: Map<String, Value> = self
            .intents
            .iter()
            .map(|(name, intent)| (name.clone(), intent.directory_entry()))
            .collect();
        Value::Object(entries)
    }
}

fn validate_function_name(name: &str) -> Result<(), IntentError> {
    if FUNCTION_NAME.is_match(name) {
        Ok(())
    } else {
        Err(IntentError::InvalidName(name.to_string()))
    }
}
