use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::GatewayContext;
use crate::auth::Caller;
use crate::error::GatewayError;

/// A validated invocation handed to a handler
pub struct IntentCall {
    pub context: Arc<GatewayContext>,
    pub caller: Caller,
    pub args: Map<String, Value>,
}

impl IntentCall {
    /// Role the caller's policies resolve under
    pub fn role(&self) -> String {
        self.context.role(&self.caller)
    }

    pub fn arg(&self, key: &str) -> Option<&Value> {
        self.args.get(key)
    }
}

#[async_trait]
pub trait IntentHandler: Send + Sync {
    /// Produces a map, a sequence or null
    async fn handle(&self, call: IntentCall) -> Result<Value, GatewayError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> IntentHandler for FnHandler<F>
where
    F: Fn(IntentCall) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, GatewayError>> + Send + 'static,
{
    async fn handle(&self, call: IntentCall) -> Result<Value, GatewayError> {
        (self.0)(call).await
    }
}

/// A named operation with its argument contract. Immutable once published.
#[derive(Clone)]
pub struct Intent {
    pub name: String,
    pub description: String,
    pub required_args: BTreeSet<String>,
    pub optional_args: BTreeSet<String>,
    pub default_values: Map<String, Value>,
    pub allow_unknown_args: bool,
    handler: Arc<dyn IntentHandler>,
}

impl Intent {
    pub fn new(name: impl Into<String>, handler: impl IntentHandler + 'static) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            required_args: BTreeSet::new(),
            optional_args: BTreeSet::new(),
            default_values: Map::new(),
            allow_unknown_args: false,
            handler: Arc::new(handler),
        }
    }

    /// Intent backed by an async closure
    pub fn from_fn<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(IntentCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, GatewayError>> + Send + 'static,
    {
        Self::new(name, FnHandler(handler))
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn required<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn optional<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn default_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.default_values.insert(key.into(), value);
        self
    }

    pub fn allow_unknown_args(mut self, allow: bool) -> Self {
        self.allow_unknown_args = allow;
        self
    }

    /// Argument gate shared by every intent, applied in order:
    /// required present, no default on a required arg, no unknown args, defaults filled in
    pub fn validate(&self, mut args: Map<String, Value>) -> Result<Map<String, Value>, GatewayError> {
        let missing: Vec<String> = self
            .required_args
            .iter()
            .filter(|key| !args.contains_key(*key))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(GatewayError::MissingRequiredArgument(missing));
        }

        let defaulted: Vec<String> = self
            .default_values
            .keys()
            .filter(|key| self.required_args.contains(*key))
            .cloned()
            .collect();
        if !defaulted.is_empty() {
            return Err(GatewayError::DefaultOnRequiredArgument(defaulted));
        }

        if !self.allow_unknown_args {
            let unknown: Vec<String> = args
                .keys()
                .filter(|key| !self.required_args.contains(*key) && !self.optional_args.contains(*key))
                .cloned()
                .collect();
            if !unknown.is_empty() {
                return Err(GatewayError::UnknownArgument(unknown));
            }
        }

        for (key, value) in &self.default_values {
            if !args.contains_key(key) {
                args.insert(key.clone(), value.clone());
            }
        }
        Ok(args)
    }

    pub async fn invoke(
        &self,
        context: Arc<GatewayContext>,
        caller: Caller,
        args: Map<String, Value>,
    ) -> Result<Value, GatewayError> {
        let args = self.validate(args)?;
        self.handler.handle(IntentCall { context, caller, args }).await
    }

    /// Read-only description published by the directory
    pub fn directory_entry(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "requiredArgs": self.required_args,
            "optionalArgs": self.optional_args,
            "defaultValues": self.default_values,
            "allowUnknownArgs": self.allow_unknown_args,
        })
    }
}

impl std::fmt::Debug for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Intent")
            .field("name", &self.name)
            .field("required_args", &self.required_args)
            .field("optional_args", &self.optional_args)
            .field("allow_unknown_args", &self.allow_unknown_args)
            .finish()
    }
}
