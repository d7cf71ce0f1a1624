use std::sync::Arc;

use serde_json::Value;

use super::{GatewayContext, IntentRegistry};
use crate::api::envelope::{DispatchResponse, RequestBody, RequestEnvelope, ResponseEnvelope};
use crate::auth::Caller;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::select::FieldSelector;

pub const NO_FIELDS_WARNING: &str = "fields not specified, you might get an empty data";

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Surface handler errors to the transport instead of enveloping them
    pub raise_errors: bool,
    pub enable_directory: bool,
    pub max_batch_size: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            raise_errors: false,
            enable_directory: true,
            max_batch_size: 100,
        }
    }
}

impl DispatchOptions {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            raise_errors: config.raise_errors,
            enable_directory: config.enable_directory,
            max_batch_size: config.max_batch_size,
        }
    }
}

/// Routes request envelopes to published intents and shapes their output
pub struct Dispatcher {
    intents: IntentRegistry,
    context: Arc<GatewayContext>,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(intents: IntentRegistry, context: Arc<GatewayContext>) -> Self {
        Self {
            intents,
            context,
            options: DispatchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn intents(&self) -> &IntentRegistry {
        &self.intents
    }

    pub fn context(&self) -> &Arc<GatewayContext> {
        &self.context
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Handles a whole request body. Batch elements run in order and never
    /// affect each other; each one gets its own envelope.
    pub async fn dispatch(&self, caller: &Caller, body: RequestBody) -> Result<DispatchResponse, GatewayError> {
        match body {
            RequestBody::Single(value) => Ok(DispatchResponse::Single(self.envelope(caller, value).await?)),
            RequestBody::Batch(items) => {
                if items.len() > self.options.max_batch_size {
                    let err = GatewayError::invalid_request_body(format!(
                        "batch of {} requests exceeds the limit of {}",
                        items.len(),
                        self.options.max_batch_size
                    ));
                    return self.fail(err).map(DispatchResponse::Single);
                }

                tracing::debug!("Dispatching batch of {} requests", items.len());
                let mut envelopes = Vec::with_capacity(items.len());
                for item in items {
                    envelopes.push(self.envelope(caller, item).await?);
                }
                Ok(DispatchResponse::Batch(envelopes))
            }
        }
    }

    /// Runs one raw body element; errors become failure envelopes unless `raise_errors` is set
    pub async fn envelope(&self, caller: &Caller, value: Value) -> Result<ResponseEnvelope, GatewayError> {
        let result = match RequestEnvelope::from_value(value) {
            Ok(request) => self.invoke(caller, request).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(envelope) => Ok(envelope),
            Err(err) => self.fail(err),
        }
    }

    fn fail(&self, err: GatewayError) -> Result<ResponseEnvelope, GatewayError> {
        if self.options.raise_errors {
            return Err(err);
        }
        if err.status_code() >= 500 {
            tracing::error!("Intent failed: {}", err);
        } else {
            tracing::warn!("Intent rejected: {}", err);
        }
        Ok(ResponseEnvelope::failure(&err))
    }

    /// Resolves, validates and runs one envelope, then projects its data
    pub async fn invoke(&self, caller: &Caller, request: RequestEnvelope) -> Result<ResponseEnvelope, GatewayError> {
        let name = match request.intent.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => return Err(GatewayError::NoIntent),
        };
        let intent = self
            .intents
            .get(name)
            .ok_or_else(|| GatewayError::UnknownIntent(name.to_string()))?;

        let selector = FieldSelector::from_value(request.fields.as_ref())?;
        let warning = selector.is_empty().then(|| NO_FIELDS_WARNING.to_string());

        tracing::debug!("Invoking {} with {} args", name, request.args.len());
        let data = intent.invoke(self.context.clone(), caller.clone(), request.args).await?;

        let data = match data {
            Value::Null => Value::Null,
            Value::Object(_) | Value::Array(_) => selector.apply(&data)?,
            other => {
                return Err(GatewayError::InvalidHandlerOutput(format!(
                    "{} returned {}, expected a map, a sequence or null",
                    name, other
                )))
            }
        };
        Ok(ResponseEnvelope::success(data, warning))
    }

    /// Published intent descriptions, when the directory is enabled
    pub fn directory(&self) -> Option<Value> {
        self.options.enable_directory.then(|| self.intents.directory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{Intent, IntentCall};
    use crate::registry::EntityRegistry;
    use crate::store::{MemoryStore, Schema};
    use serde_json::json;

    fn dispatcher(options: DispatchOptions) -> Dispatcher {
        let mut intents = IntentRegistry::new();
        intents
            .function(
                Intent::from_fn("greet", |call: IntentCall| async move {
                    let name = call.arg("name").cloned().unwrap_or(Value::Null);
                    Ok::<_, GatewayError>(json!({"greeting": "hello", "name": name}))
                })
                .optional(["name"]),
            )
            .unwrap();
        intents
            .function(Intent::from_fn("answer", |_: IntentCall| async { Ok::<_, GatewayError>(json!(42)) }))
            .unwrap();

        let context = GatewayContext::new(Arc::new(EntityRegistry::new()), Arc::new(MemoryStore::new(Schema::new())));
        Dispatcher::new(intents, Arc::new(context)).with_options(options)
    }

    async fn run(dispatcher: &Dispatcher, body: Value) -> Value {
        dispatcher
            .dispatch(&Caller::anonymous(), RequestBody::from(body))
            .await
            .unwrap()
            .into_value()
    }

    #[tokio::test]
    async fn test_fields_project_handler_output() {
        let dispatcher = dispatcher(DispatchOptions::default());
        let response = run(
            &dispatcher,
            json!({"intent": "functions.greet", "fields": {"greeting": true}, "args": {"name": "ada"}}),
        )
        .await;
        assert_eq!(response["data"], json!({"greeting": "hello"}));
        assert_eq!(response["warning"], Value::Null);
    }

    #[tokio::test]
    async fn test_missing_fields_warns() {
        let dispatcher = dispatcher(DispatchOptions::default());
        let response = run(&dispatcher, json!({"intent": "functions.greet"})).await;
        assert_eq!(response["data"], json!({}));
        assert_eq!(response["warning"], json!(NO_FIELDS_WARNING));
    }

    #[tokio::test]
    async fn test_resolution_errors() {
        let dispatcher = dispatcher(DispatchOptions::default());

        let response = run(&dispatcher, json!({"fields": true})).await;
        assert_eq!(response["error"]["errorCode"], json!("NoIntent"));
        assert_eq!(response["statusCode"], json!(400));

        let response = run(&dispatcher, json!({"intent": "functions.nope"})).await;
        assert_eq!(response["error"]["errorCode"], json!("UnknownIntent"));
        assert_eq!(response["statusCode"], json!(404));

        let response = run(&dispatcher, json!({"intent": "functions.answer", "fields": true})).await;
        assert_eq!(response["error"]["errorCode"], json!("InvalidHandlerOutput"));
        assert_eq!(response["statusCode"], json!(500));
    }

    #[tokio::test]
    async fn test_batch_elements_are_independent() {
        let dispatcher = dispatcher(DispatchOptions::default());
        let response = run(
            &dispatcher,
            json!([
                {"intent": "functions.greet", "fields": true},
                {"intent": "functions.greet", "args": {"unexpected": 1}},
                {"intent": "functions.greet", "fields": {"name": true}, "args": {"name": "bob"}}
            ]),
        )
        .await;
        assert_eq!(response[0]["meta"]["hasError"], json!(false));
        assert_eq!(response[1]["error"]["errorCode"], json!("UnknownArgument"));
        assert_eq!(response[2]["data"], json!({"name": "bob"}));
    }

    #[tokio::test]
    async fn test_raise_errors_surfaces_failures() {
        let dispatcher = dispatcher(DispatchOptions { raise_errors: true, ..DispatchOptions::default() });
        let err = dispatcher
            .dispatch(&Caller::anonymous(), RequestBody::from(json!({"intent": "functions.nope"})))
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::UnknownIntent("functions.nope".to_string()));
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected() {
        let dispatcher = dispatcher(DispatchOptions { max_batch_size: 1, ..DispatchOptions::default() });
        let response = run(&dispatcher, json!([{"intent": "functions.greet"}, {"intent": "functions.greet"}])).await;
        assert_eq!(response["error"]["errorCode"], json!("InvalidRequestBody"));
    }

    #[test]
    fn test_directory_can_be_disabled() {
        assert!(dispatcher(DispatchOptions::default()).directory().is_some());
        let hidden = dispatcher(DispatchOptions { enable_directory: false, ..DispatchOptions::default() });
        assert_eq!(hidden.directory(), None);
    }
}
