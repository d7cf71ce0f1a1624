pub mod dispatcher;
pub mod function;
pub mod model;
pub mod registry;

use std::sync::Arc;

use thiserror::Error;

use crate::auth::{Authenticator, Caller, ClaimsAuthenticator};
use crate::filter::FilterCompiler;
use crate::registry::EntityRegistry;
use crate::store::RowStore;

pub use dispatcher::{DispatchOptions, Dispatcher, NO_FIELDS_WARNING};
pub use function::{Intent, IntentCall, IntentHandler};
pub use model::ModelIntent;
pub use registry::IntentRegistry;

/// Errors raised while publishing intents at startup
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntentError {
    #[error("bad function name {0}")]
    InvalidName(String),

    #[error("bad module name {0}")]
    InvalidModule(String),

    #[error("intent '{0}' is already registered")]
    Duplicate(String),
}

/// Collaborators shared by every intent invocation
pub struct GatewayContext {
    pub entities: Arc<EntityRegistry>,
    pub store: Arc<dyn RowStore>,
    pub authenticator: Arc<dyn Authenticator>,
    pub filters: FilterCompiler,
    pub audit_logging: bool,
}

impl GatewayContext {
    pub fn new(entities: Arc<EntityRegistry>, store: Arc<dyn RowStore>) -> Self {
        Self {
            entities,
            store,
            authenticator: Arc::new(ClaimsAuthenticator::default()),
            filters: FilterCompiler::default(),
            audit_logging: false,
        }
    }

    pub fn with_authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Arc::new(authenticator);
        self
    }

    pub fn with_filter_compiler(mut self, filters: FilterCompiler) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_audit_logging(mut self, enabled: bool) -> Self {
        self.audit_logging = enabled;
        self
    }

    pub fn role(&self, caller: &Caller) -> String {
        self.authenticator.authenticated_role(caller)
    }
}
