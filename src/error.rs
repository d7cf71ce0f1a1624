// Gateway error types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::Value;

use crate::api::envelope::{ErrorBody, ResponseEnvelope};
use crate::filter::FilterError;
use crate::policy::PolicyError;
use crate::registry::{HiddenField, RegistryError};
use crate::select::SelectError;
use crate::store::StoreError;

/// Every failure an intent invocation can surface, with a stable kind and status code
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayError {
    // 400 Bad Request
    NoIntent,
    MissingRequiredArgument(Vec<String>),
    UnknownArgument(Vec<String>),
    UnknownColumn { entity: String, column: String },
    MissingRequiredField { entity: String, fields: Vec<String> },
    InvalidRequestBody(String),
    InvalidArgument(String),
    InvalidFilter(String),
    UnknownField(String),
    /// A single-row lookup matched more than one row
    MultipleObjectsReturned { entity: String, count: usize },
    /// Store constraint violation, reported under the store's own kind name
    Integrity { kind: String, message: String },

    // 401 Unauthorized
    PermissionDenied(String),

    // 404 Not Found
    UnknownIntent(String),
    ObjectNotFound { entity: String, pk: Option<Value> },

    // 500 Internal Server Error
    DefaultOnRequiredArgument(Vec<String>),
    InvalidHandlerOutput(String),
    Configuration(String),
    Store(String),
    Internal(String),
}

impl GatewayError {
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::NoIntent
            | GatewayError::MissingRequiredArgument(_)
            | GatewayError::UnknownArgument(_)
            | GatewayError::UnknownColumn { .. }
            | GatewayError::MissingRequiredField { .. }
            | GatewayError::InvalidRequestBody(_)
            | GatewayError::InvalidArgument(_)
            | GatewayError::InvalidFilter(_)
            | GatewayError::UnknownField(_)
            | GatewayError::MultipleObjectsReturned { .. }
            | GatewayError::Integrity { .. } => 400,
            GatewayError::PermissionDenied(_) => 401,
            GatewayError::UnknownIntent(_) | GatewayError::ObjectNotFound { .. } => 404,
            GatewayError::DefaultOnRequiredArgument(_)
            | GatewayError::InvalidHandlerOutput(_)
            | GatewayError::Configuration(_)
            | GatewayError::Store(_)
            | GatewayError::Internal(_) => 500,
        }
    }

    /// Stable kind identifier for client handling
    pub fn error_code(&self) -> &str {
        match self {
            GatewayError::NoIntent => "NoIntent",
            GatewayError::MissingRequiredArgument(_) => "MissingRequiredArgument",
            GatewayError::UnknownArgument(_) => "UnknownArgument",
            GatewayError::UnknownColumn { .. } => "UnknownColumn",
            GatewayError::MissingRequiredField { .. } => "MissingRequiredField",
            GatewayError::InvalidRequestBody(_) => "InvalidRequestBody",
            GatewayError::InvalidArgument(_) => "InvalidArgument",
            GatewayError::InvalidFilter(_) => "InvalidFilter",
            GatewayError::UnknownField(_) => "UnknownField",
            GatewayError::MultipleObjectsReturned { .. } => "MultipleObjectsReturned",
            GatewayError::Integrity { kind, .. } => kind,
            GatewayError::PermissionDenied(_) => "PermissionDenied",
            GatewayError::UnknownIntent(_) => "UnknownIntent",
            GatewayError::ObjectNotFound { .. } => "ObjectNotFound",
            GatewayError::DefaultOnRequiredArgument(_) => "DefaultOnRequiredArgument",
            GatewayError::InvalidHandlerOutput(_) => "InvalidHandlerOutput",
            GatewayError::Configuration(_) => "ConfigurationError",
            GatewayError::Store(_) => "StoreError",
            GatewayError::Internal(_) => "InternalServerError",
        }
    }

    /// One-line description of the kind
    pub fn summary(&self) -> &'static str {
        match self {
            GatewayError::NoIntent => "intent not provided",
            GatewayError::MissingRequiredArgument(_) => "required arguments missing",
            GatewayError::UnknownArgument(_) => "unknown arguments",
            GatewayError::UnknownColumn { .. } => "column not permitted",
            GatewayError::MissingRequiredField { .. } => "required fields missing",
            GatewayError::InvalidRequestBody(_) => "invalid request body",
            GatewayError::InvalidArgument(_) => "invalid argument",
            GatewayError::InvalidFilter(_) => "invalid filter expression",
            GatewayError::UnknownField(_) => "unknown field selected",
            GatewayError::MultipleObjectsReturned { .. } => "more than one object matched",
            GatewayError::Integrity { .. } => "integrity constraint violated",
            GatewayError::PermissionDenied(_) => "permission denied",
            GatewayError::UnknownIntent(_) => "intent not found",
            GatewayError::ObjectNotFound { .. } => "object not found",
            GatewayError::DefaultOnRequiredArgument(_) => "required arguments should not have default values",
            GatewayError::InvalidHandlerOutput(_) => "intent should return a map, a sequence or null",
            GatewayError::Configuration(_) => "gateway misconfigured",
            GatewayError::Store(_) => "storage error",
            GatewayError::Internal(_) => "internal server error",
        }
    }

    /// Client-safe detail message
    pub fn message(&self) -> String {
        match self {
            GatewayError::NoIntent => "intent not provided".to_string(),
            GatewayError::MissingRequiredArgument(keys) => {
                format!("required keys ({}) not given in argument", keys.join(", "))
            }
            GatewayError::UnknownArgument(keys) => format!("unknown keys ({})", keys.join(", ")),
            GatewayError::UnknownColumn { entity, column } => format!("cannot use \"{}\" in {}", column, entity),
            GatewayError::MissingRequiredField { entity, fields } => {
                format!("{} requires fields ({})", entity, fields.join(", "))
            }
            GatewayError::MultipleObjectsReturned { entity, count } => {
                format!("find matched {} {} rows, expected one", count, entity)
            }
            GatewayError::ObjectNotFound { entity, pk: Some(pk) } => format!("{}(pk={}) not found", entity, pk),
            GatewayError::ObjectNotFound { entity, pk: None } => format!("no matching {} found", entity),
            GatewayError::UnknownIntent(name) => format!("intent \"{}\" is not registered", name),
            GatewayError::DefaultOnRequiredArgument(keys) => {
                format!("required arguments ({}) should not have default values", keys.join(", "))
            }
            GatewayError::Integrity { message, .. } => message.clone(),
            GatewayError::InvalidRequestBody(msg)
            | GatewayError::InvalidArgument(msg)
            | GatewayError::InvalidFilter(msg)
            | GatewayError::UnknownField(msg)
            | GatewayError::PermissionDenied(msg)
            | GatewayError::InvalidHandlerOutput(msg)
            | GatewayError::Configuration(msg)
            | GatewayError::Store(msg)
            | GatewayError::Internal(msg) => msg.clone(),
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            message: self.message(),
            error_code: self.error_code().to_string(),
            status_code: self.status_code(),
            summary: self.summary().to_string(),
        }
    }
}

impl GatewayError {
    pub fn permission_denied(message: impl Into<String>) -> Self {
        GatewayError::PermissionDenied(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        GatewayError::InvalidArgument(message.into())
    }

    pub fn invalid_request_body(message: impl Into<String>) -> Self {
        GatewayError::InvalidRequestBody(message.into())
    }

    pub fn unknown_column(entity: impl Into<String>, column: impl Into<String>) -> Self {
        GatewayError::UnknownColumn { entity: entity.into(), column: column.into() }
    }

    pub fn not_found(entity: impl Into<String>, pk: Option<Value>) -> Self {
        GatewayError::ObjectNotFound { entity: entity.into(), pk }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        GatewayError::Internal(message.into())
    }
}

// Convert subsystem errors to GatewayError
impl From<FilterError> for GatewayError {
    fn from(err: FilterError) -> Self {
        GatewayError::InvalidFilter(err.to_string())
    }
}

impl From<SelectError> for GatewayError {
    fn from(err: SelectError) -> Self {
        match err {
            SelectError::UnknownKey { .. } => GatewayError::UnknownField(err.to_string()),
            SelectError::InvalidSelector(msg) => GatewayError::InvalidRequestBody(msg),
        }
    }
}

impl From<PolicyError> for GatewayError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::Denied { .. } => GatewayError::PermissionDenied(err.to_string()),
            PolicyError::Configuration { .. } => {
                tracing::error!("Policy configuration error: {}", err);
                GatewayError::Configuration("An error occurred while processing your request".to_string())
            }
        }
    }
}

impl From<HiddenField> for GatewayError {
    fn from(hidden: HiddenField) -> Self {
        GatewayError::UnknownColumn { entity: hidden.entity, column: hidden.field }
    }
}

impl From<RegistryError> for GatewayError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Policy(policy) => policy.into(),
            other => {
                tracing::error!("Registry error: {}", other);
                GatewayError::Configuration("An error occurred while processing your request".to_string())
            }
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { table, pk } => GatewayError::ObjectNotFound { entity: table, pk: Some(pk) },
            StoreError::Integrity { kind, message } => GatewayError::Integrity { kind, message },
            StoreError::Unsupported(msg) => GatewayError::InvalidFilter(msg),
            StoreError::Sqlx(sqlx_err) => {
                // Log the real error but return generic message
                tracing::error!("SQLx error: {}", sqlx_err);
                GatewayError::Store("Database error occurred".to_string())
            }
            other => {
                tracing::error!("Store error: {}", other);
                GatewayError::Store("An error occurred while processing your request".to_string())
            }
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for GatewayError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ResponseEnvelope::failure(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Operation;

    #[test]
    fn test_policy_denial_is_401() {
        let err: GatewayError = PolicyError::Denied {
            entity: "note".to_string(),
            role: "anonymous".to_string(),
            operation: Operation::Delete,
        }
        .into();
        assert_eq!(err.status_code(), 401);
        assert_eq!(err.error_code(), "PermissionDenied");
    }

    #[test]
    fn test_integrity_errors_keep_native_kind() {
        let err: GatewayError = StoreError::integrity("UniqueViolation", "duplicate email").into();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_code(), "UniqueViolation");
        assert_eq!(err.message(), "duplicate email");
    }

    #[test]
    fn test_body_carries_code_and_summary() {
        let body = GatewayError::MissingRequiredArgument(vec!["x".to_string()]).to_body();
        assert_eq!(body.error_code, "MissingRequiredArgument");
        assert_eq!(body.status_code, 400);
        assert_eq!(body.message, "required keys (x) not given in argument");
        assert_eq!(body.summary, "required arguments missing");
    }

    #[test]
    fn test_hidden_filter_field_is_unknown_column() {
        let err: GatewayError = HiddenField { entity: "user".to_string(), field: "is_active".to_string() }.into();
        assert_eq!(err, GatewayError::unknown_column("user", "is_active"));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_driver_errors_are_not_leaked() {
        let err: GatewayError = StoreError::Sqlx(sqlx::Error::RowNotFound).into();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.message(), "Database error occurred");
    }
}
