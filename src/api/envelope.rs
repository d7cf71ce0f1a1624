use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GatewayError;

/// One intent invocation as submitted by a caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub fields: Option<Value>,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl RequestEnvelope {
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: Some(intent.into()),
            ..Self::default()
        }
    }

    pub fn fields(mut self, fields: Value) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn arg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.args.insert(key.into(), value);
        self
    }

    /// Reads an envelope out of a raw body element; `args: null` counts as empty
    pub fn from_value(value: Value) -> Result<Self, GatewayError> {
        let Value::Object(mut body) = value else {
            return Err(GatewayError::invalid_request_body("request body must be an object"));
        };
        if body.get("args").map_or(false, Value::is_null) {
            body.remove("args");
        }
        serde_json::from_value(Value::Object(body)).map_err(|e| GatewayError::invalid_request_body(e.to_string()))
    }
}

/// Top-level body: one envelope or a batch of them
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Single(Value),
    Batch(Vec<Value>),
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => RequestBody::Batch(items),
            other => RequestBody::Single(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub message: String,
    pub error_code: String,
    pub status_code: u16,
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub has_error: bool,
}

/// Uniform result of every invocation, successful or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub data: Value,
    pub error: Option<ErrorBody>,
    pub warning: Option<String>,
    pub status_code: u16,
    pub meta: ResponseMeta,
}

impl ResponseEnvelope {
    pub fn success(data: Value, warning: Option<String>) -> Self {
        Self {
            data,
            error: None,
            warning,
            status_code: 200,
            meta: ResponseMeta { has_error: false },
        }
    }

    pub fn failure(error: &GatewayError) -> Self {
        Self {
            data: Value::Null,
            error: Some(error.to_body()),
            warning: None,
            status_code: error.status_code(),
            meta: ResponseMeta { has_error: true },
        }
    }

    pub fn is_error(&self) -> bool {
        self.meta.has_error
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.error_code.as_str())
    }
}

impl From<Result<ResponseEnvelope, GatewayError>> for ResponseEnvelope {
    fn from(result: Result<ResponseEnvelope, GatewayError>) -> Self {
        result.unwrap_or_else(|e| ResponseEnvelope::failure(&e))
    }
}

impl IntoResponse for ResponseEnvelope {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Envelope(s) produced for one request body
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchResponse {
    Single(ResponseEnvelope),
    Batch(Vec<ResponseEnvelope>),
}

impl DispatchResponse {
    pub fn into_value(self) -> Value {
        let result = match self {
            DispatchResponse::Single(envelope) => serde_json::to_value(envelope),
            DispatchResponse::Batch(envelopes) => serde_json::to_value(envelopes),
        };
        result.unwrap_or(Value::Null)
    }
}

impl IntoResponse for DispatchResponse {
    fn into_response(self) -> Response {
        match self {
            DispatchResponse::Single(envelope) => envelope.into_response(),
            // Per-element status lives inside each envelope
            DispatchResponse::Batch(envelopes) => (StatusCode::OK, Json(envelopes)).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_names() {
        let envelope = ResponseEnvelope::failure(&GatewayError::NoIntent);
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "data": null,
                "error": {
                    "message": "intent not provided",
                    "errorCode": "NoIntent",
                    "statusCode": 400,
                    "summary": "intent not provided"
                },
                "warning": null,
                "statusCode": 400,
                "meta": {"hasError": true}
            })
        );
    }

    #[test]
    fn test_request_envelope_defaults() {
        let request = RequestEnvelope::from_value(json!({"intent": "functions.ping", "args": null})).unwrap();
        assert_eq!(request, RequestEnvelope::new("functions.ping"));

        assert!(RequestEnvelope::from_value(json!("functions.ping")).is_err());
        assert!(RequestEnvelope::from_value(json!({"intent": "x", "args": [1]})).is_err());
    }
}
