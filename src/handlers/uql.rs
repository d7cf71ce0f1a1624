use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::Value;

use super::AppState;
use crate::api::envelope::{RequestBody, ResponseEnvelope};
use crate::auth::Caller;
use crate::error::GatewayError;

/// POST /uql - run one request envelope, or a batch of them
pub async fn uql_post(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => return GatewayError::invalid_request_body(rejection.body_text()).into_response(),
    };

    match state.dispatcher.dispatch(&caller, RequestBody::from(body)).await {
        Ok(response) => response.into_response(),
        Err(err) => {
            // raise_errors: nothing below the transport handles it
            tracing::error!("Unhandled intent error: {}", err);
            err.into_response()
        }
    }
}

/// GET /uql - directory of published intents
pub async fn uql_get(State(state): State<AppState>) -> Response {
    match state.dispatcher.directory() {
        Some(directory) => ResponseEnvelope::success(directory, None).into_response(),
        None => GatewayError::UnknownIntent("directory".to_string()).into_response(),
    }
}
