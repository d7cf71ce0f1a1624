use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::api::envelope::ResponseEnvelope;
use crate::auth::{validate_jwt, Caller};
use crate::error::GatewayError;

/// Secret used to verify bearer tokens
#[derive(Clone)]
pub struct AuthSettings {
    pub jwt_secret: Arc<str>,
}

impl AuthSettings {
    pub fn new(jwt_secret: impl Into<Arc<str>>) -> Self {
        Self { jwt_secret: jwt_secret.into() }
    }
}

/// Resolves the request's `Caller` from an optional bearer token.
/// No token means an anonymous caller; a bad token is rejected outright.
pub async fn caller_middleware(
    State(settings): State<AuthSettings>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    let caller = match extract_jwt_from_headers(&headers) {
        Ok(None) => Caller::anonymous(),
        Ok(Some(token)) => match validate_jwt(&token, &settings.jwt_secret) {
            Ok(claims) => Caller::from(claims),
            Err(e) => return unauthorized(e.to_string()),
        },
        Err(msg) => return unauthorized(msg),
    };

    tracing::debug!("Request caller {:?}", caller.id);
    request.extensions_mut().insert(caller);
    next.run(request).await
}

fn unauthorized(message: impl Into<String>) -> Response {
    ResponseEnvelope::failure(&GatewayError::permission_denied(message)).into_response()
}

/// Extract JWT token from Authorization header, if one was sent
fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<Option<String>, String> {
    let Some(auth_header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        if token.trim().is_empty() {
            return Err("Empty JWT token".to_string());
        }
        Ok(Some(token.trim().to_string()))
    } else {
        Err("Authorization header must use Bearer token format".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_jwt_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_jwt_from_headers(&headers), Ok(None));

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_jwt_from_headers(&headers), Ok(Some("abc.def".to_string())));

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_jwt_from_headers(&headers).is_err());

        headers.insert("authorization", HeaderValue::from_static("Bearer  "));
        assert!(extract_jwt_from_headers(&headers).is_err());
    }
}
