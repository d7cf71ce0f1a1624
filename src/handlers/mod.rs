pub mod health;
pub mod uql;

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, http::HeaderValue, middleware, routing::get, Router};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::intent::Dispatcher;
use crate::middleware::{caller_middleware, request_logging_middleware, AuthSettings};

/// Shared by every route
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher: Arc::new(dispatcher) }
    }
}

/// Full HTTP surface: `/uql` for intents, `/health` for liveness checks
pub fn app(state: AppState, config: &AppConfig) -> Router {
    let auth = AuthSettings::new(config.security.jwt_secret.as_str());

    let uql = Router::new()
        .route("/uql", get(uql::uql_get).post(uql::uql_post))
        .route_layer(middleware::from_fn_with_state(auth, caller_middleware));

    let mut router = Router::new()
        .route("/health", get(health::health))
        .merge(uql)
        .layer(DefaultBodyLimit::max(config.api.max_request_size_bytes))
        .layer(TraceLayer::new_for_http());

    if config.api.enable_request_logging {
        router = router.layer(middleware::from_fn(request_logging_middleware));
    }
    if config.security.enable_cors {
        router = router.layer(cors_layer(&config.security.cors_origins));
    }
    router.with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
