use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use uql_gateway::auth::{generate_jwt, Claims};
use uql_gateway::config::AppConfig;
use uql_gateway::demo;
use uql_gateway::handlers::{app, AppState};
use uql_gateway::store::MemoryStore;

/// The demo gateway over a freshly seeded in-memory store, driven in-process
pub struct TestApp {
    pub router: Router,
    pub config: AppConfig,
    pub store: Arc<MemoryStore>,
}

pub async fn spawn_app() -> Result<TestApp> {
    spawn_app_with(AppConfig::development()).await
}

pub async fn spawn_app_with(config: AppConfig) -> Result<TestApp> {
    let store = Arc::new(MemoryStore::new(demo::entities()?.schema()));
    demo::fixtures()?.seed(store.as_ref()).await.context("seeding demo fixtures")?;

    let dispatcher = demo::dispatcher(&config, store.clone())?;
    let router = app(AppState::new(dispatcher), &config);
    Ok(TestApp { router, config, store })
}

impl TestApp {
    pub fn token(&self, user_id: i64, role: &str) -> Result<String> {
        let claims = Claims::new(json!(user_id), role, 1);
        Ok(generate_jwt(&claims, &self.config.security.jwt_secret)?)
    }

    pub async fn send(&self, method: Method, path: &str, token: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let mut request = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => request.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
        Ok((status, body))
    }

    pub async fn post(&self, body: Value, token: Option<&str>) -> Result<(StatusCode, Value)> {
        self.send(Method::POST, "/uql", token, Some(body)).await
    }

    /// Single intent call with an explicit field selector
    pub async fn call(&self, token: Option<&str>, intent: &str, args: Value, fields: Value) -> Result<(StatusCode, Value)> {
        self.post(json!({"intent": intent, "args": args, "fields": fields}), token).await
    }

    pub async fn get(&self, path: &str) -> Result<(StatusCode, Value)> {
        self.send(Method::GET, path, None, None).await
    }
}

pub fn error_code(body: &Value) -> Option<&str> {
    body["error"]["errorCode"].as_str()
}
