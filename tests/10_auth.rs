mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn missing_token_is_anonymous() -> Result<()> {
    let app = common::spawn_app().await?;

    let (status, body) = app.call(None, "functions.whoami", json!({}), json!(true)).await?;

    assert_eq!(status, StatusCode::OK, "unexpected response: {}", body);
    assert_eq!(body["data"], json!({"id": null, "role": "anonymous", "anonymous": true}));
    Ok(())
}

#[tokio::test]
async fn token_claims_select_the_role() -> Result<()> {
    let app = common::spawn_app().await?;
    let token = app.token(2, "user")?;

    let (status, body) = app.call(Some(&token), "functions.whoami", json!({}), json!("$all")).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({"id": 2, "role": "user", "anonymous": false}));
    Ok(())
}

#[tokio::test]
async fn invalid_token_is_rejected() -> Result<()> {
    let app = common::spawn_app().await?;

    let (status, body) = app.call(Some("not-a-jwt"), "functions.whoami", json!({}), json!(true)).await?;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(common::error_code(&body), Some("PermissionDenied"));
    assert_eq!(body["meta"]["hasError"], json!(true));
    Ok(())
}

#[tokio::test]
async fn configured_anonymous_role_is_used() -> Result<()> {
    let mut config = uql_gateway::config::AppConfig::development();
    config.gateway.anonymous_role = "guest".to_string();
    let app = common::spawn_app_with(config).await?;

    let (_, body) = app.call(None, "functions.whoami", json!({}), json!({"role": true})).await?;
    assert_eq!(body["data"], json!({"role": "guest"}));

    // No policies exist for "guest"
    let (status, body) = app
        .call(None, "models.project.selectmany", json!({}), json!(true))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(common::error_code(&body), Some("PermissionDenied"));
    Ok(())
}
