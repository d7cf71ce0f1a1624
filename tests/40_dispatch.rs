mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn batch_runs_each_intent_in_order() -> Result<()> {
    let app = common::spawn_app().await?;

    let (status, body) = app
        .post(
            json!([
                {"intent": "functions.task", "fields": "$all"},
                {"intent": "functions.task_two", "fields": "$all"}
            ]),
            None,
        )
        .await?;

    assert_eq!(status, StatusCode::OK);
    let messages: Vec<_> = body
        .as_array()
        .expect("batch response is an array")
        .iter()
        .map(|envelope| envelope["data"]["message"].clone())
        .collect();
    assert_eq!(messages, vec![json!("hello"), json!("hi")]);
    Ok(())
}

#[tokio::test]
async fn batch_failures_stay_in_their_envelope() -> Result<()> {
    let app = common::spawn_app().await?;

    let (status, body) = app
        .post(
            json!([
                {"intent": "functions.nope"},
                {"intent": "functions.math.add", "args": {"a": 2}, "fields": true}
            ]),
            None,
        )
        .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["statusCode"], json!(404));
    assert_eq!(common::error_code(&body[0]), Some("UnknownIntent"));
    assert_eq!(body[1]["data"], json!({"sum": 2.0}));
    Ok(())
}

#[tokio::test]
async fn argument_gate_rejects_bad_calls() -> Result<()> {
    let app = common::spawn_app().await?;

    let (status, body) = app.call(None, "models.user.find", json!({}), json!(true)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(common::error_code(&body), Some("MissingRequiredArgument"));
    assert_eq!(body["error"]["message"], json!("required keys (where) not given in argument"));

    let (status, body) = app
        .call(None, "models.user.find", json!({"where": {}, "limit": 1}), json!(true))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(common::error_code(&body), Some("UnknownArgument"));
    Ok(())
}

#[tokio::test]
async fn envelope_errors() -> Result<()> {
    let app = common::spawn_app().await?;

    let (status, body) = app.post(json!({"fields": true}), None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(common::error_code(&body), Some("NoIntent"));

    let (status, body) = app.post(json!("functions.task"), None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(common::error_code(&body), Some("InvalidRequestBody"));

    let (status, body) = app
        .call(None, "functions.task", json!({}), json!({"missing": true}))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(common::error_code(&body), Some("UnknownField"));
    Ok(())
}

#[tokio::test]
async fn omitted_fields_warn() -> Result<()> {
    let app = common::spawn_app().await?;

    let (status, body) = app.post(json!({"intent": "functions.task"}), None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({}));
    assert_eq!(body["warning"], json!(uql_gateway::intent::NO_FIELDS_WARNING));
    Ok(())
}

#[tokio::test]
async fn directory_lists_published_intents() -> Result<()> {
    let app = common::spawn_app().await?;

    let (status, body) = app.get("/uql").await?;

    assert_eq!(status, StatusCode::OK);
    let directory = body["data"].as_object().expect("directory is a map");
    assert!(directory.contains_key("models.user.find"));
    assert!(directory.contains_key("functions.task"));
    assert!(directory.contains_key("functions.task_two"));
    assert_eq!(directory["models.user.find"]["name"], json!("models.user.find"));
    assert_eq!(directory["functions.task"]["name"], json!("functions.task"));
    assert_eq!(directory["functions.math.add"]["defaultValues"], json!({"b": 0}));
    Ok(())
}

#[tokio::test]
async fn directory_can_be_disabled() -> Result<()> {
    let app = common::spawn_app_with(uql_gateway::config::AppConfig::production()).await?;

    let (status, body) = app.get("/uql").await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(common::error_code(&body), Some("UnknownIntent"));
    Ok(())
}

#[tokio::test]
async fn health_reports_store_status() -> Result<()> {
    let app = common::spawn_app().await?;

    let (status, body) = app.get("/health").await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("ok"));
    assert_eq!(body["data"]["store"], json!("ok"));
    Ok(())
}
