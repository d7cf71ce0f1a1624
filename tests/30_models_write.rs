mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn insert_applies_defaults_and_renders_the_row() -> Result<()> {
    let app = common::spawn_app().await?;
    let ada = app.token(2, "user")?;

    let (status, body) = app
        .call(
            Some(&ada),
            "models.note.insert",
            json!({"object": {"name": "Loom", "author": 2}}),
            json!({"id": true, "name": true, "starred": true}),
        )
        .await?;

    assert_eq!(status, StatusCode::OK, "unexpected response: {}", body);
    assert_eq!(body["data"], json!({"id": 4, "name": "Loom", "starred": false}));
    assert_eq!(app.store.count("notes").await, 4);
    Ok(())
}

#[tokio::test]
async fn insert_check_hook_denies_foreign_author() -> Result<()> {
    let app = common::spawn_app().await?;
    let ada = app.token(2, "user")?;

    let (status, body) = app
        .call(Some(&ada), "models.note.insert", json!({"object": {"name": "Spoof", "author": 3}}), json!(true))
        .await?;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(common::error_code(&body), Some("PermissionDenied"));
    assert_eq!(app.store.count("notes").await, 3);
    Ok(())
}

#[tokio::test]
async fn anonymous_signup_through_insert() -> Result<()> {
    let app = common::spawn_app().await?;

    let (status, body) = app
        .call(None, "models.user.insert", json!({"object": {"email": "newcomer@example.com"}}), json!({"email": true, "role": true}))
        .await?;
    assert_eq!(status, StatusCode::OK, "unexpected response: {}", body);
    assert_eq!(body["data"], json!({"email": "newcomer@example.com", "role": "user"}));

    let (status, _) = app
        .call(None, "models.user.insert", json!({"object": {"email": "a@b.co"}}), json!(true))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn insert_validates_required_and_permitted_columns() -> Result<()> {
    let app = common::spawn_app().await?;
    let ada = app.token(2, "user")?;

    let (status, body) = app
        .call(Some(&ada), "models.project.insert", json!({"object": {"author": 2}}), json!(true))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(common::error_code(&body), Some("MissingRequiredField"));

    let (status, body) = app
        .call(
            Some(&ada),
            "models.project.insert",
            json!({"object": {"name": "Sneaky", "author": 2, "is_deleted": true}}),
            json!(true),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(common::error_code(&body), Some("UnknownColumn"));
    assert_eq!(app.store.count("projects").await, 3);
    Ok(())
}

#[tokio::test]
async fn insert_with_missing_reference_is_not_found() -> Result<()> {
    let app = common::spawn_app().await?;
    let admin = app.token(1, "admin")?;

    let (status, body) = app
        .call(Some(&admin), "models.project.insert", json!({"object": {"name": "Orphan", "author": 99}}), json!(true))
        .await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(common::error_code(&body), Some("ObjectNotFound"));
    assert_eq!(body["error"]["message"], json!("user(pk=99) not found"));
    Ok(())
}

#[tokio::test]
async fn insert_many_is_all_or_nothing() -> Result<()> {
    let app = common::spawn_app().await?;
    let admin = app.token(1, "admin")?;

    let (status, body) = app
        .call(
            Some(&admin),
            "models.user.insertmany",
            json!({"objects": [{"email": "fresh@example.com"}, {"email": "ada@example.com"}]}),
            json!(true),
        )
        .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(common::error_code(&body), Some("UniqueViolation"));
    assert_eq!(app.store.count("users").await, 4);
    Ok(())
}

#[tokio::test]
async fn update_is_limited_to_row_scope() -> Result<()> {
    let app = common::spawn_app().await?;
    let ada = app.token(2, "user")?;

    let (status, body) = app
        .call(Some(&ada), "models.project.update", json!({"pk": 1, "partial": {"name": "Engine"}}), json!({"name": true}))
        .await?;
    assert_eq!(status, StatusCode::OK, "unexpected response: {}", body);
    assert_eq!(body["data"], json!({"name": "Engine"}));

    let (status, body) = app
        .call(Some(&ada), "models.project.update", json!({"pk": 3, "partial": {"name": "Mine now"}}), json!(true))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], json!("project(pk=3) not found"));

    let (status, body) = app
        .call(Some(&ada), "models.project.update", json!({"pk": 1, "partial": {"is_deleted": true}}), json!(true))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(common::error_code(&body), Some("UnknownColumn"));
    Ok(())
}

#[tokio::test]
async fn update_many_rolls_back_on_any_miss() -> Result<()> {
    let app = common::spawn_app().await?;
    let ada = app.token(2, "user")?;

    let (status, _) = app
        .call(
            Some(&ada),
            "models.project.updatemany",
            json!({"objects": [{"pk": 1, "partial": {"name": "A"}}, {"pk": 3, "partial": {"name": "B"}}]}),
            json!(true),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app
        .call(None, "models.project.find", json!({"where": {"id": 1}}), json!({"name": true}))
        .await?;
    assert_eq!(body["data"], json!({"name": "Analytical Engine"}));
    Ok(())
}

#[tokio::test]
async fn delete_many_denied_deletes_nothing() -> Result<()> {
    let app = common::spawn_app().await?;
    let ada = app.token(2, "user")?;

    let (status, body) = app
        .call(Some(&ada), "models.project.deletemany", json!({"pks": [1]}), json!(true))
        .await?;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(common::error_code(&body), Some("PermissionDenied"));
    assert_eq!(app.store.count("projects").await, 3);
    Ok(())
}

#[tokio::test]
async fn delete_many_is_atomic() -> Result<()> {
    let app = common::spawn_app().await?;
    let admin = app.token(1, "admin")?;

    let (status, body) = app
        .call(Some(&admin), "models.project.deletemany", json!({"pks": [1, 99]}), json!(true))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], json!("project(pk=99) not found"));
    assert_eq!(app.store.count("projects").await, 3);

    let (status, body) = app
        .call(Some(&admin), "models.project.deletemany", json!({"pks": [1, 3]}), json!({"name": true}))
        .await?;
    assert_eq!(status, StatusCode::OK, "unexpected response: {}", body);
    assert_eq!(body["data"], json!([{"name": "Analytical Engine"}, {"name": "Garden"}]));
    assert_eq!(app.store.count("projects").await, 1);
    Ok(())
}

#[tokio::test]
async fn disallowed_operations_are_not_published() -> Result<()> {
    let app = common::spawn_app().await?;
    let admin = app.token(1, "admin")?;

    let (status, body) = app
        .call(Some(&admin), "models.note.delete", json!({"pk": 1}), json!(true))
        .await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(common::error_code(&body), Some("UnknownIntent"));
    Ok(())
}
