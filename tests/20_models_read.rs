mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn find_user_by_email() -> Result<()> {
    let app = common::spawn_app().await?;

    let (status, body) = app
        .call(
            None,
            "models.user.find",
            json!({"where": {"email": {"_eq": "ada@example.com"}}}),
            json!({"email": true}),
        )
        .await?;

    assert_eq!(status, StatusCode::OK, "unexpected response: {}", body);
    assert_eq!(body["data"], json!({"email": "ada@example.com"}));
    assert_eq!(body["warning"], json!(null));
    Ok(())
}

#[tokio::test]
async fn find_outside_row_scope_is_not_found() -> Result<()> {
    let app = common::spawn_app().await?;

    // Inactive users are invisible to anonymous callers
    let (status, body) = app
        .call(None, "models.user.find", json!({"where": {"email": "gone@example.com"}}), json!(true))
        .await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(common::error_code(&body), Some("ObjectNotFound"));
    Ok(())
}

#[tokio::test]
async fn select_many_hides_rows_outside_scope() -> Result<()> {
    let app = common::spawn_app().await?;

    let (status, body) = app
        .call(None, "models.project.selectmany", json!({}), json!({"name": true}))
        .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([{"name": "Analytical Engine"}, {"name": "Garden"}]));
    Ok(())
}

#[tokio::test]
async fn where_on_hidden_column_is_rejected() -> Result<()> {
    let app = common::spawn_app().await?;

    let (status, body) = app
        .call(None, "models.project.selectmany", json!({"where": {"is_deleted": true}}), json!(true))
        .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(common::error_code(&body), Some("UnknownColumn"));
    Ok(())
}

#[tokio::test]
async fn relationships_render_nested_and_stop_at_cycles() -> Result<()> {
    let app = common::spawn_app().await?;
    let admin = app.token(1, "admin")?;

    let (status, body) = app
        .call(
            Some(&admin),
            "models.user.find",
            json!({"where": {"id": 2}}),
            json!({"email": true, "projects": {"name": true, "author": true}}),
        )
        .await?;

    assert_eq!(status, StatusCode::OK, "unexpected response: {}", body);
    assert_eq!(
        body["data"],
        json!({
            "email": "ada@example.com",
            "projects": [
                {"name": "Analytical Engine", "author": 2},
                {"name": "Old draft", "author": 2}
            ]
        })
    );
    Ok(())
}

#[tokio::test]
async fn nested_rows_follow_the_target_scope() -> Result<()> {
    let app = common::spawn_app().await?;

    let (_, body) = app
        .call(None, "models.user.find", json!({"where": {"id": 2}}), json!({"projects": {"name": true}}))
        .await?;

    assert_eq!(body["data"], json!({"projects": [{"name": "Analytical Engine"}]}));
    Ok(())
}

#[tokio::test]
async fn filter_operators_and_traversal() -> Result<()> {
    let app = common::spawn_app().await?;
    let admin = app.token(1, "admin")?;

    let (_, body) = app
        .call(
            Some(&admin),
            "models.project.selectmany",
            json!({"where": {"_or": [{"name": {"_icontains": "gar"}}, {"author": {"email": "ada@example.com"}, "is_deleted": true}]}}),
            json!({"id": true}),
        )
        .await?;
    assert_eq!(body["data"], json!([{"id": 2}, {"id": 3}]));

    let (status, body) = app
        .call(Some(&admin), "models.project.selectmany", json!({"where": {"name": {"_bogus": 1}}}), json!(true))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(common::error_code(&body), Some("InvalidFilter"));
    Ok(())
}

#[tokio::test]
async fn notes_are_scoped_to_their_author() -> Result<()> {
    let app = common::spawn_app().await?;
    let ada = app.token(2, "user")?;

    let (status, body) = app
        .call(Some(&ada), "models.note.selectmany", json!({}), json!({"name": true, "author": {"email": true}}))
        .await?;

    assert_eq!(status, StatusCode::OK, "unexpected response: {}", body);
    assert_eq!(body["data"], json!([{"name": "Bernoulli", "author": {"email": "ada@example.com"}}]));
    Ok(())
}

#[tokio::test]
async fn where_cannot_reach_past_the_callers_view() -> Result<()> {
    let app = common::spawn_app().await?;

    // Anonymous callers cannot select notes at all
    let (status, body) = app
        .call(
            None,
            "models.project.selectmany",
            json!({"where": {"author": {"notes": {"content": {"_regex": "^Note G"}}}}}),
            json!({"id": true}),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "unexpected response: {}", body);
    assert_eq!(common::error_code(&body), Some("UnknownColumn"));

    // users.is_active is outside the anonymous column set
    let (status, body) = app
        .call(None, "models.project.selectmany", json!({"where": {"author": {"is_active": true}}}), json!({"id": true}))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "unexpected response: {}", body);
    assert_eq!(common::error_code(&body), Some("UnknownColumn"));
    assert_eq!(body["error"]["message"], json!("cannot use \"is_active\" in user"));

    // Visible related columns still filter
    let (status, body) = app
        .call(None, "models.project.selectmany", json!({"where": {"author": {"email": "bob@example.com"}}}), json!({"id": true}))
        .await?;
    assert_eq!(status, StatusCode::OK, "unexpected response: {}", body);
    assert_eq!(body["data"], json!([{"id": 3}]));
    Ok(())
}

#[tokio::test]
async fn where_through_relations_respects_their_row_scope() -> Result<()> {
    let app = common::spawn_app().await?;

    // Project 2 is deleted, so anonymous callers cannot match ada through it
    let (_, body) = app
        .call(None, "models.user.selectmany", json!({"where": {"projects": {"name": "Old draft"}}}), json!({"id": true}))
        .await?;
    assert_eq!(body["data"], json!([]));

    let (_, body) = app
        .call(None, "models.user.selectmany", json!({"where": {"projects": {"_in": [2]}}}), json!({"id": true}))
        .await?;
    assert_eq!(body["data"], json!([]));

    let (_, body) = app
        .call(None, "models.user.selectmany", json!({"where": {"projects": {"_null": false}}}), json!({"id": true}))
        .await?;
    assert_eq!(body["data"], json!([{"id": 2}, {"id": 3}]));
    Ok(())
}

#[tokio::test]
async fn find_rejects_ambiguous_matches() -> Result<()> {
    let app = common::spawn_app().await?;

    let (status, body) = app
        .call(None, "models.user.find", json!({"where": {"role": "user"}}), json!({"email": true}))
        .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST, "unexpected response: {}", body);
    assert_eq!(common::error_code(&body), Some("MultipleObjectsReturned"));
    Ok(())
}
