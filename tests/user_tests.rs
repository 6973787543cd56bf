// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile and user administration endpoints.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{body_json, TestApp};
use serde_json::{json, Value};
use uuid::Uuid;

async fn put_me(app: &TestApp, token: &str, body: Value) -> axum::http::Response<Body> {
    app.request(
        Request::builder()
            .method("PUT")
            .uri("/users/me")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

/// Log in and promote the user to superuser.
async fn admin(app: &TestApp) -> (Uuid, String) {
    let login = app.login("ya-token-1").await;
    let id: Uuid = login["user"]["id"].as_str().unwrap().parse().unwrap();
    app.db.set_superuser(id, true);
    (id, login["access_token"].as_str().unwrap().to_string())
}

#[tokio::test]
async fn test_get_me() {
    let app = TestApp::new().await;
    let login = app.login("ya-token-2").await;
    let token = login["access_token"].as_str().unwrap();

    let response = app.get("/users/me", token).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], login["user"]["id"]);
    assert_eq!(body["email"], "maria@yandex.ru");
    assert_eq!(body["name"], "maria");
    assert!(body.get("yandex_id").is_none());
}

#[tokio::test]
async fn test_update_me() {
    let app = TestApp::new().await;
    let token = app.access_token("ya-token-1").await;

    let response = put_me(&app, &token, json!({ "name": "Ivan P." })).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["name"], "Ivan P.");
    assert_eq!(body["email"], "ivan@yandex.ru");

    let response = put_me(&app, &token, json!({ "email": "ivan@example.com" })).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["name"], "Ivan P.");
    assert_eq!(body["email"], "ivan@example.com");

    let me = body_json(app.get("/users/me", &token).await).await;
    assert_eq!(me["email"], "ivan@example.com");
}

#[tokio::test]
async fn test_update_me_validation() {
    let app = TestApp::new().await;
    let token = app.access_token("ya-token-1").await;

    let empty = put_me(&app, &token, json!({})).await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let short_name = put_me(&app, &token, json!({ "name": "I" })).await;
    assert_eq!(short_name.status(), StatusCode::BAD_REQUEST);

    let bad_email = put_me(&app, &token, json!({ "email": "not-an-email" })).await;
    assert_eq!(bad_email.status(), StatusCode::BAD_REQUEST);

    let me = body_json(app.get("/users/me", &token).await).await;
    assert_eq!(me["name"], "Ivan Petrov");
}

#[tokio::test]
async fn test_malformed_requests_are_bad_request() {
    let app = TestApp::new().await;
    let (_, token) = admin(&app).await;

    let response = app
        .request(
            Request::builder()
                .method("PUT")
                .uri("/users/me")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"name": 42}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "bad_request");

    let response = app.get("/users?limit=lots", &token).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "bad_request");

    let response = app.delete("/users/not-a-uuid", &token).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "bad_request");
}

#[tokio::test]
async fn test_update_me_email_conflict() {
    let app = TestApp::new().await;
    let token = app.access_token("ya-token-1").await;
    app.login("ya-token-2").await;

    let response = put_me(&app, &token, json!({ "email": "maria@yandex.ru" })).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_list_users_requires_superuser() {
    let app = TestApp::new().await;
    let token = app.access_token("ya-token-2").await;

    let response = app.get("/users", &token).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_superuser_lists_users() {
    let app = TestApp::new().await;
    let (_, token) = admin(&app).await;
    app.login("ya-token-2").await;

    let response = app.get("/users", &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let page = body_json(app.get("/users?skip=1&limit=1", &token).await).await;
    assert_eq!(page.as_array().unwrap().len(), 1);

    let past_end = body_json(app.get("/users?skip=5", &token).await).await;
    assert!(past_end.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_deactivated_user_is_locked_out() {
    let app = TestApp::new().await;
    let (_, admin_token) = admin(&app).await;
    let victim = app.login("ya-token-2").await;
    let victim_id = victim["user"]["id"].as_str().unwrap();
    let victim_token = victim["access_token"].as_str().unwrap();

    let response = app
        .delete(&format!("/users/{}", victim_id), &admin_token)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["is_active"], false);

    // Outstanding access token no longer works
    let response = app.get("/users/me", victim_token).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Refresh token was revoked
    let response = app
        .request(
            Request::builder()
                .method("POST")
                .uri("/auth/refresh")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "refresh_token": victim["refresh_token"] }).to_string(),
                ))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Logging in again is refused and the row is kept
    let response = app
        .request(
            Request::builder()
                .method("POST")
                .uri("/auth/yandex")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "access_token": "ya-token-2" }).to_string(),
                ))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(app.db.user_count(), 2);
}

#[tokio::test]
async fn test_deactivate_rules() {
    let app = TestApp::new().await;
    let (admin_id, admin_token) = admin(&app).await;
    let other_token = app.access_token("ya-token-2").await;

    let myself = app
        .delete(&format!("/users/{}", admin_id), &admin_token)
        .await;
    assert_eq!(myself.status(), StatusCode::BAD_REQUEST);

    let unknown = app
        .delete(&format!("/users/{}", Uuid::new_v4()), &admin_token)
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let not_admin = app
        .delete(&format!("/users/{}", admin_id), &other_token)
        .await;
    assert_eq!(not_admin.status(), StatusCode::FORBIDDEN);
}
