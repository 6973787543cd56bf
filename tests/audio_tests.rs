// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Audio upload, listing, download and deletion.

mod common;

use audio_store::db::AudioRepository;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{body_bytes, body_json, TestApp};
use uuid::Uuid;

const MP3_BYTES: &[u8] = b"ID3\x04\x00\x00\x00\x00\x00\x00fake mp3 frames";

#[tokio::test]
async fn test_upload_then_list() {
    let app = TestApp::new().await;
    let token = app.access_token("ya-token-1").await;

    let response = app.upload(&token, "song.mp3", "audio/mpeg", MP3_BYTES).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let uploaded = body_json(response).await;
    assert_eq!(uploaded["original_filename"], "song.mp3");
    assert_eq!(uploaded["content_type"], "audio/mpeg");
    assert_eq!(uploaded["file_size"], MP3_BYTES.len());
    assert!(uploaded.get("file_path").is_none());

    let listing = body_json(app.get("/audio/my", &token).await).await;
    let files = listing.as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["id"], uploaded["id"]);

    assert_eq!(app.stored_file_count(), 1);
    assert_eq!(app.db.audio_file_count(), 1);
}

#[tokio::test]
async fn test_listing_is_per_user_and_newest_first() {
    let app = TestApp::new().await;
    let ivan = app.access_token("ya-token-1").await;
    let maria = app.access_token("ya-token-2").await;

    app.upload(&ivan, "first.mp3", "audio/mpeg", MP3_BYTES).await;
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    app.upload(&ivan, "second.wav", "audio/wav", b"RIFF....WAVE").await;
    app.upload(&maria, "hers.mp3", "audio/mpeg", MP3_BYTES).await;

    let listing = body_json(app.get("/audio/my", &ivan).await).await;
    let names: Vec<&str> = listing
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["original_filename"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["second.wav", "first.mp3"]);

    let listing = body_json(app.get("/audio/my", &maria).await).await;
    assert_eq!(listing.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_upload_rejects_unsupported_type() {
    let app = TestApp::new().await;
    let token = app.access_token("ya-token-1").await;

    let response = app
        .upload(&token, "notes.txt", "text/plain", b"not audio")
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.stored_file_count(), 0);
    assert_eq!(app.db.audio_file_count(), 0);
}

#[tokio::test]
async fn test_upload_rejects_empty_file() {
    let app = TestApp::new().await;
    let token = app.access_token("ya-token-1").await;

    let response = app.upload(&token, "empty.mp3", "audio/mpeg", b"").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.stored_file_count(), 0);
}

#[tokio::test]
async fn test_upload_rejects_oversized_file() {
    let app = TestApp::with_config(|config| config.audio.max_file_size = 1024).await;
    let token = app.access_token("ya-token-1").await;

    let response = app
        .upload(&token, "big.mp3", "audio/mpeg", &vec![0u8; 4096])
        .await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(app.stored_file_count(), 0);
    assert_eq!(app.db.audio_file_count(), 0);

    // Exactly at the limit is fine
    let response = app
        .upload(&token, "ok.mp3", "audio/mpeg", &vec![0u8; 1024])
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_upload_without_file_field() {
    let app = TestApp::new().await;
    let token = app.access_token("ya-token-1").await;
    let boundary = "audio-store-test-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nhello\r\n--{b}--\r\n",
        b = boundary
    );

    let response = app
        .request(
            Request::builder()
                .method("POST")
                .uri("/audio/upload")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_failed_metadata_write_leaves_no_file() {
    let app = TestApp::new().await;
    let token = app.access_token("ya-token-1").await;
    app.db.fail_audio_inserts(true);

    let response = app.upload(&token, "song.mp3", "audio/mpeg", MP3_BYTES).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.stored_file_count(), 0);
    assert_eq!(app.db.audio_file_count(), 0);

    let listing = body_json(app.get("/audio/my", &token).await).await;
    assert!(listing.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_download_returns_original_bytes() {
    let app = TestApp::new().await;
    let token = app.access_token("ya-token-1").await;
    let uploaded = body_json(
        app.upload(&token, "Песня.mp3", "audio/mpeg", MP3_BYTES)
            .await,
    )
    .await;
    let id = uploaded["id"].as_str().unwrap();

    let response = app.get(&format!("/audio/download/{}", id), &token).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "audio/mpeg"
    );
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment;"));
    assert!(disposition.contains("filename*=UTF-8''%D0%9F"));
    assert_eq!(body_bytes(response).await, MP3_BYTES);
}

#[tokio::test]
async fn test_other_users_file_is_not_found() {
    let app = TestApp::new().await;
    let ivan = app.access_token("ya-token-1").await;
    let maria = app.access_token("ya-token-2").await;
    let uploaded = body_json(app.upload(&ivan, "song.mp3", "audio/mpeg", MP3_BYTES).await).await;
    let id = uploaded["id"].as_str().unwrap();

    let response = app.get(&format!("/audio/download/{}", id), &maria).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.delete(&format!("/audio/{}", id), &maria).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Still there for the owner
    let response = app.get(&format!("/audio/download/{}", id), &ivan).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_or_malformed_id() {
    let app = TestApp::new().await;
    let token = app.access_token("ya-token-1").await;

    let response = app
        .get(&format!("/audio/download/{}", Uuid::new_v4()), &token)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.get("/audio/download/not-a-uuid", &token).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "bad_request");

    let response = app.delete("/audio/not-a-uuid", &token).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "bad_request");
}

#[tokio::test]
async fn test_upload_requires_multipart_body() {
    let app = TestApp::new().await;
    let token = app.access_token("ya-token-1").await;

    let response = app
        .request(
            Request::builder()
                .method("POST")
                .uri("/audio/upload")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "bad_request");
}

#[tokio::test]
async fn test_missing_file_on_disk_is_gone() {
    let app = TestApp::new().await;
    let token = app.access_token("ya-token-1").await;
    let uploaded = body_json(app.upload(&token, "song.mp3", "audio/mpeg", MP3_BYTES).await).await;
    let id: Uuid = uploaded["id"].as_str().unwrap().parse().unwrap();
    let user_id: Uuid = uploaded["user_id"].as_str().unwrap().parse().unwrap();

    let file = app
        .db
        .get_audio_file(id, user_id)
        .await
        .unwrap()
        .unwrap();
    std::fs::remove_file(&file.file_path).unwrap();

    let response = app.get(&format!("/audio/download/{}", id), &token).await;
    assert_eq!(response.status(), StatusCode::GONE);

    // The row can still be deleted
    let response = app.delete(&format!("/audio/{}", id), &token).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_delete_removes_row_and_file() {
    let app = TestApp::new().await;
    let token = app.access_token("ya-token-1").await;
    let uploaded = body_json(app.upload(&token, "song.mp3", "audio/mpeg", MP3_BYTES).await).await;
    let id = uploaded["id"].as_str().unwrap();

    let response = app.delete(&format!("/audio/{}", id), &token).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.stored_file_count(), 0);
    assert_eq!(app.db.audio_file_count(), 0);

    let response = app.get(&format!("/audio/download/{}", id), &token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.delete(&format!("/audio/{}", id), &token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_audio_routes_require_auth() {
    let app = TestApp::new().await;

    let response = app
        .request(Request::builder().uri("/audio/my").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
