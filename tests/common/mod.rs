// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use audio_store::config::Config;
use audio_store::db::MemoryDatabase;
use audio_store::routes::create_router;
use audio_store::services::YandexClient;
use audio_store::AppState;
use axum::{
    body::Body,
    extract::Form,
    http::{header, HeaderMap, Request, Response, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Authorization codes the fake provider accepts, with the token each yields.
#[allow(dead_code)]
pub const VALID_CODE: &str = "valid-code";
#[allow(dead_code)]
pub const OTHER_VALID_CODE: &str = "other-valid-code";
#[allow(dead_code)]
pub const NO_ID_CODE: &str = "no-id-code";

/// Check if a PostgreSQL test database is configured.
#[allow(dead_code)]
pub fn postgres_available() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

/// Skip test with message if PostgreSQL is not available.
#[macro_export]
macro_rules! require_postgres {
    () => {
        if !crate::common::postgres_available() {
            eprintln!("⚠️  Skipping: TEST_DATABASE_URL not set");
            return;
        }
    };
}

#[derive(Deserialize)]
struct TokenForm {
    #[serde(default)]
    code: String,
    #[serde(default)]
    client_id: String,
}

/// Stand-in for oauth.yandex.ru and login.yandex.ru.
async fn fake_token(Form(form): Form<TokenForm>) -> (StatusCode, Json<Value>) {
    if form.client_id != "test_client_id" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_client" })),
        );
    }
    let token = match form.code.as_str() {
        VALID_CODE => "ya-token-1",
        OTHER_VALID_CODE => "ya-token-2",
        NO_ID_CODE => "ya-token-no-id",
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "invalid_grant",
                    "error_description": "Code has expired"
                })),
            )
        }
    };
    (
        StatusCode::OK,
        Json(json!({
            "access_token": token,
            "refresh_token": "ya-refresh",
            "expires_in": 31536000,
            "token_type": "bearer"
        })),
    )
}

async fn fake_info(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    match auth {
        "OAuth ya-token-1" => (
            StatusCode::OK,
            Json(json!({
                "id": "1001",
                "login": "ivan",
                "default_email": "ivan@yandex.ru",
                "real_name": "Ivan Petrov"
            })),
        ),
        "OAuth ya-token-2" => (
            StatusCode::OK,
            Json(json!({
                "id": "1002",
                "login": "maria",
                "default_email": "maria@yandex.ru",
                "display_name": "maria"
            })),
        ),
        "OAuth ya-token-no-id" => (StatusCode::OK, Json(json!({ "login": "ghost" }))),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid_token" })),
        ),
    }
}

#[allow(dead_code)]
/// Serve the fake provider on an ephemeral port and return its base URL.
pub async fn start_fake_yandex() -> String {
    let app = Router::new()
        .route("/token", post(fake_token))
        .route("/info", get(fake_info));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fake provider");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Application wired to the in-memory store, a temp storage dir and the
/// fake provider.
#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub db: MemoryDatabase,
    pub storage_dir: TempDir,
}

#[allow(dead_code)]
impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        let provider = start_fake_yandex().await;
        let storage_dir = tempfile::tempdir().expect("Failed to create temp dir");

        let mut config = Config::test_default();
        config.oauth.token_url = format!("{}/token", provider);
        config.oauth.info_url = format!("{}/info", provider);
        config.audio.storage_path = storage_dir.path().to_path_buf();
        customize(&mut config);

        let db = MemoryDatabase::new();
        let identity = YandexClient::new(config.oauth.clone()).unwrap();
        let state = Arc::new(AppState::new(config, Arc::new(db.clone()), Arc::new(identity)).unwrap());

        Self {
            router: create_router(state.clone()),
            state,
            db,
            storage_dir,
        }
    }

    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Log in through the direct-token endpoint and return the token body.
    pub async fn login(&self, provider_token: &str) -> Value {
        let response = self
            .request(
                Request::builder()
                    .method("POST")
                    .uri("/auth/yandex")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({ "access_token": provider_token }).to_string(),
                    ))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await
    }

    /// Log in and return just the access token.
    pub async fn access_token(&self, provider_token: &str) -> String {
        self.login(provider_token).await["access_token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    pub async fn get(&self, uri: &str, token: &str) -> Response<Body> {
        self.request(
            Request::builder()
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> Response<Body> {
        self.request(
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn upload(
        &self,
        token: &str,
        filename: &str,
        content_type: &str,
        data: &[u8],
    ) -> Response<Body> {
        let (boundary, body) = multipart_file(filename, content_type, data);
        self.request(
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
        .await
    }

    /// Number of regular files anywhere under the storage root.
    pub fn stored_file_count(&self) -> usize {
        fn count(dir: &std::path::Path) -> usize {
            std::fs::read_dir(dir)
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok())
                        .map(|e| {
                            let path = e.path();
                            if path.is_dir() {
                                count(&path)
                            } else {
                                1
                            }
                        })
                        .sum()
                })
                .unwrap_or(0)
        }
        count(self.storage_dir.path())
    }
}

#[allow(dead_code)]
/// Build a multipart body with one `file` field.
pub fn multipart_file(filename: &str, content_type: &str, data: &[u8]) -> (String, Vec<u8>) {
    let boundary = "audio-store-test-boundary".to_string();
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    (boundary, body)
}

#[allow(dead_code)]
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[allow(dead_code)]
pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 16 * 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

/// Parse the query string of a redirect `Location`.
#[allow(dead_code)]
pub fn redirect_params(response: &Response<Body>) -> (String, HashMap<String, String>) {
    let location = response
        .headers()
        .get(header::LOCATION)
        .expect("redirect without Location")
        .to_str()
        .unwrap()
        .to_string();
    let (base, query) = location.split_once('?').unwrap_or((location.as_str(), ""));
    let params = query
        .split('&')
        .filter(|p| !p.is_empty())
        .filter_map(|p| p.split_once('='))
        .map(|(k, v)| (k.to_string(), urlencoding::decode(v).unwrap().into_owned()))
        .collect();
    (base.to_string(), params)
}
