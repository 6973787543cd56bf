// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP route handlers.

pub mod audio;
pub mod auth;
pub mod users;

use crate::db::Database;
use crate::error::ErrorResponse;
use crate::middleware::auth::require_auth;
use crate::models::{AudioFileResponse, UserResponse, UserUpdate};
use crate::AppState;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{middleware, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        service_info,
        health_check,
        readiness_check,
        auth::auth_start,
        auth::auth_callback,
        auth::login_with_provider_token,
        auth::refresh,
        auth::logout,
        users::get_me,
        users::update_me,
        users::list_users,
        users::deactivate_user,
        audio::upload,
        audio::list_my_files,
        audio::download,
        audio::delete_file,
    ),
    components(schemas(
        ErrorResponse,
        UserResponse,
        UserUpdate,
        AudioFileResponse,
        auth::TokenResponse,
        auth::ProviderTokenRequest,
        auth::RefreshRequest,
        audio::AudioUploadForm,
        HealthResponse,
        ServiceInfo,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Yandex ID login and session tokens"),
        (name = "users", description = "Profiles and administration"),
        (name = "audio", description = "Audio file storage"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub environment: String,
}

/// Service name and version.
#[utoipa::path(get, path = "/", responses((status = 200, body = ServiceInfo)))]
async fn service_info(State(state): State<Arc<AppState>>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: state.config.app.project_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.config.app.environment.clone(),
    })
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub build_id: String,
}

/// Health check response
#[utoipa::path(get, path = "/health", responses((status = 200, body = HealthResponse)))]
async fn health_check() -> Json<HealthResponse> {
    let build_id = option_env!("BUILD_ID").unwrap_or("unknown").to_string();
    Json(HealthResponse {
        status: "ok".to_string(),
        build_id,
    })
}

/// Readiness: the database must answer.
#[utoipa::path(
    get,
    path = "/health/ready",
    responses(
        (status = 200, body = HealthResponse),
        (status = 503, body = HealthResponse),
    )
)]
async fn readiness_check(State(state): State<Arc<AppState>>) -> Response {
    match state.db.ping().await {
        Ok(()) => health_check().await.into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            let build_id = option_env!("BUILD_ID").unwrap_or("unknown").to_string();
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable".to_string(),
                    build_id,
                }),
            )
                .into_response()
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o.trim_end_matches('/')) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
}

/// Build the complete router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.app.cors_origins);

    // Public routes (no auth required)
    let mut public_routes = Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
        .merge(auth::routes());

    if state.config.app.docs_enabled {
        public_routes = public_routes
            .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));
    }

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .merge(auth::protected_routes())
        .merge(users::routes())
        .merge(audio::routes(state.config.audio.max_file_size))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn(
            crate::middleware::security::add_security_headers,
        ))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
