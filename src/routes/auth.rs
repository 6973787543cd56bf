// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Yandex OAuth authentication routes.

use axum::{
    extract::{FromRequest, Query, Request, State},
    http::{header, StatusCode},
    response::Redirect,
    routing::{get, post},
    Extension, Form, Json, Router,
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::{AppError, ErrorResponse, Result};
use crate::middleware::auth::AuthUser;
use crate::models::UserResponse;
use crate::services::{IssuedSession, LoginAttempt, LoginFlow};
use crate::AppState;

/// Routes that do not need an access token.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/yandex", post(login_with_provider_token))
        .route("/auth/yandex/login", get(auth_start))
        .route("/auth/yandex/callback", get(auth_callback))
        .route("/auth/refresh", post(refresh))
}

/// Routes behind the auth middleware.
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/logout", post(logout))
}

/// Tokens returned after login or refresh.
#[derive(Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub user: UserResponse,
}

impl From<IssuedSession> for TokenResponse {
    fn from(issued: IssuedSession) -> Self {
        let expires_in = (issued.tokens.access_expires_at - Utc::now())
            .num_seconds()
            .max(0);
        Self {
            access_token: issued.tokens.access_token,
            refresh_token: issued.tokens.refresh_token,
            token_type: "bearer".to_string(),
            expires_in,
            user: issued.user.into(),
        }
    }
}

/// Start OAuth flow - redirect to Yandex authorization.
#[utoipa::path(
    get,
    path = "/auth/yandex/login",
    tag = "auth",
    responses((status = 307, description = "Redirect to the Yandex consent page"))
)]
pub async fn auth_start(State(state): State<Arc<AppState>>) -> Result<Redirect> {
    let oauth_state = state.oauth_state.sign(Utc::now())?;
    let auth_url = state.identity.authorize_url(&oauth_state);

    tracing::info!(
        client_id = %state.config.oauth.client_id,
        "Starting OAuth flow, redirecting to Yandex"
    );

    Ok(Redirect::temporary(&auth_url))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// OAuth callback - exchange code, issue tokens, hand them to the frontend.
#[utoipa::path(
    get,
    path = "/auth/yandex/callback",
    tag = "auth",
    params(
        ("code" = Option<String>, Query, description = "Authorization code"),
        ("state" = Option<String>, Query, description = "Signed state from /auth/yandex/login"),
        ("error" = Option<String>, Query, description = "Error reported by the provider"),
    ),
    responses(
        (status = 307, description = "Redirect to the frontend with tokens or an error"),
        (status = 401, description = "Invalid state or code", body = ErrorResponse),
        (status = 503, description = "Provider unreachable", body = ErrorResponse),
    )
)]
pub async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect> {
    let callback_url = format!(
        "{}/oauth-callback",
        state.config.app.frontend_url.trim_end_matches('/')
    );

    // Errors reported by the provider go back to the frontend
    if let Some(error) = params.error {
        let message = params.error_description.unwrap_or(error);
        tracing::warn!(error = %message, "OAuth error from Yandex");
        let redirect = format!("{}?error={}", callback_url, urlencoding::encode(&message));
        return Ok(Redirect::temporary(&redirect));
    }

    let state_ok = params
        .state
        .as_deref()
        .is_some_and(|s| state.oauth_state.verify(s, Utc::now()));
    if !state_ok {
        tracing::warn!("Invalid or missing OAuth state parameter");
        return Err(AppError::Authentication("invalid OAuth state".to_string()));
    }

    tracing::info!("Exchanging authorization code for tokens");

    let issued = LoginFlow::from_state(&state)
        .run(LoginAttempt::Unauthenticated { code: params.code })
        .await?;

    let redirect_url = format!(
        "{}?token={}&refresh_token={}&user_id={}",
        callback_url,
        urlencoding::encode(&issued.tokens.access_token),
        urlencoding::encode(&issued.tokens.refresh_token),
        issued.user.id
    );

    Ok(Redirect::temporary(&redirect_url))
}

/// Provider access token obtained by the client.
#[derive(Deserialize, ToSchema)]
pub struct ProviderTokenRequest {
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Log in with a Yandex access token (JSON or form body).
#[utoipa::path(
    post,
    path = "/auth/yandex",
    tag = "auth",
    request_body = ProviderTokenRequest,
    responses(
        (status = 200, body = TokenResponse),
        (status = 400, description = "Missing access token", body = ErrorResponse),
        (status = 401, description = "Token rejected by the provider", body = ErrorResponse),
        (status = 403, description = "User is inactive", body = ErrorResponse),
    )
)]
pub async fn login_with_provider_token(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<TokenResponse>> {
    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));

    let body: ProviderTokenRequest = if is_json {
        Json::<ProviderTokenRequest>::from_request(request, &())
            .await
            .map(|Json(body)| body)?
    } else {
        Form::<ProviderTokenRequest>::from_request(request, &())
            .await
            .map(|Form(body)| body)?
    };

    let token = body
        .access_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Yandex access token is required".to_string()))?;

    let issued = LoginFlow::from_state(&state)
        .run(LoginAttempt::with_provider_token(token))
        .await?;

    Ok(Json(issued.into()))
}

#[derive(Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Exchange a refresh token for a new pair. Each refresh token works once.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, body = TokenResponse),
        (status = 401, description = "Invalid, expired or reused refresh token", body = ErrorResponse),
    )
)]
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(body), _): WithRejection<Json<RefreshRequest>, AppError>,
) -> Result<Json<TokenResponse>> {
    let issued = LoginFlow::from_state(&state)
        .refresh(&body.refresh_token)
        .await?;
    Ok(Json(issued.into()))
}

/// Revoke the caller's session.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    security(("bearer" = [])),
    responses((status = 204, description = "Session revoked"))
)]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<StatusCode> {
    LoginFlow::from_state(&state)
        .logout(user.session_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
