// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User profile and administration routes.

use crate::db::UserRepository;
use crate::error::{AppError, ErrorResponse, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{UserResponse, UserUpdate};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{delete, get},
    Extension, Json, Router,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;
use uuid::Uuid;
use validator::Validate;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 100;

/// User routes (require authentication).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/me", get(get_me).put(update_me))
        .route("/users", get(list_users))
        .route("/users/{id}", delete(deactivate_user))
}

// ─── User Profile ────────────────────────────────────────────

/// Get current user profile.
#[utoipa::path(
    get,
    path = "/users/me",
    tag = "users",
    security(("bearer" = [])),
    responses(
        (status = 200, body = UserResponse),
        (status = 401, body = ErrorResponse),
    )
)]
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let profile = state
        .db
        .get_user(user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.user_id)))?;
    Ok(Json(profile.into()))
}

/// Update name and/or email of the current user.
#[utoipa::path(
    put,
    path = "/users/me",
    tag = "users",
    security(("bearer" = [])),
    request_body = UserUpdate,
    responses(
        (status = 200, body = UserResponse),
        (status = 400, description = "Validation failed", body = ErrorResponse),
        (status = 409, description = "Email already in use", body = ErrorResponse),
    )
)]
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Json(update), _): WithRejection<Json<UserUpdate>, AppError>,
) -> Result<Json<UserResponse>> {
    update
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    if update.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let profile = state
        .db
        .update_user(user.user_id, &update)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.user_id)))?;

    tracing::info!(user_id = %user.user_id, "Profile updated");
    Ok(Json(profile.into()))
}

// ─── Administration ──────────────────────────────────────────

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListUsersQuery {
    /// Number of users to skip
    #[serde(default)]
    skip: i64,
    /// Page size (at most 100)
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

/// List all users (superuser only).
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    security(("bearer" = [])),
    params(ListUsersQuery),
    responses(
        (status = 200, body = Vec<UserResponse>),
        (status = 403, body = ErrorResponse),
    )
)]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Query(params), _): WithRejection<Query<ListUsersQuery>, AppError>,
) -> Result<Json<Vec<UserResponse>>> {
    user.require_superuser()?;

    let skip = params.skip.max(0);
    let limit = params.limit.clamp(0, MAX_LIMIT);
    let users = state.db.list_users(skip, limit).await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// Deactivate a user and revoke their sessions (superuser only).
///
/// Rows are never deleted; the user simply can no longer sign in.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    security(("bearer" = [])),
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, body = UserResponse),
        (status = 400, description = "Cannot deactivate yourself", body = ErrorResponse),
        (status = 403, body = ErrorResponse),
        (status = 404, body = ErrorResponse),
    )
)]
pub async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, AppError>,
) -> Result<Json<UserResponse>> {
    user.require_superuser()?;
    if id == user.user_id {
        return Err(AppError::BadRequest(
            "Superusers cannot deactivate themselves".to_string(),
        ));
    }

    let deactivated = state
        .db
        .deactivate_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;

    tracing::info!(admin_id = %user.user_id, user_id = %id, "User deactivated");
    Ok(Json(deactivated.into()))
}
