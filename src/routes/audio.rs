// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Audio upload, listing, download and deletion.

use crate::db::AudioRepository;
use crate::error::{AppError, ErrorResponse, Result};
use crate::middleware::auth::AuthUser;
use crate::models::AudioFileResponse;
use crate::services::AudioUpload;
use crate::AppState;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use axum_extra::extract::WithRejection;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Audio routes (require authentication).
pub fn routes(max_file_size: u64) -> Router<Arc<AppState>> {
    let body_limit = usize::try_from(max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route(
            "/audio/upload",
            post(upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/audio/my", get(list_my_files))
        .route("/audio/download/{id}", get(download))
        .route("/audio/{id}", delete(delete_file))
}

/// Multipart form accepted by the upload endpoint.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct AudioUploadForm {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

/// Upload one audio file.
#[utoipa::path(
    post,
    path = "/audio/upload",
    tag = "audio",
    security(("bearer" = [])),
    request_body(content = AudioUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, body = AudioFileResponse),
        (status = 400, description = "Missing file or unsupported type", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse),
    )
)]
pub async fn upload(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    WithRejection(mut multipart, _): WithRejection<Multipart, AppError>,
) -> Result<(StatusCode, Json<AudioFileResponse>)> {
    let max_bytes = state.storage.max_file_size();
    let mut upload = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        if field.name() != Some("file") {
            continue;
        }
        if upload.is_some() {
            return Err(AppError::BadRequest(
                "Only one file per request is accepted".to_string(),
            ));
        }

        let original_filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        let mut data = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| multipart_error(e, max_bytes))?
        {
            if (data.len() + chunk.len()) as u64 > max_bytes {
                return Err(AppError::PayloadTooLarge { max_bytes });
            }
            data.extend_from_slice(&chunk);
        }

        upload = Some(AudioUpload {
            original_filename,
            content_type,
            data,
        });
    }

    let upload =
        upload.ok_or_else(|| AppError::BadRequest("Missing 'file' field".to_string()))?;

    let file = state
        .storage
        .save(state.db.as_ref(), user.user_id, upload)
        .await?;

    Ok((StatusCode::CREATED, Json(file.into())))
}

fn multipart_error(err: MultipartError, max_bytes: u64) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge { max_bytes }
    } else {
        tracing::warn!(error = %err, "Invalid multipart data");
        AppError::BadRequest(err.body_text())
    }
}

/// List the caller's files, newest first.
#[utoipa::path(
    get,
    path = "/audio/my",
    tag = "audio",
    security(("bearer" = [])),
    responses((status = 200, body = Vec<AudioFileResponse>))
)]
pub async fn list_my_files(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<AudioFileResponse>>> {
    let files = state.db.list_audio_files(user.user_id).await?;
    Ok(Json(files.into_iter().map(AudioFileResponse::from).collect()))
}

/// Download one of the caller's files.
#[utoipa::path(
    get,
    path = "/audio/download/{id}",
    tag = "audio",
    security(("bearer" = [])),
    params(("id" = Uuid, Path, description = "Audio file ID")),
    responses(
        (status = 200, description = "File contents with the stored content type"),
        (status = 404, body = ErrorResponse),
        (status = 410, description = "File missing on disk", body = ErrorResponse),
    )
)]
pub async fn download(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, AppError>,
) -> Result<Response> {
    let file = state
        .db
        .get_audio_file(id, user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Audio file {} not found", id)))?;

    let data = state.storage.read(&file).await?;

    let content_type = HeaderValue::from_str(&file.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&content_disposition(&file.original_filename))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}

/// Delete one of the caller's files.
#[utoipa::path(
    delete,
    path = "/audio/{id}",
    tag = "audio",
    security(("bearer" = [])),
    params(("id" = Uuid, Path, description = "Audio file ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, body = ErrorResponse),
    )
)]
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, AppError>,
) -> Result<StatusCode> {
    let file = state
        .db
        .delete_audio_file(id, user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Audio file {} not found", id)))?;

    state.storage.remove(&file).await;
    tracing::info!(user_id = %user.user_id, file_id = %id, "Audio file deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// `attachment` header with an ASCII fallback name and the UTF-8 original.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    )
}
