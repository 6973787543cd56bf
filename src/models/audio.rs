// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Audio file metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Metadata row for a stored audio file.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AudioFile {
    pub id: Uuid,
    /// Owner
    pub user_id: Uuid,
    /// Name on disk (`<uuid>.<ext>`)
    pub filename: String,
    /// Name as uploaded by the client
    pub original_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Values for a new metadata row.
#[derive(Debug, Clone)]
pub struct NewAudioFile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub content_type: String,
}

/// Audio file as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AudioFileResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub original_filename: String,
    pub file_size: i64,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<AudioFile> for AudioFileResponse {
    fn from(file: AudioFile) -> Self {
        Self {
            id: file.id,
            user_id: file.user_id,
            original_filename: file.original_filename,
            file_size: file.file_size,
            content_type: file.content_type,
            created_at: file.created_at,
            updated_at: file.updated_at,
        }
    }
}
