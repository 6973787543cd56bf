// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! On-disk audio storage.
//!
//! Files live at `<root>/<user_id>/<uuid>.<ext>`. A stored file and its
//! metadata row are kept in step: if the row cannot be written the file is
//! removed again.

use crate::config::AudioConfig;
use crate::db::{AudioRepository, Database};
use crate::error::AppError;
use crate::models::{AudioFile, NewAudioFile};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Longest original filename kept in metadata.
const MAX_FILENAME_LEN: usize = 255;

/// An upload as received from the client.
#[derive(Debug)]
pub struct AudioUpload {
    pub original_filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AudioStorage {
    root: PathBuf,
    max_file_size: u64,
    allowed_types: Vec<String>,
}

impl AudioStorage {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            root: config.storage_path.clone(),
            max_file_size: config.max_file_size,
            allowed_types: config
                .allowed_types
                .iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Create the storage root if needed.
    pub async fn init(&self) -> Result<(), AppError> {
        fs::create_dir_all(&self.root).await.map_err(|e| {
            AppError::Storage(format!(
                "cannot create storage directory {}: {}",
                self.root.display(),
                e
            ))
        })?;
        tracing::info!(path = %self.root.display(), "Audio storage ready");
        Ok(())
    }

    /// Check type and size; returns the normalized content type.
    pub fn validate(&self, upload: &AudioUpload) -> Result<String, AppError> {
        let content_type = upload
            .content_type
            .as_deref()
            .map(normalize_content_type)
            .unwrap_or_default();

        if !self.allowed_types.iter().any(|t| *t == content_type) {
            return Err(AppError::BadRequest(format!(
                "Unsupported file type '{}'. Allowed: {}",
                content_type,
                self.allowed_types.join(", ")
            )));
        }
        if upload.data.is_empty() {
            return Err(AppError::BadRequest("File is empty".to_string()));
        }
        if upload.data.len() as u64 > self.max_file_size {
            return Err(AppError::PayloadTooLarge {
                max_bytes: self.max_file_size,
            });
        }
        Ok(content_type)
    }

    /// Validate, write the bytes and record the metadata row.
    pub async fn save(
        &self,
        db: &dyn Database,
        user_id: Uuid,
        upload: AudioUpload,
    ) -> Result<AudioFile, AppError> {
        let content_type = self.validate(&upload)?;
        let original_filename = sanitize_filename(upload.original_filename.as_deref());

        let id = Uuid::new_v4();
        let filename = match extension_for(&original_filename, &content_type) {
            Some(ext) => format!("{}.{}", id, ext),
            None => id.to_string(),
        };
        let dir = self.root.join(user_id.to_string());
        let path = dir.join(&filename);

        if let Err(e) = write_new(&dir, &path, &upload.data).await {
            // An existing file at this path belongs to someone else.
            if e.kind() != ErrorKind::AlreadyExists {
                discard(&path).await;
            }
            return Err(AppError::Storage(format!(
                "cannot write {}: {}",
                path.display(),
                e
            )));
        }

        let row = NewAudioFile {
            id,
            user_id,
            filename,
            original_filename,
            file_path: path.to_string_lossy().into_owned(),
            file_size: upload.data.len() as i64,
            content_type,
        };

        match db.insert_audio_file(&row).await {
            Ok(file) => {
                tracing::info!(
                    user_id = %user_id,
                    file_id = %file.id,
                    size = file.file_size,
                    "Audio file stored"
                );
                Ok(file)
            }
            Err(e) => {
                discard(&path).await;
                tracing::error!(user_id = %user_id, error = %e, "Metadata insert failed");
                Err(AppError::Storage(format!("cannot record metadata: {}", e)))
            }
        }
    }

    /// Read a stored file. A row whose file has disappeared is `Gone`.
    pub async fn read(&self, file: &AudioFile) -> Result<Vec<u8>, AppError> {
        match fs::read(&file.file_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(file_id = %file.id, path = %file.file_path, "Audio file missing on disk");
                Err(AppError::Gone("File no longer exists on disk".to_string()))
            }
            Err(e) => Err(AppError::Storage(format!(
                "cannot read {}: {}",
                file.file_path, e
            ))),
        }
    }

    /// Remove a stored file. A file that is already gone is not an error.
    pub async fn remove(&self, file: &AudioFile) {
        match fs::remove_file(&file.file_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::error!(file_id = %file.id, path = %file.file_path, error = %e, "Failed to delete audio file");
            }
        }
    }
}

/// Create the parent directory and write with create-new semantics.
async fn write_new(dir: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
    fs::create_dir_all(dir).await?;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            tracing::error!(path = %path.display(), error = %e, "Failed to clean up partial upload");
        }
    }
}

/// `Audio/WAV; charset=binary` -> `audio/wav`
fn normalize_content_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Keep only the last path component, without control characters.
fn sanitize_filename(name: Option<&str>) -> String {
    let base = name
        .unwrap_or_default()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_FILENAME_LEN)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

fn extension_for(filename: &str, content_type: &str) -> Option<String> {
    let from_name = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase());

    from_name.or_else(|| match content_type {
        "audio/mpeg" | "audio/mp3" => Some("mp3".to_string()),
        "audio/wav" | "audio/x-wav" | "audio/wave" => Some("wav".to_string()),
        "audio/ogg" => Some("ogg".to_string()),
        "audio/flac" => Some("flac".to_string()),
        _ => None,
    })
}
