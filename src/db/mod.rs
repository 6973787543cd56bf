// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! Handlers and services talk to the repository traits below; the
//! production implementation is [`PgDatabase`], and [`MemoryDatabase`]
//! backs the test suite.

pub mod memory;
pub mod postgres;

pub use memory::MemoryDatabase;
pub use postgres::PgDatabase;

use crate::error::AppError;
use crate::models::{AudioFile, NewAudioFile, ProviderIdentity, Session, User, UserUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Find the user by provider subject (or, failing that, by email) and
    /// refresh their profile; create them if neither matches. An inactive
    /// user is returned unchanged.
    async fn upsert_oauth_user(&self, identity: &ProviderIdentity) -> Result<User, AppError>;

    async fn update_user(&self, id: Uuid, update: &UserUpdate)
        -> Result<Option<User>, AppError>;

    async fn list_users(&self, skip: i64, limit: i64) -> Result<Vec<User>, AppError>;

    /// Soft delete: mark inactive and revoke all of the user's sessions.
    async fn deactivate_user(&self, id: Uuid) -> Result<Option<User>, AppError>;
}

#[async_trait]
pub trait AudioRepository: Send + Sync {
    async fn insert_audio_file(&self, file: &NewAudioFile) -> Result<AudioFile, AppError>;

    /// All files owned by `user_id`, newest first.
    async fn list_audio_files(&self, user_id: Uuid) -> Result<Vec<AudioFile>, AppError>;

    async fn get_audio_file(&self, id: Uuid, user_id: Uuid)
        -> Result<Option<AudioFile>, AppError>;

    async fn delete_audio_file(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<AudioFile>, AppError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create_session(
        &self,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, AppError>;

    /// Atomically revoke an active session and create its successor.
    ///
    /// Returns `None` if the session is unknown, expired or already revoked.
    async fn rotate_session(
        &self,
        session_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Session>, AppError>;

    /// Returns `false` if the session was not active.
    async fn revoke_session(&self, session_id: Uuid) -> Result<bool, AppError>;
}

/// Everything the application needs from its store.
#[async_trait]
pub trait Database: UserRepository + AudioRepository + SessionRepository {
    /// Idempotent schema creation, run once before serving traffic.
    async fn create_tables(&self) -> Result<(), AppError>;

    /// Readiness probe.
    async fn ping(&self) -> Result<(), AppError>;
}
