// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory store used by the integration tests and for local runs without
//! PostgreSQL.

use crate::db::{AudioRepository, Database, SessionRepository, UserRepository};
use crate::error::AppError;
use crate::models::{AudioFile, NewAudioFile, ProviderIdentity, Session, User, UserUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct MemoryDatabase {
    users: Arc<DashMap<Uuid, User>>,
    audio_files: Arc<DashMap<Uuid, AudioFile>>,
    sessions: Arc<DashMap<Uuid, Session>>,
    /// Serializes operations that must read-then-write across maps.
    write_lock: Arc<Mutex<()>>,
    fail_audio_inserts: Arc<AtomicBool>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent audio metadata insert fail.
    pub fn fail_audio_inserts(&self, fail: bool) {
        self.fail_audio_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_superuser(&self, id: Uuid, is_superuser: bool) {
        if let Some(mut user) = self.users.get_mut(&id) {
            user.is_superuser = is_superuser;
        }
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn audio_file_count(&self) -> usize {
        self.audio_files.len()
    }

    fn email_taken(&self, email: &str, except: Uuid) -> bool {
        self.users
            .iter()
            .any(|u| u.id != except && u.email.as_deref() == Some(email))
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn create_tables(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryDatabase {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn upsert_oauth_user(&self, identity: &ProviderIdentity) -> Result<User, AppError> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();

        let by_subject = self
            .users
            .iter()
            .find(|u| u.yandex_id == identity.subject)
            .map(|u| u.id);
        let by_email = identity.email.as_deref().and_then(|email| {
            self.users
                .iter()
                .find(|u| u.email.as_deref() == Some(email))
                .map(|u| u.id)
        });

        if let Some(id) = by_subject.or(by_email) {
            if let Some(user) = self.users.get(&id).filter(|u| !u.is_active) {
                return Ok(user.clone());
            }
            if let Some(email) = identity.email.as_deref() {
                if self.email_taken(email, id) {
                    return Err(AppError::Conflict(format!("email {} already in use", email)));
                }
            }
            let mut user = self
                .users
                .get_mut(&id)
                .ok_or_else(|| AppError::Database("user vanished during upsert".to_string()))?;
            user.yandex_id = identity.subject.clone();
            if identity.email.is_some() {
                user.email = identity.email.clone();
            }
            if identity.name.is_some() {
                user.name = identity.name.clone();
            }
            user.updated_at = now;
            return Ok(user.clone());
        }

        let user = User {
            id: Uuid::new_v4(),
            yandex_id: identity.subject.clone(),
            email: identity.email.clone(),
            name: identity.name.clone(),
            is_active: true,
            is_superuser: false,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(
        &self,
        id: Uuid,
        update: &UserUpdate,
    ) -> Result<Option<User>, AppError> {
        let _guard = self.write_lock.lock().await;

        if let Some(email) = update.email.as_deref() {
            if self.email_taken(email, id) {
                return Err(AppError::Conflict(format!("email {} already in use", email)));
            }
        }

        Ok(self.users.get_mut(&id).map(|mut user| {
            if update.email.is_some() {
                user.email = update.email.clone();
            }
            if update.name.is_some() {
                user.name = update.name.clone();
            }
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn list_users(&self, skip: i64, limit: i64) -> Result<Vec<User>, AppError> {
        let mut users: Vec<User> = self.users.iter().map(|u| u.clone()).collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(users
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn deactivate_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();

        let Some(user) = self.users.get_mut(&id).map(|mut user| {
            user.is_active = false;
            user.updated_at = now;
            user.clone()
        }) else {
            return Ok(None);
        };

        for mut session in self.sessions.iter_mut() {
            if session.user_id == id && session.revoked_at.is_none() {
                session.revoked_at = Some(now);
            }
        }
        Ok(Some(user))
    }
}

#[async_trait]
impl AudioRepository for MemoryDatabase {
    async fn insert_audio_file(&self, file: &NewAudioFile) -> Result<AudioFile, AppError> {
        if self.fail_audio_inserts.load(Ordering::SeqCst) {
            return Err(AppError::Database("audio insert failed".to_string()));
        }
        if !self.users.contains_key(&file.user_id) {
            return Err(AppError::Database(format!(
                "user {} does not exist",
                file.user_id
            )));
        }

        let row = AudioFile {
            id: file.id,
            user_id: file.user_id,
            filename: file.filename.clone(),
            original_filename: file.original_filename.clone(),
            file_path: file.file_path.clone(),
            file_size: file.file_size,
            content_type: file.content_type.clone(),
            created_at: Utc::now(),
            updated_at: None,
        };
        self.audio_files.insert(row.id, row.clone());
        Ok(row)
    }

    async fn list_audio_files(&self, user_id: Uuid) -> Result<Vec<AudioFile>, AppError> {
        let mut files: Vec<AudioFile> = self
            .audio_files
            .iter()
            .filter(|f| f.user_id == user_id)
            .map(|f| f.clone())
            .collect();
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(files)
    }

    async fn get_audio_file(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<AudioFile>, AppError> {
        Ok(self
            .audio_files
            .get(&id)
            .filter(|f| f.user_id == user_id)
            .map(|f| f.clone()))
    }

    async fn delete_audio_file(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<AudioFile>, AppError> {
        Ok(self
            .audio_files
            .remove_if(&id, |_, f| f.user_id == user_id)
            .map(|(_, f)| f))
    }
}

#[async_trait]
impl SessionRepository for MemoryDatabase {
    async fn create_session(
        &self,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, AppError> {
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            expires_at,
            revoked_at: None,
            created_at: Utc::now(),
        };
        self.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn rotate_session(
        &self,
        session_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Session>, AppError> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();

        let user_id = match self.sessions.get_mut(&session_id) {
            Some(mut session) if session.is_active(now) => {
                session.revoked_at = Some(now);
                session.user_id
            }
            _ => return Ok(None),
        };

        let next = Session {
            id: Uuid::new_v4(),
            user_id,
            expires_at,
            revoked_at: None,
            created_at: now,
        };
        self.sessions.insert(next.id, next.clone());
        Ok(Some(next))
    }

    async fn revoke_session(&self, session_id: Uuid) -> Result<bool, AppError> {
        Ok(match self.sessions.get_mut(&session_id) {
            Some(mut session) if session.revoked_at.is_none() => {
                session.revoked_at = Some(Utc::now());
                true
            }
            _ => false,
        })
    }
}
