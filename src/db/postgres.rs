// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! PostgreSQL implementation of the repository traits.
//!
//! All queries go through a bounded [`PgPool`]. A request that cannot get a
//! connection within the configured timeout fails with
//! [`AppError::PoolExhausted`] instead of waiting forever.

use crate::config::DatabaseConfig;
use crate::db::{AudioRepository, Database, SessionRepository, UserRepository};
use crate::error::AppError;
use crate::models::{AudioFile, NewAudioFile, ProviderIdentity, Session, User, UserUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::ConnectOptions;
use std::time::Duration;
use uuid::Uuid;

/// Idle overflow connections are closed after this long.
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        yandex_id TEXT NOT NULL UNIQUE,
        email TEXT UNIQUE,
        name TEXT,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        is_superuser BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audio_files (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id),
        filename TEXT NOT NULL,
        original_filename TEXT NOT NULL,
        file_path TEXT NOT NULL,
        file_size BIGINT NOT NULL,
        content_type TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_audio_files_user_id ON audio_files (user_id, created_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id),
        expires_at TIMESTAMPTZ NOT NULL,
        revoked_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions (user_id)",
];

/// PostgreSQL-backed database.
#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Open the pool and verify that one connection can be established.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = pool_options(config)
            .connect_with(connect_options(config))
            .await?;

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.db,
            max_connections = config.max_connections(),
            "Connected to PostgreSQL"
        );

        Ok(Self { pool })
    }

    /// Like [`connect`](Self::connect), but keeps trying while the database
    /// container is still starting.
    pub async fn connect_with_retry(config: &DatabaseConfig) -> Result<Self, AppError> {
        let attempts = config.connect_retries.max(1);
        let mut attempt = 1;
        loop {
            match Self::connect(config).await {
                Ok(db) => return Ok(db),
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        attempt,
                        attempts,
                        error = %e,
                        "Database not ready, retrying"
                    );
                    tokio::time::sleep(config.connect_retry_interval).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(attempts, error = %e, "Giving up on database connection");
                    return Err(e);
                }
            }
        }
    }

    /// Create a pool that only connects on first use.
    pub fn connect_lazy(config: &DatabaseConfig) -> Self {
        Self {
            pool: pool_options(config).connect_lazy_with(connect_options(config)),
        }
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn connect_options(config: &DatabaseConfig) -> PgConnectOptions {
    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.db);

    if config.echo_sql {
        options.log_statements(log::LevelFilter::Info)
    } else {
        options.disable_statement_logging()
    }
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections())
        .min_connections(0)
        .acquire_timeout(config.pool_timeout)
        .idle_timeout(Some(IDLE_TIMEOUT))
        .test_before_acquire(true)
}

#[async_trait]
impl Database for PgDatabase {
    async fn create_tables(&self) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        tracing::info!("Database tables initialized");
        Ok(())
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ─── User Operations ─────────────────────────────────────────

#[async_trait]
impl UserRepository for PgDatabase {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn upsert_oauth_user(&self, identity: &ProviderIdentity) -> Result<User, AppError> {
        let mut tx = self.pool.begin().await?;

        // Prefer the row with the matching provider subject over an email match.
        let existing = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE yandex_id = $1 OR ($2::TEXT IS NOT NULL AND email = $2)
            ORDER BY (yandex_id = $1) DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(&identity.subject)
        .bind(&identity.email)
        .fetch_optional(&mut *tx)
        .await?;

        let user = match existing {
            // Deactivated accounts keep their last known profile.
            Some(user) if !user.is_active => user,
            Some(user) => {
                sqlx::query_as::<_, User>(
                    r#"
                    UPDATE users
                    SET yandex_id = $2,
                        email = COALESCE($3, email),
                        name = COALESCE($4, name),
                        updated_at = now()
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(user.id)
                .bind(&identity.subject)
                .bind(&identity.email)
                .bind(&identity.name)
                .fetch_one(&mut *tx)
                .await?
            }
            None => {
                // ON CONFLICT covers two first logins racing each other.
                sqlx::query_as::<_, User>(
                    r#"
                    INSERT INTO users (id, yandex_id, email, name)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (yandex_id) DO UPDATE
                    SET email = COALESCE(EXCLUDED.email, users.email),
                        name = COALESCE(EXCLUDED.name, users.name),
                        updated_at = now()
                    RETURNING *
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(&identity.subject)
                .bind(&identity.email)
                .bind(&identity.name)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        tx.commit().await?;
        Ok(user)
    }

    async fn update_user(
        &self,
        id: Uuid,
        update: &UserUpdate,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET email = COALESCE($2, email),
                name = COALESCE($3, name),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.email)
        .bind(&update.name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list_users(&self, skip: i64, limit: i64) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users ORDER BY created_at, id LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn deactivate_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET is_active = FALSE, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if user.is_some() {
            sqlx::query(
                "UPDATE sessions SET revoked_at = now() WHERE user_id = $1 AND revoked_at IS NULL",
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(user)
    }
}

// ─── Audio File Operations ───────────────────────────────────

#[async_trait]
impl AudioRepository for PgDatabase {
    async fn insert_audio_file(&self, file: &NewAudioFile) -> Result<AudioFile, AppError> {
        let row = sqlx::query_as::<_, AudioFile>(
            r#"
            INSERT INTO audio_files
                (id, user_id, filename, original_filename, file_path, file_size, content_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(file.id)
        .bind(file.user_id)
        .bind(&file.filename)
        .bind(&file.original_filename)
        .bind(&file.file_path)
        .bind(file.file_size)
        .bind(&file.content_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_audio_files(&self, user_id: Uuid) -> Result<Vec<AudioFile>, AppError> {
        let rows = sqlx::query_as::<_, AudioFile>(
            "SELECT * FROM audio_files WHERE user_id = $1 ORDER BY created_at DESC, id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_audio_file(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<AudioFile>, AppError> {
        let row = sqlx::query_as::<_, AudioFile>(
            "SELECT * FROM audio_files WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_audio_file(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<AudioFile>, AppError> {
        let row = sqlx::query_as::<_, AudioFile>(
            "DELETE FROM audio_files WHERE id = $1 AND user_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

// ─── Session Operations ──────────────────────────────────────

#[async_trait]
impl SessionRepository for PgDatabase {
    async fn create_session(
        &self,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, AppError> {
        let session = sqlx::query_as::<_, Session>(
            "INSERT INTO sessions (id, user_id, expires_at) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(session)
    }

    async fn rotate_session(
        &self,
        session_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Session>, AppError> {
        let mut tx = self.pool.begin().await?;

        // The conditional UPDATE is the single-use check: of two concurrent
        // refreshes only one sees the row still active.
        let user_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE sessions
            SET revoked_at = now()
            WHERE id = $1 AND revoked_at IS NULL AND expires_at > now()
            RETURNING user_id
            "#,
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user_id) = user_id else {
            return Ok(None);
        };

        let session = sqlx::query_as::<_, Session>(
            "INSERT INTO sessions (id, user_id, expires_at) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(session))
    }

    async fn revoke_session(&self, session_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_at = now() WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
