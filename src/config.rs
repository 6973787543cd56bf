// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Everything is read once at startup into an immutable [`Config`] that is
//! handed to the rest of the application through `AppState`. A `.env` file
//! in the working directory is honoured for local development.

use jsonwebtoken::Algorithm;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub oauth: OAuthConfig,
    pub audio: AudioConfig,
}

/// General service settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub project_name: String,
    pub debug: bool,
    /// Deployment environment label (`production`, `development`, ...)
    pub environment: String,
    pub port: u16,
    /// Frontend URL used for OAuth redirects
    pub frontend_url: String,
    /// Origins allowed by CORS
    pub cors_origins: Vec<String>,
    pub docs_enabled: bool,
    pub log_format: LogFormat,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// PostgreSQL connection and pool settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub user: String,
    pub password: String,
    pub db: String,
    pub host: String,
    pub port: u16,
    /// Connections kept for steady load
    pub pool_size: u32,
    /// Extra connections allowed under burst load
    pub max_overflow: u32,
    /// How long a request may wait for a pooled connection
    pub pool_timeout: Duration,
    pub echo_sql: bool,
    /// Startup connection attempts before giving up
    pub connect_retries: u32,
    pub connect_retry_interval: Duration,
}

impl DatabaseConfig {
    /// Upper bound on open connections.
    pub fn max_connections(&self) -> u32 {
        self.pool_size + self.max_overflow
    }
}

/// Local token signing settings.
#[derive(Clone)]
pub struct AuthConfig {
    pub secret_key: Vec<u8>,
    pub algorithm: Algorithm,
    pub access_token_ttl: chrono::Duration,
    pub refresh_token_ttl: chrono::Duration,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret_key", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .finish()
    }
}

/// Yandex OAuth client settings.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub info_url: String,
}

/// Upload limits and storage location.
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub storage_path: PathBuf,
    pub max_file_size: u64,
    pub allowed_types: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Fails if any required secret is missing or blank, or if a value does
    /// not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let frontend_url = optional("FRONTEND_URL", "http://localhost:3000");
        let cors_origins = match env::var("CORS_ORIGINS") {
            Ok(v) if !v.trim().is_empty() => split_list(&v),
            _ => vec![frontend_url.clone()],
        };

        let debug = parse_bool("DEBUG", false)?;
        let app = AppConfig {
            project_name: optional("PROJECT_NAME", "Audio Store"),
            debug,
            environment: optional("APP_ENV", "production"),
            port: parse_num("PORT", 8000)?,
            frontend_url,
            cors_origins,
            docs_enabled: parse_bool("API_DOCS_ENABLED", debug)?,
            log_format: LogFormat::from_env()?,
        };

        let database = DatabaseConfig {
            user: required("DB_POSTGRES_USER")?,
            password: required("DB_POSTGRES_PASSWORD")?,
            db: required("DB_POSTGRES_DB")?,
            host: optional("DB_POSTGRES_HOST", "db"),
            port: parse_port("DB_POSTGRES_PORT", 5432)?,
            pool_size: parse_num("POOL_SIZE", 5)?,
            max_overflow: parse_num("MAX_OVERFLOW", 10)?,
            pool_timeout: Duration::from_secs(parse_num("POOL_TIMEOUT", 30)?),
            echo_sql: parse_bool("ECHO_SQL", false)?,
            connect_retries: parse_num("DB_CONNECT_RETRIES", 10)?,
            connect_retry_interval: Duration::from_secs(parse_num(
                "DB_CONNECT_RETRY_INTERVAL",
                5,
            )?),
        };

        let algorithm_name = optional("ALGORITHM", "HS256");
        let algorithm = parse_algorithm(&algorithm_name)?;

        let auth = AuthConfig {
            secret_key: required("SECRET_KEY")?.into_bytes(),
            algorithm,
            access_token_ttl: parse_ttl(
                "ACCESS_TOKEN_EXPIRE_MINUTES",
                30,
                chrono::Duration::try_minutes,
            )?,
            refresh_token_ttl: parse_ttl("REFRESH_TOKEN_EXPIRE_DAYS", 7, chrono::Duration::try_days)?,
        };

        let oauth = OAuthConfig {
            client_id: required("YANDEX_CLIENT_ID")?,
            client_secret: required("YANDEX_CLIENT_SECRET")?,
            redirect_uri: optional(
                "YANDEX_REDIRECT_URI",
                "http://localhost:8000/auth/yandex/callback",
            ),
            auth_url: optional("YANDEX_AUTH_URL", "https://oauth.yandex.ru/authorize"),
            token_url: optional("YANDEX_TOKEN_URL", "https://oauth.yandex.ru/token"),
            info_url: optional("YANDEX_INFO_URL", "https://login.yandex.ru/info"),
        };

        let audio = AudioConfig {
            storage_path: PathBuf::from(optional("AUDIO_STORAGE_PATH", "static/audio_files")),
            max_file_size: parse_num("AUDIO_MAX_FILE_SIZE", 10_000_000)?,
            allowed_types: split_list(&optional("AUDIO_ALLOWED_TYPES", "audio/mpeg,audio/wav")),
        };

        let config = Self {
            app,
            database,
            auth,
            oauth,
            audio,
        };
        config.validate()?;
        Ok(config)
    }

    /// Sanity checks that go beyond "is the variable set".
    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections() == 0 {
            return Err(ConfigError::Invalid {
                name: "POOL_SIZE",
                reason: "pool size plus overflow must be at least 1".to_string(),
            });
        }
        if self.auth.access_token_ttl <= chrono::Duration::zero() {
            return Err(ConfigError::Invalid {
                name: "ACCESS_TOKEN_EXPIRE_MINUTES",
                reason: "must be positive".to_string(),
            });
        }
        if self.auth.refresh_token_ttl <= chrono::Duration::zero() {
            return Err(ConfigError::Invalid {
                name: "REFRESH_TOKEN_EXPIRE_DAYS",
                reason: "must be positive".to_string(),
            });
        }
        if self.audio.allowed_types.is_empty() {
            return Err(ConfigError::Invalid {
                name: "AUDIO_ALLOWED_TYPES",
                reason: "at least one content type is required".to_string(),
            });
        }
        Ok(())
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            app: AppConfig {
                project_name: "Audio Store".to_string(),
                debug: true,
                environment: "test".to_string(),
                port: 8000,
                frontend_url: "http://localhost:3000".to_string(),
                cors_origins: vec!["http://localhost:3000".to_string()],
                docs_enabled: true,
                log_format: LogFormat::Pretty,
            },
            database: DatabaseConfig {
                user: "audio".to_string(),
                password: "audio".to_string(),
                db: "audio".to_string(),
                host: "localhost".to_string(),
                port: 5432,
                pool_size: 5,
                max_overflow: 10,
                pool_timeout: Duration::from_secs(30),
                echo_sql: false,
                connect_retries: 10,
                connect_retry_interval: Duration::from_secs(5),
            },
            auth: AuthConfig {
                secret_key: b"test_secret_key_32_bytes_minimum!".to_vec(),
                algorithm: Algorithm::HS256,
                access_token_ttl: chrono::Duration::minutes(30),
                refresh_token_ttl: chrono::Duration::days(7),
            },
            oauth: OAuthConfig {
                client_id: "test_client_id".to_string(),
                client_secret: "test_client_secret".to_string(),
                redirect_uri: "http://localhost:8000/auth/yandex/callback".to_string(),
                auth_url: "https://oauth.yandex.ru/authorize".to_string(),
                token_url: "https://oauth.yandex.ru/token".to_string(),
                info_url: "https://login.yandex.ru/info".to_string(),
            },
            audio: AudioConfig {
                storage_path: PathBuf::from("static/audio_files"),
                max_file_size: 10_000_000,
                allowed_types: vec!["audio/mpeg".to_string(), "audio/wav".to_string()],
            },
        }
    }
}

impl LogFormat {
    fn from_env() -> Result<Self, ConfigError> {
        match optional("LOG_FORMAT", "json").to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(ConfigError::Invalid {
                name: "LOG_FORMAT",
                reason: format!("unknown format '{}'", other),
            }),
        }
    }
}

/// Read a required variable; blank values count as missing.
fn required(name: &'static str) -> Result<String, ConfigError> {
    let value = env::var(name).map_err(|_| ConfigError::Missing(name))?;
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(ConfigError::Empty(name));
    }
    Ok(value)
}

fn optional(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_num<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => v.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            reason: format!("'{}' is not a valid number", v),
        }),
        _ => Ok(default),
    }
}

/// Ports are sometimes written with quotes in compose files (`"5432"`).
fn parse_port(name: &'static str, default: u16) -> Result<u16, ConfigError> {
    match env::var(name) {
        Ok(v) => {
            let cleaned = v.trim_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace());
            if cleaned.is_empty() {
                return Ok(default);
            }
            cleaned.parse().map_err(|_| ConfigError::Invalid {
                name,
                reason: format!("'{}' is not a valid port", v),
            })
        }
        Err(_) => Ok(default),
    }
}

/// Positive token lifetime; values chrono cannot represent are rejected.
fn parse_ttl(
    name: &'static str,
    default: i64,
    to_duration: fn(i64) -> Option<chrono::Duration>,
) -> Result<chrono::Duration, ConfigError> {
    let value = parse_num(name, default)?;
    if value <= 0 {
        return Err(ConfigError::Invalid {
            name,
            reason: "must be positive".to_string(),
        });
    }
    to_duration(value).ok_or_else(|| ConfigError::Invalid {
        name,
        reason: format!("{} is out of range", value),
    })
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "" => Ok(default),
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                name,
                reason: format!("'{}' is not a boolean", v),
            }),
        },
        Err(_) => Ok(default),
    }
}

/// Only HMAC algorithms make sense with a shared secret key.
fn parse_algorithm(name: &str) -> Result<Algorithm, ConfigError> {
    let algorithm = Algorithm::from_str(name).map_err(|_| ConfigError::Invalid {
        name: "ALGORITHM",
        reason: format!("unknown algorithm '{}'", name),
    })?;
    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        _ => Err(ConfigError::Invalid {
            name: "ALGORITHM",
            reason: format!("'{}' is not an HMAC algorithm", name),
        }),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Required environment variable is empty: {0}")]
    Empty(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}
