// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Locally signed access and refresh tokens.

use crate::config::AuthConfig;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which of the two token kinds a JWT is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Session ID
    pub sid: Uuid,
    pub typ: TokenKind,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Signs and verifies tokens with the configured secret and algorithm.
#[derive(Clone)]
pub struct TokenIssuer {
    config: AuthConfig,
}

impl TokenIssuer {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// When a refresh token issued now would expire.
    pub fn refresh_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.config.refresh_token_ttl
    }

    /// Mint both tokens for one session.
    ///
    /// The refresh token expires with the session (`session_expires_at`).
    pub fn issue_pair(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        session_expires_at: DateTime<Utc>,
    ) -> Result<TokenPair, AppError> {
        let now = Utc::now();
        let access_expires_at = now + self.config.access_token_ttl;

        let access_token = self.sign(&Claims {
            sub: user_id,
            sid: session_id,
            typ: TokenKind::Access,
            iat: now.timestamp(),
            exp: access_expires_at.timestamp(),
        })?;
        let refresh_token = self.sign(&Claims {
            sub: user_id,
            sid: session_id,
            typ: TokenKind::Refresh,
            iat: now.timestamp(),
            exp: session_expires_at.timestamp(),
        })?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at: session_expires_at,
        })
    }

    /// Verify signature, expiry and kind.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, AppError> {
        let key = DecodingKey::from_secret(&self.config.secret_key);
        let mut validation = Validation::new(self.config.algorithm);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &key, &validation).map_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
            AppError::InvalidToken
        })?;

        if data.claims.typ != kind {
            tracing::debug!(expected = ?kind, got = ?data.claims.typ, "Wrong token kind");
            return Err(AppError::InvalidToken);
        }
        Ok(data.claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        encode(
            &Header::new(self.config.algorithm),
            claims,
            &EncodingKey::from_secret(&self.config.secret_key),
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))
    }
}
