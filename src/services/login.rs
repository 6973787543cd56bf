// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Login attempts, refresh rotation and logout.
//!
//! A login attempt moves through
//! `Unauthenticated -> CodeReceived -> TokenExchanged -> IdentityResolved -> SessionIssued`.
//! Any failed transition ends the attempt with an error. Nothing is written
//! to the database until the identity has been resolved.

use crate::db::{Database, SessionRepository, UserRepository};
use crate::error::AppError;
use crate::models::{ProviderIdentity, Session, User};
use crate::services::tokens::{TokenIssuer, TokenKind, TokenPair};
use crate::services::yandex::IdentityProvider;
use crate::AppState;
use chrono::Utc;
use uuid::Uuid;

/// State of one login attempt.
#[derive(Debug)]
pub enum LoginAttempt {
    Unauthenticated { code: Option<String> },
    CodeReceived { code: String },
    TokenExchanged { provider_token: String },
    IdentityResolved { identity: ProviderIdentity },
    SessionIssued(IssuedSession),
}

/// Result of a successful login or refresh.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub user: User,
    pub session: Session,
    pub tokens: TokenPair,
}

impl LoginAttempt {
    /// Start an attempt from an authorization code.
    pub fn with_code(code: impl Into<String>) -> Self {
        LoginAttempt::Unauthenticated {
            code: Some(code.into()),
        }
    }

    /// Start an attempt from an access token the client already obtained
    /// from the provider.
    pub fn with_provider_token(token: impl Into<String>) -> Self {
        LoginAttempt::TokenExchanged {
            provider_token: token.into(),
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            LoginAttempt::Unauthenticated { .. } => "unauthenticated",
            LoginAttempt::CodeReceived { .. } => "code_received",
            LoginAttempt::TokenExchanged { .. } => "token_exchanged",
            LoginAttempt::IdentityResolved { .. } => "identity_resolved",
            LoginAttempt::SessionIssued(_) => "session_issued",
        }
    }
}

/// Drives login attempts against the store and the identity provider.
pub struct LoginFlow<'a> {
    db: &'a dyn Database,
    provider: &'a dyn IdentityProvider,
    tokens: &'a TokenIssuer,
}

impl<'a> LoginFlow<'a> {
    pub fn new(
        db: &'a dyn Database,
        provider: &'a dyn IdentityProvider,
        tokens: &'a TokenIssuer,
    ) -> Self {
        Self {
            db,
            provider,
            tokens,
        }
    }

    pub fn from_state(state: &'a AppState) -> Self {
        Self::new(state.db.as_ref(), state.identity.as_ref(), &state.tokens)
    }

    /// Perform a single transition.
    pub async fn advance(&self, attempt: LoginAttempt) -> Result<LoginAttempt, AppError> {
        match attempt {
            LoginAttempt::Unauthenticated { code } => {
                let code = code
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| {
                        AppError::BadRequest("missing authorization code".to_string())
                    })?;
                Ok(LoginAttempt::CodeReceived { code })
            }
            LoginAttempt::CodeReceived { code } => {
                let provider_token = self.provider.exchange_code(&code).await?;
                Ok(LoginAttempt::TokenExchanged { provider_token })
            }
            LoginAttempt::TokenExchanged { provider_token } => {
                if provider_token.trim().is_empty() {
                    return Err(AppError::BadRequest("missing access token".to_string()));
                }
                let identity = self.provider.fetch_identity(&provider_token).await?;
                Ok(LoginAttempt::IdentityResolved { identity })
            }
            LoginAttempt::IdentityResolved { identity } => {
                let user = self.db.upsert_oauth_user(&identity).await?;
                if !user.is_active {
                    tracing::warn!(user_id = %user.id, "Inactive user attempted login");
                    return Err(AppError::Forbidden("user is inactive".to_string()));
                }
                let issued = self.open_session(user).await?;
                Ok(LoginAttempt::SessionIssued(issued))
            }
            issued @ LoginAttempt::SessionIssued(_) => Ok(issued),
        }
    }

    /// Run transitions until a session is issued or one fails.
    pub async fn run(&self, mut attempt: LoginAttempt) -> Result<IssuedSession, AppError> {
        loop {
            let stage = attempt.stage();
            attempt = match self.advance(attempt).await {
                Ok(LoginAttempt::SessionIssued(issued)) => {
                    tracing::info!(
                        user_id = %issued.user.id,
                        session_id = %issued.session.id,
                        "Login successful"
                    );
                    return Ok(issued);
                }
                Ok(next) => next,
                Err(e) => {
                    tracing::warn!(stage, error = %e, "Login attempt failed");
                    return Err(e);
                }
            };
        }
    }

    /// Redeem a refresh token for a new pair. The old token stops working.
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedSession, AppError> {
        let claims = self.tokens.verify(refresh_token, TokenKind::Refresh)?;

        let expires_at = self.tokens.refresh_expiry(Utc::now());
        let session = self
            .db
            .rotate_session(claims.sid, expires_at)
            .await?
            .ok_or_else(|| {
                tracing::warn!(session_id = %claims.sid, "Refresh with inactive session");
                AppError::InvalidToken
            })?;

        let user = match self.db.get_user(session.user_id).await? {
            Some(user) if user.is_active => user,
            Some(_) => {
                self.db.revoke_session(session.id).await?;
                return Err(AppError::Forbidden("user is inactive".to_string()));
            }
            None => {
                self.db.revoke_session(session.id).await?;
                return Err(AppError::InvalidToken);
            }
        };

        let tokens = self
            .tokens
            .issue_pair(user.id, session.id, session.expires_at)?;
        Ok(IssuedSession {
            user,
            session,
            tokens,
        })
    }

    /// Revoke a session. Unknown or already revoked sessions are not an error.
    pub async fn logout(&self, session_id: Uuid) -> Result<(), AppError> {
        let revoked = self.db.revoke_session(session_id).await?;
        tracing::info!(session_id = %session_id, revoked, "Logout");
        Ok(())
    }

    async fn open_session(&self, user: User) -> Result<IssuedSession, AppError> {
        let expires_at = self.tokens.refresh_expiry(Utc::now());
        let session = self.db.create_session(user.id, expires_at).await?;
        let tokens = self
            .tokens
            .issue_pair(user.id, session.id, session.expires_at)?;
        Ok(IssuedSession {
            user,
            session,
            tokens,
        })
    }
}
