// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Yandex ID OAuth client.
//!
//! Handles:
//! - Building the authorization redirect
//! - Authorization code exchange
//! - Resolving the account behind a provider access token

use crate::config::OAuthConfig;
use crate::error::AppError;
use crate::models::ProviderIdentity;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Permissions requested at consent time.
const SCOPE: &str = "login:email login:info";

/// An OAuth identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL the browser is sent to for consent.
    fn authorize_url(&self, state: &str) -> String;

    /// Trade an authorization code for a provider access token.
    async fn exchange_code(&self, code: &str) -> Result<String, AppError>;

    /// Look up the account the access token belongs to.
    async fn fetch_identity(&self, access_token: &str) -> Result<ProviderIdentity, AppError>;
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Error body returned by the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Subset of the `login.yandex.ru/info` response.
#[derive(Debug, Deserialize)]
pub struct YandexUserInfo {
    pub id: Option<String>,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub default_email: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl YandexUserInfo {
    /// Convert into a provider identity. Fails if the account id is absent.
    pub fn into_identity(self) -> Result<ProviderIdentity, AppError> {
        let subject = self
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                AppError::Authentication("provider response has no account id".to_string())
            })?;

        let email = self.default_email.filter(|e| !e.trim().is_empty());
        let name = non_blank(self.real_name)
            .or_else(|| non_blank(self.display_name))
            .or_else(|| {
                email
                    .as_deref()
                    .and_then(|e| e.split('@').next())
                    .map(str::to_string)
            })
            .or_else(|| non_blank(self.login));

        Ok(ProviderIdentity {
            subject,
            email,
            name,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Yandex OAuth client.
#[derive(Clone)]
pub struct YandexClient {
    http: reqwest::Client,
    config: OAuthConfig,
}

impl YandexClient {
    pub fn new(config: OAuthConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client init failed: {}", e)))?;
        Ok(Self { http, config })
    }

    async fn check_token_response(
        &self,
        response: reqwest::Response,
    ) -> Result<TokenResponse, AppError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| AppError::Authentication(format!("Malformed token response: {}", e)));
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            return Err(AppError::ProviderUnavailable(format!(
                "token endpoint returned HTTP {}",
                status
            )));
        }

        let message = match serde_json::from_str::<TokenError>(&body) {
            Ok(err) => err.error_description.unwrap_or(err.error),
            Err(_) => format!("HTTP {}", status),
        };
        Err(AppError::Authentication(message))
    }
}

/// Connection failures and timeouts mean the provider is unreachable; the
/// attempt can be retried.
fn request_error(e: reqwest::Error) -> AppError {
    AppError::ProviderUnavailable(e.to_string())
}

#[async_trait]
impl IdentityProvider for YandexClient {
    fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            self.config.auth_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(SCOPE),
            urlencoding::encode(state)
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<String, AppError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(request_error)?;

        let tokens = self.check_token_response(response).await?;
        tracing::debug!(
            expires_in = ?tokens.expires_in,
            has_refresh = tokens.refresh_token.is_some(),
            "Exchanged authorization code"
        );
        Ok(tokens.access_token)
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<ProviderIdentity, AppError> {
        let response = self
            .http
            .get(&self.config.info_url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("OAuth {}", access_token),
            )
            .query(&[("format", "json")])
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AppError::ProviderUnavailable(format!(
                "info endpoint returned HTTP {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(AppError::Authentication(format!(
                "Provider rejected access token (HTTP {})",
                status
            )));
        }

        let info: YandexUserInfo = response
            .json()
            .await
            .map_err(|e| AppError::Authentication(format!("Malformed user info: {}", e)))?;
        info.into_identity()
    }
}
