// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Audio Store: upload and keep audio files behind Yandex ID login
//!
//! This crate provides the backend API: OAuth login with locally issued
//! access/refresh tokens, per-user audio storage on disk with metadata in
//! PostgreSQL, and user administration.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::Database;
use services::{AudioStorage, IdentityProvider, StateSigner, TokenIssuer};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Arc<dyn Database>,
    pub identity: Arc<dyn IdentityProvider>,
    pub storage: AudioStorage,
    pub tokens: TokenIssuer,
    pub oauth_state: StateSigner,
}

impl AppState {
    /// Wire the services that only depend on configuration.
    pub fn new(
        config: Config,
        db: Arc<dyn Database>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self, error::AppError> {
        let storage = AudioStorage::new(&config.audio);
        let tokens = TokenIssuer::new(config.auth.clone());
        let oauth_state = StateSigner::new(&config.auth.secret_key)?;
        Ok(Self {
            config,
            db,
            identity,
            storage,
            tokens,
            oauth_state,
        })
    }
}
