// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod login;
pub mod oauth_state;
pub mod storage;
pub mod tokens;
pub mod yandex;

pub use login::{IssuedSession, LoginAttempt, LoginFlow};
pub use oauth_state::StateSigner;
pub use storage::{AudioStorage, AudioUpload};
pub use tokens::{Claims, TokenIssuer, TokenKind, TokenPair};
pub use yandex::{IdentityProvider, YandexClient};
