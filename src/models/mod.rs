// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod audio;
pub mod session;
pub mod user;

pub use audio::{AudioFile, AudioFileResponse, NewAudioFile};
pub use session::Session;
pub use user::{ProviderIdentity, User, UserResponse, UserUpdate};
