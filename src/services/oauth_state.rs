// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Signed OAuth `state` parameter.
//!
//! The state is `base64url("timestamp_hex|nonce_hex|signature_hex")` where the
//! signature is HMAC-SHA256 over `timestamp_hex|nonce_hex`. The HMAC key is
//! derived from `SECRET_KEY` with HKDF so it never equals the JWT key.

use crate::error::AppError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const KEY_INFO: &[u8] = b"audio-store oauth state v1";

/// States older than this many minutes are rejected.
pub const MAX_STATE_AGE_MINUTES: i64 = 10;

/// Signs and verifies OAuth state values.
#[derive(Clone)]
pub struct StateSigner {
    key: [u8; 32],
}

impl StateSigner {
    pub fn new(secret: &[u8]) -> Result<Self, AppError> {
        let mut key = [0u8; 32];
        Hkdf::<Sha256>::new(None, secret)
            .expand(KEY_INFO, &mut key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HKDF expand failed: {}", e)))?;
        Ok(Self { key })
    }

    /// Create a fresh state value.
    pub fn sign(&self, now: DateTime<Utc>) -> Result<String, AppError> {
        let payload = format!(
            "{:x}|{}",
            now.timestamp_millis(),
            Uuid::new_v4().simple()
        );
        let signature = hex::encode(self.mac(&payload)?);
        let signed_state = format!("{}|{}", payload, signature);
        Ok(URL_SAFE_NO_PAD.encode(signed_state.as_bytes()))
    }

    /// Check signature and age. Returns `false` for anything malformed.
    pub fn verify(&self, state: &str, now: DateTime<Utc>) -> bool {
        self.check(state, now).is_some()
    }

    fn check(&self, state: &str, now: DateTime<Utc>) -> Option<()> {
        let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
        let state_str = String::from_utf8(bytes).ok()?;

        // Format is "timestamp_hex|nonce_hex|signature_hex"
        let parts: Vec<&str> = state_str.splitn(3, '|').collect();
        if parts.len() != 3 {
            return None;
        }
        let (timestamp_hex, nonce, signature_hex) = (parts[0], parts[1], parts[2]);

        let payload = format!("{}|{}", timestamp_hex, nonce);
        let expected = self.mac(&payload).ok()?;
        let provided = hex::decode(signature_hex).ok()?;

        if !bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
            tracing::warn!("OAuth state signature mismatch");
            return None;
        }

        let issued_ms = i64::from_str_radix(timestamp_hex, 16).ok()?;
        let issued = DateTime::<Utc>::from_timestamp_millis(issued_ms)?;
        let age = now - issued;
        if age > Duration::minutes(MAX_STATE_AGE_MINUTES) || age < -Duration::minutes(1) {
            tracing::warn!(age_secs = age.num_seconds(), "OAuth state expired");
            return None;
        }
        Some(())
    }

    fn mac(&self, payload: &str) -> Result<Vec<u8>, AppError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
        mac.update(payload.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test_secret_key_32_bytes_minimum!";

    #[test]
    fn test_sign_and_verify() {
        let signer = StateSigner::new(SECRET).unwrap();
        let now = Utc::now();
        let state = signer.sign(now).unwrap();
        assert!(signer.verify(&state, now));
    }

    #[test]
    fn test_states_are_unique() {
        let signer = StateSigner::new(SECRET).unwrap();
        let now = Utc::now();
        assert_ne!(signer.sign(now).unwrap(), signer.sign(now).unwrap());
    }

    #[test]
    fn test_wrong_secret() {
        let signer = StateSigner::new(SECRET).unwrap();
        let other = StateSigner::new(b"wrong_key").unwrap();
        let now = Utc::now();
        let state = signer.sign(now).unwrap();
        assert!(!other.verify(&state, now));
    }

    #[test]
    fn test_expired_state() {
        let signer = StateSigner::new(SECRET).unwrap();
        let issued = Utc::now() - Duration::minutes(11);
        let state = signer.sign(issued).unwrap();
        assert!(!signer.verify(&state, Utc::now()));
    }

    #[test]
    fn test_tampered_state() {
        let signer = StateSigner::new(SECRET).unwrap();
        let now = Utc::now();
        let decoded = String::from_utf8(
            URL_SAFE_NO_PAD
                .decode(signer.sign(now).unwrap())
                .unwrap(),
        )
        .unwrap();
        let parts: Vec<&str> = decoded.splitn(3, '|').collect();
        let forged = format!("{}|{}|{}", parts[0], "deadbeef", parts[2]);
        let forged = URL_SAFE_NO_PAD.encode(forged.as_bytes());
        assert!(!signer.verify(&forged, now));
    }

    #[test]
    fn test_malformed_state() {
        let signer = StateSigner::new(SECRET).unwrap();
        let now = Utc::now();
        assert!(!signer.verify("not base64 !!", now));
        assert!(!signer.verify(&URL_SAFE_NO_PAD.encode("invalid|format"), now));
    }
}
