//! Session token management.
//!
//! ARCHITECTURE
//! ============
//! Sign-in hands the browser a random 32-byte token in an HttpOnly cookie.
//! The store only ever sees the SHA-256 of that token, so a leaked sessions
//! table cannot be replayed as cookies.

use std::fmt::Write;

use rand::Rng;
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::store::{Store, StoreError};

const TOKEN_BYTES: usize = 32;

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// Fresh session token: 32 random bytes, hex encoded.
#[must_use]
pub fn generate_token() -> String {
    to_hex(&rand::rng().random::<[u8; TOKEN_BYTES]>())
}

#[must_use]
pub(crate) fn hash_token(token: &str) -> String {
    to_hex(&Sha256::digest(token.as_bytes()))
}

/// Create a session for `user_id`, returning the raw token for the cookie.
pub async fn create_session(store: &dyn Store, user_id: Uuid, ttl: Duration) -> Result<String, StoreError> {
    let token = generate_token();
    let expires_at = OffsetDateTime::now_utc() + ttl;
    store
        .create_session(&hash_token(&token), user_id, expires_at)
        .await?;
    Ok(token)
}

/// Resolve a raw token to its user if the session is live.
pub async fn validate_session(store: &dyn Store, token: &str) -> Result<Option<Uuid>, StoreError> {
    store.session_user(&hash_token(token)).await
}

pub async fn delete_session(store: &dyn Store, token: &str) -> Result<(), StoreError> {
    store.delete_session(&hash_token(token)).await
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
