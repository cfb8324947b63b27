use super::models::User;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, TimeDelta, Utc};
use rand::RngCore;
use std::fmt;
use uuid::Uuid;

/// Session token type - an opaque, URL-safe random string
pub type SessionToken = String;

/// Number of random bytes behind every session token.
pub const SESSION_TOKEN_BYTES: usize = 32;

/// An authenticated login together with the user that owns it
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub user: User,
    pub token: SessionToken,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Check if this session has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// A session is expired once `now` is strictly past its expiration.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn with_expiration(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Get remaining time to live, zero once expired
    pub fn remaining_ttl(&self) -> TimeDelta {
        let remaining = self.expires_at - Utc::now();
        remaining.max(TimeDelta::zero())
    }
}

// Keeps the bearer token out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user", &self.user.username)
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Generate a cryptographically secure random session token.
///
/// 32 bytes from the thread-local CSPRNG, encoded as unpadded URL-safe base64
/// (43 characters) so the value can travel in a cookie unchanged.
pub fn generate_session_token() -> SessionToken {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
