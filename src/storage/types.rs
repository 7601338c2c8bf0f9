use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors returned by a [`TokenStore`](super::TokenStore).
#[derive(Debug, Error)]
pub enum TokenStoreError {
    /// No usable credential record exists (missing file or corrupt JSON).
    ///
    /// This is an expected state, not a fault: the operator has not run
    /// `pixiv-feed login` yet, or the cache was wiped.
    #[error("No stored credentials found")]
    NotFound,

    /// Reading or writing the record failed.
    #[error("Token store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The record could not be encoded as JSON.
    #[error("Failed to encode token record: {0}")]
    Encode(#[from] serde_json::Error),
}

// ============================================================================
// Data Structures
// ============================================================================

/// Credential material for the single upstream identity.
///
/// `expires_at` is the wall-clock instant (unix seconds) after which
/// `access_token` must be treated as invalid.
///
/// SEC-015: both tokens are `SecretString`, so `Debug` output is redacted.
#[derive(Debug)]
pub struct TokenPair {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub expires_at: i64,
    /// Account id of the authenticated user, when the token endpoint reported one.
    pub user_id: Option<String>,
}

impl TokenPair {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: i64,
    ) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: SecretString::from(refresh_token.into()),
            expires_at,
            user_id: None,
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// True once `now` has reached `expires_at`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

impl Clone for TokenPair {
    fn clone(&self) -> Self {
        Self {
            access_token: SecretString::from(self.access_token.expose_secret().to_owned()),
            refresh_token: SecretString::from(self.refresh_token.expose_secret().to_owned()),
            expires_at: self.expires_at,
            user_id: self.user_id.clone(),
        }
    }
}

impl PartialEq for TokenPair {
    fn eq(&self, other: &Self) -> bool {
        self.access_token.expose_secret() == other.access_token.expose_secret()
            && self.refresh_token.expose_secret() == other.refresh_token.expose_secret()
            && self.expires_at == other.expires_at
            && self.user_id == other.user_id
    }
}

impl Eq for TokenPair {}

/// On-disk shape of the token cache.
///
/// Kept separate from [`TokenPair`] so the secrets only leave their
/// `SecretString` wrappers at the serialization boundary.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TokenRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub expiry: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl From<&TokenPair> for TokenRecord {
    fn from(pair: &TokenPair) -> Self {
        Self {
            access_token: pair.access_token.expose_secret().to_owned(),
            refresh_token: pair.refresh_token.expose_secret().to_owned(),
            expiry: pair.expires_at,
            user_id: pair.user_id.clone(),
        }
    }
}

impl From<TokenRecord> for TokenPair {
    fn from(record: TokenRecord) -> Self {
        Self {
            access_token: SecretString::from(record.access_token),
            refresh_token: SecretString::from(record.refresh_token),
            expires_at: record.expiry,
            user_id: record.user_id,
        }
    }
}
