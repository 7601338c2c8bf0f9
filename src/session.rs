//! Authenticated access to the upstream API.
//!
//! [`SessionClient`] owns the process-wide token pair and guarantees that
//! every upstream call is made with an access token that has not expired.
//! Upstream calls are only reachable through [`SessionClient::with_session`],
//! which hands the caller an [`AuthorizedApi`] after validating the token.

use std::future::Future;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::auth::AuthError;
use crate::pixiv::{ApiError, Illust, PixivApi, UserIdentity};
use crate::storage::{TokenPair, TokenStore, TokenStoreError};
use crate::util::now_unix_seconds;

#[derive(Debug, Error)]
pub enum SessionError {
    /// No credentials in memory or in the token store.
    #[error("Not authenticated: run `pixiv-feed login` to create a token cache")]
    NotAuthenticated,

    /// The refresh-token exchange was rejected; the refresh token is likely
    /// revoked or expired.
    #[error("Token refresh failed: {0}")]
    RefreshFailed(#[source] AuthError),

    #[error(transparent)]
    Store(#[from] TokenStoreError),
}

/// The upstream API bound to a validated access token.
pub struct AuthorizedApi<'a, A> {
    api: &'a A,
    access_token: SecretString,
    user_id: Option<String>,
}

impl<A: PixivApi> AuthorizedApi<'_, A> {
    /// Account id of the authenticated user, if the token endpoint reported it.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub async fn user_detail(
        &self,
        user_id: &str,
        language: &str,
    ) -> Result<Option<UserIdentity>, ApiError> {
        self.api
            .user_detail(self.access_token.expose_secret(), user_id, language)
            .await
    }

    pub async fn user_illusts(&self, user_id: &str, language: &str) -> Result<Vec<Illust>, ApiError> {
        self.api
            .user_illusts(self.access_token.expose_secret(), user_id, language)
            .await
    }

    pub async fn illust_follow(&self, language: &str) -> Result<Vec<Illust>, ApiError> {
        self.api
            .illust_follow(self.access_token.expose_secret(), language)
            .await
    }
}

/// Decorates a [`PixivApi`] with expiry-aware token management.
pub struct SessionClient<A> {
    api: A,
    store: Arc<dyn TokenStore>,
    current: Mutex<Option<TokenPair>>,
}

impl<A: PixivApi> SessionClient<A> {
    pub fn new(api: A, store: Arc<dyn TokenStore>) -> Self {
        Self {
            api,
            store,
            current: Mutex::new(None),
        }
    }

    /// Make sure a non-expired token pair is held, and return a copy of it.
    ///
    /// While the held pair is valid the store is not touched. Once it has
    /// expired, or when nothing is held yet, the store is read first: a pair
    /// written there by a fresh `pixiv-feed login` (or another process) that
    /// expires later than the held one replaces it. Only if the resulting
    /// pair is still expired is the refresh exchange run, and its result is
    /// persisted. The whole check runs under one lock, so concurrent callers
    /// trigger at most one refresh exchange.
    ///
    /// Never starts an interactive login: with no stored credentials this
    /// fails with [`SessionError::NotAuthenticated`].
    pub async fn ensure_valid(&self) -> Result<TokenPair, SessionError> {
        let mut current = self.current.lock().await;

        let now = now_unix_seconds();
        if let Some(held) = current.as_ref() {
            if !held.is_expired_at(now) {
                return Ok(held.clone());
            }
        }

        let stored = match self.load_stored().await {
            Ok(pair) => Some(pair),
            Err(TokenStoreError::NotFound) => None,
            Err(e) if current.is_some() => {
                tracing::warn!(error = %e, "Token store unreadable, refreshing the held pair");
                None
            }
            Err(e) => return Err(e.into()),
        };

        let pair = match (current.as_ref(), stored) {
            (Some(held), Some(stored)) if stored.expires_at > held.expires_at => {
                tracing::info!(expires_at = stored.expires_at, "Adopting newer token pair from store");
                stored
            }
            (Some(held), _) => held.clone(),
            (None, Some(stored)) => {
                tracing::debug!(expires_at = stored.expires_at, "Loaded token pair from store");
                stored
            }
            (None, None) => return Err(SessionError::NotAuthenticated),
        };
        *current = Some(pair.clone());

        if !pair.is_expired_at(now) {
            return Ok(pair);
        }

        tracing::info!(expires_at = pair.expires_at, now = now, "Access token expired, refreshing");
        // A failed refresh leaves both the held and the persisted pair untouched
        let mut refreshed = self
            .api
            .refresh(pair.refresh_token.expose_secret())
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Token refresh failed");
                SessionError::RefreshFailed(e)
            })?;
        if refreshed.user_id.is_none() {
            refreshed.user_id = pair.user_id.clone();
        }

        *current = Some(refreshed.clone());
        self.persist(&refreshed).await?;
        tracing::info!(expires_at = refreshed.expires_at, "Access token refreshed");

        Ok(refreshed)
    }

    // Store implementations do blocking file I/O, kept off the async workers.
    async fn load_stored(&self) -> Result<TokenPair, TokenStoreError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|e| TokenStoreError::Io(std::io::Error::other(e)))?
    }

    async fn persist(&self, pair: &TokenPair) -> Result<(), TokenStoreError> {
        let store = Arc::clone(&self.store);
        let pair = pair.clone();
        tokio::task::spawn_blocking(move || store.save(&pair))
            .await
            .map_err(|e| TokenStoreError::Io(std::io::Error::other(e)))?
    }

    /// Run `f` against the upstream API with a freshly validated token.
    pub async fn with_session<'a, F, Fut, T, E>(&'a self, f: F) -> Result<T, E>
    where
        F: FnOnce(AuthorizedApi<'a, A>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<SessionError>,
    {
        let pair = self.ensure_valid().await?;
        let authorized = AuthorizedApi {
            api: &self.api,
            access_token: pair.access_token,
            user_id: pair.user_id,
        };
        f(authorized).await
    }

    pub fn api(&self) -> &A {
        &self.api
    }
}
