//! Feed requests end to end: session, upstream fetch, mapping, serialization.
//!
//! [`FeedService`] is the only entry point the HTTP layer and the CLI use.

use serde::Deserialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::feed::{
    build_feed_document, follow_channel, user_channel, write_feed, FeedDocument, FeedFormat,
    UnsupportedFormat, WriteError, DEFAULT_LANGUAGE,
};
use crate::pixiv::{ApiError, PixivApi};
use crate::session::{SessionClient, SessionError};
use crate::storage::TokenStoreError;

pub const DEFAULT_IMAGE_PROXY_HOST: &str = "i.pixiv.re";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Not authenticated: run `pixiv-feed login` to create a token cache")]
    NotAuthenticated,

    #[error("Token refresh failed, run `pixiv-feed login` again: {0}")]
    RefreshFailed(#[source] AuthError),

    #[error("Invalid language code: {0:?}")]
    InvalidLanguage(String),

    #[error("User not found: {0}")]
    UpstreamUserNotFound(String),

    #[error(transparent)]
    UnsupportedFeedFormat(#[from] UnsupportedFormat),

    #[error("Upstream API error: {0}")]
    Upstream(#[from] ApiError),

    #[error("Token store error: {0}")]
    Store(#[from] TokenStoreError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl FeedError {
    /// True when the operator has to run the login flow to recover.
    pub fn is_auth_required(&self) -> bool {
        matches!(self, FeedError::NotAuthenticated | FeedError::RefreshFailed(_))
    }
}

impl From<SessionError> for FeedError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotAuthenticated => FeedError::NotAuthenticated,
            SessionError::RefreshFailed(e) => FeedError::RefreshFailed(e),
            SessionError::Store(e) => FeedError::Store(e),
        }
    }
}

/// Query of a user-works feed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFeedRequest {
    pub id: String,
    pub lang: Option<String>,
    /// Replaces the user's display name in the channel title.
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub image_proxy_host: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            image_proxy_host: DEFAULT_IMAGE_PROXY_HOST.to_string(),
        }
    }
}

/// A serialized feed and the format it was written in.
#[derive(Debug, Clone)]
pub struct RenderedFeed {
    pub format: FeedFormat,
    pub body: String,
}

impl RenderedFeed {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

const MAX_LANGUAGE_LEN: usize = 16;

/// The requested language, or the default when none is given.
///
/// The value ends up in a request header and in page URLs, so only ASCII
/// letters and `-` are accepted.
fn effective_language(lang: Option<&str>) -> Result<&str, FeedError> {
    let Some(lang) = lang.map(str::trim).filter(|l| !l.is_empty()) else {
        return Ok(DEFAULT_LANGUAGE);
    };
    let valid = lang.len() <= MAX_LANGUAGE_LEN
        && lang.bytes().all(|b| b.is_ascii_alphabetic() || b == b'-');
    if valid {
        Ok(lang)
    } else {
        Err(FeedError::InvalidLanguage(lang.to_string()))
    }
}

fn render(doc: &FeedDocument, format: FeedFormat) -> Result<RenderedFeed, FeedError> {
    let body = write_feed(doc, format)?;
    tracing::debug!(format = %format, entries = doc.entries.len(), bytes = body.len(), "Rendered feed");
    Ok(RenderedFeed { format, body })
}

pub struct FeedService<A> {
    session: SessionClient<A>,
    settings: ServiceSettings,
}

impl<A: PixivApi> FeedService<A> {
    pub fn new(session: SessionClient<A>, settings: ServiceSettings) -> Self {
        Self { session, settings }
    }

    pub fn session(&self) -> &SessionClient<A> {
        &self.session
    }

    /// Serialized works feed of one user. `kind` is checked before anything
    /// touches the network.
    pub async fn user_feed(
        &self,
        kind: &str,
        request: &UserFeedRequest,
    ) -> Result<RenderedFeed, FeedError> {
        let format: FeedFormat = kind.parse()?;
        let doc = self.build_user_feed(request).await?;
        render(&doc, format)
    }

    /// Serialized follow timeline of the authenticated account.
    pub async fn follow_feed(
        &self,
        kind: &str,
        language: Option<&str>,
    ) -> Result<RenderedFeed, FeedError> {
        let format: FeedFormat = kind.parse()?;
        let doc = self.build_follow_feed(language).await?;
        render(&doc, format)
    }

    pub async fn build_user_feed(&self, request: &UserFeedRequest) -> Result<FeedDocument, FeedError> {
        let language = effective_language(request.lang.as_deref())?;
        let proxy = self.settings.image_proxy_host.as_str();

        self.session
            .with_session(|api| async move {
                let user = api
                    .user_detail(&request.id, language)
                    .await?
                    .ok_or_else(|| FeedError::UpstreamUserNotFound(request.id.clone()))?;
                let illusts = api.user_illusts(&request.id, language).await?;
                tracing::debug!(
                    user_id = %request.id,
                    language = language,
                    count = illusts.len(),
                    "Fetched user illustrations"
                );

                let channel = user_channel(&user, request.name.as_deref(), language);
                Ok::<_, FeedError>(build_feed_document(channel, &illusts, Some(language), proxy))
            })
            .await
    }

    pub async fn build_follow_feed(&self, language: Option<&str>) -> Result<FeedDocument, FeedError> {
        let language = effective_language(language)?;
        let proxy = self.settings.image_proxy_host.as_str();

        self.session
            .with_session(|api| async move {
                let username = match api.user_id() {
                    Some(id) => {
                        let user = api
                            .user_detail(id, language)
                            .await?
                            .ok_or_else(|| FeedError::UpstreamUserNotFound(id.to_string()))?;
                        Some(user.display_name)
                    }
                    None => {
                        tracing::debug!("Account id unknown, follow feed title omits the user name");
                        None
                    }
                };
                let illusts = api.illust_follow(language).await?;
                tracing::debug!(
                    language = language,
                    count = illusts.len(),
                    "Fetched follow timeline"
                );

                let channel = follow_channel(username.as_deref(), language);
                Ok::<_, FeedError>(build_feed_document(channel, &illusts, Some(language), proxy))
            })
            .await
    }
}
