use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use thiserror::Error;

use super::models::{Illust, IllustsResponse, UserDetailResponse, UserIdentity};
use crate::auth::{AuthError, TokenEndpoint};
use crate::storage::TokenPair;

pub const APP_API_URL: &str = "https://app-api.pixiv.net";

const APP_USER_AGENT: &str = "PixivIOSApp/7.13.3 (iOS 14.6; iPhone13,2)";
const APP_OS: &str = "ios";
const APP_OS_VERSION: &str = "14.6";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB
const MAX_PAYLOAD_CHARS: usize = 500;

/// Errors from app API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Request timed out")]
    Timeout,
    #[error("HTTP error: status {status}: {payload}")]
    HttpStatus { status: u16, payload: String },
    #[error("Response too large")]
    ResponseTooLarge,
    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The upstream capabilities the feed service needs.
///
/// Every data call takes the access token explicitly; the session layer is
/// the one that guarantees the token is fresh.
#[async_trait]
pub trait PixivApi: Send + Sync {
    /// Exchange a refresh token for a new token pair.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError>;

    /// Profile of `user_id`, or `None` if no such user exists.
    async fn user_detail(
        &self,
        access_token: &str,
        user_id: &str,
        language: &str,
    ) -> Result<Option<UserIdentity>, ApiError>;

    /// Illustrations published by `user_id`, newest first.
    async fn user_illusts(
        &self,
        access_token: &str,
        user_id: &str,
        language: &str,
    ) -> Result<Vec<Illust>, ApiError>;

    /// New illustrations from accounts the authenticated user follows.
    async fn illust_follow(
        &self,
        access_token: &str,
        language: &str,
    ) -> Result<Vec<Illust>, ApiError>;
}

/// reqwest-backed client for the pixiv app API.
#[derive(Debug, Clone)]
pub struct AppApiClient {
    client: reqwest::Client,
    base_url: String,
    token_endpoint: TokenEndpoint,
    timeout: Duration,
}

impl AppApiClient {
    pub fn new(client: reqwest::Client) -> Self {
        let token_endpoint = TokenEndpoint::new(client.clone());
        Self {
            client,
            base_url: APP_API_URL.to_string(),
            token_endpoint,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the API base URL (used by tests against a mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_token_endpoint(mut self, endpoint: TokenEndpoint) -> Self {
        self.token_endpoint = endpoint;
        self
    }

    /// Bound every API and token request by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.token_endpoint = self.token_endpoint.with_timeout(timeout);
        self
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        access_token: &str,
        language: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let request = self
            .client
            .get(&url)
            .query(query)
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, APP_USER_AGENT)
            .header(reqwest::header::ACCEPT_LANGUAGE, language)
            .header("App-OS", APP_OS)
            .header("App-OS-Version", APP_OS_VERSION);

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| ApiError::Timeout)?
            .map_err(ApiError::Network)?;

        let status = response.status();
        let bytes = tokio::time::timeout(
            self.timeout,
            read_limited_bytes(response, MAX_RESPONSE_SIZE),
        )
        .await
        .map_err(|_| ApiError::Timeout)??;

        if !status.is_success() {
            let payload: String = String::from_utf8_lossy(&bytes)
                .chars()
                .take(MAX_PAYLOAD_CHARS)
                .collect();
            tracing::warn!(path = path, status = %status, "App API returned an error");
            return Err(ApiError::HttpStatus {
                status: status.as_u16(),
                payload,
            });
        }

        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl PixivApi for AppApiClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        self.token_endpoint.refresh(refresh_token).await
    }

    async fn user_detail(
        &self,
        access_token: &str,
        user_id: &str,
        language: &str,
    ) -> Result<Option<UserIdentity>, ApiError> {
        let query = [("user_id", user_id), ("filter", "for_ios")];
        match self
            .get_json::<UserDetailResponse>(access_token, language, "/v1/user/detail", &query)
            .await
        {
            Ok(resp) => Ok(resp.user.map(UserIdentity::from)),
            Err(ApiError::HttpStatus { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn user_illusts(
        &self,
        access_token: &str,
        user_id: &str,
        language: &str,
    ) -> Result<Vec<Illust>, ApiError> {
        let query = [("user_id", user_id), ("filter", "for_ios"), ("type", "illust")];
        let resp: IllustsResponse = self
            .get_json(access_token, language, "/v1/user/illusts", &query)
            .await?;
        Ok(resp.illusts.into_iter().map(Illust::from).collect())
    }

    async fn illust_follow(
        &self,
        access_token: &str,
        language: &str,
    ) -> Result<Vec<Illust>, ApiError> {
        let query = [("restrict", "public")];
        let resp: IllustsResponse = self
            .get_json(access_token, language, "/v2/illust/follow", &query)
            .await?;
        Ok(resp.illusts.into_iter().map(Illust::from).collect())
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, ApiError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ApiError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ApiError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ApiError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
