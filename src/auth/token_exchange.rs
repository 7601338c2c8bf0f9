//! Token endpoint helpers (authorization_code + refresh_token grants).

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::storage::TokenPair;
use crate::util::now_unix_seconds;

pub const AUTH_TOKEN_URL: &str = "https://oauth.secure.pixiv.net/auth/token";
pub const REDIRECT_URI: &str = "https://app-api.pixiv.net/web/v1/users/auth/pixiv/callback";
pub const CLIENT_ID: &str = "MOBrBDS8blbauoSck0ZfDbtuzpyT";
pub const CLIENT_SECRET: &str = "lsACyCD94FhDUtGTXi3QzcFE2uU1hqtDaKeqrdwj";
pub const USER_AGENT: &str = "PixivAndroidApp/5.0.234 (Android 11; Pixel 5)";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_PAYLOAD_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Token request timed out")]
    Timeout,
    /// The provider rejected the exchange, or answered without both tokens.
    /// `payload` is the provider's response body, for diagnostics.
    #[error("Token exchange failed (status {status}): {payload}")]
    ExchangeFailed { status: u16, payload: String },
    #[error("Failed to read authorization code: {0}")]
    Prompt(#[from] std::io::Error),
    #[error("Login cancelled")]
    Cancelled,
}

/// The provider's OAuth token endpoint.
#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl TokenEndpoint {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            url: AUTH_TOKEN_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Point at a different token URL (used by tests against a mock server).
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Exchange an authorization code and its PKCE verifier for a token pair.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenPair, AuthError> {
        let form = [
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
            ("code", code.trim()),
            ("code_verifier", code_verifier),
            ("grant_type", "authorization_code"),
            ("include_policy", "true"),
            ("redirect_uri", REDIRECT_URI),
        ];
        self.post(&form).await
    }

    /// Obtain a new access token from a refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let form = [
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
            ("grant_type", "refresh_token"),
            ("include_policy", "true"),
            ("refresh_token", refresh_token),
        ];
        self.post(&form).await
    }

    async fn post(&self, form: &[(&str, &str)]) -> Result<TokenPair, AuthError> {
        let request = self
            .client
            .post(&self.url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .form(form)
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| AuthError::Timeout)?
            .map_err(AuthError::Network)?;

        let status = response.status().as_u16();
        let body = tokio::time::timeout(self.timeout, response.text())
            .await
            .map_err(|_| AuthError::Timeout)?
            .map_err(AuthError::Network)?;

        parse_token_response(status, &body, now_unix_seconds())
    }
}

/// Turn a token endpoint response into a [`TokenPair`].
///
/// `expires_at` is `now + expires_in`; a missing `expires_in` yields a pair
/// that is already expired, so the next use forces a refresh.
fn parse_token_response(status: u16, body: &str, now: i64) -> Result<TokenPair, AuthError> {
    let failed = || AuthError::ExchangeFailed {
        status,
        payload: sanitize_payload(body),
    };

    if !(200..300).contains(&status) {
        tracing::warn!(status = status, "Token endpoint rejected the request");
        return Err(failed());
    }

    let value: Value = serde_json::from_str(body).map_err(|_| failed())?;

    let access_token = non_empty_str(&value, "access_token").ok_or_else(failed)?;
    let refresh_token = non_empty_str(&value, "refresh_token").ok_or_else(failed)?;
    let expires_in = value.get("expires_in").and_then(parse_i64_lossy).unwrap_or(0);

    let mut pair = TokenPair::new(access_token, refresh_token, now.saturating_add(expires_in));
    pair.user_id = value
        .get("user")
        .and_then(|u| u.get("id"))
        .and_then(|id| match id {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    Ok(pair)
}

fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn parse_i64_lossy(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Keep the provider's payload for diagnostics, minus any token values it echoes.
fn sanitize_payload(body: &str) -> String {
    if let Ok(mut value) = serde_json::from_str::<Value>(body) {
        redact_token_fields(&mut value);
        if let Ok(encoded) = serde_json::to_string(&value) {
            return encoded.chars().take(MAX_PAYLOAD_CHARS).collect();
        }
    }
    body.chars().take(MAX_PAYLOAD_CHARS).collect()
}

fn redact_token_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                if key.to_ascii_lowercase().contains("token") && nested.is_string() {
                    *nested = Value::String("[REDACTED]".to_string());
                    continue;
                }
                redact_token_fields(nested);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_token_fields),
        _ => {}
    }
}
