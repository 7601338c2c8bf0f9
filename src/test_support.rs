//! In-process [`PixivApi`] double shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;

use crate::auth::AuthError;
use crate::pixiv::{ApiError, Illust, PixivApi, Tag, UserIdentity};
use crate::storage::TokenPair;
use crate::util::now_unix_seconds;

pub(crate) fn sample_user() -> UserIdentity {
    UserIdentity {
        id: "7".to_string(),
        display_name: "Artist".to_string(),
        account_name: "artist_acct".to_string(),
    }
}

pub(crate) fn sample_illust(id: &str) -> Illust {
    Illust {
        id: id.to_string(),
        title: format!("Work {id}"),
        caption: "a <b>bold</b> caption".to_string(),
        created_at: DateTime::parse_from_rfc3339("2023-05-01T12:00:00+09:00")
            .unwrap_or_else(|e| panic!("bad fixture date: {e}")),
        author: sample_user(),
        tags: vec![
            Tag {
                name: "cat".to_string(),
                translated_name: Some("猫".to_string()),
            },
            Tag {
                name: "OC".to_string(),
                translated_name: None,
            },
        ],
        images: vec![format!("https://i.pximg.net/img-original/img/{id}_p0.png")],
    }
}

pub(crate) struct FakeApi {
    refreshes: AtomicUsize,
    upstream_calls: AtomicUsize,
    refresh_delay: Duration,
    fail_refresh: bool,
    user: Option<UserIdentity>,
    illusts: Vec<Illust>,
    last_access_token: Mutex<Option<String>>,
    last_refresh_token: Mutex<Option<String>>,
}

impl FakeApi {
    pub(crate) fn new() -> Self {
        Self {
            refreshes: AtomicUsize::new(0),
            upstream_calls: AtomicUsize::new(0),
            refresh_delay: Duration::ZERO,
            fail_refresh: false,
            user: Some(sample_user()),
            illusts: vec![sample_illust("2"), sample_illust("1")],
            last_access_token: Mutex::new(None),
            last_refresh_token: Mutex::new(None),
        }
    }

    pub(crate) fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub(crate) fn failing_refresh(mut self) -> Self {
        self.fail_refresh = true;
        self
    }

    pub(crate) fn without_user(mut self) -> Self {
        self.user = None;
        self
    }

    pub(crate) fn with_illusts(mut self, illusts: Vec<Illust>) -> Self {
        self.illusts = illusts;
        self
    }

    pub(crate) fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub(crate) fn upstream_calls(&self) -> usize {
        self.upstream_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_access_token(&self) -> Option<String> {
        self.last_access_token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Refresh token presented to the most recent `refresh` call.
    pub(crate) fn last_refresh_token(&self) -> Option<String> {
        self.last_refresh_token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn record_call(&self, access_token: &str) {
        self.upstream_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_access_token
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(access_token.to_string());
    }
}

#[async_trait]
impl PixivApi for FakeApi {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        *self
            .last_refresh_token
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(refresh_token.to_string());
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }
        if self.fail_refresh {
            return Err(AuthError::ExchangeFailed {
                status: 400,
                payload: r#"{"error":"invalid_grant"}"#.to_string(),
            });
        }
        Ok(TokenPair::new(
            format!("fresh-access-{n}"),
            format!("fresh-refresh-{n}"),
            now_unix_seconds() + 3600,
        ))
    }

    async fn user_detail(
        &self,
        access_token: &str,
        _user_id: &str,
        _language: &str,
    ) -> Result<Option<UserIdentity>, ApiError> {
        self.record_call(access_token);
        Ok(self.user.clone())
    }

    async fn user_illusts(
        &self,
        access_token: &str,
        _user_id: &str,
        _language: &str,
    ) -> Result<Vec<Illust>, ApiError> {
        self.record_call(access_token);
        Ok(self.illusts.clone())
    }

    async fn illust_follow(
        &self,
        access_token: &str,
        _language: &str,
    ) -> Result<Vec<Illust>, ApiError> {
        self.record_call(access_token);
        Ok(self.illusts.clone())
    }
}
