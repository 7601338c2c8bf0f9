//! Integration tests for the feed server: token cache on disk, refresh against
//! a mock token endpoint, app API calls against a mock upstream.
//!
//! Each test gets its own mock server, token file and listener on an
//! ephemeral port.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pixiv_feed::auth::TokenEndpoint;
use pixiv_feed::pixiv::AppApiClient;
use pixiv_feed::server::router;
use pixiv_feed::service::{FeedService, ServiceSettings};
use pixiv_feed::session::SessionClient;
use pixiv_feed::storage::{FileTokenStore, TokenStore};
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER_BODY: &str = r#"{"user": {"id": 7, "name": "Artist", "account": "artist_acct"}}"#;

const ILLUSTS_BODY: &str = r#"{
    "illusts": [
        {
            "id": 42, "title": "Cat", "caption": "<b>hi</b>", "create_date": "2023-05-01T12:00:00+09:00",
            "user": {"id": 7, "name": "Artist", "account": "artist_acct"},
            "tags": [{"name": "cat", "translated_name": "猫"}],
            "meta_single_page": {"original_image_url": "https://i.pximg.net/img-original/img/42_p0.png"},
            "meta_pages": []
        }
    ],
    "next_url": null
}"#;

const REFRESH_BODY: &str = r#"{
    "access_token": "fresh-access",
    "refresh_token": "fresh-refresh",
    "expires_in": 3600,
    "user": {"id": "7"}
}"#;

fn token_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "pixiv_feed_server_test_{}_{}",
        name,
        std::process::id()
    ));
    std::fs::remove_dir_all(&dir).ok();
    dir
}

fn write_token(dir: &Path, expiry: i64) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join("token.json");
    std::fs::write(
        &path,
        format!(
            r#"{{"access_token":"stale-access","refresh_token":"old-refresh","expiry":{expiry},"user_id":"7"}}"#
        ),
    )
    .unwrap();
    path
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Start the server against `upstream` and return its base URL.
async fn spawn_server(upstream: &MockServer, token_path: PathBuf) -> String {
    let endpoint = TokenEndpoint::new(reqwest::Client::new())
        .with_url(format!("{}/auth/token", upstream.uri()));
    let api = AppApiClient::new(reqwest::Client::new())
        .with_base_url(upstream.uri())
        .with_token_endpoint(endpoint);
    let store: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(token_path));
    let service = Arc::new(FeedService::new(
        SessionClient::new(api, store),
        ServiceSettings::default(),
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(service)).await.unwrap();
    });
    format!("http://{addr}")
}

async fn mount_refresh(upstream: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=old-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_string(REFRESH_BODY))
        .expect(expected_calls)
        .mount(upstream)
        .await;
}

async fn mount_user_api(upstream: &MockServer, bearer: &str) {
    Mock::given(method("GET"))
        .and(path("/v1/user/detail"))
        .and(query_param("user_id", "7"))
        .and(header("authorization", format!("Bearer {bearer}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string(USER_BODY))
        .mount(upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/user/illusts"))
        .and(header("authorization", format!("Bearer {bearer}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string(ILLUSTS_BODY))
        .mount(upstream)
        .await;
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_expired_token_is_refreshed_and_feed_served() {
    let upstream = MockServer::start().await;
    mount_refresh(&upstream, 1).await;
    mount_user_api(&upstream, "fresh-access").await;

    let dir = token_dir("refresh");
    let token_path = write_token(&dir, now() - 60);
    let base = spawn_server(&upstream, token_path.clone()).await;

    let response = reqwest::get(format!("{base}/illust/rss?id=7")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "application/rss+xml; charset=utf-8"
    );

    let body = response.text().await.unwrap();
    let feed = feed_rs::parser::parse(body.as_bytes()).unwrap();
    assert_eq!(feed.title.unwrap().content, "Pixiv - Artist");
    assert_eq!(feed.entries.len(), 1);
    let entry = &feed.entries[0];
    assert_eq!(entry.links[0].href, "https://www.pixiv.net/artworks/42");
    let terms: Vec<&str> = entry.categories.iter().map(|c| c.term.as_str()).collect();
    assert_eq!(terms, vec!["cat", "猫"]);

    // The refreshed pair is on disk
    let saved = std::fs::read_to_string(&token_path).unwrap();
    assert!(saved.contains(r#""access_token":"fresh-access""#));
    assert!(saved.contains(r#""refresh_token":"fresh-refresh""#));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_valid_token_skips_refresh() {
    let upstream = MockServer::start().await;
    mount_refresh(&upstream, 0).await;
    mount_user_api(&upstream, "stale-access").await;

    let dir = token_dir("valid");
    let token_path = write_token(&dir, now() + 3600);
    let base = spawn_server(&upstream, token_path).await;

    let response = reqwest::get(format!("{base}/illust/atom?id=7&lang=en&name=Nick"))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body = response.text().await.unwrap();
    let feed = feed_rs::parser::parse(body.as_bytes()).unwrap();
    assert_eq!(feed.title.unwrap().content, "Pixiv - Nick");
    assert_eq!(feed.entries[0].id, "https://www.pixiv.net/en/artworks/42");
    let content = feed.entries[0]
        .content
        .as_ref()
        .and_then(|c| c.body.clone())
        .unwrap();
    assert!(content.contains("https://i.pixiv.re/img-original/img/42_p0.png"));
    assert!(content.contains("&lt;b&gt;hi&lt;/b&gt;"));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_follow_feed() {
    let upstream = MockServer::start().await;
    mount_refresh(&upstream, 0).await;
    mount_user_api(&upstream, "stale-access").await;
    Mock::given(method("GET"))
        .and(path("/v2/illust/follow"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ILLUSTS_BODY))
        .expect(1)
        .mount(&upstream)
        .await;

    let dir = token_dir("follow");
    let base = spawn_server(&upstream, write_token(&dir, now() + 3600)).await;

    let response = reqwest::get(format!("{base}/new_illust/atom")).await.unwrap();
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("Pixiv - Works by users you&apos;re following - Artist")
        || body.contains("Pixiv - Works by users you're following - Artist"));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_concurrent_requests_share_one_refresh() {
    let upstream = MockServer::start().await;
    mount_refresh(&upstream, 1).await;
    mount_user_api(&upstream, "fresh-access").await;

    let dir = token_dir("concurrent");
    let base = spawn_server(&upstream, write_token(&dir, now() - 60)).await;

    let client = reqwest::Client::new();
    let requests = (0..5).map(|_| client.get(format!("{base}/illust/rss?id=7")).send());
    let responses = futures::future::join_all(requests).await;
    for response in responses {
        assert_eq!(response.unwrap().status(), 200);
    }

    // MockServer verifies `expect(1)` on drop
    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_health() {
    let upstream = MockServer::start().await;
    let dir = token_dir("health");
    let base = spawn_server(&upstream, dir.join("token.json")).await;

    let response = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
}

// ============================================================================
// Error mapping
// ============================================================================

#[tokio::test]
async fn test_unsupported_kind_is_bad_request_without_upstream_call() {
    let upstream = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&upstream)
        .await;

    let dir = token_dir("xml");
    let base = spawn_server(&upstream, write_token(&dir, now() - 60)).await;

    let response = reqwest::get(format!("{base}/illust/xml?id=7")).await.unwrap();
    assert_eq!(response.status(), 400);
    assert!(response.text().await.unwrap().contains("xml"));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_malformed_language_is_bad_request_without_upstream_call() {
    let upstream = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&upstream)
        .await;

    let dir = token_dir("bad_lang");
    let base = spawn_server(&upstream, write_token(&dir, now() + 3600)).await;

    for lang in ["en%0Ax", "..%2Fadmin", "en%20us"] {
        let response = reqwest::get(format!("{base}/illust/rss?id=7&lang={lang}"))
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "lang={lang}");

        let response = reqwest::get(format!("{base}/new_illust/atom?lang={lang}"))
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "lang={lang}");
    }

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_missing_id_is_bad_request() {
    let upstream = MockServer::start().await;
    let dir = token_dir("missing_id");
    let base = spawn_server(&upstream, write_token(&dir, now() + 3600)).await;

    let response = reqwest::get(format!("{base}/illust/rss")).await.unwrap();
    assert_eq!(response.status(), 400);

    let response = reqwest::get(format!("{base}/illust/rss?id=")).await.unwrap();
    assert_eq!(response.status(), 400);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_missing_token_cache_is_unauthorized() {
    let upstream = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&upstream)
        .await;

    let dir = token_dir("logged_out");
    let base = spawn_server(&upstream, dir.join("token.json")).await;

    let response = reqwest::get(format!("{base}/new_illust/rss")).await.unwrap();
    assert_eq!(response.status(), 401);
    assert!(response.text().await.unwrap().contains("pixiv-feed login"));
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/user/detail"))
        .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"error": {}}"#))
        .mount(&upstream)
        .await;

    let dir = token_dir("unknown_user");
    let base = spawn_server(&upstream, write_token(&dir, now() + 3600)).await;

    let response = reqwest::get(format!("{base}/illust/rss?id=999")).await.unwrap();
    assert_eq!(response.status(), 404);
    assert!(response.text().await.unwrap().contains("999"));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_rejected_refresh_is_bad_gateway_and_keeps_cache() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#),
        )
        .mount(&upstream)
        .await;

    let dir = token_dir("revoked");
    let token_path = write_token(&dir, now() - 60);
    let before = std::fs::read_to_string(&token_path).unwrap();
    let base = spawn_server(&upstream, token_path.clone()).await;

    let response = reqwest::get(format!("{base}/illust/rss?id=7")).await.unwrap();
    assert_eq!(response.status(), 502);
    assert!(response.text().await.unwrap().contains("pixiv-feed login"));
    assert_eq!(std::fs::read_to_string(&token_path).unwrap(), before);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_upstream_failure_is_bad_gateway() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&upstream)
        .await;

    let dir = token_dir("upstream_down");
    let base = spawn_server(&upstream, write_token(&dir, now() + 3600)).await;

    let response = reqwest::get(format!("{base}/illust/rss?id=7")).await.unwrap();
    assert_eq!(response.status(), 502);

    std::fs::remove_dir_all(&dir).ok();
}
