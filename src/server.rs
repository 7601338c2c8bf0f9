//! HTTP surface: feed routes over [`FeedService`].
//!
//! ```text
//! GET /illust/{rss|atom}?id=&lang=&name=   works of one user
//! GET /new_illust/{rss|atom}?lang=         follow timeline of the account
//! GET /health                              liveness
//! ```

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::pixiv::PixivApi;
use crate::service::{FeedError, FeedService, RenderedFeed, UserFeedRequest};

#[derive(Debug, Deserialize)]
struct UserFeedQuery {
    id: Option<String>,
    lang: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FollowFeedQuery {
    lang: Option<String>,
}

pub fn router<A: PixivApi + 'static>(service: Arc<FeedService<A>>) -> Router {
    Router::new()
        .route("/illust/:kind", get(user_feed::<A>))
        .route("/new_illust/:kind", get(follow_feed::<A>))
        .route("/health", get(health))
        .layer(middleware::from_fn(trace_request))
        .with_state(service)
}

/// Serve until Ctrl-C.
pub async fn serve<A: PixivApi + 'static>(
    listener: tokio::net::TcpListener,
    service: Arc<FeedService<A>>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(addr = %addr, "Serving feeds");
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn trace_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Handled request"
    );
    response
}

async fn health() -> &'static str {
    "ok"
}

async fn user_feed<A: PixivApi>(
    State(service): State<Arc<FeedService<A>>>,
    Path(kind): Path<String>,
    Query(query): Query<UserFeedQuery>,
) -> Result<RenderedFeed, Response> {
    let Some(id) = query.id.filter(|id| !id.trim().is_empty()) else {
        return Err((StatusCode::BAD_REQUEST, "Missing required query parameter: id").into_response());
    };
    let request = UserFeedRequest {
        id,
        lang: query.lang,
        name: query.name,
    };

    service
        .user_feed(&kind, &request)
        .await
        .map_err(IntoResponse::into_response)
}

async fn follow_feed<A: PixivApi>(
    State(service): State<Arc<FeedService<A>>>,
    Path(kind): Path<String>,
    Query(query): Query<FollowFeedQuery>,
) -> Result<RenderedFeed, FeedError> {
    service.follow_feed(&kind, query.lang.as_deref()).await
}

impl IntoResponse for RenderedFeed {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, self.content_type())], self.body).into_response()
    }
}

impl FeedError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            FeedError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            FeedError::UpstreamUserNotFound(_) => StatusCode::NOT_FOUND,
            FeedError::UnsupportedFeedFormat(_) | FeedError::InvalidLanguage(_) => {
                StatusCode::BAD_REQUEST
            }
            FeedError::RefreshFailed(_) | FeedError::Upstream(_) => StatusCode::BAD_GATEWAY,
            FeedError::Store(_) | FeedError::Write(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for FeedError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Feed request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "Feed request rejected");
        }
        (status, self.to_string()).into_response()
    }
}
