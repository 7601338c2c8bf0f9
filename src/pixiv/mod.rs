//! pixiv app-API binding.
//!
//! [`PixivApi`] is the capability seam the session layer decorates;
//! [`AppApiClient`] is its HTTP implementation. Responses are mapped into the
//! domain types in [`models`] at this boundary.

mod client;
pub mod models;

pub use client::{ApiError, AppApiClient, PixivApi, APP_API_URL};
pub use models::{Illust, Tag, UserIdentity};
