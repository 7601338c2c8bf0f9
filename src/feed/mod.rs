//! Feed synthesis: upstream illustrations in, RSS/Atom documents out.
//!
//! - [`builder`] - pure mapping from [`Illust`](crate::pixiv::Illust) to feed entries,
//!   including locale-aware page URLs and the HTML entry body
//! - [`document`] - the format-neutral feed model
//! - [`writer`] - RSS 2.0 / Atom 1.0 serialization with `quick-xml`
//!
//! # Example
//!
//! ```ignore
//! let channel = user_channel(&user, None, "en");
//! let doc = build_feed_document(channel, &illusts, Some("en"), "i.pixiv.re");
//! let xml = write_feed(&doc, FeedFormat::Atom)?;
//! ```

pub mod builder;
mod document;
mod writer;

pub use builder::{
    build_feed_document, build_feed_entry, build_illust_body, follow_channel, format_illust_url,
    format_tag_url, format_user_url, user_channel, DEFAULT_LANGUAGE,
};
pub use document::{ChannelMeta, FeedDocument, FeedEntry, FeedFormat, UnsupportedFormat};
pub use writer::{write_feed, WriteError};
