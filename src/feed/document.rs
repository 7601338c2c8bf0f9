use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use thiserror::Error;

use crate::pixiv::UserIdentity;

/// Channel-level metadata of a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMeta {
    /// Canonical URL, doubles as the feed id.
    pub id: String,
    pub title: String,
    pub description: String,
    pub author: Option<String>,
    pub link: String,
    pub logo: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub id: String,
    pub title: String,
    pub author: UserIdentity,
    pub published: DateTime<FixedOffset>,
    /// Trusted HTML; every piece of user text in it is already escaped.
    pub html_body: String,
    pub link: String,
    /// Tag names and translations, deduplicated, in first-seen order.
    pub categories: Vec<String>,
}

impl FeedEntry {
    /// `name (account)`, the author line shown by feed readers.
    pub fn author_label(&self) -> String {
        format!("{} ({})", self.author.display_name, self.author.account_name)
    }
}

/// A feed built for one request, entries in upstream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDocument {
    pub channel: ChannelMeta,
    pub entries: Vec<FeedEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Rss,
    Atom,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported feed format: {0:?} (expected \"rss\" or \"atom\")")]
pub struct UnsupportedFormat(pub String);

impl FeedFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            FeedFormat::Rss => "application/rss+xml; charset=utf-8",
            FeedFormat::Atom => "application/atom+xml; charset=utf-8",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeedFormat::Rss => "rss",
            FeedFormat::Atom => "atom",
        }
    }
}

impl FromStr for FeedFormat {
    type Err = UnsupportedFormat;

    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        match kind {
            "rss" => Ok(FeedFormat::Rss),
            "atom" => Ok(FeedFormat::Atom),
            other => Err(UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
