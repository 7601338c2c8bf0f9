//! Mapping from upstream illustrations to feed documents.
//!
//! Everything here is pure: no I/O, no clock. Page URLs follow the site's
//! locale rules, where the default locale has no path prefix.

use quick_xml::escape::escape;
use url::form_urlencoded;

use super::document::{ChannelMeta, FeedDocument, FeedEntry};
use crate::pixiv::{Illust, UserIdentity};

/// Locale whose pages live at the unprefixed paths.
pub const DEFAULT_LANGUAGE: &str = "jp";

pub const PIXIV_BASE_URL: &str = "https://www.pixiv.net";
pub const FOLLOW_FEED_URL: &str = "https://www.pixiv.net/bookmark_new_illust.php";
pub const LOGO_URL: &str = "https://www.pixiv.net/favicon.ico";

fn format_page_url(section: &str, id: &str, language: Option<&str>) -> String {
    match language {
        Some(lang) if !lang.is_empty() && lang != DEFAULT_LANGUAGE => {
            format!("{PIXIV_BASE_URL}/{lang}/{section}/{id}")
        }
        _ => format!("{PIXIV_BASE_URL}/{section}/{id}"),
    }
}

pub fn format_user_url(id: &str, language: Option<&str>) -> String {
    format_page_url("users", id, language)
}

pub fn format_illust_url(id: &str, language: Option<&str>) -> String {
    format_page_url("artworks", id, language)
}

/// Tag page URL; `name` is percent-encoded as a single path segment.
pub fn format_tag_url(name: &str, language: Option<&str>) -> String {
    // byte_serialize emits '+' for spaces and "%2B" for a literal '+'
    let segment: String = form_urlencoded::byte_serialize(name.as_bytes())
        .collect::<String>()
        .replace('+', "%20");
    format_page_url("tags", &segment, language)
}

/// Point an image URL at the proxy host. Unparseable URLs are kept as-is.
fn proxied_image_url(image: &str, proxy_host: &str) -> String {
    if proxy_host.is_empty() {
        return image.to_string();
    }
    match url::Url::parse(image) {
        Ok(mut url) => {
            if url.set_host(Some(proxy_host)).is_ok() {
                url.to_string()
            } else {
                tracing::debug!(image = image, proxy_host = proxy_host, "Invalid proxy host, image URL left unproxied");
                image.to_string()
            }
        }
        Err(_) => {
            tracing::debug!(image = image, "Image URL left unproxied");
            image.to_string()
        }
    }
}

/// HTML body of an entry: the images, then the caption.
///
/// Tags are not inlined; they become entry categories instead.
pub fn build_illust_body(illust: &Illust, image_proxy_host: &str) -> String {
    let mut body = String::new();

    if !illust.images.is_empty() {
        body.push_str("<p>");
        for image in &illust.images {
            let src = proxied_image_url(image, image_proxy_host);
            body.push_str(&format!("<img src=\"{}\"/>", escape(src.as_str())));
        }
        body.push_str("</p>");
    }

    if !illust.caption.is_empty() {
        body.push_str("<p>");
        body.push_str(&escape(illust.caption.as_str()));
        body.push_str("</p>");
    }

    body
}

fn categories_of(illust: &Illust) -> Vec<String> {
    let mut categories: Vec<String> = Vec::with_capacity(illust.tags.len() * 2);
    let names = illust
        .tags
        .iter()
        .flat_map(|tag| std::iter::once(&tag.name).chain(tag.translated_name.as_ref()));
    for name in names {
        if !categories.iter().any(|c| c == name) {
            categories.push(name.clone());
        }
    }
    categories
}

pub fn build_feed_entry(illust: &Illust, language: Option<&str>, image_proxy_host: &str) -> FeedEntry {
    let url = format_illust_url(&illust.id, language);
    FeedEntry {
        id: url.clone(),
        title: illust.title.clone(),
        author: illust.author.clone(),
        published: illust.created_at,
        html_body: build_illust_body(illust, image_proxy_host),
        link: url,
        categories: categories_of(illust),
    }
}

pub fn build_feed_document(
    channel: ChannelMeta,
    illusts: &[Illust],
    language: Option<&str>,
    image_proxy_host: &str,
) -> FeedDocument {
    let entries = illusts
        .iter()
        .map(|illust| build_feed_entry(illust, language, image_proxy_host))
        .collect();
    FeedDocument { channel, entries }
}

/// Channel for one user's works. A non-empty `display_override` replaces the
/// user's own name in the title.
pub fn user_channel(user: &UserIdentity, display_override: Option<&str>, language: &str) -> ChannelMeta {
    let url = format_user_url(&user.id, Some(language));
    let shown = display_override
        .filter(|name| !name.is_empty())
        .unwrap_or(&user.display_name);
    let title = format!("Pixiv - {shown}");

    ChannelMeta {
        id: url.clone(),
        description: title.clone(),
        title,
        author: Some(user.display_name.clone()),
        link: url,
        logo: LOGO_URL.to_string(),
        language: language.to_string(),
    }
}

/// Channel for the authenticated account's follow timeline.
pub fn follow_channel(username: Option<&str>, language: &str) -> ChannelMeta {
    let title = match username {
        Some(name) => format!("Pixiv - Works by users you're following - {name}"),
        None => "Pixiv - Works by users you're following".to_string(),
    };

    ChannelMeta {
        id: FOLLOW_FEED_URL.to_string(),
        description: title.clone(),
        title,
        author: username.map(str::to_string),
        link: FOLLOW_FEED_URL.to_string(),
        logo: LOGO_URL.to_string(),
        language: language.to_string(),
    }
}
