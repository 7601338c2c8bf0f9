//! RSS 2.0 and Atom 1.0 serialization of a [`FeedDocument`].

use std::io::Cursor;

use chrono::Utc;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use thiserror::Error;

use super::document::{FeedDocument, FeedEntry, FeedFormat};

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const GENERATOR: &str = "pixiv-feed";

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Failed to write feed XML: {0}")]
    Xml(#[from] std::io::Error),
    #[error("Generated feed contains invalid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

type XmlWriter = Writer<Cursor<Vec<u8>>>;

pub fn write_feed(doc: &FeedDocument, format: FeedFormat) -> Result<String, WriteError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    match format {
        FeedFormat::Rss => write_rss(&mut writer, doc)?,
        FeedFormat::Atom => write_atom(&mut writer, doc)?,
    }

    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

fn start(writer: &mut XmlWriter, element: BytesStart<'_>) -> std::io::Result<()> {
    writer.write_event(Event::Start(element))
}

fn end(writer: &mut XmlWriter, name: &str) -> std::io::Result<()> {
    writer.write_event(Event::End(BytesEnd::new(name)))
}

/// `<name attrs...>text</name>`; the text is escaped on write.
fn text_element(
    writer: &mut XmlWriter,
    name: &str,
    attrs: &[(&str, &str)],
    text: &str,
) -> std::io::Result<()> {
    let mut element = BytesStart::new(name);
    for attr in attrs {
        element.push_attribute(*attr);
    }
    start(writer, element)?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    end(writer, name)
}

fn empty_element(writer: &mut XmlWriter, name: &str, attrs: &[(&str, &str)]) -> std::io::Result<()> {
    let mut element = BytesStart::new(name);
    for attr in attrs {
        element.push_attribute(*attr);
    }
    writer.write_event(Event::Empty(element))
}

// ============================================================================
// RSS 2.0
// ============================================================================

fn write_rss(writer: &mut XmlWriter, doc: &FeedDocument) -> std::io::Result<()> {
    let channel = &doc.channel;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    start(writer, rss)?;
    start(writer, BytesStart::new("channel"))?;

    text_element(writer, "title", &[], &channel.title)?;
    text_element(writer, "link", &[], &channel.link)?;
    text_element(writer, "description", &[], &channel.description)?;
    text_element(writer, "language", &[], &channel.language)?;
    text_element(writer, "generator", &[], GENERATOR)?;

    start(writer, BytesStart::new("image"))?;
    text_element(writer, "url", &[], &channel.logo)?;
    text_element(writer, "title", &[], &channel.title)?;
    text_element(writer, "link", &[], &channel.link)?;
    end(writer, "image")?;

    if let Some(newest) = doc.entries.iter().map(|e| e.published).max() {
        text_element(writer, "lastBuildDate", &[], &newest.to_rfc2822())?;
    }

    for entry in &doc.entries {
        write_rss_item(writer, entry)?;
    }

    end(writer, "channel")?;
    end(writer, "rss")
}

fn write_rss_item(writer: &mut XmlWriter, entry: &FeedEntry) -> std::io::Result<()> {
    start(writer, BytesStart::new("item"))?;
    text_element(writer, "title", &[], &entry.title)?;
    text_element(writer, "link", &[], &entry.link)?;
    text_element(writer, "guid", &[("isPermaLink", "true")], &entry.id)?;
    text_element(writer, "pubDate", &[], &entry.published.to_rfc2822())?;
    text_element(writer, "author", &[], &entry.author_label())?;
    for category in &entry.categories {
        text_element(writer, "category", &[], category)?;
    }
    text_element(writer, "description", &[], &entry.html_body)?;
    end(writer, "item")
}

// ============================================================================
// Atom 1.0
// ============================================================================

fn write_atom(writer: &mut XmlWriter, doc: &FeedDocument) -> std::io::Result<()> {
    let channel = &doc.channel;

    let mut feed = BytesStart::new("feed");
    feed.push_attribute(("xmlns", ATOM_NS));
    feed.push_attribute(("xml:lang", channel.language.as_str()));
    start(writer, feed)?;

    text_element(writer, "id", &[], &channel.id)?;
    text_element(writer, "title", &[], &channel.title)?;
    text_element(writer, "subtitle", &[], &channel.description)?;
    if let Some(ref author) = channel.author {
        start(writer, BytesStart::new("author"))?;
        text_element(writer, "name", &[], author)?;
        end(writer, "author")?;
    }
    empty_element(writer, "link", &[("rel", "alternate"), ("href", channel.link.as_str())])?;
    text_element(writer, "logo", &[], &channel.logo)?;
    text_element(writer, "generator", &[], GENERATOR)?;

    let updated = match doc.entries.iter().map(|e| e.published).max() {
        Some(newest) => newest.to_rfc3339(),
        None => Utc::now().to_rfc3339(),
    };
    text_element(writer, "updated", &[], &updated)?;

    for entry in &doc.entries {
        write_atom_entry(writer, entry)?;
    }

    end(writer, "feed")
}

fn write_atom_entry(writer: &mut XmlWriter, entry: &FeedEntry) -> std::io::Result<()> {
    let published = entry.published.to_rfc3339();

    start(writer, BytesStart::new("entry"))?;
    text_element(writer, "id", &[], &entry.id)?;
    text_element(writer, "title", &[], &entry.title)?;
    start(writer, BytesStart::new("author"))?;
    text_element(writer, "name", &[], &entry.author_label())?;
    end(writer, "author")?;
    text_element(writer, "published", &[], &published)?;
    text_element(writer, "updated", &[], &published)?;
    empty_element(writer, "link", &[("rel", "alternate"), ("href", entry.link.as_str())])?;
    for category in &entry.categories {
        empty_element(writer, "category", &[("term", category.as_str())])?;
    }
    text_element(writer, "content", &[("type", "html")], &entry.html_body)?;
    end(writer, "entry")
}
