use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, info, warn};

use crate::error::{FeedError, FetchError};
use crate::fetch::PageFetcher;

/// One post as published in a feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub url: String,
    pub title: String,
    pub author: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    /// Post body as HTML.
    pub content: String,
    pub categories: Vec<String>,
}

/// Load a feed from an http(s) URL or a local file and parse it.
pub async fn fetch_feed(
    fetcher: &dyn PageFetcher,
    source: &str,
) -> Result<Vec<FeedEntry>, FeedError> {
    info!("Fetching feed: {}", source);
    let xml = if source.starts_with("http://") || source.starts_with("https://") {
        fetcher.fetch(source).await?
    } else {
        tokio::fs::read_to_string(source)
            .await
            .map_err(|source_err| FetchError::File {
                path: source.to_string(),
                source: source_err,
            })?
    };

    let entries = parse_feed(&xml)?;
    info!("Entries in feed: {}", entries.len());
    Ok(entries)
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    Title,
    Link,
    Author,
    Published,
    Updated,
    Summary,
    Content,
    Category,
}

#[derive(Default)]
struct Draft {
    title: Option<String>,
    link: Option<String>,
    author: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<String>,
    content: Option<String>,
    categories: Vec<String>,
}

impl Draft {
    fn set(&mut self, field: Field, value: String) {
        let value = value.trim().to_string();
        if value.is_empty() {
            return;
        }
        match field {
            Field::Title => self.title = Some(value),
            Field::Link => self.link = self.link.take().or(Some(value)),
            Field::Author => self.author = self.author.take().or(Some(value)),
            Field::Published => self.published = Some(value),
            Field::Updated => self.updated = Some(value),
            Field::Summary => self.summary = Some(value),
            Field::Content => self.content = Some(value),
            Field::Category => self.categories.push(value),
        }
    }

    fn finish(self) -> Option<FeedEntry> {
        let url = self.link?;
        let published = self
            .published
            .or(self.updated)
            .and_then(|raw| parse_date(&raw));
        let content = self
            .content
            .or_else(|| self.summary.clone())
            .unwrap_or_default();
        Some(FeedEntry {
            url,
            title: self.title.unwrap_or_default(),
            author: self.author,
            published,
            summary: self.summary,
            content,
            categories: self.categories,
        })
    }
}

fn field_for(name: &[u8]) -> Option<Field> {
    match name {
        b"title" => Some(Field::Title),
        b"link" => Some(Field::Link),
        b"author" | b"name" | b"dc:creator" => Some(Field::Author),
        b"pubDate" | b"published" | b"dc:date" => Some(Field::Published),
        b"updated" => Some(Field::Updated),
        b"description" | b"summary" => Some(Field::Summary),
        b"content:encoded" | b"content" => Some(Field::Content),
        b"category" => Some(Field::Category),
        _ => None,
    }
}

/// Atom links: only `rel="alternate"` (or no rel) points at the post.
fn atom_link(e: &BytesStart) -> Result<Option<String>, FeedError> {
    let rel = match e.try_get_attribute("rel")? {
        Some(attr) => attr.unescape_value()?.into_owned(),
        None => "alternate".to_string(),
    };
    if rel != "alternate" {
        return Ok(None);
    }
    match e.try_get_attribute("href")? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn category_term(e: &BytesStart) -> Result<Option<String>, FeedError> {
    match e.try_get_attribute("term")? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn is_xhtml(e: &BytesStart) -> Result<bool, FeedError> {
    match e.try_get_attribute("type")? {
        Some(attr) => Ok(attr.unescape_value()? == "xhtml"),
        None => Ok(false),
    }
}

/// Inline XHTML content is kept as markup, minus the wrapping `<div>`.
fn xhtml_body(raw: &str) -> String {
    let raw = raw.trim();
    let Some(rest) = raw.strip_prefix("<div") else {
        return raw.to_string();
    };
    if !rest.starts_with(['>', ' ', '\t', '\n', '\r']) {
        return raw.to_string();
    }
    match (rest.find('>'), rest.strip_suffix("</div>")) {
        (Some(open), Some(body)) if open < body.len() => body[open + 1..].to_string(),
        _ => raw.to_string(),
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let parsed = DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .ok()
        .map(|d| d.with_timezone(&Utc));
    if parsed.is_none() {
        debug!(date = raw, "Unparseable entry date");
    }
    parsed
}

/// Parse an RSS 2.0 (or RDF) or Atom document into entries.
///
/// Entries without a link are skipped.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>, FeedError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut entries = Vec::new();
    let mut recognized = false;
    let mut draft: Option<Draft> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"rss" | b"rdf:RDF" | b"feed" => recognized = true,
                b"item" | b"entry" => draft = Some(Draft::default()),
                b"link" if draft.is_some() && e.try_get_attribute("href")?.is_some() => {
                    if let (Some(d), Some(href)) = (draft.as_mut(), atom_link(&e)?) {
                        d.set(Field::Link, href);
                    }
                }
                b"content" | b"summary" if draft.is_some() && field.is_none() && is_xhtml(&e)? => {
                    let name = e.name();
                    let inner = reader.read_text(name)?;
                    if let (Some(d), Some(f)) = (draft.as_mut(), field_for(name.as_ref())) {
                        d.set(f, xhtml_body(&inner));
                    }
                }
                b"category" if draft.is_some() && e.try_get_attribute("term")?.is_some() => {
                    if let (Some(d), Some(term)) = (draft.as_mut(), category_term(&e)?) {
                        d.set(Field::Category, term);
                    }
                }
                name if draft.is_some() && field.is_none() => {
                    if let Some(f) = field_for(name) {
                        field = Some(f);
                        text.clear();
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if let Some(d) = draft.as_mut() {
                    match e.name().as_ref() {
                        b"link" => {
                            if let Some(href) = atom_link(&e)? {
                                d.set(Field::Link, href);
                            }
                        }
                        b"category" => {
                            if let Some(term) = category_term(&e)? {
                                d.set(Field::Category, term);
                            }
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::Text(e)) if field.is_some() => match e.unescape() {
                Ok(t) => text.push_str(&t),
                Err(_) => text.push_str(&String::from_utf8_lossy(&e)),
            },
            Ok(Event::CData(e)) if field.is_some() => {
                text.push_str(&String::from_utf8_lossy(&e));
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"item" | b"entry" => {
                    field = None;
                    if let Some(d) = draft.take() {
                        let title = d.title.clone().unwrap_or_default();
                        match d.finish() {
                            Some(entry) => entries.push(entry),
                            None => warn!(title = %title, "Skipping feed entry without a link"),
                        }
                    }
                }
                name if field.is_some_and(|f| field_for(name) == Some(f)) => {
                    if let (Some(d), Some(f)) = (draft.as_mut(), field.take()) {
                        d.set(f, std::mem::take(&mut text));
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }

    if !recognized {
        return Err(FeedError::UnknownFormat);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;

    use super::*;
    use crate::fetch::HttpFetcher;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.xml", name)).unwrap()
    }

    #[test]
    fn rss_items() {
        let entries = parse_feed(&fixture("rss")).unwrap();
        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        assert_eq!(first.url, "https://blog.example.com/2023/05/understanding-ownership");
        assert_eq!(first.title, "Understanding Ownership");
        assert_eq!(first.author.as_deref(), Some("Jordan Lee"));
        assert_eq!(
            first.published,
            Some(Utc.with_ymd_and_hms(2023, 5, 16, 9, 30, 0).unwrap())
        );
        assert_eq!(first.categories, vec!["rust", "memory"]);
        assert_eq!(
            first.summary.as_deref(),
            Some("A tour of moves, borrows & lifetimes.")
        );
        assert!(first.content.starts_with("<h1>Understanding Ownership</h1>"));
    }

    #[test]
    fn rss_content_falls_back_to_description() {
        let entries = parse_feed(&fixture("rss")).unwrap();
        let second = &entries[1];
        assert_eq!(second.content, "<p>Three things shipped.</p>");
        assert_eq!(second.author.as_deref(), Some("team@example.com (Release Team)"));
        assert_eq!(
            second.published,
            Some(Utc.with_ymd_and_hms(2023, 4, 29, 0, 0, 0).unwrap())
        );
        assert!(second.categories.is_empty());
    }

    #[test]
    fn atom_entries() {
        let entries = parse_feed(&fixture("atom")).unwrap();
        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        assert_eq!(first.url, "https://another.example.org/2023/06/borrowing");
        assert_eq!(first.title, "Borrowing in practice");
        assert_eq!(first.author.as_deref(), Some("Sam Rivera"));
        assert_eq!(
            first.published,
            Some(Utc.with_ymd_and_hms(2023, 6, 1, 8, 15, 0).unwrap())
        );
        assert_eq!(first.categories, vec!["rust", "borrowing"]);
        assert_eq!(first.summary.as_deref(), Some("Shared and mutable references."));
        assert_eq!(first.content, "<p>References let you <em>borrow</em>.</p>");
    }

    #[test]
    fn atom_updated_when_unpublished() {
        let entries = parse_feed(&fixture("atom")).unwrap();
        let second = &entries[1];
        assert_eq!(second.url, "https://another.example.org/2023/01/updated-only");
        assert_eq!(
            second.published,
            Some(Utc.with_ymd_and_hms(2023, 1, 9, 22, 0, 0).unwrap())
        );
        assert_eq!(second.author, None);
        assert_eq!(second.summary, None);
    }

    #[test]
    fn atom_xhtml_content_keeps_markup() {
        let entries = parse_feed(&fixture("atom_xhtml")).unwrap();
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(
            entry.content,
            r#"<h1>Head</h1><p>Para <a href="https://l">link</a></p><ul><li>one</li><li>two</li></ul>"#
        );
        assert_eq!(entry.summary.as_deref(), Some("Short <em>and</em> sweet."));
        assert_eq!(entry.categories, vec!["markup"]);

        let markdown = crate::content::to_markdown(&entry.content);
        assert!(markdown.contains("Head"), "{markdown}");
        assert!(markdown.contains("[link](https://l)"), "{markdown}");
    }

    #[test]
    fn xhtml_wrapper() {
        assert_eq!(xhtml_body(r#"<div xmlns="x"><p>a</p></div>"#), "<p>a</p>");
        assert_eq!(xhtml_body("<div><p>a</p></div>"), "<p>a</p>");
        assert_eq!(xhtml_body("<p>a</p>"), "<p>a</p>");
        assert_eq!(xhtml_body("<divider/>"), "<divider/>");
    }

    #[test]
    fn unknown_document() {
        let err = parse_feed("<html><body>nope</body></html>").unwrap_err();
        assert!(matches!(err, FeedError::UnknownFormat));
    }

    #[test]
    fn malformed_xml() {
        assert!(parse_feed("<rss><channel><item></channel></rss>").is_err());
    }

    #[test]
    fn bad_date_left_unset() {
        let xml = r#"<rss><channel><item>
            <link>https://x/1</link><pubDate>sometime last week</pubDate>
        </item></channel></rss>"#;
        let entries = parse_feed(xml).unwrap();
        assert_eq!(entries[0].published, None);
        assert_eq!(entries[0].title, "");
    }

    #[tokio::test]
    async fn feed_from_file() {
        let fetcher = HttpFetcher::new("blog_ingest-test", Duration::from_secs(1)).unwrap();
        let entries = fetch_feed(&fetcher, "tests/fixtures/atom.xml").await.unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn missing_feed_file() {
        let fetcher = HttpFetcher::new("blog_ingest-test", Duration::from_secs(1)).unwrap();
        let err = fetch_feed(&fetcher, "tests/fixtures/nope.xml").await.unwrap_err();
        assert!(matches!(err, FeedError::Fetch(FetchError::File { .. })));
    }
}
