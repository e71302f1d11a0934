use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use crate::feed::FeedEntry;
use crate::identity::derive_id;

/// Images stored by the content pipeline itself carry this prefix and are
/// served through the content API instead of linked directly.
pub const STORED_IMAGE_PREFIX: &str = "public/";

/// A blog post ingested from a feed.
///
/// `id` and `url` are fixed at construction; `id` is always
/// `derive_id(url)`. `published` can only become true together with a
/// content URI, see [`Article::publish`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    id: String,
    pub blog_id: String,
    pub title: String,
    url: String,
    published: bool,
    pub published_at: DateTime<Utc>,
    pub author: Option<String>,
    content_uri: Option<String>,
    pub image: Option<String>,
    pub excerpt: String,
    pub tags: Vec<String>,
    version: i64,
    last_changed_at: DateTime<Utc>,
}

impl Article {
    pub fn new(
        blog_id: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let url = url.into();
        Self {
            id: derive_id(&url),
            blog_id: blog_id.into(),
            title: title.into(),
            url,
            published: false,
            published_at: now,
            author: None,
            content_uri: None,
            image: None,
            excerpt: String::new(),
            tags: Vec::new(),
            version: 1,
            last_changed_at: now,
        }
    }

    /// Candidate record for a feed entry. Not yet published or persisted.
    pub fn from_entry(entry: &FeedEntry, blog_id: &str, now: DateTime<Utc>) -> Self {
        let mut article = Self::new(blog_id, entry.url.as_str(), entry.title.as_str(), now);
        article.author = entry.author.clone();
        article.published_at = entry.published.unwrap_or(now);
        article.excerpt = entry.summary.clone().unwrap_or_default();
        article.tags = entry.categories.clone();
        article
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn published(&self) -> bool {
        self.published
    }

    pub fn content_uri(&self) -> Option<&str> {
        self.content_uri.as_deref()
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn last_changed_at(&self) -> DateTime<Utc> {
        self.last_changed_at
    }

    /// `{year}/{month}/{id}`, the storage path of the markdown body
    /// without the `public/` prefix or `.md` suffix.
    pub fn content_key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.published_at.year(),
            self.published_at.month(),
            self.id
        )
    }

    /// Attach the stored content and mark the article published.
    ///
    /// An existing content URI is never replaced.
    pub fn publish(&mut self, content_uri: impl Into<String>) {
        if self.content_uri.is_none() {
            let uri = content_uri.into();
            if !uri.is_empty() {
                self.content_uri = Some(uri);
            }
        }
        self.published = self.content_uri.is_some();
    }

    /// Where a reader should load the thumbnail from.
    pub fn image_src(&self, content_api: &str, size: Option<u32>) -> Option<String> {
        let image = self.image.as_deref()?;
        if !image.starts_with(STORED_IMAGE_PREFIX) {
            return Some(image.to_string());
        }
        let base = format!("{}/image/{}", content_api.trim_end_matches('/'), self.id);
        Some(match size {
            Some(s) => format!("{}?size={}", base, s),
            None => base,
        })
    }

    /// Reapply state loaded from storage.
    pub(crate) fn restore(
        &mut self,
        published: bool,
        content_uri: Option<String>,
        version: i64,
        last_changed_at: DateTime<Utc>,
    ) {
        self.content_uri = content_uri.filter(|uri| !uri.is_empty());
        self.published = published && self.content_uri.is_some();
        self.version = version;
        self.last_changed_at = last_changed_at;
    }
}
