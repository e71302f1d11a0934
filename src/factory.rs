use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::article::Article;
use crate::blob::ContentBlobStore;
use crate::content::to_markdown;
use crate::db::ArticleStore;
use crate::error::IngestError;
use crate::feed::FeedEntry;
use crate::fetch::PageFetcher;
use crate::image::extract_primary_image;

/// Turns feed entries into stored, published articles.
///
/// Creation either returns a fully persisted article or a single fatal
/// error: a failed content write (nothing saved) or a failed record save
/// (the markdown object stays behind and is overwritten on retry).
/// Image lookup never fails creation. Re-running an entry keeps the stored
/// publication date so the body lands where the record points.
pub struct ArticleFactory<'a> {
    articles: &'a dyn ArticleStore,
    blobs: &'a dyn ContentBlobStore,
    fetcher: &'a dyn PageFetcher,
}

impl<'a> ArticleFactory<'a> {
    pub fn new(
        articles: &'a dyn ArticleStore,
        blobs: &'a dyn ContentBlobStore,
        fetcher: &'a dyn PageFetcher,
    ) -> Self {
        Self {
            articles,
            blobs,
            fetcher,
        }
    }

    pub async fn create_from(
        &self,
        entry: &FeedEntry,
        blog_id: &str,
        content_bucket: &str,
    ) -> Result<Article, IngestError> {
        let mut article = Article::from_entry(entry, blog_id, Utc::now());
        // A stored content_uri never changes, so the body goes back under the
        // key derived from the stored date.
        if let Some(existing) = self.articles.find_by_id(article.id())? {
            article.published_at = existing.published_at;
        }
        let content_key = article.content_key();
        debug!(id = %article.id(), url = %article.url(), "Building article");

        let object_key = format!("public/{}.md", content_key);
        let markdown = to_markdown(&entry.content);
        if let Err(source) = self.blobs.write(content_bucket, &object_key, &markdown) {
            error!(url = %article.url(), key = %object_key, error = %source, "Failed to store content");
            return Err(IngestError::Content {
                key: object_key,
                source,
            });
        }

        article.image = self.main_image(article.url()).await;
        article.publish(format!("{}.md", content_key));

        if let Err(source) = self.articles.save(&mut article) {
            error!(id = %article.id(), error = %source, "Failed to save article");
            return Err(IngestError::Save {
                id: article.id().to_string(),
                source,
            });
        }

        info!(
            id = %article.id(),
            version = article.version(),
            image = article.image.is_some(),
            "Created article: {}",
            article.title
        );
        Ok(article)
    }

    /// Best effort: any fetch failure means no image.
    async fn main_image(&self, url: &str) -> Option<String> {
        match self.fetcher.fetch(url).await {
            Ok(html) => extract_primary_image(&html),
            Err(e) => {
                warn!(url = %url, error = %e, "Could not fetch page for image");
                None
            }
        }
    }
}
