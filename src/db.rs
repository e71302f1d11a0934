use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::article::Article;
use crate::error::{IngestError, StorageError};
use crate::identity::derive_id;

/// Identifies an article by id, by url, or both. The url wins when both
/// are given since the id is derived from it anyway.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lookup<'a> {
    pub id: Option<&'a str>,
    pub url: Option<&'a str>,
}

impl<'a> Lookup<'a> {
    pub fn id(id: &'a str) -> Self {
        Self { id: Some(id), url: None }
    }

    pub fn url(url: &'a str) -> Self {
        Self { id: None, url: Some(url) }
    }

    fn resolve(&self) -> Result<String, IngestError> {
        match (self.url, self.id) {
            (Some(url), _) => Ok(derive_id(url)),
            (None, Some(id)) => Ok(id.to_string()),
            (None, None) => Err(IngestError::MissingIdentifier),
        }
    }
}

/// Record store for articles.
pub trait ArticleStore: Send + Sync {
    fn find_by_id(&self, id: &str) -> Result<Option<Article>, StorageError>;

    /// Upsert. Bumps the stored version, stamps `last_changed_at`, and
    /// writes both back into `article`.
    fn save(&self, article: &mut Article) -> Result<(), StorageError>;

    fn find_by_url(&self, url: &str) -> Result<Option<Article>, StorageError> {
        self.find_by_id(&derive_id(url))
    }

    fn find(&self, lookup: Lookup<'_>) -> Result<Option<Article>, IngestError> {
        let id = lookup.resolve()?;
        Ok(self.find_by_id(&id)?)
    }

    fn exists(&self, lookup: Lookup<'_>) -> Result<bool, IngestError> {
        Ok(self.find(lookup)?.is_some())
    }
}

pub struct Stats {
    pub total: usize,
    pub published: usize,
    pub with_image: usize,
    pub blogs: usize,
}

pub struct SqliteArticleStore {
    conn: Mutex<Connection>,
}

impl SqliteArticleStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn stats(&self) -> Result<Stats, StorageError> {
        get_stats(&self.conn())
    }
}

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS articles (
            id              TEXT PRIMARY KEY,
            blog_id         TEXT NOT NULL,
            title           TEXT NOT NULL,
            url             TEXT NOT NULL,
            published       BOOLEAN NOT NULL DEFAULT 0,
            published_at    TEXT NOT NULL,
            author          TEXT,
            content_uri     TEXT,
            image           TEXT,
            excerpt         TEXT NOT NULL DEFAULT '',
            tags            TEXT NOT NULL DEFAULT '[]',
            version         INTEGER NOT NULL DEFAULT 1,
            last_changed_at INTEGER NOT NULL,
            CHECK (published = 0 OR (content_uri IS NOT NULL AND content_uri != ''))
        );
        CREATE INDEX IF NOT EXISTS idx_articles_blog ON articles(blog_id);
        CREATE INDEX IF NOT EXISTS idx_articles_changed ON articles(last_changed_at);
        ",
    )?;
    Ok(())
}

const SELECT_ARTICLE: &str = "SELECT id, blog_id, title, url, published, published_at, author,
            content_uri, image, excerpt, tags, version, last_changed_at
     FROM articles WHERE id = ?1";

struct ArticleRow {
    id: String,
    blog_id: String,
    title: String,
    url: String,
    published: bool,
    published_at: DateTime<Utc>,
    author: Option<String>,
    content_uri: Option<String>,
    image: Option<String>,
    excerpt: String,
    tags: String,
    version: i64,
    last_changed_at: i64,
}

impl ArticleRow {
    fn into_article(self) -> Result<Article, StorageError> {
        let corrupt = |reason: String| StorageError::Corrupt {
            id: self.id.clone(),
            reason,
        };
        if derive_id(&self.url) != self.id {
            return Err(corrupt(format!("id does not match url {}", self.url)));
        }
        let tags: Vec<String> = serde_json::from_str(&self.tags)
            .map_err(|e| corrupt(format!("tags: {}", e)))?;
        let last_changed_at = DateTime::from_timestamp_millis(self.last_changed_at)
            .ok_or_else(|| corrupt(format!("last_changed_at {}", self.last_changed_at)))?;

        let mut article = Article::new(self.blog_id, self.url, self.title, self.published_at);
        article.author = self.author;
        article.image = self.image;
        article.excerpt = self.excerpt;
        article.tags = tags;
        article.restore(self.published, self.content_uri, self.version, last_changed_at);
        Ok(article)
    }
}

pub fn fetch_article(conn: &Connection, id: &str) -> Result<Option<Article>, StorageError> {
    let row = conn
        .query_row(SELECT_ARTICLE, [id], |row| {
            Ok(ArticleRow {
                id: row.get(0)?,
                blog_id: row.get(1)?,
                title: row.get(2)?,
                url: row.get(3)?,
                published: row.get(4)?,
                published_at: row.get(5)?,
                author: row.get(6)?,
                content_uri: row.get(7)?,
                image: row.get(8)?,
                excerpt: row.get(9)?,
                tags: row.get(10)?,
                version: row.get(11)?,
                last_changed_at: row.get(12)?,
            })
        })
        .optional()?;
    row.map(ArticleRow::into_article).transpose()
}

/// Single-statement upsert. Concurrent saves of one id serialize in SQLite;
/// the last writer's fields win, the version still counts every write, and
/// an existing content_uri is never replaced. The stored publication state
/// is written back into `article`.
pub fn upsert_article(conn: &Connection, article: &mut Article) -> Result<(), StorageError> {
    let now = Utc::now().trunc_subsecs(3);
    let tags = serde_json::to_string(&article.tags)?;
    let (version, content_uri, published): (i64, Option<String>, bool) = conn.query_row(
        "INSERT INTO articles
         (id, blog_id, title, url, published, published_at, author, content_uri,
          image, excerpt, tags, version, last_changed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
         ON CONFLICT(id) DO UPDATE SET
            blog_id         = excluded.blog_id,
            title           = excluded.title,
            published       = excluded.published OR articles.published,
            published_at    = excluded.published_at,
            author          = excluded.author,
            content_uri     = COALESCE(articles.content_uri, excluded.content_uri),
            image           = excluded.image,
            excerpt         = excluded.excerpt,
            tags            = excluded.tags,
            version         = articles.version + 1,
            last_changed_at = excluded.last_changed_at
         RETURNING version, content_uri, published",
        rusqlite::params![
            article.id(),
            article.blog_id,
            article.title,
            article.url(),
            article.published(),
            article.published_at,
            article.author,
            article.content_uri(),
            article.image,
            article.excerpt,
            tags,
            article.version(),
            now.timestamp_millis(),
        ],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    article.restore(published, content_uri, version, now);
    Ok(())
}

impl ArticleStore for SqliteArticleStore {
    fn find_by_id(&self, id: &str) -> Result<Option<Article>, StorageError> {
        fetch_article(&self.conn(), id)
    }

    fn save(&self, article: &mut Article) -> Result<(), StorageError> {
        upsert_article(&self.conn(), article)
    }
}

// ── Stats ──

pub fn get_stats(conn: &Connection) -> Result<Stats, StorageError> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM articles", [], |r| r.get(0))?;
    let published: usize = conn.query_row(
        "SELECT COUNT(*) FROM articles WHERE published = 1",
        [],
        |r| r.get(0),
    )?;
    let with_image: usize = conn.query_row(
        "SELECT COUNT(*) FROM articles WHERE image IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let blogs: usize = conn.query_row(
        "SELECT COUNT(DISTINCT blog_id) FROM articles",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        total,
        published,
        with_image,
        blogs,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn article(url: &str) -> Article {
        let mut a = Article::new(
            "eng-blog",
            url,
            "Understanding Ownership",
            Utc.with_ymd_and_hms(2023, 5, 16, 9, 30, 0).unwrap(),
        );
        a.author = Some("Jordan Lee".into());
        a.tags = vec!["rust".into(), "memory".into()];
        a
    }

    #[test]
    fn save_and_find() {
        let store = SqliteArticleStore::open_in_memory().unwrap();
        let mut a = article("https://blog.example.com/a");
        a.publish("2023/5/a.md");
        store.save(&mut a).unwrap();
        assert_eq!(a.version(), 1);

        let found = store.find_by_id(a.id()).unwrap().unwrap();
        assert_eq!(found.url(), "https://blog.example.com/a");
        assert_eq!(found.tags, vec!["rust", "memory"]);
        assert_eq!(found.published_at, a.published_at);
        assert_eq!(found.content_uri(), Some("2023/5/a.md"));
        assert!(found.published());
        assert_eq!(found.version(), 1);
        assert_eq!(found.last_changed_at(), a.last_changed_at());
    }

    #[test]
    fn find_by_url_uses_derived_id() {
        let store = SqliteArticleStore::open_in_memory().unwrap();
        let mut a = article("https://blog.example.com/b");
        store.save(&mut a).unwrap();
        let found = store.find_by_url("https://blog.example.com/b").unwrap().unwrap();
        assert_eq!(found.id(), derive_id("https://blog.example.com/b"));
        assert!(store.find_by_url("https://blog.example.com/b/").unwrap().is_none());
    }

    #[test]
    fn exists_by_id_or_url() {
        let store = SqliteArticleStore::open_in_memory().unwrap();
        let mut a = article("https://blog.example.com/c");
        store.save(&mut a).unwrap();

        assert!(store.exists(Lookup::url("https://blog.example.com/c")).unwrap());
        assert!(store.exists(Lookup::id(a.id())).unwrap());
        assert!(!store.exists(Lookup::id("0000")).unwrap());
        // url takes precedence over a stale id
        let both = Lookup {
            id: Some("0000"),
            url: Some("https://blog.example.com/c"),
        };
        assert!(store.exists(both).unwrap());
    }

    #[test]
    fn lookup_needs_an_identifier() {
        let store = SqliteArticleStore::open_in_memory().unwrap();
        let err = store.find(Lookup::default()).unwrap_err();
        assert!(matches!(err, IngestError::MissingIdentifier));
        assert!(store.exists(Lookup::default()).is_err());
    }

    #[test]
    fn version_increases_on_every_save() {
        let store = SqliteArticleStore::open_in_memory().unwrap();
        let mut a = article("https://blog.example.com/d");
        store.save(&mut a).unwrap();
        let first_changed = a.last_changed_at();

        a.title = "Retitled".into();
        store.save(&mut a).unwrap();
        assert_eq!(a.version(), 2);

        // A stale copy still moves the version forward.
        let mut stale = article("https://blog.example.com/d");
        store.save(&mut stale).unwrap();
        assert_eq!(stale.version(), 3);

        let found = store.find_by_id(a.id()).unwrap().unwrap();
        assert_eq!(found.version(), 3);
        assert_eq!(found.title, "Understanding Ownership");
        assert!(found.last_changed_at() >= first_changed);
    }

    #[test]
    fn content_uri_survives_resave() {
        let store = SqliteArticleStore::open_in_memory().unwrap();
        let mut a = article("https://blog.example.com/e");
        a.publish("2023/5/e.md");
        store.save(&mut a).unwrap();

        let mut bare = article("https://blog.example.com/e");
        store.save(&mut bare).unwrap();

        assert_eq!(bare.content_uri(), Some("2023/5/e.md"));
        assert!(bare.published());
        let found = store.find_by_id(a.id()).unwrap().unwrap();
        assert_eq!(found.content_uri(), Some("2023/5/e.md"));
        assert!(found.published());
    }

    #[test]
    fn corrupt_row_rejected() {
        let store = SqliteArticleStore::open_in_memory().unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO articles (id, blog_id, title, url, published_at, last_changed_at)
                 VALUES ('not-the-hash', 'b', 't', 'https://x/y', '2023-05-01 00:00:00+00:00', 0)",
                [],
            )
            .unwrap();
        let err = store.find_by_id("not-the-hash").unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[test]
    fn published_requires_content_uri_in_schema() {
        let store = SqliteArticleStore::open_in_memory().unwrap();
        let result = store.conn().execute(
            "INSERT INTO articles (id, blog_id, title, url, published, published_at, last_changed_at)
             VALUES ('x', 'b', 't', 'https://x/y', 1, '2023-05-01 00:00:00+00:00', 0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn stats_counts() {
        let store = SqliteArticleStore::open_in_memory().unwrap();
        let mut a = article("https://blog.example.com/f");
        a.publish("2023/5/f.md");
        a.image = Some("https://cdn/f.png".into());
        store.save(&mut a).unwrap();
        let mut b = article("https://blog.example.com/g");
        b.blog_id = "other".into();
        store.save(&mut b).unwrap();

        let s = store.stats().unwrap();
        assert_eq!(s.total, 2);
        assert_eq!(s.published, 1);
        assert_eq!(s.with_image, 1);
        assert_eq!(s.blogs, 2);
    }

    #[test]
    fn file_backed_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.sqlite");
        {
            let store = SqliteArticleStore::open(&path).unwrap();
            let mut a = article("https://blog.example.com/h");
            store.save(&mut a).unwrap();
        }
        let store = SqliteArticleStore::open(&path).unwrap();
        assert!(store.find_by_url("https://blog.example.com/h").unwrap().is_some());
    }
}
