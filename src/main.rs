use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use blog_ingest::blob::{ContentBlobStore, FsBlobStore};
use blog_ingest::config::Settings;
use blog_ingest::db::{ArticleStore, Lookup, SqliteArticleStore};
use blog_ingest::fetch::HttpFetcher;
use blog_ingest::{feed, ArticleFactory, FeedEntry};
use clap::{Parser, Subcommand};
use tracing::warn;

#[derive(Parser)]
#[command(name = "blog_ingest", about = "Ingest blog feeds into markdown articles")]
struct Cli {
    /// SQLite database holding article records
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    /// Directory holding content buckets
    #[arg(long, global = true)]
    content_root: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the article table and the content bucket
    Init {
        #[arg(long)]
        bucket: Option<String>,
    },
    /// Create articles for new entries of an RSS/Atom feed (URL or file)
    Ingest {
        feed: String,
        /// Source blog identifier stored on every article
        #[arg(long)]
        blog_id: String,
        /// Content bucket for markdown bodies
        #[arg(long)]
        bucket: Option<String>,
        /// Max entries to consider (default: whole feed)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Print one article as JSON
    Show {
        #[arg(long, conflicts_with = "url")]
        id: Option<String>,
        #[arg(long)]
        url: Option<String>,
        /// Also print the stored markdown body
        #[arg(long)]
        content: bool,
        #[arg(long)]
        bucket: Option<String>,
    },
    /// Show article statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load().context("Failed to load settings")?;
    if let Some(path) = cli.database {
        settings.database = path;
    }
    if let Some(path) = cli.content_root {
        settings.content_root = path;
    }

    let result = match cli.command {
        Commands::Init { bucket } => {
            let store = open_store(&settings)?;
            let bucket = bucket.unwrap_or_else(|| settings.content_bucket.clone());
            let dir = FsBlobStore::new(&settings.content_root).create_bucket(&bucket)?;
            let stats = store.stats()?;
            println!(
                "Database {} ready ({} articles), bucket at {}",
                settings.database.display(),
                stats.total,
                dir.display()
            );
            Ok(())
        }
        Commands::Ingest {
            feed,
            blog_id,
            bucket,
            limit,
        } => {
            let store = open_store(&settings)?;
            let blobs = FsBlobStore::new(&settings.content_root);
            let bucket = bucket.unwrap_or_else(|| settings.content_bucket.clone());
            let fetcher = HttpFetcher::new(&settings.user_agent, settings.fetch_timeout())?;

            let mut entries = feed::fetch_feed(&fetcher, &feed)
                .await
                .with_context(|| format!("Failed to read feed {}", feed))?;
            if let Some(n) = limit {
                entries.truncate(n);
            }
            if entries.is_empty() {
                println!("No entries in feed.");
                return Ok(());
            }

            println!("Ingesting {} entries for blog {}...", entries.len(), blog_id);
            let factory = ArticleFactory::new(&store, &blobs, &fetcher);
            let counts = ingest_entries(&factory, &store, &entries, &blog_id, &bucket).await?;
            counts.print();
            Ok(())
        }
        Commands::Show {
            id,
            url,
            content,
            bucket,
        } => {
            let store = open_store(&settings)?;
            let lookup = Lookup {
                id: id.as_deref(),
                url: url.as_deref(),
            };
            let Some(article) = store.find(lookup)? else {
                println!("No article found.");
                return Ok(());
            };

            println!("{}", serde_json::to_string_pretty(&article)?);
            if let Some(api) = settings.content_api.as_deref() {
                if let Some(src) = article.image_src(api, None) {
                    println!("Image src: {}", src);
                }
            }
            if content {
                let bucket = bucket.unwrap_or_else(|| settings.content_bucket.clone());
                let blobs = FsBlobStore::new(&settings.content_root);
                match article.content_uri() {
                    Some(uri) => match blobs.read(&bucket, &format!("public/{}", uri))? {
                        Some(body) => println!("\n{}", body),
                        None => println!("\nContent missing at public/{}", uri),
                    },
                    None => println!("\nNo content stored."),
                }
            }
            Ok(())
        }
        Commands::Stats => {
            let store = open_store(&settings)?;
            let s = store.stats()?;
            println!("Articles:   {}", s.total);
            println!("Published:  {}", s.published);
            println!("With image: {}", s.with_image);
            println!("Blogs:      {}", s.blogs);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_store(settings: &Settings) -> anyhow::Result<SqliteArticleStore> {
    if let Some(parent) = settings.database.parent() {
        std::fs::create_dir_all(parent)?;
    }
    SqliteArticleStore::open(&settings.database)
        .with_context(|| format!("Failed to open {}", settings.database.display()))
}

struct IngestCounts {
    created: usize,
    skipped: usize,
    failed: usize,
}

impl IngestCounts {
    fn print(&self) {
        println!(
            "Created {} articles, skipped {} existing, {} failed.",
            self.created, self.skipped, self.failed,
        );
    }
}

/// Run the factory over entries not yet stored. A failed entry is logged
/// and left for the next run.
async fn ingest_entries(
    factory: &ArticleFactory<'_>,
    store: &dyn ArticleStore,
    entries: &[FeedEntry],
    blog_id: &str,
    bucket: &str,
) -> anyhow::Result<IngestCounts> {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(entries.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut counts = IngestCounts {
        created: 0,
        skipped: 0,
        failed: 0,
    };

    for entry in entries {
        match store.exists(Lookup::url(&entry.url)) {
            Ok(true) => counts.skipped += 1,
            Ok(false) => match factory.create_from(entry, blog_id, bucket).await {
                Ok(_) => counts.created += 1,
                Err(e) => {
                    warn!("Failed to ingest {}: {:#}", entry.url, anyhow::Error::from(e));
                    counts.failed += 1;
                }
            },
            Err(e) => {
                warn!("Lookup failed for {}: {:#}", entry.url, anyhow::Error::from(e));
                counts.failed += 1;
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
