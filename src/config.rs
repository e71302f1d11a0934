use std::path::PathBuf;
use std::time::Duration;

use ::config::builder::DefaultState;
use ::config::{Config, ConfigBuilder, ConfigError, Environment};
use serde::Deserialize;

const ENV_PREFIX: &str = "BLOG_INGEST";

/// Runtime settings. Defaults below, overridden by `BLOG_INGEST_*`
/// environment variables, overridden again by CLI flags.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: PathBuf,
    pub content_root: PathBuf,
    pub content_bucket: String,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    /// Base URL of the content API that serves stored images.
    #[serde(default)]
    pub content_api: Option<String>,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        builder()?
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

fn builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("database", "data/articles.sqlite")?
        .set_default("content_root", "data/content")?
        .set_default("content_bucket", "content")?
        .set_default("fetch_timeout_secs", 30)?
        .set_default(
            "user_agent",
            concat!("blog_ingest/", env!("CARGO_PKG_VERSION")),
        )
}
