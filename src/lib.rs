//! Blog article ingestion: feed entries in, deduplicated articles with
//! markdown bodies and thumbnails out.

pub mod article;
pub mod blob;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod factory;
pub mod feed;
pub mod fetch;
pub mod identity;
pub mod image;

pub use article::Article;
pub use error::{FeedError, FetchError, IngestError, StorageError};
pub use factory::ArticleFactory;
pub use feed::FeedEntry;
