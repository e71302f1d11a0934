use thiserror::Error;

/// Failures of the durable stores (record store and blob store).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding tags: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid object key: {0:?}")]
    InvalidKey(String),
    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Fatal outcomes of lookups and of the creation pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("must provide a valid identifier (id or url)")]
    MissingIdentifier,
    #[error("failed to store content at {key}")]
    Content {
        key: String,
        #[source]
        source: StorageError,
    },
    #[error("failed to save article {id}")]
    Save {
        id: String,
        #[source]
        source: StorageError,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Page retrieval failures. Never fatal inside the pipeline.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },
    #[error("reading {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("malformed feed: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed attribute: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("not an RSS or Atom document")]
    UnknownFormat,
    #[error(transparent)]
    Fetch(#[from] FetchError),
}
