use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::StorageError;

/// Durable object storage for article bodies.
///
/// `write` is all-or-nothing: after an error no object is visible at the key.
pub trait ContentBlobStore: Send + Sync {
    fn write(&self, bucket: &str, key: &str, content: &str) -> Result<(), StorageError>;
    fn read(&self, bucket: &str, key: &str) -> Result<Option<String>, StorageError>;
}

/// Buckets as directories under a root, keys as relative paths inside them.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn create_bucket(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        let dir = self.root.join(checked_segment(bucket)?);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        let key_path = Path::new(key);
        let valid = !key.is_empty()
            && key_path
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(checked_segment(bucket)?).join(key_path))
    }
}

fn checked_segment(bucket: &str) -> Result<&str, StorageError> {
    let mut components = Path::new(bucket).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(bucket),
        _ => Err(StorageError::InvalidKey(bucket.to_string())),
    }
}

impl ContentBlobStore for FsBlobStore {
    fn write(&self, bucket: &str, key: &str, content: &str) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Stage beside the target so the rename stays on one filesystem.
        let staging = path.with_extension("partial");
        if let Err(e) = fs::write(&staging, content).and_then(|_| fs::rename(&staging, &path)) {
            let _ = fs::remove_file(&staging);
            return Err(e.into());
        }
        debug!(bucket, key, bytes = content.len(), "Stored object");
        Ok(())
    }

    fn read(&self, bucket: &str, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.object_path(bucket, key)?;
        match fs::read_to_string(path) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
