//! Object storage for original images and face thumbnails.
//!
//! The engine only needs `get` and `put`; the real backing store (S3
//! or similar) lives outside this crate. `LocalStore` is the shipped
//! filesystem implementation used by the worker and by tests.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("store error: {0}")]
    Other(#[from] anyhow::Error),
}

pub trait ObjectStore: Send + Sync {
    /// Fetch an object's bytes by key.
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Store bytes under a key, returning the key actually used.
    /// `content_type` is advisory; backends that don't track it may
    /// ignore it.
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String, StoreError>;
}

/// Filesystem-backed object store rooted at a directory. Keys are
/// relative paths below the root.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ObjectStore for LocalStore {
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(StoreError::Other(
                anyhow::Error::new(e).context(format!("failed to read object {key}")),
            )),
        }
    }

    fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<String, StoreError> {
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory for {key}"))
                .map_err(StoreError::Other)?;
        }
        fs::write(&path, bytes)
            .with_context(|| format!("failed to write object {key}"))
            .map_err(StoreError::Other)?;
        Ok(key.to_string())
    }
}
