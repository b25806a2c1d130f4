//! Key-value stores holding Zarr metadata documents and chunks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::trace;

use crate::error::IoError;
use crate::io::{classify_s3_error, collect_body, file_error, S3Location};

/// Read access to a Zarr hierarchy by relative key, e.g. `"0/.zarray"` or
/// `"0/0.0.1.0.0"`.
///
/// A missing key is `Ok(None)`, not an error: Zarr leaves chunks made only
/// of fill values unwritten.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, IoError>;

    fn identifier(&self) -> &str;
}

// =============================================================================
// Local directory
// =============================================================================

/// A Zarr hierarchy in a local directory.
pub struct FileSystemStore {
    root: PathBuf,
    identifier: String,
}

impl FileSystemStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let identifier = format!("file://{}", root.display());
        Self { root, identifier }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ChunkStore for FileSystemStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, IoError> {
        let path = self.root.join(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!(key, "missing Zarr key");
                Ok(None)
            }
            Err(e) => Err(file_error(&path, e)),
        }
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// In memory
// =============================================================================

/// A Zarr hierarchy held in memory. Counts lookups.
#[derive(Default)]
pub struct MemoryStore {
    entries: HashMap<String, Bytes>,
    gets: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Bytes>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.insert(key, value);
        self
    }

    /// Number of `get` calls served so far.
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, IoError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.get(key).cloned())
    }

    fn identifier(&self) -> &str {
        "memory://"
    }
}

// =============================================================================
// S3
// =============================================================================

/// A Zarr hierarchy under an S3 prefix. One GET per key.
pub struct S3Store {
    client: Client,
    location: S3Location,
    identifier: String,
}

impl S3Store {
    pub fn new(client: Client, location: S3Location) -> Self {
        let identifier = location.to_string();
        Self {
            client,
            location,
            identifier,
        }
    }
}

#[async_trait]
impl ChunkStore for S3Store {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, IoError> {
        let object_key = self.location.join(key);
        let resp = self
            .client
            .get_object()
            .bucket(&self.location.bucket)
            .key(&object_key)
            .send()
            .await;

        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                if missing {
                    return Ok(None);
                }
                return match classify_s3_error(e.to_string(), &object_key) {
                    IoError::NotFound(_) => Ok(None),
                    other => Err(other),
                };
            }
        };

        Ok(Some(collect_body(resp.body).await?))
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
