//! Local filesystem blob store
//!
//! Blobs live under the data dir and are served back at `/blobs/<key>`.
//! Stored URLs point at this server, so the source fetcher reads them
//! straight from disk and only goes over HTTP for foreign URLs.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use docsign_core::{BlobStore, CompletionError, FetchError, HttpFetcher, SourceFetcher, StoredBlob};

pub const BLOB_ROUTE: &str = "/blobs";

#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    url_prefix: String,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf, public_base_url: &str) -> Self {
        Self {
            root,
            url_prefix: format!("{}{}/", public_base_url.trim_end_matches('/'), BLOB_ROUTE),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}{}", self.url_prefix, key)
    }

    /// The key behind a URL this store handed out
    pub fn key_for_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        url.strip_prefix(self.url_prefix.as_str())
    }

    /// Resolve a key to a path below the root. Keys are relative, slash
    /// separated and may not climb out of the root.
    fn path_for(&self, key: &str) -> Option<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        safe.then(|| self.root.join(relative))
    }

    pub async fn write(&self, key: &str, bytes: &[u8]) -> std::io::Result<StoredBlob> {
        let path = self.path_for(key).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("bad blob key: {}", key))
        })?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(key, size = bytes.len(), "stored blob");
        Ok(StoredBlob {
            key: key.to_string(),
            url: self.url_for(key),
        })
    }

    pub async fn read(&self, key: &str) -> std::io::Result<Vec<u8>> {
        let path = self.path_for(key).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("bad blob key: {}", key))
        })?;
        tokio::fs::read(path).await
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<StoredBlob, CompletionError> {
        self.write(key, &bytes)
            .await
            .map_err(|e| CompletionError::Upload(e.to_string()))
    }
}

/// Reads our own blob URLs from disk, everything else over HTTP
pub struct BlobFetcher {
    local: Arc<LocalBlobStore>,
    http: HttpFetcher,
}

impl BlobFetcher {
    pub fn new(local: Arc<LocalBlobStore>, http: HttpFetcher) -> Self {
        Self { local, http }
    }
}

#[async_trait]
impl SourceFetcher for BlobFetcher {
    async fn fetch_bytes(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        match self.local.key_for_url(location) {
            Some(key) => self
                .local
                .read(key)
                .await
                .map_err(|e| FetchError::Io(format!("{}: {}", key, e))),
            None => self.http.fetch_bytes(location).await,
        }
    }
}
