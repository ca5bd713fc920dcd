//! Retrieval of source document bytes

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::FetchError;

/// Anything that can hand back the bytes stored at a location
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch_bytes(&self, location: &str) -> Result<Vec<u8>, FetchError>;
}

#[async_trait]
impl<T: SourceFetcher + ?Sized> SourceFetcher for Arc<T> {
    async fn fetch_bytes(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        (**self).fetch_bytes(location).await
    }
}

/// Plain HTTP(S) GET with a per-request deadline
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch_bytes(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        if !(location.starts_with("http://") || location.starts_with("https://")) {
            return Err(FetchError::InvalidLocation(location.to_string()));
        }
        debug!(location, "fetching source document");

        let response = self
            .client
            .get(location)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                location: location.to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(body.to_vec())
    }
}

/// In-memory fetcher keyed by exact location
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, location: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(location, bytes);
        self
    }

    pub fn insert(&mut self, location: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(location.into(), bytes);
    }
}

#[async_trait]
impl SourceFetcher for MemoryFetcher {
    async fn fetch_bytes(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        self.entries
            .get(location)
            .cloned()
            .ok_or_else(|| FetchError::InvalidLocation(location.to_string()))
    }
}
