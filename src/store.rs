//! Object storage for harvested artifacts.

use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// Durable storage for named byte buffers. A repeat `put` with the same name
/// overwrites; collision-free naming is the caller's job.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist `bytes` under `external_name` and return a retrievable URL.
    async fn put(
        &self,
        external_name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError>;
}

/// S3-compatible store: `PUT {endpoint}/{bucket}/{prefix}/{name}`.
#[derive(Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    prefix: String,
}

impl HttpObjectStore {
    pub fn new(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    fn object_url(&self, external_name: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.endpoint, self.bucket, self.prefix, external_name
        )
    }
}

#[async_trait]
impl ArtifactStore for HttpObjectStore {
    async fn put(
        &self,
        external_name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError> {
        let url = self.object_url(external_name);
        let resp = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| StorageError::Transient(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            debug!(name = external_name, size = bytes.len(), "uploaded artifact");
            return Ok(url);
        }
        let detail = format!("{}: {}", status, resp.text().await.unwrap_or_default());
        if status.is_server_error() {
            Err(StorageError::Transient(detail))
        } else {
            Err(StorageError::Permanent(detail))
        }
    }
}

/// In-process store keyed by external name. Used by tests and local runs.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of everything stored, in no particular order.
    pub async fn names(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }

    pub async fn get(&self, external_name: &str) -> Option<Vec<u8>> {
        self.objects.lock().await.get(external_name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.lock().await.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn put(
        &self,
        external_name: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<String, StorageError> {
        self.objects
            .lock()
            .await
            .insert(external_name.to_string(), bytes.to_vec());
        Ok(format!("memory://{}", external_name))
    }
}
