//! Client for the sandboxed execution backend.
//!
//! The engine itself (process isolation, interpreter, resource limits) is a
//! black box behind an HTTP API; this module owns the typed surface the rest
//! of the service talks to. [`ExecutionBackend`] is the seam: production uses
//! [`HttpBackend`], tests script their own implementation.

use crate::error::BackendError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One file visible in the session filesystem.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub is_directory: bool,
}

/// Captured output streams of one run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLogs {
    #[serde(default)]
    pub stdout: Vec<String>,
    #[serde(default)]
    pub stderr: Vec<String>,
}

/// One inline result payload as the backend reports it. Image payloads arrive
/// base64-encoded in the field matching their format.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawResult {
    #[serde(default)]
    pub png: Option<String>,
    #[serde(default)]
    pub jpeg: Option<String>,
    #[serde(default)]
    pub svg: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

/// In-sandbox execution failure (an exception raised by the submitted code).
#[derive(Debug, Clone, Deserialize)]
pub struct RawError {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub traceback: Option<String>,
}

/// Everything the backend returns for one run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRun {
    #[serde(default)]
    pub logs: RawLogs,
    #[serde(default)]
    pub results: Vec<RawResult>,
    #[serde(default)]
    pub error: Option<RawError>,
}

/// Contract consumed by the broker, executor, and harvester.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Create a brand-new session and return its backend-assigned identity.
    async fn create(&self) -> Result<String, BackendError>;

    /// Confirm an existing session is live and usable.
    async fn connect(&self, id: &str) -> Result<(), BackendError>;

    /// Attempt to bring a paused or reclaimed-but-recoverable session back.
    async fn resume(&self, id: &str) -> Result<(), BackendError>;

    /// Set or refresh the session's inactivity budget.
    async fn set_idle_budget(&self, id: &str, budget: Duration) -> Result<(), BackendError>;

    /// Run code in the session, blocking up to `budget`.
    async fn run(&self, id: &str, code: &str, budget: Duration) -> Result<RawRun, BackendError>;

    /// List entries directly under `path` in the session filesystem.
    async fn list_files(&self, id: &str, path: &str) -> Result<Vec<FileEntry>, BackendError>;

    /// Read a file's full contents from the session filesystem.
    async fn read_file(&self, id: &str, path: &str) -> Result<Vec<u8>, BackendError>;

    /// Delete a file from the session filesystem.
    async fn delete_file(&self, id: &str, path: &str) -> Result<(), BackendError>;

    /// Pause the session, returning the identity under which it can be resumed.
    async fn pause(&self, id: &str) -> Result<String, BackendError>;
}

#[derive(Deserialize)]
struct SandboxIdResponse {
    sandbox_id: String,
}

#[derive(Serialize)]
struct RunRequest<'a> {
    code: &'a str,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct TimeoutRequest {
    timeout_secs: u64,
}

/// HTTP client for the execution backend's REST API.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_status(status: StatusCode, body: String) -> BackendError {
        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => BackendError::NotFound,
            _ => BackendError::Fault(format!("{}: {}", status, body)),
        }
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(Self::map_status(status, body))
    }

    fn transport(err: reqwest::Error) -> BackendError {
        BackendError::Fault(err.to_string())
    }
}

#[async_trait]
impl ExecutionBackend for HttpBackend {
    async fn create(&self) -> Result<String, BackendError> {
        let resp = self
            .client
            .post(self.url("/sandboxes"))
            .send()
            .await
            .map_err(Self::transport)?;
        let resp = Self::check(resp).await?;
        let body: SandboxIdResponse = resp.json().await.map_err(Self::transport)?;
        Ok(body.sandbox_id)
    }

    async fn connect(&self, id: &str) -> Result<(), BackendError> {
        let resp = self
            .client
            .post(self.url(&format!("/sandboxes/{}/connect", id)))
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(resp).await.map(|_| ())
    }

    async fn resume(&self, id: &str) -> Result<(), BackendError> {
        let resp = self
            .client
            .post(self.url(&format!("/sandboxes/{}/resume", id)))
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(resp).await.map(|_| ())
    }

    async fn set_idle_budget(&self, id: &str, budget: Duration) -> Result<(), BackendError> {
        let resp = self
            .client
            .post(self.url(&format!("/sandboxes/{}/timeout", id)))
            .json(&TimeoutRequest {
                timeout_secs: budget.as_secs(),
            })
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(resp).await.map(|_| ())
    }

    async fn run(&self, id: &str, code: &str, budget: Duration) -> Result<RawRun, BackendError> {
        let budget_secs = budget.as_secs();
        let resp = self
            .client
            .post(self.url(&format!("/sandboxes/{}/code", id)))
            .json(&RunRequest { code, timeout_secs: budget_secs })
            // Give the backend a little slack past the run budget before the
            // transport itself gives up.
            .timeout(budget + Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout { budget_secs }
                } else {
                    Self::transport(e)
                }
            })?;
        let status = resp.status();
        if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
            return Err(BackendError::Timeout { budget_secs });
        }
        let resp = Self::check(resp).await?;
        resp.json().await.map_err(Self::transport)
    }

    async fn list_files(&self, id: &str, path: &str) -> Result<Vec<FileEntry>, BackendError> {
        let resp = self
            .client
            .get(self.url(&format!("/sandboxes/{}/files", id)))
            .query(&[("path", path)])
            .send()
            .await
            .map_err(Self::transport)?;
        let resp = Self::check(resp).await?;
        resp.json().await.map_err(Self::transport)
    }

    async fn read_file(&self, id: &str, path: &str) -> Result<Vec<u8>, BackendError> {
        let resp = self
            .client
            .get(self.url(&format!("/sandboxes/{}/files/content", id)))
            .query(&[("path", path)])
            .send()
            .await
            .map_err(Self::transport)?;
        let resp = Self::check(resp).await?;
        let bytes = resp.bytes().await.map_err(Self::transport)?;
        Ok(bytes.to_vec())
    }

    async fn delete_file(&self, id: &str, path: &str) -> Result<(), BackendError> {
        let resp = self
            .client
            .delete(self.url(&format!("/sandboxes/{}/files", id)))
            .query(&[("path", path)])
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(resp).await.map(|_| ())
    }

    async fn pause(&self, id: &str) -> Result<String, BackendError> {
        let resp = self
            .client
            .post(self.url(&format!("/sandboxes/{}/pause", id)))
            .send()
            .await
            .map_err(Self::transport)?;
        let resp = Self::check(resp).await?;
        let body: SandboxIdResponse = resp.json().await.map_err(Self::transport)?;
        Ok(body.sandbox_id)
    }
}
