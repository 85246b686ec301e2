//! Scripted execution backend and storage doubles shared by the integration
//! tests.
#![allow(dead_code)]

use async_trait::async_trait;
use harvestd::backend::{ExecutionBackend, FileEntry, RawRun};
use harvestd::error::{BackendError, StorageError};
use harvestd::store::ArtifactStore;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Scripted outcome for one `run` call.
pub enum RunScript {
    Ok(RawRun),
    NotFound,
    Timeout(u64),
    /// Sleep for `sleep_ms` of real time, then time out, like a run that
    /// consumed its whole budget.
    SleepTimeout { sleep_ms: u64, budget_secs: u64 },
    Fault(String),
}

#[derive(Default)]
struct State {
    next_id: u32,
    /// Sessions `connect` succeeds for.
    live: HashSet<String>,
    /// Sessions `resume` succeeds for (they become live).
    resumable: HashSet<String>,
    /// Session filesystem, keyed by absolute path.
    files: HashMap<String, Vec<u8>>,
    runs: VecDeque<RunScript>,
    fail_create: bool,
    budget_calls: Vec<(String, u64)>,
    deleted: Vec<String>,
}

/// In-memory execution backend with scripted run outcomes.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<State>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session `connect` will succeed for.
    pub fn add_live(&self, id: &str) {
        self.state.lock().unwrap().live.insert(id.to_string());
    }

    /// Register a session `resume` (but not `connect`) will succeed for.
    pub fn add_resumable(&self, id: &str) {
        self.state.lock().unwrap().resumable.insert(id.to_string());
    }

    pub fn add_file(&self, path: &str, bytes: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), bytes.to_vec());
    }

    pub fn push_run(&self, script: RunScript) {
        self.state.lock().unwrap().runs.push_back(script);
    }

    pub fn fail_create(&self) {
        self.state.lock().unwrap().fail_create = true;
    }

    pub fn deleted_paths(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn remaining_files(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.state.lock().unwrap().files.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn budget_calls(&self) -> Vec<(String, u64)> {
        self.state.lock().unwrap().budget_calls.clone()
    }
}

fn parent_of(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) => "/",
        Some((parent, _)) => parent,
        None => "/",
    }
}

#[async_trait]
impl ExecutionBackend for FakeBackend {
    async fn create(&self) -> Result<String, BackendError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create {
            return Err(BackendError::Fault("backend at capacity".to_string()));
        }
        state.next_id += 1;
        let id = format!("sbx-{}", state.next_id);
        state.live.insert(id.clone());
        Ok(id)
    }

    async fn connect(&self, id: &str) -> Result<(), BackendError> {
        if self.state.lock().unwrap().live.contains(id) {
            Ok(())
        } else {
            Err(BackendError::NotFound)
        }
    }

    async fn resume(&self, id: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if state.resumable.remove(id) {
            state.live.insert(id.to_string());
            Ok(())
        } else {
            Err(BackendError::NotFound)
        }
    }

    async fn set_idle_budget(&self, id: &str, budget: Duration) -> Result<(), BackendError> {
        self.state
            .lock()
            .unwrap()
            .budget_calls
            .push((id.to_string(), budget.as_secs()));
        Ok(())
    }

    async fn run(&self, id: &str, _code: &str, _budget: Duration) -> Result<RawRun, BackendError> {
        if !self.state.lock().unwrap().live.contains(id) {
            return Err(BackendError::NotFound);
        }
        let script = self.state.lock().unwrap().runs.pop_front();
        match script {
            None => Ok(RawRun::default()),
            Some(RunScript::Ok(run)) => Ok(run),
            Some(RunScript::NotFound) => Err(BackendError::NotFound),
            Some(RunScript::Timeout(budget_secs)) => Err(BackendError::Timeout { budget_secs }),
            Some(RunScript::SleepTimeout { sleep_ms, budget_secs }) => {
                tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
                Err(BackendError::Timeout { budget_secs })
            }
            Some(RunScript::Fault(detail)) => Err(BackendError::Fault(detail)),
        }
    }

    async fn list_files(&self, _id: &str, path: &str) -> Result<Vec<FileEntry>, BackendError> {
        let state = self.state.lock().unwrap();
        let mut entries: Vec<FileEntry> = state
            .files
            .keys()
            .filter(|p| parent_of(p) == path)
            .map(|p| FileEntry {
                name: p.rsplit('/').next().unwrap_or(p).to_string(),
                path: p.clone(),
                is_directory: false,
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn read_file(&self, _id: &str, path: &str) -> Result<Vec<u8>, BackendError> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| BackendError::Fault(format!("no such file: {}", path)))
    }

    async fn delete_file(&self, _id: &str, path: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        state.files.remove(path);
        state.deleted.push(path.to_string());
        Ok(())
    }

    async fn pause(&self, id: &str) -> Result<String, BackendError> {
        let mut state = self.state.lock().unwrap();
        if !state.live.remove(id) {
            return Err(BackendError::NotFound);
        }
        let paused = format!("{}-paused", id);
        state.resumable.insert(paused.clone());
        Ok(paused)
    }
}

/// Store that rejects uploads whose external name contains a marker substring.
pub struct FailingStore {
    pub inner: harvestd::store::MemoryStore,
    pub reject_containing: String,
}

#[async_trait]
impl ArtifactStore for FailingStore {
    async fn put(
        &self,
        external_name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError> {
        if external_name.contains(&self.reject_containing) {
            return Err(StorageError::Transient("injected upload failure".to_string()));
        }
        self.inner.put(external_name, bytes, content_type).await
    }
}

/// Handle for tests that drive the harvester directly.
pub fn handle(id: &str) -> harvestd::session::SessionHandle {
    harvestd::session::SessionHandle {
        id: id.to_string(),
        created_at: chrono::Utc::now(),
        idle_budget: Duration::from_secs(600),
    }
}

/// A minimal but valid-looking zip container prefix.
pub fn zip_bytes(tail: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0x50, 0x4B, 0x03, 0x04];
    bytes.extend_from_slice(tail);
    bytes
}
