//! The service facade the HTTP layer calls into.
//!
//! Composes the broker, executor, and harvester so that every entry point
//! shares one session acquisition path and one error policy: only an
//! exhausted session fails a request, everything else degrades into the
//! response payload.

use crate::backend::ExecutionBackend;
use crate::config::Config;
use crate::error::{ExecutionError, SessionError};
use crate::executor::{ExecutionFault, ExecutionResult, Executor};
use crate::harvest::{ArtifactFailure, HarvestConfig, Harvester, UploadedArtifact};
use crate::session::SessionBroker;
use crate::store::ArtifactStore;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{warn, Instrument};
use uuid::Uuid;

/// Combined result of one execute-and-harvest request. Always carries whatever
/// was actually obtained, even when the execution itself failed.
#[derive(Debug, Serialize)]
pub struct ExecutionOutcome {
    /// Session the code ran in; may differ from the requested identity when
    /// the broker had to replace it.
    pub session_id: String,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub execution_error: Option<ExecutionFault>,
    pub artifacts: Vec<UploadedArtifact>,
    pub artifact_failures: Vec<ArtifactFailure>,
}

#[derive(Debug, Serialize)]
pub struct PauseOutcome {
    /// Identity to resume the session under.
    pub session_id: String,
    pub elapsed_secs: u64,
}

pub struct ExecService {
    broker: SessionBroker,
    executor: Executor,
    harvester: Harvester,
    run_budget: std::time::Duration,
    harvest_budget: std::time::Duration,
}

impl ExecService {
    pub fn new(
        backend: Arc<dyn ExecutionBackend>,
        store: Arc<dyn ArtifactStore>,
        config: &Config,
    ) -> Self {
        Self {
            broker: SessionBroker::new(backend.clone(), config.idle_budget()),
            executor: Executor::new(backend.clone(), config.run_budget()),
            harvester: Harvester::new(
                backend,
                store,
                HarvestConfig {
                    output_dir: config.output_dir.clone(),
                    scan_session_root: config.scan_session_root,
                },
            ),
            run_budget: config.run_budget(),
            harvest_budget: config.harvest_budget(),
        }
    }

    /// Create a fresh session and return its identity.
    pub async fn create_session(&self) -> Result<String, SessionError> {
        Ok(self.broker.acquire(None).await?.handle.id)
    }

    /// Run `code` in a session (preferring `prior` when supplied), then harvest
    /// and upload everything it produced.
    pub async fn execute_and_harvest(
        &self,
        prior: Option<&str>,
        code: &str,
        caller: Option<&str>,
    ) -> Result<ExecutionOutcome, SessionError> {
        let span = tracing::info_span!("execute", request = %Uuid::new_v4());
        self.execute_inner(prior, code, caller).instrument(span).await
    }

    async fn execute_inner(
        &self,
        prior: Option<&str>,
        code: &str,
        caller: Option<&str>,
    ) -> Result<ExecutionOutcome, SessionError> {
        // The harvest headroom sits on top of the run budget: a run that
        // consumes its whole budget must still leave time to collect the
        // files it wrote before timing out.
        let deadline = Instant::now() + self.run_budget + self.harvest_budget;
        let mut acquired = self.broker.acquire(prior).await?;

        let result = match self.executor.run(&acquired.handle, code).await {
            Ok(result) => result,
            Err(ExecutionError::SessionUnusable) => {
                // The session died between acquisition and execution. One
                // re-acquire through the broker, then give up.
                warn!(session = %acquired.handle.id, "session unusable mid-request, re-acquiring");
                acquired = self.broker.acquire(Some(&acquired.handle.id)).await?;
                match self.executor.run(&acquired.handle, code).await {
                    Ok(result) => result,
                    Err(ExecutionError::SessionUnusable) => {
                        return Err(SessionError::Exhausted(format!(
                            "session {} unusable after re-acquisition",
                            acquired.handle.id
                        )));
                    }
                    Err(err) => folded(err),
                }
            }
            Err(err) => folded(err),
        };

        let report = self
            .harvester
            .harvest(&acquired.handle, &result, caller, deadline)
            .await;

        Ok(ExecutionOutcome {
            session_id: acquired.handle.id,
            stdout: result.stdout,
            stderr: result.stderr,
            execution_error: result.execution_error,
            artifacts: report.uploaded,
            artifact_failures: report.failures,
        })
    }

    /// Pause a session so it can be resumed later under the returned identity.
    pub async fn pause_session(&self, id: &str) -> Result<PauseOutcome, SessionError> {
        let acquired = self.broker.acquire(Some(id)).await?;
        let new_id = self.broker.pause(&acquired.handle).await?;
        let elapsed = (Utc::now() - acquired.handle.created_at).num_seconds().max(0) as u64;
        Ok(PauseOutcome { session_id: new_id, elapsed_secs: elapsed })
    }
}

/// Fold a non-retryable execution failure into the result payload so captured
/// output and any produced files are still harvested and returned.
fn folded(err: ExecutionError) -> ExecutionResult {
    match err {
        ExecutionError::Timeout { budget_secs } => ExecutionResult::from_fault(
            "Timeout",
            format!("execution exceeded the {}s budget", budget_secs),
        ),
        ExecutionError::BackendFault(detail) => {
            ExecutionResult::from_fault("BackendFault", detail)
        }
        // SessionUnusable is handled by the retry above.
        ExecutionError::SessionUnusable => {
            ExecutionResult::from_fault("BackendFault", "session unusable".to_string())
        }
    }
}
