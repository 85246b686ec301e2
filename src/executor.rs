//! Running submitted code inside an acquired session.

use crate::backend::{ExecutionBackend, RawError, RawResult, RawRun};
use crate::error::{BackendError, ExecutionError};
use crate::session::SessionHandle;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Format of an inline result payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Png,
    Jpeg,
    Svg,
}

impl PayloadKind {
    pub fn extension(self) -> &'static str {
        match self {
            PayloadKind::Png => "png",
            PayloadKind::Jpeg => "jpg",
            PayloadKind::Svg => "svg",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            PayloadKind::Png => "image/png",
            PayloadKind::Jpeg => "image/jpeg",
            PayloadKind::Svg => "image/svg+xml",
        }
    }
}

/// One inline result payload, e.g. a rendered chart. `data` is base64 as the
/// backend delivered it; the harvester decodes it.
#[derive(Debug, Clone)]
pub struct InlinePayload {
    pub kind: PayloadKind,
    pub data: String,
    pub label: Option<String>,
}

/// Execution-level failure raised by the submitted code itself.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionFault {
    pub kind: String,
    pub message: String,
    pub stack_trace: Vec<String>,
}

impl ExecutionFault {
    fn from_raw(raw: RawError) -> Self {
        Self {
            kind: raw.name,
            message: raw.value,
            stack_trace: raw
                .traceback
                .map(|t| t.lines().map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }
}

/// Everything one run produced. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub inline_payloads: Vec<InlinePayload>,
    pub execution_error: Option<ExecutionFault>,
}

impl ExecutionResult {
    /// Result for a run that failed before producing any output, carrying only
    /// the failure description.
    pub fn from_fault(kind: &str, message: String) -> Self {
        Self {
            execution_error: Some(ExecutionFault {
                kind: kind.to_string(),
                message,
                stack_trace: Vec::new(),
            }),
            ..Default::default()
        }
    }
}

fn payload_from_raw(raw: RawResult) -> Option<InlinePayload> {
    let (kind, data) = if let Some(png) = raw.png {
        (PayloadKind::Png, png)
    } else if let Some(jpeg) = raw.jpeg {
        (PayloadKind::Jpeg, jpeg)
    } else if let Some(svg) = raw.svg {
        (PayloadKind::Svg, svg)
    } else {
        return None;
    };
    Some(InlinePayload { kind, data, label: raw.label })
}

/// Thin wrapper over the backend's run call, mapping its failures onto the
/// execution error taxonomy. Retry decisions live in the service layer.
#[derive(Clone)]
pub struct Executor {
    backend: Arc<dyn ExecutionBackend>,
    run_budget: Duration,
}

impl Executor {
    pub fn new(backend: Arc<dyn ExecutionBackend>, run_budget: Duration) -> Self {
        Self { backend, run_budget }
    }

    pub async fn run(
        &self,
        session: &SessionHandle,
        code: &str,
    ) -> Result<ExecutionResult, ExecutionError> {
        let raw = self
            .backend
            .run(&session.id, code, self.run_budget)
            .await
            .map_err(|err| match err {
                BackendError::NotFound => ExecutionError::SessionUnusable,
                BackendError::Timeout { budget_secs } => ExecutionError::Timeout { budget_secs },
                BackendError::Fault(detail) => ExecutionError::BackendFault(detail),
            })?;

        debug!(
            session = %session.id,
            stdout_lines = raw.logs.stdout.len(),
            stderr_lines = raw.logs.stderr.len(),
            results = raw.results.len(),
            "run finished"
        );
        Ok(Self::result_from_raw(raw))
    }

    fn result_from_raw(raw: RawRun) -> ExecutionResult {
        ExecutionResult {
            stdout: raw.logs.stdout,
            stderr: raw.logs.stderr,
            inline_payloads: raw.results.into_iter().filter_map(payload_from_raw).collect(),
            execution_error: raw.error.map(ExecutionFault::from_raw),
        }
    }
}
