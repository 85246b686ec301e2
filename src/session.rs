//! Session acquisition: the connect, resume, recreate chain.
//!
//! Execution backends reclaim idle sessions, so a caller-supplied identity is
//! a soft hint. The broker turns any starting point (no identity, a live one,
//! a stale one) into a usable session, replacing the identity only when the
//! old one cannot be brought back. Callers therefore never implement their own
//! retry or resume logic.

use crate::backend::ExecutionBackend;
use crate::error::{BackendError, SessionError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A live execution session's identity and declared inactivity budget.
#[derive(Debug, Clone, Serialize)]
pub struct SessionHandle {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub idle_budget: Duration,
}

/// How the broker ended up with a usable session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// No prior identity; a fresh session was created.
    Created,
    /// The supplied identity was live.
    Connected,
    /// The supplied identity was stale but resumed; identity preserved.
    Resumed,
    /// Resume failed; a brand-new session replaced the supplied identity.
    Replaced,
}

/// A usable session plus how it was obtained.
#[derive(Debug, Clone)]
pub struct Acquired {
    pub handle: SessionHandle,
    pub outcome: Acquisition,
}

/// Lifecycle state machine over the execution backend. Owns every
/// create/resume/replace decision in the service.
#[derive(Clone)]
pub struct SessionBroker {
    backend: Arc<dyn ExecutionBackend>,
    idle_budget: Duration,
}

impl SessionBroker {
    pub fn new(backend: Arc<dyn ExecutionBackend>, idle_budget: Duration) -> Self {
        Self { backend, idle_budget }
    }

    /// Yield a usable session, preferring the prior identity when supplied.
    ///
    /// Fails only when connect, resume, and recreate have all failed.
    pub async fn acquire(&self, prior: Option<&str>) -> Result<Acquired, SessionError> {
        let Some(id) = prior else {
            let handle = self.create().await?;
            info!(session = %handle.id, "created new session");
            return Ok(Acquired { handle, outcome: Acquisition::Created });
        };

        match self.backend.connect(id).await {
            Ok(()) => {
                let handle = self.refreshed(id.to_string()).await;
                info!(session = %id, "connected to existing session");
                Ok(Acquired { handle, outcome: Acquisition::Connected })
            }
            Err(err) => {
                warn!(session = %id, error = %err, "connect failed, session stale");
                self.recover(id).await
            }
        }
    }

    /// Stale identity: try to resume it, then fall back to a new session.
    async fn recover(&self, id: &str) -> Result<Acquired, SessionError> {
        match self.backend.resume(id).await {
            Ok(()) => {
                let handle = self.refreshed(id.to_string()).await;
                info!(session = %id, "resumed stale session");
                Ok(Acquired { handle, outcome: Acquisition::Resumed })
            }
            Err(err) => {
                warn!(session = %id, error = %err, "resume failed, replacing session");
                let handle = self.create().await?;
                info!(old = %id, new = %handle.id, "replaced stale session");
                Ok(Acquired { handle, outcome: Acquisition::Replaced })
            }
        }
    }

    async fn create(&self) -> Result<SessionHandle, SessionError> {
        let id = self
            .backend
            .create()
            .await
            .map_err(|e| SessionError::Exhausted(format!("create failed: {}", e)))?;
        Ok(self.refreshed(id).await)
    }

    /// Build a handle and push the idle budget to the backend. A budget refresh
    /// failing is not worth losing a usable session over.
    async fn refreshed(&self, id: String) -> SessionHandle {
        if let Err(err) = self.backend.set_idle_budget(&id, self.idle_budget).await {
            warn!(session = %id, error = %err, "failed to refresh idle budget");
        }
        SessionHandle {
            id,
            created_at: Utc::now(),
            idle_budget: self.idle_budget,
        }
    }

    /// Pause a session, returning the identity to resume it under later.
    pub async fn pause(&self, handle: &SessionHandle) -> Result<String, SessionError> {
        match self.backend.pause(&handle.id).await {
            Ok(new_id) => {
                info!(session = %handle.id, paused_as = %new_id, "paused session");
                Ok(new_id)
            }
            Err(BackendError::NotFound) => Err(SessionError::Exhausted(format!(
                "session {} vanished before pause",
                handle.id
            ))),
            Err(err) => Err(SessionError::Exhausted(format!("pause failed: {}", err))),
        }
    }
}
