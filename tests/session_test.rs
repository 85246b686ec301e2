mod support;

use harvestd::error::SessionError;
use harvestd::session::{Acquisition, SessionBroker};
use std::sync::Arc;
use std::time::Duration;
use support::FakeBackend;

const IDLE_BUDGET: Duration = Duration::from_secs(600);

fn broker(backend: &Arc<FakeBackend>) -> SessionBroker {
    SessionBroker::new(backend.clone(), IDLE_BUDGET)
}

#[tokio::test]
async fn no_prior_identity_creates_a_fresh_connected_session() {
    let backend = Arc::new(FakeBackend::new());
    let acquired = broker(&backend).acquire(None).await.unwrap();

    assert_eq!(acquired.outcome, Acquisition::Created);
    assert_eq!(acquired.handle.id, "sbx-1");
    assert_eq!(acquired.handle.idle_budget, IDLE_BUDGET);
}

#[tokio::test]
async fn live_identity_connects_and_keeps_its_identity() {
    let backend = Arc::new(FakeBackend::new());
    backend.add_live("sess-a");

    let acquired = broker(&backend).acquire(Some("sess-a")).await.unwrap();

    assert_eq!(acquired.outcome, Acquisition::Connected);
    assert_eq!(acquired.handle.id, "sess-a");
}

#[tokio::test]
async fn stale_identity_is_resumed_with_identity_preserved() {
    let backend = Arc::new(FakeBackend::new());
    backend.add_resumable("sess-b");

    let acquired = broker(&backend).acquire(Some("sess-b")).await.unwrap();

    assert_eq!(acquired.outcome, Acquisition::Resumed);
    assert_eq!(acquired.handle.id, "sess-b");
}

#[tokio::test]
async fn unrecoverable_identity_is_replaced_with_a_new_session() {
    let backend = Arc::new(FakeBackend::new());

    let acquired = broker(&backend).acquire(Some("ghost")).await.unwrap();

    assert_eq!(acquired.outcome, Acquisition::Replaced);
    assert_ne!(acquired.handle.id, "ghost");
    assert!(acquired.handle.id.starts_with("sbx-"));
}

#[tokio::test]
async fn failure_to_recreate_is_exhaustion() {
    let backend = Arc::new(FakeBackend::new());
    backend.fail_create();

    let err = broker(&backend).acquire(Some("ghost")).await.unwrap_err();
    assert!(matches!(err, SessionError::Exhausted(_)));
}

#[tokio::test]
async fn every_acquisition_refreshes_the_idle_budget() {
    let backend = Arc::new(FakeBackend::new());
    backend.add_live("sess-c");
    let broker = broker(&backend);

    broker.acquire(None).await.unwrap();
    broker.acquire(Some("sess-c")).await.unwrap();

    let calls = backend.budget_calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|(_, secs)| *secs == IDLE_BUDGET.as_secs()));
}

#[tokio::test]
async fn paused_session_can_be_acquired_under_its_new_identity() {
    let backend = Arc::new(FakeBackend::new());
    let broker = broker(&backend);

    let acquired = broker.acquire(None).await.unwrap();
    let paused_id = broker.pause(&acquired.handle).await.unwrap();
    assert_ne!(paused_id, acquired.handle.id);

    let reacquired = broker.acquire(Some(&paused_id)).await.unwrap();
    assert_eq!(reacquired.outcome, Acquisition::Resumed);
    assert_eq!(reacquired.handle.id, paused_id);
}
