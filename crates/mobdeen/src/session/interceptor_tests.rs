// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::error::RefreshError;
use crate::session::scheduler::SystemClock;
use crate::session::{RefreshTrigger, Session, SessionEvent, SessionManager};
use crate::test_support::{forge_token, test_session, FixedClock, MockBackend, RecordingNavigator};

const NOW_MS: u64 = 1_700_000_000_000;
const NOW_SECS: u64 = NOW_MS / 1000;

async fn setup() -> anyhow::Result<(MockBackend, Arc<SessionManager>, Arc<RecordingNavigator>)> {
    let backend = MockBackend::start().await?;
    let (manager, nav) =
        test_session(&backend.url(), Arc::new(SystemClock), Duration::from_secs(60));
    manager.store().save(&Session {
        access_token: Some("A1".to_owned()),
        refresh_token: Some("R1".to_owned()),
        user_id: Some("42".to_owned()),
        user_role: Some("adult".to_owned()),
    });
    Ok((backend, manager, nav))
}

fn spawn_recoveries(
    manager: &Arc<SessionManager>,
    n: usize,
    epoch: u64,
) -> JoinSet<Result<String, RefreshError>> {
    let mut set = JoinSet::new();
    for _ in 0..n {
        let manager = Arc::clone(manager);
        set.spawn(async move { manager.coordinator().recover(epoch).await });
    }
    set
}

#[tokio::test]
async fn concurrent_failures_share_one_refresh() -> anyhow::Result<()> {
    let (backend, manager, nav) = setup().await?;
    backend.set_refresh_delay(Duration::from_millis(200));

    let mut set = spawn_recoveries(&manager, 5, 0);
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(manager.coordinator().is_refreshing());
    assert_eq!(manager.coordinator().queued(), 5);

    while let Some(result) = set.join_next().await {
        assert_eq!(result?, Ok("A2".to_owned()));
    }
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(nav.redirects(), 0);
    assert_eq!(manager.store().refresh_token().as_deref(), Some("R2"));
    Ok(())
}

#[tokio::test]
async fn flag_and_queue_reset_after_each_cycle() -> anyhow::Result<()> {
    let (backend, manager, _nav) = setup().await?;
    backend.set_refresh_delay(Duration::from_millis(50));

    let mut set = spawn_recoveries(&manager, 3, 0);
    while let Some(result) = set.join_next().await {
        assert!(result?.is_ok());
    }
    let coordinator = manager.coordinator();
    assert!(!coordinator.is_refreshing());
    assert_eq!(coordinator.queued(), 0);
    assert_eq!(coordinator.epoch(), 1);

    // The next cycle starts a fresh exchange with the rotated refresh token.
    assert_eq!(coordinator.recover(1).await, Ok("A2".to_owned()));
    assert_eq!(backend.refresh_calls(), 2);
    assert_eq!(
        backend.calls_to("/api/v1/users/refresh"),
        vec![Some("R1".to_owned()), Some("R2".to_owned())]
    );
    Ok(())
}

#[tokio::test]
async fn failed_refresh_rejects_all_and_terminates_once() -> anyhow::Result<()> {
    let (backend, manager, nav) = setup().await?;
    backend.set_refresh_pair(None);
    backend.set_refresh_delay(Duration::from_millis(100));
    let mut rx = manager.subscribe();

    let mut set = spawn_recoveries(&manager, 4, 0);
    while let Some(result) = set.join_next().await {
        match result? {
            Err(RefreshError::Rejected { status: 401, .. }) => {}
            other => anyhow::bail!("expected rejection, got {other:?}"),
        }
    }

    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(nav.redirects(), 1);
    assert_eq!(manager.store().read(), Session::default());

    let mut terminations = 0;
    while let Ok(event) = rx.try_recv() {
        if event == SessionEvent::Terminated {
            terminations += 1;
        }
    }
    assert_eq!(terminations, 1);
    Ok(())
}

#[tokio::test]
async fn late_failure_reuses_settled_outcome() -> anyhow::Result<()> {
    let (backend, manager, nav) = setup().await?;
    backend.set_refresh_pair(None);

    assert!(manager.coordinator().recover(0).await.is_err());
    // A request sent before that refresh settled comes back 401 afterwards.
    assert!(manager.coordinator().recover(0).await.is_err());

    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(nav.redirects(), 1);
    Ok(())
}

#[tokio::test]
async fn late_success_reuses_stored_token() -> anyhow::Result<()> {
    let (backend, manager, _nav) = setup().await?;

    assert_eq!(manager.coordinator().recover(0).await, Ok("A2".to_owned()));
    assert_eq!(manager.coordinator().recover(0).await, Ok("A2".to_owned()));
    assert_eq!(backend.refresh_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn missing_refresh_token_skips_exchange_and_terminates() -> anyhow::Result<()> {
    let (backend, manager, nav) = setup().await?;
    manager.store().save(&Session {
        access_token: Some("A1".to_owned()),
        refresh_token: None,
        user_id: Some("42".to_owned()),
        user_role: None,
    });
    manager.store().set_many(&[("selected_plan", Some("{}".to_owned()))]);

    assert_eq!(manager.coordinator().recover(0).await, Err(RefreshError::MissingRefreshToken));

    assert_eq!(backend.refresh_calls(), 0);
    assert_eq!(nav.redirects(), 1);
    assert_eq!(manager.store().read(), Session::default());
    assert_eq!(manager.store().get("selected_plan"), None);
    assert!(!manager.coordinator().is_refreshing());
    Ok(())
}

#[tokio::test]
async fn cancelled_caller_does_not_cancel_refresh() -> anyhow::Result<()> {
    let (backend, manager, nav) = setup().await?;
    backend.set_refresh_delay(Duration::from_millis(300));

    let first = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.coordinator().recover(0).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.coordinator().recover(0).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.coordinator().queued(), 2);

    // The request that started the refresh goes away; the exchange does not.
    first.abort();
    assert_eq!(second.await?, Ok("A2".to_owned()));
    assert!(!manager.coordinator().is_refreshing());
    assert_eq!(manager.coordinator().queued(), 0);
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(manager.store().refresh_token().as_deref(), Some("R2"));
    assert_eq!(nav.redirects(), 0);
    Ok(())
}

/// Session whose access token expires one second after `NOW_MS`, so a
/// 950ms lead fires the timer after 50ms.
fn expiring_session(backend: &MockBackend) -> (Arc<SessionManager>, Arc<RecordingNavigator>) {
    let (manager, nav) = test_session(
        &backend.url(),
        Arc::new(FixedClock::new(NOW_MS)),
        Duration::from_millis(950),
    );
    manager.begin(&Session {
        access_token: Some(forge_token(NOW_SECS + 1)),
        refresh_token: Some("R1".to_owned()),
        user_id: Some("42".to_owned()),
        user_role: None,
    });
    (manager, nav)
}

#[tokio::test]
async fn unauthorized_during_proactive_refresh_waits_for_it() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    backend.set_refresh_delay(Duration::from_millis(300));
    let (manager, nav) = expiring_session(&backend);
    let epoch = manager.coordinator().epoch();

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(manager.coordinator().is_refreshing());
    assert_eq!(backend.refresh_calls(), 1);

    assert_eq!(manager.coordinator().recover(epoch).await, Ok("A2".to_owned()));
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(backend.calls_to("/api/v1/users/refresh"), vec![Some("R1".to_owned())]);
    assert_eq!(manager.store().refresh_token().as_deref(), Some("R2"));
    assert_eq!(nav.redirects(), 0);
    manager.shutdown();
    Ok(())
}

#[tokio::test]
async fn proactive_failure_with_queued_request_terminates_once() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    backend.set_refresh_pair(None);
    backend.set_refresh_delay(Duration::from_millis(300));
    let (manager, nav) = expiring_session(&backend);
    let mut rx = manager.subscribe();
    let epoch = manager.coordinator().epoch();

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(manager.coordinator().is_refreshing());

    let mut set = spawn_recoveries(&manager, 3, epoch);
    while let Some(result) = set.join_next().await {
        match result? {
            Err(RefreshError::Rejected { status: 401, .. }) => {}
            other => anyhow::bail!("expected rejection, got {other:?}"),
        }
    }

    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(nav.redirects(), 1);
    assert_eq!(manager.store().read(), Session::default());

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(matches!(
        events.first(),
        Some(SessionEvent::RefreshFailed { trigger: RefreshTrigger::Proactive, .. })
    ));
    assert_eq!(events.iter().filter(|e| **e == SessionEvent::Terminated).count(), 1);
    Ok(())
}

#[tokio::test]
async fn snapshot_pairs_token_with_its_epoch() -> anyhow::Result<()> {
    let (_backend, manager, _nav) = setup().await?;
    let coordinator = manager.coordinator();
    assert_eq!(coordinator.snapshot(), (Some("A1".to_owned()), 0));

    coordinator.recover(0).await?;
    assert_eq!(coordinator.snapshot(), (Some("A2".to_owned()), 1));
    Ok(())
}

#[tokio::test]
async fn terminator_tolerates_repeat_calls() -> anyhow::Result<()> {
    let (_backend, manager, nav) = setup().await?;
    manager.terminator().terminate(&RefreshError::Timeout);
    manager.terminator().terminate(&RefreshError::Timeout);

    assert_eq!(nav.redirects(), 2);
    assert_eq!(manager.store().read(), Session::default());
    Ok(())
}
