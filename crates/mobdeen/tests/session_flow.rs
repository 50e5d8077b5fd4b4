// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end session flows against the mock backend with a file store.

use std::sync::Arc;
use std::time::Duration;

use mobdeen::api::models::Credentials;
use mobdeen::api::ApiClient;
use mobdeen::error::ApiError;
use mobdeen::session::keys;
use mobdeen::session::scheduler::SystemClock;
use mobdeen::session::store::TokenStore;
use mobdeen::session::{SessionManager, SessionSettings};
use mobdeen::test_support::{MockBackend, RecordingNavigator};

fn client_at(
    backend: &MockBackend,
    path: &std::path::Path,
) -> (ApiClient, Arc<RecordingNavigator>) {
    let nav = Arc::new(RecordingNavigator::default());
    let settings = SessionSettings {
        api_url: backend.url(),
        refresh_lead: Duration::from_secs(60),
        refresh_timeout: Duration::from_secs(5),
        clock: Arc::new(SystemClock),
    };
    let manager = SessionManager::new(settings, TokenStore::open(path), nav.clone());
    (ApiClient::with_base_url(&backend.url(), Duration::from_secs(5), manager), nav)
}

fn credentials() -> Credentials {
    Credentials { email: "parent@example.test".to_owned(), password: "hunter22".to_owned() }
}

#[tokio::test]
async fn login_subscribe_logout() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.json");
    let (client, nav) = client_at(&backend, &path);

    let session = client.login(&credentials()).await?;
    assert_eq!(session.user_id.as_deref(), Some("42"));
    assert_eq!(session.user_role.as_deref(), Some("adult"));

    let plans = client.plans().await?;
    let family = plans.first().ok_or_else(|| anyhow::anyhow!("no plans"))?;
    assert_eq!(family.effective_price(), "7.99");

    let checkout = client.subscribe(family).await?;
    assert_eq!(checkout.subscription_id.as_deref(), Some("7"));
    assert_eq!(checkout.checkout_url, "https://pay.example.test/checkout/7");

    // A second process sees the persisted session and cached checkout.
    let reopened = TokenStore::open(&path);
    assert_eq!(reopened.access_token().as_deref(), Some("A1"));
    assert_eq!(reopened.get(keys::SUBSCRIPTION_ID).as_deref(), Some("7"));
    assert_eq!(reopened.get(keys::CHECKOUT_STATUS).as_deref(), Some("pending"));
    assert!(reopened.get(keys::SELECTED_PLAN).is_some_and(|p| p.contains("Family Monthly")));

    client.cancel_subscription().await?;
    client.logout().await;

    assert_eq!(backend.calls_to("/api/v1/users/logout"), vec![Some("A1".to_owned())]);
    let after = TokenStore::open(&path);
    assert!(!after.read().is_authenticated());
    assert_eq!(after.get(keys::SELECTED_PLAN), None);
    assert!(!client.session().scheduler().is_armed());
    assert_eq!(nav.redirects(), 0);
    Ok(())
}

#[tokio::test]
async fn restart_recovers_stale_session() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.json");

    {
        let (client, _nav) = client_at(&backend, &path);
        client.login(&credentials()).await?;
    }
    // The backend rotated keys while the client was not running.
    backend.set_valid_access("A-rotated");

    let (client, nav) = client_at(&backend, &path);
    assert_eq!(client.plans().await?.len(), 2);
    assert_eq!(backend.calls_to("/api/v1/users/refresh"), vec![Some("R1".to_owned())]);
    assert_eq!(TokenStore::open(&path).refresh_token().as_deref(), Some("R2"));
    assert_eq!(nav.redirects(), 0);
    Ok(())
}

#[tokio::test]
async fn expired_refresh_token_signs_out() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.json");
    let (client, nav) = client_at(&backend, &path);

    client.login(&credentials()).await?;
    backend.set_valid_access("A-rotated");
    backend.set_refresh_pair(None);

    let err = client.plans().await.err();
    assert!(matches!(err, Some(ApiError::SessionExpired(_))), "got {err:?}");
    assert_eq!(nav.redirects(), 1);
    assert!(!TokenStore::open(&path).read().is_authenticated());

    // Logging out of an already-terminated session does not touch the backend.
    client.logout().await;
    assert!(backend.calls_to("/api/v1/users/logout").is_empty());
    Ok(())
}
