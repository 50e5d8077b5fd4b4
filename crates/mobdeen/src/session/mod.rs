// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated session lifecycle.
//!
//! The [`SessionManager`] owns the persisted [`TokenStore`], the proactive
//! [`RefreshScheduler`], the reactive [`RefreshCoordinator`] and the
//! [`SessionTerminator`]. One instance exists per running client and is
//! shared with the HTTP layer through an `Arc`.

pub mod interceptor;
pub mod refresh;
pub mod scheduler;
pub mod store;
pub mod terminator;
pub mod token;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

use crate::config::ClientConfig;
use crate::error::RefreshError;
use crate::session::interceptor::RefreshCoordinator;
use crate::session::refresh::RefreshExchange;
use crate::session::scheduler::{Clock, RefreshScheduler, SystemClock};
use crate::session::store::TokenStore;
use crate::session::terminator::{Navigator, SessionTerminator};

/// Persisted key names.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const USER_ID: &str = "user_id";
    pub const USER_ROLE: &str = "user_role";
    pub const SELECTED_PLAN: &str = "selected_plan";
    pub const SUBSCRIPTION_ID: &str = "subscription_id";
    pub const CHECKOUT_STATUS: &str = "checkout_status";
}

/// The authenticated identity of the current user.
///
/// Unauthenticated whenever `access_token` is absent, whatever the other
/// fields hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_role: Option<String>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Token pair returned by the refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// What started a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// The scheduler's timer fired ahead of expiry.
    Proactive,
    /// A request was rejected with 401.
    Reactive,
}

impl RefreshTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proactive => "proactive",
            Self::Reactive => "reactive",
        }
    }
}

/// Events broadcast by the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Refreshed { trigger: RefreshTrigger },
    RefreshFailed { trigger: RefreshTrigger, error: RefreshError },
    /// The session was cleared and the user sent back to login.
    Terminated,
}

/// Tunables for a [`SessionManager`].
#[derive(Clone)]
pub struct SessionSettings {
    pub api_url: String,
    pub refresh_lead: Duration,
    pub refresh_timeout: Duration,
    pub clock: Arc<dyn Clock>,
}

impl SessionSettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            api_url: config.base_url().to_owned(),
            refresh_lead: config.refresh_lead(),
            refresh_timeout: config.refresh_timeout(),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Owner of every piece of shared session state.
pub struct SessionManager {
    store: TokenStore,
    scheduler: RefreshScheduler,
    coordinator: RefreshCoordinator,
    terminator: SessionTerminator,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new(
        settings: SessionSettings,
        store: TokenStore,
        navigator: Arc<dyn Navigator>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        let exchange = RefreshExchange::new(&settings.api_url, settings.refresh_timeout);
        let scheduler = RefreshScheduler::new(store.clone(), settings.clock, settings.refresh_lead);
        let terminator =
            SessionTerminator::new(store.clone(), scheduler.clone(), navigator, events.clone());
        let coordinator = RefreshCoordinator::new(
            store.clone(),
            exchange,
            scheduler.clone(),
            terminator.clone(),
            events.clone(),
        );
        Arc::new(Self { store, scheduler, coordinator, terminator, events })
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn terminator(&self) -> &SessionTerminator {
        &self.terminator
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Persist a freshly issued session and start keeping it alive.
    pub fn begin(&self, session: &Session) -> Option<Duration> {
        self.scheduler.cancel();
        self.store.save(session);
        info!(user_id = session.user_id.as_deref().unwrap_or("-"), "session started");
        self.scheduler.schedule_next()
    }

    /// Arm the proactive refresh for an existing session, if any.
    pub fn start(&self) -> Option<Duration> {
        self.scheduler.schedule_next()
    }

    /// The application regained focus; timers may have been suspended.
    pub fn on_focus(&self) -> Option<Duration> {
        self.scheduler.schedule_next()
    }

    /// User-initiated sign out: stop refreshing and forget everything.
    pub fn sign_out(&self) {
        self.scheduler.cancel();
        self.store.clear();
        info!("signed out");
    }

    /// Cancel background work before the application exits.
    pub fn shutdown(&self) {
        self.scheduler.cancel();
    }
}
