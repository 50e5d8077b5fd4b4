// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single exit path when a session cannot be kept alive.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::warn;

use crate::error::RefreshError;
use crate::session::scheduler::RefreshScheduler;
use crate::session::store::TokenStore;
use crate::session::SessionEvent;

/// Sends the user back to the login entry point.
///
/// Implementations must discard any in-progress view state (a hard
/// redirect) and tolerate being called more than once.
pub trait Navigator: Send + Sync {
    fn redirect_to_login(&self);
}

/// Clears the session and forces a redirect to login.
#[derive(Clone)]
pub struct SessionTerminator {
    store: TokenStore,
    scheduler: RefreshScheduler,
    navigator: Arc<dyn Navigator>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionTerminator {
    pub fn new(
        store: TokenStore,
        scheduler: RefreshScheduler,
        navigator: Arc<dyn Navigator>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self { store, scheduler, navigator, events }
    }

    /// End the session. Safe to call repeatedly.
    pub fn terminate(&self, reason: &RefreshError) {
        warn!(reason = reason.as_str(), "session cannot be refreshed, signing out: {reason}");
        self.scheduler.cancel();
        self.store.clear();
        let _ = self.events.send(SessionEvent::Terminated);
        self.navigator.redirect_to_login();
    }
}
