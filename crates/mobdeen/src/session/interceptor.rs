// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight token refresh shared by the 401 path and the proactive timer.
//!
//! At most one refresh exchange runs per session. It runs on its own task,
//! so a caller that gives up does not take the refresh down with it. Every
//! request that hits a 401 while it runs parks a one-shot continuation in
//! the queue and is woken with the outcome. The queue is drained exactly
//! once per cycle.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::error::RefreshError;
use crate::session::refresh::RefreshExchange;
use crate::session::scheduler::RefreshScheduler;
use crate::session::store::TokenStore;
use crate::session::terminator::SessionTerminator;
use crate::session::{RefreshTrigger, SessionEvent, TokenPair};

type Outcome = Result<String, RefreshError>;
/// The refresh token that was spent, and the pair it bought.
type Exchanged = Result<(String, TokenPair), RefreshError>;

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    pending: Vec<oneshot::Sender<Outcome>>,
    /// Bumped each time a refresh settles in a way requests must observe.
    epoch: u64,
    last: Option<Outcome>,
}

struct Shared {
    state: Mutex<RefreshState>,
    store: TokenStore,
    exchange: RefreshExchange,
    scheduler: RefreshScheduler,
    terminator: SessionTerminator,
    events: broadcast::Sender<SessionEvent>,
}

/// Serializes refresh attempts for one [`SessionManager`](crate::session::SessionManager).
#[derive(Clone)]
pub struct RefreshCoordinator {
    shared: Arc<Shared>,
}

/// Non-owning handle held by the proactive timer.
pub(crate) struct WeakCoordinator(Weak<Shared>);

impl WeakCoordinator {
    pub(crate) fn upgrade(&self) -> Option<RefreshCoordinator> {
        self.0.upgrade().map(|shared| RefreshCoordinator { shared })
    }
}

impl RefreshCoordinator {
    pub fn new(
        store: TokenStore,
        exchange: RefreshExchange,
        scheduler: RefreshScheduler,
        terminator: SessionTerminator,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let coordinator = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RefreshState::default()),
                store,
                exchange,
                scheduler,
                terminator,
                events,
            }),
        };
        coordinator.shared.scheduler.bind(&coordinator);
        coordinator
    }

    pub(crate) fn downgrade(&self) -> WeakCoordinator {
        WeakCoordinator(Arc::downgrade(&self.shared))
    }

    /// Refresh generation. Read it before sending a request and hand it to
    /// [`recover`](Self::recover) if that request comes back 401.
    pub fn epoch(&self) -> u64 {
        self.shared.state.lock().epoch
    }

    /// The access token to send and the epoch it belongs to, read together.
    ///
    /// Tokens are only replaced under the same lock that bumps the epoch,
    /// so the pair is never an old token with a new epoch.
    pub fn snapshot(&self) -> (Option<String>, u64) {
        let state = self.shared.state.lock();
        (self.shared.store.access_token(), state.epoch)
    }

    pub fn is_refreshing(&self) -> bool {
        self.shared.state.lock().in_flight
    }

    /// Number of requests waiting on the in-flight refresh.
    pub fn queued(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Obtain a fresh access token after a 401.
    ///
    /// `seen_epoch` is the [`epoch`](Self::epoch) observed when the failed
    /// request was sent. If a refresh has settled since, its outcome is
    /// reused instead of starting another exchange.
    pub async fn recover(&self, seen_epoch: u64) -> Result<String, RefreshError> {
        let rx = {
            let mut state = self.shared.state.lock();
            if !state.in_flight && state.epoch != seen_epoch {
                let last = state.last.clone().unwrap_or(Err(RefreshError::Abandoned));
                drop(state);
                return match last {
                    Ok(token) => Ok(self.shared.store.access_token().unwrap_or(token)),
                    Err(e) => Err(e),
                };
            }

            let (tx, rx) = oneshot::channel();
            state.pending.push(tx);
            if state.in_flight {
                debug!(queued = state.pending.len(), "refresh in flight, queueing request");
            } else {
                state.in_flight = true;
                self.spawn_cycle(RefreshTrigger::Reactive);
            }
            rx
        };
        rx.await.unwrap_or(Err(RefreshError::Abandoned))
    }

    /// Start a proactive refresh unless one is already running.
    ///
    /// Returns whether a new exchange was started.
    pub fn refresh_proactive(&self) -> bool {
        if self.shared.store.refresh_token().is_none() {
            debug!("no refresh token, skipping proactive refresh");
            return false;
        }
        let mut state = self.shared.state.lock();
        if state.in_flight {
            debug!("refresh already in flight, skipping proactive refresh");
            return false;
        }
        state.in_flight = true;
        self.spawn_cycle(RefreshTrigger::Proactive);
        true
    }

    /// Caller holds the state lock with `in_flight` just set.
    fn spawn_cycle(&self, trigger: RefreshTrigger) {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let guard = InFlight { shared: &*shared, settled: false };
            let result = shared.exchange_once(trigger).await;
            guard.settle(trigger, result);
        });
    }
}

impl Shared {
    async fn exchange_once(&self, trigger: RefreshTrigger) -> Exchanged {
        let Some(refresh_token) = self.store.refresh_token() else {
            return Err(RefreshError::MissingRefreshToken);
        };
        info!(trigger = trigger.as_str(), "refreshing access token");
        let pair = self.exchange.exchange(&refresh_token).await?;
        Ok((refresh_token, pair))
    }
}

/// Holds the in-flight flag for one exchange task. Settles the cycle, or
/// on drop (runtime shutdown) releases the flag and rejects the waiters.
struct InFlight<'a> {
    shared: &'a Shared,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self, trigger: RefreshTrigger, result: Exchanged) {
        self.settled = true;
        let shared = self.shared;
        match result {
            Ok((spent, pair)) => {
                let (waiters, outcome) = {
                    let mut state = shared.state.lock();
                    let current = shared.store.refresh_token();
                    let outcome = if current.as_deref() == Some(spent.as_str()) {
                        shared.store.update_tokens(&pair);
                        Ok(pair.access_token)
                    } else {
                        // Signed out or signed in again while the exchange ran.
                        debug!("session changed during refresh, discarding result");
                        shared.store.access_token().ok_or(RefreshError::Abandoned)
                    };
                    state.in_flight = false;
                    state.epoch += 1;
                    state.last = Some(outcome.clone());
                    (std::mem::take(&mut state.pending), outcome)
                };
                if outcome.is_ok() {
                    shared.scheduler.schedule_next();
                    let _ = shared.events.send(SessionEvent::Refreshed { trigger });
                }
                wake(waiters, &outcome);
            }
            Err(error) => {
                let _ = shared.events.send(SessionEvent::RefreshFailed {
                    trigger,
                    error: error.clone(),
                });
                {
                    let mut state = shared.state.lock();
                    if trigger == RefreshTrigger::Proactive && state.pending.is_empty() {
                        // Nobody is blocked on it; the next 401 will try again.
                        state.in_flight = false;
                        drop(state);
                        warn!(err = %error, "proactive refresh failed, deferring to reactive refresh");
                        return;
                    }
                }

                // Flag still held: 401s arriving now queue instead of
                // starting a second exchange with a dead refresh token.
                shared.terminator.terminate(&error);
                let outcome = Err(error);
                let waiters = {
                    let mut state = shared.state.lock();
                    state.in_flight = false;
                    state.epoch += 1;
                    state.last = Some(outcome.clone());
                    std::mem::take(&mut state.pending)
                };
                wake(waiters, &outcome);
            }
        }
    }
}

fn wake(waiters: Vec<oneshot::Sender<Outcome>>, outcome: &Outcome) {
    debug!(waiters = waiters.len(), ok = outcome.is_ok(), "refresh settled");
    for waiter in waiters {
        let _ = waiter.send(outcome.clone());
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let waiters = {
            let mut state = self.shared.state.lock();
            state.in_flight = false;
            std::mem::take(&mut state.pending)
        };
        warn!(waiters = waiters.len(), "refresh abandoned before completion");
        wake(waiters, &Err(RefreshError::Abandoned));
    }
}

#[cfg(test)]
#[path = "interceptor_tests.rs"]
mod tests;
