// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proactive refresh: renew the access token shortly before it expires.
//!
//! A single one-shot timer is live at most. Re-arming always aborts the
//! previous timer first, so repeated focus events never stack refreshes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::session::interceptor::{RefreshCoordinator, WeakCoordinator};
use crate::session::store::TokenStore;
use crate::session::token;

/// Wall-clock source, in epoch millis.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }
}

struct ArmedTimer {
    id: u64,
    handle: AbortHandle,
}

struct Inner {
    store: TokenStore,
    clock: Arc<dyn Clock>,
    lead: Duration,
    timer: Mutex<Option<ArmedTimer>>,
    next_id: AtomicU64,
    /// Where fired refreshes go, so they share the 401 path's flag and queue.
    coordinator: OnceLock<WeakCoordinator>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.handle.abort();
        }
    }
}

/// Handle to the proactive refresh timer. Cheap to clone.
#[derive(Clone)]
pub struct RefreshScheduler {
    inner: Arc<Inner>,
}

impl RefreshScheduler {
    pub fn new(store: TokenStore, clock: Arc<dyn Clock>, lead: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                clock,
                lead,
                timer: Mutex::new(None),
                next_id: AtomicU64::new(0),
                coordinator: OnceLock::new(),
            }),
        }
    }

    /// Route fired refreshes through `coordinator`. Only the first call binds.
    pub(crate) fn bind(&self, coordinator: &RefreshCoordinator) {
        let _ = self.inner.coordinator.set(coordinator.downgrade());
    }

    /// Arm the timer from the current access token's expiry.
    ///
    /// Returns the armed delay, or `None` when no timer was armed: no token,
    /// no readable expiry, or expiry already inside the lead window.
    pub fn schedule_next(&self) -> Option<Duration> {
        let access_token = self.inner.store.access_token()?;
        let Some(expiry) = token::expiry_ms(&access_token) else {
            debug!("access token has no readable expiry, not scheduling refresh");
            return None;
        };

        let now = self.inner.clock.now_ms();
        let lead = self.inner.lead.as_millis() as i128;
        let refresh_in = i128::from(expiry) - i128::from(now) - lead;
        if refresh_in <= 0 {
            debug!(
                expires_in_ms = i128::from(expiry) - i128::from(now),
                "access token inside refresh lead window, not scheduling"
            );
            return None;
        }

        let delay = Duration::from_millis(refresh_in as u64);
        self.arm(delay).then_some(delay)
    }

    /// Arm a one-shot refresh after `delay`, replacing any live timer.
    ///
    /// Returns false when called outside a tokio runtime.
    pub fn arm(&self, delay: Duration) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime, proactive refresh not armed");
            return false;
        };

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        let mut slot = self.inner.timer.lock();
        if let Some(prev) = slot.take() {
            prev.handle.abort();
        }
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                RefreshScheduler { inner }.fire(id);
            }
        });
        *slot = Some(ArmedTimer { id, handle: task.abort_handle() });
        debug!(delay_ms = delay.as_millis() as u64, "proactive refresh armed");
        true
    }

    /// Abort the live timer, if any.
    pub fn cancel(&self) {
        if let Some(timer) = self.inner.timer.lock().take() {
            timer.handle.abort();
            debug!("proactive refresh cancelled");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.inner.timer.lock().is_some()
    }

    fn fire(&self, id: u64) {
        {
            let mut slot = self.inner.timer.lock();
            if slot.as_ref().map(|t| t.id) != Some(id) {
                return;
            }
            *slot = None;
        }

        let Some(coordinator) = self.inner.coordinator.get().and_then(WeakCoordinator::upgrade)
        else {
            debug!("session gone, dropping proactive refresh");
            return;
        };
        if coordinator.refresh_proactive() {
            debug!("proactive refresh handed to coordinator");
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
