// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a mock backend, forged tokens and fakes.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::session::scheduler::Clock;
use crate::session::store::TokenStore;
use crate::session::terminator::Navigator;
use crate::session::{SessionManager, SessionSettings, TokenPair};

/// Build an unsigned `header.payload.signature` token expiring at `exp_secs`.
pub fn forge_token(exp_secs: u64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(json!({ "sub": "42", "exp": exp_secs }).to_string());
    format!("{header}.{payload}.sig")
}

/// Clock frozen at a settable instant.
pub struct FixedClock {
    now_ms: AtomicU64,
}

impl FixedClock {
    pub fn new(now_ms: u64) -> Self {
        Self { now_ms: AtomicU64::new(now_ms) }
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::Relaxed);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Relaxed)
    }
}

/// Navigator that only counts redirects.
#[derive(Default)]
pub struct RecordingNavigator {
    redirects: AtomicU32,
}

impl RecordingNavigator {
    pub fn redirects(&self) -> u32 {
        self.redirects.load(Ordering::Relaxed)
    }
}

impl Navigator for RecordingNavigator {
    fn redirect_to_login(&self) {
        self.redirects.fetch_add(1, Ordering::Relaxed);
    }
}

/// In-memory [`SessionManager`] against `api_url` with a recording navigator.
pub fn test_session(
    api_url: &str,
    clock: Arc<dyn Clock>,
    refresh_lead: Duration,
) -> (Arc<SessionManager>, Arc<RecordingNavigator>) {
    let navigator = Arc::new(RecordingNavigator::default());
    let settings = SessionSettings {
        api_url: api_url.to_owned(),
        refresh_lead,
        refresh_timeout: Duration::from_secs(5),
        clock,
    };
    let manager = SessionManager::new(settings, TokenStore::in_memory(), navigator.clone());
    (manager, navigator)
}

/// Mutable behaviour of a [`MockBackend`].
struct MockState {
    login_pair: Mutex<TokenPair>,
    /// Bearer accepted by protected routes.
    valid_access: Mutex<String>,
    /// Pair handed out by `/refresh`; `None` rejects with 401.
    refresh_pair: Mutex<Option<TokenPair>>,
    refresh_delay: Mutex<Duration>,
    refresh_calls: AtomicU32,
    calls: Mutex<Vec<(String, Option<String>)>>,
    subscribed: AtomicBool,
    /// Reject every protected call, even with a fresh token.
    revoked: AtomicBool,
}

impl MockState {
    fn record(&self, path: &str, headers: &HeaderMap) -> Option<String> {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_owned);
        self.calls.lock().push((path.to_owned(), bearer.clone()));
        bearer
    }

    /// Record the call and check the bearer against the live access token.
    fn authorize(&self, path: &str, headers: &HeaderMap) -> Result<(), Response> {
        let bearer = self.record(path, headers);
        let valid = bearer.as_deref() == Some(self.valid_access.lock().as_str());
        if valid && !self.revoked.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(unauthorized())
        }
    }
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Unauthorized" }))).into_response()
}

type Shared = State<Arc<MockState>>;

async fn login(State(s): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    s.record("/api/v1/users/login", &headers);
    if body.get("password").and_then(Value::as_str) == Some("wrong") {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Invalid credentials" })))
            .into_response();
    }
    let pair = s.login_pair.lock().clone();
    *s.valid_access.lock() = pair.access_token.clone();
    Json(json!({
        "access_token": pair.access_token,
        "refresh_token": pair.refresh_token,
        "id": 42,
        "role": "adult",
    }))
    .into_response()
}

async fn refresh(State(s): Shared, headers: HeaderMap) -> Response {
    s.record("/api/v1/users/refresh", &headers);
    s.refresh_calls.fetch_add(1, Ordering::Relaxed);
    let delay = *s.refresh_delay.lock();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    let pair = s.refresh_pair.lock().clone();
    match pair {
        Some(pair) => {
            *s.valid_access.lock() = pair.access_token.clone();
            Json(pair).into_response()
        }
        None => (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Invalid refresh token" })))
            .into_response(),
    }
}

async fn logout(State(s): Shared, headers: HeaderMap) -> Response {
    match s.authorize("/api/v1/users/logout", &headers) {
        Ok(()) => Json(json!({ "message": "Logged out" })).into_response(),
        Err(resp) => resp,
    }
}

async fn forgot_password(State(s): Shared, headers: HeaderMap) -> Response {
    s.record("/api/v1/users/forgot-password", &headers);
    Json(json!({ "message": "OTP sent" })).into_response()
}

async fn verify_otp(State(s): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    s.record("/api/v1/users/verify-otp", &headers);
    if body.get("otp").and_then(Value::as_str) == Some("123456") {
        Json(json!({ "reset_token": "reset-1" })).into_response()
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({ "message": "Invalid OTP" }))).into_response()
    }
}

async fn reset_password(State(s): Shared, headers: HeaderMap) -> Response {
    s.record("/api/v1/users/reset-password", &headers);
    Json(json!({ "message": "Password updated" })).into_response()
}

async fn plans(State(s): Shared, headers: HeaderMap) -> Response {
    if let Err(resp) = s.authorize("/api/v1/subscription-plans", &headers) {
        return resp;
    }
    Json(json!({
        "plans": { "data": [
            {
                "id": 1,
                "name": "Family Monthly",
                "description": "Up to six members",
                "price": "9.99",
                "discounted_price": "7.99",
                "discount_percent": 20,
                "billing_interval": "month",
                "features": ["Shared calendar", "Location sharing"],
            },
            {
                "id": "99",
                "name": "Legacy",
                "price": 4.5,
                "billing_interval": "month",
            },
        ] }
    }))
    .into_response()
}

async fn current_subscription(State(s): Shared, headers: HeaderMap) -> Response {
    if let Err(resp) = s.authorize("/api/v1/family-subscriptions", &headers) {
        return resp;
    }
    if s.subscribed.load(Ordering::Relaxed) {
        Json(json!({ "subscription_id": "sub-1", "status": "active" })).into_response()
    } else {
        (StatusCode::NOT_FOUND, Json(json!({ "message": "No subscription" }))).into_response()
    }
}

async fn create_subscription(
    State(s): Shared,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(resp) = s.authorize("/api/v1/family-subscriptions", &headers) {
        return resp;
    }
    s.subscribed.store(true, Ordering::Relaxed);
    // Plan 99 is retired at the payment provider and yields no checkout.
    if body.get("subscription_plan_id").and_then(Value::as_str) == Some("99") {
        return Json(json!({ "subscription_id": 7, "status": "incomplete" })).into_response();
    }
    Json(json!({
        "subscription_id": 7,
        "status": "pending",
        "checkout_url": "https://pay.example.test/checkout/7",
    }))
    .into_response()
}

async fn cancel_subscription(State(s): Shared, headers: HeaderMap) -> Response {
    if let Err(resp) = s.authorize("/api/v1/family-subscriptions/cancel", &headers) {
        return resp;
    }
    s.subscribed.store(false, Ordering::Relaxed);
    Json(json!({ "message": "Cancelled" })).into_response()
}

async fn fail(State(s): Shared, headers: HeaderMap) -> Response {
    s.record("/api/v1/fail", &headers);
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "message": "boom" }))).into_response()
}

/// The mobdeen backend on a random local port.
///
/// Login hands out `A1`/`R1` by default; protected routes accept only the
/// most recently issued access token.
pub struct MockBackend {
    addr: SocketAddr,
    state: Arc<MockState>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            login_pair: Mutex::new(TokenPair {
                access_token: "A1".to_owned(),
                refresh_token: "R1".to_owned(),
            }),
            valid_access: Mutex::new("A1".to_owned()),
            refresh_pair: Mutex::new(Some(TokenPair {
                access_token: "A2".to_owned(),
                refresh_token: "R2".to_owned(),
            })),
            refresh_delay: Mutex::new(Duration::ZERO),
            refresh_calls: AtomicU32::new(0),
            calls: Mutex::new(Vec::new()),
            subscribed: AtomicBool::new(false),
            revoked: AtomicBool::new(false),
        });

        let router = Router::new()
            .route("/api/v1/users/login", post(login))
            .route("/api/v1/users/refresh", post(refresh))
            .route("/api/v1/users/logout", post(logout))
            .route("/api/v1/users/forgot-password", post(forgot_password))
            .route("/api/v1/users/verify-otp", post(verify_otp))
            .route("/api/v1/users/reset-password", post(reset_password))
            .route("/api/v1/subscription-plans", get(plans))
            .route(
                "/api/v1/family-subscriptions",
                get(current_subscription).post(create_subscription),
            )
            .route("/api/v1/family-subscriptions/cancel", post(cancel_subscription))
            .route("/api/v1/fail", get(fail))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Ok(Self { addr, state, handle })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_login_pair(&self, pair: TokenPair) {
        *self.state.login_pair.lock() = pair;
    }

    /// Change the access token protected routes accept.
    pub fn set_valid_access(&self, token: &str) {
        *self.state.valid_access.lock() = token.to_owned();
    }

    /// Pair returned by the next refreshes; `None` makes refresh fail.
    pub fn set_refresh_pair(&self, pair: Option<TokenPair>) {
        *self.state.refresh_pair.lock() = pair;
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.state.refresh_delay.lock() = delay;
    }

    pub fn refresh_calls(&self) -> u32 {
        self.state.refresh_calls.load(Ordering::Relaxed)
    }

    pub fn set_subscribed(&self, subscribed: bool) {
        self.state.subscribed.store(subscribed, Ordering::Relaxed);
    }

    pub fn set_revoked(&self, revoked: bool) {
        self.state.revoked.store(revoked, Ordering::Relaxed);
    }

    /// Bearer tokens seen on each call to `path`, in arrival order.
    pub fn calls_to(&self, path: &str) -> Vec<Option<String>> {
        self.state
            .calls
            .lock()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, bearer)| bearer.clone())
            .collect()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
