// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client with transparent 401 recovery.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::api::ApiRequest;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::session::SessionManager;

/// HTTP client bound to one [`SessionManager`].
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    session: Arc<SessionManager>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, session: Arc<SessionManager>) -> Self {
        Self::with_base_url(config.base_url(), config.request_timeout(), session)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration, session: Arc<SessionManager>) -> Self {
        crate::ensure_crypto();
        let http = reqwest::Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { base_url: base_url.trim_end_matches('/').to_owned(), http, session }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, req: &ApiRequest, token: Option<&str>) -> Result<Response, ApiError> {
        let mut builder = self.http.request(req.method.clone(), self.url(&req.path));
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = req.body {
            builder = builder.json(body);
        }
        Ok(builder.send().await?)
    }

    /// Send a request, recovering once from an expired access token.
    ///
    /// Non-401 responses, successful or not, are returned untouched. A 401
    /// triggers (or joins) a single refresh and one replay with the new
    /// token; a second 401 is final.
    pub async fn execute(&self, req: &ApiRequest) -> Result<Response, ApiError> {
        let coordinator = self.session.coordinator();
        let (token, epoch) = coordinator.snapshot();
        let token = token.filter(|_| req.authenticated);

        let resp = self.send(req, token.as_deref()).await?;
        if !req.authenticated || resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        debug!(path = %req.path, "request unauthorized, recovering session");
        let fresh = coordinator.recover(epoch).await?;

        let retry = self.send(req, Some(&fresh)).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            warn!(path = %req.path, "still unauthorized after refresh");
            return Err(ApiError::Unauthorized);
        }
        Ok(retry)
    }

    /// Execute and decode a JSON success body.
    pub async fn call<T: DeserializeOwned>(&self, req: &ApiRequest) -> Result<T, ApiError> {
        let resp = check_status(self.execute(req).await?).await?;
        Ok(resp.json().await?)
    }

    /// Execute and discard the success body.
    pub async fn call_unit(&self, req: &ApiRequest) -> Result<(), ApiError> {
        check_status(self.execute(req).await?).await?;
        Ok(())
    }
}

/// Turn a non-success response into [`ApiError::Status`].
///
/// Uses the backend's `{"message": ...}` when present, else the raw body.
pub async fn check_status(resp: Response) -> Result<Response, ApiError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_owned))
        .unwrap_or(text);
    Err(ApiError::Status { status, message })
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
