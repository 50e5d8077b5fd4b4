// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Refresh-token exchange.
//!
//! Sent on its own client, never through the 401 interceptor, so a rejected
//! refresh cannot recurse into another refresh.

use std::time::Duration;

use tracing::debug;

use crate::error::RefreshError;
use crate::session::TokenPair;

pub const REFRESH_PATH: &str = "/api/v1/users/refresh";

/// Bare `POST /refresh` caller.
#[derive(Clone)]
pub struct RefreshExchange {
    http: reqwest::Client,
    url: String,
}

impl RefreshExchange {
    pub fn new(api_url: &str, timeout: Duration) -> Self {
        crate::ensure_crypto();
        let http = reqwest::Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { http, url: format!("{}{REFRESH_PATH}", api_url.trim_end_matches('/')) }
    }

    /// Trade a refresh token for a new access/refresh pair.
    pub async fn exchange(&self, refresh_token: &str) -> Result<TokenPair, RefreshError> {
        let resp = self.http.post(&self.url).bearer_auth(refresh_token).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            debug!(status, "refresh exchange rejected");
            return Err(RefreshError::Rejected { status, body });
        }

        let pair: TokenPair = resp.json().await?;
        Ok(pair)
    }
}
