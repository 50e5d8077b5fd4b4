// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Why a refresh-token exchange did not produce a new token pair.
///
/// Cloneable because a single failure fans out to every request queued
/// behind the in-flight refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The store holds no refresh token; the exchange was never sent.
    MissingRefreshToken,
    /// The backend answered with a non-success status.
    Rejected { status: u16, body: String },
    /// Network or decoding failure talking to the refresh endpoint.
    Transport(String),
    /// The exchange did not finish within the refresh timeout.
    Timeout,
    /// The refresh task was dropped, or the session changed, before it settled.
    Abandoned,
}

impl RefreshError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingRefreshToken => "MISSING_REFRESH_TOKEN",
            Self::Rejected { .. } => "REFRESH_REJECTED",
            Self::Transport(_) => "REFRESH_TRANSPORT",
            Self::Timeout => "REFRESH_TIMEOUT",
            Self::Abandoned => "REFRESH_ABANDONED",
        }
    }
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRefreshToken => f.write_str("no refresh token stored"),
            Self::Rejected { status, body } => write!(f, "refresh rejected ({status}): {body}"),
            Self::Transport(msg) => write!(f, "refresh request failed: {msg}"),
            Self::Timeout => f.write_str("refresh request timed out"),
            Self::Abandoned => f.write_str("refresh abandoned before completion"),
        }
    }
}

impl std::error::Error for RefreshError {}

impl From<reqwest::Error> for RefreshError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Errors surfaced to callers of the API client.
#[derive(Debug)]
pub enum ApiError {
    /// Still unauthorized after one refresh-and-replay.
    Unauthorized,
    /// The session could not be refreshed and has been terminated.
    SessionExpired(RefreshError),
    /// Non-authorization failure, passed through from the backend.
    Status { status: u16, message: String },
    /// Network-level failure.
    Transport(reqwest::Error),
    /// Response body did not have the expected shape.
    Decode(String),
    /// Subscription was created but the backend returned no checkout URL.
    MissingCheckoutUrl,
}

impl ApiError {
    /// HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired(_))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => f.write_str("unauthorized"),
            Self::SessionExpired(e) => write!(f, "session expired: {e}"),
            Self::Status { status, message } => write!(f, "API error (status {status}): {message}"),
            Self::Transport(e) => write!(f, "network error: {e}"),
            Self::Decode(msg) => write!(f, "unexpected response: {msg}"),
            Self::MissingCheckoutUrl => f.write_str("no checkout URL returned for subscription"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SessionExpired(e) => Some(e),
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err)
        }
    }
}

impl From<RefreshError> for ApiError {
    fn from(err: RefreshError) -> Self {
        Self::SessionExpired(err)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
