// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Production backend.
pub const DEFAULT_API_URL: &str = "https://mobdeen.com:8000";

/// Configuration for the mobdeen client.
#[derive(Debug, Clone, clap::Args)]
pub struct ClientConfig {
    /// Base URL of the mobdeen backend.
    #[arg(long, default_value = DEFAULT_API_URL, env = "MOBDEEN_API_URL")]
    pub api_url: String,

    /// Directory holding the persisted session.
    #[arg(long, env = "MOBDEEN_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// How long before access token expiry the proactive refresh fires.
    #[arg(long, default_value_t = 60_000, env = "MOBDEEN_REFRESH_LEAD_MS")]
    pub refresh_lead_ms: u64,

    /// Timeout for the refresh-token exchange, in seconds.
    #[arg(long, default_value_t = 30, env = "MOBDEEN_REFRESH_TIMEOUT_SECS")]
    pub refresh_timeout_secs: u64,

    /// Timeout for ordinary API requests, in seconds.
    #[arg(long, default_value_t = 30, env = "MOBDEEN_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: u64,

    /// Log filter (e.g. "info", "mobdeen=debug").
    #[arg(long, default_value = "info", env = "MOBDEEN_LOG_LEVEL")]
    pub log_level: String,

    /// Log output format: "text" or "json".
    #[arg(long, default_value = "text", env = "MOBDEEN_LOG_FORMAT")]
    pub log_format: String,
}

impl ClientConfig {
    pub fn refresh_lead(&self) -> Duration {
        Duration::from_millis(self.refresh_lead_ms)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    /// Resolve the state directory.
    ///
    /// Uses `--state-dir` when given, then `$XDG_STATE_HOME/mobdeen`,
    /// then `$HOME/.local/state/mobdeen`, then `.mobdeen`.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("mobdeen");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/state/mobdeen");
        }
        PathBuf::from(".mobdeen")
    }

    /// Path of the persisted session file.
    pub fn session_path(&self) -> PathBuf {
        self.state_dir().join("session.json")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
