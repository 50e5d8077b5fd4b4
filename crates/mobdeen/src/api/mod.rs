// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed access to the mobdeen backend.
//!
//! Every authenticated call goes through [`ApiClient::execute`], which
//! attaches the bearer token and runs the 401 refresh-and-replay cycle.

pub mod auth;
pub mod client;
pub mod models;
pub mod subscription;

use reqwest::Method;
use serde_json::Value;

pub use client::ApiClient;

/// A replayable description of one backend call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    /// Whether to attach the access token and recover from 401s.
    pub authenticated: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), body: None, authenticated: true }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Send without a bearer token; a 401 is returned as-is.
    pub fn anonymous(mut self) -> Self {
        self.authenticated = false;
        self
    }
}
