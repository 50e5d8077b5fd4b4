// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Login, logout and password recovery.

use serde_json::json;
use tracing::{info, warn};

use crate::api::models::{Credentials, LoginResponse, VerifyOtpResponse};
use crate::api::{ApiClient, ApiRequest};
use crate::error::ApiError;
use crate::session::Session;

pub const LOGIN_PATH: &str = "/api/v1/users/login";
pub const LOGOUT_PATH: &str = "/api/v1/users/logout";
pub const FORGOT_PASSWORD_PATH: &str = "/api/v1/users/forgot-password";
pub const VERIFY_OTP_PATH: &str = "/api/v1/users/verify-otp";
pub const RESET_PASSWORD_PATH: &str = "/api/v1/users/reset-password";

impl ApiClient {
    /// Authenticate, persist the new session and arm the proactive refresh.
    pub async fn login(&self, credentials: &Credentials) -> Result<Session, ApiError> {
        let req = ApiRequest::post(LOGIN_PATH)
            .json(json!({ "email": credentials.email, "password": credentials.password }))
            .anonymous();
        let resp: LoginResponse = self.call(&req).await?;
        let session = resp.into_session();
        self.session().begin(&session);
        Ok(session)
    }

    /// Tell the backend (best effort), then forget the local session.
    pub async fn logout(&self) {
        if self.session().store().read().is_authenticated() {
            if let Err(e) = self.call_unit(&ApiRequest::post(LOGOUT_PATH)).await {
                warn!(err = %e, "logout notification failed");
            }
        }
        self.session().sign_out();
    }

    /// Ask the backend to email a one-time password.
    pub async fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
        let req = ApiRequest::post(FORGOT_PASSWORD_PATH).json(json!({ "email": email })).anonymous();
        self.call_unit(&req).await?;
        info!("password reset code requested");
        Ok(())
    }

    /// Exchange an emailed one-time password for a reset token.
    pub async fn verify_otp(&self, email: &str, otp: &str) -> Result<String, ApiError> {
        let req = ApiRequest::post(VERIFY_OTP_PATH)
            .json(json!({ "email": email, "otp": otp }))
            .anonymous();
        let resp: VerifyOtpResponse = self.call(&req).await?;
        Ok(resp.reset_token)
    }

    pub async fn reset_password(&self, password: &str, reset_token: &str) -> Result<(), ApiError> {
        let req = ApiRequest::post(RESET_PASSWORD_PATH)
            .json(json!({ "password": password, "reset_token": reset_token }))
            .anonymous();
        self.call_unit(&req).await
    }
}
