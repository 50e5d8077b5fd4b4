// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::error::Error as _;

use super::{ApiError, RefreshError};

#[test]
fn refresh_error_codes_are_stable() {
    let cases = [
        (RefreshError::MissingRefreshToken, "MISSING_REFRESH_TOKEN"),
        (RefreshError::Rejected { status: 401, body: String::new() }, "REFRESH_REJECTED"),
        (RefreshError::Transport("reset".to_owned()), "REFRESH_TRANSPORT"),
        (RefreshError::Timeout, "REFRESH_TIMEOUT"),
        (RefreshError::Abandoned, "REFRESH_ABANDONED"),
    ];
    for (err, code) in cases {
        assert_eq!(err.as_str(), code);
    }
}

#[test]
fn refresh_failure_becomes_session_expired() {
    let err = ApiError::from(RefreshError::Timeout);
    assert!(err.is_session_expired());
    assert_eq!(err.status(), None);
    assert_eq!(err.to_string(), "session expired: refresh request timed out");
    assert!(err.source().is_some());
}

#[test]
fn status_errors_carry_backend_message() {
    let err = ApiError::Status { status: 422, message: "Plan not found".to_owned() };
    assert_eq!(err.status(), Some(422));
    assert_eq!(err.to_string(), "API error (status 422): Plan not found");
    assert!(!err.is_session_expired());
}

#[test]
fn unauthorized_reports_401() {
    assert_eq!(ApiError::Unauthorized.status(), Some(401));
    assert!(ApiError::Unauthorized.source().is_none());
}
