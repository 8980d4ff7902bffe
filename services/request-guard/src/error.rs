// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Request-level failure taxonomy and its HTTP rendering.

use crate::csrf::CsrfRejection;
use crate::schema::FieldIssue;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Why the guard refused to run a handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("Too many requests, retry after {retry_after_secs} seconds")]
    Throttled { retry_after_secs: u64 },

    #[error("Request origin is not allowed")]
    OriginRejected,

    #[error("CSRF token missing")]
    TokenMissing,

    #[error("CSRF token mismatch")]
    TokenMismatch,

    #[error("CSRF token invalid or expired")]
    TokenInvalid,

    #[error("Request body failed validation")]
    ValidationFailed(Vec<FieldIssue>),

    #[error("Internal server error")]
    UnexpectedFailure,
}

impl GuardError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Throttled { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::OriginRejected | Self::TokenMissing | Self::TokenMismatch | Self::TokenInvalid => {
                StatusCode::FORBIDDEN
            }
            Self::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            Self::UnexpectedFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable label for the `error` field.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Throttled { .. } => "rate_limited",
            Self::OriginRejected => "invalid_origin",
            Self::TokenMissing => "csrf_token_missing",
            Self::TokenMismatch => "csrf_token_mismatch",
            Self::TokenInvalid => "csrf_token_invalid",
            Self::ValidationFailed(_) => "validation_failed",
            Self::UnexpectedFailure => "internal_error",
        }
    }
}

impl From<CsrfRejection> for GuardError {
    fn from(rejection: CsrfRejection) -> Self {
        match rejection {
            CsrfRejection::InvalidOrigin(_) => Self::OriginRejected,
            CsrfRejection::MissingToken => Self::TokenMissing,
            CsrfRejection::TokenMismatch => Self::TokenMismatch,
            CsrfRejection::InvalidToken(_) => Self::TokenInvalid,
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldIssue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after_secs = match &self {
            Self::Throttled { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };
        let body = ErrorResponse {
            error: self.label(),
            message: self.to_string(),
            details: match self {
                Self::ValidationFailed(issues) => Some(issues),
                _ => None,
            },
            retry_after_secs,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after_secs {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
