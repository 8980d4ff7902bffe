// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the request guard service.
//!
//! Apart from the health and metrics probes, every route runs through a
//! [`SecureEndpoint`].

use crate::config::Config;
use crate::endpoint::{Guard, SecureEndpoint};
use crate::schema::{FieldIssue, Validate};
use axum::{
    extract::{Request, State},
    http::{header, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Longest accepted echo message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Most tags accepted on an echo request.
pub const MAX_TAGS: usize = 16;

/// Shared application state.
pub struct AppState {
    pub guard: Arc<Guard>,
    pub config: Config,
    token_endpoint: SecureEndpoint,
    echo_endpoint: SecureEndpoint,
}

impl AppState {
    pub fn new(guard: Arc<Guard>, config: Config) -> Self {
        let token_endpoint =
            SecureEndpoint::new(guard.clone()).rate_limit(config.rate_limit.api.clone());
        let echo_endpoint =
            SecureEndpoint::new(guard.clone()).rate_limit(config.rate_limit.strict.clone());

        Self {
            guard,
            config,
            token_endpoint,
            echo_endpoint,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Freshly issued CSRF token.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Body accepted by the echo endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoRequest {
    pub message: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Validate for EchoRequest {
    fn validate(&self) -> Result<(), Vec<FieldIssue>> {
        let mut issues = Vec::new();

        if self.message.trim().is_empty() {
            issues.push(FieldIssue::new("message", "must not be empty"));
        } else if self.message.chars().count() > MAX_MESSAGE_CHARS {
            issues.push(FieldIssue::new(
                "message",
                format!("must be at most {MAX_MESSAGE_CHARS} characters"),
            ));
        }

        if self.tags.len() > MAX_TAGS {
            issues.push(FieldIssue::new("tags", format!("at most {MAX_TAGS} tags allowed")));
        }
        for (i, tag) in self.tags.iter().enumerate() {
            if tag.trim().is_empty() {
                issues.push(FieldIssue::new(format!("tags[{i}]"), "must not be empty"));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Echo endpoint response.
#[derive(Debug, Serialize, Deserialize)]
pub struct EchoResponse {
    pub echo: EchoRequest,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "request-guard",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Issue a CSRF token as both a cookie and a JSON body.
pub async fn csrf_token(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let guard = state.guard.clone();
    state
        .token_endpoint
        .call(request, |_request| async move {
            let issued = guard
                .issue_token()
                .ok_or_else(|| anyhow::anyhow!("CSRF cookie could not be encoded"))?;
            debug!("Issued CSRF token");

            anyhow::Ok((
                [(header::SET_COOKIE, issued.set_cookie)],
                Json(TokenResponse {
                    token: issued.token,
                }),
            )
                .into_response())
        })
        .await
}

/// Echo a validated JSON body back to the caller.
pub async fn echo(State(state): State<Arc<AppState>>, request: Request) -> Response {
    state
        .echo_endpoint
        .call_json::<EchoRequest, _, _>(request, |parts: Parts, body| async move {
            debug!(path = %parts.uri.path(), tags = body.tags.len(), "Echoing request");
            anyhow::Ok(Json(EchoResponse { echo: body }).into_response())
        })
        .await
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let metrics = state.guard.metrics();
    metrics.set_tracked_keys(state.guard.limiter().tracked_keys());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics.render(),
    )
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/api/csrf-token", get(csrf_token))
        .route("/api/echo", post(echo));

    if state.config.metrics.enabled {
        router = router.route(&state.config.metrics.path, get(metrics));
    }

    router.with_state(state)
}
