// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Secure endpoint composition.
//!
//! A [`SecureEndpoint`] wraps a handler in a fixed sequence of checks:
//!
//! ```text
//! request
//!     → rate limit        (429 + Retry-After)
//!     → CSRF guard        (403, unsafe methods only)
//!     → body schema       (400 with field issues)
//!     → handler           (500 on error or panic)
//! ```
//!
//! Every response leaving the endpoint, success or failure, carries the
//! `X-RateLimit-*` headers computed by the first step. A failed check ends
//! the request; the handler never runs after one.

use crate::clock::{Clock, SystemClock};
use crate::config::{Config, ConfigError, RateLimitPolicy};
use crate::csrf::{CsrfGuard, IssuedToken};
use crate::error::GuardError;
use crate::limiter::{RateLimitDecision, RateLimiter};
use crate::metrics::{GuardMetrics, Outcome};
use crate::origin::OriginVerifier;
use crate::schema::{parse_json, FieldIssue, Validate};
use crate::store::MemoryStore;
use crate::token::TokenCodec;
use axum::{
    body::Body,
    extract::Request,
    http::{request::Parts, HeaderName, Method},
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Process-wide guard state: the rate limiter, the CSRF guard and metrics.
#[derive(Debug)]
pub struct Guard {
    limiter: RateLimiter,
    csrf: CsrfGuard,
    metrics: GuardMetrics,
    body_limit: usize,
}

impl Guard {
    /// Build the guard from configuration using the wall clock.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build the guard with an explicit time source.
    pub fn with_clock(config: &Config, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        let secret = config.csrf.secret.clone().ok_or(ConfigError::MissingSecret)?;
        let header_name = HeaderName::try_from(config.csrf.header_name.as_str())
            .map_err(|_| ConfigError::InvalidHeaderName(config.csrf.header_name.clone()))?;

        let codec = TokenCodec::new(secret, config.csrf.token_validity(), clock.clone());
        let origin = OriginVerifier::new(
            config.environment.is_development(),
            &config.csrf.allowed_origins,
        );

        Ok(Self {
            limiter: RateLimiter::new(Arc::new(MemoryStore::new()), clock),
            csrf: CsrfGuard::new(codec, origin, config.csrf.cookie_name.clone(), header_name),
            metrics: GuardMetrics::new()?,
            body_limit: config.body_limit_bytes,
        })
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn csrf(&self) -> &CsrfGuard {
        &self.csrf
    }

    pub fn metrics(&self) -> &GuardMetrics {
        &self.metrics
    }

    /// Mint a CSRF token and its cookie.
    pub fn issue_token(&self) -> Option<IssuedToken> {
        self.csrf.issue()
    }

    /// Periodically evict expired rate limit entries.
    pub fn spawn_janitor(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let guard = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = guard.limiter.sweep();
                let remaining = guard.limiter.tracked_keys();
                guard.metrics.set_tracked_keys(remaining);
                if removed > 0 {
                    debug!(removed, remaining, "Swept expired rate limit entries");
                }
            }
        })
    }
}

/// Supplies the caller identity used to refine rate limit keys.
pub trait IdentityExtractor: Send + Sync {
    fn identity(&self, parts: &Parts) -> Option<String>;
}

impl<F> IdentityExtractor for F
where
    F: Fn(&Parts) -> Option<String> + Send + Sync,
{
    fn identity(&self, parts: &Parts) -> Option<String> {
        self(parts)
    }
}

/// Reads the caller identity from a request header.
#[derive(Debug, Clone)]
pub struct HeaderIdentity(pub HeaderName);

impl IdentityExtractor for HeaderIdentity {
    fn identity(&self, parts: &Parts) -> Option<String> {
        parts
            .headers
            .get(&self.0)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

/// A handler wrapper applying rate limiting, CSRF and schema checks.
#[derive(Clone)]
pub struct SecureEndpoint {
    guard: Arc<Guard>,
    policy: Option<RateLimitPolicy>,
    csrf: bool,
    identity: Option<Arc<dyn IdentityExtractor>>,
}

impl SecureEndpoint {
    /// CSRF checking is on by default; rate limiting is off until a policy
    /// is set.
    pub fn new(guard: Arc<Guard>) -> Self {
        Self {
            guard,
            policy: None,
            csrf: true,
            identity: None,
        }
    }

    pub fn rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn csrf(mut self, enabled: bool) -> Self {
        self.csrf = enabled;
        self
    }

    pub fn identity(mut self, extractor: impl IdentityExtractor + 'static) -> Self {
        self.identity = Some(Arc::new(extractor));
        self
    }

    /// Run the checks, then `handler` with the untouched request.
    pub async fn call<H, Fut>(&self, request: Request, handler: H) -> Response
    where
        H: FnOnce(Request) -> Fut,
        Fut: Future<Output = anyhow::Result<Response>>,
    {
        let (parts, body) = request.into_parts();
        let decision = match self.admit(&parts) {
            Ok(decision) => decision,
            Err(response) => return response,
        };

        let method = parts.method.clone();
        let path = parts.uri.path().to_string();
        let request = Request::from_parts(parts, body);

        self.invoke(&method, &path, decision.as_ref(), async move {
            handler(request).await
        })
        .await
    }

    /// Run the checks, parse the body as `T`, then `handler`.
    pub async fn call_json<T, H, Fut>(&self, request: Request, handler: H) -> Response
    where
        T: DeserializeOwned + Validate,
        H: FnOnce(Parts, T) -> Fut,
        Fut: Future<Output = anyhow::Result<Response>>,
    {
        let (parts, body) = request.into_parts();
        let decision = match self.admit(&parts) {
            Ok(decision) => decision,
            Err(response) => return response,
        };

        let payload = match self.read_body::<T>(&parts, body).await {
            Ok(payload) => payload,
            Err(issues) => {
                info!(
                    method = %parts.method,
                    path = %parts.uri.path(),
                    issues = issues.len(),
                    "Request body rejected"
                );
                self.guard.metrics.record(Outcome::ValidationFailed);
                let response = GuardError::ValidationFailed(issues).into_response();
                return finish(response, decision.as_ref());
            }
        };

        let method = parts.method.clone();
        let path = parts.uri.path().to_string();

        self.invoke(&method, &path, decision.as_ref(), async move {
            handler(parts, payload).await
        })
        .await
    }

    /// Rate limit, then CSRF. On failure the returned response is final.
    fn admit(&self, parts: &Parts) -> Result<Option<RateLimitDecision>, Response> {
        let decision = self.policy.as_ref().map(|policy| {
            let identity = self
                .identity
                .as_ref()
                .and_then(|extractor| extractor.identity(parts));
            self.guard
                .limiter
                .check(&parts.headers, parts.uri.path(), policy, identity.as_deref())
        });

        if let Some(decision) = decision.as_ref().filter(|d| !d.allowed()) {
            self.guard.metrics.record(Outcome::Throttled);
            let error = GuardError::Throttled {
                retry_after_secs: decision.retry_after_secs().unwrap_or(1),
            };
            return Err(finish(error.into_response(), Some(decision)));
        }

        if self.csrf {
            if let Err(rejection) =
                self.guard
                    .csrf
                    .check(&parts.method, &parts.uri, &parts.headers)
            {
                self.guard.metrics.record(Outcome::CsrfRejected);
                let response = GuardError::from(rejection).into_response();
                return Err(finish(response, decision.as_ref()));
            }
        }

        Ok(decision)
    }

    async fn read_body<T>(&self, parts: &Parts, body: Body) -> Result<T, Vec<FieldIssue>>
    where
        T: DeserializeOwned + Validate,
    {
        let bytes = axum::body::to_bytes(body, self.guard.body_limit)
            .await
            .map_err(|err| {
                warn!(path = %parts.uri.path(), error = %err, "Failed to read request body");
                vec![FieldIssue::new(
                    ".",
                    format!("request body unreadable or larger than {} bytes", self.guard.body_limit),
                )]
            })?;
        parse_json::<T>(&bytes)
    }

    async fn invoke<Fut>(
        &self,
        method: &Method,
        path: &str,
        decision: Option<&RateLimitDecision>,
        handler: Fut,
    ) -> Response
    where
        Fut: Future<Output = anyhow::Result<Response>>,
    {
        let response = match AssertUnwindSafe(handler).catch_unwind().await {
            Ok(Ok(response)) => {
                self.guard.metrics.record(Outcome::Allowed);
                response
            }
            Ok(Err(err)) => {
                error!(%method, path, error = ?err, "Handler failed");
                self.guard.metrics.record(Outcome::HandlerFailed);
                GuardError::UnexpectedFailure.into_response()
            }
            Err(panic) => {
                error!(%method, path, panic = panic_message(&*panic), "Handler panicked");
                self.guard.metrics.record(Outcome::HandlerFailed);
                GuardError::UnexpectedFailure.into_response()
            }
        };
        finish(response, decision)
    }
}

fn finish(mut response: Response, decision: Option<&RateLimitDecision>) -> Response {
    if let Some(decision) = decision {
        decision.apply_headers(response.headers_mut());
    }
    response
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
