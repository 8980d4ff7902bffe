// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Rate limiter policy layer.
//!
//! Turns a counter acquisition into an allow/deny decision and the standard
//! `X-RateLimit-*` response headers. Requests are keyed by
//! `client-ip:endpoint-path[:caller-id]`, so an absent identity only makes
//! the key coarser.

use crate::clock::Clock;
use crate::config::RateLimitPolicy;
use crate::store::{Acquisition, CounterStore};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use chrono::SecondsFormat;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Composite counter key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimitKey(String);

impl LimitKey {
    pub fn new(ip: &str, path: &str, identity: Option<&str>) -> Self {
        let path = normalize_path(path);
        match identity.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => Self(format!("{ip}:{path}:{id}")),
            None => Self(format!("{ip}:{path}")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub key: LimitKey,
    pub acquisition: Acquisition,
}

impl RateLimitDecision {
    pub fn allowed(&self) -> bool {
        self.acquisition.allowed
    }

    pub fn remaining(&self) -> u32 {
        self.acquisition.remaining
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        self.acquisition.retry_after_secs
    }

    /// Write the rate limit headers, plus `Retry-After` when denied.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        let acq = &self.acquisition;
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(acq.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(acq.remaining));

        let reset = acq.reset_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        if let Ok(value) = HeaderValue::from_str(&reset) {
            headers.insert(X_RATELIMIT_RESET, value);
        }

        if let (false, Some(secs)) = (acq.allowed, acq.retry_after_secs) {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
    }

    /// The headers as a fresh map.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        self.apply_headers(&mut headers);
        headers
    }
}

/// Rate limiter owning the shared counter store.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Count this request and decide whether it may proceed.
    pub fn check(
        &self,
        headers: &HeaderMap,
        path: &str,
        policy: &RateLimitPolicy,
        identity: Option<&str>,
    ) -> RateLimitDecision {
        let ip = client_ip(headers);
        let key = LimitKey::new(&ip, path, identity);
        let acquisition = self.store.acquire(key.as_str(), policy, self.clock.now());

        if acquisition.allowed {
            debug!(key = %key, remaining = acquisition.remaining, "Request allowed");
        } else {
            info!(
                key = %key,
                limit = acquisition.limit,
                retry_after_secs = ?acquisition.retry_after_secs,
                "Request rate limited"
            );
        }

        RateLimitDecision { key, acquisition }
    }

    /// Remove expired counters. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        self.store.sweep(self.clock.now())
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("tracked_keys", &self.tracked_keys())
            .finish_non_exhaustive()
    }
}

/// Client address from proxy headers: first `X-Forwarded-For` hop, then
/// `X-Real-IP`, then `"unknown"`.
pub fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or("unknown")
        .to_string()
}

/// Normalize an endpoint path for keying: drop query and fragment, collapse
/// repeated slashes and drop a trailing slash.
pub fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}
