// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Request Guard
//!
//! Request-boundary defenses for the bastion's HTTP services:
//!
//! - Fixed-window rate limiting keyed by client IP, endpoint path and an
//!   optional caller identity
//! - CSRF protection with stateless HMAC-signed double-submit tokens
//! - Origin/Referer verification against the request host
//! - A [`SecureEndpoint`] composer that runs these checks in a fixed order,
//!   validates JSON bodies and turns handler failures into generic 500s
//!
//! Rate limiting state lives in process memory. Running several replicas
//! multiplies the effective limits.

pub mod clock;
pub mod config;
pub mod csrf;
pub mod endpoint;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod metrics;
pub mod origin;
pub mod schema;
pub mod store;
pub mod token;

pub use config::{Config, ConfigError, RateLimitPolicy};
pub use csrf::{CsrfGuard, CsrfRejection};
pub use endpoint::{Guard, HeaderIdentity, IdentityExtractor, SecureEndpoint};
pub use error::GuardError;
pub use limiter::{RateLimitDecision, RateLimiter};
pub use origin::OriginVerifier;
pub use schema::{FieldIssue, Validate};
pub use token::{SigningSecret, TokenCodec, TokenError};
