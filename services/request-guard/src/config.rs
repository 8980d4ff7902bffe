// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the request guard.
//!
//! Loaded from environment variables at startup:
//!
//! - `BIND_ADDR`: server bind address (default: 0.0.0.0:8080)
//! - `APP_ENV`: `development` or `production` (default: production)
//! - `CSRF_SECRET`: token signing secret, falling back to `SESSION_SECRET`
//! - `ALLOWED_ORIGINS`: comma-separated extra trusted origins
//! - `RATE_LIMIT_SWEEP_SECS`: janitor interval (default: 300)
//! - `BODY_LIMIT_BYTES`: maximum request body size (default: 1 MiB)
//! - `METRICS_ENABLED`: expose Prometheus metrics (default: true)
//!
//! A missing or short signing secret is a startup error. There is no
//! built-in fallback secret.

use crate::token::SigningSecret;
use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Minimum accepted length of the signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Routes served by the binary that the metrics path may not replace.
const RESERVED_PATHS: &[&str] = &["/", "/health", "/healthz", "/api/csrf-token", "/api/echo"];

/// Longest window a policy may declare (one year).
const MAX_WINDOW_MS: u64 = 366 * 24 * 60 * 60 * 1000;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no signing secret configured: set CSRF_SECRET (or SESSION_SECRET)")]
    MissingSecret,

    #[error("signing secret too short: {len} bytes, need at least {min}")]
    WeakSecret { len: usize, min: usize },

    #[error("unknown environment {0:?}: expected \"development\" or \"production\"")]
    InvalidEnvironment(String),

    #[error("invalid value for {var}: {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),

    #[error("invalid rate limit policy {name}: {reason}")]
    InvalidPolicy { name: &'static str, reason: &'static str },

    #[error("invalid metrics path {0:?}: must start with '/' and not shadow another route")]
    InvalidMetricsPath(String),

    #[error("failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(ConfigError::InvalidEnvironment(s.to_string())),
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Deployment environment (default: production)
    #[serde(default)]
    pub environment: Environment,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// CSRF configuration
    #[serde(default)]
    pub csrf: CsrfConfig,

    /// Maximum accepted request body size in bytes (default: 1 MiB)
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// An immutable request ceiling over a fixed window.
///
/// Both values are positive and the window is at most one year. Every
/// constructor, deserialization included, enforces this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PolicyFields")]
pub struct RateLimitPolicy {
    window_ms: u64,
    max_requests: u32,
}

#[derive(Deserialize)]
struct PolicyFields {
    window_ms: u64,
    max_requests: u32,
}

impl TryFrom<PolicyFields> for RateLimitPolicy {
    type Error = ConfigError;

    fn try_from(fields: PolicyFields) -> Result<Self, Self::Error> {
        Self::from_millis(fields.window_ms, fields.max_requests)
    }
}

impl RateLimitPolicy {
    /// Five attempts per fifteen minutes, for credential endpoints.
    pub const AUTH: Self = Self {
        window_ms: 15 * 60 * 1000,
        max_requests: 5,
    };

    /// A hundred requests per minute, for general reads.
    pub const API: Self = Self {
        window_ms: 60 * 1000,
        max_requests: 100,
    };

    /// Ten requests per minute, for expensive writes.
    pub const STRICT: Self = Self {
        window_ms: 60 * 1000,
        max_requests: 10,
    };

    pub fn new(window: Duration, max_requests: u32) -> Result<Self, ConfigError> {
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        Self::from_millis(window_ms, max_requests)
    }

    pub fn from_millis(window_ms: u64, max_requests: u32) -> Result<Self, ConfigError> {
        let policy = Self {
            window_ms,
            max_requests,
        };
        policy.validate("custom")?;
        Ok(policy)
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Window length as a chrono duration.
    pub fn window(&self) -> ChronoDuration {
        ChronoDuration::milliseconds(self.window_ms.min(MAX_WINDOW_MS) as i64)
    }

    fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        if self.window_ms == 0 {
            return Err(ConfigError::InvalidPolicy {
                name,
                reason: "window must be positive",
            });
        }
        if self.window_ms > MAX_WINDOW_MS {
            return Err(ConfigError::InvalidPolicy {
                name,
                reason: "window longer than one year",
            });
        }
        if self.max_requests == 0 {
            return Err(ConfigError::InvalidPolicy {
                name,
                reason: "max_requests must be positive",
            });
        }
        Ok(())
    }
}

/// Named rate limit policies and janitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Policy for authentication endpoints (default: 5 per 15 minutes)
    #[serde(default = "default_auth_policy")]
    pub auth: RateLimitPolicy,

    /// Policy for general API reads (default: 100 per minute)
    #[serde(default = "default_api_policy")]
    pub api: RateLimitPolicy,

    /// Policy for expensive writes (default: 10 per minute)
    #[serde(default = "default_strict_policy")]
    pub strict: RateLimitPolicy,

    /// Interval between expired-entry sweeps in seconds (default: 300)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// CSRF token and origin configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfConfig {
    /// Cookie carrying the token (default: csrf_token)
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Request header echoing the token (default: x-csrf-token)
    #[serde(default = "default_header_name")]
    pub header_name: String,

    /// Token lifetime in seconds (default: 86400)
    #[serde(default = "default_token_validity_secs")]
    pub token_validity_secs: u64,

    /// Origins trusted in addition to the request's own host
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Signing secret, never serialized
    #[serde(skip)]
    pub secret: Option<SigningSecret>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_body_limit() -> usize {
    1024 * 1024
}

fn default_auth_policy() -> RateLimitPolicy {
    RateLimitPolicy::AUTH
}

fn default_api_policy() -> RateLimitPolicy {
    RateLimitPolicy::API
}

fn default_strict_policy() -> RateLimitPolicy {
    RateLimitPolicy::STRICT
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_cookie_name() -> String {
    "csrf_token".to_string()
}

fn default_header_name() -> String {
    "x-csrf-token".to_string()
}

fn default_token_validity_secs() -> u64 {
    24 * 60 * 60
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            environment: Environment::default(),
            rate_limit: RateLimitConfig::default(),
            csrf: CsrfConfig::default(),
            body_limit_bytes: default_body_limit(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            auth: default_auth_policy(),
            api: default_api_policy(),
            strict: default_strict_policy(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            header_name: default_header_name(),
            token_validity_secs: default_token_validity_secs(),
            allowed_origins: Vec::new(),
            secret: None,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl RateLimitConfig {
    /// Get the janitor interval
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl CsrfConfig {
    /// Get the token validity window
    pub fn token_validity(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.token_validity_secs.min(MAX_WINDOW_MS / 1000) as i64)
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(addr) = lookup("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(env) = lookup("APP_ENV") {
            config.environment = env.parse()?;
        }

        let secret = lookup("CSRF_SECRET")
            .filter(|s| !s.is_empty())
            .or_else(|| lookup("SESSION_SECRET").filter(|s| !s.is_empty()))
            .ok_or(ConfigError::MissingSecret)?;
        config.csrf.secret = Some(SigningSecret::new(secret.into_bytes())?);

        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            config.csrf.allowed_origins = parse_origin_list(&origins);
        }
        if let Some(value) = lookup("RATE_LIMIT_SWEEP_SECS") {
            config.rate_limit.sweep_interval_secs = parse_number("RATE_LIMIT_SWEEP_SECS", &value)?;
        }
        if let Some(value) = lookup("BODY_LIMIT_BYTES") {
            config.body_limit_bytes = parse_number("BODY_LIMIT_BYTES", &value)?;
        }
        if let Some(value) = lookup("METRICS_ENABLED") {
            config.metrics.enabled = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        var: "METRICS_ENABLED",
                        value,
                    })
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rate_limit.auth.validate("auth")?;
        self.rate_limit.api.validate("api")?;
        self.rate_limit.strict.validate("strict")?;

        let path = &self.metrics.path;
        if self.metrics.enabled && (!path.starts_with('/') || RESERVED_PATHS.contains(&path.as_str())) {
            return Err(ConfigError::InvalidMetricsPath(path.clone()));
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: value.to_string(),
    })
}

/// Split a comma-separated origin list, trimming entries and trailing slashes.
pub fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/'))
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}
