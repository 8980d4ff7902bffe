// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Attack simulation patterns for security testing.

use std::time::Duration;

/// How the simulated client fills in the `Origin` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginMode {
    /// Same origin as the target host
    SameHost,
    /// A foreign origin taken from the forged origin pool
    Forged,
}

/// How the simulated client presents CSRF tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMode {
    /// A fresh token in both cookie and header
    Valid,
    /// No token at all
    Missing,
    /// Cookie only, as a cross-site form post would send
    CookieOnly,
    /// Two different valid tokens in cookie and header
    Mismatched,
    /// A token signed with another key
    Forged,
    /// A valid token with a flipped signature character
    Tampered,
    /// A token minted more than a day before the attack
    Expired,
}

/// Attack pattern configuration.
#[derive(Debug, Clone)]
pub struct AttackConfig {
    /// Total number of requests to send
    pub total_requests: usize,
    /// Simulated time between consecutive requests
    pub interval: Duration,
    /// Number of unique IPs to simulate
    pub unique_ips: usize,
    pub origin: OriginMode,
    pub token: TokenMode,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            total_requests: 100,
            interval: Duration::from_millis(100),
            unique_ips: 1,
            origin: OriginMode::SameHost,
            token: TokenMode::Valid,
        }
    }
}

/// Predefined attack patterns.
impl AttackConfig {
    /// Single IP flood with valid credentials.
    pub fn single_ip_flood() -> Self {
        Self {
            total_requests: 200,
            interval: Duration::from_millis(10),
            ..Default::default()
        }
    }

    /// Many IPs, each staying under the per-IP ceiling.
    pub fn distributed_attack() -> Self {
        Self {
            total_requests: 500,
            interval: Duration::from_millis(10),
            unique_ips: 100,
            ..Default::default()
        }
    }

    /// Cross-site posts from foreign origins.
    pub fn forged_origin() -> Self {
        Self {
            total_requests: 50,
            unique_ips: 10,
            origin: OriginMode::Forged,
            ..Default::default()
        }
    }

    /// Forged origin flood from a single IP.
    pub fn forged_origin_flood() -> Self {
        Self {
            total_requests: 50,
            interval: Duration::from_millis(10),
            unique_ips: 1,
            origin: OriginMode::Forged,
            ..Default::default()
        }
    }

    /// Same-origin posts with a broken token presentation.
    pub fn token_attack(token: TokenMode) -> Self {
        Self {
            total_requests: 50,
            unique_ips: 10,
            token,
            ..Default::default()
        }
    }

    /// Slow drip - stay just under the strict ceiling.
    pub fn slow_drip() -> Self {
        Self {
            total_requests: 100,
            interval: Duration::from_secs(7), // ~8.6/min < 10 limit
            ..Default::default()
        }
    }

    /// Simulated duration of the attack.
    pub fn expected_duration(&self) -> Duration {
        self.interval * self.total_requests as u32
    }
}

/// Expected outcomes for different attack types.
pub struct AttackExpectations {
    /// Maximum ratio of requests that should be allowed
    pub max_allowed_ratio: f64,
    /// Description of expected behavior
    pub description: &'static str,
}

impl AttackConfig {
    /// Get expected outcomes for this attack pattern, given the per-IP
    /// ceiling of the endpoint under attack.
    pub fn expectations(&self, limit_per_window: usize, window: Duration) -> AttackExpectations {
        if self.origin == OriginMode::Forged {
            return AttackExpectations {
                max_allowed_ratio: 0.0,
                description: "Foreign origins are always refused",
            };
        }
        if self.token != TokenMode::Valid {
            return AttackExpectations {
                max_allowed_ratio: 0.0,
                description: "Requests without a matching valid token are refused",
            };
        }

        let per_ip = self.total_requests.div_ceil(self.unique_ips.max(1));
        let windows = (self.expected_duration().as_secs_f64() / window.as_secs_f64())
            .ceil()
            .max(1.0) as usize;
        let allowed_per_ip = per_ip.min(limit_per_window * windows);

        AttackExpectations {
            max_allowed_ratio: (allowed_per_ip as f64 / per_ip as f64).min(1.0),
            description: "Each IP is capped at the endpoint ceiling per window",
        }
    }
}
