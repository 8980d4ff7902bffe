// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus metrics for guard decisions.

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::error;

/// Terminal outcome of a guarded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Allowed,
    Throttled,
    CsrfRejected,
    ValidationFailed,
    HandlerFailed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Throttled => "throttled",
            Self::CsrfRejected => "csrf_rejected",
            Self::ValidationFailed => "validation_failed",
            Self::HandlerFailed => "handler_failed",
        }
    }
}

/// Metric handles, registered in a private registry.
#[derive(Clone)]
pub struct GuardMetrics {
    registry: Registry,
    decisions: IntCounterVec,
    tracked_keys: IntGauge,
}

impl GuardMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let decisions = IntCounterVec::new(
            Opts::new(
                "request_guard_decisions_total",
                "Guarded requests by terminal outcome",
            ),
            &["outcome"],
        )?;
        let tracked_keys = IntGauge::new(
            "request_guard_tracked_keys",
            "Rate limit keys currently held in memory",
        )?;

        registry.register(Box::new(decisions.clone()))?;
        registry.register(Box::new(tracked_keys.clone()))?;

        Ok(Self {
            registry,
            decisions,
            tracked_keys,
        })
    }

    pub fn record(&self, outcome: Outcome) {
        self.decisions.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn count(&self, outcome: Outcome) -> u64 {
        self.decisions.with_label_values(&[outcome.as_str()]).get()
    }

    pub fn set_tracked_keys(&self, keys: usize) {
        self.tracked_keys.set(keys as i64);
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(err) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            error!(error = %err, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl std::fmt::Debug for GuardMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardMetrics").finish_non_exhaustive()
    }
}
