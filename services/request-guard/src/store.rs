// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fixed-window request counters.
//!
//! Each limit key owns a counter and the instant its window closes. A request
//! arriving before that instant increments the counter; the first request at
//! or after it replaces the entry with a fresh window. Bursts straddling a
//! window boundary can therefore reach roughly twice the nominal rate.
//!
//! Entries are only ever removed by [`CounterStore::sweep`] or overwritten on
//! the next access, so memory is bounded by the set of keys seen within the
//! last window plus one sweep interval.

use crate::config::RateLimitPolicy;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Outcome of a single counter acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquisition {
    /// Whether the request fits in the current window
    pub allowed: bool,
    /// The policy's request ceiling
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// When the current window closes
    pub reset_at: DateTime<Utc>,
    /// Seconds until a denied caller may retry
    pub retry_after_secs: Option<u64>,
}

/// Storage behind the rate limiter.
///
/// Implementations must make `acquire` linearizable per key. A shared
/// external store with atomic increment and TTL can replace [`MemoryStore`]
/// without the limiter noticing.
pub trait CounterStore: Send + Sync {
    /// Count one request against `key` and report whether it is allowed.
    fn acquire(&self, key: &str, policy: &RateLimitPolicy, now: DateTime<Utc>) -> Acquisition;

    /// Drop every entry whose window closed at or before `now`.
    /// Returns the number of entries removed.
    fn sweep(&self, now: DateTime<Utc>) -> usize;

    /// Number of tracked keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Process-local counter store guarded by a single mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for MemoryStore {
    fn acquire(&self, key: &str, policy: &RateLimitPolicy, now: DateTime<Utc>) -> Acquisition {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = entries.get_mut(key).filter(|e| now < e.reset_at) {
            entry.count = entry.count.saturating_add(1);

            if entry.count > policy.max_requests() {
                let millis = (entry.reset_at - now).num_milliseconds().max(0) as u64;
                return Acquisition {
                    allowed: false,
                    limit: policy.max_requests(),
                    remaining: 0,
                    reset_at: entry.reset_at,
                    retry_after_secs: Some(millis.div_ceil(1000).max(1)),
                };
            }

            return Acquisition {
                allowed: true,
                limit: policy.max_requests(),
                remaining: policy.max_requests() - entry.count,
                reset_at: entry.reset_at,
                retry_after_secs: None,
            };
        }

        let reset_at = now + policy.window();
        entries.insert(key.to_string(), Entry { count: 1, reset_at });

        Acquisition {
            allowed: true,
            limit: policy.max_requests(),
            remaining: policy.max_requests().saturating_sub(1),
            reset_at,
            retry_after_secs: None,
        }
    }

    fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| now < entry.reset_at);
        before - entries.len()
    }

    fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
