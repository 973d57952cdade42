//! Fixed-window rate limiting keyed by client identifier.
//!
//! One [`RateLimitStore`] exists per protected route family. Records live in
//! memory only and are per-process: separate instances never share counters.
//! Expired records are dropped by an inline probabilistic sweep on `admit`
//! and, when enabled, by a periodic background task.

use dashmap::DashMap;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::config::LimitSpec;
use crate::metrics::RATE_LIMIT_RECORDS;

/// Chance that an `admit` call also sweeps expired records.
const SWEEP_PROBABILITY: f64 = 0.01;

// Rate limit record - one per client identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub count: u32,
    pub window_reset_at: i64, // epoch ms
}

/// Snapshot of a store's view of one identifier, used for response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at_ms: i64,
}

pub struct RateLimitStore {
    family: &'static str,
    limit: u32,
    window_ms: i64,
    records: DashMap<String, RateLimitRecord>,
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl RateLimitStore {
    pub fn new(family: &'static str, limits: LimitSpec) -> Self {
        Self {
            family,
            limit: limits.limit,
            window_ms: limits.window.as_millis() as i64,
            records: DashMap::new(),
        }
    }

    pub fn family(&self) -> &'static str {
        self.family
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms as u64)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn admit(&self, identifier: &str) -> bool {
        self.admit_at(identifier, now_ms())
    }

    pub fn admit_at(&self, identifier: &str, now: i64) -> bool {
        let sweep = rand::thread_rng().gen_bool(SWEEP_PROBABILITY);
        self.admit_at_with(identifier, now, sweep)
    }

    /// `admit_at` with the inline sweep decided by the caller.
    pub fn admit_at_with(&self, identifier: &str, now: i64, sweep: bool) -> bool {
        let admitted = {
            let mut record = self
                .records
                .entry(identifier.to_string())
                .or_insert(RateLimitRecord {
                    count: 0,
                    window_reset_at: now + self.window_ms,
                });

            // window expired (or brand new)..? start over
            if record.count == 0 || now >= record.window_reset_at {
                record.count = 1;
                record.window_reset_at = now + self.window_ms;
                true
            } else if record.count >= self.limit {
                false
            } else {
                record.count += 1;
                true
            }
        };

        // shard guard is released above; retain would deadlock otherwise
        if sweep {
            let evicted = self.sweep_at(now);
            if evicted > 0 {
                tracing::debug!(family = self.family, evicted, "inline sweep of expired records");
            }
        }

        admitted
    }

    /// Would `admit` let this identifier through right now? Never mutates.
    pub fn peek(&self, identifier: &str) -> Quota {
        self.peek_at(identifier, now_ms())
    }

    pub fn peek_at(&self, identifier: &str, now: i64) -> Quota {
        match self.records.get(identifier) {
            Some(record) if now < record.window_reset_at => Quota {
                allowed: record.count < self.limit,
                limit: self.limit,
                remaining: self.limit.saturating_sub(record.count),
                reset_at_ms: record.window_reset_at,
            },
            _ => Quota {
                allowed: true,
                limit: self.limit,
                remaining: self.limit,
                reset_at_ms: now + self.window_ms,
            },
        }
    }

    // expired records read as absent, same as in peek
    pub fn remaining(&self, identifier: &str) -> u32 {
        self.peek(identifier).remaining
    }

    pub fn reset_at(&self, identifier: &str) -> i64 {
        self.peek(identifier).reset_at_ms
    }

    /// Current counters after a request was admitted, for X-RateLimit-* headers.
    pub fn quota(&self, identifier: &str) -> Quota {
        Quota {
            allowed: true,
            ..self.peek(identifier)
        }
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(now_ms())
    }

    pub fn sweep_at(&self, now: i64) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| now < record.window_reset_at);
        let after = self.records.len();
        RATE_LIMIT_RECORDS
            .with_label_values(&[self.family])
            .set(after as i64);
        before.saturating_sub(after)
    }

    #[cfg(test)]
    pub(crate) fn record(&self, identifier: &str) -> Option<RateLimitRecord> {
        self.records.get(identifier).map(|r| *r)
    }
}

// Periodic sweep - same interval loop shape as a health checker
pub async fn sweeper(stores: Vec<Arc<RateLimitStore>>, every: Duration) {
    let mut ticker = interval(every);
    // first tick fires immediately, nothing to evict yet
    ticker.tick().await;

    tracing::info!(interval = ?every, stores = stores.len(), "rate limit sweeper started");

    loop {
        ticker.tick().await;

        for store in &stores {
            let evicted = store.sweep();
            if evicted > 0 {
                tracing::info!(
                    family = store.family(),
                    evicted,
                    remaining = store.len(),
                    "evicted expired rate limit records"
                );
            }
        }
    }
}
