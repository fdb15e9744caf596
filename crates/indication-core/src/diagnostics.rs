//! Cache diagnostics.
//!
//! Cache failures never reach callers, so each cache reports what happened
//! through structured `tracing` events (field `cache.event`) and counters.
//! Operators can then tell a degraded cache from a healthy empty one.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

/// What happened on one cache interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    Hit,
    Miss,
    /// Read failed or returned an undecodable payload; treated as a miss.
    ReadDegraded,
    /// Write failed; the caller's result was unaffected.
    WriteDegraded,
}

impl CacheEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheEvent::Hit => "hit",
            CacheEvent::Miss => "miss",
            CacheEvent::ReadDegraded => "read_degraded",
            CacheEvent::WriteDegraded => "write_degraded",
        }
    }
}

/// Point-in-time counter snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub read_failures: u64,
    pub write_failures: u64,
}

impl CacheStats {
    /// Hit rate over all reads (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.read_failures;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Whether any read or write has failed.
    pub fn is_degraded(&self) -> bool {
        self.read_failures > 0 || self.write_failures > 0
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    read_failures: AtomicU64,
    write_failures: AtomicU64,
}

/// Shared counters for one named cache. Clones share the same counters.
#[derive(Debug, Clone)]
pub struct CacheDiagnostics {
    cache: &'static str,
    counters: Arc<Counters>,
}

impl CacheDiagnostics {
    pub fn new(cache: &'static str) -> Self {
        Self {
            cache,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.cache
    }

    /// Count the event and emit it.
    pub fn record(&self, event: CacheEvent, key: &str) {
        self.count(event);
        match event {
            CacheEvent::Hit | CacheEvent::Miss => {
                debug!(cache = self.cache, cache.event = event.as_str(), %key, "cache lookup");
            }
            CacheEvent::ReadDegraded | CacheEvent::WriteDegraded => {
                warn!(cache = self.cache, cache.event = event.as_str(), %key, "cache degraded");
            }
        }
    }

    /// Count a degraded event and emit it once, with its cause.
    pub fn record_failure(&self, event: CacheEvent, key: &str, error: &dyn fmt::Display) {
        self.count(event);
        warn!(
            cache = self.cache,
            cache.event = event.as_str(),
            %key,
            error = %error,
            "cache degraded"
        );
    }

    fn count(&self, event: CacheEvent) {
        let counter = match event {
            CacheEvent::Hit => &self.counters.hits,
            CacheEvent::Miss => &self.counters.misses,
            CacheEvent::ReadDegraded => &self.counters.read_failures,
            CacheEvent::WriteDegraded => &self.counters.write_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            read_failures: self.counters.read_failures.load(Ordering::Relaxed),
            write_failures: self.counters.write_failures.load(Ordering::Relaxed),
        }
    }
}
