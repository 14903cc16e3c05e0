//! Core fixed-window rate limiter.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::counter::{LimiterOptions, RateLimitRecord, RateLimitResult};
use crate::error::{Result, WindowGuardError};

/// Body returned with every 429 response.
pub const DENIAL_MESSAGE: &str = "Too many requests";

/// A fixed-window rate limiter keyed by caller-chosen identifiers.
///
/// The window for an identifier opens on its first request and stays fixed
/// until it expires; requests beyond `max` inside the window are denied
/// without extending it. Each check is an atomic read-modify-write on the
/// identifier's shard of the store, so the limiter can be shared freely
/// across threads behind an `Arc`.
pub struct RateLimiter {
    /// Live windows indexed by identifier
    store: DashMap<String, RateLimitRecord>,
    /// Window length and quota
    options: LimiterOptions,
    /// Source of the current time
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter that reads the system clock.
    pub fn new(options: LimiterOptions) -> Self {
        Self::with_clock(options, Arc::new(SystemClock))
    }

    /// Create a limiter with an explicit time source.
    pub fn with_clock(options: LimiterOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: DashMap::new(),
            options,
            clock,
        }
    }

    /// Record a request for `identifier` and decide whether it is allowed.
    pub fn check(&self, identifier: &str) -> RateLimitResult {
        let now = self.clock.now_millis();

        trace!(identifier = %identifier, now = now, "Checking rate limit");

        if self.options.max == 0 {
            return RateLimitResult {
                success: false,
                remaining: 0,
                reset_at: now.saturating_add(self.options.window_ms),
            };
        }

        match self.store.entry(identifier.to_string()) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();

                if record.is_expired(now) {
                    *record = RateLimitRecord::open(now, &self.options);
                    debug!(
                        identifier = %identifier,
                        reset_at = record.reset_at,
                        "Window expired, opening a new one"
                    );
                    return self.opened(record);
                }

                if record.count >= self.options.max {
                    debug!(
                        identifier = %identifier,
                        count = record.count,
                        limit = self.options.max,
                        "Rate limit exceeded"
                    );
                    return RateLimitResult {
                        success: false,
                        remaining: 0,
                        reset_at: record.reset_at,
                    };
                }

                record.count += 1;
                RateLimitResult {
                    success: true,
                    remaining: self.options.max - record.count,
                    reset_at: record.reset_at,
                }
            }
            Entry::Vacant(vacant) => {
                let record = RateLimitRecord::open(now, &self.options);
                debug!(
                    identifier = %identifier,
                    limit = self.options.max,
                    reset_at = record.reset_at,
                    "Creating new rate limit window"
                );
                vacant.insert(record);
                self.opened(&record)
            }
        }
    }

    fn opened(&self, record: &RateLimitRecord) -> RateLimitResult {
        RateLimitResult {
            success: true,
            remaining: self.options.max - record.count,
            reset_at: record.reset_at,
        }
    }

    /// Check, turning a denial into `WindowGuardError::RateLimited`.
    pub fn check_or_reject(&self, identifier: &str) -> Result<RateLimitResult> {
        let result = self.check(identifier);
        if result.success {
            return Ok(result);
        }
        Err(WindowGuardError::RateLimited {
            retry_after_secs: result.retry_after_secs(self.clock.now_millis()),
        })
    }

    /// Check, returning the 429 payload when the request is denied.
    pub fn check_or_deny(&self, identifier: &str) -> Option<Denial> {
        let result = self.check(identifier);
        if result.success {
            return None;
        }
        Some(Denial::new(
            result,
            self.options.max,
            self.clock.now_millis(),
        ))
    }

    /// Forget everything about `identifier`; its next check opens a new window.
    pub fn reset(&self, identifier: &str) {
        if self.store.remove(identifier).is_some() {
            debug!(identifier = %identifier, "Rate limit window reset");
        }
    }

    /// Remove every record whose window has passed.
    ///
    /// Returns the number of records removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut removed = 0;
        self.store.retain(|_, record| {
            let keep = !record.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Get the current record for `identifier`, if one is stored.
    ///
    /// Expired records are returned until they are swept or replaced.
    pub fn record(&self, identifier: &str) -> Option<RateLimitRecord> {
        self.store.get(identifier).map(|r| *r)
    }

    /// Get the number of stored records.
    pub fn record_count(&self) -> usize {
        self.store.len()
    }

    /// Get the limiter's options.
    pub fn options(&self) -> &LimiterOptions {
        &self.options
    }

    /// Get the limiter's clock.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(LimiterOptions::default())
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("options", &self.options)
            .field("records", &self.store.len())
            .finish()
    }
}

/// A denied request, carrying what an HTTP 429 response needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    /// The failed check
    pub result: RateLimitResult,
    /// The limiter's quota
    pub limit: u32,
    /// Seconds until the window resets, rounded up
    pub retry_after_secs: u64,
}

impl Denial {
    pub fn new(result: RateLimitResult, limit: u32, now: u64) -> Self {
        Self {
            result,
            limit,
            retry_after_secs: result.retry_after_secs(now),
        }
    }

    /// Response headers: `Retry-After` and the `X-RateLimit-*` family.
    pub fn headers(&self) -> [(&'static str, String); 4] {
        [
            ("retry-after", self.retry_after_secs.to_string()),
            ("x-ratelimit-limit", self.limit.to_string()),
            ("x-ratelimit-remaining", "0".to_string()),
            ("x-ratelimit-reset", self.result.reset_at_secs().to_string()),
        ]
    }

    /// JSON response body.
    pub fn body(&self) -> serde_json::Value {
        serde_json::json!({ "error": DENIAL_MESSAGE })
    }
}
