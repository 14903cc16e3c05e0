//! Per-identifier window records and limiter options.

use serde::{Deserialize, Serialize};

/// Default window length: one minute.
pub const DEFAULT_WINDOW_MS: u64 = 60 * 1000;
/// Default number of requests allowed per window.
pub const DEFAULT_MAX: u32 = 5;

/// Policy for a single limiter: `max` requests per `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterOptions {
    /// Window duration in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    /// Maximum requests allowed in one window
    #[serde(default = "default_max")]
    pub max: u32,
}

impl LimiterOptions {
    pub fn new(window_ms: u64, max: u32) -> Self {
        Self { window_ms, max }
    }
}

impl Default for LimiterOptions {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
            max: DEFAULT_MAX,
        }
    }
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

fn default_max() -> u32 {
    DEFAULT_MAX
}

/// The state of one identifier's current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    /// Requests observed in the current window
    pub count: u32,
    /// Epoch milliseconds at which the window expires
    pub reset_at: u64,
}

impl RateLimitRecord {
    /// Open a fresh window at `now` holding a single request.
    pub fn open(now: u64, options: &LimiterOptions) -> Self {
        Self {
            count: 1,
            reset_at: now.saturating_add(options.window_ms),
        }
    }

    /// A record is expired strictly after its reset instant.
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.reset_at
    }
}

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResult {
    /// Whether the request is allowed
    pub success: bool,
    /// Requests left in the current window
    pub remaining: u32,
    /// Epoch milliseconds at which the window resets
    pub reset_at: u64,
}

impl RateLimitResult {
    /// Whole seconds until the window resets, rounded up.
    pub fn retry_after_secs(&self, now: u64) -> u64 {
        self.reset_at.saturating_sub(now).div_ceil(1000)
    }

    /// The reset instant in epoch seconds, rounded up.
    pub fn reset_at_secs(&self) -> u64 {
        self.reset_at.div_ceil(1000)
    }
}
