//! Rate limiting logic and state management.

mod backend;
mod clock;
mod counter;
mod limiter;
mod policy;
mod sweeper;

pub use backend::RateLimiterBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::{LimiterOptions, RateLimitRecord, RateLimitResult, DEFAULT_MAX, DEFAULT_WINDOW_MS};
pub use limiter::{Denial, RateLimiter, DENIAL_MESSAGE};
pub use policy::{default_policies, LimiterRegistry};
pub use sweeper::{SweeperHandle, SweeperSet, DEFAULT_SWEEP_INTERVAL, MIN_SWEEP_INTERVAL};

/// Built-in policy names.
pub mod policies {
    pub use super::policy::{API, AUTH, CHAT, IMAGE_GENERATION, SENSITIVE};
}
