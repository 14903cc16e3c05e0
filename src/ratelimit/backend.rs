//! Rate limiter trait for abstracting the store behind the HTTP service.

use async_trait::async_trait;

use super::counter::RateLimitResult;
use super::policy::LimiterRegistry;
use crate::error::{Result, WindowGuardError};

/// Trait for rate limiter implementations.
///
/// The HTTP service is generic over this trait. `LimiterRegistry` is the
/// in-process implementation; counters are not shared between processes.
#[async_trait]
pub trait RateLimiterBackend: Send + Sync {
    /// Check the rate limit for `identifier` under `policy`.
    async fn check_rate_limit(&self, policy: &str, identifier: &str) -> Result<RateLimitResult>;

    /// Discard any window for `identifier` under `policy`.
    async fn reset(&self, policy: &str, identifier: &str) -> Result<()>;

    /// The quota configured for `policy`.
    async fn limit(&self, policy: &str) -> Result<u32>;

    /// Current epoch milliseconds as seen by `policy`'s limiter.
    async fn now_millis(&self, policy: &str) -> Result<u64>;
}

#[async_trait]
impl RateLimiterBackend for LimiterRegistry {
    async fn check_rate_limit(&self, policy: &str, identifier: &str) -> Result<RateLimitResult> {
        self.check(policy, identifier)
    }

    async fn reset(&self, policy: &str, identifier: &str) -> Result<()> {
        LimiterRegistry::reset(self, policy, identifier)
    }

    async fn limit(&self, policy: &str) -> Result<u32> {
        self.get(policy)
            .map(|l| l.options().max)
            .ok_or_else(|| WindowGuardError::UnknownPolicy(policy.to_string()))
    }

    async fn now_millis(&self, policy: &str) -> Result<u64> {
        self.get(policy)
            .map(|l| l.clock().now_millis())
            .ok_or_else(|| WindowGuardError::UnknownPolicy(policy.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::counter::LimiterOptions;
    use crate::ratelimit::limiter::RateLimiter;

    fn registry() -> LimiterRegistry {
        let mut registry = LimiterRegistry::new();
        registry.insert("login", RateLimiter::new(LimiterOptions::new(60_000, 2)));
        registry
    }

    #[test]
    fn test_backend_through_trait_object() {
        let backend: Box<dyn RateLimiterBackend> = Box::new(registry());

        tokio_test::block_on(async {
            assert!(backend.check_rate_limit("login", "a").await.unwrap().success);
            assert!(backend.check_rate_limit("login", "a").await.unwrap().success);
            assert!(!backend.check_rate_limit("login", "a").await.unwrap().success);

            backend.reset("login", "a").await.unwrap();
            assert!(backend.check_rate_limit("login", "a").await.unwrap().success);

            assert_eq!(backend.limit("login").await.unwrap(), 2);
            assert!(backend.now_millis("login").await.unwrap() > 0);
        });
    }

    #[tokio::test]
    async fn test_backend_unknown_policy() {
        let backend = registry();
        assert!(matches!(
            RateLimiterBackend::limit(&backend, "other").await,
            Err(WindowGuardError::UnknownPolicy(_))
        ));
        assert!(matches!(
            backend.check_rate_limit("other", "a").await,
            Err(WindowGuardError::UnknownPolicy(_))
        ));
    }
}
