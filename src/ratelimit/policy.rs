//! Named rate limit policies.
//!
//! Each policy is an independent `RateLimiter` with its own window and quota,
//! e.g. a tight limit for authentication attempts next to a looser one for
//! general API traffic.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::clock::{Clock, SystemClock};
use super::counter::{LimiterOptions, RateLimitResult};
use super::limiter::RateLimiter;
use super::sweeper::SweeperSet;
use crate::error::{Result, WindowGuardError};

/// Authentication attempts (sign-in, email lookup).
pub const AUTH: &str = "auth";
/// Sensitive account operations.
pub const SENSITIVE: &str = "sensitive";
/// General API traffic.
pub const API: &str = "api";
/// Chat completions.
pub const CHAT: &str = "chat";
/// Image generation.
pub const IMAGE_GENERATION: &str = "image_generation";

/// The built-in policies, all with one-minute windows.
pub fn default_policies() -> BTreeMap<String, LimiterOptions> {
    const MINUTE_MS: u64 = 60 * 1000;
    [
        (AUTH, 5),
        (SENSITIVE, 3),
        (API, 100),
        (CHAT, 30),
        (IMAGE_GENERATION, 10),
    ]
    .into_iter()
    .map(|(name, max)| (name.to_string(), LimiterOptions::new(MINUTE_MS, max)))
    .collect()
}

/// A set of rate limiters addressed by policy name.
#[derive(Debug, Default)]
pub struct LimiterRegistry {
    limiters: HashMap<String, Arc<RateLimiter>>,
}

impl LimiterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from policy options, reading the system clock.
    pub fn from_policies<'a, I>(policies: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a LimiterOptions)>,
    {
        Self::from_policies_with_clock(policies, Arc::new(SystemClock))
    }

    /// Build a registry whose limiters all share `clock`.
    pub fn from_policies_with_clock<'a, I>(policies: I, clock: Arc<dyn Clock>) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a LimiterOptions)>,
    {
        let mut registry = Self::new();
        for (name, options) in policies {
            registry.insert(name, RateLimiter::with_clock(*options, clock.clone()));
        }
        registry
    }

    /// Register `limiter` under `name`, replacing any previous one.
    pub fn insert(&mut self, name: &str, limiter: RateLimiter) -> Arc<RateLimiter> {
        info!(
            policy = %name,
            window_ms = limiter.options().window_ms,
            limit = limiter.options().max,
            "Registering rate limit policy"
        );
        let limiter = Arc::new(limiter);
        self.limiters.insert(name.to_string(), limiter.clone());
        limiter
    }

    /// Get the limiter for a policy.
    pub fn get(&self, policy: &str) -> Option<Arc<RateLimiter>> {
        self.limiters.get(policy).cloned()
    }

    fn limiter(&self, policy: &str) -> Result<&Arc<RateLimiter>> {
        self.limiters
            .get(policy)
            .ok_or_else(|| WindowGuardError::UnknownPolicy(policy.to_string()))
    }

    /// Check `identifier` against a policy.
    pub fn check(&self, policy: &str, identifier: &str) -> Result<RateLimitResult> {
        Ok(self.limiter(policy)?.check(identifier))
    }

    /// Reset `identifier` under a policy.
    pub fn reset(&self, policy: &str, identifier: &str) -> Result<()> {
        self.limiter(policy)?.reset(identifier);
        Ok(())
    }

    /// Sorted policy names.
    pub fn policies(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.limiters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Start one sweeper per policy.
    pub fn start_sweepers(&self, every: Duration) -> SweeperSet {
        let mut set = SweeperSet::new();
        for limiter in self.limiters.values() {
            set.push(limiter.start_sweeper(every));
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;

    fn default_registry() -> LimiterRegistry {
        LimiterRegistry::from_policies_with_clock(
            &default_policies(),
            Arc::new(ManualClock::new(0)),
        )
    }

    #[test]
    fn test_default_policies() {
        let policies = default_policies();
        assert_eq!(policies.len(), 5);
        assert_eq!(policies[AUTH].max, 5);
        assert_eq!(policies[SENSITIVE].max, 3);
        assert_eq!(policies[API].max, 100);
        assert_eq!(policies[CHAT].max, 30);
        assert_eq!(policies[IMAGE_GENERATION].max, 10);
        assert!(policies.values().all(|o| o.window_ms == 60_000));
    }

    #[test]
    fn test_registry_policies_sorted() {
        let registry = default_registry();
        assert_eq!(
            registry.policies(),
            vec![API, AUTH, CHAT, IMAGE_GENERATION, SENSITIVE]
        );
    }

    #[test]
    fn test_policies_do_not_share_state() {
        let registry = default_registry();

        for _ in 0..3 {
            assert!(registry.check(SENSITIVE, "10.0.0.1").unwrap().success);
        }
        assert!(!registry.check(SENSITIVE, "10.0.0.1").unwrap().success);

        let result = registry.check(AUTH, "10.0.0.1").unwrap();
        assert!(result.success);
        assert_eq!(result.remaining, 4);
    }

    #[test]
    fn test_unknown_policy() {
        let registry = default_registry();

        assert!(matches!(
            registry.check("nope", "id"),
            Err(WindowGuardError::UnknownPolicy(ref p)) if p == "nope"
        ));
        assert!(matches!(
            registry.reset("nope", "id"),
            Err(WindowGuardError::UnknownPolicy(_))
        ));
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn test_registry_reset() {
        let registry = default_registry();

        for _ in 0..3 {
            registry.check(SENSITIVE, "id").unwrap();
        }
        registry.reset(SENSITIVE, "id").unwrap();

        let result = registry.check(SENSITIVE, "id").unwrap();
        assert!(result.success);
        assert_eq!(result.remaining, 2);
    }

    #[test]
    fn test_insert_replaces_policy() {
        let mut registry = LimiterRegistry::new();
        registry.insert("custom", RateLimiter::new(LimiterOptions::new(1_000, 1)));
        registry.insert("custom", RateLimiter::new(LimiterOptions::new(1_000, 7)));

        assert_eq!(registry.get("custom").unwrap().options().max, 7);
        assert_eq!(registry.policies(), vec!["custom"]);
    }

    #[tokio::test]
    async fn test_start_sweepers_one_per_policy() {
        let registry = default_registry();
        let sweepers = registry.start_sweepers(Duration::from_secs(300));
        assert_eq!(sweepers.len(), 5);
        sweepers.shutdown().await;
    }
}
