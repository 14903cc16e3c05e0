//! Background eviction of expired windows.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::clock::Clock;
use super::counter::LimiterOptions;
use super::limiter::RateLimiter;

/// Default interval between sweeps: five minutes.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Shortest interval a sweeper will run at.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to a running sweep task.
///
/// The task stops when `shutdown` is called or the handle is dropped.
pub struct SweeperHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Spawn a task that sweeps `limiter` every `every`.
    ///
    /// Must be called from within a tokio runtime. Intervals shorter than
    /// `MIN_SWEEP_INTERVAL` are raised to it.
    pub fn spawn(limiter: Arc<RateLimiter>, every: Duration) -> Self {
        let every = if every < MIN_SWEEP_INTERVAL {
            warn!(
                requested_ms = every.as_millis() as u64,
                "Sweep interval too short, using minimum"
            );
            MIN_SWEEP_INTERVAL
        } else {
            every
        };
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + every;
            let mut ticker = tokio::time::interval_at(start, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.sweep_expired();
                        debug!(
                            removed = removed,
                            remaining = limiter.record_count(),
                            "Swept expired rate limit windows"
                        );
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        info!(interval_ms = every.as_millis() as u64, "Rate limit sweeper started");

        Self {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// Whether the sweep task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Stop the sweep task and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Rate limit sweeper exited abnormally");
                return;
            }
        }
        info!("Rate limit sweeper stopped");
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl RateLimiter {
    /// Create a shared limiter on the system clock that is already being
    /// swept every `DEFAULT_SWEEP_INTERVAL`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(options: LimiterOptions) -> (Arc<Self>, SweeperHandle) {
        let limiter = Arc::new(Self::new(options));
        let sweeper = limiter.start_sweeper(DEFAULT_SWEEP_INTERVAL);
        (limiter, sweeper)
    }

    /// Like `spawn`, with an explicit clock and sweep interval.
    pub fn spawn_with_clock(
        options: LimiterOptions,
        clock: Arc<dyn Clock>,
        every: Duration,
    ) -> (Arc<Self>, SweeperHandle) {
        let limiter = Arc::new(Self::with_clock(options, clock));
        let sweeper = limiter.start_sweeper(every);
        (limiter, sweeper)
    }

    /// Start sweeping this limiter in the background.
    pub fn start_sweeper(self: &Arc<Self>, every: Duration) -> SweeperHandle {
        SweeperHandle::spawn(Arc::clone(self), every)
    }
}

/// A group of sweepers stopped together.
#[derive(Default)]
pub struct SweeperSet {
    handles: Vec<SweeperHandle>,
}

impl SweeperSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: SweeperHandle) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop every sweeper and wait for all of them.
    pub async fn shutdown(self) {
        for handle in self.handles {
            handle.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_expired_records() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = Arc::new(RateLimiter::with_clock(
            LimiterOptions::new(60_000, 5),
            clock.clone(),
        ));

        limiter.check("idle");
        clock.set(70_000);
        limiter.check("active");
        assert_eq!(limiter.record_count(), 2);

        let handle = limiter.start_sweeper(DEFAULT_SWEEP_INTERVAL);

        // Nothing happens before the first interval elapses.
        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(limiter.record_count(), 2);

        tokio::time::sleep(Duration::from_secs(241)).await;
        settle().await;
        assert_eq!(limiter.record_count(), 1);
        assert!(limiter.record("active").is_some());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_task() {
        let limiter = Arc::new(RateLimiter::default());
        let handle = limiter.start_sweeper(Duration::from_millis(10));
        assert!(!handle.is_finished());

        handle.shutdown().await;
        // The task held the only other reference.
        assert_eq!(Arc::strong_count(&limiter), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_task() {
        let limiter = Arc::new(RateLimiter::default());
        let handle = limiter.start_sweeper(Duration::from_millis(10));
        drop(handle);

        settle().await;
        assert_eq!(Arc::strong_count(&limiter), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_raised_to_minimum() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = Arc::new(RateLimiter::with_clock(
            LimiterOptions::new(1_000, 5),
            clock.clone(),
        ));
        limiter.check("id");
        clock.set(2_000);

        let handle = limiter.start_sweeper(Duration::ZERO);

        tokio::time::sleep(Duration::from_millis(5)).await;
        settle().await;
        assert!(!handle.is_finished());
        assert_eq!(limiter.record_count(), 0);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_sweeps_by_default() {
        let clock = Arc::new(ManualClock::new(0));
        let (limiter, handle) = RateLimiter::spawn_with_clock(
            LimiterOptions::new(60_000, 5),
            clock.clone(),
            DEFAULT_SWEEP_INTERVAL,
        );

        limiter.check("idle");
        clock.set(61_000);

        tokio::time::sleep(DEFAULT_SWEEP_INTERVAL + Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(limiter.record_count(), 0);

        handle.shutdown().await;
        assert_eq!(Arc::strong_count(&limiter), 1);
    }

    #[tokio::test]
    async fn test_spawn_uses_given_options() {
        let (limiter, handle) = RateLimiter::spawn(LimiterOptions::new(30_000, 2));
        assert_eq!(*limiter.options(), LimiterOptions::new(30_000, 2));
        assert!(!handle.is_finished());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_sweeper_set_shutdown() {
        let mut set = SweeperSet::new();
        assert!(set.is_empty());

        for _ in 0..3 {
            let limiter = Arc::new(RateLimiter::default());
            set.push(limiter.start_sweeper(DEFAULT_SWEEP_INTERVAL));
        }
        assert_eq!(set.len(), 3);

        set.shutdown().await;
    }
}
