//! Bounded polling for timing-dependent setup steps.
//!
//! This module provides a poll-until-true loop with a hard ceiling. It backs
//! the liveness wait during probe setup and any other check that needs to
//! wait for the cluster to converge.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Polling schedule: delays grow by `multiplier` up to `max_delay`, and the
/// whole loop gives up after `timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub timeout: Duration,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
}

impl PollPolicy {
    /// Poll at a fixed interval until `timeout`.
    pub fn fixed(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            initial_delay: interval,
            max_delay: interval,
            multiplier: 1,
        }
    }

    /// Same schedule with a different ceiling.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Categories of eventual consistency with documented SLAs.
#[derive(Debug, Clone, Copy)]
pub enum ConsistencyCategory {
    /// Application answering its root endpoint after rollout (5 min, fixed 2s poll)
    ApplicationLiveness,

    /// Router admitting a freshly created route (60s)
    RouteAdmission,
}

impl ConsistencyCategory {
    /// Get the maximum timeout for this consistency category.
    pub fn timeout(&self) -> Duration {
        self.policy().timeout
    }

    /// Get the polling schedule for this category.
    pub fn policy(&self) -> PollPolicy {
        match self {
            ConsistencyCategory::ApplicationLiveness => {
                PollPolicy::fixed(Duration::from_secs(300), Duration::from_secs(2))
            }
            ConsistencyCategory::RouteAdmission => PollPolicy {
                timeout: Duration::from_secs(60),
                initial_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(5),
                multiplier: 2,
            },
        }
    }
}

/// Poll `condition` until it returns true or `policy.timeout` elapses.
///
/// The condition is always evaluated at least once, and once more after the
/// final sleep, so a condition that turns true right at the deadline is seen.
///
/// # Example
///
/// ```no_run
/// use env_tests::eventual::{poll_until, PollPolicy};
/// use std::time::Duration;
///
/// # async fn example() {
/// let policy = PollPolicy::fixed(Duration::from_secs(300), Duration::from_secs(2));
/// poll_until(policy, || async { check_liveness().await })
///     .await
///     .expect("Application should become live within 5 minutes");
/// # }
/// # async fn check_liveness() -> bool { true }
/// ```
pub async fn poll_until<F, Fut>(policy: PollPolicy, mut condition: F) -> Result<(), String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    let mut delay = policy.initial_delay;
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        if condition().await {
            return Ok(());
        }

        let elapsed = start.elapsed();
        if elapsed >= policy.timeout {
            return Err(format!(
                "Condition not met within {:?} after {} attempts",
                policy.timeout, attempts
            ));
        }

        // Never sleep past the deadline
        let remaining = policy.timeout.saturating_sub(elapsed);
        sleep(delay.min(remaining)).await;

        delay = delay
            .saturating_mul(policy.multiplier.max(1))
            .min(policy.max_delay);
    }
}

/// Assert that a condition becomes true within the timeout for the given consistency category.
pub async fn assert_eventually<F, Fut>(
    category: ConsistencyCategory,
    condition: F,
) -> Result<(), String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    poll_until(category.policy(), condition)
        .await
        .map_err(|e| format!("{} (category: {:?})", e, category))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_consistency_category_timeouts() {
        assert_eq!(
            ConsistencyCategory::ApplicationLiveness.timeout(),
            Duration::from_secs(300)
        );
        assert_eq!(
            ConsistencyCategory::RouteAdmission.timeout(),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_liveness_policy_is_fixed_interval() {
        let policy = ConsistencyCategory::ApplicationLiveness.policy();
        assert_eq!(policy.initial_delay, policy.max_delay);
        assert_eq!(policy.multiplier, 1);
    }

    #[test]
    fn test_with_timeout_keeps_schedule() {
        let policy = ConsistencyCategory::ApplicationLiveness
            .policy()
            .with_timeout(Duration::from_secs(30));
        assert_eq!(policy.timeout, Duration::from_secs(30));
        assert_eq!(policy.initial_delay, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_poll_until_succeeds_immediately() {
        let result = poll_until(
            PollPolicy::fixed(Duration::from_secs(1), Duration::from_millis(10)),
            || async { true },
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_assert_eventually_succeeds_after_retry() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result = assert_eventually(ConsistencyCategory::RouteAdmission, move || {
            let attempts = attempts_clone.clone();
            async move {
                let count = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                count >= 2
            }
        })
        .await;
        assert!(result.is_ok());
        assert!(attempts.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_poll_until_fails_on_timeout() {
        let result = poll_until(
            PollPolicy::fixed(Duration::from_millis(200), Duration::from_millis(50)),
            || async { false },
        )
        .await;
        let err = result.expect_err("Should return error on timeout");
        assert!(err.contains("not met within"));
    }

    #[tokio::test]
    async fn test_poll_until_respects_ceiling() {
        let start = Instant::now();
        let _ = poll_until(
            PollPolicy {
                timeout: Duration::from_millis(300),
                initial_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(10),
                multiplier: 4,
            },
            || async { false },
        )
        .await;

        // Delays are capped at the remaining time, so we stop shortly after the ceiling
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
