//! Reconnection strategies for the transport adapter.
//!
//! When a live connection drops, the adapter asks its [`ReconnectPolicy`] how
//! long to wait before each attempt. Policies are plain values with no clock or
//! randomness of their own, so tests can drive them deterministically.

use std::fmt;
use std::time::Duration;

/// Decides the delay before each reconnection attempt.
pub trait ReconnectPolicy: Send + Sync + fmt::Debug + 'static {
    /// Delay before reconnection attempt `attempt` (1-based).
    ///
    /// Returning `None` gives up; the session then closes with a connection
    /// error.
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

/// Exponential backoff: `initial * multiplier^(attempt - 1)`, capped at `max`.
///
/// The default (1 s doubling up to 5 s, unlimited attempts) matches the
/// reconnection behavior the room service's reference clients rely on, minus
/// the jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExponentialBackoff {
    /// Delay before the first attempt.
    pub initial: Duration,
    /// Upper bound for any single delay.
    pub max: Duration,
    /// Growth factor between consecutive attempts.
    pub multiplier: u32,
    /// Give up after this many attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(5),
            multiplier: 2,
            max_attempts: None,
        }
    }
}

impl ExponentialBackoff {
    /// Limit the number of attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return None;
        }
        if self.max_attempts.is_some_and(|max| attempt > max) {
            return None;
        }
        let mut delay = self.initial.min(self.max);
        for _ in 1..attempt {
            if delay >= self.max {
                break;
            }
            delay = delay
                .checked_mul(self.multiplier)
                .map_or(self.max, |next| next.min(self.max));
        }
        Some(delay)
    }
}

/// An explicit list of delays; attempt `n` waits `delays[n - 1]` and the
/// policy gives up once the list is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FixedSchedule {
    delays: Vec<Duration>,
}

impl FixedSchedule {
    /// Create a schedule from the given delays.
    pub fn new(delays: impl Into<Vec<Duration>>) -> Self {
        Self {
            delays: delays.into(),
        }
    }
}

impl ReconnectPolicy for FixedSchedule {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        let index = usize::try_from(attempt.checked_sub(1)?).ok()?;
        self.delays.get(index).copied()
    }
}

/// Never reconnect. A dropped connection closes the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NoReconnect;

impl ReconnectPolicy for NoReconnect {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff_doubles_up_to_cap() {
        let policy = ExponentialBackoff::default();
        let delays: Vec<_> = (1..=5).map(|n| policy.next_delay(n).unwrap()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(5),
                Duration::from_secs(5),
            ]
        );
    }

    #[test]
    fn backoff_gives_up_after_max_attempts() {
        let policy = ExponentialBackoff::default().with_max_attempts(2);
        assert!(policy.next_delay(2).is_some());
        assert!(policy.next_delay(3).is_none());
    }

    #[test]
    fn backoff_saturates_on_huge_attempt_counts() {
        let policy = ExponentialBackoff {
            initial: Duration::from_secs(1),
            max: Duration::MAX,
            multiplier: 10,
            max_attempts: None,
        };
        assert_eq!(policy.next_delay(200), Some(Duration::MAX));
    }

    #[test]
    fn fixed_schedule_walks_the_list() {
        let policy = FixedSchedule::new(vec![Duration::from_millis(10), Duration::from_millis(20)]);
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(10)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(20)));
        assert_eq!(policy.next_delay(3), None);
        assert_eq!(policy.next_delay(0), None);
    }

    #[test]
    fn no_reconnect_always_gives_up() {
        assert_eq!(NoReconnect.next_delay(1), None);
    }
}
