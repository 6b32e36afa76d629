use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use graph_client::GraphError;
use serde::{Deserialize, Serialize};

/// Mutating actions used and allowed in the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub current: u32,
    pub max: u32,
}

impl QuotaStatus {
    pub fn remaining(&self) -> u32 {
        self.max.saturating_sub(self.current)
    }
}

pub fn can_mutate(status: &QuotaStatus) -> bool {
    status.current < status.max
}

/// The next block or unblock must wait until the quota is reset.
pub fn must_hold(status: &QuotaStatus) -> bool {
    !can_mutate(status)
}

/// Quota shared by every session acting for one account.
///
/// Check and increment are separate steps, so sessions running at the same
/// time may overshoot `max` by up to one action each.
#[derive(Debug, Clone)]
pub struct QuotaLimiter {
    inner: Arc<Counters>,
}

#[derive(Debug)]
struct Counters {
    current: AtomicU32,
    max: AtomicU32,
}

impl QuotaLimiter {
    pub fn new(max: u32) -> Self {
        Self::with_status(QuotaStatus { current: 0, max })
    }

    pub fn with_status(status: QuotaStatus) -> Self {
        Self {
            inner: Arc::new(Counters {
                current: AtomicU32::new(status.current),
                max: AtomicU32::new(status.max),
            }),
        }
    }

    pub fn status(&self) -> QuotaStatus {
        QuotaStatus {
            current: self.inner.current.load(Ordering::Acquire),
            max: self.inner.max.load(Ordering::Acquire),
        }
    }

    pub fn can_mutate(&self) -> bool {
        can_mutate(&self.status())
    }

    /// Count one successful block or unblock.
    pub fn record_mutation(&self) -> QuotaStatus {
        let current = self.inner.current.fetch_add(1, Ordering::AcqRel) + 1;
        QuotaStatus {
            current,
            max: self.inner.max.load(Ordering::Acquire),
        }
    }

    pub fn set(&self, status: QuotaStatus) {
        self.inner.max.store(status.max, Ordering::Release);
        self.inner.current.store(status.current, Ordering::Release);
    }

    /// Start a new window: usage back to zero, same maximum.
    pub fn reset(&self) {
        self.inner.current.store(0, Ordering::Release);
    }
}

/// How long a rate-limited session should wait before trying again.
///
/// `reset_at` from the response shortens the configured backoff when the
/// server says the window ends sooner; it never lengthens it.
pub fn rate_limit_delay(err: &GraphError, backoff: Duration, now_unix: i64) -> Duration {
    let until_reset = err
        .response()
        .and_then(|r| r.reset_at)
        .map(|reset| {
            let secs = u64::try_from(reset.saturating_sub(now_unix)).unwrap_or(0);
            Duration::from_secs(secs)
        });
    match until_reset {
        Some(wait) if wait < backoff => wait,
        _ => backoff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_client::ApiResponse;

    fn rate_limited(reset_at: Option<i64>) -> GraphError {
        GraphError::RateLimited(ApiResponse {
            status: 429,
            endpoint: "/blocks/create.json".into(),
            body: String::new(),
            reset_at,
        })
    }

    #[test]
    fn exhausted_quota_must_hold() {
        let full = QuotaStatus { current: 10, max: 10 };
        assert!(!can_mutate(&full));
        assert!(must_hold(&full));
        assert!(can_mutate(&QuotaStatus { current: 9, max: 10 }));
        assert_eq!(full.remaining(), 0);
    }

    #[test]
    fn clones_share_counters() {
        let quota = QuotaLimiter::new(2);
        let other = quota.clone();
        quota.record_mutation();
        let status = other.record_mutation();
        assert_eq!(status, QuotaStatus { current: 2, max: 2 });
        assert!(!quota.can_mutate());

        other.reset();
        assert_eq!(quota.status().current, 0);
    }

    #[test]
    fn set_replaces_both_counters() {
        let quota = QuotaLimiter::new(500);
        quota.set(QuotaStatus { current: 3, max: 4 });
        assert_eq!(quota.status(), QuotaStatus { current: 3, max: 4 });
    }

    #[test]
    fn reset_at_shortens_backoff() {
        let backoff = Duration::from_secs(900);
        assert_eq!(
            rate_limit_delay(&rate_limited(Some(1_060)), backoff, 1_000),
            Duration::from_secs(60)
        );
        assert_eq!(rate_limit_delay(&rate_limited(None), backoff, 1_000), backoff);
        // already past the reset time
        assert_eq!(
            rate_limit_delay(&rate_limited(Some(900)), backoff, 1_000),
            Duration::ZERO
        );
        // a far-off reset never lengthens the wait
        assert_eq!(
            rate_limit_delay(&rate_limited(Some(99_999)), backoff, 1_000),
            backoff
        );
    }

    #[test]
    fn extreme_reset_header_does_not_overflow() {
        let backoff = Duration::from_secs(900);
        assert_eq!(
            rate_limit_delay(&rate_limited(Some(i64::MIN)), backoff, 1_000),
            Duration::ZERO
        );
        assert_eq!(
            rate_limit_delay(&rate_limited(Some(i64::MAX)), backoff, -1_000),
            backoff
        );
    }
}
