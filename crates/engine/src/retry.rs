//! Retry backoff computation.
//!
//! The delay is a pure function of the retry count and the policy; the
//! engine records `next_retry_at` and returns. It never sleeps or
//! polls — an external scheduler re-invokes once the deadline passes.

use std::time::Duration;

use run_store::{Backoff, RetryPolicy};

/// Computes the delay before the attempt after `retry_count` failures.
///
/// Exponential backoff is `initial_delay_ms * 2^retry_count`, saturating
/// at `u64::MAX` milliseconds rather than overflowing.
pub fn retry_delay(policy: &RetryPolicy, retry_count: u32) -> Duration {
    let millis = match policy.backoff {
        Backoff::Fixed => policy.initial_delay_ms,
        Backoff::Exponential => {
            let factor = 2u64.saturating_pow(retry_count);
            policy.initial_delay_ms.saturating_mul(factor)
        }
    };
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_doubles_per_retry() {
        let policy = RetryPolicy::exponential(2000, 3);
        assert_eq!(retry_delay(&policy, 0), Duration::from_millis(2000));
        assert_eq!(retry_delay(&policy, 1), Duration::from_millis(4000));
        assert_eq!(retry_delay(&policy, 2), Duration::from_millis(8000));
    }

    #[test]
    fn fixed_is_constant() {
        let policy = RetryPolicy::fixed(500, 5);
        assert_eq!(retry_delay(&policy, 0), Duration::from_millis(500));
        assert_eq!(retry_delay(&policy, 4), Duration::from_millis(500));
    }

    #[test]
    fn exponential_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::exponential(u64::MAX / 2, 200);
        assert_eq!(retry_delay(&policy, 128), Duration::from_millis(u64::MAX));
    }
}
