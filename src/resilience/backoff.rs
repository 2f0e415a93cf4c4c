//! Exponential backoff with optional jitter.

use rand::Rng;
use std::time::Duration;

/// Calculate the delay before retry `attempt` (1-based).
///
/// `base_ms * 2^(attempt-1)`, capped at `max_ms`. With `jitter` up to 10% of
/// the capped delay is added.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64, jitter: bool) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    let jitter_range = capped_delay / 10;
    let jitter_ms = if jitter && jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(calculate_backoff(1, 1000, 30_000, false), Duration::from_millis(1000));
        assert_eq!(calculate_backoff(2, 1000, 30_000, false), Duration::from_millis(2000));
        assert_eq!(calculate_backoff(3, 1000, 30_000, false), Duration::from_millis(4000));
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(calculate_backoff(10, 1000, 5000, false), Duration::from_millis(5000));
        assert_eq!(calculate_backoff(64, 1000, 5000, false), Duration::from_millis(5000));
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        for _ in 0..50 {
            let delay = calculate_backoff(2, 100, 2000, true);
            assert!(delay.as_millis() >= 200 && delay.as_millis() < 220);
        }
    }

    #[test]
    fn test_attempt_zero_is_immediate() {
        assert_eq!(calculate_backoff(0, 1000, 30_000, true), Duration::ZERO);
    }
}
