//! Retry backoff for failed sync tasks.

use std::time::Duration;

/// Exponential backoff with random jitter.
///
/// The delay for attempt `n` is `base * 2^n`, capped at `max`, plus up to
/// `max_jitter` of random jitter so retries from many devices spread out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay of the first retry.
    pub base: Duration,
    /// Upper bound before jitter.
    pub max: Duration,
    /// Upper bound of the random jitter.
    pub max_jitter: Duration,
}

impl Backoff {
    /// Create a backoff policy with jitter up to a tenth of `max`.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            max_jitter: max / 10,
        }
    }

    /// Delay before retry number `attempt` (0-based), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        // 2^20 already exceeds any sane cap.
        let factor = 1u32 << attempt.min(20);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay before retry number `attempt` (0-based), with jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter_ms = match u64::try_from(self.max_jitter.as_millis()) {
            Ok(0) | Err(_) => 0,
            Ok(max) => random_u64() % (max + 1),
        };
        self.base_delay(attempt) + Duration::from_millis(jitter_ms)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(30))
    }
}

/// Random value for jitter. Falls back to no jitter if the OS source fails.
fn random_u64() -> u64 {
    let mut bytes = [0u8; 8];
    match getrandom::getrandom(&mut bytes) {
        Ok(()) => u64::from_le_bytes(bytes),
        Err(_) => 0,
    }
}
