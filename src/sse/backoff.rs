//! Shared exponential backoff formula used by every retry surface (SSE
//! reconnect, static-info fetch), so operational tuning changes one place.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub factor: u32,
    pub cap_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            factor: 2,
            cap_ms: 30_000,
        }
    }
}

/// `delay = min(base * factor^attempts, cap)`, then jittered by a random
/// factor in `[1.3, 1.5]`.
pub fn compute_delay(config: &BackoffConfig, attempts: u32) -> Duration {
    let scaled = (config.factor as u64).saturating_pow(attempts).saturating_mul(config.base_ms);
    let delay_ms = scaled.min(config.cap_ms);
    let jitter = rand::thread_rng().gen_range(1.3..=1.5);
    Duration::from_millis((delay_ms as f64 * jitter) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_with_attempts_and_respects_cap() {
        let config = BackoffConfig::default();
        for attempts in 0..20 {
            let delay = compute_delay(&config, attempts);
            let unjittered = (config.factor as u64).saturating_pow(attempts).saturating_mul(config.base_ms).min(config.cap_ms);
            let lower = (unjittered as f64 * 1.3) as u64;
            let upper = (unjittered as f64 * 1.5) as u64 + 1;
            assert!(delay.as_millis() as u64 >= lower, "attempts={attempts} delay={delay:?} lower={lower}");
            assert!(delay.as_millis() as u64 <= upper, "attempts={attempts} delay={delay:?} upper={upper}");
        }
    }

    #[test]
    fn delay_never_exceeds_jittered_cap() {
        let config = BackoffConfig::default();
        let delay = compute_delay(&config, 100);
        assert!(delay.as_millis() as u64 <= (config.cap_ms as f64 * 1.5) as u64 + 1);
    }

    proptest::proptest! {
        #[test]
        fn invariant_4_delay_within_cap_and_jitter_band(attempts in 0u32..64) {
            let config = BackoffConfig::default();
            let delay = compute_delay(&config, attempts);
            let unjittered = (config.factor as u64).saturating_pow(attempts).saturating_mul(config.base_ms).min(config.cap_ms);
            let lower = (unjittered as f64 * 1.3).floor() as u64;
            let upper = (unjittered as f64 * 1.5).ceil() as u64 + 1;
            prop_assert!(delay.as_millis() as u64 >= lower);
            prop_assert!(delay.as_millis() as u64 <= upper);
        }
    }
}
