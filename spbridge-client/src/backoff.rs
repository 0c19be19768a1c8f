use std::time::Duration;

use ::backoff::{backoff::Backoff as _, ExponentialBackoff};

/// Exponential reconnect delay bounded by `[min, max]`. Never gives up.
pub struct Backoff {
    inner: ExponentialBackoff,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        /* a zero interval never grows */
        let min = min.max(Duration::from_millis(1));
        let max = max.max(min);
        let mut inner = ExponentialBackoff {
            current_interval: min,
            initial_interval: min,
            max_interval: max,
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };
        inner.reset();
        Self { inner }
    }

    /// The delay to wait before the next attempt. Doubles the following delay.
    pub fn next_delay(&mut self) -> Duration {
        self.inner
            .next_backoff()
            .unwrap_or(self.inner.max_interval)
    }

    pub fn reset(&mut self) {
        self.inner.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_up_to_max_and_resets() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(500));
        let delays: Vec<u128> = (0..5).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn max_below_min_is_clamped() {
        let mut backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn zero_minimum_still_grows() {
        let mut backoff = Backoff::new(Duration::ZERO, Duration::from_millis(4));
        let delays: Vec<u128> = (0..4).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![1, 2, 4, 4]);
    }

    #[test]
    fn keeps_retrying_past_the_default_elapsed_limit() {
        let mut backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(1));
        for _ in 0..10_000 {
            assert_eq!(backoff.next_delay(), Duration::from_millis(1));
        }
    }
}
