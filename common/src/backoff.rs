//! Exponential backoff with jitter, shared by the init worker's publish
//! retry (§4.8) and the target worker's batch retry (§4.6) so both use one
//! vetted implementation instead of two bespoke loops.

use std::thread;
use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
    pub jitter: f64,
}

impl Backoff {
    pub const fn new(max_attempts: u32, base: Duration, cap: Duration, jitter: f64) -> Self {
        Backoff { max_attempts, base, cap, jitter }
    }

    /// Delay before the given zero-indexed attempt, bounded by `cap` and
    /// perturbed by up to `±jitter` fraction.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base.as_secs_f64() * 2f64.powi(attempt as i32);
        let capped = exp.min(self.cap.as_secs_f64());
        let jitter_span = capped * self.jitter;
        let jittered = if jitter_span > 0.0 {
            rand::thread_rng().gen_range((capped - jitter_span).max(0.0)..=(capped + jitter_span))
        } else {
            capped
        };
        Duration::from_secs_f64(jittered.max(0.0))
    }

    /// Retries `f` up to `max_attempts` times, sleeping `delay_for` between
    /// attempts. Returns the last error if every attempt fails.
    pub fn retry<T, E>(&self, mut f: impl FnMut(u32) -> Result<T, E>) -> Result<T, E> {
        let mut last_err = None;
        for attempt in 0..self.max_attempts {
            match f(attempt) {
                Ok(v) => return Ok(v),
                Err(e) => {
                    last_err = Some(e);
                    if attempt + 1 < self.max_attempts {
                        thread::sleep(self.delay_for(attempt));
                    }
                }
            }
        }
        Err(last_err.expect("max_attempts >= 1"))
    }
}

/// Batch flush retry per §4.6: 3 attempts, base 1s, ×2, capped at 60s, ±50%.
pub const BATCH_RETRY: Backoff = Backoff::new(3, Duration::from_secs(1), Duration::from_secs(60), 0.5);

/// Init worker publish retry per §4.8: 2 attempts, base 0.1s, ×2, no cap
/// beyond the exponent itself and no jitter called out in the spec.
pub const INIT_PUBLISH_RETRY: Backoff = Backoff::new(2, Duration::from_millis(100), Duration::from_secs(60), 0.0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_and_respects_cap() {
        let b = Backoff::new(5, Duration::from_secs(1), Duration::from_secs(4), 0.0);
        assert_eq!(b.delay_for(0), Duration::from_secs(1));
        assert_eq!(b.delay_for(1), Duration::from_secs(2));
        assert_eq!(b.delay_for(2), Duration::from_secs(4));
        assert_eq!(b.delay_for(10), Duration::from_secs(4));
    }

    #[test]
    fn retry_returns_ok_on_eventual_success() {
        let b = Backoff::new(3, Duration::from_millis(1), Duration::from_millis(5), 0.0);
        let mut calls = 0;
        let result: Result<i32, &'static str> = b.retry(|attempt| {
            calls += 1;
            if attempt < 2 {
                Err("fail")
            } else {
                Ok(42)
            }
        });
        assert_eq!(result, Ok(42));
        assert_eq!(calls, 3);
    }

    #[test]
    fn retry_returns_last_err_after_exhausting_attempts() {
        let b = Backoff::new(2, Duration::from_millis(1), Duration::from_millis(5), 0.0);
        let result: Result<i32, &'static str> = b.retry(|_| Err("nope"));
        assert_eq!(result, Err("nope"));
    }
}
