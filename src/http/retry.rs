//! Decorrelated jitter backoff.
//!
//! Direct port of `network_opt.py`'s `decorrelated_jitter`/
//! `short_window_aggressive`: `next = min(cap, uniform(base, previous*3))`.
//! Two independent instances are used across the engine (spec.md §9 open
//! question) — one for `view-` tick spacing, one for the short-window
//! aggressive retry envelope around submission — each keeping its own
//! `previous` state.

use std::time::Duration;

use rand::Rng;

/// Decorrelated-jitter delay generator. `next()` is monotonic-ish but never
/// exceeds `cap` and never drops below `base`.
#[derive(Debug, Clone)]
pub struct DecorrelatedJitter {
    base: Duration,
    cap: Duration,
    previous: Duration,
}

impl DecorrelatedJitter {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            previous: base,
        }
    }

    /// Sample the next delay and advance internal state.
    pub fn next(&mut self) -> Duration {
        let lo = self.base.as_secs_f64();
        let hi = (self.previous.as_secs_f64() * 3.0).max(lo);
        let sampled = if hi > lo {
            rand::thread_rng().gen_range(lo..hi)
        } else {
            lo
        };
        let capped = sampled.min(self.cap.as_secs_f64()).max(0.0);
        self.previous = Duration::from_secs_f64(capped);
        self.previous
    }

    /// Reset to the initial `base` delay, e.g. after a successful attempt.
    pub fn reset(&mut self) {
        self.previous = self.base;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_never_exceeds_cap() {
        let mut j = DecorrelatedJitter::new(Duration::from_millis(100), Duration::from_secs(1));
        for _ in 0..200 {
            let d = j.next();
            assert!(d <= Duration::from_secs(1));
            assert!(d >= Duration::ZERO);
        }
    }

    #[test]
    fn reset_returns_to_base() {
        let mut j = DecorrelatedJitter::new(Duration::from_millis(100), Duration::from_secs(1));
        for _ in 0..10 {
            j.next();
        }
        j.reset();
        assert_eq!(j.previous, Duration::from_millis(100));
    }
}
