//! Sliding-window rate estimator over the last N=60 second-buckets (§4.6).

const WINDOW_SECONDS: usize = 60;

/// Fixed-size ring of per-second counts. `record` and `rate_per_sec` both
/// take the current wall-clock second explicitly so callers can supply a
/// test clock.
pub struct RateEstimator {
    buckets: [u64; WINDOW_SECONDS],
    bucket_secs: [u64; WINDOW_SECONDS],
    last_secs: u64,
}

impl RateEstimator {
    pub fn new() -> Self {
        Self {
            buckets: [0; WINDOW_SECONDS],
            bucket_secs: [0; WINDOW_SECONDS],
            last_secs: 0,
        }
    }

    fn slot(secs: u64) -> usize {
        (secs % WINDOW_SECONDS as u64) as usize
    }

    /// Record `amount` units of activity at second `secs`, clearing any
    /// bucket whose timestamp has rolled out of the window.
    pub fn record(&mut self, secs: u64, amount: u64) {
        let slot = Self::slot(secs);
        if self.bucket_secs[slot] != secs {
            self.bucket_secs[slot] = secs;
            self.buckets[slot] = 0;
        }
        self.buckets[slot] += amount;
        self.last_secs = secs;
    }

    /// Average units-per-second over the trailing window as of `now_secs`.
    pub fn rate_per_sec(&self, now_secs: u64) -> f64 {
        let oldest = now_secs.saturating_sub(WINDOW_SECONDS as u64 - 1);
        let total: u64 = (oldest..=now_secs)
            .map(|s| {
                let slot = Self::slot(s);
                if self.bucket_secs[slot] == s {
                    self.buckets[slot]
                } else {
                    0
                }
            })
            .sum();
        total as f64 / WINDOW_SECONDS as f64
    }
}

impl Default for RateEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_bucket_is_ignored_once_outside_window() {
        let mut est = RateEstimator::new();
        est.record(0, 60);
        assert!(est.rate_per_sec(0) > 0.0);
        assert_eq!(est.rate_per_sec(200), 0.0);
    }

    #[test]
    fn rate_reflects_total_over_window() {
        let mut est = RateEstimator::new();
        for s in 0..60 {
            est.record(s, 1);
        }
        assert_eq!(est.rate_per_sec(59), 1.0);
    }
}
