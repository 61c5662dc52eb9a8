//! Time sources and round-trip estimation.
//!
//! All windows and cooldowns in the sync core are measured against a
//! [`Clock`] handed in through the session context, so tests can drive time
//! with [`ManualClock`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Monotonic time since an arbitrary epoch.
pub trait Clock: Send {
    /// Current time.
    fn now(&self) -> Duration;
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    /// Start counting from now.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Clock advanced explicitly. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    /// A clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    /// Jump to an absolute time.
    pub fn set(&self, to: Duration) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Exponentially weighted moving average RTT estimator.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    samples: VecDeque<Duration>,
    max_samples: usize,
    ewma: Option<Duration>,
    alpha: f64,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self {
            samples: VecDeque::new(),
            max_samples: 16,
            ewma: None,
            alpha: 0.125,
        }
    }
}

impl RttEstimator {
    /// Record a new RTT sample. The first sample seeds the average.
    pub fn record_sample(&mut self, rtt: Duration) {
        self.samples.push_back(rtt);
        if self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
        let next = match self.ewma {
            None => rtt.as_secs_f64(),
            Some(prev) => self.alpha * rtt.as_secs_f64() + (1.0 - self.alpha) * prev.as_secs_f64(),
        };
        self.ewma = Some(Duration::from_secs_f64(next));
    }

    /// Smoothed RTT, zero before any sample.
    pub fn smoothed(&self) -> Duration {
        self.ewma.unwrap_or(Duration::ZERO)
    }

    /// Smoothed RTT in whole milliseconds, saturating.
    pub fn smoothed_ms(&self) -> u32 {
        u32::try_from(self.smoothed().as_millis()).unwrap_or(u32::MAX)
    }

    /// Median of the retained samples.
    pub fn median(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted: Vec<_> = self.samples.iter().copied().collect();
        sorted.sort();
        sorted[sorted.len() / 2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_shared() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(Duration::from_millis(30));
        other.advance(Duration::from_millis(20));
        assert_eq!(clock.now(), Duration::from_millis(50));
        clock.set(Duration::from_secs(2));
        assert_eq!(other.now(), Duration::from_secs(2));
    }

    #[test]
    fn test_first_sample_seeds_average() {
        let mut rtt = RttEstimator::default();
        assert_eq!(rtt.smoothed(), Duration::ZERO);
        rtt.record_sample(Duration::from_millis(80));
        assert_eq!(rtt.smoothed_ms(), 80);
    }

    #[test]
    fn test_ewma_converges() {
        let mut rtt = RttEstimator::default();
        rtt.record_sample(Duration::from_millis(200));
        for _ in 0..100 {
            rtt.record_sample(Duration::from_millis(40));
        }
        assert!((rtt.smoothed().as_secs_f64() - 0.040).abs() < 0.002);
        assert_eq!(rtt.median(), Duration::from_millis(40));
    }

    #[test]
    fn test_samples_bounded() {
        let mut rtt = RttEstimator::default();
        for i in 0..40 {
            rtt.record_sample(Duration::from_millis(i));
        }
        assert_eq!(rtt.samples.len(), 16);
        assert_eq!(rtt.median(), Duration::from_millis(32));
    }
}
