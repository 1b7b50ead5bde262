use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Default sliding window for throughput samples.
const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Default cap on retained samples.
const DEFAULT_MAX_SAMPLES: usize = 100;

struct Sample {
    bytes: u64,
    at: Instant,
}

/// Upload throughput over a sliding time window.
pub struct ThroughputMeter {
    inner: Mutex<MeterInner>,
}

struct MeterInner {
    samples: VecDeque<Sample>,
    window: Duration,
    max_samples: usize,
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl ThroughputMeter {
    /// Creates a meter. `None` selects a 5 s window and 100 samples.
    pub fn new(window: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(MeterInner {
                samples: VecDeque::new(),
                window: window.unwrap_or(DEFAULT_WINDOW),
                max_samples: max_samples.unwrap_or(DEFAULT_MAX_SAMPLES).max(2),
            }),
        }
    }

    /// Records `bytes` finished now.
    pub fn record(&self, bytes: u64) {
        self.record_at(bytes, Instant::now());
    }

    fn record_at(&self, bytes: u64, at: Instant) {
        let mut m = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        m.samples.push_back(Sample { bytes, at });

        if let Some(cutoff) = at.checked_sub(m.window) {
            while m.samples.front().is_some_and(|s| s.at < cutoff) {
                m.samples.pop_front();
            }
        }
        while m.samples.len() > m.max_samples {
            m.samples.pop_front();
        }
    }

    /// Average bytes per second across the window; 0.0 with fewer than
    /// two samples.
    pub fn bytes_per_second(&self) -> f64 {
        let m = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let (Some(first), Some(last)) = (m.samples.front(), m.samples.back()) else {
            return 0.0;
        };
        let elapsed = last.at.duration_since(first.at);
        if m.samples.len() < 2 || elapsed.is_zero() {
            return 0.0;
        }
        let total: u64 = m.samples.iter().map(|s| s.bytes).sum();
        total as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to move `remaining_bytes` at the current rate.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }

    pub fn reset(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .samples
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn no_samples() {
        let meter = ThroughputMeter::default();
        assert_eq!(meter.bytes_per_second(), 0.0);
        assert!(meter.eta(1000).is_none());
    }

    #[test]
    fn single_sample_has_no_rate() {
        let meter = ThroughputMeter::default();
        meter.record(100);
        assert_eq!(meter.bytes_per_second(), 0.0);
    }

    #[test]
    fn rate_from_spaced_samples() {
        let meter = ThroughputMeter::new(Some(Duration::from_secs(10)), None);
        let t0 = Instant::now();
        meter.record_at(500, t0);
        meter.record_at(500, t0 + Duration::from_millis(500));
        // 1000 bytes over half a second.
        assert!((meter.bytes_per_second() - 2000.0).abs() < 1e-6);

        let eta = meter.eta(4000).unwrap();
        assert!((eta.as_secs_f64() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn old_samples_leave_window() {
        let meter = ThroughputMeter::new(Some(Duration::from_secs(1)), None);
        let t0 = Instant::now();
        meter.record_at(1_000_000, t0);
        meter.record_at(10, t0 + Duration::from_secs(5));
        meter.record_at(10, t0 + Duration::from_secs(6));
        // Only the two late samples remain.
        assert!((meter.bytes_per_second() - 20.0).abs() < 1e-6);
    }

    #[test]
    fn sample_cap() {
        let meter = ThroughputMeter::new(Some(Duration::from_secs(60)), Some(5));
        for i in 0..20 {
            meter.record(i * 10);
        }
        let m = meter.inner.lock().unwrap();
        assert!(m.samples.len() <= 5);
    }

    #[test]
    fn reset_clears() {
        let meter = ThroughputMeter::default();
        meter.record(1);
        meter.record(2);
        meter.reset();
        assert_eq!(meter.bytes_per_second(), 0.0);
    }

    #[test]
    fn concurrent_recording() {
        use std::thread;

        let meter = Arc::new(ThroughputMeter::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&meter);
                thread::spawn(move || {
                    for _ in 0..100 {
                        m.record(1);
                        let _ = m.bytes_per_second();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let _ = meter.bytes_per_second();
    }
}
