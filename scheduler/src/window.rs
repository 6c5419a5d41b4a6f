//! Rolling latency window feeding the optimizer's sampling ticks.

use std::collections::VecDeque;
use std::time::Duration;

/// A timestamped latency sample inside the rolling window
#[derive(Clone, Debug)]
struct TimedSample {
    ts_ms: i64,
    latency_ms: f64,
}

/// Time-bounded rolling window over fetch latencies with an O(1) mean.
///
/// Samples older than `max_age_ms` fall off the front as new samples are
/// pushed; the running sum is maintained incrementally so `mean()` never
/// walks the deque.
pub struct LatencyWindow {
    samples: VecDeque<TimedSample>,
    sum_ms: f64,
    max_age_ms: i64,
}

impl LatencyWindow {
    pub fn new(max_age: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            sum_ms: 0.0,
            max_age_ms: max_age.as_millis() as i64,
        }
    }

    pub fn push(&mut self, ts_ms: i64, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1_000.0;

        self.samples.push_back(TimedSample { ts_ms, latency_ms });
        self.sum_ms += latency_ms;

        self.evict_old(ts_ms);
    }

    /// Evict samples older than max_age without pushing a new one.
    ///
    /// The sampler calls this each tick so a quiet interval still ages
    /// out stale evidence of load.
    pub fn evict(&mut self, now_ms: i64) {
        self.evict_old(now_ms);
    }

    /// Evict samples older than max_age
    fn evict_old(&mut self, now_ms: i64) {
        while let Some(front) = self.samples.front() {
            if now_ms - front.ts_ms > self.max_age_ms {
                self.sum_ms -= front.latency_ms;
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Mean latency over the current window, if any samples remain.
    pub fn mean(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }

        let mean_ms = self.sum_ms / self.samples.len() as f64;
        Some(Duration::from_secs_f64(mean_ms.max(0.0) / 1_000.0))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
