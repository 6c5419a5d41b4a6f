//! Load observation and adaptive tuning.
//!
//! The optimizer samples recent fetch latency and in-flight concurrency on
//! a fixed interval and derives two knobs from them:
//!   • the maximum number of concurrent upstream fetches
//!   • the TTL bias factor consumed by the Adaptive strategy
//!
//! The sampling interval is handed in from the TTL table
//! (`TtlTable::sampling_interval`), so there is no second hard-coded
//! interval constant in this crate.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use common::clock::Clock;
use common::metrics::MetricsSink;
use policy::ttl::{MAX_BIAS_FACTOR, MIN_BIAS_FACTOR, TtlBias};

use crate::window::LatencyWindow;

#[derive(Debug, Error)]
pub enum OptimizerConfigError {
    #[error("max_concurrent_fetches must be at least 1")]
    ZeroConcurrency,

    #[error("target_latency_ms must be greater than zero")]
    ZeroTargetLatency,

    #[error("bias_step {0} is outside (0, 1]")]
    BadBiasStep(f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Hard upper bound on concurrent upstream fetches.
    pub max_concurrent_fetches: usize,

    /// Mean fetch latency above this is treated as overload.
    pub target_latency_ms: u64,

    /// How far one sampling tick may move the TTL bias.
    pub bias_step: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 8,
            target_latency_ms: 250,
            bias_step: 0.25,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), OptimizerConfigError> {
        if self.max_concurrent_fetches == 0 {
            return Err(OptimizerConfigError::ZeroConcurrency);
        }
        if self.target_latency_ms == 0 {
            return Err(OptimizerConfigError::ZeroTargetLatency);
        }
        if !(self.bias_step > 0.0 && self.bias_step <= 1.0) {
            return Err(OptimizerConfigError::BadBiasStep(self.bias_step));
        }
        Ok(())
    }
}

/// Current adaptive limits, re-read by callers on every decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    /// Always within `[1, OptimizerConfig::max_concurrent_fetches]`.
    pub max_concurrent_fetches: usize,

    /// Always within `[MIN_BIAS_FACTOR, MAX_BIAS_FACTOR]`.
    pub ttl_bias: f64,
}

pub struct PerformanceOptimizer {
    cfg: OptimizerConfig,
    sample_interval: Duration,
    window: Mutex<LatencyWindow>,
    in_flight: AtomicUsize,
    limits: RwLock<Limits>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsSink>,
}

impl PerformanceOptimizer {
    pub fn new(
        cfg: OptimizerConfig,
        sample_interval: Duration,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Arc<Self>, OptimizerConfigError> {
        cfg.validate()?;

        let limits = Limits {
            max_concurrent_fetches: cfg.max_concurrent_fetches,
            ttl_bias: 1.0,
        };

        Ok(Arc::new(Self {
            cfg,
            sample_interval,
            // Keep two intervals of samples so one quiet tick does not
            // erase the evidence of a loaded one.
            window: Mutex::new(LatencyWindow::new(sample_interval * 2)),
            in_flight: AtomicUsize::new(0),
            limits: RwLock::new(limits),
            clock,
            metrics,
        }))
    }

    /// Spawn the periodic sampling task.
    pub fn spawn_sampler(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(this.sample_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                this.resample();
            }
        })
    }

    pub fn record_fetch_latency(&self, latency: Duration) {
        let ts_ms = self.clock.now().timestamp_millis();
        self.window.lock().push(ts_ms, latency);
        self.metrics
            .gauge("fetch.latency_ms", latency.as_secs_f64() * 1_000.0);
    }

    pub fn fetch_started(&self) {
        let n = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.metrics.gauge("fetch.in_flight", n as f64);
    }

    pub fn fetch_finished(&self) {
        let n = self.in_flight.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        self.metrics.gauge("fetch.in_flight", n as f64);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn current_limits(&self) -> Limits {
        *self.limits.read()
    }

    /// One sampling tick: compare observed mean latency to the target,
    /// check the fetch pool for saturation, and move the limits one step.
    /// Exposed so tests can drive ticks directly.
    pub fn resample(&self) {
        let now_ms = self.clock.now().timestamp_millis();
        let mean = {
            let mut window = self.window.lock();
            window.evict(now_ms);
            window.mean()
        };

        let target = Duration::from_millis(self.cfg.target_latency_ms);
        let latency_over = mean.map(|m| m > target).unwrap_or(false);

        // A fully occupied fetch pool is overload even before slow
        // latency samples land in the window.
        let saturated = self.in_flight() >= self.limits.read().max_concurrent_fetches;

        let overloaded = latency_over || saturated;

        let mut limits = self.limits.write();

        if overloaded {
            limits.max_concurrent_fetches = (limits.max_concurrent_fetches / 2).max(1);
            limits.ttl_bias = (limits.ttl_bias + self.cfg.bias_step).min(MAX_BIAS_FACTOR);
        } else {
            limits.max_concurrent_fetches =
                (limits.max_concurrent_fetches + 1).min(self.cfg.max_concurrent_fetches);
            limits.ttl_bias = (limits.ttl_bias - self.cfg.bias_step).max(MIN_BIAS_FACTOR);
        }

        self.metrics
            .gauge("adaptive.concurrency_limit", limits.max_concurrent_fetches as f64);
        self.metrics.gauge("adaptive.ttl_bias", limits.ttl_bias);

        tracing::debug!(
            mean_latency_ms = mean.map(|m| m.as_millis() as u64),
            saturated,
            overloaded,
            limit = limits.max_concurrent_fetches,
            bias = limits.ttl_bias,
            "optimizer resample"
        );
    }
}

impl TtlBias for PerformanceOptimizer {
    fn bias_factor(&self) -> f64 {
        self.limits.read().ttl_bias
    }
}
