//! Fire-and-forget metrics emission.
//!
//! The engine reports counters and gauges through this seam; sink
//! implementations must never fail a caller. A sink that loses a sample
//! loses a sample, nothing else.

use std::sync::Arc;

pub trait MetricsSink: Send + Sync {
    fn counter(&self, name: &'static str, value: u64);
    fn gauge(&self, name: &'static str, value: f64);
}

/// Default sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn counter(&self, _name: &'static str, _value: u64) {}
    fn gauge(&self, _name: &'static str, _value: f64) {}
}

impl<T: MetricsSink + ?Sized> MetricsSink for Arc<T> {
    fn counter(&self, name: &'static str, value: u64) {
        (**self).counter(name, value)
    }

    fn gauge(&self, name: &'static str, value: f64) {
        (**self).gauge(name, value)
    }
}
