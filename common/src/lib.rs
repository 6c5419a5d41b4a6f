//! Ambient concerns shared by every crate in the workspace:
//! logging setup, trace correlation, injected time, and metrics emission.

pub mod clock;
pub mod logger;
pub mod metrics;

pub use clock::{Clock, ManualClock, SystemClock};
pub use logger::{TraceId, init_logger};
pub use metrics::{MetricsSink, NoopMetrics};
