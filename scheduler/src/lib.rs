//! Background work for the cache engine.
//!
//! Responsibilities:
//!   • Run stale-while-revalidate refreshes on a bounded worker pool
//!     (`RefreshScheduler`)
//!   • Observe fetch load and adapt concurrency limits and the Adaptive
//!     TTL bias (`PerformanceOptimizer`)
//!
//! Nothing here may block the request hot path: a full refresh queue drops
//! work, it never applies backpressure.

pub mod optimizer;
pub mod refresh;
pub mod window;

pub use optimizer::{Limits, OptimizerConfig, PerformanceOptimizer};
pub use refresh::{RefreshConfig, RefreshFuture, RefreshScheduler};
pub use window::LatencyWindow;
