//! The cache orchestration engine.
//!
//! `CacheOrchestrator::get_or_fetch` is the single entry point the rest of
//! the system calls. It composes:
//!   • `policy` for keys, strategies, and the TTL table
//!   • `market` for symbol→market detection and session state
//!   • `scheduler` for background refresh and adaptive limits
//!   • the `CacheStore` / `Fetcher` collaborators supplied by the host
//!
//! Per request: LOOKUP → {HIT_FRESH, HIT_STALE, MISS} → (FETCHING on miss)
//! → RESOLVED. Stale hits serve the old value and revalidate in the
//! background; misses coalesce onto one upstream fetch per key.

pub mod config;
pub mod engine;
pub mod inflight;
pub mod types;

pub use config::{ConfigError, EngineConfig};
pub use engine::CacheOrchestrator;
pub use inflight::InFlightCoordinator;
pub use types::{CacheStore, EngineError, FetchError, Fetcher, StoreError};
