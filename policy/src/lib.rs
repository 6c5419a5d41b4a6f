//! Caching policy layer: what a request is, how it maps to a canonical
//! cache key, and how long a result may live given the target market's
//! session state.
//!
//! The `TtlTable` in this crate is the one and only holder of numeric TTL
//! values in the system. Every TTL decision routes through
//! `TtlStrategyResolver`; no other crate may carry TTL literals.

pub mod entry;
pub mod key;
pub mod request;
pub mod strategy;
pub mod ttl;

pub use entry::CacheEntry;
pub use key::{CacheKey, CacheKeyBuilder, DEFAULT_MAX_KEY_LEN};
pub use request::{CacheRequest, RequestError};
pub use strategy::{Freshness, Strategy};
pub use ttl::{TtlBias, TtlDecision, TtlStrategyResolver, TtlTable, TtlTableConfig, TtlTableError};
