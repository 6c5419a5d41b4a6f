//! The stored unit of cached data.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::key::CacheKey;
use crate::strategy::{Freshness, Strategy};

/// One cached payload plus the policy metadata needed to classify it.
///
/// Owned by the `CacheStore`; the engine never mutates an entry in place,
/// it always writes a replacement. `stale_window` is materialized at write
/// time so read-side classification cannot drift from the strategy table
/// that was in force when the value was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: Vec<u8>,
    pub stored_at: DateTime<Utc>,
    pub ttl: Duration,
    pub stale_window: Duration,
    pub strategy: Strategy,
}

impl CacheEntry {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.stored_at).to_std().unwrap_or_default()
    }

    pub fn freshness(&self, now: DateTime<Utc>) -> Freshness {
        Freshness::classify(self.age(now), self.ttl, self.stale_window)
    }
}
