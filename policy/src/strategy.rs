//! Caching strategies and freshness classification.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Named caching policy controlling TTL and stale-serving behavior.
///
/// Chosen per-request by the caller, or defaulted from the query type.
/// Immutable for the lifetime of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    StrongTimeliness,
    WeakTimeliness,
    MarketAware,
    NoCache,
    Adaptive,
}

impl Strategy {
    /// Default strategy for a query type when the caller did not pick one.
    ///
    /// Live-price shapes must not serve stale data; historical shapes can
    /// tolerate minutes of it; everything else follows the market session.
    pub fn default_for_query(query_type: &str) -> Strategy {
        match query_type.trim().to_ascii_lowercase().as_str() {
            "quote" | "tick" | "depth" => Strategy::StrongTimeliness,
            "history" | "candles" | "fundamentals" => Strategy::WeakTimeliness,
            _ => Strategy::MarketAware,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strategy::StrongTimeliness => "StrongTimeliness",
            Strategy::WeakTimeliness => "WeakTimeliness",
            Strategy::MarketAware => "MarketAware",
            Strategy::NoCache => "NoCache",
            Strategy::Adaptive => "Adaptive",
        };
        f.write_str(s)
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "StrongTimeliness" | "STRONG_TIMELINESS" => Ok(Strategy::StrongTimeliness),
            "WeakTimeliness" | "WEAK_TIMELINESS" => Ok(Strategy::WeakTimeliness),
            "MarketAware" | "MARKET_AWARE" => Ok(Strategy::MarketAware),
            "NoCache" | "NO_CACHE" => Ok(Strategy::NoCache),
            "Adaptive" | "ADAPTIVE" => Ok(Strategy::Adaptive),
            other => Err(format!("invalid Strategy value: {}", other)),
        }
    }
}

/// Derived freshness of a cache entry; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// age < ttl: servable as-is.
    Fresh,
    /// ttl <= age < ttl + stale_window: servable, but triggers a
    /// background refresh.
    Stale,
    /// age >= ttl + stale_window: treated as a miss.
    Expired,
}

impl Freshness {
    pub fn classify(age: Duration, ttl: Duration, stale_window: Duration) -> Freshness {
        if age < ttl {
            Freshness::Fresh
        } else if age < ttl + stale_window {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }
}
