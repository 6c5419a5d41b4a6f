//! The single source of TTL values.
//!
//! Every (strategy, session-state) → TTL lookup in the system goes through
//! `TtlStrategyResolver`. No other module may hold numeric TTL constants;
//! duplicated tables are exactly the drift this design exists to prevent.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use market::types::MarketSession;

use crate::strategy::Strategy;

#[derive(Debug, Error)]
pub enum TtlTableError {
    #[error("ttl value {name} must be greater than zero")]
    ZeroTtl { name: &'static str },

    #[error("stale ratio {0} is outside [0, 1]")]
    BadStaleRatio(f64),

    #[error("adaptive floor ({floor:?}) exceeds adaptive base ({base:?}) for {name}")]
    FloorAboveBase {
        name: &'static str,
        floor: Duration,
        base: Duration,
    },
}

/// Bias supplied by the load observer for the Adaptive strategy.
///
/// A factor above 1.0 lengthens adaptive TTLs (shedding upstream load),
/// below 1.0 shortens them (fresher data when the system is idle).
pub trait TtlBias: Send + Sync {
    fn bias_factor(&self) -> f64;
}

/// Bounds the bias regardless of what the observer reports.
pub const MIN_BIAS_FACTOR: f64 = 0.5;
pub const MAX_BIAS_FACTOR: f64 = 2.0;

/// Outcome of a TTL resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlDecision {
    pub ttl: Duration,
    pub stale_window: Duration,
}

impl TtlDecision {
    /// True when the value must not be stored at all.
    pub fn is_no_store(&self) -> bool {
        self.ttl.is_zero()
    }
}

/// Serde-facing TTL configuration, all durations in whole seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlTableConfig {
    pub strong_secs: u64,
    pub weak_open_secs: u64,
    pub weak_closed_secs: u64,
    pub market_aware_open_secs: u64,
    pub market_aware_closed_secs: u64,
    pub adaptive_base_open_secs: u64,
    pub adaptive_base_closed_secs: u64,
    pub adaptive_floor_open_secs: u64,
    pub adaptive_floor_closed_secs: u64,
    pub stale_ratio: f64,
}

impl Default for TtlTableConfig {
    fn default() -> Self {
        Self {
            strong_secs: 5,
            weak_open_secs: 300,
            weak_closed_secs: 600,
            market_aware_open_secs: 30,
            market_aware_closed_secs: 1800,
            adaptive_base_open_secs: 30,
            adaptive_base_closed_secs: 600,
            adaptive_floor_open_secs: 5,
            adaptive_floor_closed_secs: 60,
            stale_ratio: 0.2,
        }
    }
}

/// Validated, immutable TTL table.
#[derive(Debug, Clone)]
pub struct TtlTable {
    strong: Duration,
    weak_open: Duration,
    weak_closed: Duration,
    market_aware_open: Duration,
    market_aware_closed: Duration,
    adaptive_base_open: Duration,
    adaptive_base_closed: Duration,
    adaptive_floor_open: Duration,
    adaptive_floor_closed: Duration,
    stale_ratio: f64,
}

impl Default for TtlTable {
    fn default() -> Self {
        // The default config is valid by construction.
        Self::from_config(&TtlTableConfig::default())
            .unwrap_or_else(|_| unreachable!("default TTL config validates"))
    }
}

impl TtlTable {
    pub fn from_config(cfg: &TtlTableConfig) -> Result<Self, TtlTableError> {
        let nonzero = |name: &'static str, secs: u64| -> Result<Duration, TtlTableError> {
            if secs == 0 {
                Err(TtlTableError::ZeroTtl { name })
            } else {
                Ok(Duration::from_secs(secs))
            }
        };

        if !(0.0..=1.0).contains(&cfg.stale_ratio) {
            return Err(TtlTableError::BadStaleRatio(cfg.stale_ratio));
        }

        let table = Self {
            strong: nonzero("strong_secs", cfg.strong_secs)?,
            weak_open: nonzero("weak_open_secs", cfg.weak_open_secs)?,
            weak_closed: nonzero("weak_closed_secs", cfg.weak_closed_secs)?,
            market_aware_open: nonzero("market_aware_open_secs", cfg.market_aware_open_secs)?,
            market_aware_closed: nonzero(
                "market_aware_closed_secs",
                cfg.market_aware_closed_secs,
            )?,
            adaptive_base_open: nonzero("adaptive_base_open_secs", cfg.adaptive_base_open_secs)?,
            adaptive_base_closed: nonzero(
                "adaptive_base_closed_secs",
                cfg.adaptive_base_closed_secs,
            )?,
            adaptive_floor_open: nonzero(
                "adaptive_floor_open_secs",
                cfg.adaptive_floor_open_secs,
            )?,
            adaptive_floor_closed: nonzero(
                "adaptive_floor_closed_secs",
                cfg.adaptive_floor_closed_secs,
            )?,
            stale_ratio: cfg.stale_ratio,
        };

        if table.adaptive_floor_open > table.adaptive_base_open {
            return Err(TtlTableError::FloorAboveBase {
                name: "open",
                floor: table.adaptive_floor_open,
                base: table.adaptive_base_open,
            });
        }
        if table.adaptive_floor_closed > table.adaptive_base_closed {
            return Err(TtlTableError::FloorAboveBase {
                name: "closed",
                floor: table.adaptive_floor_closed,
                base: table.adaptive_base_closed,
            });
        }

        Ok(table)
    }

    /// Governing interval for periodic load sampling.
    ///
    /// Drawn from the table so there is no second hard-coded interval
    /// constant living elsewhere.
    pub fn sampling_interval(&self) -> Duration {
        self.market_aware_open
    }
}

/// Maps (strategy, session state) to a TTL decision.
pub struct TtlStrategyResolver {
    table: TtlTable,
    bias: Option<Arc<dyn TtlBias>>,
}

impl TtlStrategyResolver {
    pub fn new(table: TtlTable) -> Self {
        Self { table, bias: None }
    }

    /// Attach the load observer feeding the Adaptive strategy.
    pub fn with_bias(table: TtlTable, bias: Arc<dyn TtlBias>) -> Self {
        Self {
            table,
            bias: Some(bias),
        }
    }

    pub fn table(&self) -> &TtlTable {
        &self.table
    }

    pub fn resolve(&self, strategy: Strategy, session: &MarketSession) -> TtlDecision {
        let open = session.state.is_open();
        let t = &self.table;

        let (ttl, stale) = match strategy {
            Strategy::NoCache => (Duration::ZERO, Duration::ZERO),
            Strategy::StrongTimeliness => (t.strong, Duration::ZERO),
            Strategy::WeakTimeliness => {
                let ttl = if open { t.weak_open } else { t.weak_closed };
                (ttl, ttl.mul_f64(t.stale_ratio))
            }
            Strategy::MarketAware => {
                let ttl = if open {
                    t.market_aware_open
                } else {
                    t.market_aware_closed
                };
                (ttl, ttl.mul_f64(t.stale_ratio))
            }
            Strategy::Adaptive => {
                let (base, floor) = if open {
                    (t.adaptive_base_open, t.adaptive_floor_open)
                } else {
                    (t.adaptive_base_closed, t.adaptive_floor_closed)
                };

                let factor = self
                    .bias
                    .as_ref()
                    .map(|b| b.bias_factor())
                    .unwrap_or(1.0)
                    .clamp(MIN_BIAS_FACTOR, MAX_BIAS_FACTOR);

                let ttl = base.mul_f64(factor).max(floor);
                (ttl, ttl.mul_f64(t.stale_ratio))
            }
        };

        TtlDecision {
            ttl,
            stale_window: stale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use market::types::SessionState;

    fn session(state: SessionState) -> MarketSession {
        MarketSession {
            market: "US".to_string(),
            state,
            as_of: Utc.with_ymd_and_hms(2026, 3, 4, 15, 0, 0).single().unwrap(),
        }
    }

    struct FixedBias(f64);

    impl TtlBias for FixedBias {
        fn bias_factor(&self) -> f64 {
            self.0
        }
    }

    #[test]
    fn canonical_table_values() {
        let r = TtlStrategyResolver::new(TtlTable::default());

        let open = session(SessionState::Open);
        let closed = session(SessionState::Closed);

        let d = r.resolve(Strategy::StrongTimeliness, &open);
        assert_eq!(d.ttl, Duration::from_secs(5));
        assert_eq!(d.stale_window, Duration::ZERO);
        assert_eq!(r.resolve(Strategy::StrongTimeliness, &closed).ttl, d.ttl);

        assert_eq!(
            r.resolve(Strategy::WeakTimeliness, &open).ttl,
            Duration::from_secs(300)
        );
        assert_eq!(
            r.resolve(Strategy::WeakTimeliness, &closed).ttl,
            Duration::from_secs(600)
        );

        assert_eq!(
            r.resolve(Strategy::MarketAware, &open).ttl,
            Duration::from_secs(30)
        );
        assert_eq!(
            r.resolve(Strategy::MarketAware, &closed).ttl,
            Duration::from_secs(1800)
        );
    }

    #[test]
    fn pre_and_after_hours_use_the_closed_column() {
        let r = TtlStrategyResolver::new(TtlTable::default());

        for state in [SessionState::PreMarket, SessionState::AfterHours] {
            assert_eq!(
                r.resolve(Strategy::MarketAware, &session(state)).ttl,
                Duration::from_secs(1800)
            );
        }
    }

    #[test]
    fn stale_window_is_twenty_percent_of_ttl() {
        let r = TtlStrategyResolver::new(TtlTable::default());

        let d = r.resolve(Strategy::MarketAware, &session(SessionState::Open));
        assert_eq!(d.stale_window, Duration::from_secs(6));

        let d = r.resolve(Strategy::WeakTimeliness, &session(SessionState::Closed));
        assert_eq!(d.stale_window, Duration::from_secs(120));
    }

    #[test]
    fn no_cache_never_stores() {
        let r = TtlStrategyResolver::new(TtlTable::default());

        let d = r.resolve(Strategy::NoCache, &session(SessionState::Open));
        assert!(d.is_no_store());
        assert_eq!(d.stale_window, Duration::ZERO);
    }

    #[test]
    fn adaptive_scales_with_bias_and_respects_the_floor() {
        let open = session(SessionState::Open);

        let neutral =
            TtlStrategyResolver::with_bias(TtlTable::default(), Arc::new(FixedBias(1.0)));
        assert_eq!(
            neutral.resolve(Strategy::Adaptive, &open).ttl,
            Duration::from_secs(30)
        );

        let loaded = TtlStrategyResolver::with_bias(TtlTable::default(), Arc::new(FixedBias(2.0)));
        assert_eq!(
            loaded.resolve(Strategy::Adaptive, &open).ttl,
            Duration::from_secs(60)
        );

        // A bias below the clamp cannot push the TTL under the floor.
        let idle = TtlStrategyResolver::with_bias(TtlTable::default(), Arc::new(FixedBias(0.01)));
        let d = idle.resolve(Strategy::Adaptive, &open);
        assert_eq!(d.ttl, Duration::from_secs(15));
        assert!(d.ttl >= Duration::from_secs(5));
    }

    #[test]
    fn adaptive_without_observer_uses_the_base() {
        let r = TtlStrategyResolver::new(TtlTable::default());
        assert_eq!(
            r.resolve(Strategy::Adaptive, &session(SessionState::Closed)).ttl,
            Duration::from_secs(600)
        );
    }

    #[test]
    fn config_validation_rejects_bad_tables() {
        let mut cfg = TtlTableConfig::default();
        cfg.strong_secs = 0;
        assert!(matches!(
            TtlTable::from_config(&cfg),
            Err(TtlTableError::ZeroTtl { .. })
        ));

        let mut cfg = TtlTableConfig::default();
        cfg.stale_ratio = 1.5;
        assert!(matches!(
            TtlTable::from_config(&cfg),
            Err(TtlTableError::BadStaleRatio(_))
        ));

        let mut cfg = TtlTableConfig::default();
        cfg.adaptive_floor_open_secs = 120;
        assert!(matches!(
            TtlTable::from_config(&cfg),
            Err(TtlTableError::FloorAboveBase { .. })
        ));
    }

    #[test]
    fn sampling_interval_comes_from_the_table() {
        let table = TtlTable::default();
        assert_eq!(table.sampling_interval(), Duration::from_secs(30));
    }
}
