//! Startup configuration for the engine.
//!
//! Everything here is consumed once at construction. The only hot-reload
//! surface in the system is `MarketCalendar::reload`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use market::calendar::CalendarError;
use market::types::HoursTable;
use policy::key::DEFAULT_MAX_KEY_LEN;
use policy::ttl::{TtlTableConfig, TtlTableError};
use scheduler::optimizer::{OptimizerConfig, OptimizerConfigError};
use scheduler::refresh::{RefreshConfig, RefreshConfigError};

/// Truncated keys are `prefix ":" md5[..8]`; anything shorter than this
/// cannot hold a meaningful prefix.
const MIN_KEY_LEN: usize = 32;

/// Fatal at startup. A misconfigured TTL table or trading-hours table is
/// a deploy problem, not something to run with.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid TTL table: {0}")]
    Ttl(#[from] TtlTableError),

    #[error("invalid trading-hours table: {0}")]
    Calendar(#[from] CalendarError),

    #[error("invalid refresh config: {0}")]
    Refresh(#[from] RefreshConfigError),

    #[error("invalid optimizer config: {0}")]
    Optimizer(#[from] OptimizerConfigError),

    #[error("max_key_len {0} is below the minimum of {MIN_KEY_LEN}")]
    KeyLenTooSmall(usize),

    #[error("malformed config JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Strategy→TTL table overrides; defaults are the canonical table.
    pub ttl: TtlTableConfig,

    /// Trading-hours table; `None` uses the built-in standard table.
    pub markets: Option<HoursTable>,

    /// Cache-key length cap for backends with key-size limits.
    pub max_key_len: usize,

    pub refresh: RefreshConfig,

    pub optimizer: OptimizerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ttl: TtlTableConfig::default(),
            markets: None,
            max_key_len: DEFAULT_MAX_KEY_LEN,
            refresh: RefreshConfig::default(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a config from JSON. Unspecified fields take
    /// their defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        policy::ttl::TtlTable::from_config(&self.ttl)?;

        if let Some(table) = &self.markets {
            // Construction validates; discard the calendar.
            market::calendar::MarketCalendar::new(table.clone())?;
        }

        self.refresh.validate()?;
        self.optimizer.validate()?;

        if self.max_key_len < MIN_KEY_LEN {
            return Err(ConfigError::KeyLenTooSmall(self.max_key_len));
        }

        Ok(())
    }
}
