//! The immutable request descriptor the engine is keyed on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::strategy::Strategy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("query type must not be empty")]
    EmptyQueryType,

    #[error("provider must not be empty")]
    EmptyProvider,

    #[error("request carries no usable symbols")]
    NoSymbols,
}

/// A data request keyed by (symbols, provider, query type, market).
///
/// Immutable once constructed. Symbols are normalized and deduplicated at
/// construction, preserving first-seen order so result assembly can follow
/// the caller's ordering; the key builder sorts its own copy, so symbol
/// order never leaks into cache identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRequest {
    pub query_type: String,
    pub symbols: Vec<String>,
    pub provider: String,
    pub market: Option<String>,
    pub options: BTreeMap<String, String>,
    pub strategy: Option<Strategy>,
}

impl CacheRequest {
    pub fn new(
        query_type: impl Into<String>,
        symbols: impl IntoIterator<Item = impl Into<String>>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            query_type: query_type.into().trim().to_string(),
            symbols: normalize_symbols(symbols),
            provider: provider.into().trim().to_string(),
            market: None,
            options: BTreeMap::new(),
            strategy: None,
        }
    }

    pub fn with_market(mut self, market: impl Into<String>) -> Self {
        self.market = Some(market.into().trim().to_ascii_uppercase());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Reject malformed requests before they touch the cache.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.query_type.is_empty() {
            return Err(RequestError::EmptyQueryType);
        }
        if self.provider.is_empty() {
            return Err(RequestError::EmptyProvider);
        }
        if self.symbols.is_empty() {
            return Err(RequestError::NoSymbols);
        }
        Ok(())
    }

    /// Caller-chosen strategy, or the query-type default.
    pub fn strategy_or_default(&self) -> Strategy {
        self.strategy
            .unwrap_or_else(|| Strategy::default_for_query(&self.query_type))
    }
}

fn normalize_symbols(symbols: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for s in symbols {
        let s = s.into().trim().to_ascii_uppercase();
        if s.is_empty() {
            continue;
        }
        if seen.insert(s.clone()) {
            out.push(s);
        }
    }

    out
}
