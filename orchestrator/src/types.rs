//! Collaborator traits and the engine's error taxonomy.
//!
//! The physical store and the upstream provider are external concerns;
//! the engine only sees these seams.

use async_trait::async_trait;
use thiserror::Error;

use policy::entry::CacheEntry;
use policy::key::CacheKey;
use policy::request::{CacheRequest, RequestError};

/// Upstream fetch failure.
///
/// Clonable so one leader failure can be broadcast verbatim to every
/// coalesced waiter. Never cached.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct FetchError {
    pub message: String,
}

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Cache-store failure. Recovered locally: the engine degrades to
/// pass-through instead of failing the request.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors `get_or_fetch` can surface to a caller.
///
/// Store failures are deliberately absent: they degrade service cost,
/// never correctness.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    Request(#[from] RequestError),

    #[error("upstream fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

/// The physical key-value store. Last-write-wins; no transactional
/// semantics expected. Concurrency discipline is the store's own problem.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError>;
    async fn set(&self, entry: CacheEntry) -> Result<(), StoreError>;
    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError>;
}

/// The upstream provider call. Opaque beyond payload and success/failure;
/// retry policy belongs to the implementation behind this seam, not to
/// the orchestrator.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, req: &CacheRequest) -> Result<Vec<u8>, FetchError>;
}
