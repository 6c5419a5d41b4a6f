//! The orchestrator root.
//!
//! Responsibilities:
//!   • Validate the request and pick its strategy
//!   • Build the canonical key and classify the stored entry
//!   • Serve fresh hits, serve stale hits while revalidating in the
//!     background, and coalesce misses onto a single leader fetch
//!   • Resolve TTLs through the one strategy table and write replacements
//!   • Degrade to pass-through when the store misbehaves
//!
//! The orchestrator is designed as an Arc-managed async service: leader
//! fetches and refresh jobs capture a clone of `Arc<Self>` so they run to
//! completion even if the caller that triggered them goes away.

use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use common::clock::Clock;
use common::logger::{TraceId, child_span, root_span};
use common::metrics::MetricsSink;
use market::calendar::MarketCalendar;
use market::detector::MarketDetector;
use policy::entry::CacheEntry;
use policy::key::{CacheKey, CacheKeyBuilder};
use policy::request::CacheRequest;
use policy::strategy::{Freshness, Strategy};
use policy::ttl::{TtlBias, TtlStrategyResolver, TtlTable};
use scheduler::optimizer::PerformanceOptimizer;
use scheduler::refresh::RefreshScheduler;

use crate::config::{ConfigError, EngineConfig};
use crate::inflight::InFlightCoordinator;
use crate::types::{CacheStore, EngineError, FetchError, Fetcher};

pub struct CacheOrchestrator {
    key_builder: CacheKeyBuilder,
    detector: MarketDetector,
    calendar: Arc<MarketCalendar>,
    resolver: TtlStrategyResolver,
    inflight: InFlightCoordinator,
    refresh: RefreshScheduler,
    optimizer: Arc<PerformanceOptimizer>,

    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
}

impl CacheOrchestrator {
    /// Build and start the engine.
    ///
    /// Validates all configuration (fatal on error), spawns the optimizer
    /// sampler and the refresh dispatcher, so this must run inside a
    /// tokio runtime.
    pub fn new(
        cfg: EngineConfig,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
        metrics: Arc<dyn MetricsSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, ConfigError> {
        cfg.validate()?;

        let table = TtlTable::from_config(&cfg.ttl)?;

        let calendar = match cfg.markets {
            Some(hours) => Arc::new(MarketCalendar::new(hours)?),
            None => Arc::new(MarketCalendar::standard()),
        };

        let optimizer = PerformanceOptimizer::new(
            cfg.optimizer,
            table.sampling_interval(),
            Arc::clone(&clock),
            Arc::clone(&metrics),
        )?;
        let _sampler = optimizer.spawn_sampler();

        let refresh = RefreshScheduler::start(
            cfg.refresh,
            Arc::clone(&optimizer),
            Arc::clone(&clock),
            Arc::clone(&metrics),
        )?;

        let bias: Arc<dyn TtlBias> = optimizer.clone();
        let resolver = TtlStrategyResolver::with_bias(table, bias);

        Ok(Arc::new(Self {
            key_builder: CacheKeyBuilder::new(cfg.max_key_len),
            detector: MarketDetector::new(),
            calendar,
            resolver,
            inflight: InFlightCoordinator::new(),
            refresh,
            optimizer,
            store,
            fetcher,
            metrics,
            clock,
        }))
    }

    /// Swap in a new trading-hours table at runtime.
    pub fn reload_calendar(&self, table: market::types::HoursTable) -> Result<(), ConfigError> {
        self.calendar.reload(table)?;
        Ok(())
    }

    /// The single entry point: serve from cache, revalidate in the
    /// background, or perform a deduplicated upstream fetch.
    pub async fn get_or_fetch(
        self: &Arc<Self>,
        req: CacheRequest,
    ) -> Result<Vec<u8>, EngineError> {
        req.validate()?;

        let trace = TraceId::default();
        let span = root_span("get_or_fetch", &trace);

        self.handle(req).instrument(span).await
    }

    async fn handle(self: &Arc<Self>, req: CacheRequest) -> Result<Vec<u8>, EngineError> {
        let strategy = req.strategy_or_default();

        // NoCache bypasses lookup, storage, and coalescing entirely.
        if strategy == Strategy::NoCache {
            self.metrics.counter("cache.bypass", 1);
            return Ok(self.timed_fetch(&req).await?);
        }

        let key = self.key_builder.build(&req);
        let now = self.clock.now();

        let entry = match self.store.get(&key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache store unavailable, passing through");
                self.metrics.counter("store.degraded", 1);
                None
            }
        };

        if let Some(entry) = entry {
            match entry.freshness(now) {
                Freshness::Fresh => {
                    self.metrics.counter("cache.hit", 1);
                    return Ok(entry.value);
                }
                Freshness::Stale => {
                    self.metrics.counter("cache.stale_hit", 1);
                    self.spawn_refresh(&req, strategy, &key, entry.stale_window);
                    return Ok(entry.value);
                }
                Freshness::Expired => {
                    self.metrics.counter("cache.expired", 1);
                }
            }
        }

        self.metrics.counter("cache.miss", 1);

        let (mut rx, is_leader) = self.inflight.acquire(&key, now).await;

        if is_leader {
            // The fetch runs detached so a caller that gives up waiting
            // still leaves a warm cache behind for everyone else.
            let engine = Arc::clone(self);
            let leader_req = req.clone();
            let leader_key = key.clone();
            tokio::spawn(async move {
                let outcome = engine
                    .fetch_and_store(&leader_req, strategy, &leader_key)
                    .await
                    .map(Arc::new);
                let done = engine.clock.now();
                engine.inflight.complete(&leader_key, outcome, done).await;
            });
        } else {
            self.metrics.counter("inflight.coalesced", 1);
        }

        match rx.recv().await {
            Ok(Ok(value)) => Ok(value.as_ref().clone()),
            Ok(Err(e)) => Err(EngineError::Fetch(e)),
            Err(_) => Err(EngineError::Fetch(FetchError::new("in-flight fetch abandoned"))),
        }
    }

    /// Fetch upstream, resolve the TTL for the target market's session,
    /// and store the replacement entry. Used by both leader fetches and
    /// background refreshes, so both paths price TTLs identically.
    async fn fetch_and_store(
        &self,
        req: &CacheRequest,
        strategy: Strategy,
        key: &CacheKey,
    ) -> Result<Vec<u8>, FetchError> {
        let value = self
            .timed_fetch(req)
            .instrument(child_span("fetch"))
            .await?;

        let now = self.clock.now();
        let market = self.market_for(req);
        let session = self.calendar.session_state(&market, now);
        let decision = self.resolver.resolve(strategy, &session);

        if !decision.is_no_store() {
            let entry = CacheEntry {
                key: key.clone(),
                value: value.clone(),
                stored_at: now,
                ttl: decision.ttl,
                stale_window: decision.stale_window,
                strategy,
            };

            if let Err(e) = self.store.set(entry).await {
                // Serving the fetched value still succeeds; only future
                // requests pay for the missed write.
                tracing::warn!(key = %key, error = %e, "cache store write failed");
                self.metrics.counter("store.degraded", 1);
            }
        }

        Ok(value)
    }

    async fn timed_fetch(&self, req: &CacheRequest) -> Result<Vec<u8>, FetchError> {
        self.optimizer.fetch_started();
        let started = std::time::Instant::now();

        let result = self.fetcher.fetch(req).await;

        self.optimizer.record_fetch_latency(started.elapsed());
        self.optimizer.fetch_finished();

        match &result {
            Ok(_) => self.metrics.counter("fetch.success", 1),
            Err(e) => {
                tracing::warn!(error = %e, "upstream fetch failed");
                self.metrics.counter("fetch.failure", 1);
            }
        }

        result
    }

    fn spawn_refresh(
        self: &Arc<Self>,
        req: &CacheRequest,
        strategy: Strategy,
        key: &CacheKey,
        stale_window: Duration,
    ) {
        // Half the stale window: enough to stop retry storms, short
        // enough that a failing key retries within its grace period.
        let cooldown = stale_window / 2;

        let engine = Arc::clone(self);
        let job_req = req.clone();
        let job_key = key.clone();

        let scheduled = self.refresh.schedule(
            key.clone(),
            cooldown,
            Box::pin(async move {
                engine
                    .fetch_and_store(&job_req, strategy, &job_key)
                    .await
                    .map_err(anyhow::Error::new)?;
                Ok(())
            }),
        );

        if scheduled {
            self.metrics.counter("refresh.triggered", 1);
        }
    }

    /// Market for TTL purposes: the request's explicit market, or the
    /// detector's verdict on the first symbol.
    fn market_for(&self, req: &CacheRequest) -> String {
        if let Some(market) = &req.market {
            return market.clone();
        }

        let symbol = req.symbols.first().map(String::as_str).unwrap_or_default();
        self.detector.detect(symbol).0
    }
}
