//! Stale-while-revalidate background refresh.
//!
//! Responsibilities:
//!   • Accept refresh jobs without ever blocking the caller
//!   • Deduplicate per key: a key already queued or running is not
//!     re-enqueued
//!   • Enforce a per-key cooldown after completion so a permanently
//!     failing key cannot turn into a retry storm
//!   • Cap concurrent refresh work at the optimizer's current limit
//!
//! A full queue drops the job with a warning. Serving slightly stale data
//! is acceptable; backpressure on the read path is not.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use common::clock::Clock;
use common::metrics::MetricsSink;
use policy::key::CacheKey;

use crate::optimizer::PerformanceOptimizer;

#[derive(Debug, Error)]
pub enum RefreshConfigError {
    #[error("queue_capacity must be at least 1")]
    ZeroQueueCapacity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Bound on jobs waiting for a worker slot.
    pub queue_capacity: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { queue_capacity: 64 }
    }
}

impl RefreshConfig {
    pub fn validate(&self) -> Result<(), RefreshConfigError> {
        if self.queue_capacity == 0 {
            return Err(RefreshConfigError::ZeroQueueCapacity);
        }
        Ok(())
    }
}

/// The deferred work of one refresh: re-fetch and re-store one key.
pub type RefreshFuture = BoxFuture<'static, anyhow::Result<()>>;

struct RefreshJob {
    key: CacheKey,
    cooldown: Duration,
    work: RefreshFuture,
}

struct SchedulerState {
    /// Keys currently queued or running.
    pending: Mutex<HashSet<CacheKey>>,
    /// Keys that completed recently and may not be rescheduled yet.
    cooldowns: Mutex<HashMap<CacheKey, DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsSink>,
    optimizer: Arc<PerformanceOptimizer>,
}

pub struct RefreshScheduler {
    tx: mpsc::Sender<RefreshJob>,
    state: Arc<SchedulerState>,
}

impl RefreshScheduler {
    /// Validate config, spawn the dispatcher, and return the handle used
    /// to enqueue work.
    pub fn start(
        cfg: RefreshConfig,
        optimizer: Arc<PerformanceOptimizer>,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, RefreshConfigError> {
        cfg.validate()?;

        let (tx, rx) = mpsc::channel(cfg.queue_capacity);
        let state = Arc::new(SchedulerState {
            pending: Mutex::new(HashSet::new()),
            cooldowns: Mutex::new(HashMap::new()),
            clock,
            metrics,
            optimizer,
        });

        tokio::spawn(dispatch(rx, Arc::clone(&state)));

        Ok(Self { tx, state })
    }

    /// Enqueue a refresh for `key`.
    ///
    /// Returns false when the job was not accepted: the key is already
    /// pending, still cooling down, or the queue is full. All three are
    /// normal operation, not errors.
    pub fn schedule(&self, key: CacheKey, cooldown: Duration, work: RefreshFuture) -> bool {
        let now = self.state.clock.now();

        {
            let cooldowns = self.state.cooldowns.lock();
            if let Some(until) = cooldowns.get(&key) {
                if now < *until {
                    tracing::debug!(key = %key, "refresh suppressed by cooldown");
                    return false;
                }
            }
        }

        {
            let mut pending = self.state.pending.lock();
            if !pending.insert(key.clone()) {
                tracing::debug!(key = %key, "refresh already pending");
                return false;
            }
        }

        match self.tx.try_send(RefreshJob {
            key: key.clone(),
            cooldown,
            work,
        }) {
            Ok(()) => {
                self.state.metrics.counter("refresh.scheduled", 1);
                true
            }
            Err(_) => {
                // Dropping is deliberate: the entry stays stale and the
                // next stale read retries.
                self.state.pending.lock().remove(&key);
                tracing::warn!(key = %key, "refresh queue full, dropping job");
                self.state.metrics.counter("refresh.dropped", 1);
                false
            }
        }
    }

    /// Number of keys queued or running; test and introspection hook.
    pub fn pending_len(&self) -> usize {
        self.state.pending.lock().len()
    }
}

async fn dispatch(mut rx: mpsc::Receiver<RefreshJob>, state: Arc<SchedulerState>) {
    let mut running: JoinSet<()> = JoinSet::new();

    while let Some(job) = rx.recv().await {
        // Re-read the limit per job so the optimizer's adjustments take
        // effect without restarting the pool.
        let limit = state
            .optimizer
            .current_limits()
            .max_concurrent_fetches;

        while running.len() >= limit {
            let _ = running.join_next().await;
        }

        let state = Arc::clone(&state);
        running.spawn(async move {
            let RefreshJob { key, cooldown, work } = job;

            let result = work.await;

            let now = state.clock.now();
            {
                let mut cooldowns = state.cooldowns.lock();
                cooldowns.retain(|_, until| *until > now);
                cooldowns.insert(
                    key.clone(),
                    now + chrono::Duration::from_std(cooldown)
                        .unwrap_or_else(|_| chrono::Duration::zero()),
                );
            }
            state.pending.lock().remove(&key);

            match result {
                Ok(()) => state.metrics.counter("refresh.success", 1),
                Err(e) => {
                    // The stale entry stays untouched; a later stale read
                    // reschedules once the cooldown passes.
                    tracing::warn!(key = %key, error = %e, "background refresh failed");
                    state.metrics.counter("refresh.failure", 1);
                }
            }
        });
    }

    while running.join_next().await.is_some() {}
}
