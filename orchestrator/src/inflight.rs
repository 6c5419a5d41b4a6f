//! Per-key coalescing of concurrent upstream fetches.
//!
//! Exactly one caller per key becomes the leader and performs the fetch;
//! everyone else subscribes to the leader's ticket and receives the same
//! outcome, success or failure. The ticket map's mutex covers only ticket
//! creation and removal, never the fetch itself.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, broadcast};

use policy::key::CacheKey;

use crate::types::FetchError;

/// What every coalesced caller receives. `Arc` keeps the broadcast cheap
/// for large payloads.
pub type FetchOutcome = Result<Arc<Vec<u8>>, FetchError>;

struct Ticket {
    tx: broadcast::Sender<FetchOutcome>,
    started_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct InFlightCoordinator {
    tickets: Mutex<HashMap<CacheKey, Ticket>>,
}

impl InFlightCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the in-flight fetch for `key`, creating it if absent.
    ///
    /// Returns the receiver for the shared outcome and whether this
    /// caller is the leader who must perform the fetch and `complete` it.
    pub async fn acquire(
        &self,
        key: &CacheKey,
        now: DateTime<Utc>,
    ) -> (broadcast::Receiver<FetchOutcome>, bool) {
        let mut tickets = self.tickets.lock().await;

        if let Some(ticket) = tickets.get(key) {
            return (ticket.tx.subscribe(), false);
        }

        // One outcome per ticket, so capacity 1 can never lag a waiter.
        let (tx, rx) = broadcast::channel(1);
        tickets.insert(
            key.clone(),
            Ticket {
                tx,
                started_at: now,
            },
        );

        (rx, true)
    }

    /// Publish the leader's outcome and retire the ticket.
    ///
    /// Callers that acquire after this point start a fresh fetch; waiters
    /// that already hold a receiver all observe this outcome.
    pub async fn complete(&self, key: &CacheKey, outcome: FetchOutcome, now: DateTime<Utc>) {
        let ticket = self.tickets.lock().await.remove(key);

        if let Some(ticket) = ticket {
            let waited = (now - ticket.started_at).to_std().unwrap_or_default();
            tracing::debug!(
                key = %key,
                elapsed_ms = waited.as_millis() as u64,
                ok = outcome.is_ok(),
                "in-flight fetch completed"
            );

            // Err means every waiter already gave up; nothing to deliver.
            let _ = ticket.tx.send(outcome);
        }
    }

    /// Number of fetches currently in flight.
    pub async fn len(&self) -> usize {
        self.tickets.lock().await.len()
    }
}
