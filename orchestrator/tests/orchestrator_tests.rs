
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use common::clock::ManualClock;
use orchestrator::config::EngineConfig;
use orchestrator::engine::CacheOrchestrator;
use orchestrator::types::EngineError;
use policy::request::CacheRequest;
use policy::strategy::Strategy;

use mock_collab::{MockFetcher, MockStore, RecordingMetrics};

/// Wednesday 2026-03-04 15:00 UTC, 10:00 in New York: US market open.
fn open_wednesday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 4, 15, 0, 0).unwrap()
}

/// Saturday: every market closed.
fn weekend() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 7, 15, 0, 0).unwrap()
}

struct Harness {
    engine: Arc<CacheOrchestrator>,
    store: Arc<MockStore>,
    fetcher: Arc<MockFetcher>,
    clock: Arc<ManualClock>,
    metrics: Arc<RecordingMetrics>,
}

fn harness_at(start: DateTime<Utc>, store: Arc<MockStore>, fetcher: Arc<MockFetcher>) -> Harness {
    let clock = Arc::new(ManualClock::new(start));
    let metrics = RecordingMetrics::new();

    let engine = CacheOrchestrator::new(
        EngineConfig::default(),
        store.clone(),
        fetcher.clone(),
        metrics.clone(),
        clock.clone(),
    )
    .expect("default config must construct");

    Harness {
        engine,
        store,
        fetcher,
        clock,
        metrics,
    }
}

fn harness(fetcher: Arc<MockFetcher>) -> Harness {
    harness_at(open_wednesday(), MockStore::new(), fetcher)
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn miss_then_fresh_hit_without_refetch() {
    let h = harness(MockFetcher::ok(b"quote-v1"));
    let req = CacheRequest::new("quote", ["AAPL"], "polygon");

    let first = h.engine.get_or_fetch(req.clone()).await.unwrap();
    let second = h.engine.get_or_fetch(req).await.unwrap();

    assert_eq!(first, b"quote-v1");
    assert_eq!(second, b"quote-v1");
    assert_eq!(h.fetcher.calls(), 1);
    assert_eq!(h.metrics.counter_value("cache.miss"), 1);
    assert_eq!(h.metrics.counter_value("cache.hit"), 1);
}

#[tokio::test]
async fn concurrent_misses_share_one_upstream_fetch() {
    let h = harness(MockFetcher::ok_with_delay(b"payload", Duration::from_millis(400)));
    let req = CacheRequest::new("quote", ["AAPL"], "polygon");

    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = h.engine.clone();
        let req = req.clone();
        handles.push(tokio::spawn(async move { engine.get_or_fetch(req).await }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), b"payload");
    }

    assert_eq!(h.fetcher.calls(), 1);
    assert_eq!(h.metrics.counter_value("inflight.coalesced"), 9);
}

#[tokio::test]
async fn abandoned_caller_still_warms_the_cache() {
    let h = harness(MockFetcher::ok_with_delay(b"warm", Duration::from_millis(200)));
    let req = CacheRequest::new("quote", ["AAPL"], "polygon");

    let engine = h.engine.clone();
    let caller_req = req.clone();
    let caller = tokio::spawn(async move { engine.get_or_fetch(caller_req).await });

    // Let the caller take leadership, then give up mid-fetch.
    tokio::time::sleep(Duration::from_millis(50)).await;
    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());

    let store = h.store.clone();
    wait_until(move || store.len() == 1).await;

    // The detached fetch finished anyway; the next read is a hit.
    assert_eq!(h.engine.get_or_fetch(req).await.unwrap(), b"warm");
    assert_eq!(h.fetcher.calls(), 1);
    assert_eq!(h.metrics.counter_value("cache.hit"), 1);
}

#[tokio::test]
async fn stale_hit_serves_old_value_and_revalidates_in_background() {
    // "snapshot" defaults to the market-aware strategy: 30s TTL while the
    // US market is open, with a 6s stale window on top.
    let h = harness(MockFetcher::ok(b"v1"));
    let req = CacheRequest::new("snapshot", ["AAPL"], "polygon").with_market("US");

    assert_eq!(h.engine.get_or_fetch(req.clone()).await.unwrap(), b"v1");

    h.clock.advance(chrono::Duration::seconds(32));
    h.fetcher.set_response(Ok(b"v2".to_vec()));

    // Inside the stale window: the caller still gets the old value.
    assert_eq!(h.engine.get_or_fetch(req.clone()).await.unwrap(), b"v1");
    assert_eq!(h.metrics.counter_value("cache.stale_hit"), 1);
    assert_eq!(h.metrics.counter_value("refresh.triggered"), 1);

    let metrics = h.metrics.clone();
    wait_until(move || metrics.counter_value("refresh.success") == 1).await;

    assert_eq!(h.fetcher.calls(), 2);
    assert_eq!(h.engine.get_or_fetch(req).await.unwrap(), b"v2");
}

#[tokio::test]
async fn repeated_stale_reads_trigger_a_single_refresh() {
    let h = harness(MockFetcher::ok(b"v1"));
    let req = CacheRequest::new("snapshot", ["AAPL"], "polygon").with_market("US");

    h.engine.get_or_fetch(req.clone()).await.unwrap();

    h.clock.advance(chrono::Duration::seconds(32));
    h.fetcher.set_response(Ok(b"v2".to_vec()));

    for _ in 0..5 {
        let value = h.engine.get_or_fetch(req.clone()).await.unwrap();
        assert!(value == b"v1" || value == b"v2");
    }

    let metrics = h.metrics.clone();
    wait_until(move || metrics.counter_value("refresh.success") >= 1).await;

    // One initial fetch plus exactly one revalidation.
    assert_eq!(h.fetcher.calls(), 2);
    assert_eq!(h.metrics.counter_value("refresh.triggered"), 1);
}

#[tokio::test]
async fn expired_entry_is_refetched_inline() {
    let h = harness(MockFetcher::ok(b"v1"));
    let req = CacheRequest::new("snapshot", ["AAPL"], "polygon").with_market("US");

    h.engine.get_or_fetch(req.clone()).await.unwrap();

    // Past TTL + stale window (30s + 6s).
    h.clock.advance(chrono::Duration::seconds(60));
    h.fetcher.set_response(Ok(b"v2".to_vec()));

    assert_eq!(h.engine.get_or_fetch(req).await.unwrap(), b"v2");
    assert_eq!(h.fetcher.calls(), 2);
    assert_eq!(h.metrics.counter_value("cache.expired"), 1);
    assert_eq!(h.metrics.counter_value("refresh.triggered"), 0);
}

#[tokio::test]
async fn closed_market_keeps_entries_longer() {
    let h = harness_at(weekend(), MockStore::new(), MockFetcher::ok(b"friday-close"));
    let req = CacheRequest::new("snapshot", ["AAPL"], "polygon").with_market("US");

    h.engine.get_or_fetch(req.clone()).await.unwrap();

    // Ten minutes later the weekend entry is still fresh.
    h.clock.advance(chrono::Duration::seconds(600));
    assert_eq!(h.engine.get_or_fetch(req).await.unwrap(), b"friday-close");
    assert_eq!(h.fetcher.calls(), 1);
}

#[tokio::test]
async fn strong_timeliness_expires_quickly_with_no_stale_window() {
    let h = harness(MockFetcher::ok(b"tick"));
    let req = CacheRequest::new("quote", ["AAPL"], "polygon");

    h.engine.get_or_fetch(req.clone()).await.unwrap();

    h.clock.advance(chrono::Duration::seconds(4));
    h.engine.get_or_fetch(req.clone()).await.unwrap();
    assert_eq!(h.fetcher.calls(), 1);

    h.clock.advance(chrono::Duration::seconds(2));
    h.engine.get_or_fetch(req).await.unwrap();
    assert_eq!(h.fetcher.calls(), 2);
    assert_eq!(h.metrics.counter_value("cache.stale_hit"), 0);
}

#[tokio::test]
async fn no_cache_bypasses_the_store_entirely() {
    let h = harness(MockFetcher::ok(b"live"));
    let req = CacheRequest::new("quote", ["AAPL"], "polygon").with_strategy(Strategy::NoCache);

    for _ in 0..3 {
        assert_eq!(h.engine.get_or_fetch(req.clone()).await.unwrap(), b"live");
    }

    assert_eq!(h.fetcher.calls(), 3);
    assert_eq!(h.store.len(), 0);
    assert_eq!(h.store.gets.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(h.metrics.counter_value("cache.bypass"), 3);
}

#[tokio::test]
async fn store_failure_degrades_to_passthrough() {
    let h = harness_at(open_wednesday(), MockStore::failing(), MockFetcher::ok(b"payload"));
    let req = CacheRequest::new("quote", ["AAPL"], "polygon");

    assert_eq!(h.engine.get_or_fetch(req.clone()).await.unwrap(), b"payload");
    assert_eq!(h.engine.get_or_fetch(req).await.unwrap(), b"payload");

    // No cache means every read pays for a fetch, but none of them fail.
    assert_eq!(h.fetcher.calls(), 2);
    assert!(h.metrics.counter_value("store.degraded") >= 2);

    // Writes were attempted and rejected; nothing silently skipped them.
    assert_eq!(h.store.sets.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert_eq!(h.store.len(), 0);
}

#[tokio::test]
async fn fetch_errors_reach_every_waiter_and_are_not_cached() {
    let fetcher = MockFetcher::failing("provider timeout");
    let h = harness(fetcher);
    let req = CacheRequest::new("quote", ["AAPL"], "polygon");

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = h.engine.clone();
        let req = req.clone();
        handles.push(tokio::spawn(async move { engine.get_or_fetch(req).await }));
    }

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, EngineError::Fetch(e) if e.message == "provider timeout"));
    }

    assert_eq!(h.store.len(), 0);

    // A later request retries upstream instead of serving the failure.
    h.fetcher.set_response(Ok(b"recovered".to_vec()));
    assert_eq!(h.engine.get_or_fetch(req).await.unwrap(), b"recovered");
}

#[tokio::test]
async fn symbol_order_and_casing_do_not_change_cache_identity() {
    let h = harness(MockFetcher::ok(b"pair"));

    let first = CacheRequest::new("quote", ["MSFT", "AAPL"], "polygon");
    let second = CacheRequest::new("quote", [" aapl ", "msft"], "polygon");

    h.engine.get_or_fetch(first).await.unwrap();
    h.engine.get_or_fetch(second).await.unwrap();

    assert_eq!(h.fetcher.calls(), 1);
    assert_eq!(h.metrics.counter_value("cache.hit"), 1);
}

#[tokio::test]
async fn invalid_requests_never_reach_upstream() {
    let h = harness(MockFetcher::ok(b"unused"));
    let req = CacheRequest::new("quote", ["", "  "], "polygon");

    let err = h.engine.get_or_fetch(req).await.unwrap_err();

    assert!(matches!(err, EngineError::Request(_)));
    assert_eq!(h.fetcher.calls(), 0);
}

#[tokio::test]
async fn unrecognized_symbols_fall_back_to_closed_market_ttls() {
    let h = harness(MockFetcher::ok(b"mystery"));
    // No explicit market, and nothing the detector recognizes.
    let req = CacheRequest::new("snapshot", ["ZZZZZZZ7"], "polygon");

    h.engine.get_or_fetch(req.clone()).await.unwrap();

    // Well past the open-market TTL; the closed-market TTL still holds.
    h.clock.advance(chrono::Duration::seconds(120));
    assert_eq!(h.engine.get_or_fetch(req).await.unwrap(), b"mystery");
    assert_eq!(h.fetcher.calls(), 1);
}
