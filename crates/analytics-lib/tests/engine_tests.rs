//! End-to-end tests for the analytics engine

use analytics_lib::{
    AnalyticsEngine, CacheStore, EngineConfig, EngineError, MemoryStore, NoopObserver, NullStore,
    Observation,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

fn obs(device: &str, rps: u64) -> Observation {
    Observation::new(device, Utc::now(), 35.0, 512.0, rps)
}

/// Deterministic non-round floats covering the full mantissa
fn jittered(device: &str, seq: u64, rps: u64) -> Observation {
    let mut x = seq
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(1_442_695_040_888_963_407);
    x ^= x >> 29;
    let unit = (x >> 11) as f64 / (1u64 << 53) as f64;
    Observation::new(device, Utc::now(), unit * 100.0, 1024.0 + unit * 1_048_576.0, rps)
}

fn config(window_size: usize) -> EngineConfig {
    EngineConfig::builder()
        .window_size(window_size)
        .queue_capacity(32)
        .checkpoint_interval(Duration::from_secs(3600))
        .build()
        .unwrap()
}

async fn memory_only(window_size: usize) -> AnalyticsEngine {
    AnalyticsEngine::start(config(window_size), Arc::new(NullStore), Arc::new(NoopObserver)).await
}

#[tokio::test]
async fn test_first_nine_observations_never_flagged() {
    let engine = memory_only(50).await;
    for v in [1, 1, 1, 1, 1, 1, 1, 1, 100_000] {
        assert_ok!(engine.submit(obs("d", v)).await);
    }
    engine.stop().await;

    let stats = engine.stats().await;
    assert_eq!(stats.total_processed, 9);
    assert_eq!(stats.anomalies_detected, 0);
}

#[tokio::test]
async fn test_constant_window_then_spike_not_flagged() {
    let engine = memory_only(50).await;
    for _ in 0..10 {
        assert_ok!(engine.submit(obs("d", 10)).await);
    }
    assert_ok!(engine.submit(obs("d", 50)).await);
    engine.stop().await;

    assert_eq!(engine.stats().await.anomalies_detected, 0);
}

#[tokio::test]
async fn test_spike_against_mean_100_sd_10() {
    let flagged = memory_only(50).await;
    let quiet = memory_only(50).await;
    for i in 0..10 {
        let v = if i % 2 == 0 { 90 } else { 110 };
        assert_ok!(flagged.submit(obs("d", v)).await);
        assert_ok!(quiet.submit(obs("d", v)).await);
    }
    assert_ok!(flagged.submit(obs("d", 125)).await);
    assert_ok!(quiet.submit(obs("d", 119)).await);
    flagged.stop().await;
    quiet.stop().await;

    let stats = flagged.stats().await;
    assert_eq!(stats.anomalies_detected, 1);
    assert!((stats.anomaly_rate_percent - 100.0 / 11.0).abs() < 1e-9);
    assert_eq!(quiet.stats().await.anomalies_detected, 0);
}

#[tokio::test]
async fn test_window_keeps_most_recent() {
    let engine = memory_only(50).await;
    for v in 1..=60 {
        assert_ok!(engine.submit(obs("d", v)).await);
    }
    engine.stop().await;

    let window = engine.current_window().await;
    assert_eq!(window.len(), 50);
    assert_eq!(window.first().map(|o| o.rps), Some(11));
    assert_eq!(window.last().map(|o| o.rps), Some(60));
    assert!((engine.stats().await.rolling_average - 35.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_concurrent_producers_keep_their_order() {
    let engine = Arc::new(memory_only(100).await);

    let mut handles = Vec::new();
    for producer in 0..4u64 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let device = format!("producer-{}", producer);
            for seq in 0..25u64 {
                engine
                    .submit(obs(&device, producer * 1000 + seq))
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    engine.stop().await;

    assert_eq!(engine.stats().await.total_processed, 100);
    let window = engine.current_window().await;
    for producer in 0..4u64 {
        let device = format!("producer-{}", producer);
        let seen: Vec<u64> = window
            .iter()
            .filter(|o| o.device_id == device)
            .map(|o| o.rps)
            .collect();
        let expected: Vec<u64> = (0..25).map(|seq| producer * 1000 + seq).collect();
        assert_eq!(seen, expected);
    }
}

#[tokio::test]
async fn test_checkpoint_round_trip_through_cache() {
    let store = Arc::new(MemoryStore::new());

    let first = AnalyticsEngine::start(config(50), store.clone(), Arc::new(NoopObserver)).await;
    for i in 0..10 {
        let v = if i % 2 == 0 { 90 } else { 110 };
        assert_ok!(first.submit(jittered("d", i, v)).await);
    }
    assert_ok!(first.submit(jittered("d", 10, 125)).await);
    first.stop().await;
    let before = first.stats().await;

    let anomalies = first.recent_anomalies(10).await;
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].metric.rps, 125);
    assert!(first.cache_footprint().await > 0);

    let second = AnalyticsEngine::start(config(50), store.clone(), Arc::new(NoopObserver)).await;
    let after = second.stats().await;
    assert_eq!(after, before);
    assert_eq!(second.current_window().await, first.current_window().await);
    assert_eq!(second.store_healthy().await, Some(true));
    second.stop().await;
}

#[tokio::test]
async fn test_restored_window_is_bit_exact() {
    let store = Arc::new(MemoryStore::new());

    let first = AnalyticsEngine::start(config(50), store.clone(), Arc::new(NoopObserver)).await;
    for seq in 0..500 {
        assert_ok!(first.submit(jittered("d", seq, 100)).await);
    }
    first.stop().await;

    let second = AnalyticsEngine::start(config(50), store, Arc::new(NoopObserver)).await;
    let before = first.current_window().await;
    let after = second.current_window().await;
    assert_eq!(after.len(), 50);
    for (a, b) in before.iter().zip(after.iter()) {
        assert_eq!(a.cpu_usage.to_bits(), b.cpu_usage.to_bits());
        assert_eq!(a.memory_mb.to_bits(), b.memory_mb.to_bits());
    }
    second.stop().await;
}

#[tokio::test]
async fn test_cache_outage_is_invisible_to_producers() {
    let store = Arc::new(MemoryStore::new());
    store.set_available(false);

    let engine = AnalyticsEngine::start(config(50), store.clone(), Arc::new(NoopObserver)).await;
    for v in 0..20 {
        assert_ok!(engine.submit(obs("d", v)).await);
    }
    engine.stop().await;

    assert_eq!(engine.stats().await.total_processed, 20);
    assert!(engine.recent_anomalies(10).await.is_empty());
    assert_eq!(engine.cache_footprint().await, 0);
    assert_eq!(engine.store_healthy().await, Some(false));

    store.set_available(true);
    assert!(store.keys("analytics:*").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_after_stop() {
    let engine = memory_only(50).await;
    engine.stop().await;
    assert_eq!(engine.submit(obs("d", 1)).await, Err(EngineError::NotRunning));
}
