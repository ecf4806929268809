/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use slog::Logger;
use tokio_util::sync::CancellationToken;

use pulse_types::Metric;
use pulsed::store::{MemoryStore, MetricStore, SqliteStore};

fn sqlite_store(dir: &tempfile::TempDir) -> SqliteStore {
    SqliteStore::open(
        dir.path().join("metrics.db"),
        CancellationToken::new(),
        Logger::root(slog::Discard, slog::o!()),
    )
    .unwrap()
}

async fn gauge_idempotence(store: &dyn MetricStore) {
    for _ in 0..5 {
        store.upsert_gauge("Alloc", 42.5).await.unwrap();
    }
    assert_eq!(store.get_gauge("Alloc").await.unwrap(), Some(42.5));
}

async fn counter_additivity_across_batch_splits(store: &dyn MetricStore) {
    // same deltas, three different batching boundaries
    store.upsert_counter("Hits", 1).await.unwrap();
    store
        .update_batch(&[Metric::counter("Hits", 2), Metric::counter("Hits", 3)])
        .await
        .unwrap();
    store
        .update_batch(&[Metric::counter("Hits", 4)])
        .await
        .unwrap();
    store.upsert_counter("Hits", 5).await.unwrap();

    assert_eq!(store.get_counter("Hits").await.unwrap(), Some(15));
}

async fn gauge_last_write_wins(store: &dyn MetricStore) {
    store.upsert_gauge("Alloc", 10.0).await.unwrap();
    store.upsert_gauge("Alloc", 20.0).await.unwrap();
    assert_eq!(store.get_gauge("Alloc").await.unwrap(), Some(20.0));
}

async fn counter_sums(store: &dyn MetricStore) {
    store.upsert_counter("PollCount", 1).await.unwrap();
    store.upsert_counter("PollCount", 2).await.unwrap();
    assert_eq!(store.get_counter("PollCount").await.unwrap(), Some(3));
}

#[tokio::test]
async fn memory_gauge_idempotence() {
    gauge_idempotence(&MemoryStore::new()).await;
}

#[tokio::test]
async fn sqlite_gauge_idempotence() {
    let dir = tempfile::tempdir().unwrap();
    gauge_idempotence(&sqlite_store(&dir)).await;
}

#[tokio::test]
async fn memory_counter_additivity() {
    counter_additivity_across_batch_splits(&MemoryStore::new()).await;
}

#[tokio::test]
async fn sqlite_counter_additivity() {
    let dir = tempfile::tempdir().unwrap();
    counter_additivity_across_batch_splits(&sqlite_store(&dir)).await;
}

#[tokio::test]
async fn memory_end_to_end_scenarios() {
    let store = MemoryStore::new();
    gauge_last_write_wins(&store).await;
    counter_sums(&store).await;
}

#[tokio::test]
async fn sqlite_end_to_end_scenarios() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(&dir);
    gauge_last_write_wins(&store).await;
    counter_sums(&store).await;
}

#[tokio::test]
async fn sqlite_batch_is_all_or_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(&dir);

    // Saturate the counter so the next accumulation overflows: the
    // second statement of the batch fails, and the first must roll back
    // with it.
    store.upsert_counter("Big", i64::MAX).await.unwrap();

    let r = store
        .update_batch(&[Metric::gauge("Fresh", 1.0), Metric::counter("Big", 1)])
        .await;
    assert!(r.is_err());

    assert_eq!(store.get_gauge("Fresh").await.unwrap(), None);
    assert_eq!(store.get_counter("Big").await.unwrap(), Some(i64::MAX));
}

#[tokio::test]
async fn mixed_batch_applies_both_kinds() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(&dir);

    store
        .update_batch(&[
            Metric::gauge("Alloc", 10.0),
            Metric::counter("PollCount", 1),
            Metric::gauge("Alloc", 20.0),
            Metric::counter("PollCount", 2),
        ])
        .await
        .unwrap();

    assert_eq!(store.get_gauge("Alloc").await.unwrap(), Some(20.0));
    assert_eq!(store.get_counter("PollCount").await.unwrap(), Some(3));

    let snapshot = store.get_all().await.unwrap();
    assert_eq!(snapshot.gauges.len(), 1);
    assert_eq!(snapshot.counters.len(), 1);
}
