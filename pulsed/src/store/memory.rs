/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use pulse_types::{Metric, MetricKind};

use super::{MetricStore, Snapshot, StoreError};

/// Volatile backend: a pair of maps behind one read/write lock. State is
/// lost on restart; meant for tests and single-node setups.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Maps>,
}

#[derive(Default)]
struct Maps {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

#[async_trait]
impl MetricStore for MemoryStore {
    async fn upsert_gauge(&self, id: &str, value: f64) -> Result<(), StoreError> {
        let mut maps = self.inner.write().unwrap();
        maps.gauges.insert(id.to_string(), value);
        Ok(())
    }

    async fn upsert_counter(&self, id: &str, delta: i64) -> Result<(), StoreError> {
        let mut maps = self.inner.write().unwrap();
        *maps.counters.entry(id.to_string()).or_insert(0) += delta;
        Ok(())
    }

    async fn get_gauge(&self, id: &str) -> Result<Option<f64>, StoreError> {
        Ok(self.inner.read().unwrap().gauges.get(id).copied())
    }

    async fn get_counter(&self, id: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.inner.read().unwrap().counters.get(id).copied())
    }

    async fn get_all(&self) -> Result<Snapshot, StoreError> {
        let maps = self.inner.read().unwrap();
        Ok(Snapshot {
            gauges: maps.gauges.clone(),
            counters: maps.counters.clone(),
        })
    }

    async fn update_batch(&self, metrics: &[Metric]) -> Result<(), StoreError> {
        let mut maps = self.inner.write().unwrap();
        for metric in metrics {
            match metric.kind {
                MetricKind::Gauge => {
                    if let Some(value) = metric.value {
                        maps.gauges.insert(metric.id.clone(), value);
                    }
                }
                MetricKind::Counter => {
                    if let Some(delta) = metric.delta {
                        *maps.counters.entry(metric.id.clone()).or_insert(0) += delta;
                    }
                }
            }
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gauge_replaces_counter_accumulates() {
        let store = MemoryStore::new();
        store.upsert_gauge("Alloc", 10.0).await.unwrap();
        store.upsert_gauge("Alloc", 20.0).await.unwrap();
        store.upsert_counter("PollCount", 1).await.unwrap();
        store.upsert_counter("PollCount", 2).await.unwrap();

        assert_eq!(store.get_gauge("Alloc").await.unwrap(), Some(20.0));
        assert_eq!(store.get_counter("PollCount").await.unwrap(), Some(3));
        assert_eq!(store.get_gauge("Missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn snapshot_is_independent() {
        let store = MemoryStore::new();
        store.upsert_gauge("Alloc", 1.0).await.unwrap();

        let mut snapshot = store.get_all().await.unwrap();
        snapshot.gauges.insert("Alloc".to_string(), 99.0);
        snapshot.counters.insert("Fake".to_string(), 1);

        assert_eq!(store.get_gauge("Alloc").await.unwrap(), Some(1.0));
        assert_eq!(store.get_counter("Fake").await.unwrap(), None);
    }

    #[tokio::test]
    async fn batch_applies_all_and_skips_valueless() {
        let store = MemoryStore::new();
        let mut broken = Metric::counter("Skipped", 1);
        broken.delta = None;

        store
            .update_batch(&[
                Metric::gauge("Alloc", 5.0),
                Metric::counter("PollCount", 2),
                Metric::counter("PollCount", 3),
                broken,
            ])
            .await
            .unwrap();

        assert_eq!(store.get_gauge("Alloc").await.unwrap(), Some(5.0));
        assert_eq!(store.get_counter("PollCount").await.unwrap(), Some(5));
        assert_eq!(store.get_counter("Skipped").await.unwrap(), None);
    }
}
