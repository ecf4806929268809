/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

//! Storage backends. Both implement the same contract: a gauge write
//! replaces the stored value, a counter write adds its delta to the
//! running sum, and a metric id keeps the kind of whichever type wrote
//! it first — the backends do not reconcile mixed-kind writes.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use pulse_retry::RetryError;
use pulse_types::Metric;

mod classify;
pub(crate) use classify::DbErrorClassifier;

mod memory;
pub use memory::MemoryStore;

mod sqlite;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database failure: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("all {attempts} attempts failed, last error: {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: rusqlite::Error,
    },
    #[error("storage operation cancelled")]
    Cancelled,
}

impl StoreError {
    fn from_retry(err: RetryError<rusqlite::Error>) -> StoreError {
        match err {
            RetryError::Cancelled => StoreError::Cancelled,
            RetryError::Permanent(e) => StoreError::Database(e),
            RetryError::Exhausted { attempts, last } => StoreError::Exhausted { attempts, last },
        }
    }
}

/// Independent copy of the stored state; mutating it never affects the
/// backend.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub gauges: HashMap<String, f64>,
    pub counters: HashMap<String, i64>,
}

#[async_trait]
pub trait MetricStore: Send + Sync {
    async fn upsert_gauge(&self, id: &str, value: f64) -> Result<(), StoreError>;
    async fn upsert_counter(&self, id: &str, delta: i64) -> Result<(), StoreError>;
    async fn get_gauge(&self, id: &str) -> Result<Option<f64>, StoreError>;
    async fn get_counter(&self, id: &str) -> Result<Option<i64>, StoreError>;
    async fn get_all(&self) -> Result<Snapshot, StoreError>;
    /// Apply a whole batch. The durable backend makes this
    /// all-or-nothing; entries without a value for their kind are
    /// skipped.
    async fn update_batch(&self, metrics: &[Metric]) -> Result<(), StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}
