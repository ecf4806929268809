/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

//! Durable backend on SQLite. Each upsert is a single
//! `INSERT ... ON CONFLICT` statement; a batch runs inside one
//! transaction and rolls back whole. Every write path goes through the
//! shared retry engine with the database classifier, so a busy or locked
//! database is retried transparently — a batch retry re-runs the whole
//! transaction from scratch.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, params};
use slog::{Logger, debug};
use tokio_util::sync::CancellationToken;

use pulse_retry::{RetryPolicy, retry};
use pulse_types::{Metric, MetricKind};

use super::{DbErrorClassifier, MetricStore, Snapshot, StoreError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS metrics (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    value REAL,
    delta INTEGER,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
)";

const UPSERT_GAUGE: &str = "INSERT INTO metrics (id, kind, value, delta, updated_at)
VALUES (?1, 'gauge', ?2, NULL, datetime('now'))
ON CONFLICT(id) DO UPDATE SET
    value = excluded.value,
    delta = NULL,
    updated_at = datetime('now')";

const UPSERT_COUNTER: &str = "INSERT INTO metrics (id, kind, delta, value, updated_at)
VALUES (?1, 'counter', ?2, NULL, datetime('now'))
ON CONFLICT(id) DO UPDATE SET
    delta = COALESCE(metrics.delta, 0) + excluded.delta,
    value = NULL,
    updated_at = datetime('now')";

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    policy: RetryPolicy,
    classifier: DbErrorClassifier,
    cancel: CancellationToken,
    logger: Logger,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(
        path: P,
        cancel: CancellationToken,
        logger: Logger,
    ) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| {
            row.get::<_, String>(0)
        })?;
        conn.execute(SCHEMA, [])?;

        Ok(SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
            policy: RetryPolicy::default(),
            classifier: DbErrorClassifier,
            cancel,
            logger,
        })
    }

    /// Replace the default 1s/3s/5s schedule, used by tests.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn apply_batch(conn: &mut Connection, metrics: &[Metric]) -> Result<(), rusqlite::Error> {
        let tx = conn.transaction()?;
        for metric in metrics {
            match metric.kind {
                MetricKind::Gauge => {
                    if let Some(value) = metric.value {
                        tx.execute(UPSERT_GAUGE, params![metric.id, value])?;
                    }
                }
                MetricKind::Counter => {
                    if let Some(delta) = metric.delta {
                        tx.execute(UPSERT_COUNTER, params![metric.id, delta])?;
                    }
                }
            }
        }
        tx.commit()
    }
}

#[async_trait]
impl MetricStore for SqliteStore {
    async fn upsert_gauge(&self, id: &str, value: f64) -> Result<(), StoreError> {
        let this = self;
        retry(&self.policy, &self.cancel, &self.classifier, move || {
            async move {
                let conn = this.conn.lock().unwrap();
                conn.execute(UPSERT_GAUGE, params![id, value]).map(|_| ())
            }
        })
        .await
        .map_err(StoreError::from_retry)
    }

    async fn upsert_counter(&self, id: &str, delta: i64) -> Result<(), StoreError> {
        let this = self;
        retry(&self.policy, &self.cancel, &self.classifier, move || {
            async move {
                let conn = this.conn.lock().unwrap();
                conn.execute(UPSERT_COUNTER, params![id, delta]).map(|_| ())
            }
        })
        .await
        .map_err(StoreError::from_retry)
    }

    async fn get_gauge(&self, id: &str) -> Result<Option<f64>, StoreError> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            "SELECT value FROM metrics WHERE kind = 'gauge' AND id = ?1 AND value IS NOT NULL",
            params![id],
            |row| row.get(0),
        ) {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn get_counter(&self, id: &str) -> Result<Option<i64>, StoreError> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            "SELECT delta FROM metrics WHERE kind = 'counter' AND id = ?1 AND delta IS NOT NULL",
            params![id],
            |row| row.get(0),
        ) {
            Ok(delta) => Ok(Some(delta)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn get_all(&self) -> Result<Snapshot, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut snapshot = Snapshot::default();

        let mut stmt = conn
            .prepare("SELECT id, value FROM metrics WHERE kind = 'gauge' AND value IS NOT NULL")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            snapshot.gauges.insert(row.get(0)?, row.get(1)?);
        }
        drop(rows);
        drop(stmt);

        let mut stmt = conn
            .prepare("SELECT id, delta FROM metrics WHERE kind = 'counter' AND delta IS NOT NULL")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            snapshot.counters.insert(row.get(0)?, row.get(1)?);
        }

        Ok(snapshot)
    }

    async fn update_batch(&self, metrics: &[Metric]) -> Result<(), StoreError> {
        let this = self;
        let r = retry(&self.policy, &self.cancel, &self.classifier, move || {
            async move {
                let mut conn = this.conn.lock().unwrap();
                SqliteStore::apply_batch(&mut conn, metrics)
            }
        })
        .await
        .map_err(StoreError::from_retry);

        if r.is_ok() {
            debug!(self.logger, "applied metric batch"; "count" => metrics.len());
        }
        r
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store(dir: &tempfile::TempDir) -> SqliteStore {
        SqliteStore::open(
            dir.path().join("metrics.db"),
            CancellationToken::new(),
            Logger::root(slog::Discard, slog::o!()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn upserts_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(&dir);
            store.upsert_gauge("Alloc", 10.0).await.unwrap();
            store.upsert_counter("PollCount", 2).await.unwrap();
        }
        let store = open_store(&dir);
        assert_eq!(store.get_gauge("Alloc").await.unwrap(), Some(10.0));
        assert_eq!(store.get_counter("PollCount").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn counter_upsert_accumulates_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.upsert_counter("PollCount", 1).await.unwrap();
        store.upsert_counter("PollCount", 2).await.unwrap();
        assert_eq!(store.get_counter("PollCount").await.unwrap(), Some(3));

        // replacing write on the same id nulls the other column
        store.upsert_gauge("Temp", 1.5).await.unwrap();
        store.upsert_gauge("Temp", 2.5).await.unwrap();
        assert_eq!(store.get_gauge("Temp").await.unwrap(), Some(2.5));
        assert_eq!(store.get_counter("Temp").await.unwrap(), None);
    }

    #[tokio::test]
    async fn ping_reports_healthy() {
        let dir = tempfile::tempdir().unwrap();
        open_store(&dir).ping().await.unwrap();
    }
}
