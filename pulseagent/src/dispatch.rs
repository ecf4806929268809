/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

//! The agent's driving loop: two sampling timers feed the accumulator, a
//! report timer swaps batches out and hands them to a bounded queue, and
//! a fixed pool of workers drains the queue through the sender. A full
//! queue never drops a batch; its contents go back into the live
//! accumulator for the next cycle.

use std::sync::Arc;
use std::time::Duration;

use slog::{Logger, debug, info, warn};
use tokio::task::JoinSet;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;

use crate::accumulate::{Accumulator, Batch, BatchPool};
use crate::collect::MetricCollector;
use crate::config::AgentConfig;
use crate::send::MetricSender;

pub struct Dispatcher {
    poll_interval: Duration,
    report_interval: Duration,
    workers: usize,
    shutdown_send_timeout: Duration,
    pool: Arc<BatchPool>,
    accumulator: Arc<Accumulator>,
    collector: Arc<dyn MetricCollector>,
    sender: Arc<dyn MetricSender>,
    logger: Logger,
}

impl Dispatcher {
    pub fn new(
        config: &AgentConfig,
        collector: Arc<dyn MetricCollector>,
        sender: Arc<dyn MetricSender>,
        logger: Logger,
    ) -> Self {
        let pool = Arc::new(BatchPool::new());
        let accumulator = Arc::new(Accumulator::new(pool.clone()));
        Dispatcher {
            poll_interval: config.poll_interval,
            report_interval: config.report_interval,
            workers: config.rate_limit.max(1),
            shutdown_send_timeout: config.shutdown_send_timeout,
            pool,
            accumulator,
            collector,
            sender,
            logger,
        }
    }

    pub async fn run(self: Arc<Self>, cancel: &CancellationToken) {
        let (batch_tx, batch_rx) = flume::bounded::<Batch>(self.workers * 2);

        let mut tasks = JoinSet::new();

        {
            let d = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { d.poll_process(cancel).await });
        }
        {
            let d = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { d.poll_system(cancel).await });
        }
        for id in 0..self.workers {
            let d = self.clone();
            let rx = batch_rx.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { d.report_worker(id, rx, cancel).await });
        }
        {
            // The dispatcher task owns the sole sender half; when it
            // returns, the workers drain whatever is queued and exit.
            let d = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { d.dispatch(batch_tx, cancel).await });
        }
        drop(batch_rx);

        while tasks.join_next().await.is_some() {}

        self.final_send().await;
    }

    async fn poll_process(&self, cancel: CancellationToken) {
        let mut ticker = interval_at(
            Instant::now() + self.poll_interval,
            self.poll_interval,
        );
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    self.accumulator.append(self.collector.collect());
                }
            }
        }
    }

    async fn poll_system(&self, cancel: CancellationToken) {
        let mut ticker = interval_at(
            Instant::now() + self.poll_interval,
            self.poll_interval,
        );
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    self.accumulator.append(self.collector.collect_system());
                }
            }
        }
    }

    async fn dispatch(&self, batch_tx: flume::Sender<Batch>, cancel: CancellationToken) {
        let mut ticker = interval_at(
            Instant::now() + self.report_interval,
            self.report_interval,
        );
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    let batch = self.accumulator.swap();
                    if batch.is_empty() {
                        self.pool.release(batch);
                        continue;
                    }
                    let count = batch.len();
                    match batch_tx.try_send(batch) {
                        Ok(()) => {
                            debug!(self.logger, "dispatched batch to worker pool"; "count" => count);
                        }
                        Err(flume::TrySendError::Full(mut batch))
                        | Err(flume::TrySendError::Disconnected(mut batch)) => {
                            // Backpressure: merge back into the live
                            // accumulator instead of dropping.
                            info!(self.logger, "worker pool busy, deferring batch to next cycle";
                                "count" => count);
                            self.accumulator.append(batch.drain());
                            self.pool.release(batch);
                        }
                    }
                }
            }
        }
    }

    async fn report_worker(
        &self,
        id: usize,
        batch_rx: flume::Receiver<Batch>,
        cancel: CancellationToken,
    ) {
        while let Ok(batch) = batch_rx.recv_async().await {
            if batch.is_empty() {
                self.pool.release(batch);
                continue;
            }
            let count = batch.len();
            match self.sender.send(&cancel, batch.items()).await {
                Ok(()) => {
                    info!(self.logger, "worker sent batch"; "worker" => id, "count" => count);
                }
                Err(e) => {
                    warn!(self.logger, "worker failed to send batch";
                        "worker" => id, "count" => count, "reason" => %e);
                }
            }
            self.pool.release(batch);
        }
    }

    /// One last swap-and-send so a graceful exit never discards buffered
    /// metrics. Runs with a fresh token: shutdown is already under way
    /// and this send must not be cancelled by it.
    async fn final_send(&self) {
        let batch = self.accumulator.swap();
        if batch.is_empty() {
            self.pool.release(batch);
            return;
        }
        let count = batch.len();
        info!(self.logger, "sending buffered metrics before shutdown"; "count" => count);

        let cancel = CancellationToken::new();
        match tokio::time::timeout(
            self.shutdown_send_timeout,
            self.sender.send(&cancel, batch.items()),
        )
        .await
        {
            Ok(Ok(())) => info!(self.logger, "final send completed"; "count" => count),
            Ok(Err(e)) => warn!(self.logger, "final send failed"; "reason" => %e),
            Err(_) => warn!(self.logger, "final send timed out"; "count" => count),
        }
        self.pool.release(batch);
    }

    #[cfg(test)]
    pub(crate) fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pulse_types::Metric;

    use crate::send::SendError;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    struct StaticCollector;

    impl MetricCollector for StaticCollector {
        fn collect(&self) -> Vec<Metric> {
            vec![Metric::counter("PollCount", 1)]
        }

        fn collect_system(&self) -> Vec<Metric> {
            Vec::new()
        }
    }

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<Vec<Metric>>>,
    }

    #[async_trait]
    impl MetricSender for RecordingSender {
        async fn send(
            &self,
            _cancel: &CancellationToken,
            metrics: &[Metric],
        ) -> Result<(), SendError> {
            self.sent.lock().unwrap().push(metrics.to_vec());
            Ok(())
        }
    }

    fn test_config() -> AgentConfig {
        AgentConfig {
            poll_interval: Duration::from_millis(10),
            report_interval: Duration::from_millis(25),
            rate_limit: 2,
            shutdown_send_timeout: Duration::from_millis(50),
            ..AgentConfig::default()
        }
    }

    #[tokio::test]
    async fn dispatch_delivers_sampled_metrics() {
        let sender = Arc::new(RecordingSender::default());
        let dispatcher = Arc::new(Dispatcher::new(
            &test_config(),
            Arc::new(StaticCollector),
            sender.clone(),
            test_logger(),
        ));

        let cancel = CancellationToken::new();
        let run = {
            let dispatcher = dispatcher.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { dispatcher.run(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(120)).await;
        cancel.cancel();
        run.await.unwrap();

        let sent = sender.sent.lock().unwrap();
        let total: usize = sent.iter().map(|b| b.len()).sum();
        assert!(total > 0, "no metrics delivered");
        assert!(sent.iter().all(|b| b.iter().all(|m| m.id == "PollCount")));
    }

    #[tokio::test]
    async fn saturated_queue_keeps_metrics_in_accumulator() {
        // A sender that blocks until shutdown keeps every worker busy, so
        // the queue fills and dispatch has to re-merge closed batches.
        struct StuckSender;

        #[async_trait]
        impl MetricSender for StuckSender {
            async fn send(
                &self,
                cancel: &CancellationToken,
                _metrics: &[Metric],
            ) -> Result<(), SendError> {
                cancel.cancelled().await;
                Err(SendError::Cancelled)
            }
        }

        // Sampling effectively off: only the seeded metrics move through
        // the pipeline, so retention is attributable to re-merging.
        let config = AgentConfig {
            poll_interval: Duration::from_secs(3600),
            report_interval: Duration::from_millis(25),
            rate_limit: 2,
            shutdown_send_timeout: Duration::from_millis(50),
            ..AgentConfig::default()
        };
        let dispatcher = Arc::new(Dispatcher::new(
            &config,
            Arc::new(StaticCollector),
            Arc::new(StuckSender),
            test_logger(),
        ));

        let cancel = CancellationToken::new();
        let run = {
            let dispatcher = dispatcher.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { dispatcher.run(&cancel).await })
        };

        // Two workers plus four queue slots absorb six batches; the rest
        // must survive in the live accumulator.
        for i in 0..8 {
            let seed: Vec<Metric> = (0..100)
                .map(|n| Metric::counter(format!("seed{i}_{n}"), 1))
                .collect();
            dispatcher.accumulator().append(seed);
            tokio::time::sleep(Duration::from_millis(40)).await;
        }

        assert!(
            dispatcher.accumulator().len() >= 100,
            "re-merged metrics were lost"
        );

        cancel.cancel();
        run.await.unwrap();
    }
}
