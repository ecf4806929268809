/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

//! Metric sampling. Process figures come from `/proc/self`, host figures
//! from `/proc/meminfo` and `/proc/stat`; on other platforms only the
//! synthetic metrics are produced. A sampling failure degrades to fewer
//! metrics, never to an error.

use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use slog::{Logger, debug};

use pulse_types::Metric;

#[cfg(target_os = "linux")]
mod procfs;

pub trait MetricCollector: Send + Sync {
    /// Process-level metrics, one call per sample tick.
    fn collect(&self) -> Vec<Metric>;
    /// Host-level metrics, one call per sample tick.
    fn collect_system(&self) -> Vec<Metric>;
}

pub struct HostCollector {
    poll_count: AtomicI64,
    cpu_window: Mutex<CpuWindow>,
    logger: Logger,
}

#[derive(Default)]
struct CpuWindow {
    #[cfg(target_os = "linux")]
    prev: Vec<procfs::CpuTimes>,
}

impl HostCollector {
    pub fn new(logger: Logger) -> Self {
        HostCollector {
            poll_count: AtomicI64::new(0),
            cpu_window: Mutex::new(CpuWindow::default()),
            logger,
        }
    }
}

impl MetricCollector for HostCollector {
    fn collect(&self) -> Vec<Metric> {
        let polls = self.poll_count.fetch_add(1, Ordering::Relaxed) + 1;

        let mut metrics = Vec::with_capacity(20);

        #[cfg(target_os = "linux")]
        match procfs::process_gauges() {
            Ok(gauges) => {
                metrics.extend(
                    gauges
                        .into_iter()
                        .map(|(id, value)| Metric::gauge(id, value)),
                );
            }
            Err(e) => debug!(self.logger, "process sampling degraded"; "reason" => %e),
        }

        metrics.push(Metric::counter("PollCount", polls));
        metrics.push(Metric::gauge("RandomValue", fastrand::f64()));
        metrics
    }

    fn collect_system(&self) -> Vec<Metric> {
        let mut metrics = Vec::with_capacity(12);

        #[cfg(target_os = "linux")]
        {
            match procfs::memory_gauges() {
                Ok(gauges) => {
                    metrics.extend(
                        gauges
                            .into_iter()
                            .map(|(id, value)| Metric::gauge(id, value)),
                    );
                }
                Err(e) => debug!(self.logger, "memory sampling degraded"; "reason" => %e),
            }

            let mut window = self.cpu_window.lock().unwrap();
            match procfs::cpu_times() {
                Ok(current) => {
                    for (i, usage) in procfs::utilization(&window.prev, &current)
                        .into_iter()
                        .enumerate()
                    {
                        metrics.push(Metric::gauge(format!("CPUutilization{}", i + 1), usage));
                    }
                    window.prev = current;
                }
                Err(e) => debug!(self.logger, "cpu sampling degraded"; "reason" => %e),
            }
        }

        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_types::MetricKind;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[test]
    fn poll_count_increases_per_collect() {
        let collector = HostCollector::new(test_logger());

        let first = collector.collect();
        let second = collector.collect();

        let poll = |metrics: &[Metric]| {
            metrics
                .iter()
                .find(|m| m.id == "PollCount")
                .and_then(|m| m.delta)
                .unwrap()
        };
        assert_eq!(poll(&first), 1);
        assert_eq!(poll(&second), 2);
    }

    #[test]
    fn collected_metrics_are_valid() {
        let collector = HostCollector::new(test_logger());
        for m in collector.collect().iter().chain(collector.collect_system().iter()) {
            m.validate().unwrap();
        }
    }

    #[test]
    fn random_value_is_a_gauge() {
        let collector = HostCollector::new(test_logger());
        let metrics = collector.collect();
        let rv = metrics.iter().find(|m| m.id == "RandomValue").unwrap();
        assert_eq!(rv.kind, MetricKind::Gauge);
        assert!(rv.value.is_some());
    }
}
