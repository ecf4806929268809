/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fs;
use std::io;

/// Gauges from `/proc/self/status`, in bytes where the kernel reports kB.
pub(super) fn process_gauges() -> io::Result<Vec<(String, f64)>> {
    let status = fs::read_to_string("/proc/self/status")?;
    let mut gauges = Vec::with_capacity(16);

    for line in status.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let tracked = matches!(
            key,
            "VmPeak"
                | "VmSize"
                | "VmHWM"
                | "VmRSS"
                | "VmData"
                | "VmStk"
                | "VmLib"
                | "VmSwap"
                | "Threads"
                | "FDSize"
        );
        if !tracked {
            continue;
        }
        let rest = rest.trim();
        let mut fields = rest.split_ascii_whitespace();
        let Some(number) = fields.next().and_then(|v| v.parse::<f64>().ok()) else {
            continue;
        };
        let value = match fields.next() {
            Some("kB") => number * 1024.0,
            _ => number,
        };
        gauges.push((key.to_string(), value));
    }

    Ok(gauges)
}

/// TotalMemory / FreeMemory from `/proc/meminfo`, in bytes.
pub(super) fn memory_gauges() -> io::Result<Vec<(String, f64)>> {
    let meminfo = fs::read_to_string("/proc/meminfo")?;
    let mut gauges = Vec::with_capacity(2);

    for line in meminfo.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let id = match key {
            "MemTotal" => "TotalMemory",
            "MemFree" => "FreeMemory",
            _ => continue,
        };
        if let Some(kb) = rest
            .trim()
            .split_ascii_whitespace()
            .next()
            .and_then(|v| v.parse::<f64>().ok())
        {
            gauges.push((id.to_string(), kb * 1024.0));
        }
    }

    Ok(gauges)
}

#[derive(Clone, Copy, Debug, Default)]
pub(super) struct CpuTimes {
    busy: u64,
    total: u64,
}

/// Per-cpu cumulative jiffies from `/proc/stat`.
pub(super) fn cpu_times() -> io::Result<Vec<CpuTimes>> {
    let stat = fs::read_to_string("/proc/stat")?;
    let mut times = Vec::new();

    for line in stat.lines() {
        let Some(rest) = line.strip_prefix("cpu") else {
            continue;
        };
        // skip the aggregate "cpu " line, keep "cpu0".."cpuN"
        if !rest.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        let fields: Vec<u64> = rest
            .split_ascii_whitespace()
            .skip(1)
            .filter_map(|v| v.parse().ok())
            .collect();
        if fields.len() < 4 {
            continue;
        }
        let total: u64 = fields.iter().sum();
        let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
        times.push(CpuTimes {
            busy: total - idle,
            total,
        });
    }

    Ok(times)
}

/// Percent busy per cpu across the window between two snapshots. With no
/// previous snapshot (first poll) every cpu reads 0.
pub(super) fn utilization(prev: &[CpuTimes], current: &[CpuTimes]) -> Vec<f64> {
    current
        .iter()
        .enumerate()
        .map(|(i, now)| {
            let Some(before) = prev.get(i) else {
                return 0.0;
            };
            let total = now.total.saturating_sub(before.total);
            if total == 0 {
                return 0.0;
            }
            let busy = now.busy.saturating_sub(before.busy);
            busy as f64 * 100.0 / total as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utilization_first_window_is_zero() {
        let now = vec![CpuTimes { busy: 50, total: 100 }];
        assert_eq!(utilization(&[], &now), vec![0.0]);
    }

    #[test]
    fn utilization_across_window() {
        let before = vec![CpuTimes { busy: 50, total: 100 }];
        let now = vec![CpuTimes { busy: 80, total: 140 }];
        assert_eq!(utilization(&before, &now), vec![75.0]);
    }

    #[test]
    fn process_gauges_read_own_status() {
        let gauges = process_gauges().unwrap();
        assert!(gauges.iter().any(|(id, _)| id == "VmRSS"));
    }
}
