/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "pulseagent", about = "Pulse metrics agent")]
pub struct ProcArgs {
    /// Collector address, host:port or full URL
    #[arg(short = 'a', long = "address", env = "ADDRESS")]
    pub address: Option<String>,
    /// Sampling interval in seconds
    #[arg(short = 'p', long = "poll-interval", env = "POLL_INTERVAL")]
    pub poll_interval: Option<u64>,
    /// Reporting interval in seconds
    #[arg(short = 'r', long = "report-interval", env = "REPORT_INTERVAL")]
    pub report_interval: Option<u64>,
    /// Number of concurrent report workers
    #[arg(short = 'l', long = "rate-limit", env = "RATE_LIMIT")]
    pub rate_limit: Option<usize>,
    /// Shared key for HMAC-SHA256 payload tags
    #[arg(short = 'k', long = "key", env = "KEY")]
    pub hash_key: Option<String>,
    /// Path to the collector's RSA public key (PEM)
    #[arg(long = "crypto-key", env = "CRYPTO_KEY")]
    pub crypto_key: Option<PathBuf>,
    /// Path to a JSON config file
    #[arg(short = 'c', long = "config", env = "CONFIG")]
    pub config: Option<PathBuf>,
    /// Log at debug level
    #[arg(long)]
    pub debug: bool,
}

pub fn parse_clap() -> ProcArgs {
    ProcArgs::parse()
}
