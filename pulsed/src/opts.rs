/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "pulsed", about = "Pulse metrics collector daemon")]
pub struct ProcArgs {
    /// Listen address, host:port
    #[arg(short = 'a', long = "address", env = "ADDRESS")]
    pub address: Option<String>,
    /// SQLite database path; metrics stay in memory when unset
    #[arg(short = 'd', long = "database", env = "DATABASE_DSN")]
    pub database: Option<PathBuf>,
    /// Shared key for HMAC-SHA256 payload tags
    #[arg(short = 'k', long = "key", env = "KEY")]
    pub hash_key: Option<String>,
    /// Path to the RSA private key (PEM) for encrypted payloads
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
