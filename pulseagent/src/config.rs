/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

//! Immutable agent configuration, assembled exactly once before any
//! component is constructed. Precedence: command line flags, then
//! environment, then the optional JSON config file, then defaults.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::opts::ProcArgs;

const DEFAULT_ADDRESS: &str = "localhost:8080";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_RATE_LIMIT: usize = 3;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SHUTDOWN_SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub server_url: String,
    pub poll_interval: Duration,
    pub report_interval: Duration,
    pub rate_limit: usize,
    pub hash_key: Option<String>,
    pub crypto_key: Option<PathBuf>,
    pub request_timeout: Duration,
    pub shutdown_send_timeout: Duration,
    pub debug: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            server_url: format!("http://{DEFAULT_ADDRESS}"),
            poll_interval: DEFAULT_POLL_INTERVAL,
            report_interval: DEFAULT_REPORT_INTERVAL,
            rate_limit: DEFAULT_RATE_LIMIT,
            hash_key: None,
            crypto_key: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            shutdown_send_timeout: DEFAULT_SHUTDOWN_SEND_TIMEOUT,
            debug: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    address: Option<String>,
    poll_interval: Option<u64>,
    report_interval: Option<u64>,
    rate_limit: Option<usize>,
    key: Option<String>,
    crypto_key: Option<PathBuf>,
}

impl AgentConfig {
    pub fn assemble(args: &ProcArgs) -> anyhow::Result<AgentConfig> {
        let file = match &args.config {
            Some(path) => {
                let data = fs::read(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                serde_json::from_slice::<FileConfig>(&data)
                    .with_context(|| format!("malformed config file {}", path.display()))?
            }
            None => FileConfig::default(),
        };

        let address = args
            .address
            .clone()
            .or(file.address)
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());

        Ok(AgentConfig {
            server_url: normalize_url(&address),
            poll_interval: args
                .poll_interval
                .or(file.poll_interval)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            report_interval: args
                .report_interval
                .or(file.report_interval)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REPORT_INTERVAL),
            rate_limit: args
                .rate_limit
                .or(file.rate_limit)
                .unwrap_or(DEFAULT_RATE_LIMIT)
                .max(1),
            hash_key: args.hash_key.clone().or(file.key).filter(|k| !k.is_empty()),
            crypto_key: args.crypto_key.clone().or(file.crypto_key),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            shutdown_send_timeout: DEFAULT_SHUTDOWN_SEND_TIMEOUT,
            debug: args.debug,
        })
    }
}

fn normalize_url(address: &str) -> String {
    let url = if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    };
    url.trim_end_matches('/').to_string()
}
