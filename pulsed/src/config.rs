/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

//! Immutable collector configuration, assembled exactly once. Precedence:
//! command line flags, then environment, then the optional JSON config
//! file, then defaults.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

use crate::opts::ProcArgs;

const DEFAULT_LISTEN_ADDR: &str = "localhost:8080";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// SQLite database path; in-memory storage when unset.
    pub database: Option<PathBuf>,
    pub hash_key: Option<String>,
    pub crypto_key: Option<PathBuf>,
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            database: None,
            hash_key: None,
            crypto_key: None,
            debug: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    address: Option<String>,
    database: Option<PathBuf>,
    key: Option<String>,
    crypto_key: Option<PathBuf>,
}

impl ServerConfig {
    pub fn assemble(args: &ProcArgs) -> anyhow::Result<ServerConfig> {
        let file = match &args.config {
            Some(path) => {
                let data = fs::read(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                serde_json::from_slice::<FileConfig>(&data)
                    .with_context(|| format!("malformed config file {}", path.display()))?
            }
            None => FileConfig::default(),
        };

        Ok(ServerConfig {
            listen_addr: args
                .address
                .clone()
                .or(file.address)
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            database: args.database.clone().or(file.database),
            hash_key: args.hash_key.clone().or(file.key).filter(|k| !k.is_empty()),
            crypto_key: args.crypto_key.clone().or(file.crypto_key),
            debug: args.debug,
        })
    }
}
