/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use anyhow::Context;
use slog::{info, o};
use tokio_util::sync::CancellationToken;

use pulse_codec::digest::TagSigner;
use pulse_codec::seal::Opener;
use pulsed::config::ServerConfig;
use pulsed::serve::AppState;
use pulsed::store::{MemoryStore, MetricStore, SqliteStore};

fn main() -> anyhow::Result<()> {
    let args = pulsed::opts::parse_clap();
    let config =
        ServerConfig::assemble(&args).context("failed to assemble server configuration")?;
    let logger = pulse_log::new_logger("pulsed", config.debug);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    rt.block_on(run(config, logger))
}

async fn run(config: ServerConfig, logger: slog::Logger) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    pulsed::signal::register(cancel.clone(), logger.new(o!("component" => "signal")));

    let store: Arc<dyn MetricStore> = match &config.database {
        Some(path) => {
            let store = SqliteStore::open(
                path,
                cancel.clone(),
                logger.new(o!("component" => "store")),
            )
            .with_context(|| format!("failed to open database {}", path.display()))?;
            store.ping().await.context("database is not reachable")?;
            info!(logger, "using sqlite storage"; "path" => %path.display());
            Arc::new(store)
        }
        None => {
            info!(logger, "using in-memory storage");
            Arc::new(MemoryStore::new())
        }
    };

    let signer = config
        .hash_key
        .as_ref()
        .map(|k| TagSigner::new(k.as_bytes()))
        .transpose()
        .context("invalid hash key")?
        .map(Arc::new);
    let opener = config
        .crypto_key
        .as_ref()
        .map(Opener::from_pem_file)
        .transpose()
        .context("failed to load private encryption key")?
        .map(Arc::new);

    let state = AppState::new(store, signer, opener, logger.new(o!("component" => "serve")));
    let router = pulsed::serve::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(logger, "collector started"; "addr" => %config.listen_addr);

    let shutdown = cancel.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("server error")?;

    info!(logger, "collector stopped");
    Ok(())
}
