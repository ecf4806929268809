/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use slog::{Logger, info};
use tokio_util::sync::CancellationToken;

/// Wire process shutdown signals to the one cancellation token the
/// server and every in-flight storage retry listen on.
pub fn register(cancel: CancellationToken, logger: Logger) {
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!(logger, "shutdown signal received");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{SignalKind, signal};

    let Ok(mut term) = signal(SignalKind::terminate()) else {
        let _ = tokio::signal::ctrl_c().await;
        return;
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
